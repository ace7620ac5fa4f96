//! HTTP surface for dispatch and pipeline execution
//!
//! Endpoints:
//! - `POST /api/agent` runs one agent: `{agentId, input}` → `{output}`
//! - `POST /api/pipeline` runs a pipeline and returns the terminal run
//! - `POST /api/pipeline/stream` streams run snapshots as server-sent events
//! - `GET /api/agents` lists the catalog
//! - `GET /health` and `GET /metrics`

use crate::catalog::AgentProfile;
use crate::error::{AgentError, ErrorKind};
use crate::observability::metrics::{metrics, MetricsCollector};
use crate::pipeline::{PipelineExecutor, PipelineRun, RunState, Stage};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Largest accepted request body
const MAX_BODY_BYTES: u64 = 256 * 1024;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentRequest {
    #[serde(default)]
    agent_id: String,
    #[serde(default)]
    input: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRequest {
    #[serde(default)]
    pub agent_ids: Vec<String>,
    #[serde(default)]
    pub input: String,
}

#[derive(Debug, Serialize)]
struct AgentResponse {
    output: String,
}

/// Terminal pipeline result returned by `POST /api/pipeline`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResponse {
    #[serde(flatten)]
    pub run: PipelineRun,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<PipelineRun> for PipelineResponse {
    fn from(run: PipelineRun) -> Self {
        let final_output = run.final_output().map(str::to_string);
        let error = run
            .failed_stage()
            .and_then(|(_, stage)| stage.output.clone());
        Self {
            run,
            final_output,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    kind: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    stages: Option<Vec<Stage>>,
}

#[derive(Debug, Serialize)]
struct AgentListResponse<'a> {
    agents: &'a [AgentProfile],
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: u64,
    uptime_seconds: u64,
    agents: usize,
}

#[derive(Debug, Serialize)]
struct RejectionResponse {
    error: String,
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn error_reply(error: &AgentError, stages: Option<Vec<Stage>>) -> Response {
    let kind = error.kind();
    let body = ErrorResponse {
        error: error.description(),
        kind,
        stages,
    };
    warp::reply::with_status(warp::reply::json(&body), status(kind.status_code())).into_response()
}

/// HTTP status for a terminal run
pub fn run_status_code(run: &PipelineRun) -> u16 {
    match run.state {
        RunState::Succeeded => 200,
        RunState::Failed => run
            .failed_stage()
            .and_then(|(_, stage)| stage.error_kind)
            .map(ErrorKind::status_code)
            .unwrap_or(500),
        // Only reachable when the client went away mid-run
        RunState::Cancelled | RunState::Running => 499,
    }
}

fn with_executor(
    executor: PipelineExecutor,
) -> impl Filter<Extract = (PipelineExecutor,), Error = Infallible> + Clone {
    warp::any().map(move || executor.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: for<'de> Deserialize<'de> + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

async fn handle_agent(
    request: AgentRequest,
    executor: PipelineExecutor,
) -> Result<Response, Infallible> {
    info!(agent_id = %request.agent_id, "Single agent request");
    match executor
        .dispatcher()
        .dispatch(&request.agent_id, &request.input)
        .await
    {
        Ok(output) => Ok(warp::reply::json(&AgentResponse { output }).into_response()),
        Err(e) => Ok(error_reply(&e, None)),
    }
}

async fn handle_pipeline(
    request: PipelineRequest,
    executor: PipelineExecutor,
) -> Result<Response, Infallible> {
    info!(stages = request.agent_ids.len(), "Pipeline request");
    match executor
        .run_to_completion(request.agent_ids, request.input)
        .await
    {
        Ok(report) => {
            let code = run_status_code(&report.run);
            let body = PipelineResponse::from(report.run);
            Ok(warp::reply::with_status(warp::reply::json(&body), status(code)).into_response())
        }
        Err(e) => Ok(error_reply(&e, Some(Vec::new()))),
    }
}

fn snapshot_events(
    snapshots: mpsc::Receiver<PipelineRun>,
) -> impl Stream<Item = Result<warp::sse::Event, serde_json::Error>> + Send + 'static {
    futures::stream::unfold(snapshots, |mut rx| async move {
        let snapshot = rx.recv().await?;
        let event = warp::sse::Event::default()
            .id(snapshot.run_id.to_string())
            .event("snapshot")
            .json_data(&snapshot);
        Some((event, rx))
    })
}

async fn handle_pipeline_stream(
    request: PipelineRequest,
    executor: PipelineExecutor,
) -> Result<Response, Infallible> {
    info!(stages = request.agent_ids.len(), "Streaming pipeline request");
    match executor.start(request.agent_ids, request.input) {
        Ok(handle) => {
            // Dropping the stream on disconnect closes the receiver, which cancels the run
            let stream = snapshot_events(handle.snapshots);
            Ok(warp::sse::reply(warp::sse::keep_alive().stream(stream)).into_response())
        }
        Err(e) => Ok(error_reply(&e, Some(Vec::new()))),
    }
}

async fn handle_agents(executor: PipelineExecutor) -> Result<Response, Infallible> {
    let catalog = executor.dispatcher().catalog();
    Ok(warp::reply::json(&AgentListResponse {
        agents: catalog.profiles(),
    })
    .into_response())
}

async fn handle_health(executor: PipelineExecutor) -> Result<Response, Infallible> {
    let snapshot = metrics().get_metrics();
    let response = HealthResponse {
        status: "healthy",
        timestamp: current_timestamp(),
        uptime_seconds: snapshot.lifecycle.uptime_seconds,
        agents: executor.dispatcher().catalog().len(),
    };
    Ok(warp::reply::json(&response).into_response())
}

fn metrics_reply(collector: &MetricsCollector) -> Response {
    warp::reply::json(&collector.get_metrics()).into_response()
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (code, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {e}"))
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if rejection.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected application/json".to_string(),
        )
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        warn!(?rejection, "Unhandled rejection");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
        )
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&RejectionResponse { error: message }),
        code,
    )
    .into_response())
}

/// All routes, ready for `warp::serve` or `warp::test`
pub fn routes(
    executor: PipelineExecutor,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    // POST /api/agent - single dispatch
    let agent_route = warp::path!("api" / "agent")
        .and(warp::post())
        .and(json_body::<AgentRequest>())
        .and(with_executor(executor.clone()))
        .and_then(handle_agent);

    // POST /api/pipeline/stream - snapshots as server-sent events
    let stream_route = warp::path!("api" / "pipeline" / "stream")
        .and(warp::post())
        .and(json_body::<PipelineRequest>())
        .and(with_executor(executor.clone()))
        .and_then(handle_pipeline_stream);

    // POST /api/pipeline - terminal run
    let pipeline_route = warp::path!("api" / "pipeline")
        .and(warp::post())
        .and(json_body::<PipelineRequest>())
        .and(with_executor(executor.clone()))
        .and_then(handle_pipeline);

    // GET /api/agents - catalog listing
    let agents_route = warp::path!("api" / "agents")
        .and(warp::get())
        .and(with_executor(executor.clone()))
        .and_then(handle_agents);

    // GET /health - liveness
    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_executor(executor))
        .and_then(handle_health);

    // GET /metrics - metrics export
    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| metrics_reply(metrics()));

    agent_route
        .or(stream_route)
        .unify()
        .or(pipeline_route)
        .unify()
        .or(agents_route)
        .unify()
        .or(health_route)
        .unify()
        .or(metrics_route)
        .unify()
        .with(
            warp::cors()
                .allow_any_origin()
                .allow_methods(vec!["GET", "POST"])
                .allow_headers(vec!["content-type"]),
        )
        .recover(handle_rejection)
}

/// Bind and serve until `shutdown` resolves
pub async fn serve<F>(
    executor: PipelineExecutor,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (bound, server) =
        warp::serve(routes(executor)).try_bind_with_graceful_shutdown(addr, shutdown)?;

    metrics().set_service_state("running");
    info!(address = %bound, "HTTP server listening");
    server.await;
    metrics().set_service_state("stopped");
    info!("HTTP server stopped");
    Ok(())
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
