//! agentflow pipeline client
//!
//! Posts a pipeline to a running `agentflow serve` instance and prints the
//! stage history.
//!
//! ## Usage
//!
//! ```bash
//! # Research a topic, then summarize it
//! pipeline-client --agents research,summary --input "Rust async runtimes"
//!
//! # Against a different server, raw JSON output
//! pipeline-client --url http://10.0.0.5:3000 --agents writer --input "notes" --json
//!
//! # List available agents
//! pipeline-client --list
//! ```

use agentflow::pipeline::StageStatus;
use agentflow::server::{PipelineRequest, PipelineResponse};
use clap::Parser;
use serde_json::Value;
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "pipeline-client",
    about = "Run an agent pipeline on an agentflow server"
)]
struct Args {
    /// Server base URL
    #[arg(long, env = "AGENTFLOW_URL", default_value = "http://127.0.0.1:3000")]
    url: String,

    /// Agent ids in execution order, comma separated
    #[arg(short, long, value_delimiter = ',', required_unless_present = "list")]
    agents: Vec<String>,

    /// Initial input text
    #[arg(short, long, required_unless_present = "list")]
    input: Option<String>,

    /// Print the raw JSON response
    #[arg(long)]
    json: bool,

    /// List the server's agents and exit
    #[arg(long)]
    list: bool,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 300)]
    timeout: u64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("❌ {e}");
            process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<i32, Box<dyn std::error::Error>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;
    let base = args.url.trim_end_matches('/');

    if args.list {
        let listing: Value = client
            .get(format!("{base}/api/agents"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        for agent in listing["agents"].as_array().into_iter().flatten() {
            println!(
                "{:<12} {} {}",
                agent["id"].as_str().unwrap_or_default(),
                agent["icon"].as_str().unwrap_or_default(),
                agent["name"].as_str().unwrap_or_default()
            );
        }
        return Ok(0);
    }

    let request = PipelineRequest {
        agent_ids: args.agents,
        input: args.input.unwrap_or_default(),
    };

    println!("🚀 Running pipeline: {}", request.agent_ids.join(" → "));
    let response = client
        .post(format!("{base}/api/pipeline"))
        .json(&request)
        .send()
        .await?;
    let status = response.status();
    let body: Value = response.json().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(if status.is_success() { 0 } else { 1 });
    }

    // Requests rejected before any stage ran carry only an error
    if body.get("runId").is_none() {
        let error = body["error"].as_str().unwrap_or("unknown error");
        eprintln!("❌ Request rejected ({status}): {error}");
        return Ok(1);
    }

    let result: PipelineResponse = serde_json::from_value(body)?;
    for (index, stage) in result.run.stages.iter().enumerate() {
        let marker = match stage.status {
            StageStatus::Succeeded => "✅",
            StageStatus::Failed => "❌",
            StageStatus::Running => "⏳",
            StageStatus::Pending => "⏸️",
        };
        println!("\n{marker} Stage {} - {}", index + 1, stage.agent_id);
        if let Some(output) = &stage.output {
            println!("{output}");
        }
    }

    match (result.final_output, result.error) {
        (Some(_), _) => {
            println!("\n✅ Pipeline {} succeeded", result.run.run_id);
            Ok(0)
        }
        (None, Some(error)) => {
            eprintln!("\n❌ Pipeline {} failed: {error}", result.run.run_id);
            Ok(1)
        }
        (None, None) => {
            eprintln!("\n⚠️  Pipeline {} ended as {:?}", result.run.run_id, result.run.state);
            Ok(1)
        }
    }
}
