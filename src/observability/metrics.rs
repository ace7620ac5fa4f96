//! Thread-safe metrics collection system
//!
//! Provides atomic counters and mutex-protected collections for tracking
//! pipeline runs and per-agent dispatch statistics.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Keep at most this many timing samples per series
const MAX_TIMING_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics and mutexes
pub struct MetricsCollector {
    // Pipeline run metrics
    runs_started: AtomicU64,
    runs_active: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    runs_cancelled: AtomicU64,
    runs_rejected: AtomicU64,

    // Dispatch metrics
    unknown_agent_rejections: AtomicU64,

    // Run durations in milliseconds
    run_durations: Mutex<Vec<u64>>,

    // Per-agent statistics
    agent_stats: Mutex<HashMap<String, AgentDispatchStats>>,

    // Lifecycle metrics
    service_state: Mutex<String>,
    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_active: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            runs_cancelled: AtomicU64::new(0),
            runs_rejected: AtomicU64::new(0),
            unknown_agent_rejections: AtomicU64::new(0),
            run_durations: Mutex::new(Vec::new()),
            agent_stats: Mutex::new(HashMap::new()),
            service_state: Mutex::new("initializing".to_string()),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // Pipeline run metrics
    pub fn run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        self.runs_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn run_succeeded(&self, duration: Duration) {
        self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        self.finish_run(duration);
    }

    pub fn run_failed(&self, duration: Duration) {
        self.runs_failed.fetch_add(1, Ordering::Relaxed);
        self.finish_run(duration);
    }

    pub fn run_cancelled(&self, duration: Duration) {
        self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
        self.finish_run(duration);
    }

    /// A run refused before any stage was created
    pub fn run_rejected(&self) {
        self.runs_rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn finish_run(&self, duration: Duration) {
        // Saturating so a reset between start and finish cannot wrap the gauge
        let _ = self
            .runs_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });

        if let Ok(mut durations) = self.run_durations.lock() {
            push_bounded(&mut durations, duration.as_millis() as u64);
        }
    }

    // Dispatch metrics
    pub fn unknown_agent_rejected(&self) {
        self.unknown_agent_rejections
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn dispatch_started(&self, agent_id: &str) {
        if let Ok(mut stats) = self.agent_stats.lock() {
            Self::get_or_create_agent_stats(&mut stats, agent_id).calls += 1;
        }
    }

    pub fn dispatch_succeeded(&self, agent_id: &str, elapsed_ms: u64) {
        self.record_dispatch(agent_id, elapsed_ms, true);
    }

    pub fn dispatch_failed(&self, agent_id: &str, elapsed_ms: u64) {
        self.record_dispatch(agent_id, elapsed_ms, false);
    }

    fn record_dispatch(&self, agent_id: &str, elapsed_ms: u64, success: bool) {
        if let Ok(mut stats) = self.agent_stats.lock() {
            let agent_stats = Self::get_or_create_agent_stats(&mut stats, agent_id);
            agent_stats.last_call = current_timestamp();
            push_bounded(&mut agent_stats.latencies, elapsed_ms);
            if !success {
                agent_stats.failures += 1;
            }
        }
    }

    /// Create or retrieve agent stats entry
    fn get_or_create_agent_stats<'a>(
        stats: &'a mut HashMap<String, AgentDispatchStats>,
        agent_id: &str,
    ) -> &'a mut AgentDispatchStats {
        stats
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentDispatchStats {
                calls: 0,
                failures: 0,
                latencies: Vec::new(),
                last_call: 0,
            })
    }

    // Lifecycle metrics
    pub fn set_service_state(&self, state: &str) {
        if let Ok(mut current_state) = self.service_state.lock() {
            if *current_state != state {
                *current_state = state.to_string();
            }
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.runs_started,
            &self.runs_active,
            &self.runs_succeeded,
            &self.runs_failed,
            &self.runs_cancelled,
            &self.runs_rejected,
            &self.unknown_agent_rejections,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut durations) = self.run_durations.lock() {
            durations.clear();
        }
        if let Ok(mut stats) = self.agent_stats.lock() {
            stats.clear();
        }
        if let Ok(mut state) = self.service_state.lock() {
            *state = "initializing".to_string();
        }
    }

    /// Calculate run duration statistics (avg, p50, p95, p99)
    fn calculate_run_duration_statistics(&self) -> (f64, f64, f64, f64) {
        let Ok(durations) = self.run_durations.lock() else {
            return (0.0, 0.0, 0.0, 0.0);
        };
        if durations.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let mut sorted = durations.clone();
        sorted.sort_unstable();
        let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
        (
            avg,
            percentile(&sorted, 50.0),
            percentile(&sorted, 95.0),
            percentile(&sorted, 99.0),
        )
    }

    /// Create agent statistics snapshot (pure function)
    fn create_agent_snapshot(stats: &AgentDispatchStats) -> AgentStatsSnapshot {
        let avg_latency_ms = if stats.latencies.is_empty() {
            0.0
        } else {
            stats.latencies.iter().sum::<u64>() as f64 / stats.latencies.len() as f64
        };

        let success_rate = if stats.calls == 0 {
            0.0
        } else {
            stats.calls.saturating_sub(stats.failures) as f64 / stats.calls as f64
        };

        AgentStatsSnapshot {
            calls: stats.calls,
            failures: stats.failures,
            avg_latency_ms,
            last_call: stats.last_call,
            success_rate,
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg_duration_ms, p50, p95, p99) = self.calculate_run_duration_statistics();

        let agents = self
            .agent_stats
            .lock()
            .map(|stats| {
                stats
                    .iter()
                    .map(|(id, s)| (id.clone(), Self::create_agent_snapshot(s)))
                    .collect()
            })
            .unwrap_or_default();

        let current_state = self
            .service_state
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| "unknown".to_string());

        MetricsSnapshot {
            runs: RunMetrics {
                started: self.runs_started.load(Ordering::Relaxed),
                active: self.runs_active.load(Ordering::Relaxed),
                succeeded: self.runs_succeeded.load(Ordering::Relaxed),
                failed: self.runs_failed.load(Ordering::Relaxed),
                cancelled: self.runs_cancelled.load(Ordering::Relaxed),
                rejected: self.runs_rejected.load(Ordering::Relaxed),
                avg_duration_ms,
                duration_p50_ms: p50,
                duration_p95_ms: p95,
                duration_p99_ms: p99,
            },
            dispatch: DispatchMetrics {
                unknown_agent_rejections: self.unknown_agent_rejections.load(Ordering::Relaxed),
                agents,
            },
            lifecycle: LifecycleMetrics {
                current_state,
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Internal per-agent statistics (with timing data)
#[derive(Debug)]
struct AgentDispatchStats {
    calls: u64,
    failures: u64,
    latencies: Vec<u64>,
    last_call: u64,
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub runs: RunMetrics,
    pub dispatch: DispatchMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct RunMetrics {
    pub started: u64,
    pub active: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub rejected: u64,
    pub avg_duration_ms: f64,
    pub duration_p50_ms: f64,
    pub duration_p95_ms: f64,
    pub duration_p99_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct DispatchMetrics {
    pub unknown_agent_rejections: u64,
    pub agents: HashMap<String, AgentStatsSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct AgentStatsSnapshot {
    pub calls: u64,
    pub failures: u64,
    pub avg_latency_ms: f64,
    pub last_call: u64,
    pub success_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub current_state: String,
    pub uptime_seconds: u64,
}

// Helper functions
fn push_bounded(samples: &mut Vec<u64>, value: u64) {
    samples.push(value);
    if samples.len() > MAX_TIMING_SAMPLES {
        samples.remove(0);
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower_index = index.floor() as usize;
        let upper_index = index.ceil() as usize;
        let lower_value = sorted_data[lower_index] as f64;
        let upper_value = sorted_data[upper_index] as f64;

        lower_value + (upper_value - lower_value) * index.fract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_run_metrics() {
        let collector = MetricsCollector::new();

        collector.run_started();
        collector.run_succeeded(Duration::from_millis(1500));
        collector.run_started();
        collector.run_failed(Duration::from_millis(500));
        collector.run_rejected();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.runs.started, 2);
        assert_eq!(metrics.runs.active, 0);
        assert_eq!(metrics.runs.succeeded, 1);
        assert_eq!(metrics.runs.failed, 1);
        assert_eq!(metrics.runs.rejected, 1);
        assert!((metrics.runs.avg_duration_ms - 1000.0).abs() < 0.1);
    }

    #[test]
    fn test_agent_dispatch_metrics() {
        let collector = MetricsCollector::new();

        collector.dispatch_started("summary");
        collector.dispatch_succeeded("summary", 500);
        collector.dispatch_started("summary");
        collector.dispatch_failed("summary", 300);

        let metrics = collector.get_metrics();
        let summary = metrics.dispatch.agents.get("summary").unwrap();
        assert_eq!(summary.calls, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.success_rate, 0.5);
        assert!((summary.avg_latency_ms - 400.0).abs() < 0.1);
    }

    #[test]
    fn test_thread_safety() {
        let collector = Arc::new(MetricsCollector::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let collector = Arc::clone(&collector);
                thread::spawn(move || {
                    for _ in 0..100 {
                        collector.run_started();
                        collector.dispatch_started("writer");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let metrics = collector.get_metrics();
        assert_eq!(metrics.runs.started, 1000);
        assert_eq!(metrics.dispatch.agents["writer"].calls, 1000);
    }

    #[test]
    fn test_percentile_calculation() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        assert!((percentile(&data, 50.0) - 5.5).abs() < 0.1);
        assert!((percentile(&data, 95.0) - 9.5).abs() < 0.1);
        assert!((percentile(&data, 0.0) - 1.0).abs() < 0.1);
        assert!((percentile(&data, 100.0) - 10.0).abs() < 0.1);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_timing_samples_are_bounded() {
        let mut samples = Vec::new();
        for i in 0..1500 {
            push_bounded(&mut samples, i);
        }
        assert_eq!(samples.len(), MAX_TIMING_SAMPLES);
        assert_eq!(samples[0], 500);
    }

    #[test]
    fn test_reset_functionality() {
        let collector = MetricsCollector::new();

        collector.run_started();
        collector.unknown_agent_rejected();
        collector.dispatch_started("research");
        collector.set_service_state("running");

        collector.reset();

        let metrics = collector.get_metrics();
        assert_eq!(metrics.runs.started, 0);
        assert_eq!(metrics.dispatch.unknown_agent_rejections, 0);
        assert!(metrics.dispatch.agents.is_empty());
        assert_eq!(metrics.lifecycle.current_state, "initializing");
    }
}
