//! Prometheus-compatible metrics endpoint
//!
//! Counters for the sync core: hit validation outcomes, rewind fallbacks,
//! snapshot encoding volume, correction traffic. Exposed in Prometheus
//! text format on a plain HTTP listener.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Metrics registry for the sync server
#[derive(Debug)]
pub struct SyncMetrics {
    // Combat validation
    pub attacks_validated: AtomicU64,
    pub attacks_rejected: AtomicU64,
    /// Attacks validated against present state because latency exceeded the rewind cap
    pub rewind_fallbacks: AtomicU64,
    /// Targets skipped because history had no coverage at the attack time
    pub history_misses: AtomicU64,

    // Snapshot pipeline
    pub snapshots_encoded: AtomicU64,
    pub snapshot_bytes: AtomicU64,
    pub entities_delta_skipped: AtomicU64,
    pub corrections_sent: AtomicU64,

    // Input pipeline
    pub inputs_processed: AtomicU64,
    pub inputs_dropped: AtomicU64,
    pub decode_failures: AtomicU64,

    // World
    pub entity_count: AtomicU64,
    pub connections_active: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    start_time: Instant,
    tick_history: RwLock<VecDeque<u64>>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            attacks_validated: AtomicU64::new(0),
            attacks_rejected: AtomicU64::new(0),
            rewind_fallbacks: AtomicU64::new(0),
            history_misses: AtomicU64::new(0),
            snapshots_encoded: AtomicU64::new(0),
            snapshot_bytes: AtomicU64::new(0),
            entities_delta_skipped: AtomicU64::new(0),
            corrections_sent: AtomicU64::new(0),
            inputs_processed: AtomicU64::new(0),
            inputs_dropped: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            entity_count: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(1000)),
        }
    }

    /// Record a tick duration and refresh the rolling percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();
            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            self.tick_time_p95_us
                .store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us
                .store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("sync_attacks_validated_total", "Attacks confirmed as hits", "counter",
            self.attacks_validated.load(Ordering::Relaxed));
        metric!("sync_attacks_rejected_total", "Attacks rejected or missed", "counter",
            self.attacks_rejected.load(Ordering::Relaxed));
        metric!("sync_rewind_fallbacks_total", "Attacks validated at present time (latency over cap)", "counter",
            self.rewind_fallbacks.load(Ordering::Relaxed));
        metric!("sync_history_misses_total", "Targets without history coverage at attack time", "counter",
            self.history_misses.load(Ordering::Relaxed));

        metric!("sync_snapshots_encoded_total", "Delta snapshots encoded", "counter",
            self.snapshots_encoded.load(Ordering::Relaxed));
        metric!("sync_snapshot_bytes_total", "Snapshot bytes produced", "counter",
            self.snapshot_bytes.load(Ordering::Relaxed));
        metric!("sync_entities_delta_skipped_total", "Entities omitted as unchanged", "counter",
            self.entities_delta_skipped.load(Ordering::Relaxed));
        metric!("sync_corrections_sent_total", "Authoritative corrections sent", "counter",
            self.corrections_sent.load(Ordering::Relaxed));

        metric!("sync_inputs_processed_total", "Input records applied to the simulation", "counter",
            self.inputs_processed.load(Ordering::Relaxed));
        metric!("sync_inputs_dropped_total", "Input records dropped (backpressure)", "counter",
            self.inputs_dropped.load(Ordering::Relaxed));
        metric!("sync_decode_failures_total", "Malformed packets rejected", "counter",
            self.decode_failures.load(Ordering::Relaxed));

        metric!("sync_entities", "Live entities in the world", "gauge",
            self.entity_count.load(Ordering::Relaxed));
        metric!("sync_connections_active", "Active client connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));

        metric!("sync_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("sync_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("sync_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("sync_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("sync_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<SyncMetrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];
            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = if request.starts_with("GET /metrics") {
                        let body = metrics.to_prometheus();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /health") || request.starts_with("GET /") {
                        let body = "OK";
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = SyncMetrics::new();
        assert_eq!(metrics.attacks_validated.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time_updates_percentiles() {
        let metrics = SyncMetrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) > 0);
        assert!(metrics.tick_time_max_us.load(Ordering::Relaxed) >= 1090);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = SyncMetrics::new();
        metrics.attacks_validated.store(7, Ordering::Relaxed);
        metrics.rewind_fallbacks.store(2, Ordering::Relaxed);

        let output = metrics.to_prometheus();
        assert!(output.contains("sync_attacks_validated_total 7"));
        assert!(output.contains("sync_rewind_fallbacks_total 2"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }
}
