use anyhow::Result;
use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::net::SocketAddr;
use tracing::{info, warn};

#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsHandle {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn broadcast_metrics(&self) -> Result<BroadcastMetrics> {
        BroadcastMetrics::register(&self.registry)
    }

    pub fn render(&self) -> Result<(String, Vec<u8>)> {
        render(&self.registry)
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let registry = self.registry.clone();
        let make_svc = make_service_fn(move |_| {
            let registry = registry.clone();
            async move {
                Ok::<_, hyper::Error>(service_fn(move |_req: Request<Body>| {
                    let registry = registry.clone();
                    async move { Ok::<_, hyper::Error>(metrics_response(&registry)) }
                }))
            }
        });

        let server = Server::bind(&addr).serve(make_svc);
        info!(%addr, "metrics exporter listening");
        server.await?;
        Ok(())
    }
}

fn render(registry: &Registry) -> Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

fn metrics_response(registry: &Registry) -> Response<Body> {
    match render(registry) {
        Ok((content_type, body)) => {
            let mut response = Response::new(Body::from(body));
            if let Ok(value) = content_type.parse() {
                response
                    .headers_mut()
                    .insert(hyper::header::CONTENT_TYPE, value);
            }
            response
        }
        Err(err) => {
            warn!(error = ?err, "failed to encode metrics");
            let mut response = Response::new(Body::from("metrics encoding failed"));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

/// Counters and gauges recorded by the broadcast cycle.
#[derive(Clone)]
pub struct BroadcastMetrics {
    cycles: IntCounterVec,
    skipped: IntCounterVec,
    deliveries: IntCounterVec,
    snapshot_size: IntGauge,
    cycle_duration: Histogram,
}

impl BroadcastMetrics {
    pub fn register(registry: &Registry) -> Result<Self> {
        let metrics = Self::build()?;
        registry.register(Box::new(metrics.cycles.clone()))?;
        registry.register(Box::new(metrics.skipped.clone()))?;
        registry.register(Box::new(metrics.deliveries.clone()))?;
        registry.register(Box::new(metrics.snapshot_size.clone()))?;
        registry.register(Box::new(metrics.cycle_duration.clone()))?;
        Ok(metrics)
    }

    /// Metrics that are recorded but never exported.
    pub fn detached() -> Result<Self> {
        Self::build()
    }

    fn build() -> Result<Self> {
        Ok(Self {
            cycles: IntCounterVec::new(
                Opts::new("leaderboard_cycles_total", "Executed broadcast cycles"),
                &["outcome"],
            )?,
            skipped: IntCounterVec::new(
                Opts::new(
                    "leaderboard_cycles_skipped_total",
                    "Timer fires skipped by the gap or single-flight gate",
                ),
                &["reason"],
            )?,
            deliveries: IntCounterVec::new(
                Opts::new("leaderboard_deliveries_total", "Outbound event deliveries"),
                &["path", "result"],
            )?,
            snapshot_size: IntGauge::new(
                "leaderboard_snapshot_size",
                "Users in the live ranking snapshot",
            )?,
            cycle_duration: Histogram::with_opts(HistogramOpts::new(
                "leaderboard_cycle_duration_seconds",
                "Wall time of completed broadcast cycles",
            ))?,
        })
    }

    pub fn cycle_completed(&self, seconds: f64) {
        self.cycles.with_label_values(&["completed"]).inc();
        self.cycle_duration.observe(seconds);
    }

    pub fn cycle_failed(&self) {
        self.cycles.with_label_values(&["failed"]).inc();
    }

    pub fn cycle_skipped(&self, reason: &str) {
        self.skipped.with_label_values(&[reason]).inc();
    }

    pub fn deliveries(&self, path: &str, delivered: usize, failed: usize, skipped: usize) {
        let counts = [("delivered", delivered), ("failed", failed), ("skipped", skipped)];
        for (result, count) in counts {
            if count > 0 {
                self.deliveries
                    .with_label_values(&[path, result])
                    .inc_by(count as u64);
            }
        }
    }

    pub fn set_snapshot_size(&self, size: usize) {
        self.snapshot_size.set(size as i64);
    }

    pub fn cycles_total(&self, outcome: &str) -> u64 {
        self.cycles.with_label_values(&[outcome]).get()
    }

    pub fn skipped_total(&self, reason: &str) -> u64 {
        self.skipped.with_label_values(&[reason]).get()
    }

    pub fn deliveries_total(&self, path: &str, result: &str) -> u64 {
        self.deliveries.with_label_values(&[path, result]).get()
    }
}
