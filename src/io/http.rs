//! HTTP surface - detection intake, occupancy views, and metrics
//!
//! Uses hyper for the HTTP server. Routes:
//! - `POST /api/parking/detect` - sensor detection intake
//! - `GET  /api/parking/status` - lot/zone occupancy summary
//! - `GET  /api/parking/spots`  - per-spot listing with sensor bindings
//! - `POST /api/parking/audit`  - run one consistency sweep now
//! - `POST /api/parking/reset`  - free all spots, close open sessions
//! - `GET  /health`, `GET /metrics` (Prometheus text format)

use crate::infra::metrics::{Metrics, MetricsSummary, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use crate::services::ingest::IngestError;
use crate::services::status;
use crate::services::{Auditor, ReconcileEngine, Store};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Shared handles for request handling
#[derive(Clone)]
pub struct ApiContext {
    pub engine: Arc<ReconcileEngine>,
    pub store: Arc<Store>,
    pub auditor: Arc<Auditor>,
    pub metrics: Arc<Metrics>,
    pub site_id: Arc<String>,
}

/// Inbound detection payload
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetectionRequest {
    sensor_id: String,
    /// "occupied" or "free"
    status: String,
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge) with site label
fn write_metric(
    output: &mut String,
    name: &str,
    help: &str,
    typ: MetricType,
    site: &str,
    val: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name}{{site=\"{site}\"}} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    site: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    avg: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in METRICS_BUCKET_BOUNDS.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{site=\"{site}\",le=\"+Inf\"}} {cumulative}");

    let count: u64 = buckets.iter().sum();
    let sum = avg * count;
    let _ = writeln!(output, "{name}_sum{{site=\"{site}\"}} {sum}");
    let _ = writeln!(output, "{name}_count{{site=\"{site}\"}} {count}");
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(summary: &MetricsSummary, store: &Store, site: &str) -> String {
    let mut output = String::with_capacity(4096);

    write_metric(
        &mut output,
        "parking_detections_total",
        "Total detection events processed",
        MetricType::Counter,
        site,
        summary.detections_total,
    );
    write_metric(
        &mut output,
        "parking_entries_total",
        "Sessions opened by entry events",
        MetricType::Counter,
        site,
        summary.entries_total,
    );
    write_metric(
        &mut output,
        "parking_exits_total",
        "Sessions closed by exit events",
        MetricType::Counter,
        site,
        summary.exits_total,
    );
    write_metric(
        &mut output,
        "parking_duplicate_entries_total",
        "Entry events absorbed as idempotent repeats",
        MetricType::Counter,
        site,
        summary.duplicate_entries_total,
    );
    write_metric(
        &mut output,
        "parking_exits_corrected_total",
        "Exit events that released an orphaned occupied flag",
        MetricType::Counter,
        site,
        summary.exits_corrected_total,
    );
    write_metric(
        &mut output,
        "parking_exits_ignored_total",
        "Exit events ignored on an already-free spot",
        MetricType::Counter,
        site,
        summary.exits_ignored_total,
    );
    write_metric(
        &mut output,
        "parking_errors_total",
        "Detection events that failed internally",
        MetricType::Counter,
        site,
        summary.errors_total,
    );
    write_metric(
        &mut output,
        "parking_flags_corrected_total",
        "Occupancy flags force-reset during event handling",
        MetricType::Counter,
        site,
        summary.flags_corrected_total,
    );
    write_metric(
        &mut output,
        "parking_audit_runs_total",
        "Consistency sweeps executed",
        MetricType::Counter,
        site,
        summary.audit_runs_total,
    );
    write_metric(
        &mut output,
        "parking_audit_corrections_total",
        "Spots corrected by consistency sweeps",
        MetricType::Counter,
        site,
        summary.audit_corrections_total,
    );
    write_metric(
        &mut output,
        "parking_notify_published_total",
        "Outcomes enqueued for notification",
        MetricType::Counter,
        site,
        summary.notify_published_total,
    );
    write_metric(
        &mut output,
        "parking_notify_dropped_total",
        "Outcomes dropped due to notify channel overflow",
        MetricType::Counter,
        site,
        summary.notify_dropped_total,
    );

    write_histogram(
        &mut output,
        "parking_detection_latency_us",
        "Detection handling latency in microseconds",
        site,
        &summary.lat_buckets,
        summary.lat_avg_us,
    );
    write_metric(
        &mut output,
        "parking_detection_latency_p50_us",
        "50th percentile detection latency",
        MetricType::Gauge,
        site,
        summary.lat_p50_us,
    );
    write_metric(
        &mut output,
        "parking_detection_latency_p95_us",
        "95th percentile detection latency",
        MetricType::Gauge,
        site,
        summary.lat_p95_us,
    );
    write_metric(
        &mut output,
        "parking_detection_latency_p99_us",
        "99th percentile detection latency",
        MetricType::Gauge,
        site,
        summary.lat_p99_us,
    );

    let lot = status::lot_status(store);
    write_metric(
        &mut output,
        "parking_spots_total",
        "Provisioned spots",
        MetricType::Gauge,
        site,
        lot.total_spots as u64,
    );
    write_metric(
        &mut output,
        "parking_spots_occupied",
        "Spots currently flagged occupied",
        MetricType::Gauge,
        site,
        lot.occupied_spots as u64,
    );

    output
}

fn json_response<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail"))
}

fn error_response(
    status: StatusCode,
    message: impl Into<String>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    json_response(status, &ErrorBody { error: message.into() })
}

async fn handle_detect(
    req: Request<hyper::body::Incoming>,
    ctx: &ApiContext,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("unreadable body: {e}")),
    };

    let request: DetectionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, format!("malformed request: {e}"))
        }
    };

    let timestamp = request.timestamp.unwrap_or_default();
    match ctx.engine.detect(&request.sensor_id, &request.status, &timestamp) {
        Ok(outcome) => json_response(StatusCode::OK, &outcome),
        Err(e @ IngestError::SensorNotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e @ IngestError::InvalidStatus(_)) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
    ctx: ApiContext,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, "/api/parking/detect") => handle_detect(req, &ctx).await,
        (&Method::GET, "/api/parking/status") => {
            json_response(StatusCode::OK, &status::lot_status(&ctx.store))
        }
        (&Method::GET, "/api/parking/spots") => {
            json_response(StatusCode::OK, &status::spot_statuses(&ctx.store))
        }
        (&Method::POST, "/api/parking/audit") => {
            let corrections = ctx.auditor.audit();
            json_response(StatusCode::OK, &serde_json::json!({ "corrections": corrections }))
        }
        (&Method::POST, "/api/parking/reset") => {
            let summary = ctx.engine.reset_lot(chrono::Local::now().naive_local());
            json_response(StatusCode::OK, &summary)
        }
        (&Method::GET, "/health") => Ok(Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail")),
        (&Method::GET, "/metrics") => {
            let body =
                format_prometheus_metrics(&ctx.metrics.report(), &ctx.store, &ctx.site_id);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail"))
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail")),
    }
}

/// Start the API HTTP server
pub async fn start_api_server(
    bind: &str,
    port: u16,
    ctx: ApiContext,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(bind = %bind, port = %port, site = %ctx.site_id, "api_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let ctx = ctx.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let ctx = ctx.clone();
                                async move { handle_request(req, ctx).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "api_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("api_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
