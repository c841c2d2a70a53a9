//! HTTP endpoint for Prometheus scraping.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness probe |

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;

use spotprio_metrics::SpotGauges;

pub fn build_router(gauges: SpotGauges) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .route("/healthz", get(healthz))
        .with_state(gauges)
}

async fn prometheus_metrics(State(gauges): State<SpotGauges>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        gauges.render().await,
    )
}

async fn healthz() -> &'static str {
    "ok"
}
