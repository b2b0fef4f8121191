use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::codec;
use crate::metrics::{metrics, MetricsSnapshot};
use crate::{AdapterError, ReadTranslator, WriteTranslator};

#[derive(Clone)]
pub struct AppState {
    pub writer: WriteTranslator,
    pub reader: ReadTranslator,
}

pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/write", post(handle_write))
        .route("/read", post(handle_read))
        .route("/-/healthy", get(handle_healthy))
        .route("/api/metrics", get(handle_metrics))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM
pub async fn serve(address: &str, app: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }
}

/// Error response wrapper: status from the error class, body is the error text
struct ApiError(AdapterError);

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let m = metrics();
        let status = match &self.0 {
            AdapterError::Decode(_) => {
                m.decode_errors.inc();
                StatusCode::BAD_REQUEST
            }
            AdapterError::Compile(_) => {
                m.compile_errors.inc();
                StatusCode::BAD_REQUEST
            }
            AdapterError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AdapterError::Store(e) | AdapterError::BatchAborted { source: e, .. } => {
                m.store_errors.inc();
                if e.is_timeout() {
                    m.store_timeouts.inc();
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
        };

        if self.0.is_client_error() {
            tracing::warn!(%status, "rejected request: {}", self.0);
        } else {
            tracing::error!(%status, "request failed: {}", self.0);
        }

        (status, self.0.to_string()).into_response()
    }
}

/* =========================
HANDLERS
========================= */

async fn handle_write(State(state): State<AppState>, body: Bytes) -> Result<StatusCode, ApiError> {
    let start = Instant::now();
    let m = metrics();
    m.write_requests.inc();

    let result = async {
        let batch = codec::decode_write(&body)?;
        state.writer.write_batch(batch).await
    }
    .await;

    m.write_latency.observe(start.elapsed());
    match result {
        Ok(ack) => {
            tracing::debug!(documents = ack.documents, samples = ack.samples, "write accepted");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            m.write_failures.inc();
            Err(e.into())
        }
    }
}

async fn handle_read(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let start = Instant::now();
    let m = metrics();
    m.read_requests.inc();

    let result = async {
        let queries = codec::decode_read(&body)?;
        let results = state.reader.run(&queries).await?;
        Ok::<_, AdapterError>(codec::encode_read_response(results)?)
    }
    .await;

    m.read_latency.observe(start.elapsed());
    match result {
        Ok(payload) => Ok((
            [
                (header::CONTENT_TYPE, codec::CONTENT_TYPE),
                (header::CONTENT_ENCODING, codec::CONTENT_ENCODING),
            ],
            payload,
        )
            .into_response()),
        Err(e) => {
            m.read_failures.inc();
            Err(e.into())
        }
    }
}

async fn handle_healthy() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

async fn handle_metrics() -> Json<MetricsSnapshot> {
    Json(metrics().snapshot())
}
