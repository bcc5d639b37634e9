use crate::{
    config::{Config, ServerConfig},
    routes::{api_routes, ErrorBody, INTERNAL_ERROR_DETAIL},
    storage::FileStore,
    telemetry::Metrics,
    vision::VisionClient,
};
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::{any::Any, sync::Arc};
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct SharedState {
    pub file_store: Arc<FileStore>,
    pub vision_client: Arc<dyn VisionClient>,
    pub metrics: Arc<Metrics>,
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(state: SharedState, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();
        let router = build_router(state, &config.server);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        mut shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    shutdown_rx.recv().await.ok();
                    tracing::info!("HTTP server shutting down");
                })
                .await?;
            Ok(())
        });

        Ok(server_handle)
    }
}

pub fn build_router(state: SharedState, config: &ServerConfig) -> Router {
    let body_limit = match config.max_body_bytes {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };
    let metrics_layer = HttpMetricsLayerBuilder::new().build();

    Router::new()
        .merge(api_routes())
        .with_state(state)
        .layer(body_limit)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(metrics_layer)
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!("Request handler panicked: {}", message);

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            detail: INTERNAL_ERROR_DETAIL.to_string(),
        }),
    )
        .into_response()
}
