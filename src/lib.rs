pub mod config;
mod routes;
pub mod sheet;
pub mod state;
pub mod task;

use axum::{
    extract::{DefaultBodyLimit, Request},
    http::HeaderValue,
    routing::{get, post},
    Router, ServiceExt,
};
use routes::process;
use state::AppState;
use std::{net::SocketAddr, str::FromStr, sync::Arc};
use task::sweep::spawn_sweeper;
use tower::{Layer, ServiceBuilder};
use tower_http::cors::{Any, CorsLayer};
use tower_http::{normalize_path::NormalizePathLayer, trace::TraceLayer};
use utoipa_rapidoc::RapiDoc;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_headers(Any).allow_methods(Any);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin `{}`", origin);
                None
            }
        })
        .collect::<Vec<_>>();

    layer.allow_origin(origins)
}

/// Route table of the service, without the outer path normalization.
pub fn router(app_state: AppState) -> Router {
    let config = app_state.config().clone();
    let paths = &config.routes;

    let task_routes = Router::new()
        .route(&format!("/{}", paths.process), post(process::submit))
        .route(&format!("/{}", paths.progress), get(process::progress))
        .route(&format!("/{}", paths.download), get(process::download))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes));

    let docs = RapiDoc::with_openapi("/api-docs/openapi.json", routes::openapi(paths))
        .path("/rapidoc");

    Router::new()
        .merge(task_routes)
        .merge(docs)
        .route("/health_check", get(routes::health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .layer(cors_layer(&config.cors_origins))
        .with_state(Arc::new(app_state))
}

pub async fn run(app_state: AppState) -> anyhow::Result<()> {
    let config = app_state.config().clone();

    if let Some(ttl) = config.task_ttl {
        spawn_sweeper(
            app_state.task_registry(),
            app_state.output_target().clone(),
            ttl,
            config.sweep_interval,
        );
    }

    let app = NormalizePathLayer::trim_trailing_slash().layer(router(app_state));

    let addr = SocketAddr::from_str(format!("{}:{}", &config.host, &config.port).as_str())?;

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);
    tracing::info!(
        "routes: POST /{}, GET /{}, GET /{}",
        config.routes.process,
        config.routes.progress,
        config.routes.download
    );

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(signal_shutdown())
        .await?;

    Ok(())
}

async fn signal_shutdown() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("signal shutdown");
}
