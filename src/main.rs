use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use metagent::AppCore;
use metagent::api;
use metagent::config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let addr = format!("{}:{}", settings.host, settings.port);
    let core = AppCore::new(settings)?;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", api::router())
        .layer(cors)
        .with_state(core.app_state());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("metagent listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
