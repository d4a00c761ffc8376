use std::sync::Arc;

use dotenvy::dotenv;
use log::info;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use growserver::api_router::configure_api_routes;
use growserver::config::AppConfig;
use growserver::shared::state::AppState;
use growserver::shared::utils::create_conn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env()?;
    let conn = create_conn(&config.database.url, config.database.pool_size)?;

    let state = Arc::new(AppState {
        conn,
        config: config.clone(),
    });

    let app = configure_api_routes()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("growserver listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
