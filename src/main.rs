use tracing_subscriber::EnvFilter;

use fintrack_server::config::Config;
use fintrack_server::{AppState, database, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let db = database::init_db(&config.data_path).await?;

    let app = router(AppState::new(db));

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server running on http://{bind_address}");

    axum::serve(listener, app).await?;
    Ok(())
}
