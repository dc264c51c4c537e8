use sheet_progress::config::AppConfig;
use sheet_progress::run;
use sheet_progress::state::AppState;
use tracing::{debug, error};

#[cfg(debug_assertions)]
use dotenv::dotenv;

#[tokio::main]
async fn main() {
    #[cfg(debug_assertions)]
    dotenv().ok();

    tracing_subscriber::fmt::init();

    let config = match AppConfig::from_env().with_assets_from_env().await {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load config: {:#}", e);
            std::process::exit(1);
        }
    };
    debug!("config: {:?}", config);

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            error!("failed to prepare app state: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(state).await {
        error!("failed to start app: {}", e);
    }
}
