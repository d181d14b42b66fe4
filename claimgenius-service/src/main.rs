use claimgenius_service::{
    Config, create_app,
    telemetry::{LogSettings, init_tracing},
};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; real environment variables win
    dotenvy::dotenv().ok();
    init_tracing(&LogSettings::from_env());

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let app = create_app(&config).await?;
    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("ClaimGenius starting on http://{}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Claim endpoint: POST http://{}/claims", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
