use anyhow::Result;
use telebridge::{Deployment, Settings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;
    init_tracing(&settings.logging.level);

    let deployment = Deployment::from_env()?;
    tracing::info!(
        "Starting telebridge (storage: {})",
        deployment.storage_type
    );

    telebridge::run(settings, deployment, shutdown_signal()).await
}

/// `RUST_LOG` wins; otherwise the configured level, with HTTP and driver
/// internals kept at warn.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},hyper=warn,reqwest=warn,mongodb=warn", level))
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
