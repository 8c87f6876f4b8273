use anyhow::Result;
use tollbooth::config::{LogFormat, Settings};
use tollbooth::infrastructure::log_messages::application as log_msg;
use tollbooth::Application;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.logging.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }

    info!(
        environment = %settings.application.environment,
        "{}",
        log_msg::STARTING
    );

    let app = Application::new(settings).await?;
    app.run().await?;

    Ok(())
}
