use companion_twitch::Context;
use companion_twitch::config::{ConfigFile, Settings};
use eyre::Context as _;
use std::io::IsTerminal;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.json".to_string());
    let file = ConfigFile::new(&path);
    let config = file.load().await.context("load configuration")?;

    let ctx = Context::new(Settings::default(), config.clone(), file.saver())
        .await
        .context("set up adapter")?;
    ctx.start().await.context("start adapter")?;

    if !ctx.auth.tokens().is_complete().await {
        let scopes = config.requested_scopes();
        if let Some(device) = ctx.auth.generate_device_code(&scopes).await {
            eprintln!(
                "To authorize, open {} and enter the code {}",
                device.verification_uri, device.user_code
            );
            if let Err(e) = webbrowser::open(&device.verification_uri) {
                tracing::warn!(error = %e, "could not open browser");
            }
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("wait for Ctrl-C")?;
    tracing::info!("shutting down");
    ctx.shutdown().await;
    Ok(())
}
