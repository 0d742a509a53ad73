use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use sori::notify::DesktopNotifier;
use sori::{
    ConfigManager, DEFAULT_LOG_LEVEL, FallbackRecorder, ListenerOptions, ListeningController,
    MicCapture, SttClient, SttConfig, VERSION,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SORI_LOG")
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL)),
        )
        .init();

    // Load config
    let config_manager = ConfigManager::new()?;
    let mut config = config_manager.load()?;
    // save back the config to create the file if it doesn't exist
    config_manager.save(&config)?;
    if let Ok(api_url) = env::var("SORI_API_URL") {
        config.api_url = Some(api_url);
    }
    info!(version = VERSION, config_path = ?config_manager.config_path(), api_url = config.api_url(), "Sori starting");

    // Native hosts have no continuous recognition engine, so answers are
    // recorded in clips and transcribed by the quiz service.
    let transcriber = SttClient::new(
        SttConfig::new(config.api_url()).with_timeout(config.upload_timeout()),
    )
    .context("Failed to create transcription client")?;
    let capture = MicCapture::new().keep_warm(config.keep_mic_warm);
    let recorder = FallbackRecorder::new(
        Arc::new(capture),
        Arc::new(transcriber),
        config.clip_duration(),
    );

    let controller = ListeningController::builder(ListenerOptions::from_config(&config))
        .fallback(recorder)
        .notifier(Arc::new(DesktopNotifier::new()))
        .on_answer(|digits| println!("{}", digits))
        .build()?;

    // Log listening indicator changes
    let mut listening = controller.subscribe();
    tokio::spawn(async move {
        while listening.changed().await.is_ok() {
            let active = *listening.borrow_and_update();
            info!(listening = active, "Listening changed");
        }
    });

    controller.start_listening();
    info!("Speak an answer; press Ctrl-C to quit");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl-C")?;

    controller.shutdown();
    info!("Sori stopped");
    Ok(())
}
