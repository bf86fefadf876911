use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use voicebridge::adapters::{AdapterSet, HttpAgentBridge, HttpSynthesizer, HttpTranscriber};
use voicebridge::http::{create_router, AppState};
use voicebridge::session::SessionRegistry;
use voicebridge::transport::WebRtcEngine;
use voicebridge::Config;

#[derive(Parser)]
#[command(name = "voicebridge")]
#[command(about = "Real-time voice session bridge between browsers and a conversational agent")]
struct Args {
    /// Config file (without extension), merged with VOICEBRIDGE_* env vars
    #[arg(long, default_value = "config/voicebridge")]
    config: String,

    /// Override the HTTP port from the config file
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;
    let port = args.port.unwrap_or(cfg.service.http.port);

    info!("{} starting", cfg.service.name);

    let client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;

    let adapters = AdapterSet {
        transcriber: Arc::new(HttpTranscriber::new(
            client.clone(),
            cfg.adapters.transcriber.url.clone(),
            cfg.adapters.transcriber.model.clone(),
            cfg.adapters.transcriber.api_key.clone(),
        )),
        agent: Arc::new(HttpAgentBridge::new(
            client.clone(),
            cfg.adapters.agent.url.clone(),
            cfg.adapters.agent.api_key.clone(),
        )),
        synthesizer: Arc::new(HttpSynthesizer::new(
            client,
            cfg.adapters.synthesizer.url.clone(),
            cfg.adapters.synthesizer.api_key.clone(),
            cfg.audio.playback_sample_rate,
            cfg.audio.channels,
            cfg.audio.frame_ms,
        )),
    };

    let registry = Arc::new(SessionRegistry::new(
        Arc::new(cfg.pipeline_config()),
        adapters,
    ));
    let engine = Arc::new(WebRtcEngine::new(cfg.webrtc_config())?);

    let state = AppState::new(Arc::clone(&registry), engine);
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Shutdown requested, draining sessions");
    registry.close_all().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
