use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

use voicelink::audio::{CaptureConfig, CpalSpeaker, MicCapture, PlaybackScheduler, WavTap};
use voicelink::session::{AgentSession, LiveConfig, WsSession};
use voicelink::widget::{navigation, AssistantStatus, VoiceWidget};
use voicelink::Config;

#[derive(Parser, Debug)]
#[command(
    name = "voicelink",
    about = "Stream the microphone to a conversational agent and play its replies"
)]
struct Cli {
    /// Configuration file (without extension)
    #[arg(long, default_value = "config/voicelink")]
    config: String,

    /// Override the model identifier
    #[arg(long)]
    model: Option<String>,

    /// Override the synthesis voice
    #[arg(long)]
    voice: Option<String>,

    /// Record the outgoing microphone stream to a WAV file in this directory
    #[arg(long)]
    record: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;
    if let Some(model) = cli.model {
        cfg.agent.model = model;
    }
    if let Some(voice) = cli.voice {
        cfg.agent.voice = voice;
    }
    let api_key = cfg.api_key()?.to_string();

    info!("voicelink v0.1.0");
    info!("Agent endpoint: {}", cfg.agent.endpoint);
    info!("Model: {} (voice: {})", cfg.agent.model, cfg.agent.voice);

    let speaker = CpalSpeaker::start(cfg.audio.playback_sample_rate)?;
    let (scheduler, drained_rx) = PlaybackScheduler::new(Arc::new(speaker));

    let capture = Box::new(MicCapture::new(CaptureConfig {
        sample_rate: cfg.audio.capture_sample_rate,
        block_size: cfg.audio.capture_block_size,
    }));

    let tap = match &cli.record {
        Some(dir) => {
            let filename = format!(
                "voicelink-{}.wav",
                chrono::Utc::now().format("%Y%m%d-%H%M%S")
            );
            Some(WavTap::create(dir.join(filename), cfg.audio.capture_sample_rate)?)
        }
        None => None,
    };

    let mut live = LiveConfig::new(
        cfg.agent.model.clone(),
        cfg.agent.voice.clone(),
        cfg.agent.system_instruction.clone(),
    );
    live.language_codes = cfg.agent.language_codes.clone();
    live.tools.push(navigation::tool_declaration());

    let (nav_tx, mut nav_rx) = mpsc::unbounded_channel();
    let endpoint = cfg.agent.endpoint.clone();

    let widget = VoiceWidget::open(
        capture,
        move || async move {
            let (session, events) = WsSession::connect(&endpoint, &api_key, live).await?;
            Ok((Arc::new(session) as Arc<dyn AgentSession>, events))
        },
        scheduler,
        drained_rx,
        nav_tx,
        tap,
    )
    .await?;

    tokio::spawn(async move {
        while let Some(intent) = nav_rx.recv().await {
            info!("Navigation intent: show the {} view", intent.target.as_str());
        }
    });

    info!("Widget open; speak into the microphone (Ctrl-C to quit)");

    let mut status_rx = widget.status();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupt received");
        }
        _ = async {
            while status_rx.changed().await.is_ok() {
                if *status_rx.borrow() == AssistantStatus::Idle {
                    break;
                }
            }
        } => {
            info!("Widget returned to idle");
        }
    }

    widget.close().await;

    if let Some(message) = widget.last_error() {
        error!("Session ended with error: {}", message);
    }
    let stats = widget.stats();
    info!(
        "Session finished: {:.1}s, {} capture blocks sent",
        stats.duration_secs, stats.frames_sent
    );

    Ok(())
}
