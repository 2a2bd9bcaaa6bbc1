//! sight-assist: voice-driven camera assistant
//!
//! Listens for spoken commands, opens the camera on request, describes what
//! it sees and answers free-form questions out loud. Runs with:
//! - A line-based recognizer on stdin standing in for the microphone
//! - A replay camera serving frames from a directory
//! - A label model reading per-frame detection sidecars
//! - An IPC server reporting session status to displays

mod camera;
mod config;
mod detection;
mod events;
mod intent;
mod ipc;
mod lifecycle;
mod qa;
mod session;
mod speech;

#[cfg(test)]
mod testing;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::camera::{CameraSession, DirectoryCamera};
use crate::config::Config;
use crate::detection::{DetectionAggregator, LabelModelLoader};
use crate::events::SessionEvent;
use crate::ipc::Server;
use crate::lifecycle::{wait_for_shutdown, ShutdownSignal};
use crate::qa::QaBridge;
use crate::session::{Components, SessionMachine};
use crate::speech::{CommandSynth, LineRecognizer, PrintSynth, SpeechSynth, UtteranceSpeaker};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "sight-assist starting");

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.frames_dir, qa = ?config.qa, "configuration loaded");

    if !config.qa.is_configured() {
        warn!("no API key configured, questions will not be answered");
    }

    let shutdown = ShutdownSignal::new();

    // Session machine -> displays
    let (event_tx, _event_rx) = broadcast::channel::<SessionEvent>(64);
    // Recognizer -> session machine
    let (recognition_tx, recognition_rx) = mpsc::channel(32);

    let recognizer = LineRecognizer::stdin(recognition_tx)?;

    let components = Components {
        camera: CameraSession::new(
            Box::new(DirectoryCamera::new(&config.frames_dir)),
            event_tx.clone(),
        ),
        detector: DetectionAggregator::new(Box::new(LabelModelLoader::new(&config.model_path))),
        speaker: UtteranceSpeaker::new(build_synth(config.speech_command.as_deref()), event_tx.clone()),
        qa: QaBridge::new(config.qa.clone()),
    };

    let mut machine = SessionMachine::new(Box::new(recognizer), components, event_tx.clone());

    let server = Server::new(&config.socket_path, event_tx.clone())?;

    let mut status_rx = event_tx.subscribe();
    let mut console_rx = event_tx.subscribe();
    tokio::spawn(async move {
        loop {
            match console_rx.recv().await {
                Ok(event) => render(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "console renderer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    info!("assistant initialized, say \"help\" for commands");

    // Main event loop
    tokio::select! {
        // Run the session machine (processes recognition events)
        _ = machine.run(recognition_rx) => {
            info!("speech input closed");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the status snapshot in step with the session
        _ = async {
            loop {
                match status_rx.recv().await {
                    Ok(event) => server.apply(&event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "status event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("status event handler exited");
        }

        // Wait for shutdown signal
        _ = wait_for_shutdown(shutdown) => {
            info!("shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    machine.shutdown();
    server.shutdown().await;

    info!("sight-assist stopped");

    Ok(())
}

/// External speech program when configured, stdout otherwise
fn build_synth(command: Option<&str>) -> Box<dyn SpeechSynth> {
    match command.map(CommandSynth::parse) {
        Some(Ok(synth)) => Box::new(synth),
        Some(Err(e)) => {
            warn!(?e, "invalid speech command, printing utterances instead");
            Box::new(PrintSynth)
        }
        None => Box::new(PrintSynth),
    }
}

/// Echo the status line and result area to the terminal
fn render(event: &SessionEvent) {
    match event {
        SessionEvent::StatusChanged { text, .. } => eprintln!("[{text}]"),
        SessionEvent::ResultShown { text } => println!("{text}"),
        SessionEvent::CommandIgnored { transcript } => eprintln!("[busy, ignored \"{transcript}\"]"),
        _ => {}
    }
}
