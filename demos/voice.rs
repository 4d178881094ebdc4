use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing_subscriber::fmt::time::ChronoLocal;
use voice_session::types::audio::Voice;
use voice_session::{Phase, Role, SessionCallbacks, SessionConfig, Settings, TranscriptHistory, VoiceSession};

/// Prints the conversation as it happens and keeps the finished turns.
struct Console {
    history: Arc<Mutex<TranscriptHistory>>,
}

impl Console {
    fn record(&self, role: Role, text: &str) {
        if let Ok(mut history) = self.history.lock() {
            history.record(role, text);
        }
    }
}

impl SessionCallbacks for Console {
    fn on_user_turn_complete(&self, text: &str) {
        println!("you: {}", text);
        self.record(Role::User, text);
    }

    fn on_ai_turn_complete(&self, text: &str) {
        println!("ai:  {}", text);
        self.record(Role::Assistant, text);
    }

    fn on_interrupted(&self) {
        println!("(interrupted)");
    }

    fn on_speaking_state_change(&self, speaking: bool) {
        tracing::debug!(speaking, "speaking state changed");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::from_env().context("Failed to load settings")?;

    tracing_subscriber::fmt()
        .with_max_level(settings.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    let history = Arc::new(Mutex::new(TranscriptHistory::new()));
    let callbacks = Arc::new(Console {
        history: history.clone(),
    });

    let config = SessionConfig::builder()
        .with_instructions("You are a friendly assistant. Keep your answers short.")
        .with_voice(Voice::Puck)
        .with_input_device(settings.input_device.clone())
        .with_output_device(settings.output_device.clone())
        .build();

    let mut session = VoiceSession::new();
    session.connect(config, callbacks).await.context("Failed to start session")?;
    println!("connected, start talking. Press Ctrl-C to stop.");

    let mut states = session.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                tracing::info!("session: {:?}", state.phase());
                if let Some(error) = state.error() {
                    eprintln!("{}", error);
                    break;
                }
                if !state.phase().is_connected() && state.phase() != Phase::Connecting {
                    break;
                }
            }
        }
    }

    session.disconnect().await;

    if let Ok(history) = history.lock() {
        println!("\n--- transcript ({} entries) ---", history.len());
        for entry in history.entries() {
            println!("[{}] {:?}: {}", entry.timestamp().format("%H:%M:%S"), entry.role(), entry.text());
        }
    }
    Ok(())
}
