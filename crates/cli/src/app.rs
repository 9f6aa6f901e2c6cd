//! Application wiring and the inbound event loop.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use tracing::{error, info, warn};

use tutorbot_backends::{ChatSessionBackend, GeminiBackend};
use tutorbot_channels::{TelegramChannel, TelegramConfig};
use tutorbot_config::{AppConfig, ConversationMode};
use tutorbot_core::{Backend, BotCommand, ConversationStore, Frontend, InboundEvent};
use tutorbot_relay::{RateLimiter, TurnOrchestrator};
use tutorbot_session::{HandleStore, TranscriptStore};

const WELCOME_TEXT: &str = "\
🎓 Welcome to Tutorbot!

Your personal AI study companion. I can:
• Answer questions about any subject
• Explain complex topics step by step
• Guide you through assignments (I'll guide you, not just give answers!)
• 📸 Analyze images of diagrams, equations, or notes

Commands:
/start - Show this welcome message
/clear - Clear conversation history
/help - Get help on how to use me

Just send me your question or image and I'll do my best to help! 📚";

const HELP_TEXT: &str = "\
📖 How to use Tutorbot:

1️⃣ Ask questions naturally:
   \"What is photosynthesis?\"
   \"Explain Newton's laws of motion\"

2️⃣ Request step-by-step solutions:
   \"How do I solve quadratic equations?\"

3️⃣ 📸 Send images:
   • Mathematical equations
   • Diagrams and charts
   • Handwritten notes
   Add a caption with your question about the image!

💡 Tips:
• Be specific with your questions
• I remember our conversation, so you can ask follow-up questions
• Use /clear to start a new topic

Happy studying! 📚✨";

const CLEARED_TEXT: &str = "✅ Conversation history cleared! Starting fresh.";

/// Load and validate the configuration, then print a summary.
pub fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = AppConfig::load(path).context("Failed to load configuration")?;
    config.validate().context("Configuration is invalid")?;
    println!("Configuration OK: {config:#?}");
    Ok(())
}

/// Wire everything up and run the bot until interrupted.
pub async fn run(path: &Path) -> anyhow::Result<()> {
    let config = AppConfig::load(path).context("Failed to load configuration")?;
    config.validate().context("Configuration is invalid")?;

    let channel = Arc::new(build_channel(&config));
    let orchestrator = Arc::new(build_orchestrator(&config, channel.clone()));

    info!(
        model = %config.backend.model,
        mode = ?config.backend.mode,
        "Starting tutorbot"
    );

    let mut events = channel
        .start()
        .await
        .context("Failed to start Telegram polling")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                channel.stop().await.ok();
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    warn!("Event stream closed, shutting down");
                    break;
                };
                match event {
                    Ok(InboundEvent::Command { user_id, chat_id, command }) => {
                        let reply = match command {
                            BotCommand::Start => {
                                orchestrator.touch(&user_id).await;
                                info!(user = %user_id, "User started the bot");
                                WELCOME_TEXT
                            }
                            BotCommand::Clear => {
                                orchestrator.reset(&user_id).await;
                                info!(user = %user_id, "User cleared conversation history");
                                CLEARED_TEXT
                            }
                            BotCommand::Help => HELP_TEXT,
                        };
                        if let Err(e) = channel.send(&chat_id, reply).await {
                            error!(user = %user_id, error = %e, "Failed to send command reply");
                        }
                    }
                    Ok(InboundEvent::Turn(request)) => {
                        let orchestrator = Arc::clone(&orchestrator);
                        tokio::spawn(async move {
                            let user = request.user_id.clone();
                            if let Err(e) = orchestrator.process(request).await {
                                error!(user = %user, error = %e, "Turn processing failed");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Inbound event error");
                    }
                }
            }
        }
    }

    Ok(())
}

fn build_channel(config: &AppConfig) -> TelegramChannel {
    let mut tg = TelegramConfig::new(config.telegram.bot_token.clone());
    tg.poll_timeout_secs = config.telegram.poll_timeout_secs;
    TelegramChannel::new(tg)
}

fn build_orchestrator(config: &AppConfig, frontend: Arc<dyn Frontend>) -> TurnOrchestrator {
    let gemini: Arc<dyn Backend> = Arc::new(
        GeminiBackend::new(config.backend.api_key.clone()).with_model(config.backend.model.clone()),
    );

    // In chat mode the backend holds the dialog and the store only tracks
    // session handles; in transcript mode the store holds the dialog and
    // the backend stays stateless.
    let (backend, store): (Arc<dyn Backend>, Arc<dyn ConversationStore>) =
        match config.backend.mode {
            ConversationMode::Transcript => (
                gemini,
                Arc::new(TranscriptStore::with_cap(config.relay.history_cap)),
            ),
            ConversationMode::Chat => (
                Arc::new(ChatSessionBackend::new(
                    gemini,
                    config.relay.instruction.clone(),
                )),
                Arc::new(HandleStore::new()),
            ),
        };

    TurnOrchestrator::new(backend, frontend, store, config.relay.instruction.clone())
        .with_limiter(RateLimiter::new(
            config.relay.max_requests,
            config.relay.window_seconds,
        ))
        .with_max_fragment_len(config.relay.max_fragment_len)
        .with_history_window(config.relay.history_window)
}
