use std::sync::Arc;

use async_trait::async_trait;
use lavaqueue::{
    commands::{self, Command, CommandContext},
    common::types::{AnyResult, TextChannelId, VoiceChannelId},
    configs::Config,
    engine::{LoopbackEngine, TextSink},
    log_println,
    orchestrator::Orchestrator,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Prints session notifications to the console.
struct ConsoleSink {
    channel: TextChannelId,
}

#[async_trait]
impl TextSink for ConsoleSink {
    async fn send(&self, message: &str) -> AnyResult<()> {
        log_println!("{} {}", self.channel, message);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Using built-in defaults: {}", e);
        Config::default()
    });
    lavaqueue::common::logger::init(&config);

    log_println!(
        "lavaqueue {} ({}@{})",
        env!("CARGO_PKG_VERSION"),
        option_env!("GIT_BRANCH").unwrap_or("unknown"),
        option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown")
    );

    let (engine, events) = LoopbackEngine::new(config.loopback.clone());
    let orchestrator = Orchestrator::new(engine.clone(), config.player.clone());
    let feed = tokio::spawn(orchestrator.clone().run(events));

    let text_channel = TextChannelId(config.console.text_channel);
    let ctx = CommandContext {
        voice_channel: VoiceChannelId(config.console.voice_channel),
        text_channel,
        sink: Arc::new(ConsoleSink {
            channel: text_channel,
        }),
    };

    info!(
        "Console ready on voice channel {}, type `help` for commands",
        ctx.voice_channel
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let reply = match Command::parse(&line) {
                        Ok(command) => commands::execute(&orchestrator, engine.as_ref(), &ctx, command).await,
                        Err(e) => e.to_string(),
                    };
                    log_println!("> {}", reply);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read from stdin: {}", e);
                    break;
                }
            },
        }
    }

    orchestrator.leave_all().await;
    drop(engine);
    feed.abort();
    info!("Bye");
    Ok(())
}
