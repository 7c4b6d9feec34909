//! Text commands on top of the orchestrator's control surface.
//!
//! [`COMMANDS`] is the single registration table: parsing resolves names and
//! aliases through it and `help` renders it. [`execute`] turns every outcome
//! into the reply shown to the user.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tracing::debug;

use crate::{
    common::{
        errors::OrchestratorError,
        types::{TextChannelId, VoiceChannelId, format_duration},
    },
    engine::{TextSink, TrackResolver},
    orchestrator::{Orchestrator, Skipped},
    protocol::{PlayerState, Track},
};

pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usage: &'static str,
    pub summary: &'static str,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "join",
        aliases: &[],
        usage: "join",
        summary: "Connects to the voice channel.",
    },
    CommandSpec {
        name: "leave",
        aliases: &[],
        usage: "leave",
        summary: "Disconnects and drops the queue.",
    },
    CommandSpec {
        name: "play",
        aliases: &["p"],
        usage: "play <query>",
        summary: "Queues tracks and starts playing if idle.",
    },
    CommandSpec {
        name: "pause",
        aliases: &[],
        usage: "pause",
        summary: "Pauses the current track.",
    },
    CommandSpec {
        name: "resume",
        aliases: &[],
        usage: "resume",
        summary: "Resumes a paused track.",
    },
    CommandSpec {
        name: "stop",
        aliases: &[],
        usage: "stop",
        summary: "Stops playback, keeping the queue.",
    },
    CommandSpec {
        name: "skip",
        aliases: &[],
        usage: "skip",
        summary: "Plays the next queued track.",
    },
    CommandSpec {
        name: "seek",
        aliases: &[],
        usage: "seek <m:ss|seconds>",
        summary: "Jumps to a position in the current track.",
    },
    CommandSpec {
        name: "volume",
        aliases: &["vol"],
        usage: "volume <0-1000>",
        summary: "Changes the player volume.",
    },
    CommandSpec {
        name: "nowplaying",
        aliases: &["np"],
        usage: "nowplaying",
        summary: "Shows the current track.",
    },
    CommandSpec {
        name: "queue",
        aliases: &["q"],
        usage: "queue",
        summary: "Lists the pending tracks.",
    },
    CommandSpec {
        name: "help",
        aliases: &["h", "?"],
        usage: "help",
        summary: "Shows this list.",
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Join,
    Leave,
    Play { query: String },
    Pause,
    Resume,
    Stop,
    Skip,
    Seek { position: Duration },
    Volume { level: u16 },
    NowPlaying,
    Queue,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Type a command, or `help` to list them.")]
    Empty,

    #[error("Unknown command `{0}`. Type `help` to list them.")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),
}

impl Command {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let raw = input.trim();
        let (head, rest) = match raw.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (raw, ""),
        };
        if head.is_empty() {
            return Err(ParseError::Empty);
        }

        let head = head.to_ascii_lowercase();
        let spec = lookup(&head).ok_or_else(|| ParseError::Unknown(head.clone()))?;

        let command = match spec.name {
            "join" => Self::Join,
            "leave" => Self::Leave,
            "play" => {
                if rest.is_empty() {
                    return Err(ParseError::Usage(spec.usage));
                }
                Self::Play {
                    query: rest.to_string(),
                }
            }
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "stop" => Self::Stop,
            "skip" => Self::Skip,
            "seek" => Self::Seek {
                position: parse_position(rest).ok_or(ParseError::Usage(spec.usage))?,
            },
            "volume" => Self::Volume {
                level: rest.parse().map_err(|_| ParseError::Usage(spec.usage))?,
            },
            "nowplaying" => Self::NowPlaying,
            "queue" => Self::Queue,
            _ => Self::Help,
        };
        Ok(command)
    }
}

fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|spec| spec.name == name || spec.aliases.iter().any(|alias| *alias == name))
}

/// Accepts `seconds`, `m:ss` or `h:mm:ss`.
fn parse_position(value: &str) -> Option<Duration> {
    if value.is_empty() {
        return None;
    }

    let mut secs: u64 = 0;
    let mut fields = 0;
    for part in value.split(':') {
        let n: u64 = part.parse().ok()?;
        if fields > 0 && n >= 60 {
            return None;
        }
        secs = secs.checked_mul(60)?.checked_add(n)?;
        fields += 1;
    }

    (fields <= 3).then(|| Duration::from_secs(secs))
}

pub fn help_text() -> String {
    let width = COMMANDS.iter().map(|c| c.usage.len()).max().unwrap_or(0);
    let mut out = String::from("Commands:");
    for spec in COMMANDS {
        out.push_str(&format!("\n  {:width$}  {}", spec.usage, spec.summary));
        if !spec.aliases.is_empty() {
            out.push_str(&format!(" (alias: {})", spec.aliases.join(", ")));
        }
    }
    out
}

/// Where a command came from and where the session should report to.
#[derive(Clone)]
pub struct CommandContext {
    pub voice_channel: VoiceChannelId,
    pub text_channel: TextChannelId,
    pub sink: Arc<dyn TextSink>,
}

/// Runs `command` and renders the reply. Failures become replies too.
pub async fn execute(
    orchestrator: &Orchestrator,
    resolver: &dyn TrackResolver,
    ctx: &CommandContext,
    command: Command,
) -> String {
    debug!("[{}] Executing {:?}", ctx.voice_channel, command);
    match run(orchestrator, resolver, ctx, command).await {
        Ok(reply) => reply,
        Err(e) => e.to_string(),
    }
}

async fn run(
    orchestrator: &Orchestrator,
    resolver: &dyn TrackResolver,
    ctx: &CommandContext,
    command: Command,
) -> Result<String, OrchestratorError> {
    let channel = ctx.voice_channel;

    let reply = match command {
        Command::Join => {
            orchestrator
                .join(channel, ctx.text_channel, ctx.sink.clone())
                .await?;
            format!("Joined voice channel {}!", channel)
        }
        Command::Leave => {
            orchestrator.leave(channel).await?;
            format!("I've left voice channel {}!", channel)
        }
        Command::Play { query } => {
            if !orchestrator.has_session(channel) {
                orchestrator
                    .join(channel, ctx.text_channel, ctx.sink.clone())
                    .await?;
            }

            let tracks = resolver.resolve(&query).await?;
            let reply = match tracks.as_slice() {
                [] => return Err(OrchestratorError::NoMatches(query)),
                [track] => format!("Enqueued {}", track.title),
                many => format!("Enqueued {} songs.", many.len()),
            };
            orchestrator.enqueue(channel, tracks).await?;
            reply
        }
        Command::Pause => format!("Paused: {}", title_of(orchestrator.pause(channel).await?)),
        Command::Resume => format!("Resumed: {}", title_of(orchestrator.resume(channel).await?)),
        Command::Stop => {
            orchestrator.stop(channel).await?;
            "No longer playing anything.".to_string()
        }
        Command::Skip => match orchestrator.skip(channel).await? {
            Skipped::Advanced { previous, current } => {
                format!("Skipped: {}\nNow Playing: {}", title_of(previous), current.title)
            }
            Skipped::Stopped { .. } => "No longer playing anything.".to_string(),
        },
        Command::Seek { position } => {
            let track = orchestrator.seek(channel, position).await?;
            format!(
                "I've seeked `{}` to {}.",
                title_of(track),
                format_duration(position)
            )
        }
        Command::Volume { level } => {
            orchestrator.set_volume(channel, level).await?;
            format!("I've changed the player volume to {}.", level)
        }
        Command::NowPlaying => {
            let player = orchestrator.now_playing(channel).await?;
            match player.track {
                Some(track) => format!("Now Playing: {}", progress_line(&track, player.position)),
                None => "Woaaah there, I'm not playing any tracks.".to_string(),
            }
        }
        Command::Queue => render_queue(orchestrator, channel).await?,
        Command::Help => help_text(),
    };
    Ok(reply)
}

async fn render_queue(
    orchestrator: &Orchestrator,
    channel: VoiceChannelId,
) -> Result<String, OrchestratorError> {
    let queue = orchestrator.queue(channel).await?;

    let mut out = match orchestrator.now_playing(channel).await {
        Ok(player) if player.state == PlayerState::Playing => match player.track {
            Some(track) => format!("Now Playing: {}", track.title),
            None => String::new(),
        },
        Ok(_) | Err(OrchestratorError::NotPlaying { .. }) => String::new(),
        Err(e) => return Err(e),
    };

    if queue.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str("The queue is empty.");
        return Ok(out);
    }

    for (i, track) in queue.iter().enumerate() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("{}. {}", i, track.title));
    }
    out.push_str(&format!(
        "\n{} track(s), {} total",
        queue.len(),
        format_duration(Duration::from_millis(queue.total_length()))
    ));
    Ok(out)
}

fn title_of(track: Option<Track>) -> String {
    track.map(|t| t.title).unwrap_or_else(|| "unknown track".to_string())
}

fn progress_line(track: &Track, position: u64) -> String {
    if track.is_stream {
        return format!("{} (LIVE)", track.title);
    }
    format!(
        "{} ({}/{})",
        track.title,
        format_duration(Duration::from_millis(position)),
        format_duration(track.length())
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        configs::PlayerConfig,
        engine::mock::{CollectingSink, RecordingEngine, playing, track},
    };

    const CH: VoiceChannelId = VoiceChannelId(5);

    fn context() -> CommandContext {
        CommandContext {
            voice_channel: CH,
            text_channel: TextChannelId(6),
            sink: CollectingSink::new(),
        }
    }

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!(Command::parse("JOIN").unwrap(), Command::Join);
        assert_eq!(
            Command::parse("p  never gonna give you up ").unwrap(),
            Command::Play {
                query: "never gonna give you up".into()
            }
        );
        assert_eq!(Command::parse("np").unwrap(), Command::NowPlaying);
        assert_eq!(Command::parse("q").unwrap(), Command::Queue);
        assert_eq!(Command::parse("volume 250").unwrap(), Command::Volume { level: 250 });
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Command::parse("   "), Err(ParseError::Empty));
        assert_eq!(
            Command::parse("dance"),
            Err(ParseError::Unknown("dance".into()))
        );
        assert_eq!(Command::parse("play"), Err(ParseError::Usage("play <query>")));
        assert_eq!(Command::parse("volume loud"), Err(ParseError::Usage("volume <0-1000>")));
        assert!(Command::parse("seek 1:75").is_err());
        assert!(Command::parse("seek").is_err());
    }

    #[test]
    fn test_parse_positions() {
        assert_eq!(parse_position("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_position("1:30"), Some(Duration::from_secs(90)));
        assert_eq!(parse_position("1:02:03"), Some(Duration::from_secs(3723)));
        assert_eq!(parse_position("1:2:3:4"), None);
        assert_eq!(parse_position("x"), None);
    }

    #[test]
    fn test_help_lists_every_command() {
        let help = help_text();
        for spec in COMMANDS {
            assert!(help.contains(spec.usage));
        }
        assert!(help.contains("alias: np"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_joins_and_enqueues() {
        let engine = RecordingEngine::new();
        let orchestrator = Orchestrator::new(engine.clone(), PlayerConfig::default());
        let ctx = context();

        let reply = execute(
            &orchestrator,
            engine.as_ref(),
            &ctx,
            Command::parse("play intro").unwrap(),
        )
        .await;

        assert_eq!(reply, "Enqueued Song intro");
        assert!(orchestrator.has_session(CH));
        assert_eq!(engine.plays(CH), vec!["intro"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_without_matches() {
        let engine = RecordingEngine::new();
        let orchestrator = Orchestrator::new(engine.clone(), PlayerConfig::default());

        let reply = execute(
            &orchestrator,
            engine.as_ref(),
            &context(),
            Command::Play {
                query: "nothing".into(),
            },
        )
        .await;

        assert_eq!(reply, "I wasn't able to find anything for `nothing`.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_become_replies() {
        let engine = RecordingEngine::new();
        let orchestrator = Orchestrator::new(engine.clone(), PlayerConfig::default());
        let ctx = context();

        let reply = execute(&orchestrator, engine.as_ref(), &ctx, Command::Pause).await;
        assert_eq!(reply, "I'm not connected to a voice channel.");

        execute(&orchestrator, engine.as_ref(), &ctx, Command::Join).await;
        let reply = execute(&orchestrator, engine.as_ref(), &ctx, Command::Join).await;
        assert_eq!(reply, "I'm already connected to a voice channel!");

        let reply = execute(&orchestrator, engine.as_ref(), &ctx, Command::Skip).await;
        assert_eq!(reply, "I cannot skip when I'm not playing anything!");

        engine.fail_on("volume");
        let reply = execute(
            &orchestrator,
            engine.as_ref(),
            &ctx,
            Command::Volume { level: 10 },
        )
        .await;
        assert_eq!(reply, "volume rejected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_replies() {
        let engine = RecordingEngine::new();
        let orchestrator = Orchestrator::new(engine.clone(), PlayerConfig::default());
        let ctx = context();
        execute(&orchestrator, engine.as_ref(), &ctx, Command::Join).await;
        orchestrator
            .enqueue(CH, vec![track("a", 200), track("b", 200)])
            .await
            .unwrap();

        let reply = execute(&orchestrator, engine.as_ref(), &ctx, Command::Queue).await;
        assert_eq!(reply, "Now Playing: Song a\n0. Song b\n1 track(s), 3:20 total");

        let reply = execute(&orchestrator, engine.as_ref(), &ctx, Command::Pause).await;
        assert_eq!(reply, "Paused: Song a");
        let reply = execute(&orchestrator, engine.as_ref(), &ctx, Command::Resume).await;
        assert_eq!(reply, "Resumed: Song a");

        let reply = execute(&orchestrator, engine.as_ref(), &ctx, Command::Skip).await;
        assert_eq!(reply, "Skipped: Song a\nNow Playing: Song b");

        engine.set_player(CH, playing(&track("b", 200), 65_000));
        let reply = execute(&orchestrator, engine.as_ref(), &ctx, Command::NowPlaying).await;
        assert_eq!(reply, "Now Playing: Song b (1:05/3:20)");

        let reply = execute(
            &orchestrator,
            engine.as_ref(),
            &ctx,
            Command::Seek {
                position: Duration::from_secs(90),
            },
        )
        .await;
        assert_eq!(reply, "I've seeked `Song b` to 1:30.");

        let reply = execute(&orchestrator, engine.as_ref(), &ctx, Command::Skip).await;
        assert_eq!(reply, "No longer playing anything.");
        let reply = execute(&orchestrator, engine.as_ref(), &ctx, Command::Stop).await;
        assert_eq!(
            reply,
            "Woaaah there, I can't stop when the player is already stopped."
        );

        let reply = execute(&orchestrator, engine.as_ref(), &ctx, Command::Queue).await;
        assert_eq!(reply, "The queue is empty.");

        let reply = execute(&orchestrator, engine.as_ref(), &ctx, Command::Leave).await;
        assert_eq!(reply, "I've left voice channel 5!");
    }
}
