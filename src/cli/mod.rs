use crate::models::{OutputMode, RepeatMode};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub mod status;
pub use status::StatusDisplay;

/// Crossfading playback queue
#[derive(Parser)]
#[command(name = "segue")]
#[command(about = "Queue a music library and play it with crossfades")]
#[command(version)]
pub struct CliApp {
    /// Configuration file to use instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Neither resume nor save the playback session
    #[arg(long, global = true)]
    pub ephemeral: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Queue every track of a manifest and start playing
    Play {
        /// Library manifest (TOML with [[tracks]] entries)
        manifest: PathBuf,
        /// Start with shuffle enabled
        #[arg(long)]
        shuffle: bool,
        /// Repeat mode: off, all or one
        #[arg(long)]
        repeat: Option<RepeatMode>,
        /// Crossfade length in seconds (0 for a gapless cut)
        #[arg(long)]
        crossfade: Option<f64>,
        /// Resolve tracks on demand instead of materializing the queue
        #[arg(long)]
        lazy: bool,
        /// Delay every library lookup, as a remote library would
        #[arg(long, default_value_t = 0)]
        latency_ms: u64,
    },
    /// Continue the saved session against a manifest
    Resume {
        manifest: PathBuf,
    },
    /// List the tracks of a manifest
    Tracks {
        manifest: PathBuf,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the active configuration
    Show,
    /// Restore default settings
    Reset,
}

/// A command typed at the interactive prompt
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Play,
    Pause,
    Toggle,
    Next,
    Prev,
    Seek(Duration),
    Shuffle,
    /// Cycle the repeat mode, or set it directly
    Repeat(Option<RepeatMode>),
    Volume(u8),
    Crossfade(Duration),
    Mode(OutputMode),
    Background,
    Foreground,
    Queue(QueueAction),
    Status,
    History,
    /// Engine journal counters and recovery totals
    Stats,
    LazyOff,
}

/// Queue management at the prompt
#[derive(Debug, Clone, PartialEq)]
pub enum QueueAction {
    List,
    /// Append a manifest track by id
    Add { id: String },
    /// Remove the entry at a 1-based position
    Remove { position: usize },
    Clear,
}

impl CliApp {
    /// Parse command line arguments
    pub fn parse() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Expand tilde (~) in path to home directory
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home_dir) => home_dir.join(rest),
                None => PathBuf::from(path),
            }
        } else if path == "~" {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
        } else {
            PathBuf::from(path)
        }
    }

    /// Parse command from string (for interactive mode)
    pub fn parse_command(input: &str) -> Result<Action, ParseError> {
        let args: Vec<&str> = input.split_whitespace().collect();
        let Some(&name) = args.first() else {
            return Err(ParseError::EmptyCommand);
        };

        match name {
            "play" => Ok(Action::Play),
            "pause" => Ok(Action::Pause),
            "toggle" | "p" => Ok(Action::Toggle),
            "next" | "n" => Ok(Action::Next),
            "prev" | "previous" => Ok(Action::Prev),
            "seek" => {
                let position = Self::required(&args, "seek", "position")?;
                Ok(Action::Seek(Self::parse_time(position)?))
            }
            "shuffle" => Ok(Action::Shuffle),
            "repeat" => match args.get(1) {
                None => Ok(Action::Repeat(None)),
                Some(value) => value
                    .parse::<RepeatMode>()
                    .map(|mode| Action::Repeat(Some(mode)))
                    .map_err(|_| ParseError::InvalidArgument {
                        argument: "repeat mode".to_string(),
                        value: value.to_string(),
                        expected: "off, all or one".to_string(),
                    }),
            },
            "volume" => {
                let value = Self::required(&args, "volume", "level")?;
                match value.parse::<u8>() {
                    Ok(level) if level <= 100 => Ok(Action::Volume(level)),
                    Ok(_) => Err(ParseError::InvalidArgument {
                        argument: "volume level".to_string(),
                        value: value.to_string(),
                        expected: "0-100".to_string(),
                    }),
                    Err(_) => Err(ParseError::InvalidArgument {
                        argument: "volume level".to_string(),
                        value: value.to_string(),
                        expected: "number 0-100".to_string(),
                    }),
                }
            }
            "crossfade" => {
                let value = Self::required(&args, "crossfade", "seconds")?;
                Ok(Action::Crossfade(Self::parse_time(value)?))
            }
            "mode" => {
                let value = Self::required(&args, "mode", "graph|direct")?;
                value
                    .parse::<OutputMode>()
                    .map(Action::Mode)
                    .map_err(|_| ParseError::InvalidArgument {
                        argument: "output mode".to_string(),
                        value: value.to_string(),
                        expected: "graph or direct".to_string(),
                    })
            }
            "background" | "bg" => Ok(Action::Background),
            "foreground" | "fg" => Ok(Action::Foreground),
            "queue" => Self::parse_queue(&args),
            "status" => Ok(Action::Status),
            "history" => Ok(Action::History),
            "stats" => Ok(Action::Stats),
            "lazy" => match args.get(1) {
                Some(&"off") => Ok(Action::LazyOff),
                Some(other) => Err(ParseError::UnknownCommand {
                    command: format!("lazy {}", other),
                }),
                None => Err(ParseError::MissingArgument {
                    command: "lazy".to_string(),
                    argument: "off".to_string(),
                }),
            },
            "help" => Err(ParseError::HelpRequested),
            _ => Err(ParseError::UnknownCommand {
                command: name.to_string(),
            }),
        }
    }

    fn parse_queue(args: &[&str]) -> Result<Action, ParseError> {
        let action = Self::required(args, "queue", "action")?;
        let queue = match action {
            "list" | "ls" => QueueAction::List,
            "clear" => QueueAction::Clear,
            "add" => {
                if args.len() < 3 {
                    return Err(ParseError::MissingArgument {
                        command: "queue add".to_string(),
                        argument: "id".to_string(),
                    });
                }
                QueueAction::Add {
                    id: args[2..].join(" "),
                }
            }
            "remove" | "rm" => {
                let value = args.get(2).ok_or_else(|| ParseError::MissingArgument {
                    command: "queue remove".to_string(),
                    argument: "position".to_string(),
                })?;
                match value.parse::<usize>() {
                    Ok(position) if position > 0 => QueueAction::Remove { position },
                    _ => {
                        return Err(ParseError::InvalidArgument {
                            argument: "queue position".to_string(),
                            value: value.to_string(),
                            expected: "a position from 'queue list'".to_string(),
                        })
                    }
                }
            }
            other => {
                return Err(ParseError::UnknownCommand {
                    command: format!("queue {}", other),
                })
            }
        };
        Ok(Action::Queue(queue))
    }

    fn required<'a>(args: &[&'a str], command: &str, argument: &str) -> Result<&'a str, ParseError> {
        args.get(1).copied().ok_or_else(|| ParseError::MissingArgument {
            command: command.to_string(),
            argument: argument.to_string(),
        })
    }

    /// Display help information
    pub fn display_help() {
        println!("segue - Available Commands:");
        println!();
        println!("Playback Control:");
        println!("  play            - Start or resume playback");
        println!("  pause           - Pause playback");
        println!("  toggle, p       - Toggle play/pause");
        println!("  next, n         - Next track (finishes a running crossfade)");
        println!("  prev            - Restart, or previous track near the start");
        println!("  seek <time>     - Seek to position (e.g., '1:30', '90s')");
        println!();
        println!("Queue Behaviour:");
        println!("  shuffle             - Toggle shuffle");
        println!("  repeat [off|all|one] - Cycle or set repeat mode");
        println!("  crossfade <secs>    - Crossfade length from the next boundary");
        println!("  lazy off            - Keep the current track, drop the lazy queue");
        println!();
        println!("Queue Management:");
        println!("  queue list          - List queue contents");
        println!("  queue add <id>      - Append a manifest track");
        println!("  queue remove <n>    - Remove the entry at position n");
        println!("  queue clear         - Clear queue");
        println!("  history             - Recently played tracks");
        println!();
        println!("Output:");
        println!("  volume <0-100>      - Set master volume");
        println!("  mode graph|direct   - Preferred output path");
        println!("  background, bg      - Simulate the host going to the background");
        println!("  foreground, fg      - Simulate the host coming back");
        println!("  status              - Show current player status");
        println!("  stats               - Crossfade, error and journal counters");
        println!();
        println!("General:");
        println!("  help            - Show this help message");
        println!("  exit, quit      - Exit the player");
    }

    /// Parse time string to Duration with enhanced validation
    pub fn parse_time(time_str: &str) -> Result<Duration, ParseError> {
        let trimmed = time_str.trim();
        let invalid = || ParseError::InvalidTimeFormat {
            input: time_str.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid());
        }

        // "1:30", "1:30.5", "90", "90s"
        let total_seconds = if let Some((minutes, seconds)) = trimmed.split_once(':') {
            let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
            let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
            if !(0.0..60.0).contains(&seconds) {
                return Err(invalid());
            }
            minutes as f64 * 60.0 + seconds
        } else {
            let seconds: f64 = trimmed
                .trim_end_matches('s')
                .parse()
                .map_err(|_| invalid())?;
            if seconds < 0.0 || !seconds.is_finite() {
                return Err(invalid());
            }
            seconds
        };

        Ok(Duration::from_secs_f64(total_seconds))
    }

    /// Format duration for display
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let minutes = total_seconds / 60;
        let seconds = total_seconds % 60;
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Command parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("Missing argument for {command}: {argument}")]
    MissingArgument { command: String, argument: String },

    #[error("Invalid argument {argument}: got '{value}', expected {expected}")]
    InvalidArgument {
        argument: String,
        value: String,
        expected: String,
    },

    #[error("Invalid time format: {input}")]
    InvalidTimeFormat { input: String },

    #[error("Help requested")]
    HelpRequested,
}


#[cfg(test)]
mod path_tests {
    use super::*;

    #[test]
    fn test_expand_path_tilde_home() {
        let expanded = CliApp::expand_path("~/Music/library.toml");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("Music/library.toml"));
    }

    #[test]
    fn test_expand_path_no_tilde() {
        let path = "/absolute/path/library.toml";
        assert_eq!(CliApp::expand_path(path).to_string_lossy(), path);
    }
}
