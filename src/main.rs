use clap::CommandFactory;
use log::{debug, error, info, warn};
use segue::audio::SimulatedMedia;
use segue::cli::{Action, CliApp, Commands, ConfigAction, ParseError, QueueAction, StatusDisplay};
use segue::config::ConfigManager;
use segue::error::{ConfigError, PlayerError, QueueError, SourceError};
use segue::logging::EngineLogger;
use segue::models::{QueueSource, RepeatMode, TrackId, TrackPhase, Visibility};
use segue::persistence::{JsonFilePersistence, MemoryPersistence, PersistenceService};
use segue::playback::events::Command;
use segue::playback::{PlaybackController, Player, PlayerTiming};
use segue::source::LibraryManifest;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How a manifest should be queued when playback starts
struct PlayOptions {
    shuffle: bool,
    repeat: Option<RepeatMode>,
    crossfade: Option<Duration>,
    lazy: bool,
}

/// A running engine plus the library it was started against
struct ActiveSession {
    player: Player,
    library: Arc<LibraryManifest>,
}

/// Main application controller that coordinates all components
pub struct AppController {
    config_manager: ConfigManager,
    ephemeral: bool,
    session: Option<ActiveSession>,
}

impl AppController {
    pub fn new(config_path: Option<PathBuf>, ephemeral: bool) -> Result<Self, PlayerError> {
        // Logging comes first; stay quiet unless asked otherwise
        if std::env::var("SEGUE_LOG_LEVEL").is_err() {
            std::env::set_var("SEGUE_LOG_LEVEL", "warn");
        }
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", "warn");
        }
        if let Err(e) = EngineLogger::init() {
            eprintln!("Warning: Failed to initialize logging: {}", e);
        }

        let config_manager = match config_path {
            Some(path) => ConfigManager::with_path(CliApp::expand_path(&path.to_string_lossy()))?,
            None => ConfigManager::new()?,
        };

        info!(
            "Application controller initialized with {}",
            config_manager.config_path().display()
        );

        Ok(Self {
            config_manager,
            ephemeral,
            session: None,
        })
    }

    /// Load a manifest and spawn the engine, resuming any saved session
    async fn start_player(&mut self, manifest: &Path, latency: Duration) -> Result<(), PlayerError> {
        let manifest_path = CliApp::expand_path(&manifest.to_string_lossy());
        let library = Arc::new(LibraryManifest::load(&manifest_path)?.with_latency(latency));
        if library.is_empty() {
            return Err(SourceError::EmptySelection.into());
        }

        let config = self.config_manager.get_config();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let media = SimulatedMedia::new(events_tx.clone());
        media.register_manifest(&library);

        let controller = PlaybackController::new(
            config.engine_settings(),
            library.clone(),
            &media,
            events_tx,
            EngineLogger::new(),
        );

        let persistence: Arc<dyn PersistenceService> = if self.ephemeral {
            Arc::new(MemoryPersistence::new())
        } else {
            Arc::new(JsonFilePersistence::new(config.session_file.clone()))
        };

        let player = Player::start(controller, events_rx, persistence, PlayerTiming::from(config)).await;
        self.session = Some(ActiveSession { player, library });
        Ok(())
    }

    fn session(&self) -> Result<&ActiveSession, PlayerError> {
        self.session.as_ref().ok_or(PlayerError::EngineStopped)
    }

    async fn send(&self, command: Command) -> Result<(), PlayerError> {
        self.session()?.player.send(command).await
    }

    /// Execute a command given on the command line
    pub async fn execute_command(&mut self, command: Commands) -> Result<(), PlayerError> {
        match command {
            Commands::Play {
                manifest,
                shuffle,
                repeat,
                crossfade,
                lazy,
                latency_ms,
            } => {
                let crossfade = match crossfade {
                    Some(seconds) if seconds.is_finite() && seconds >= 0.0 => {
                        Some(Duration::from_secs_f64(seconds))
                    }
                    Some(seconds) => {
                        return Err(ParseError::InvalidArgument {
                            argument: "crossfade".to_string(),
                            value: seconds.to_string(),
                            expected: "seconds >= 0".to_string(),
                        }
                        .into())
                    }
                    None => None,
                };

                self.start_player(&manifest, Duration::from_millis(latency_ms))
                    .await?;
                self.start_playback(PlayOptions {
                    shuffle,
                    repeat,
                    crossfade,
                    lazy,
                })
                .await?;
                self.run_interactive_mode().await
            }
            Commands::Resume { manifest } => {
                self.start_player(&manifest, Duration::ZERO).await?;
                let snapshot = self.session()?.player.snapshot();
                match &snapshot.current_track {
                    Some(track) => println!(
                        "Resuming: {} - {} at {}",
                        track.display_name(),
                        track.artist_name(),
                        snapshot.position_formatted()
                    ),
                    None => println!("No saved session. Use 'segue play <manifest>' to start one."),
                }
                self.run_interactive_mode().await
            }
            Commands::Tracks { manifest } => {
                let library = LibraryManifest::load(&CliApp::expand_path(&manifest.to_string_lossy()))?;
                if library.is_empty() {
                    println!("Manifest has no tracks");
                    return Ok(());
                }
                println!("{} tracks:", library.len());
                for entry in library.entries() {
                    let marker = if entry.local { "*" } else { " " };
                    println!(
                        "{} {:<16} {} - {} [{}]",
                        marker,
                        StatusDisplay::truncate(&entry.id, 16),
                        entry.artist.as_deref().unwrap_or("Unknown Artist"),
                        entry.title.as_deref().unwrap_or(&entry.id),
                        CliApp::format_duration(Duration::from_secs_f64(entry.duration_secs))
                    );
                }
                Ok(())
            }
            Commands::Config { action } => {
                match action {
                    ConfigAction::Show => {
                        let rendered = toml::to_string_pretty(self.config_manager.get_config())
                            .map_err(ConfigError::from)?;
                        println!("# {}", self.config_manager.config_path().display());
                        println!("{}", rendered);
                    }
                    ConfigAction::Reset => {
                        self.config_manager.reset_to_defaults()?;
                        println!(
                            "OK: Configuration reset ({})",
                            self.config_manager.config_path().display()
                        );
                    }
                }
                Ok(())
            }
        }
    }

    async fn start_playback(&self, options: PlayOptions) -> Result<(), PlayerError> {
        let session = self.session()?;

        if let Some(mode) = options.repeat {
            session.player.send(Command::SetRepeat(mode)).await?;
        }
        if let Some(duration) = options.crossfade {
            session.player.send(Command::SetCrossfade(duration)).await?;
        }

        if options.lazy {
            session
                .player
                .send(Command::SetLazyQueue {
                    ids: session.library.ids(),
                    source: Some(QueueSource::library()),
                })
                .await?;
        } else {
            session
                .player
                .send(Command::SetQueue {
                    tracks: session.library.tracks(),
                    start_index: 0,
                })
                .await?;
        }

        if session.player.snapshot().shuffle != options.shuffle {
            session.player.send(Command::ToggleShuffle).await?;
        }

        println!(
            "Queued {} tracks{}",
            session.library.len(),
            if options.lazy { " (lazy)" } else { "" }
        );
        Ok(())
    }

    /// Execute a command typed at the prompt
    pub async fn execute_action(&mut self, action: Action) -> Result<(), PlayerError> {
        match action {
            Action::Play => {
                self.send(Command::Play).await?;
                println!("OK: Playing");
            }
            Action::Pause => {
                self.send(Command::Pause).await?;
                println!("OK: Paused");
            }
            Action::Toggle => {
                self.send(Command::TogglePlayPause).await?;
                let playing = self.session()?.player.snapshot().is_playing;
                println!("OK: {}", if playing { "Playing" } else { "Paused" });
            }
            Action::Next => self.send(Command::PlayNext).await?,
            Action::Prev => self.send(Command::PlayPrevious).await?,
            Action::Seek(position) => {
                self.send(Command::Seek(position)).await?;
                println!("Seeked to: {}", CliApp::format_duration(position));
            }
            Action::Shuffle => {
                self.send(Command::ToggleShuffle).await?;
                let enabled = self.session()?.player.snapshot().shuffle;
                println!("OK: Shuffle {}", if enabled { "on" } else { "off" });
            }
            Action::Repeat(mode) => {
                match mode {
                    Some(mode) => self.send(Command::SetRepeat(mode)).await?,
                    None => self.send(Command::ToggleRepeat).await?,
                }
                let repeat = self.session()?.player.snapshot().repeat;
                println!("OK: Repeat {}", repeat.as_str());
            }
            Action::Volume(level) => {
                let volume = level as f32 / 100.0;
                self.send(Command::SetVolume(volume)).await?;
                self.config_manager.set_volume(volume)?;
                println!("OK: Volume {}%", level);
            }
            Action::Crossfade(duration) => {
                self.send(Command::SetCrossfade(duration)).await?;
                self.config_manager.set_crossfade(duration)?;
                if duration.is_zero() {
                    println!("OK: Gapless transitions");
                } else {
                    println!("OK: Crossfade {:.1}s", duration.as_secs_f64());
                }
            }
            Action::Mode(mode) => {
                self.send(Command::SetPreferredMode(mode)).await?;
                self.config_manager.set_output_mode(mode)?;
                let active = self.session()?.player.snapshot().output_mode;
                if active == mode {
                    println!("OK: Output mode {}", mode.as_str());
                } else {
                    println!(
                        "OK: Preferred mode {} (running {} for now)",
                        mode.as_str(),
                        active.as_str()
                    );
                }
            }
            Action::Background => {
                self.send(Command::SetVisibility(Visibility::Background)).await?;
                let mode = self.session()?.player.snapshot().output_mode;
                println!("OK: Backgrounded, output {}", mode.as_str());
            }
            Action::Foreground => {
                self.send(Command::SetVisibility(Visibility::Foreground)).await?;
                let mode = self.session()?.player.snapshot().output_mode;
                println!("OK: Foregrounded, output {}", mode.as_str());
            }
            Action::Queue(queue_action) => self.execute_queue_action(queue_action).await?,
            Action::Status => {
                StatusDisplay::display_full_status(&self.session()?.player.snapshot());
            }
            Action::History => {
                let listing = self.session()?.player.listing().await?;
                StatusDisplay::display_history(&listing);
            }
            Action::Stats => {
                let stats = self.session()?.player.stats().await?;
                StatusDisplay::display_stats(&stats);
            }
            Action::LazyOff => {
                self.send(Command::ExitLazyMode).await?;
                println!("OK: Lazy queue closed");
            }
        }

        Ok(())
    }

    async fn execute_queue_action(&mut self, action: QueueAction) -> Result<(), PlayerError> {
        let session = self.session()?;
        match action {
            QueueAction::List => {
                let listing = session.player.listing().await?;
                StatusDisplay::display_queue(&listing);
            }
            QueueAction::Add { id } => {
                let track_id = TrackId::new(id);
                let track = session
                    .library
                    .track(&track_id)
                    .ok_or(SourceError::NotFound { id: track_id })?;
                let name = track.display_name();
                session.player.send(Command::AddToQueue(track)).await?;
                println!("OK: Added {}", name);
            }
            QueueAction::Remove { position } => {
                let listing = session.player.listing().await?;
                let item = listing
                    .entries
                    .get(position - 1)
                    .ok_or(QueueError::InvalidIndex { index: position })?;
                session
                    .player
                    .send(Command::RemoveFromQueue(item.queue_id))
                    .await?;
                println!("OK: Removed {}", item.track.display_name());
            }
            QueueAction::Clear => {
                session.player.send(Command::ClearQueue).await?;
                println!("OK: Queue cleared");
            }
        }
        Ok(())
    }

    /// Run interactive mode
    pub async fn run_interactive_mode(&mut self) -> Result<(), PlayerError> {
        println!("segue v{}", env!("CARGO_PKG_VERSION"));
        println!("Type 'help' for available commands, 'exit' or 'quit' to quit.");
        println!();

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let shutdown_flag_clone = shutdown_flag.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!("\nReceived interrupt signal. Shutting down gracefully...");
            shutdown_flag_clone.store(true, Ordering::Relaxed);
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }

        // Non-blocking input with 100ms polling using a dedicated stdin thread
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.send(line.trim().to_string()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut awaiting_input = false;
        let mut announced_track: Option<TrackId> = None;
        let mut announced_queue_finished = false;

        loop {
            if shutdown_flag.load(Ordering::Relaxed) {
                break;
            }

            if !awaiting_input {
                print!("> ");
                let _ = std::io::Write::flush(&mut std::io::stdout());
                awaiting_input = true;
            }

            tokio::select! {
                biased;

                line = rx.recv() => {
                    awaiting_input = false;
                    let Some(line) = line else {
                        println!();
                        break;
                    };
                    if line.is_empty() {
                        continue;
                    }
                    if line == "exit" || line == "quit" {
                        println!("Goodbye!");
                        break;
                    }
                    match CliApp::parse_command(&line) {
                        Ok(action) => {
                            if let Err(e) = self.execute_action(action).await {
                                self.handle_error_with_recovery(&e);
                            }
                        }
                        Err(ParseError::HelpRequested) => CliApp::display_help(),
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            println!("Type 'help' for available commands.");
                        }
                    }
                }

                _ = interval.tick() => {
                    let Some(session) = self.session.as_ref() else {
                        continue;
                    };
                    let snapshot = session.player.snapshot();
                    let current = snapshot.current_track.as_ref().map(|track| track.id.clone());
                    if current.is_some() && current != announced_track {
                        if let Some(track) = &snapshot.current_track {
                            println!("\nNow playing: {} - {}", track.display_name(), track.artist_name());
                            awaiting_input = false;
                        }
                        announced_queue_finished = false;
                    }
                    announced_track = current;

                    if snapshot.phase == TrackPhase::Ended && !announced_queue_finished {
                        println!("\nQueue finished");
                        announced_queue_finished = true;
                        awaiting_input = false;
                    }
                }
            }
        }

        self.shutdown().await
    }

    /// Stop the engine, flush the session and save settings
    pub async fn shutdown(&mut self) -> Result<(), PlayerError> {
        println!("Shutting down...");

        let volume = self
            .session
            .as_ref()
            .map(|session| session.player.snapshot().volume);

        if let Some(session) = self.session.take() {
            if let Err(e) = session.player.stop().await {
                eprintln!("Warning: Error saving playback session: {}", e);
            }
        }

        if let Err(e) = self.save_current_config(volume) {
            eprintln!("Warning: Error saving configuration: {}", e);
        }

        println!("Shutdown complete.");
        Ok(())
    }

    /// Log at the error's severity and show it with recovery hints
    fn handle_error_with_recovery(&self, error: &PlayerError) {
        let severity = error.severity();
        log::log!(severity.log_level(), "{}: {}", severity.as_str(), error);
        StatusDisplay::display_error_with_recovery(error, error.is_recoverable());
    }

    fn save_current_config(&mut self, volume: Option<f32>) -> Result<(), PlayerError> {
        let Some(volume) = volume else {
            debug!("No session ran; configuration left untouched");
            return Ok(());
        };
        self.config_manager.update_config(|config| {
            config.default_volume = volume;
        })?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), PlayerError> {
    let cli = CliApp::parse();

    let mut app = match AppController::new(cli.config, cli.ephemeral) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to initialize application: {}", e);
            StatusDisplay::display_simple_error(&e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(command) => {
            if let Err(e) = app.execute_command(command).await {
                error!("Command failed: {}", e);
                app.handle_error_with_recovery(&e);
                if app.session.is_some() {
                    let _ = app.shutdown().await;
                }
                std::process::exit(1);
            }
        }
        None => {
            CliApp::command().print_help()?;
            println!();
        }
    }

    info!("Application shutdown complete");
    Ok(())
}
