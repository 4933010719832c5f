use crate::error::{ErrorSeverity, PlayerError, QueueError, SourceError, SurfaceError};
use crate::logging::LogEvent;
use crate::models::{CrossfadeState, EngineStats, PlayerSnapshot, QueueListing, Track, TrackPhase};
use std::time::Duration;

/// Status display formatter for the CLI
pub struct StatusDisplay;

impl StatusDisplay {
    /// Display the full player status
    pub fn display_full_status(status: &PlayerSnapshot) {
        println!("┌─ Player Status ─────────────────────────────────────────┐");

        match &status.current_track {
            Some(track) => {
                Self::display_track_info(track);
                Self::display_playback_info(status);
            }
            None => {
                println!("│ No track loaded");
                println!("│ Status: {}", Self::format_phase(status.phase));
            }
        }

        Self::display_engine_info(status);
        println!("└─────────────────────────────────────────────────────────┘");
    }

    /// One-line status
    pub fn display_compact_status(status: &PlayerSnapshot) {
        match &status.current_track {
            Some(track) => {
                let title = Self::truncate(&track.display_name(), 30);
                let artist = Self::truncate(&track.artist_name(), 25);
                println!(
                    "{} | {} - {} | {}/{} ({}%) | {}",
                    Self::format_phase(status.phase),
                    artist,
                    title,
                    status.position_formatted(),
                    status.duration_formatted(),
                    (status.progress() * 100.0) as u8,
                    Self::format_crossfade_state(status.crossfade_state),
                );
            }
            None => println!("{} | No track loaded", Self::format_phase(status.phase)),
        }
    }

    fn display_track_info(track: &Track) {
        println!("│ Track: {}", Self::truncate(&track.display_name(), 50));
        println!("│ Artist: {}", Self::truncate(&track.artist_name(), 49));
        println!("│ Album: {}", Self::truncate(&track.album_name(), 50));
    }

    fn display_playback_info(status: &PlayerSnapshot) {
        println!("│");
        println!("│ Status: {}", Self::format_phase(status.phase));
        println!(
            "│ Position: {} / {}",
            Self::format_duration(status.position),
            Self::format_duration(status.duration)
        );

        let progress = status.progress();
        println!(
            "│ Progress: [{}] {:.1}%",
            Self::create_progress_bar(progress, 40),
            progress * 100.0
        );
        println!("│ Remaining: {}", Self::format_duration(status.remaining()));
    }

    fn display_engine_info(status: &PlayerSnapshot) {
        println!("│");
        println!("│ Volume: {}%", (status.volume * 100.0).round() as u8);
        println!(
            "│ Shuffle: {} | Repeat: {}",
            if status.shuffle { "on" } else { "off" },
            status.repeat.as_str()
        );
        println!(
            "│ Crossfade: {:.1}s ({})",
            status.crossfade_duration.as_secs_f32(),
            Self::format_crossfade_state(status.crossfade_state)
        );
        println!("│ Output: {}", status.output_mode);

        let queue = &status.queue;
        let position = queue
            .current_index
            .map(|index| (index + 1).to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "│ Queue: {} of {}{}",
            position,
            queue.length,
            if queue.is_lazy { " (lazy)" } else { "" }
        );

        if let Some(error) = &status.error {
            println!("│");
            for line in Self::wrap_text(&format!("Last error: {}", error), 55) {
                println!("│ {}", line);
            }
        }
    }

    /// Numbered queue, or the lazy pointer and upcoming ids
    pub fn display_queue(listing: &QueueListing) {
        if let Some((pointer, total)) = listing.lazy {
            println!("Lazy queue: track {} of {}", pointer + 1, total);
            for (offset, id) in listing.upcoming_ids.iter().enumerate() {
                println!("  {}: {}", pointer + offset + 2, id);
            }
            return;
        }

        if listing.entries.is_empty() {
            println!("Queue is empty");
            return;
        }

        println!("Queue ({} tracks):", listing.entries.len());
        for (i, item) in listing.entries.iter().enumerate() {
            let marker = if Some(i) == listing.current_index { ">" } else { " " };
            println!(
                "{} {}: {} - {} [{}]",
                marker,
                i + 1,
                item.track.artist_name(),
                item.track.display_name(),
                Self::format_duration(item.track.duration)
            );
        }
    }

    pub fn display_history(listing: &QueueListing) {
        if listing.history.is_empty() {
            println!("Nothing played yet");
            return;
        }
        println!("Recently played:");
        for track in listing.history.iter().rev() {
            println!("  {} - {}", track.artist_name(), track.display_name());
        }
    }

    pub fn display_stats(stats: &EngineStats) {
        let events = &stats.events;
        println!("Engine statistics:");
        println!(
            "  Crossfades:   {} completed, {} cancelled",
            events.crossfades_completed, events.crossfades_cancelled
        );
        println!("  Preloads:     {} failed", events.preload_failures);
        println!(
            "  Errors:       {} playback, {} resolution",
            events.playback_errors, events.resolution_failures
        );
        println!(
            "  Recovery:     {} errors, {} skipped, streak {}",
            stats.recovery.total_errors, stats.recovery.total_skips, stats.recovery.current_streak
        );
        println!(
            "  Output:       {} switches, {} slow",
            events.mode_switches, events.performance_warnings
        );
        println!("  Journal:      {} events", events.total_events);

        if !stats.recent.is_empty() {
            println!("Recent events:");
            for event in stats.recent.iter().rev() {
                println!("  {}", Self::format_log_event(event));
            }
        }
    }

    fn format_log_event(event: &LogEvent) -> String {
        let mut line = format!(
            "{} {:<20} {}",
            event.timestamp.format("%H:%M:%S"),
            event.event_type.as_str(),
            event.details
        );
        if let Some(duration) = event.duration {
            line.push_str(&format!(" ({}ms)", duration.as_millis()));
        }
        line
    }

    /// Display real-time position update (single line)
    pub fn display_position_update(status: &PlayerSnapshot) {
        if status.current_track.is_none() {
            return;
        }
        let progress = status.progress();
        print!(
            "\r{} [{}] {}/{} ({:.1}%)",
            Self::format_phase(status.phase),
            Self::create_progress_bar(progress, 30),
            status.position_formatted(),
            status.duration_formatted(),
            progress * 100.0
        );

        use std::io::Write;
        let _ = std::io::stdout().flush();
    }

    /// Display error message with formatting and recovery suggestions
    pub fn display_error(error: &PlayerError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!(
            "┌─ {} {} ─────────────────────────────────────────────────┐",
            severity_icon,
            severity.as_str()
        );

        for line in Self::wrap_text(&error.user_message(), 55) {
            eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("│");
            eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), 53) {
                    eprintln!("│   {}", line);
                }
            }
        }

        Self::display_error_context(error);

        eprintln!("└─────────────────────────────────────────────────────────┘");
    }

    fn display_error_context(error: &PlayerError) {
        match error {
            PlayerError::Surface(SurfaceError::GraphSuspended) => {
                eprintln!("│");
                eprintln!("│ The processing graph resumes with 'foreground'");
            }
            PlayerError::Surface(SurfaceError::PreloadTimeout { .. }) => {
                eprintln!("│");
                eprintln!("│ The track will still start with a hard cut");
            }
            PlayerError::Source(SourceError::NotFound { .. }) => {
                eprintln!("│");
                eprintln!("│ Use 'segue tracks <manifest>' to list known ids");
            }
            PlayerError::Queue(QueueError::EmptyQueue) => {
                eprintln!("│");
                eprintln!("│ Add tracks: 'queue add <id>' or 'segue play <manifest>'");
            }
            PlayerError::Config(_) => {
                eprintln!("│");
                eprintln!("│ Configuration will use default values");
            }
            _ => {}
        }
    }

    /// Wrap text to fit within specified width
    fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_line = String::new();

        for word in text.split_whitespace() {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.len() + word.len() < width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                lines.push(std::mem::replace(&mut current_line, word.to_string()));
            }
        }

        if !current_line.is_empty() {
            lines.push(current_line);
        }

        lines
            .into_iter()
            .map(|line| format!("{:<width$}", line, width = width))
            .collect()
    }

    /// Display error with recovery options for interactive mode
    pub fn display_error_with_recovery(error: &PlayerError, recovery_available: bool) {
        Self::display_error(error);

        if recovery_available && error.is_recoverable() {
            eprintln!();
            eprintln!("💡 The engine retries or skips the track on its own.");
        } else if !error.is_recoverable() {
            eprintln!();
            eprintln!("⚠  This error requires manual intervention to resolve.");
        }
    }

    /// Display a simple error message for non-interactive contexts
    pub fn display_simple_error(error: &PlayerError) {
        eprintln!("[{}] {}", error.severity().as_str(), error.user_message());

        if let Some(suggestion) = error.recovery_suggestions().first() {
            eprintln!("Suggestion: {}", suggestion);
        }
    }

    /// Format duration as MM:SS or HH:MM:SS for longer tracks
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        }
    }

    /// Truncate string to fit display width
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    pub fn create_progress_bar(progress: f32, width: usize) -> String {
        let filled = ((progress.clamp(0.0, 1.0) * width as f32) as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }

    pub fn format_phase(phase: TrackPhase) -> String {
        match phase {
            TrackPhase::Playing => "▶ Playing",
            TrackPhase::Paused => "⏸ Paused",
            TrackPhase::Loading => "… Loading",
            TrackPhase::Ready => "⏸ Ready",
            TrackPhase::Ended => "⏹ Ended",
            TrackPhase::Unloaded => "⏹ Stopped",
        }
        .to_string()
    }

    pub fn format_crossfade_state(state: CrossfadeState) -> &'static str {
        match state {
            CrossfadeState::Idle => "idle",
            CrossfadeState::Preloading => "preloading",
            CrossfadeState::Crossfading => "crossfading",
        }
    }
}
