mod aligner;
mod bookmarks;
mod cancellation;
mod clock;
mod config;
mod content;
mod controls;
mod cue;
mod error;
mod parser;
mod progress;
mod recent;
mod serialiser;
mod session;
mod settings;
mod store;
mod sync;

use crate::bookmarks::{saved_items, Toggle};
use crate::cancellation::CancellationToken;
use crate::clock::{PlaybackClock, WallClock};
use crate::config::{load_config, AppConfig};
use crate::content::{parse_track, ContentSource};
use crate::controls::{Control, HELP};
use crate::cue::BilingualCue;
use crate::recent::RecentRegistry;
use crate::serialiser::{serialise, timestamp, Format};
use crate::session::Session;
use crate::settings::SettingChange;
use crate::store::ContentStore;
use crate::sync::CueChange;

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

fn main() {
    let reload_handle = init_tracing();
    match run(&reload_handle) {
        Ok(()) => (),
        Err(err) => {
            eprintln!("An error occurred: {}", err);
            for cause in err.chain().skip(1) {
                eprintln!("    {}", cause);
            }
            std::process::exit(1);
        }
    }
}

#[derive(ClapParser)]
#[command(about = "Play a video's two subtitle tracks as one bilingual transcript")]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file.",
        default_value = "conf/config.toml"
    )]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the aligned bilingual transcript of a content directory.
    Transcript {
        dir: PathBuf,
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
        #[arg(long, help = "Leave out the secondary language.")]
        hide_secondary: bool,
        #[arg(
            short,
            long,
            value_name = "FILE",
            help = "The file to write to. If not supplied, the transcript is written to standard output."
        )]
        output: Option<PathBuf>,
    },
    /// Follow the transcript in real time, resuming where playback last stopped.
    Play {
        dir: PathBuf,
        #[arg(long, value_name = "SECS", help = "Start here instead of the saved position.")]
        from: Option<f64>,
        #[arg(long, value_name = "SECS", help = "Media length; defaults to the end of the last cue.")]
        duration: Option<f64>,
        #[arg(long, help = "Forget the saved position and start from the beginning.")]
        restart: bool,
    },
    /// Parse one subtitle file and report what was found.
    Check {
        file: PathBuf,
        #[arg(long, help = "Fail on the first malformed cue block.")]
        strict: bool,
    },
    /// Show or change the per-content settings.
    Settings {
        dir: PathBuf,
        #[arg(long, value_name = "SECS")]
        max_time_diff: Option<f64>,
        #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
        offset: Option<f64>,
        #[arg(long, value_name = "BOOL")]
        secondary_visible: Option<bool>,
    },
    /// Bookmark a transcript row, or remove its bookmark.
    Bookmark { dir: PathBuf, index: usize },
    /// Remove the bookmark of a transcript row.
    Unbookmark { dir: PathBuf, index: usize },
    /// List bookmarks of one content directory, or of everything when omitted.
    Bookmarks {
        dir: Option<PathBuf>,
        #[arg(long, requires = "dir", help = "Remove every bookmark of the directory.")]
        clear: bool,
    },
    /// List recently opened content.
    Recent {
        #[arg(long, value_name = "ID")]
        remove: Option<u64>,
    },
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config);
    set_log_level(reload_handle, config.log_level.as_filter_str());
    info!(
        config = %cli.config.display(),
        cache = %config.cache_dir.display(),
        level = %config.log_level,
        "Configuration loaded"
    );

    match cli.command {
        Command::Transcript {
            dir,
            format,
            hide_secondary,
            output,
        } => transcript(&config, &dir, format, hide_secondary, output),
        Command::Play {
            dir,
            from,
            duration,
            restart,
        } => play(&config, &dir, from, duration, restart),
        Command::Check { file, strict } => check(&file, strict),
        Command::Settings {
            dir,
            max_time_diff,
            offset,
            secondary_visible,
        } => settings(&config, &dir, max_time_diff, offset, secondary_visible),
        Command::Bookmark { dir, index } => {
            let mut session = open_session(&config, &dir)?;
            let result = session.toggle_bookmark(index);
            session.teardown();
            match result {
                Some(Toggle::Added) => println!("Bookmarked row {}.", index),
                Some(Toggle::Removed) => println!("Removed bookmark of row {}.", index),
                None => return Err(anyhow!("There is no row {} in this transcript.", index)),
            }
            Ok(())
        }
        Command::Unbookmark { dir, index } => {
            let mut session = open_session(&config, &dir)?;
            let removed = session.remove_bookmark(index);
            session.teardown();
            if !removed {
                return Err(anyhow!("Row {} is not bookmarked.", index));
            }
            println!("Removed bookmark of row {}.", index);
            Ok(())
        }
        Command::Bookmarks { dir, clear } => bookmarks(&config, dir.as_deref(), clear),
        Command::Recent { remove } => recent(&config, remove),
    }
}

fn open_session(config: &AppConfig, dir: &Path) -> Result<Session> {
    let source = ContentSource::discover(dir, config)
        .with_context(|| format!("Failed to open content directory: '{}'", dir.display()))?;
    if source.primary.is_none() {
        warn!(dir = %dir.display(), "No primary subtitle track found");
    }
    let mut recent = RecentRegistry::load(ContentStore::new(&config.cache_dir));
    recent.add(&source.identity, dir);
    Ok(Session::open(&source, config))
}

fn transcript(
    config: &AppConfig,
    dir: &Path,
    format: Format,
    hide_secondary: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let session = open_session(config, dir)?;
    let cues = session.cues();
    let with_secondary = !hide_secondary && session.settings().secondary_visible;
    let bookmarked: Vec<usize> = cues
        .iter()
        .map(|c| c.index)
        .filter(|&i| session.is_bookmarked(i))
        .collect();
    session.teardown();

    if cues.is_empty() {
        return Err(anyhow!("No subtitles available for '{}'.", dir.display()));
    }
    match output {
        None => serialise(&cues, format, with_secondary, &bookmarked, io::stdout())?,
        Some(path) => {
            let dst = std::fs::File::create(&path)
                .with_context(|| format!("Failed to create output file: '{}'", path.display()))?;
            serialise(&cues, format, with_secondary, &bookmarked, dst)?;
        }
    }
    Ok(())
}

fn play(
    config: &AppConfig,
    dir: &Path,
    from: Option<f64>,
    duration: Option<f64>,
    restart: bool,
) -> Result<()> {
    let source = ContentSource::discover(dir, config)
        .with_context(|| format!("Failed to open content directory: '{}'", dir.display()))?;
    let video = source.require_video()?.to_path_buf();
    let mut session = open_session(config, dir)?;
    if restart {
        session.forget_progress();
    }

    let cues = session.cues();
    let duration = duration
        .or_else(|| cues.last().map(|c| c.end))
        .ok_or_else(|| anyhow!("No subtitles and no --duration given; nothing to follow."))?;
    info!(identity = %session.identity(), video = %video.display(), duration, "Following playback");

    let clock = Arc::new(WallClock::new(0.0, duration));
    let show_secondary = session.settings().secondary_visible;
    let (events, inbox) = mpsc::channel();
    let cue_events = events.clone();
    let listener = move |change: CueChange, _: &[BilingualCue]| {
        let _ = cue_events.send(PlayEvent::Cue(change));
    };
    session.start_playback(clock.clone(), Box::new(listener), config.frame_interval())?;
    spawn_controls(events)?;
    println!("{}", HELP);
    if let Some(from) = from {
        clock.seek(from);
    }
    clock.play();

    let interrupted = CancellationToken::new();
    let handler_token = interrupted.clone();
    if let Err(err) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("Could not install interrupt handler: {err}");
    }

    while !interrupted.is_cancelled() && !clock.ended() {
        match inbox.recv_timeout(Duration::from_millis(100)) {
            Ok(PlayEvent::Cue(change)) => {
                let cues = session.cues();
                if let Some(cue) = change.current.and_then(|i| cues.get(i)) {
                    let marked = session.is_bookmarked(cue.index);
                    print_row(cue, show_secondary, change.scroll_into_view, marked);
                }
            }
            Ok(PlayEvent::Input(Control::Quit)) => break,
            Ok(PlayEvent::Input(control)) => handle_control(&mut session, control),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        let now = Instant::now();
        session.on_time_update(now);
        session.poll(now);
    }
    clock.pause();
    info!(position = clock.current_time(), "Playback stopped");
    session.teardown();
    Ok(())
}

enum PlayEvent {
    Cue(CueChange),
    Input(Control),
}

/// Reads commands from standard input on its own thread. The thread is left
/// detached; it ends with stdin or the process.
fn spawn_controls(events: mpsc::Sender<PlayEvent>) -> Result<()> {
    thread::Builder::new()
        .name("controls".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        warn!("Stopped reading commands: {err}");
                        break;
                    }
                };
                match Control::parse(&line) {
                    Some(control) => {
                        if events.send(PlayEvent::Input(control)).is_err() {
                            break;
                        }
                    }
                    None => println!("{}", HELP),
                }
            }
        })
        .context("Failed to start the command reader.")?;
    Ok(())
}

fn handle_control(session: &mut Session, control: Control) {
    match control {
        Control::Next => report_seek(session.next_cue(), "No later row."),
        Control::Previous => report_seek(session.previous_cue(), "No earlier row."),
        Control::Seek(index) => report_seek(session.seek_to_cue(index), "No such row."),
        Control::TogglePause => match session.toggle_pause() {
            Some(true) => println!("Paused."),
            Some(false) => println!("Playing."),
            None => {}
        },
        Control::Bookmark => match session.bookmark_active() {
            Some((index, Toggle::Added)) => println!("Bookmarked row {}.", index),
            Some((index, Toggle::Removed)) => println!("Removed bookmark of row {}.", index),
            None => println!("No row is showing."),
        },
        Control::Quit => {}
    }
}

fn report_seek(target: Option<f64>, missing: &str) {
    match target {
        Some(t) => println!("-> {}", timestamp(t)),
        None => println!("{}", missing),
    }
}

fn print_row(cue: &BilingualCue, show_secondary: bool, emphasise: bool, bookmarked: bool) {
    let marker = if emphasise { ">" } else { " " };
    let mark = if bookmarked { "*" } else { " " };
    println!(
        "{}{} #{:<4} [{}] {}",
        marker,
        mark,
        cue.index,
        timestamp(cue.start),
        cue.primary.replace('\n', " ")
    );
    if show_secondary {
        for line in cue.secondary.lines().filter(|l| !l.trim().is_empty()) {
            println!("                        {}", line);
        }
    }
}

fn check(file: &Path, strict: bool) -> Result<()> {
    let (cues, dropped) = parse_track(file, strict)
        .with_context(|| format!("Failed to parse subtitle file: '{}'", file.display()))?;
    for rejected in &dropped {
        println!("dropped: {}", rejected);
    }
    match (cues.first(), cues.last()) {
        (Some(first), Some(last)) => println!(
            "{} cues from {} to {}.",
            cues.len(),
            timestamp(first.start),
            timestamp(last.end)
        ),
        _ => println!("No cues found."),
    }
    Ok(())
}

fn settings(
    config: &AppConfig,
    dir: &Path,
    max_time_diff: Option<f64>,
    offset: Option<f64>,
    secondary_visible: Option<bool>,
) -> Result<()> {
    let mut session = open_session(config, dir)?;
    let changes = max_time_diff
        .map(SettingChange::MaxTimeDiff)
        .into_iter()
        .chain(offset.map(SettingChange::SubtitleOffset))
        .chain(secondary_visible.map(SettingChange::SecondaryVisible));
    for change in changes {
        let effect = session.change_setting(change);
        info!(?change, ?effect, "Applied setting");
    }

    let current = session.settings();
    println!("max_time_diff     = {}", current.alignment.max_time_diff);
    println!("look_ahead_limit  = {}", current.alignment.look_ahead_limit);
    println!("subtitle_offset   = {}", current.sync.subtitle_offset);
    println!("secondary_visible = {}", current.secondary_visible);
    session.teardown();
    Ok(())
}

fn bookmarks(config: &AppConfig, dir: Option<&Path>, clear: bool) -> Result<()> {
    match dir {
        Some(dir) => {
            let mut session = open_session(config, dir)?;
            if clear {
                session.clear_bookmarks();
            }
            for mark in session.bookmarks() {
                println!("#{:<5} [{}] {}", mark.cue_index, timestamp(mark.start), mark.primary);
                for line in mark.secondary.lines().filter(|l| !l.trim().is_empty()) {
                    println!("                        {}", line);
                }
            }
            session.teardown();
        }
        None => {
            let store = ContentStore::new(&config.cache_dir);
            for item in saved_items(&store) {
                println!(
                    "{} #{} [{}] {}",
                    item.identity,
                    item.bookmark.cue_index,
                    timestamp(item.bookmark.start),
                    item.bookmark.primary
                );
            }
        }
    }
    Ok(())
}

fn recent(config: &AppConfig, remove: Option<u64>) -> Result<()> {
    let mut registry = RecentRegistry::load(ContentStore::new(&config.cache_dir));
    if let Some(id) = remove {
        if !registry.remove(id) {
            return Err(anyhow!("No recent entry with id {}.", id));
        }
    }
    for entry in registry.list() {
        println!("{:>4}  {}  ({})", entry.id, entry.name, entry.path.display());
    }
    Ok(())
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(true)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = handle.modify(|filter| *filter = parsed) {
        warn!(%level, "Failed to update log level from config: {err}");
    }
}
