mod camera;
mod controls;
mod logging;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use gestu_core::endpoint;
use gestu_core::model::{CategorySlug, CompletionKey, Lesson};
use services::error::PracticeError;
use services::{
    ClientConfig, ControlCommand, LessonCatalog, PracticeRuntime, PracticeSnapshot, ProgressStore,
};
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use camera::DirectoryCamera;
use controls::{CONTROL_HELP, parse_control};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArg { name: &'static str },
    UnknownArg(String),
    InvalidLesson { raw: String },
    InvalidCategory { raw: String },
    InvalidKey { raw: String },
    InvalidBaseUrl { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArg { name } => write!(f, "missing {name}"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidLesson { raw } => {
                write!(f, "invalid --lesson value: {raw} (expected <category>:<order>)")
            }
            ArgsError::InvalidCategory { raw } => write!(f, "invalid category: {raw}"),
            ArgsError::InvalidKey { raw } => write!(f, "invalid completion key: {raw:?}"),
            ArgsError::InvalidBaseUrl { raw } => write!(f, "invalid --base-url value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  gestu practice --lesson <category>:<order> [--frames <dir>] [--base-url <url>] [--db <sqlite_url>]");
    eprintln!("  gestu progress list|toggle <key>|clear [--db <sqlite_url>]");
    eprintln!("  gestu roadmap --category <slug> [--base-url <url>] [--db <sqlite_url>]");
    eprintln!();
    eprintln!("While practicing, type one command per line:");
    eprintln!("  {CONTROL_HELP}");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  GESTU_BASE_URL, GESTU_API_PREFIX, GESTU_FPS, GESTU_FRAME_SIZE, GESTU_JPEG_QUALITY,");
    eprintln!("  GESTU_BACKLOG_BYTES, GESTU_BACKOFF_BASE_MS, GESTU_BACKOFF_MAX_MS, GESTU_BACKOFF_CAP,");
    eprintln!("  GESTU_DB_URL, GESTU_PROGRESS_KEY, GESTU_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ProgressAction {
    List,
    Toggle(CompletionKey),
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Practice {
        category: CategorySlug,
        order: u32,
        frames: Option<PathBuf>,
    },
    Progress(ProgressAction),
    Roadmap {
        category: CategorySlug,
    },
}

/// Flags shared by every command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CommonArgs {
    base_url: Option<String>,
    db_url: Option<String>,
}

impl CommonArgs {
    /// Consume `flag` if it is a shared one. Returns whether it was.
    fn accept(
        &mut self,
        flag: &str,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<bool, ArgsError> {
        match flag {
            "--base-url" => {
                let value = require_value(args, "--base-url")?;
                self.base_url = Some(value);
                Ok(true)
            }
            "--db" => {
                let value = require_value(args, "--db")?;
                if value.trim().is_empty() {
                    return Err(ArgsError::InvalidDbUrl { raw: value });
                }
                self.db_url = Some(value);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn parse_lesson_ref(raw: &str) -> Result<(CategorySlug, u32), ArgsError> {
    let invalid = || ArgsError::InvalidLesson {
        raw: raw.to_string(),
    };
    let (category, order) = raw.rsplit_once(':').ok_or_else(invalid)?;
    let category = CategorySlug::new(category).map_err(|_| invalid())?;
    let order: u32 = order.trim().parse().map_err(|_| invalid())?;
    if order == 0 {
        return Err(invalid());
    }
    Ok((category, order))
}

fn parse_category(raw: String) -> Result<CategorySlug, ArgsError> {
    CategorySlug::new(&raw).map_err(|_| ArgsError::InvalidCategory { raw })
}

fn parse_args(
    argv: impl IntoIterator<Item = String>,
) -> Result<Option<(Command, CommonArgs)>, ArgsError> {
    let mut args = argv.into_iter();
    let Some(subcommand) = args.next() else {
        return Ok(None);
    };
    let mut common = CommonArgs::default();

    let command = match subcommand.as_str() {
        "--help" | "-h" | "help" => return Ok(None),
        "practice" => {
            let mut lesson = None;
            let mut frames = None;
            while let Some(arg) = args.next() {
                if common.accept(&arg, &mut args)? {
                    continue;
                }
                match arg.as_str() {
                    "--lesson" => {
                        lesson = Some(parse_lesson_ref(&require_value(&mut args, "--lesson")?)?);
                    }
                    "--frames" => {
                        frames = Some(PathBuf::from(require_value(&mut args, "--frames")?));
                    }
                    _ => return Err(ArgsError::UnknownArg(arg)),
                }
            }
            let (category, order) = lesson.ok_or(ArgsError::MissingArg { name: "--lesson" })?;
            Command::Practice {
                category,
                order,
                frames,
            }
        }
        "progress" => {
            let mut action = None;
            while let Some(arg) = args.next() {
                if common.accept(&arg, &mut args)? {
                    continue;
                }
                match (arg.as_str(), &action) {
                    ("list", None) => action = Some(ProgressAction::List),
                    ("clear", None) => action = Some(ProgressAction::Clear),
                    ("toggle", None) => {
                        let raw = args.next().ok_or(ArgsError::MissingArg { name: "<key>" })?;
                        let key =
                            CompletionKey::new(&raw).map_err(|_| ArgsError::InvalidKey { raw })?;
                        action = Some(ProgressAction::Toggle(key));
                    }
                    _ => return Err(ArgsError::UnknownArg(arg)),
                }
            }
            Command::Progress(action.unwrap_or(ProgressAction::List))
        }
        "roadmap" => {
            let mut category = None;
            while let Some(arg) = args.next() {
                if common.accept(&arg, &mut args)? {
                    continue;
                }
                match arg.as_str() {
                    "--category" => {
                        category = Some(parse_category(require_value(&mut args, "--category")?)?);
                    }
                    _ => return Err(ArgsError::UnknownArg(arg)),
                }
            }
            Command::Roadmap {
                category: category.ok_or(ArgsError::MissingArg { name: "--category" })?,
            }
        }
        _ => return Err(ArgsError::UnknownArg(subcommand)),
    };

    Ok(Some((command, common)))
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn load_config(common: &CommonArgs) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    let mut config = ClientConfig::from_env()?;
    if let Some(raw) = &common.base_url {
        let base = endpoint::parse_base(raw).map_err(|_| ArgsError::InvalidBaseUrl {
            raw: raw.clone(),
        })?;
        config = config.with_base_url(base)?;
    }
    if let Some(raw) = &common.db_url {
        config = config.with_db_url(raw.clone());
    }
    let db_url = normalize_sqlite_url(config.db_url().to_string());
    Ok(config.with_db_url(db_url))
}

async fn open_progress(config: &ClientConfig) -> Result<ProgressStore, Box<dyn std::error::Error>> {
    prepare_sqlite_file(config.db_url())?;
    let storage = Storage::sqlite(config.db_url()).await?;
    Ok(ProgressStore::new(Arc::clone(&storage.kv)).with_key(config.progress_key()))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let parsed = parse_args(std::env::args().skip(1)).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;
    let Some((command, common)) = parsed else {
        print_usage();
        return Ok(());
    };

    let config = load_config(&common)?;
    let progress = open_progress(&config).await?;

    match command {
        Command::Practice {
            category,
            order,
            frames,
        } => practice(&config, progress, &category, order, frames).await,
        Command::Progress(action) => progress_command(&progress, action).await,
        Command::Roadmap { category } => {
            let catalog = LessonCatalog::from_config(&config);
            let lessons = catalog.lessons(&category).await;
            for entry in progress.roadmap(&lessons).await {
                let mark = match (entry.completed, entry.unlocked) {
                    (true, _) => "✓",
                    (false, true) => "·",
                    (false, false) => "🔒",
                };
                println!("{:>3}. {mark} {}  [{}]", entry.order, entry.title, entry.key);
            }
            Ok(())
        }
    }
}

async fn progress_command(
    progress: &ProgressStore,
    action: ProgressAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ProgressAction::List => {
            let set = progress.load().await;
            if set.is_empty() {
                println!("no completed lessons");
            }
            for key in set.iter() {
                println!("{key}");
            }
        }
        ProgressAction::Toggle(key) => {
            let present = progress.toggle(key.clone()).await?;
            println!("{key}: {}", if present { "completed" } else { "cleared" });
        }
        ProgressAction::Clear => {
            progress.clear().await?;
            println!("progress cleared");
        }
    }
    Ok(())
}

async fn practice(
    config: &ClientConfig,
    progress: ProgressStore,
    category: &CategorySlug,
    order: u32,
    frames: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = LessonCatalog::from_config(config);
    let lessons = catalog.lessons(category).await;
    let lesson: Lesson = lessons
        .iter()
        .find(|lesson| lesson.order() == order)
        .cloned()
        .ok_or_else(|| PracticeError::LessonNotFound(format!("{category}:{order}")))?;
    if !progress.is_unlocked(&lesson, &lessons).await {
        return Err(PracticeError::Locked(lesson.completion_key().to_string()).into());
    }

    info!(lesson = %lesson.title(), url = %config.inference_url(), "starting practice");
    eprintln!("{CONTROL_HELP}");

    let camera = DirectoryCamera::new(frames);
    let (runtime, handle) = PracticeRuntime::websocket(config, lesson, progress, Box::new(camera));
    let task = tokio::spawn(runtime.run());

    let mut snapshots = handle.snapshots();
    let reporter = tokio::spawn(async move {
        let mut last = None;
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            let line = status_line(&snapshot);
            if last.as_ref() != Some(&line) {
                println!("{line}");
                last = Some(line);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let Some(line) = lines.next_line().await? else {
            handle.send(ControlCommand::Shutdown).await;
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_control(&line) {
            Some(command) => {
                let stop = command == ControlCommand::Shutdown;
                if !handle.send(command).await || stop {
                    break;
                }
            }
            None => eprintln!("{CONTROL_HELP}"),
        }
    }

    let last = task.await?;
    drop(handle);
    if let Err(err) = reporter.await {
        warn!(error = %err, "status reporter failed");
    }
    println!(
        "{}: {} ({} frames sent)",
        last.lesson_title,
        if last.completed { "completed" } else { "not completed" },
        last.frames_sent
    );
    Ok(())
}

/// One-line summary of the parts of a snapshot a learner cares about.
fn status_line(snapshot: &PracticeSnapshot) -> String {
    let recognized = match (&snapshot.label, snapshot.confidence) {
        (Some(label), Some(confidence)) => format!("{label} ({:.0}%)", confidence * 100.0),
        (Some(label), None) => label.clone(),
        (None, _) => "-".to_string(),
    };
    let verdict = if snapshot.is_match { "match" } else { "no match" };
    let done = if snapshot.completed { " ✓" } else { "" };
    format!(
        "[{}] {} | target: {} | seen: {recognized} | {verdict}{done}",
        snapshot.status_text,
        snapshot.capture.status_text(),
        snapshot.target_word
    )
}

#[tokio::main]
async fn main() {
    logging::init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn practice_args_parse() {
        let (command, common) = parse_args(args(&[
            "practice",
            "--lesson",
            "animals:3",
            "--frames",
            "clips",
            "--base-url",
            "https://example.org",
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(
            command,
            Command::Practice {
                category: CategorySlug::new("animals").unwrap(),
                order: 3,
                frames: Some(PathBuf::from("clips")),
            }
        );
        assert_eq!(common.base_url.as_deref(), Some("https://example.org"));
    }

    #[test]
    fn lesson_ref_requires_positive_order() {
        assert!(parse_lesson_ref("words:0").is_err());
        assert!(parse_lesson_ref("words").is_err());
        assert!(parse_lesson_ref(":1").is_err());
        assert_eq!(
            parse_lesson_ref("Words:2").unwrap(),
            (CategorySlug::new("words").unwrap(), 2)
        );
    }

    #[test]
    fn progress_defaults_to_list() {
        let (command, _) = parse_args(args(&["progress"])).unwrap().unwrap();
        assert_eq!(command, Command::Progress(ProgressAction::List));
        let (command, common) = parse_args(args(&["progress", "toggle", "words:1", "--db", "x.db"]))
            .unwrap()
            .unwrap();
        assert_eq!(
            command,
            Command::Progress(ProgressAction::Toggle(CompletionKey::new("words:1").unwrap()))
        );
        assert_eq!(common.db_url.as_deref(), Some("x.db"));
    }

    #[test]
    fn missing_and_unknown_args_are_errors() {
        assert!(matches!(
            parse_args(args(&["practice"])),
            Err(ArgsError::MissingArg { name: "--lesson" })
        ));
        assert!(matches!(
            parse_args(args(&["roadmap", "--category"])),
            Err(ArgsError::MissingValue { flag: "--category" })
        ));
        assert!(matches!(
            parse_args(args(&["dance"])),
            Err(ArgsError::UnknownArg(_))
        ));
        assert!(parse_args(args(&[])).unwrap().is_none());
    }

    #[test]
    fn status_line_names_camera_failure() {
        let snapshot = PracticeSnapshot {
            lesson_title: "А".into(),
            target_word: "а".into(),
            status: services::TransportStatus::Connected,
            status_text: "Connected".into(),
            reconnect_in: None,
            capture: services::CaptureState::Failed(services::CaptureError::NotFound),
            label: Some("а".into()),
            confidence: Some(0.92),
            is_match: true,
            completed: true,
            frames_sent: 0,
        };
        let line = status_line(&snapshot);
        assert!(line.starts_with("[Connected] Camera error (NotFoundError)"), "{line}");
        assert!(line.ends_with("seen: а (92%) | match ✓"), "{line}");
    }

    #[test]
    fn sqlite_urls_are_made_absolute() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/g.db".into()),
            "sqlite:///tmp/g.db"
        );
        assert!(normalize_sqlite_url("g.db".into()).starts_with("sqlite:///"));
    }
}
