use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LogSetupError {
    #[error("Invalid log filter '{0}'")]
    Filter(String),
    #[error("Failed to create log directory {0}")]
    Directory(PathBuf, #[source] std::io::Error),
    #[error("Failed to create log file appender")]
    Appender(#[from] tracing_appender::rolling::InitError),
    #[error("Logging already initialized")]
    AlreadyInitialized,
}

/// Where and how verbosely a binary logs.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log file prefix: `{dir}/{app_name}.{date}.log`.
    pub app_name: String,
    /// Filter used when `RUST_LOG` is not set.
    pub base_level: String,
    pub dir: PathBuf,
    pub max_log_files: usize,
}

impl LogConfig {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            base_level: "info".to_string(),
            dir: PathBuf::from("logs"),
            max_log_files: 5,
        }
    }

    pub fn level(mut self, base_level: impl Into<String>) -> Self {
        self.base_level = base_level.into();
        self
    }

    pub fn dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }
}

/// Console + daily rolling file logging. Warnings and errors also go to stderr.
pub fn setup_logging(config: &LogConfig) -> Result<(), LogSetupError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.base_level))
        .map_err(|_| LogSetupError::Filter(config.base_level.clone()))?;

    std::fs::create_dir_all(&config.dir)
        .map_err(|e| LogSetupError::Directory(config.dir.clone(), e))?;

    let file_appender = Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.app_name)
        .filename_suffix("log")
        .max_log_files(config.max_log_files)
        .build(&config.dir)?;

    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    LOG_GUARD
        .set(guard)
        .map_err(|_| LogSetupError::AlreadyInitialized)?;

    let console_writer = std::io::stdout.and(std::io::stderr.with_max_level(Level::WARN));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(true)
        .with_writer(console_writer);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| LogSetupError::AlreadyInitialized)
}

/// Test-friendly subscriber. Safe to call from every test.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
