//! Configuration loaded from the environment.
//!
//! `Config::from_env()` reads process variables (after `.env` has been loaded
//! by `main`). `Config::from_lookup()` takes any key lookup so tests never
//! touch the real environment.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

const DEFAULT_WORK_DIR: &str = "pdf_files";
const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Main configuration for the bot.
#[derive(Debug)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub work_dir: PathBuf,
    /// Upper-cased keywords used by `/clean`.
    pub watermark_keywords: Vec<String>,
    pub progress: ProgressConfig,
    pub queue: QueueConfig,
    /// PDFium library file for `/extract` page rendering. Searched for when unset.
    pub pdfium_library: Option<PathBuf>,
}

/// Telegram Bot API settings.
#[derive(Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_url: String,
    /// Long polling timeout passed to `getUpdates`.
    pub poll_timeout: Duration,
}

/// Progress animation settings.
#[derive(Debug, Clone, Copy)]
pub struct ProgressConfig {
    pub total_steps: u32,
    pub step_interval: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            total_steps: 8,
            step_interval: Duration::from_millis(80),
        }
    }
}

/// Job queue hardening settings.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Per-job timeout. `None` lets a job run forever.
    pub job_timeout: Option<Duration>,
    /// Optional limit on pending jobs. `None` keeps the queue unbounded.
    pub max_pending: Option<usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            job_timeout: Some(Duration::from_secs(300)),
            max_pending: None,
        }
    }
}

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_token = lookup("BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingRequired {
                key: "BOT_TOKEN".to_string(),
                hint: "Set BOT_TOKEN to the token issued by @BotFather".to_string(),
            })?;

        let watermark_keywords = lookup("WATERMARK_KEYWORDS")
            .map(|raw| parse_keywords(&raw))
            .unwrap_or_default();

        let work_dir = lookup("WORK_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR));

        let pdfium_library = lookup("PDFIUM_DYNAMIC_LIB_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let defaults = ProgressConfig::default();
        let total_steps = parse_optional::<u32>(&lookup, "PROGRESS_STEPS")?
            .unwrap_or(defaults.total_steps);
        let step_interval = parse_optional::<u64>(&lookup, "PROGRESS_INTERVAL_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.step_interval);

        let job_timeout = match parse_optional::<u64>(&lookup, "JOB_TIMEOUT_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => QueueConfig::default().job_timeout,
        };

        let max_pending = match parse_optional::<usize>(&lookup, "MAX_PENDING_JOBS")? {
            Some(0) => {
                return Err(ConfigError::InvalidValue {
                    key: "MAX_PENDING_JOBS".to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
            other => other,
        };

        let api_url = lookup("TELEGRAM_API_URL")
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let poll_timeout = parse_optional::<u64>(&lookup, "TELEGRAM_POLL_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        Ok(Self {
            telegram: TelegramConfig {
                bot_token: SecretString::from(bot_token),
                api_url,
                poll_timeout,
            },
            work_dir,
            watermark_keywords,
            progress: ProgressConfig {
                total_steps,
                step_interval,
            },
            queue: QueueConfig {
                job_timeout,
                max_pending,
            },
            pdfium_library,
        })
    }

    /// Create the work directory if it does not exist yet.
    pub fn ensure_work_dir(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.work_dir).map_err(|e| ConfigError::WorkDir {
            path: self.work_dir.display().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Split a comma separated keyword list, trimming and upper-casing entries.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_uppercase)
        .collect()
}

fn parse_optional<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(None),
    }
}
