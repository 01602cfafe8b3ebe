use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyMode {
    Http,
    Local,
    Disabled,
}

impl NotifyMode {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "http" => Self::Http,
            "local" => Self::Local,
            _ => Self::Disabled,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Local => "local",
            Self::Disabled => "disabled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub file_logs: bool,
    pub log_dir: PathBuf,
    pub tick_interval: Duration,
    pub poll_interval: Duration,
    pub notify_mode: NotifyMode,
    pub notify_base_url: Option<String>,
    pub notify_timeout: Duration,
    pub response_timeout: Duration,
    pub message_cooldown: Duration,
    pub callmebot_phone: Option<String>,
    pub callmebot_api_key: Option<String>,
    pub session_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            file_logs: false,
            log_dir: PathBuf::from("./logs"),
            tick_interval: Duration::from_millis(200),
            poll_interval: Duration::from_millis(2000),
            notify_mode: NotifyMode::Disabled,
            notify_base_url: None,
            notify_timeout: Duration::from_millis(5000),
            response_timeout: Duration::from_secs(10),
            message_cooldown: Duration::from_secs(120),
            callmebot_phone: None,
            callmebot_api_key: None,
            session_dir: default_session_dir(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let notify_mode = env_string("NOTIFY_MODE")
            .map(|v| NotifyMode::parse(&v))
            .unwrap_or(defaults.notify_mode);

        let session_dir = env_string("SESSION_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.session_dir);

        let file_logs = env_string("ENABLE_FILE_LOGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self {
            log_level,
            file_logs,
            log_dir: env_string("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            tick_interval: env_millis("MONITOR_TICK_MS").unwrap_or(defaults.tick_interval),
            poll_interval: env_millis("MONITOR_POLL_MS").unwrap_or(defaults.poll_interval),
            notify_mode,
            notify_base_url: env_string("NOTIFY_BASE_URL"),
            notify_timeout: env_millis("NOTIFY_TIMEOUT_MS").unwrap_or(defaults.notify_timeout),
            response_timeout: env_secs("RESPONSE_TIMEOUT_SECS")
                .unwrap_or(defaults.response_timeout),
            message_cooldown: env_secs("MESSAGE_COOLDOWN_SECS")
                .unwrap_or(defaults.message_cooldown),
            callmebot_phone: env_string("CALLMEBOT_PHONE"),
            callmebot_api_key: env_string("CALLMEBOT_API_KEY"),
            session_dir,
        }
    }
}

fn default_session_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("driver-monitor")
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

fn env_millis(key: &str) -> Option<Duration> {
    env_u64(key).filter(|&v| v > 0).map(Duration::from_millis)
}

fn env_secs(key: &str) -> Option<Duration> {
    env_u64(key).map(Duration::from_secs)
}
