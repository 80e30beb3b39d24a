//! Environment variables understood by the alert transport

pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";

pub const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

pub const TELEGRAM_ENABLED: &str = "TELEGRAM_ENABLED";

pub const TELEGRAM_FAILURE_THRESHOLD: &str = "TELEGRAM_FAILURE_THRESHOLD";

const DEFAULT_FAILURE_THRESHOLD: u32 = 10;

pub fn get_default_failure_threshold() -> u32 {
    DEFAULT_FAILURE_THRESHOLD
}

/// Only a case-insensitive `true` enables alerts
pub fn parse_enabled(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Unparsable thresholds fall back to the default
pub fn parse_failure_threshold(value: &str) -> u32 {
    value.trim().parse().unwrap_or(DEFAULT_FAILURE_THRESHOLD)
}

/// Read a variable from the process environment, treating empty as unset
pub fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
