//! Engine configuration.
//!
//! Trigger timeouts, the stuck-renewal routing policy and the cursor page
//! size. Defaults suit a scheduler running every few minutes; override via
//! environment variables or explicit construction.

use sublife_store::DEFAULT_PAGE_SIZE;

use crate::error::ConfigError;

/// Default `trigger_suspended_timeout` window.
pub const DEFAULT_SUSPENDED_TIMEOUT_HOURS: u32 = 48;

/// Default `trigger_stuck` window.
pub const DEFAULT_STUCK_TIMEOUT_HOURS: u32 = 2;

/// Runtime configuration for the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Hours after `end` before a SUSPENDED subscription is ended.
    pub suspended_timeout_hours: u32,
    /// Hours without an update before a RENEWING subscription is stuck.
    pub stuck_timeout_hours: u32,
    /// Route stuck renewals to SUSPENDED (retry) instead of ERROR.
    pub stuck_retry: bool,
    /// Rows per store cursor page.
    pub page_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            suspended_timeout_hours: DEFAULT_SUSPENDED_TIMEOUT_HOURS,
            stuck_timeout_hours: DEFAULT_STUCK_TIMEOUT_HOURS,
            stuck_retry: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `SUBLIFE_SUSPENDED_TIMEOUT_HOURS` (default: 48)
    /// - `SUBLIFE_STUCK_TIMEOUT_HOURS` (default: 2)
    /// - `SUBLIFE_STUCK_RETRY` (default: false)
    /// - `SUBLIFE_PAGE_SIZE` (default: 500)
    ///
    /// Unset variables take their default; set but unparseable ones are an
    /// error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            suspended_timeout_hours: parse_number(
                &lookup,
                "SUBLIFE_SUSPENDED_TIMEOUT_HOURS",
                defaults.suspended_timeout_hours,
            )?,
            stuck_timeout_hours: parse_number(
                &lookup,
                "SUBLIFE_STUCK_TIMEOUT_HOURS",
                defaults.stuck_timeout_hours,
            )?,
            stuck_retry: parse_flag(&lookup, "SUBLIFE_STUCK_RETRY", defaults.stuck_retry)?,
            page_size: match parse_number(&lookup, "SUBLIFE_PAGE_SIZE", defaults.page_size)? {
                0 => {
                    return Err(ConfigError::Invalid {
                        var: "SUBLIFE_PAGE_SIZE",
                        value: "0".to_string(),
                        reason: "must be at least 1".to_string(),
                    })
                }
                n => n,
            },
        })
    }
}

fn parse_number<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_flag(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "expected true or false".to_string(),
        }),
    }
}
