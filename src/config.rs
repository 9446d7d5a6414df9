//! Configuration types.
//!
//! Everything is read once from the environment in `main` and passed down
//! explicitly; nothing below the binary touches `std::env`.

use std::time::Duration;

use chrono::FixedOffset;
use secrecy::SecretString;

use crate::error::ConfigError;

/// Default Trello REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.trello.com/1";

/// Steward configuration.
#[derive(Debug, Clone)]
pub struct StewardConfig {
    /// Board service credentials and client behaviour.
    pub trello: TrelloConfig,
    /// Handle mentioned when a card has no members. `None` disables the fallback.
    pub admin_username: Option<String>,
    /// Human-readable names of the boards and lists the rules operate on.
    pub names: WorkspaceNames,
    /// Offset used for calendar-day and quarter calculations.
    pub calendar_offset: FixedOffset,
    /// How long to wait for a freshly created quarter list to become visible.
    pub list_visibility: VisibilityPolicy,
}

/// Trello API access.
#[derive(Debug, Clone)]
pub struct TrelloConfig {
    /// Member whose boards are searched by name.
    pub member_id: String,
    pub api_key: SecretString,
    pub token: SecretString,
    pub api_base: String,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_base_delay: Duration,
}

/// Names of the boards and fixed stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceNames {
    pub current_board: String,
    pub archive_board: String,
    pub icebox: String,
    pub next_up: String,
    pub in_progress: String,
    pub done: String,
    pub live_recent: String,
}

impl Default for WorkspaceNames {
    fn default() -> Self {
        Self {
            current_board: "Current Development".to_string(),
            archive_board: "In Production".to_string(),
            icebox: "Icebox".to_string(),
            next_up: "Next Up".to_string(),
            in_progress: "In Progress".to_string(),
            done: "Done".to_string(),
            live_recent: "Live (Last Two Weeks)".to_string(),
        }
    }
}

/// Bounded poll used after creating a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibilityPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for VisibilityPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(1000),
        }
    }
}

impl StewardConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };
        let named = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };

        let member_id = required("TRELLO_MEMBER_ID")?;
        let api_key = SecretString::from(required("TRELLO_API_KEY")?);
        let token = SecretString::from(required("TRELLO_TOKEN")?);
        let api_base = named("TRELLO_API_BASE", DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let max_retries: u32 = parse_or(&lookup, "STEWARD_MAX_RETRIES", 3)?;
        let retry_base_delay =
            Duration::from_millis(parse_or(&lookup, "STEWARD_RETRY_BASE_DELAY_MS", 500)?);

        let admin_username = lookup("STEWARD_ADMIN_USERNAME")
            .map(|v| v.trim().trim_start_matches('@').to_string())
            .filter(|v| !v.is_empty());

        let defaults = WorkspaceNames::default();
        let names = WorkspaceNames {
            current_board: named("STEWARD_CURRENT_BOARD", defaults.current_board),
            archive_board: named("STEWARD_ARCHIVE_BOARD", defaults.archive_board),
            icebox: named("STEWARD_LIST_ICEBOX", defaults.icebox),
            next_up: named("STEWARD_LIST_NEXT_UP", defaults.next_up),
            in_progress: named("STEWARD_LIST_IN_PROGRESS", defaults.in_progress),
            done: named("STEWARD_LIST_DONE", defaults.done),
            live_recent: named("STEWARD_LIST_LIVE_RECENT", defaults.live_recent),
        };

        let offset_minutes: i32 = parse_or(&lookup, "STEWARD_UTC_OFFSET_MINUTES", 0)?;
        let calendar_offset =
            FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| ConfigError::InvalidValue {
                key: "STEWARD_UTC_OFFSET_MINUTES".to_string(),
                message: format!("{offset_minutes} is outside ±24h"),
            })?;

        let list_visibility = VisibilityPolicy {
            attempts: parse_or(&lookup, "STEWARD_LIST_VISIBILITY_ATTEMPTS", 5)?,
            delay: Duration::from_millis(parse_or(
                &lookup,
                "STEWARD_LIST_VISIBILITY_DELAY_MS",
                1000,
            )?),
        };

        Ok(Self {
            trello: TrelloConfig {
                member_id,
                api_key,
                token,
                api_base,
                max_retries,
                retry_base_delay,
            },
            admin_username,
            names,
            calendar_offset,
            list_visibility,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
