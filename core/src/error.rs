use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::MIN_TRAINING_MINUTES;

/// Errors produced while loading plans, computing a day, or touching history.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Meal plan file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Malformed meal plan file {}: {reason}", .path.display())]
    ConfigMalformed { path: PathBuf, reason: String },

    #[error("Malformed history file {}: {reason}", .path.display())]
    MalformedHistory { path: PathBuf, reason: String },

    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("You have already logged data for {0}")]
    DuplicateDate(NaiveDate),

    #[error("Unknown meal plan '{0}'")]
    UnknownProfile(String),

    #[error("Meal '{meal}' is not part of plan '{profile}'")]
    UnknownMeal { profile: String, meal: String },

    #[error("Cheat tier '{0}' is not configured")]
    UnknownCheatTier(String),

    #[error("Plan '{0}' has meals defined; choose which meal was skipped")]
    MissingMealSelection(String),

    #[error("Training duration must be at least {MIN_TRAINING_MINUTES} minutes (got {0})")]
    InvalidDuration(u32),

    #[error("Weight must be greater than 0 (got {0})")]
    InvalidWeight(f64),

    #[error("Invalid {field} '{value}'. Use {expected}")]
    InvalidChoice {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl TrackerError {
    /// True for errors caused by the user's selections rather than the data files.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::UnknownProfile(_)
                | Self::UnknownMeal { .. }
                | Self::UnknownCheatTier(_)
                | Self::MissingMealSelection(_)
                | Self::InvalidDuration(_)
                | Self::InvalidWeight(_)
                | Self::InvalidChoice { .. }
        )
    }

    /// True when the configuration or history file cannot be used at all.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigMalformed { .. } | Self::MalformedHistory { .. }
        )
    }
}
