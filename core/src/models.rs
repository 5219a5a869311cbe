use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Column order of the history CSV. The header row must match exactly.
pub const HISTORY_COLUMNS: [&str; 9] = [
    "Date",
    "Week",
    "Day_Type",
    "Diet_Status",
    "Calories_In",
    "Calories_Burned",
    "Net_Deficit",
    "Predicted_Weight",
    "Actual_Weight",
];

/// Base TDEE used when the plan file carries no `user_stats`.
pub const DEFAULT_BASE_TDEE: f64 = 2000.0;
/// Starting weight when neither history nor a logged weight is available.
pub const DEFAULT_START_WEIGHT_KG: f64 = 80.0;
/// Energy equivalent of one kilogram of body weight.
pub const KCAL_PER_KG: f64 = 7700.0;

pub const MIN_TRAINING_MINUTES: u32 = 10;
pub const DEFAULT_TRAINING_MINUTES: u32 = 60;
pub const TRAINING_MINUTES_STEP: u32 = 5;

/// Label of the "no meal replaced" choice when going off plan.
pub const EXTRA_FOOD_LABEL: &str = "None (Extra Food)";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealPlanProfile {
    pub total_calories: f64,
    #[serde(default)]
    pub meals: IndexMap<String, f64>,
}

impl MealPlanProfile {
    #[must_use]
    pub fn meal_names(&self) -> Vec<&str> {
        self.meals.keys().map(String::as_str).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheatTier {
    pub calories: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub bmr: f64,
    pub daily_activity_multiplier: f64,
}

impl UserStats {
    #[must_use]
    pub fn tdee(&self) -> f64 {
        self.bmr * self.daily_activity_multiplier
    }
}

/// Result of a lookup that falls back to a designated default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum Lookup<T> {
    Found(T),
    Fallback(T),
}

impl<T> Lookup<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Found(v) | Self::Fallback(v) => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Found(v) | Self::Fallback(v) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DietStatus {
    Yes,
    Partial,
    No,
}

impl DietStatus {
    pub const ALL: [Self; 3] = [Self::Yes, Self::Partial, Self::No];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "Yes",
            Self::Partial => "Partial",
            Self::No => "No",
        }
    }
}

impl fmt::Display for DietStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DietStatus {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "partial" => Ok(Self::Partial),
            "no" => Ok(Self::No),
            _ => Err(TrackerError::InvalidChoice {
                field: "diet status",
                value: s.to_string(),
                expected: "yes, partial, or no",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainingType {
    #[serde(rename = "Lifting (Legs)")]
    LiftingLegs,
    #[serde(rename = "Lifting (Upper)")]
    LiftingUpper,
    #[serde(rename = "Cardio (LISS)")]
    CardioLiss,
    #[serde(rename = "Cardio (HIIT)")]
    CardioHiit,
}

impl TrainingType {
    pub const ALL: [Self; 4] = [
        Self::LiftingLegs,
        Self::LiftingUpper,
        Self::CardioLiss,
        Self::CardioHiit,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::LiftingLegs => "Lifting (Legs)",
            Self::LiftingUpper => "Lifting (Upper)",
            Self::CardioLiss => "Cardio (LISS)",
            Self::CardioHiit => "Cardio (HIIT)",
        }
    }

    #[must_use]
    pub fn slug(self) -> &'static str {
        match self {
            Self::LiftingLegs => "legs",
            Self::LiftingUpper => "upper",
            Self::CardioLiss => "liss",
            Self::CardioHiit => "hiit",
        }
    }

    /// Calories burned per minute.
    #[must_use]
    pub fn kcal_per_minute(self) -> f64 {
        match self {
            Self::LiftingLegs => 7.0,
            Self::LiftingUpper => 4.0,
            Self::CardioLiss => 6.0,
            Self::CardioHiit => 10.0,
        }
    }
}

impl fmt::Display for TrainingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TrainingType {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.slug().eq_ignore_ascii_case(needle) || t.label().eq_ignore_ascii_case(needle))
            .ok_or_else(|| TrackerError::InvalidChoice {
                field: "training type",
                value: s.to_string(),
                expected: "legs, upper, liss, or hiit",
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheatSize {
    #[default]
    Small,
    Medium,
    Large,
}

impl CheatSize {
    pub const ALL: [Self; 3] = [Self::Small, Self::Medium, Self::Large];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }
}

impl fmt::Display for CheatSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheatSize {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            _ => Err(TrackerError::InvalidChoice {
                field: "cheat size",
                value: s.to_string(),
                expected: "small, medium, or large",
            }),
        }
    }
}

/// Which planned meal an off-plan meal took the place of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MealChoice {
    ExtraFoodOnly,
    Meal(String),
}

impl From<Option<String>> for MealChoice {
    fn from(meal: Option<String>) -> Self {
        meal.map_or(Self::ExtraFoodOnly, Self::Meal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Adherence {
    Followed,
    Partial {
        skipped: Option<String>,
    },
    Off {
        replaced: MealChoice,
        cheat: CheatSize,
    },
}

impl Adherence {
    #[must_use]
    pub fn status(&self) -> DietStatus {
        match self {
            Self::Followed => DietStatus::Yes,
            Self::Partial { .. } => DietStatus::Partial,
            Self::Off { .. } => DietStatus::No,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Training {
    pub kind: TrainingType,
    pub minutes: u32,
}

impl Training {
    pub fn new(kind: TrainingType, minutes: u32) -> Result<Self, TrackerError> {
        Ok(Self {
            kind,
            minutes: validate_training_minutes(minutes)?,
        })
    }
}

/// The user's selections for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayForm {
    pub day_type: String,
    pub adherence: Adherence,
    pub training: Option<Training>,
    pub logged_weight: Option<f64>,
}

/// One row of the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Week")]
    pub week: u32,
    #[serde(rename = "Day_Type")]
    pub day_type: String,
    #[serde(rename = "Diet_Status")]
    pub diet_status: DietStatus,
    #[serde(rename = "Calories_In")]
    pub calories_in: f64,
    #[serde(rename = "Calories_Burned")]
    pub calories_burned: f64,
    #[serde(rename = "Net_Deficit")]
    pub net_deficit: f64,
    #[serde(rename = "Predicted_Weight")]
    pub predicted_weight: Option<f64>,
    #[serde(rename = "Actual_Weight")]
    pub actual_weight: Option<f64>,
}

pub fn validate_training_minutes(minutes: u32) -> Result<u32, TrackerError> {
    if minutes < MIN_TRAINING_MINUTES {
        return Err(TrackerError::InvalidDuration(minutes));
    }
    Ok(minutes)
}

pub fn validate_weight(kg: f64) -> Result<f64, TrackerError> {
    if !kg.is_finite() || kg <= 0.0 {
        return Err(TrackerError::InvalidWeight(kg));
    }
    Ok(kg)
}
