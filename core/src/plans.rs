use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use chrono::Weekday;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TrackerError;
use crate::models::{
    CheatSize, CheatTier, DEFAULT_BASE_TDEE, Lookup, MealPlanProfile, UserStats,
};

/// Static meal-plan configuration, read fresh on every render cycle.
///
/// Expected shape:
///
/// ```json
/// {
///   "profiles": { "mon_wed_fri": { "total_calories": 2200, "meals": { "breakfast": 500 } } },
///   "cheat_tiers": { "small": { "calories": 300 } },
///   "user_stats": { "bmr": 1800, "daily_activity_multiplier": 1.3 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfig {
    pub profiles: IndexMap<String, MealPlanProfile>,
    pub cheat_tiers: IndexMap<String, CheatTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_stats: Option<UserStats>,
}

impl PlanConfig {
    pub fn load(path: &Path) -> Result<Self, TrackerError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TrackerError::ConfigNotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(TrackerError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config = Self::from_reader(BufReader::new(file), path)?;
        debug!(
            path = %path.display(),
            profiles = config.profiles.len(),
            cheat_tiers = config.cheat_tiers.len(),
            "loaded meal plans"
        );
        Ok(config)
    }

    /// Parse and validate a plan file. `source` is only used in error messages.
    pub fn from_reader<R: Read>(reader: R, source: &Path) -> Result<Self, TrackerError> {
        let malformed = |reason: String| TrackerError::ConfigMalformed {
            path: source.to_path_buf(),
            reason,
        };
        let config: Self = serde_json::from_reader(reader).map_err(|e| malformed(e.to_string()))?;
        config.validate().map_err(malformed)?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.profiles.is_empty() {
            return Err("at least one profile is required".to_string());
        }
        let invalid_kcal = |kcal: f64| !kcal.is_finite() || kcal < 0.0;
        for (name, profile) in &self.profiles {
            if invalid_kcal(profile.total_calories) {
                return Err(format!(
                    "total_calories of profile '{name}' must be a non-negative number"
                ));
            }
            if let Some((meal, _)) = profile.meals.iter().find(|(_, kcal)| invalid_kcal(**kcal)) {
                return Err(format!(
                    "calories of meal '{meal}' in profile '{name}' must be a non-negative number"
                ));
            }
        }
        if let Some((tier, _)) = self.cheat_tiers.iter().find(|(_, t)| invalid_kcal(t.calories)) {
            return Err(format!("calories of cheat tier '{tier}' must be a non-negative number"));
        }
        if let Some(stats) = &self.user_stats {
            let positive = |v: f64| v.is_finite() && v > 0.0;
            if !positive(stats.bmr) || !positive(stats.daily_activity_multiplier) {
                return Err("user_stats bmr and daily_activity_multiplier must be greater than 0".to_string());
            }
        }
        Ok(())
    }

    pub fn profile(&self, name: &str) -> Result<&MealPlanProfile, TrackerError> {
        self.profiles
            .get(name)
            .ok_or_else(|| TrackerError::UnknownProfile(name.to_string()))
    }

    pub fn profile_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn cheat_calories(&self, size: CheatSize) -> Result<f64, TrackerError> {
        self.cheat_tiers
            .get(size.as_str())
            .map(|tier| tier.calories)
            .ok_or_else(|| TrackerError::UnknownCheatTier(size.as_str().to_string()))
    }

    /// BMR times activity multiplier, or the fixed default when stats are absent.
    #[must_use]
    pub fn base_tdee(&self) -> Lookup<f64> {
        match &self.user_stats {
            Some(stats) => Lookup::Found(stats.tdee()),
            None => {
                debug!("user_stats missing, using default base TDEE");
                Lookup::Fallback(DEFAULT_BASE_TDEE)
            }
        }
    }

    /// Plan that is pre-selected for a weekday; the first profile when the
    /// weekday's plan is not configured.
    #[must_use]
    pub fn default_day_type(&self, weekday: Weekday) -> Lookup<&str> {
        let mapped = day_type_for(weekday);
        match self.profiles.get_key_value(mapped) {
            Some((key, _)) => Lookup::Found(key.as_str()),
            None => Lookup::Fallback(self.profiles.keys().next().map_or(mapped, String::as_str)),
        }
    }
}

#[must_use]
pub fn day_type_for(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon | Weekday::Wed | Weekday::Fri => "mon_wed_fri",
        Weekday::Tue | Weekday::Thu | Weekday::Sat => "tue_thu_sat",
        Weekday::Sun => "sunday",
    }
}
