use std::path::Path;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::energy::{
    IntakeBreakdown, PriorWeight, calculate_intake, estimate_burn, predict_weight,
    resolve_prior_weight,
};
use crate::error::TrackerError;
use crate::history::{HistoryStore, weight_series};
use crate::models::{
    Adherence, DayForm, DietStatus, HistoryEntry, Lookup, Training, validate_weight,
};
use crate::plans::PlanConfig;

/// Everything computed for one day from the current selections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayView {
    pub date: NaiveDate,
    pub week: u32,
    pub day_type: String,
    pub status: DietStatus,
    pub base_tdee: Lookup<f64>,
    pub intake: IntakeBreakdown,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training: Option<Training>,
    pub burn: f64,
    pub total_out: f64,
    pub net_deficit: f64,
    pub weight_change: f64,
    pub prior_weight: PriorWeight,
    pub predicted_weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logged_weight: Option<f64>,
}

impl DayView {
    #[must_use]
    pub fn to_entry(&self) -> HistoryEntry {
        HistoryEntry {
            date: self.date,
            week: self.week,
            day_type: self.day_type.clone(),
            diet_status: self.status,
            calories_in: self.intake.total,
            calories_burned: self.burn,
            net_deficit: self.net_deficit,
            predicted_weight: Some(self.predicted_weight),
            actual_weight: self.logged_weight,
        }
    }
}

/// Application state for one render cycle: the plan file and the history
/// as they were on disk when the cycle started.
#[derive(Debug, Clone)]
pub struct Tracker {
    config: PlanConfig,
    history: Vec<HistoryEntry>,
}

impl Tracker {
    pub fn load(plans_path: &Path, store: &HistoryStore) -> Result<Self, TrackerError> {
        let config = PlanConfig::load(plans_path)?;
        let history = store.load()?;
        Ok(Self { config, history })
    }

    #[must_use]
    pub fn from_parts(config: PlanConfig, history: Vec<HistoryEntry>) -> Self {
        Self { config, history }
    }

    #[must_use]
    pub fn config(&self) -> &PlanConfig {
        &self.config
    }

    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    #[must_use]
    pub fn base_tdee(&self) -> Lookup<f64> {
        self.config.base_tdee()
    }

    #[must_use]
    pub fn weight_series(&self) -> Vec<(NaiveDate, f64)> {
        weight_series(&self.history)
    }

    #[must_use]
    pub fn is_logged(&self, date: NaiveDate) -> bool {
        self.history.iter().any(|e| e.date == date)
    }

    /// Initial selections for a day: the weekday's plan, followed, no
    /// training, no weight.
    #[must_use]
    pub fn default_form(&self, date: NaiveDate) -> DayForm {
        DayForm {
            day_type: self
                .config
                .default_day_type(date.weekday())
                .into_value()
                .to_string(),
            adherence: Adherence::Followed,
            training: None,
            logged_weight: None,
        }
    }

    /// Pure computation of the day's numbers; nothing is written.
    pub fn compute(&self, form: &DayForm, date: NaiveDate) -> Result<DayView, TrackerError> {
        let logged_weight = form.logged_weight.map(validate_weight).transpose()?;
        let intake = calculate_intake(&self.config, &form.day_type, &form.adherence)?;
        let burn = estimate_burn(form.training.as_ref());
        let base_tdee = self.base_tdee();
        let prior_weight = resolve_prior_weight(&self.history, logged_weight);
        let prediction = predict_weight(*base_tdee.value(), burn, intake.total, prior_weight.kg);

        debug!(
            %date,
            day_type = %form.day_type,
            intake = intake.total,
            burn,
            net_deficit = prediction.net_deficit,
            predicted = prediction.predicted_weight,
            "computed day"
        );

        Ok(DayView {
            date,
            week: date.iso_week().week(),
            day_type: form.day_type.clone(),
            status: form.adherence.status(),
            base_tdee,
            intake,
            training: form.training,
            burn,
            total_out: prediction.total_out,
            net_deficit: prediction.net_deficit,
            weight_change: prediction.weight_change,
            prior_weight,
            predicted_weight: prediction.predicted_weight,
            logged_weight,
        })
    }

    /// Compute and append the day, then reload history so the state reflects
    /// the new row. A duplicate date leaves both file and state untouched.
    pub fn save(
        &mut self,
        store: &HistoryStore,
        form: &DayForm,
        date: NaiveDate,
    ) -> Result<HistoryEntry, TrackerError> {
        let entry = self.compute(form, date)?.to_entry();
        store.append(&entry)?;
        info!(%date, predicted = ?entry.predicted_weight, "day saved");
        self.reload(store)?;
        Ok(entry)
    }

    /// Re-read history from disk, discarding the cached rows.
    pub fn reload(&mut self, store: &HistoryStore) -> Result<(), TrackerError> {
        self.history = store.load()?;
        Ok(())
    }
}
