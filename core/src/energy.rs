//! Calorie intake, exercise burn, and the predicted-weight rule.

use serde::Serialize;

use crate::error::TrackerError;
use crate::models::{
    Adherence, CheatSize, DEFAULT_START_WEIGHT_KG, HistoryEntry, KCAL_PER_KG, MealChoice,
    MealPlanProfile, Training,
};
use crate::plans::PlanConfig;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntakeBreakdown {
    pub plan_calories: f64,
    /// Meal skipped or replaced, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_meal: Option<String>,
    pub removed_calories: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cheat: Option<CheatSize>,
    pub added_calories: f64,
    pub total: f64,
}

/// Effective intake for a plan given how closely it was followed.
pub fn calculate_intake(
    config: &PlanConfig,
    day_type: &str,
    adherence: &Adherence,
) -> Result<IntakeBreakdown, TrackerError> {
    let profile = config.profile(day_type)?;
    let plan_calories = profile.total_calories;

    let (removed_meal, removed_calories, cheat, added_calories) = match adherence {
        Adherence::Followed => (None, 0.0, None, 0.0),
        Adherence::Partial { skipped } => {
            let removed = match skipped {
                Some(meal) => Some(meal_calories(day_type, profile, meal)?),
                // Nothing to skip in a plan without meals.
                None if profile.meals.is_empty() => None,
                None => return Err(TrackerError::MissingMealSelection(day_type.to_string())),
            };
            let kcal = removed.as_ref().map_or(0.0, |(_, kcal)| *kcal);
            (removed.map(|(meal, _)| meal), kcal, None, 0.0)
        }
        Adherence::Off { replaced, cheat } => {
            let removed = match replaced {
                MealChoice::ExtraFoodOnly => None,
                MealChoice::Meal(meal) => Some(meal_calories(day_type, profile, meal)?),
            };
            let kcal = removed.as_ref().map_or(0.0, |(_, kcal)| *kcal);
            let added = config.cheat_calories(*cheat)?;
            (removed.map(|(meal, _)| meal), kcal, Some(*cheat), added)
        }
    };

    Ok(IntakeBreakdown {
        plan_calories,
        removed_meal,
        removed_calories,
        cheat,
        added_calories,
        total: plan_calories - removed_calories + added_calories,
    })
}

fn meal_calories(
    day_type: &str,
    profile: &MealPlanProfile,
    meal: &str,
) -> Result<(String, f64), TrackerError> {
    profile
        .meals
        .get(meal)
        .map(|kcal| (meal.to_string(), *kcal))
        .ok_or_else(|| TrackerError::UnknownMeal {
            profile: day_type.to_string(),
            meal: meal.to_string(),
        })
}

/// Exercise burn: minutes times the per-minute rate of the training type.
#[must_use]
pub fn estimate_burn(training: Option<&Training>) -> f64 {
    training.map_or(0.0, |t| f64::from(t.minutes) * t.kind.kcal_per_minute())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorSource {
    /// Predicted weight of the most recent history row.
    History,
    /// Scale weight logged in this session.
    LoggedWeight,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriorWeight {
    pub kg: f64,
    pub source: PriorSource,
}

/// Weight the prediction chain continues from.
#[must_use]
pub fn resolve_prior_weight(history: &[HistoryEntry], logged_weight: Option<f64>) -> PriorWeight {
    if let Some(kg) = history
        .last()
        .and_then(|e| e.predicted_weight)
        .filter(|kg| kg.is_finite())
    {
        return PriorWeight {
            kg,
            source: PriorSource::History,
        };
    }
    match logged_weight.filter(|kg| *kg > 0.0) {
        Some(kg) => PriorWeight {
            kg,
            source: PriorSource::LoggedWeight,
        },
        None => PriorWeight {
            kg: DEFAULT_START_WEIGHT_KG,
            source: PriorSource::Default,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub total_out: f64,
    /// Positive when more was burned than eaten.
    pub net_deficit: f64,
    pub weight_change: f64,
    pub predicted_weight: f64,
}

#[must_use]
pub fn predict_weight(base_tdee: f64, burn: f64, intake: f64, prior_kg: f64) -> Prediction {
    let total_out = base_tdee + burn;
    let net_deficit = total_out - intake;
    let weight_change = net_deficit / KCAL_PER_KG;
    Prediction {
        total_out,
        net_deficit,
        weight_change,
        predicted_weight: round2(prior_kg - weight_change),
    }
}

/// Round to the nearest hundredth, halves away from zero.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{DietStatus, TrainingType};
    use crate::plans::tests::sample_config;

    fn history_row(predicted: Option<f64>) -> HistoryEntry {
        HistoryEntry {
            date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            week: 23,
            day_type: "mon_wed_fri".to_string(),
            diet_status: DietStatus::Yes,
            calories_in: 2200.0,
            calories_burned: 0.0,
            net_deficit: 50.0,
            predicted_weight: predicted,
            actual_weight: None,
        }
    }

    #[test]
    fn test_followed_plan_is_total_calories() {
        let config = sample_config();
        let intake = calculate_intake(&config, "mon_wed_fri", &Adherence::Followed).unwrap();
        assert_eq!(intake.total, 2200.0);
        assert_eq!(intake.removed_meal, None);
    }

    #[test]
    fn test_partial_subtracts_skipped_meal_for_every_meal() {
        let config = sample_config();
        for (name, profile) in &config.profiles {
            for (meal, kcal) in &profile.meals {
                let intake = calculate_intake(
                    &config,
                    name,
                    &Adherence::Partial {
                        skipped: Some(meal.clone()),
                    },
                )
                .unwrap();
                assert_eq!(intake.total, profile.total_calories - kcal);
                assert!(intake.total <= profile.total_calories);
                assert_eq!(intake.removed_meal.as_deref(), Some(meal.as_str()));
            }
        }
    }

    #[test]
    fn test_partial_without_selection() {
        let config = sample_config();
        // Sunday has no meals: skipping is a no-op.
        let intake =
            calculate_intake(&config, "sunday", &Adherence::Partial { skipped: None }).unwrap();
        assert_eq!(intake.total, 2400.0);

        let err = calculate_intake(&config, "mon_wed_fri", &Adherence::Partial { skipped: None })
            .unwrap_err();
        assert!(matches!(err, TrackerError::MissingMealSelection(_)));
    }

    #[test]
    fn test_partial_unknown_meal() {
        let config = sample_config();
        let err = calculate_intake(
            &config,
            "tue_thu_sat",
            &Adherence::Partial {
                skipped: Some("snack".to_string()),
            },
        )
        .unwrap_err();
        assert!(matches!(err, TrackerError::UnknownMeal { .. }));
    }

    #[test]
    fn test_off_plan_for_every_tier_and_replacement() {
        let config = sample_config();
        let profile = config.profile("mon_wed_fri").unwrap();
        let mut choices = vec![MealChoice::ExtraFoodOnly];
        choices.extend(profile.meals.keys().cloned().map(MealChoice::Meal));

        for cheat in CheatSize::ALL {
            let added = config.cheat_tiers[cheat.as_str()].calories;
            for replaced in &choices {
                let removed = match replaced {
                    MealChoice::ExtraFoodOnly => 0.0,
                    MealChoice::Meal(m) => profile.meals[m],
                };
                let intake = calculate_intake(
                    &config,
                    "mon_wed_fri",
                    &Adherence::Off {
                        replaced: replaced.clone(),
                        cheat,
                    },
                )
                .unwrap();
                assert_eq!(intake.total, profile.total_calories - removed + added);
                assert_eq!(intake.cheat, Some(cheat));
            }
        }
    }

    #[test]
    fn test_off_plan_with_no_meals_only_adds_cheat() {
        let config = sample_config();
        let intake = calculate_intake(
            &config,
            "sunday",
            &Adherence::Off {
                replaced: MealChoice::ExtraFoodOnly,
                cheat: CheatSize::Large,
            },
        )
        .unwrap();
        assert_eq!(intake.total, 3400.0);
    }

    #[test]
    fn test_unknown_profile() {
        let config = sample_config();
        let err = calculate_intake(&config, "holiday", &Adherence::Followed).unwrap_err();
        assert!(matches!(err, TrackerError::UnknownProfile(_)));
    }

    #[test]
    fn test_no_training_burns_nothing() {
        assert_eq!(estimate_burn(None), 0.0);
    }

    #[test]
    fn test_burn_uses_multiplier_table() {
        let burn = |kind, minutes| estimate_burn(Some(&Training::new(kind, minutes).unwrap()));
        assert_eq!(burn(TrainingType::LiftingLegs, 60), 420.0);
        assert_eq!(burn(TrainingType::LiftingUpper, 60), 240.0);
        assert_eq!(burn(TrainingType::CardioLiss, 30), 180.0);
        assert_eq!(burn(TrainingType::CardioHiit, 20), 200.0);
    }

    #[test]
    fn test_burn_strictly_increasing_in_duration() {
        for kind in TrainingType::ALL {
            let mut previous = 0.0;
            for minutes in (10..=180).step_by(5) {
                let burn = estimate_burn(Some(&Training::new(kind, minutes).unwrap()));
                assert!(burn > previous);
                previous = burn;
            }
        }
    }

    #[test]
    fn test_burn_ordering_follows_multipliers() {
        for a in TrainingType::ALL {
            for b in TrainingType::ALL {
                let burn_a = estimate_burn(Some(&Training::new(a, 45).unwrap()));
                let burn_b = estimate_burn(Some(&Training::new(b, 45).unwrap()));
                assert_eq!(
                    burn_a.partial_cmp(&burn_b),
                    a.kcal_per_minute().partial_cmp(&b.kcal_per_minute())
                );
            }
        }
    }

    #[test]
    fn test_prediction_chain_example() {
        let prior = resolve_prior_weight(&[history_row(Some(80.0))], None);
        assert_eq!(prior.source, PriorSource::History);

        let prediction = predict_weight(2000.0, 300.0, 1800.0, prior.kg);
        assert_eq!(prediction.net_deficit, 500.0);
        assert!((prediction.weight_change - 0.064_935).abs() < 1e-6);
        assert_eq!(prediction.predicted_weight, 79.94);
    }

    #[test]
    fn test_surplus_increases_weight() {
        let prediction = predict_weight(2000.0, 0.0, 2770.0, 70.0);
        assert_eq!(prediction.net_deficit, -770.0);
        assert_eq!(prediction.predicted_weight, 70.1);
    }

    #[test]
    fn test_prior_from_logged_weight_when_history_empty() {
        let prior = resolve_prior_weight(&[], Some(75.0));
        assert_eq!(prior.kg, 75.0);
        assert_eq!(prior.source, PriorSource::LoggedWeight);
    }

    #[test]
    fn test_prior_defaults_to_80() {
        let prior = resolve_prior_weight(&[], None);
        assert_eq!(prior.kg, 80.0);
        assert_eq!(prior.source, PriorSource::Default);
    }

    #[test]
    fn test_history_prediction_wins_over_logged_weight() {
        let prior = resolve_prior_weight(&[history_row(Some(78.3))], Some(75.0));
        assert_eq!(prior.kg, 78.3);
    }

    #[test]
    fn test_missing_last_prediction_falls_through() {
        let history = [history_row(Some(79.0)), history_row(None)];
        assert_eq!(resolve_prior_weight(&history, Some(76.0)).kg, 76.0);
        assert_eq!(resolve_prior_weight(&history, None).kg, 80.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(79.935_064), 79.94);
        assert_eq!(round2(79.934_9), 79.93);
        assert_eq!(round2(-0.125), -0.13);
    }
}
