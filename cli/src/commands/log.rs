use anyhow::{Result, bail};
use chrono::{Local, NaiveDate};
use std::process;

use dietlog_core::energy::PriorSource;
use dietlog_core::models::{
    Adherence, CheatSize, DEFAULT_TRAINING_MINUTES, DayForm, DietStatus, EXTRA_FOOD_LABEL,
    MealChoice, Training, TrainingType,
};
use dietlog_core::{DayView, HistoryStore, Tracker, TrackerError};

use super::helpers::{json_error, kcal, parse_date};
use crate::config::Config;

/// Selections for `dietlog log`, straight from the command line.
pub(crate) struct LogOptions {
    pub plan: Option<String>,
    pub status: DietStatus,
    pub skip: Option<String>,
    pub replace: Option<String>,
    pub cheat: CheatSize,
    pub train: Option<TrainingType>,
    pub minutes: Option<u32>,
    pub weight: Option<f64>,
    pub date: Option<String>,
    pub dry_run: bool,
    pub json: bool,
}

pub(crate) fn cmd_log(config: &Config, opts: LogOptions) -> Result<()> {
    let date = parse_date(opts.date.as_deref(), Local::now().date_naive())?;
    let store = HistoryStore::new(&config.history_path);
    let mut tracker = Tracker::load(&config.plans_path, &store)?;

    if tracker.base_tdee().is_fallback() && !opts.json {
        eprintln!(
            "Warning: user stats missing, using base TDEE {} kcal",
            kcal(*tracker.base_tdee().value())
        );
    }

    let form = build_form(&tracker, &opts, date)?;
    let view = tracker.compute(&form, date)?;

    if opts.dry_run {
        if opts.json {
            println!("{}", serde_json::to_string_pretty(&view)?);
        } else {
            print_day_view(&view);
            println!("\n(dry run, nothing saved)");
        }
        return Ok(());
    }

    match tracker.save(&store, &form, date) {
        Ok(entry) => {
            if opts.json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            } else {
                print_day_view(&view);
                println!("\nSaved {} to {}", entry.date, store.path().display());
            }
            Ok(())
        }
        Err(e @ TrackerError::DuplicateDate(_)) => {
            if opts.json {
                println!("{}", json_error(&e.to_string()));
            } else {
                eprintln!("Warning: {e}. Nothing was saved.");
            }
            process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

fn build_form(tracker: &Tracker, opts: &LogOptions, date: NaiveDate) -> Result<DayForm> {
    let day_type = match &opts.plan {
        Some(plan) => plan.clone(),
        None => tracker.default_form(date).day_type,
    };

    let adherence = match opts.status {
        DietStatus::Yes => {
            if opts.skip.is_some() || opts.replace.is_some() {
                bail!("--skip and --replace only apply with --status partial or --status no");
            }
            Adherence::Followed
        }
        DietStatus::Partial => {
            if opts.replace.is_some() {
                bail!("--replace only applies with --status no; use --skip for a skipped meal");
            }
            Adherence::Partial {
                skipped: opts.skip.clone(),
            }
        }
        DietStatus::No => {
            if opts.skip.is_some() {
                bail!("--skip only applies with --status partial; use --replace instead");
            }
            Adherence::Off {
                replaced: MealChoice::from(opts.replace.clone()),
                cheat: opts.cheat,
            }
        }
    };

    if opts.train.is_none() && opts.minutes.is_some() {
        bail!("--minutes only applies with --train");
    }
    let training = opts
        .train
        .map(|kind| Training::new(kind, opts.minutes.unwrap_or(DEFAULT_TRAINING_MINUTES)))
        .transpose()?;

    Ok(DayForm {
        day_type,
        adherence,
        training,
        logged_weight: opts.weight,
    })
}

fn print_day_view(view: &DayView) {
    println!(
        "=== {} (week {}) ===\n",
        view.date.format("%A, %b %d %Y"),
        view.week
    );
    println!("  Plan:        {} ({})", view.day_type, view.status);

    let intake = &view.intake;
    let mut detail = format!("plan {}", kcal(intake.plan_calories));
    match (&intake.removed_meal, intake.cheat) {
        (Some(meal), None) => {
            detail.push_str(&format!(", skipped {meal} -{}", kcal(intake.removed_calories)));
        }
        (removed, Some(cheat)) => {
            let replaced = removed.as_deref().unwrap_or(EXTRA_FOOD_LABEL);
            detail.push_str(&format!(
                ", replaced {replaced} -{}, {cheat} cheat +{}",
                kcal(intake.removed_calories),
                kcal(intake.added_calories)
            ));
        }
        (None, None) => {}
    }
    println!("  Intake:      {} kcal ({detail})", kcal(intake.total));

    match &view.training {
        Some(t) => println!(
            "  Burn:        {} kcal ({}, {} min)",
            kcal(view.burn),
            t.kind,
            t.minutes
        ),
        None => println!("  Burn:        0 kcal (no training)"),
    }

    let tdee_note = if view.base_tdee.is_fallback() {
        " (default, user stats missing)"
    } else {
        ""
    };
    println!(
        "  Base TDEE:   {} kcal{tdee_note}",
        kcal(*view.base_tdee.value())
    );
    println!(
        "  Net deficit: {} kcal ({:+.3} kg)",
        kcal(view.net_deficit),
        -view.weight_change
    );

    let from = match view.prior_weight.source {
        PriorSource::History => "last prediction",
        PriorSource::LoggedWeight => "logged weight",
        PriorSource::Default => "default start weight",
    };
    println!(
        "  Predicted:   {:.2} kg (from {:.2} kg, {from})",
        view.predicted_weight, view.prior_weight.kg
    );
    if let Some(kg) = view.logged_weight {
        println!("  Scale:       {kg:.1} kg");
    }
}
