use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, Width, object::Columns},
};

use dietlog_core::PlanConfig;

use super::helpers::kcal;
use crate::config::Config;

pub(crate) fn cmd_plans(config: &Config, json: bool) -> Result<()> {
    let plans = PlanConfig::load(&config.plans_path)?;
    let base_tdee = plans.base_tdee();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "plans": plans,
                "base_tdee": base_tdee,
            }))?
        );
        return Ok(());
    }

    #[derive(Tabled)]
    struct PlanRow {
        #[tabled(rename = "Plan")]
        name: String,
        #[tabled(rename = "Total (kcal)")]
        total: String,
        #[tabled(rename = "Meals")]
        meals: String,
    }

    let rows: Vec<PlanRow> = plans
        .profiles
        .iter()
        .map(|(name, profile)| {
            let meals = profile
                .meals
                .iter()
                .map(|(meal, cal)| format!("{meal} {}", kcal(*cal)))
                .collect::<Vec<_>>()
                .join(", ");
            PlanRow {
                name: name.clone(),
                total: kcal(profile.total_calories),
                meals: if meals.is_empty() {
                    "-".to_string()
                } else {
                    meals
                },
            }
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .with(Modify::new(Columns::single(2)).with(Width::truncate(60).suffix("...")))
        .to_string();
    println!("{table}");

    if plans.cheat_tiers.is_empty() {
        println!("Cheat tiers: none configured");
    } else {
        let tiers = plans
            .cheat_tiers
            .iter()
            .map(|(name, tier)| format!("{name} +{}", kcal(tier.calories)))
            .collect::<Vec<_>>()
            .join(", ");
        println!("Cheat tiers: {tiers}");
    }

    if base_tdee.is_fallback() {
        eprintln!(
            "Warning: user stats missing, using base TDEE {} kcal",
            kcal(*base_tdee.value())
        );
    } else {
        println!("Base TDEE: {} kcal", kcal(*base_tdee.value()));
    }

    Ok(())
}
