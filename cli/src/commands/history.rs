use anyhow::{Context, Result};
use std::path::Path;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use dietlog_core::HistoryStore;
use dietlog_core::chart::{render_svg, render_text};
use dietlog_core::history::weight_series;

use super::helpers::kcal;
use crate::config::Config;

pub(crate) fn cmd_history(config: &Config, days: Option<usize>, json: bool) -> Result<()> {
    let entries = HistoryStore::new(&config.history_path).load()?;
    let start = days.map_or(0, |n| entries.len().saturating_sub(n));
    let entries = &entries[start..];

    if json {
        println!("{}", serde_json::to_string_pretty(entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("No entries yet. Use `dietlog log` to record a day.");
        process::exit(2);
    }

    #[derive(Tabled)]
    struct HistoryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Wk")]
        week: u32,
        #[tabled(rename = "Plan")]
        day_type: String,
        #[tabled(rename = "Diet")]
        status: String,
        #[tabled(rename = "In")]
        calories_in: String,
        #[tabled(rename = "Burned")]
        burned: String,
        #[tabled(rename = "Deficit")]
        deficit: String,
        #[tabled(rename = "Predicted (kg)")]
        predicted: String,
        #[tabled(rename = "Scale (kg)")]
        actual: String,
    }

    let rows: Vec<HistoryRow> = entries
        .iter()
        .map(|e| HistoryRow {
            date: e.date.format("%Y-%m-%d").to_string(),
            week: e.week,
            day_type: e.day_type.clone(),
            status: e.diet_status.to_string(),
            calories_in: kcal(e.calories_in),
            burned: kcal(e.calories_burned),
            deficit: kcal(e.net_deficit),
            predicted: e.predicted_weight.map_or("-".into(), |v| format!("{v:.2}")),
            actual: e.actual_weight.map_or("-".into(), |v| format!("{v:.1}")),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_chart(
    config: &Config,
    svg: Option<&Path>,
    width: usize,
    height: usize,
) -> Result<()> {
    let entries = HistoryStore::new(&config.history_path).load()?;
    let series = weight_series(&entries);

    if series.is_empty() {
        eprintln!("No predicted weights yet. Use `dietlog log` to record a day.");
        process::exit(2);
    }

    if let Some(path) = svg {
        let (w, h) = svg_canvas(width, height);
        let doc = render_svg(&series, w, h).context("nothing to chart")?;
        std::fs::write(path, doc)
            .with_context(|| format!("Failed to write chart: {}", path.display()))?;
        println!("Wrote chart of {} days to {}", series.len(), path.display());
    } else {
        let chart = render_text(&series, width, height).context("nothing to chart")?;
        println!("Predicted weight (kg)\n");
        print!("{chart}");
    }

    Ok(())
}

/// Pixel size of the SVG canvas for a chart of `width` x `height` cells.
fn svg_canvas(width: usize, height: usize) -> (u32, u32) {
    let px = |cells: usize, scale: usize| u32::try_from(cells.saturating_mul(scale)).unwrap_or(u32::MAX);
    (px(width, 12), px(height, 20))
}
