use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;

pub struct Config {
    pub plans_path: PathBuf,
    pub history_path: PathBuf,
}

impl Config {
    /// Resolve the plan and history files. Explicit paths win; anything left
    /// unset lives in the platform data directory, created on demand.
    pub fn load(plans: Option<PathBuf>, history: Option<PathBuf>) -> Result<Self> {
        if let (Some(plans_path), Some(history_path)) = (&plans, &history) {
            return Ok(Config {
                plans_path: plans_path.clone(),
                history_path: history_path.clone(),
            });
        }

        let proj_dirs =
            ProjectDirs::from("", "", "dietlog").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            plans_path: plans.unwrap_or_else(|| data_dir.join("meal_plans.json")),
            history_path: history.unwrap_or_else(|| data_dir.join("history.csv")),
        })
    }
}
