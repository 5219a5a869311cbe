mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::Level;

use crate::commands::{LogOptions, cmd_chart, cmd_history, cmd_log, cmd_plans};
use crate::config::Config;
use dietlog_core::models::{CheatSize, DietStatus, TrainingType};

#[derive(Parser)]
#[command(
    name = "dietlog",
    version,
    about = "A daily diet and predicted-weight logger",
    long_about = "Log each day against a meal plan, estimate training burn, \
                  and track the predicted weight trend in a CSV history."
)]
struct Cli {
    /// Meal plan file (default: meal_plans.json in the data directory)
    #[arg(long, global = true)]
    plans: Option<PathBuf>,
    /// History CSV (default: history.csv in the data directory)
    #[arg(long, global = true)]
    history: Option<PathBuf>,
    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log a day and append it to the history
    Log {
        /// Meal plan for the day (default: the weekday's plan)
        #[arg(short, long)]
        plan: Option<String>,
        /// Did you follow the plan: yes, partial, or no
        #[arg(short, long, default_value = "yes", value_parser = parse_status)]
        status: DietStatus,
        /// Meal skipped (with --status partial)
        #[arg(long)]
        skip: Option<String>,
        /// Meal replaced by the cheat meal (with --status no; omit for extra food)
        #[arg(long)]
        replace: Option<String>,
        /// Cheat size: small, medium, large (with --status no)
        #[arg(long, default_value = "small", value_parser = parse_cheat)]
        cheat: CheatSize,
        /// Training type: legs, upper, liss, hiit
        #[arg(short, long, value_parser = parse_training)]
        train: Option<TrainingType>,
        /// Training duration in minutes (with --train; default: 60)
        #[arg(short, long)]
        minutes: Option<u32>,
        /// Scale weight in kg
        #[arg(short, long)]
        weight: Option<f64>,
        /// Date to log (YYYY-MM-DD, today, yesterday; default: today)
        #[arg(long)]
        date: Option<String>,
        /// Show the computed day without saving it
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show logged days
    History {
        /// Only the most recent N days
        #[arg(short, long)]
        days: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Chart the predicted weight trend
    Chart {
        /// Write an SVG file instead of drawing in the terminal
        #[arg(long)]
        svg: Option<PathBuf>,
        /// Chart width in columns
        #[arg(long, default_value_t = 60)]
        width: usize,
        /// Chart height in rows
        #[arg(long, default_value_t = 15)]
        height: usize,
    },
    /// Show the configured meal plans and cheat tiers
    Plans {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve the daily log form over HTTP
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8501)]
        port: u16,
        /// Address to bind to
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
}

fn parse_status(s: &str) -> Result<DietStatus, String> {
    s.parse().map_err(|e: dietlog_core::TrackerError| e.to_string())
}

fn parse_cheat(s: &str) -> Result<CheatSize, String> {
    s.parse().map_err(|e: dietlog_core::TrackerError| e.to_string())
}

fn parse_training(s: &str) -> Result<TrainingType, String> {
    s.parse().map_err(|e: dietlog_core::TrackerError| e.to_string())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.plans, cli.history)?;

    match cli.command {
        Commands::Log {
            plan,
            status,
            skip,
            replace,
            cheat,
            train,
            minutes,
            weight,
            date,
            dry_run,
            json,
        } => cmd_log(
            &config,
            LogOptions {
                plan,
                status,
                skip,
                replace,
                cheat,
                train,
                minutes,
                weight,
                date,
                dry_run,
                json,
            },
        ),
        Commands::History { days, json } => cmd_history(&config, days, json),
        Commands::Chart { svg, width, height } => {
            cmd_chart(&config, svg.as_deref(), width, height)
        }
        Commands::Plans { json } => cmd_plans(&config, json),
        Commands::Serve { port, bind } => {
            server::start_server(config.plans_path, config.history_path, port, &bind).await
        }
    }
}
