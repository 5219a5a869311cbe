mod helpers;
mod history;
mod log;
mod plans;

pub(crate) use helpers::kcal;
pub(crate) use history::{cmd_chart, cmd_history};
pub(crate) use log::{LogOptions, cmd_log};
pub(crate) use plans::cmd_plans;
