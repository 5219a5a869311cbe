use std::borrow::Cow;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use axum::{
    Form, Json, Router,
    extract::{Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use crate::commands::kcal;
use dietlog_core::chart::render_svg;
use dietlog_core::energy::PriorSource;
use dietlog_core::history::weight_series;
use dietlog_core::models::{
    Adherence, CheatSize, DEFAULT_TRAINING_MINUTES, DayForm, DietStatus, EXTRA_FOOD_LABEL,
    HistoryEntry, MIN_TRAINING_MINUTES, MealChoice, TRAINING_MINUTES_STEP, Training,
    TrainingType,
};
use dietlog_core::{DayView, HistoryStore, Tracker, TrackerError};

const BODY_LIMIT: usize = 64 * 1024;
const CHART_WIDTH: u32 = 640;
const CHART_HEIGHT: u32 = 280;

#[derive(Clone)]
struct AppState {
    plans_path: Arc<PathBuf>,
    store: Arc<Mutex<HistoryStore>>,
}

impl AppState {
    fn new(plans_path: PathBuf, store: HistoryStore) -> Self {
        Self {
            plans_path: Arc::new(plans_path),
            store: Arc::new(Mutex::new(store)),
        }
    }

    /// Fresh plans and history for every request, so edits on disk show up
    /// without restarting the server.
    fn tracker(&self) -> Result<Tracker, TrackerError> {
        let store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        Tracker::load(&self.plans_path, &store)
    }
}

// --- Request / Response types ---

/// Raw form fields, shared by the page, the preview API and the save action.
/// Everything is optional text so a half-filled form never fails to parse.
#[derive(Debug, Default, Deserialize)]
struct FormQuery {
    plan: Option<String>,
    status: Option<String>,
    skip: Option<String>,
    replace: Option<String>,
    cheat: Option<String>,
    trained: Option<String>,
    train_type: Option<String>,
    minutes: Option<String>,
    log_weight: Option<String>,
    weight: Option<String>,
    saved: Option<String>,
}

/// Form selections after defaults are applied.
#[derive(Debug, Clone, PartialEq)]
struct FormState {
    plan: String,
    status: DietStatus,
    skip: Option<String>,
    replace: Option<String>,
    cheat: CheatSize,
    trained: bool,
    train_type: TrainingType,
    minutes: u32,
    log_weight: bool,
    weight: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

impl FormState {
    fn resolve(query: &FormQuery, tracker: &Tracker, date: NaiveDate) -> Result<Self, TrackerError> {
        let plan = match non_empty(query.plan.as_deref()) {
            Some(plan) => plan.to_string(),
            None => tracker.default_form(date).day_type,
        };
        let profile = tracker.config().profile(&plan)?;

        // Meal selections left over from another plan fall back to the
        // first meal (skip) or extra food (replace).
        let skip = non_empty(query.skip.as_deref())
            .filter(|meal| profile.meals.contains_key(*meal))
            .map(str::to_string)
            .or_else(|| profile.meals.keys().next().cloned());
        let replace = non_empty(query.replace.as_deref())
            .filter(|meal| profile.meals.contains_key(*meal))
            .map(str::to_string);

        let minutes = match non_empty(query.minutes.as_deref()) {
            Some(m) => m.parse::<u32>().map_err(|_| TrackerError::InvalidChoice {
                field: "training duration",
                value: m.to_string(),
                expected: "a whole number of minutes",
            })?,
            None => DEFAULT_TRAINING_MINUTES,
        };

        Ok(Self {
            status: non_empty(query.status.as_deref())
                .map(str::parse::<DietStatus>)
                .transpose()?
                .unwrap_or(DietStatus::Yes),
            skip,
            replace,
            cheat: non_empty(query.cheat.as_deref())
                .map(str::parse::<CheatSize>)
                .transpose()?
                .unwrap_or_default(),
            trained: query.trained.is_some(),
            train_type: non_empty(query.train_type.as_deref())
                .map(str::parse::<TrainingType>)
                .transpose()?
                .unwrap_or(TrainingType::LiftingLegs),
            minutes,
            log_weight: query.log_weight.is_some(),
            weight: query.weight.as_deref().unwrap_or_default().trim().to_string(),
            plan,
        })
    }

    /// Reject a save whose sub-selections were filled in by `resolve` rather
    /// than submitted, e.g. when the status changed without an "Update".
    fn check_submitted(&self, query: &FormQuery, tracker: &Tracker) -> Result<(), TrackerError> {
        match self.status {
            DietStatus::Yes => {}
            DietStatus::Partial => {
                let has_meals = tracker
                    .config()
                    .profile(&self.plan)
                    .is_ok_and(|profile| !profile.meals.is_empty());
                if has_meals && non_empty(query.skip.as_deref()) != self.skip.as_deref() {
                    return Err(TrackerError::MissingMealSelection(self.plan.clone()));
                }
            }
            DietStatus::No => {
                if query.replace.is_none()
                    || non_empty(query.replace.as_deref()) != self.replace.as_deref()
                {
                    return Err(TrackerError::InvalidChoice {
                        field: "replaced meal",
                        value: query.replace.clone().unwrap_or_default(),
                        expected: "a meal from the selected plan or extra food",
                    });
                }
                if non_empty(query.cheat.as_deref()).is_none() {
                    return Err(TrackerError::InvalidChoice {
                        field: "cheat size",
                        value: String::new(),
                        expected: "small, medium, or large",
                    });
                }
            }
        }
        if self.trained && non_empty(query.train_type.as_deref()).is_none() {
            return Err(TrackerError::InvalidChoice {
                field: "training type",
                value: String::new(),
                expected: "legs, upper, liss, or hiit",
            });
        }
        Ok(())
    }

    fn to_day_form(&self) -> Result<DayForm, TrackerError> {
        let adherence = match self.status {
            DietStatus::Yes => Adherence::Followed,
            DietStatus::Partial => Adherence::Partial {
                skipped: self.skip.clone(),
            },
            DietStatus::No => Adherence::Off {
                replaced: MealChoice::from(self.replace.clone()),
                cheat: self.cheat,
            },
        };

        let training = if self.trained {
            Some(Training::new(self.train_type, self.minutes)?)
        } else {
            None
        };

        let logged_weight = if self.log_weight {
            Some(self.weight.parse::<f64>().map_err(|_| TrackerError::InvalidChoice {
                field: "weight",
                value: self.weight.clone(),
                expected: "a number of kilograms",
            })?)
        } else {
            None
        };

        Ok(DayForm {
            day_type: self.plan.clone(),
            adherence,
            training,
            logged_weight,
        })
    }
}

/// Body of `POST /api/entries`.
#[derive(Deserialize)]
struct EntryRequest {
    date: Option<NaiveDate>,
    day_type: Option<String>,
    status: DietStatus,
    skipped_meal: Option<String>,
    replaced_meal: Option<String>,
    #[serde(default)]
    cheat_size: CheatSize,
    training: Option<TrainingRequest>,
    logged_weight: Option<f64>,
}

#[derive(Deserialize)]
struct TrainingRequest {
    #[serde(rename = "type")]
    kind: TrainingType,
    #[serde(default = "default_minutes")]
    minutes: u32,
}

fn default_minutes() -> u32 {
    DEFAULT_TRAINING_MINUTES
}

impl EntryRequest {
    fn to_day_form(&self, tracker: &Tracker, date: NaiveDate) -> Result<DayForm, TrackerError> {
        let adherence = match self.status {
            DietStatus::Yes => Adherence::Followed,
            DietStatus::Partial => Adherence::Partial {
                skipped: self.skipped_meal.clone(),
            },
            DietStatus::No => Adherence::Off {
                replaced: MealChoice::from(self.replaced_meal.clone()),
                cheat: self.cheat_size,
            },
        };
        Ok(DayForm {
            day_type: self
                .day_type
                .clone()
                .unwrap_or_else(|| tracker.default_form(date).day_type),
            adherence,
            training: self
                .training
                .as_ref()
                .map(|t| Training::new(t.kind, t.minutes))
                .transpose()?,
            logged_weight: self.logged_weight,
        })
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<TrackerError> for ApiError {
    fn from(err: TrackerError) -> Self {
        if matches!(err, TrackerError::DuplicateDate(_)) {
            Self::Conflict(err.to_string())
        } else if err.is_invalid_input() {
            Self::BadRequest(err.to_string())
        } else if err.is_blocking() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Internal(err.into())
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'; style-src 'unsafe-inline'; form-action 'self'"),
    );
    response
}

// --- HTML rendering ---

enum Notice {
    Saved(NaiveDate),
    Duplicate(String),
    Error(String),
}

fn esc(text: &str) -> Cow<'_, str> {
    html_escape::encode_text(text)
}

fn attr(value: &str) -> Cow<'_, str> {
    html_escape::encode_double_quoted_attribute(value)
}

fn checked(on: bool) -> &'static str {
    if on { " checked" } else { "" }
}

fn select(name: &str, options: &[(&str, &str)], selected: &str) -> String {
    let mut html = format!(r#"<select name="{name}">"#);
    for (value, label) in options {
        let sel = if *value == selected { " selected" } else { "" };
        let _ = write!(
            html,
            r#"<option value="{}"{sel}>{}</option>"#,
            attr(value),
            esc(label)
        );
    }
    html.push_str("</select>");
    html
}

fn page(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Weight Tracker</title>
<style>
body {{ font-family: system-ui, sans-serif; max-width: 720px; margin: 0 auto; padding: 1rem; color: #222; }}
fieldset {{ border: 1px solid #ccc; border-radius: 6px; margin-bottom: 1rem; }}
label {{ display: inline-block; margin: 0.25rem 0.75rem 0.25rem 0; }}
.info {{ background: #eef5ff; padding: 0.5rem; border-radius: 4px; margin: 0.5rem 0; }}
.warn {{ background: #fff5d6; padding: 0.5rem; border-radius: 4px; margin: 0.5rem 0; }}
.error {{ background: #fde2e2; padding: 0.5rem; border-radius: 4px; margin: 0.5rem 0; }}
.ok {{ background: #e3f7e3; padding: 0.5rem; border-radius: 4px; margin: 0.5rem 0; }}
table {{ border-collapse: collapse; }}
td {{ padding: 0.2rem 0.75rem 0.2rem 0; }}
td.num {{ text-align: right; }}
button.primary {{ font-weight: bold; }}
</style>
</head>
<body>
<h1>Weight Tracker</h1>
{body}
</body>
</html>
"#
    )
}

fn render_page(
    tracker: &Tracker,
    state: &FormState,
    date: NaiveDate,
    notice: Option<&Notice>,
) -> String {
    let mut body = String::new();

    match notice {
        Some(Notice::Saved(day)) => {
            let _ = write!(body, r#"<div class="ok">Saved {day} to history.</div>"#);
        }
        Some(Notice::Duplicate(msg)) => {
            let _ = write!(body, r#"<div class="warn">{}. Nothing was saved.</div>"#, esc(msg));
        }
        Some(Notice::Error(msg)) => {
            let _ = write!(body, r#"<div class="error">{}</div>"#, esc(msg));
        }
        None => {}
    }

    let base_tdee = tracker.base_tdee();
    if base_tdee.is_fallback() {
        let _ = write!(
            body,
            r#"<div class="warn">User stats missing. Using base TDEE {} kcal.</div>"#,
            kcal(*base_tdee.value())
        );
    } else {
        let _ = write!(
            body,
            r#"<div class="info">Base TDEE: {} kcal</div>"#,
            kcal(*base_tdee.value())
        );
    }

    let _ = write!(
        body,
        r#"<h2>{}</h2><form method="get" action="/">"#,
        date.format("%A, %B %-d %Y")
    );
    body.push_str(&diet_section(tracker, state));
    body.push_str(&training_section(state));
    body.push_str(&weight_section(state));

    let view = state
        .to_day_form()
        .and_then(|form| tracker.compute(&form, date));
    body.push_str(&summary_section(&view));

    if tracker.is_logged(date) {
        body.push_str(
            r#"<div class="warn">This day is already in the history. Saving again will be refused.</div>"#,
        );
    }
    body.push_str(
        r#"<p><button type="submit">Update</button> <button type="submit" class="primary" formmethod="post" formaction="/save">Save day to history</button></p></form>"#,
    );

    let series = tracker.weight_series();
    if let Some(svg) = render_svg(&series, CHART_WIDTH, CHART_HEIGHT) {
        let _ = write!(body, "<h2>Predicted weight</h2>{svg}");
    }

    page(&body)
}

fn diet_section(tracker: &Tracker, state: &FormState) -> String {
    let plans: Vec<(&str, &str)> = tracker.config().profile_names().map(|n| (n, n)).collect();
    let mut html = format!(
        "<fieldset><legend>Diet</legend><label>Which meal plan? {}</label><div>Did you follow the plan? ",
        select("plan", &plans, &state.plan)
    );
    for status in DietStatus::ALL {
        let _ = write!(
            html,
            r#"<label><input type="radio" name="status" value="{s}"{c}> {s}</label>"#,
            s = status.as_str(),
            c = checked(status == state.status)
        );
    }
    html.push_str("</div>");

    let meals = tracker
        .config()
        .profile(&state.plan)
        .map(|profile| profile.meal_names())
        .unwrap_or_default();

    match state.status {
        DietStatus::Yes => {}
        DietStatus::Partial => {
            if meals.is_empty() {
                html.push_str(r#"<div class="info">This plan has no meals to skip.</div>"#);
            } else {
                let options: Vec<(&str, &str)> = meals.iter().map(|m| (*m, *m)).collect();
                let _ = write!(
                    html,
                    "<label>Which meal did you skip? {}</label>",
                    select("skip", &options, state.skip.as_deref().unwrap_or_default())
                );
            }
        }
        DietStatus::No => {
            let mut options = vec![("", EXTRA_FOOD_LABEL)];
            options.extend(meals.iter().map(|m| (*m, *m)));
            let sizes: Vec<(&str, &str)> = CheatSize::ALL
                .iter()
                .map(|c| (c.as_str(), c.as_str()))
                .collect();
            let _ = write!(
                html,
                "<label>Which meal did you replace? {}</label><label>Cheat size {}</label>",
                select("replace", &options, state.replace.as_deref().unwrap_or_default()),
                select("cheat", &sizes, state.cheat.as_str())
            );
        }
    }
    html.push_str("</fieldset>");
    html
}

fn training_section(state: &FormState) -> String {
    let mut html = format!(
        r#"<fieldset><legend>Training</legend><label><input type="checkbox" name="trained"{}> Did you train today?</label>"#,
        checked(state.trained)
    );
    if state.trained {
        let types: Vec<(&str, &str)> = TrainingType::ALL
            .iter()
            .map(|t| (t.slug(), t.label()))
            .collect();
        let _ = write!(
            html,
            r#"<label>Type {}</label><label>Duration (mins) <input type="number" name="minutes" min="{MIN_TRAINING_MINUTES}" step="{TRAINING_MINUTES_STEP}" value="{}"></label>"#,
            select("train_type", &types, state.train_type.slug()),
            state.minutes
        );
    }
    html.push_str("</fieldset>");
    html
}

fn weight_section(state: &FormState) -> String {
    let mut html = format!(
        r#"<fieldset><legend>Body weight</legend><label><input type="checkbox" name="log_weight"{}> Log body weight?</label>"#,
        checked(state.log_weight)
    );
    if state.log_weight {
        let _ = write!(
            html,
            r#"<label>Current scale weight (kg) <input type="number" name="weight" min="0" step="0.1" value="{}"></label>"#,
            attr(&state.weight)
        );
    }
    html.push_str("</fieldset>");
    html
}

fn summary_section(view: &Result<DayView, TrackerError>) -> String {
    let view = match view {
        Ok(view) => view,
        Err(e) => return format!(r#"<div class="error">{}</div>"#, esc(&e.to_string())),
    };

    let intake = &view.intake;
    let mut html = String::from("<h2>Summary</h2>");
    match (&intake.removed_meal, intake.cheat) {
        (Some(meal), None) => {
            let _ = write!(
                html,
                r#"<div class="info">Skipped {}: -{} kcal</div>"#,
                esc(meal),
                kcal(intake.removed_calories)
            );
        }
        (removed, Some(cheat)) => {
            let replaced = removed.as_deref().unwrap_or(EXTRA_FOOD_LABEL);
            let _ = write!(
                html,
                r#"<div class="info">Replaced {}: -{} kcal, {cheat} cheat: +{} kcal</div>"#,
                esc(replaced),
                kcal(intake.removed_calories),
                kcal(intake.added_calories)
            );
        }
        (None, None) => {}
    }

    let from = match view.prior_weight.source {
        PriorSource::History => "last prediction",
        PriorSource::LoggedWeight => "logged weight",
        PriorSource::Default => "default start weight",
    };
    let _ = write!(
        html,
        r#"<table>
<tr><td>Calories in</td><td class="num">{} kcal</td></tr>
<tr><td>Training burn</td><td class="num">{} kcal</td></tr>
<tr><td>Total out</td><td class="num">{} kcal</td></tr>
<tr><td>Net deficit</td><td class="num">{} kcal</td></tr>
<tr><td>Predicted weight</td><td class="num">{:.2} kg</td></tr>
</table>
<p>Predicted from {:.2} kg ({from}).</p>"#,
        kcal(intake.total),
        kcal(view.burn),
        kcal(view.total_out),
        kcal(view.net_deficit),
        view.predicted_weight,
        view.prior_weight.kg
    );
    html
}

fn blocking_page(err: &TrackerError) -> Response {
    warn!(error = %err, "data files unusable");
    let body = format!(
        r#"<div class="error"><strong>Cannot load your data.</strong> {}</div><p>Fix the file and reload this page.</p>"#,
        esc(&err.to_string())
    );
    (StatusCode::SERVICE_UNAVAILABLE, Html(page(&body))).into_response()
}

fn page_error(err: TrackerError) -> Response {
    if err.is_blocking() {
        blocking_page(&err)
    } else {
        ApiError::from(err).into_response()
    }
}

/// Resolve the form, falling back to the day's defaults (with a notice) when
/// the submitted selections are unusable.
fn resolve_or_default(
    query: &FormQuery,
    tracker: &Tracker,
    date: NaiveDate,
) -> Result<(FormState, Option<Notice>), TrackerError> {
    match FormState::resolve(query, tracker, date) {
        Ok(state) => Ok((state, None)),
        Err(e) if e.is_invalid_input() => {
            let state = FormState::resolve(&FormQuery::default(), tracker, date)?;
            Ok((state, Some(Notice::Error(e.to_string()))))
        }
        Err(e) => Err(e),
    }
}

// --- Handlers ---

async fn index(State(state): State<AppState>, Query(query): Query<FormQuery>) -> Response {
    let today = Local::now().date_naive();
    let tracker = match state.tracker() {
        Ok(tracker) => tracker,
        Err(e) => return page_error(e),
    };

    let (form, notice) = match resolve_or_default(&query, &tracker, today) {
        Ok(resolved) => resolved,
        Err(e) => return page_error(e),
    };
    let notice = notice.or_else(|| {
        query
            .saved
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(Notice::Saved)
    });

    Html(render_page(&tracker, &form, today, notice.as_ref())).into_response()
}

async fn save_day(State(state): State<AppState>, Form(query): Form<FormQuery>) -> Response {
    let today = Local::now().date_naive();
    let store = state.store.lock().unwrap_or_else(PoisonError::into_inner);
    let mut tracker = match Tracker::load(&state.plans_path, &store) {
        Ok(tracker) => tracker,
        Err(e) => return page_error(e),
    };

    let form = match resolve_or_default(&query, &tracker, today) {
        Ok((form, None)) => form,
        Ok((form, Some(notice))) => {
            return (
                StatusCode::BAD_REQUEST,
                Html(render_page(&tracker, &form, today, Some(&notice))),
            )
                .into_response();
        }
        Err(e) => return page_error(e),
    };

    let result = form
        .check_submitted(&query, &tracker)
        .and_then(|()| form.to_day_form())
        .and_then(|day| tracker.save(&store, &day, today));

    match result {
        Ok(entry) => Redirect::to(&format!("/?saved={}", entry.date)).into_response(),
        Err(e @ TrackerError::DuplicateDate(_)) => {
            warn!(%today, "duplicate save refused");
            let notice = Notice::Duplicate(e.to_string());
            (
                StatusCode::CONFLICT,
                Html(render_page(&tracker, &form, today, Some(&notice))),
            )
                .into_response()
        }
        Err(e) if e.is_invalid_input() => {
            let notice = Notice::Error(e.to_string());
            (
                StatusCode::BAD_REQUEST,
                Html(render_page(&tracker, &form, today, Some(&notice))),
            )
                .into_response()
        }
        Err(e) => page_error(e),
    }
}

async fn chart_svg(State(state): State<AppState>) -> Result<Response, ApiError> {
    let entries = {
        let store = state.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.load()?
    };
    let svg = render_svg(&weight_series(&entries), CHART_WIDTH, CHART_HEIGHT)
        .ok_or_else(|| ApiError::NotFound("No predicted weights yet".to_string()))?;
    Ok(([(header::CONTENT_TYPE, "image/svg+xml")], svg).into_response())
}

async fn preview(
    State(state): State<AppState>,
    Query(query): Query<FormQuery>,
) -> Result<Json<DayView>, ApiError> {
    let today = Local::now().date_naive();
    let tracker = state.tracker()?;
    let form = FormState::resolve(&query, &tracker, today)?.to_day_form()?;
    Ok(Json(tracker.compute(&form, today)?))
}

async fn list_history(State(state): State<AppState>) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let store = state.store.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(Json(store.load()?))
}

async fn create_entry(
    State(state): State<AppState>,
    Json(req): Json<EntryRequest>,
) -> Result<(StatusCode, Json<HistoryEntry>), ApiError> {
    let date = req.date.unwrap_or_else(|| Local::now().date_naive());
    let store = state.store.lock().unwrap_or_else(PoisonError::into_inner);
    let mut tracker = Tracker::load(&state.plans_path, &store)?;
    let form = req.to_day_form(&tracker, date)?;
    let entry = tracker.save(&store, &form, date)?;
    Ok((StatusCode::CREATED, Json(entry)))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/save", post(save_day))
        .route("/chart.svg", get(chart_svg))
        .route("/api/preview", get(preview))
        .route("/api/history", get(list_history))
        .route("/api/entries", post(create_entry))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    plans_path: PathBuf,
    history_path: PathBuf,
    port: u16,
    bind: &str,
) -> anyhow::Result<()> {
    if !plans_path.exists() {
        eprintln!(
            "Warning: meal plan file not found at {}. The page shows an error until it exists.",
            plans_path.display()
        );
    }

    let state = AppState::new(plans_path, HistoryStore::new(history_path));
    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind}. Any device on your network can read and write your log."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    eprintln!("Listening on http://{bind}:{port}");
    info!(%bind, port, "server started");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const PLANS: &str = r#"{
        "profiles": {
            "standard": {
                "total_calories": 2000,
                "meals": { "breakfast": 500, "lunch": 700, "dinner": 800 }
            }
        },
        "cheat_tiers": {
            "small": { "calories": 300 },
            "medium": { "calories": 600 },
            "large": { "calories": 1000 }
        },
        "user_stats": { "bmr": 1800, "daily_activity_multiplier": 1.25 }
    }"#;

    fn test_state(plans: Option<&str>) -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let plans_path = dir.path().join("meal_plans.json");
        if let Some(plans) = plans {
            std::fs::write(&plans_path, plans).unwrap();
        }
        let store = HistoryStore::new(dir.path().join("history.csv"));
        (dir, AppState::new(plans_path, store))
    }

    fn history_len(state: &AppState) -> usize {
        state.store.lock().unwrap().load().unwrap().len()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_form(uri: &str, body: &str) -> axum::http::Request<Body> {
        axum::http::Request::post(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> axum::http::Request<Body> {
        axum::http::Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn index_renders_form_and_base_tdee() {
        let (_dir, state) = test_state(Some(PLANS));
        let response = build_router(state).oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains(r#"<option value="standard" selected>standard</option>"#));
        assert!(html.contains("Base TDEE: 2250 kcal"));
        assert!(html.contains("<form"));
        assert!(!html.contains("<svg"));
    }

    #[tokio::test]
    async fn index_warns_when_user_stats_missing() {
        let plans = r#"{"profiles": {"standard": {"total_calories": 2000}}, "cheat_tiers": {}}"#;
        let (_dir, state) = test_state(Some(plans));
        let response = build_router(state).oneshot(get("/")).await.unwrap();

        let html = body_text(response).await;
        assert!(html.contains("User stats missing. Using base TDEE 2000 kcal."));
    }

    #[tokio::test]
    async fn missing_config_blocks_the_page() {
        let (_dir, state) = test_state(None);
        let response = build_router(state).oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let html = body_text(response).await;
        assert!(html.contains("Meal plan file not found"));
        assert!(!html.contains("<form"));
    }

    #[tokio::test]
    async fn malformed_config_blocks_the_api() {
        let (_dir, state) = test_state(Some("{ not json"));
        let response = build_router(state)
            .oneshot(get("/api/preview"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn partial_status_defaults_to_first_meal() {
        let (_dir, state) = test_state(Some(PLANS));
        let response = build_router(state)
            .oneshot(get("/?status=Partial"))
            .await
            .unwrap();

        let html = body_text(response).await;
        assert!(html.contains(r#"<select name="skip">"#));
        assert!(html.contains("Skipped breakfast: -500 kcal"));
        assert!(html.contains("1500 kcal"));
    }

    #[tokio::test]
    async fn off_plan_shows_extra_food_choice() {
        let (_dir, state) = test_state(Some(PLANS));
        let response = build_router(state)
            .oneshot(get("/?status=No&cheat=medium"))
            .await
            .unwrap();

        let html = body_text(response).await;
        assert!(html.contains(r#"<option value="" selected>None (Extra Food)</option>"#));
        assert!(html.contains("Replaced None (Extra Food): -0 kcal, medium cheat: +600 kcal"));
    }

    #[tokio::test]
    async fn unknown_plan_falls_back_with_notice() {
        let (_dir, state) = test_state(Some(PLANS));
        let response = build_router(state)
            .oneshot(get("/?plan=%3Cscript%3E"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Unknown meal plan"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[tokio::test]
    async fn short_training_shows_error_instead_of_summary() {
        let (_dir, state) = test_state(Some(PLANS));
        let response = build_router(state)
            .oneshot(get("/?trained=on&train_type=liss&minutes=5"))
            .await
            .unwrap();

        let html = body_text(response).await;
        assert!(html.contains("Training duration must be at least 10 minutes"));
        assert!(!html.contains("<h2>Summary</h2>"));
    }

    #[tokio::test]
    async fn save_redirects_and_appends() {
        let (_dir, state) = test_state(Some(PLANS));
        let app = build_router(state.clone());

        let response = app
            .clone()
            .oneshot(post_form("/save", "plan=standard&status=Yes"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers().get(header::LOCATION).unwrap();
        assert!(location.to_str().unwrap().starts_with("/?saved="));
        assert_eq!(history_len(&state), 1);

        let response = app.oneshot(get("/?saved=2024-06-03")).await.unwrap();
        let html = body_text(response).await;
        assert!(html.contains("Saved 2024-06-03 to history."));
        assert!(html.contains("already in the history"));
        assert!(html.contains("<svg"));
    }

    #[tokio::test]
    async fn duplicate_save_returns_conflict() {
        let (_dir, state) = test_state(Some(PLANS));
        let app = build_router(state.clone());

        let first = app
            .clone()
            .oneshot(post_form("/save", "status=Yes"))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::SEE_OTHER);

        let second = app
            .oneshot(post_form("/save", "status=No&replace=&cheat=large"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let html = body_text(second).await;
        assert!(html.contains("You have already logged data for"));
        assert_eq!(history_len(&state), 1);
    }

    #[tokio::test]
    async fn save_requires_the_skipped_meal_to_be_chosen() {
        let (_dir, state) = test_state(Some(PLANS));
        let app = build_router(state.clone());

        let response = app
            .clone()
            .oneshot(post_form("/save", "plan=standard&status=Partial"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let html = body_text(response).await;
        assert!(html.contains("choose which meal was skipped"));
        assert!(html.contains(r#"<select name="skip">"#));
        assert_eq!(history_len(&state), 0);

        let response = app
            .oneshot(post_form("/save", "plan=standard&status=Partial&skip=lunch"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let entries = state.store.lock().unwrap().load().unwrap();
        assert_eq!(entries[0].calories_in, 1300.0);
    }

    #[tokio::test]
    async fn save_requires_off_plan_choices() {
        let (_dir, state) = test_state(Some(PLANS));
        let app = build_router(state.clone());

        for body in [
            "status=No",
            "status=No&cheat=large",
            "status=No&replace=brunch&cheat=large",
            "status=No&replace=",
        ] {
            let response = app.clone().oneshot(post_form("/save", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        }
        assert_eq!(history_len(&state), 0);

        let response = app
            .oneshot(post_form("/save", "status=No&replace=lunch&cheat=large"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let entries = state.store.lock().unwrap().load().unwrap();
        assert_eq!(entries[0].calories_in, 2300.0);
    }

    #[tokio::test]
    async fn save_requires_training_type_when_trained() {
        let (_dir, state) = test_state(Some(PLANS));
        let response = build_router(state.clone())
            .oneshot(post_form("/save", "status=Yes&trained=on"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(history_len(&state), 0);
    }

    #[tokio::test]
    async fn save_with_invalid_weight_is_rejected() {
        let (_dir, state) = test_state(Some(PLANS));
        let response = build_router(state.clone())
            .oneshot(post_form("/save", "status=Yes&log_weight=on&weight=-3"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(history_len(&state), 0);
    }

    #[tokio::test]
    async fn preview_returns_computed_day() {
        let (_dir, state) = test_state(Some(PLANS));
        let response = build_router(state)
            .oneshot(get(
                "/api/preview?status=No&replace=lunch&cheat=large&trained=on&train_type=hiit&minutes=30",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["intake"]["total"].as_f64(), Some(2300.0));
        assert_eq!(json["burn"].as_f64(), Some(300.0));
        assert_eq!(json["net_deficit"].as_f64(), Some(250.0));
    }

    #[tokio::test]
    async fn create_entry_then_conflict() {
        let (_dir, state) = test_state(Some(PLANS));
        let app = build_router(state.clone());
        let body = serde_json::json!({ "date": "2024-06-03", "status": "Yes" });

        let response = app
            .clone()
            .oneshot(post_json("/api/entries", body.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["Date"], "2024-06-03");
        assert_eq!(json["Day_Type"], "standard");
        assert_eq!(json["Predicted_Weight"].as_f64(), Some(79.97));

        let response = app.oneshot(post_json("/api/entries", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "You have already logged data for 2024-06-03");
        assert_eq!(history_len(&state), 1);
    }

    #[tokio::test]
    async fn create_entry_rejects_unknown_meal() {
        let (_dir, state) = test_state(Some(PLANS));
        let body = serde_json::json!({
            "date": "2024-06-03",
            "status": "Partial",
            "skipped_meal": "brunch"
        });
        let response = build_router(state.clone())
            .oneshot(post_json("/api/entries", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(history_len(&state), 0);
    }

    #[tokio::test]
    async fn history_api_lists_entries() {
        let (_dir, state) = test_state(Some(PLANS));
        let app = build_router(state);
        let body = serde_json::json!({
            "date": "2024-06-03",
            "status": "Yes",
            "training": { "type": "Cardio (LISS)", "minutes": 45 }
        });
        app.clone()
            .oneshot(post_json("/api/entries", body))
            .await
            .unwrap();

        let response = app.oneshot(get("/api/history")).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
        assert_eq!(json[0]["Calories_Burned"].as_f64(), Some(270.0));
    }

    #[tokio::test]
    async fn chart_is_not_found_until_history_exists() {
        let (_dir, state) = test_state(Some(PLANS));
        let app = build_router(state);

        let response = app.clone().oneshot(get("/chart.svg")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = serde_json::json!({ "date": "2024-06-03", "status": "Yes" });
        app.clone()
            .oneshot(post_json("/api/entries", body))
            .await
            .unwrap();

        let response = app.oneshot(get("/chart.svg")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "image/svg+xml"
        );
    }

    #[tokio::test]
    async fn security_headers_present() {
        let (_dir, state) = test_state(Some(PLANS));
        let response = build_router(state).oneshot(get("/")).await.unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
        assert_eq!(
            response.headers().get("content-security-policy").unwrap(),
            "default-src 'none'; style-src 'unsafe-inline'; form-action 'self'"
        );
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let (_dir, state) = test_state(Some(PLANS));
        let big_body = vec![0u8; BODY_LIMIT + 1];
        let response = build_router(state)
            .oneshot(
                axum::http::Request::post("/api/entries")
                    .header("content-type", "application/json")
                    .body(Body::from(big_body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret path /home/user/history.csv"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }

    #[test]
    fn form_state_ignores_meals_from_other_plans() {
        let config = dietlog_core::PlanConfig::from_reader(
            PLANS.as_bytes(),
            std::path::Path::new("plans.json"),
        )
        .unwrap();
        let tracker = Tracker::from_parts(config, Vec::new());
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let query = FormQuery {
            status: Some("No".to_string()),
            replace: Some("second breakfast".to_string()),
            skip: Some("second breakfast".to_string()),
            ..FormQuery::default()
        };

        let state = FormState::resolve(&query, &tracker, date).unwrap();
        assert_eq!(state.plan, "standard");
        assert_eq!(state.replace, None);
        assert_eq!(state.skip.as_deref(), Some("breakfast"));
        assert_eq!(state.minutes, DEFAULT_TRAINING_MINUTES);
        assert!(!state.trained);
    }
}
