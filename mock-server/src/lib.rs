use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{OriginalUri, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;

pub const CODE_NOT_FOUND: u32 = 1404;
pub const CODE_TIMER_ALREADY_RUNNING: u32 = 1001;
pub const CODE_TIMER_NOT_RUNNING: u32 = 1002;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerStatus {
    Running,
    Stopped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    pub id: u64,
    pub work_log_id: u64,
    pub created_at: NaiveDateTime,
    pub stopped_at: Option<NaiveDateTime>,
    pub duration_in_seconds: Option<i64>,
    pub status: TimerStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkLog {
    pub id: u64,
    pub title: String,
}

#[derive(Deserialize)]
pub struct WorkLogInput {
    pub title: String,
}

/// Error body returned for every failed request except `DELETE`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub timestamp: NaiveDateTime,
    pub status: u16,
    pub error: String,
    pub message: String,
    pub path: String,
    pub code: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub status: StatusCode,
    pub message: String,
    pub code: u32,
}

impl Failure {
    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
            code: CODE_NOT_FOUND,
        }
    }

    fn conflict(message: String, code: u32) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message,
            code,
        }
    }

    fn respond(self, path: &str) -> Response {
        let body = ErrorBody {
            timestamp: now(),
            status: self.status.as_u16(),
            error: self.status.canonical_reason().unwrap_or_default().to_string(),
            message: self.message,
            path: path.to_string(),
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

/// In-memory work logs and timers.
#[derive(Debug, Default)]
pub struct Store {
    work_logs: HashMap<u64, WorkLog>,
    timers: Vec<Timer>,
    last_work_log_id: u64,
    last_timer_id: u64,
}

impl Store {
    pub fn create_work_log(&mut self, title: String) -> WorkLog {
        self.last_work_log_id += 1;
        let work_log = WorkLog {
            id: self.last_work_log_id,
            title,
        };
        self.work_logs.insert(work_log.id, work_log.clone());
        work_log
    }

    pub fn work_logs(&self) -> Vec<WorkLog> {
        let mut all: Vec<WorkLog> = self.work_logs.values().cloned().collect();
        all.sort_by_key(|w| w.id);
        all
    }

    pub fn rename_work_log(&mut self, id: u64, title: String) -> Result<WorkLog, Failure> {
        let work_log = self
            .work_logs
            .get_mut(&id)
            .ok_or_else(|| Failure::not_found(format!("WorkLog with ID {id} not found")))?;
        work_log.title = title;
        Ok(work_log.clone())
    }

    pub fn delete_work_log(&mut self, id: u64) -> bool {
        if self.work_logs.remove(&id).is_none() {
            return false;
        }
        self.timers.retain(|t| t.work_log_id != id);
        true
    }

    /// Timers of one work log, newest first.
    pub fn summary(&self, work_log_id: u64) -> Result<Vec<Timer>, Failure> {
        self.require_work_log(work_log_id)?;
        let mut timers: Vec<Timer> = self
            .timers
            .iter()
            .filter(|t| t.work_log_id == work_log_id)
            .cloned()
            .collect();
        timers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(timers)
    }

    pub fn start_timer(&mut self, work_log_id: u64, at: NaiveDateTime) -> Result<Timer, Failure> {
        self.require_work_log(work_log_id)?;
        if self.running_index(work_log_id).is_some() {
            return Err(Failure::conflict(
                "Timer already running for this worklog".to_string(),
                CODE_TIMER_ALREADY_RUNNING,
            ));
        }
        Ok(self.insert_running_unchecked(work_log_id, at))
    }

    /// Insert a RUNNING timer without the one-running-timer check.
    pub fn insert_running_unchecked(&mut self, work_log_id: u64, at: NaiveDateTime) -> Timer {
        self.last_timer_id += 1;
        let timer = Timer {
            id: self.last_timer_id,
            work_log_id,
            created_at: at,
            stopped_at: None,
            duration_in_seconds: None,
            status: TimerStatus::Running,
        };
        self.timers.push(timer.clone());
        timer
    }

    /// Stop the newest running timer. A timer spanning local midnight is
    /// split into one record per calendar day; the last record is returned.
    pub fn stop_timer(&mut self, work_log_id: u64, at: NaiveDateTime) -> Result<Timer, Failure> {
        self.require_work_log(work_log_id)?;
        let index = self.running_index(work_log_id).ok_or_else(|| {
            Failure::conflict(
                format!("Timer is not running for this worklog {work_log_id}"),
                CODE_TIMER_NOT_RUNNING,
            )
        })?;

        let mut last = self.timers[index].clone();
        let segments = split_by_day(self.timers[index].created_at, at);
        for (n, (start, end)) in segments.into_iter().enumerate() {
            if n == 0 {
                close(&mut self.timers[index], start, end);
                last = self.timers[index].clone();
                continue;
            }
            self.last_timer_id += 1;
            let mut overflow = Timer {
                id: self.last_timer_id,
                work_log_id,
                created_at: start,
                stopped_at: None,
                duration_in_seconds: None,
                status: TimerStatus::Running,
            };
            close(&mut overflow, start, end);
            self.timers.push(overflow.clone());
            last = overflow;
        }
        Ok(last)
    }

    fn require_work_log(&self, id: u64) -> Result<(), Failure> {
        if self.work_logs.contains_key(&id) {
            Ok(())
        } else {
            Err(Failure::not_found(format!("WorkLog with ID {id} not found")))
        }
    }

    fn running_index(&self, work_log_id: u64) -> Option<usize> {
        self.timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.work_log_id == work_log_id && t.status == TimerStatus::Running)
            .max_by_key(|(_, t)| (t.created_at, t.id))
            .map(|(i, _)| i)
    }
}

fn close(timer: &mut Timer, start: NaiveDateTime, end: NaiveDateTime) {
    timer.created_at = start;
    timer.stopped_at = Some(end);
    timer.status = TimerStatus::Stopped;
    timer.duration_in_seconds = Some((end - start).num_seconds());
}

/// Cut `[start, end]` at every local midnight in between.
pub fn split_by_day(start: NaiveDateTime, end: NaiveDateTime) -> Vec<(NaiveDateTime, NaiveDateTime)> {
    let mut segments = Vec::new();
    let mut cursor = start;
    while cursor.date() < end.date() {
        let Some(midnight) = cursor
            .date()
            .succ_opt()
            .and_then(|day| day.and_hms_opt(0, 0, 0))
        else {
            break;
        };
        segments.push((cursor, midnight));
        cursor = midnight;
    }
    segments.push((cursor, end));
    segments
}

fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

pub type Db = Arc<RwLock<Store>>;

pub fn app() -> Router {
    app_with_db(Db::default())
}

pub fn app_with_db(db: Db) -> Router {
    let api = Router::new()
        .route("/worklogs", get(list_work_logs).post(create_work_log))
        .route("/worklogs/{id}", put(update_work_log).delete(delete_work_log))
        .route("/worklogs/{id}/summary", get(summary))
        .route("/worklogs/{id}/startTimer", post(start_timer))
        .route("/worklogs/{id}/stopTimer", post(stop_timer))
        .with_state(db);
    Router::new().nest("/api", api)
}

pub async fn serve(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_db(db)).await
}

async fn list_work_logs(State(db): State<Db>) -> Json<Vec<WorkLog>> {
    Json(db.read().await.work_logs())
}

async fn create_work_log(
    State(db): State<Db>,
    Json(input): Json<WorkLogInput>,
) -> (StatusCode, Json<WorkLog>) {
    let work_log = db.write().await.create_work_log(input.title);
    (StatusCode::CREATED, Json(work_log))
}

async fn update_work_log(
    State(db): State<Db>,
    OriginalUri(uri): OriginalUri,
    Path(id): Path<u64>,
    Json(input): Json<WorkLogInput>,
) -> Result<Json<WorkLog>, Response> {
    db.write()
        .await
        .rename_work_log(id, input.title)
        .map(Json)
        .map_err(|f| f.respond(uri.path()))
}

async fn delete_work_log(State(db): State<Db>, Path(id): Path<u64>) -> StatusCode {
    if db.write().await.delete_work_log(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn summary(
    State(db): State<Db>,
    OriginalUri(uri): OriginalUri,
    Path(id): Path<u64>,
) -> Result<Json<Vec<Timer>>, Response> {
    db.read()
        .await
        .summary(id)
        .map(Json)
        .map_err(|f| f.respond(uri.path()))
}

async fn start_timer(
    State(db): State<Db>,
    OriginalUri(uri): OriginalUri,
    Path(id): Path<u64>,
) -> Result<Json<Timer>, Response> {
    let timer = db
        .write()
        .await
        .start_timer(id, now())
        .map_err(|f| f.respond(uri.path()))?;
    info!(work_log_id = id, timer_id = timer.id, "timer started");
    Ok(Json(timer))
}

async fn stop_timer(
    State(db): State<Db>,
    OriginalUri(uri): OriginalUri,
    Path(id): Path<u64>,
) -> Result<Json<Timer>, Response> {
    let timer = db
        .write()
        .await
        .stop_timer(id, now())
        .map_err(|f| f.respond(uri.path()))?;
    info!(
        work_log_id = id,
        timer_id = timer.id,
        duration_in_seconds = timer.duration_in_seconds,
        "timer stopped"
    );
    Ok(Json(timer))
}
