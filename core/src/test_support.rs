//! Scripted in-memory transport for unit tests.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::http::{HttpRequest, HttpResponse, Transport, TransportError};

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<HttpResponse, TransportError>>,
    requests: Vec<HttpRequest>,
}

/// Replays queued replies in order and records every request it sees.
///
/// Each call yields once before answering, so concurrently polled callers
/// interleave the way they would over a real network.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub(crate) fn push(&self, response: HttpResponse) {
        self.script.lock().unwrap().replies.push_back(Ok(response));
    }

    pub(crate) fn push_failure(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .replies
            .push_back(Err(TransportError::new(message)));
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }
}

impl Transport for ScriptedTransport {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        let script = Arc::clone(&self.script);
        async move {
            script.lock().unwrap().requests.push(request);
            tokio::task::yield_now().await;
            script
                .lock()
                .unwrap()
                .replies
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::new("no scripted reply")))
        }
    }
}

pub(crate) fn response(status: u16, body: &str) -> HttpResponse {
    let status_text = match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "",
    };
    HttpResponse {
        status,
        status_text: status_text.to_string(),
        headers: Vec::new(),
        body: body.to_string(),
    }
}

pub(crate) fn running_json(id: i64, work_log_id: i64, created_at: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "workLogId": work_log_id,
        "createdAt": created_at.to_rfc3339(),
        "stoppedAt": null,
        "durationInSeconds": null,
        "status": "RUNNING",
    })
}

pub(crate) fn stopped_json(id: i64, work_log_id: i64, created_at: DateTime<Utc>, seconds: i64) -> serde_json::Value {
    let stopped_at = created_at + chrono::TimeDelta::seconds(seconds);
    serde_json::json!({
        "id": id,
        "workLogId": work_log_id,
        "createdAt": created_at.to_rfc3339(),
        "stoppedAt": stopped_at.to_rfc3339(),
        "durationInSeconds": seconds,
        "status": "STOPPED",
    })
}

pub(crate) fn summary(timers: &[serde_json::Value]) -> HttpResponse {
    response(200, &serde_json::Value::Array(timers.to_vec()).to_string())
}
