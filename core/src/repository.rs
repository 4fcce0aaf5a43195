//! Timer endpoints of a single work log, mapped onto `HttpClient` calls.

use crate::client::HttpClient;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::types::{EmptyBody, Timer, WorkLogId};

#[derive(Debug, Clone)]
pub struct TimerRepository<T> {
    client: HttpClient<T>,
}

impl<T> TimerRepository<T> {
    pub fn new(client: HttpClient<T>) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &HttpClient<T> {
        &self.client
    }

    pub fn build_summary_request(&self, work_log_id: WorkLogId) -> HttpRequest {
        self.client.build_get(&format!("/worklogs/{work_log_id}/summary"))
    }

    pub fn build_start_request(&self, work_log_id: WorkLogId) -> Result<HttpRequest, ApiError> {
        self.client
            .build_post(&format!("/worklogs/{work_log_id}/startTimer"), &EmptyBody {})
    }

    pub fn build_stop_request(&self, work_log_id: WorkLogId) -> Result<HttpRequest, ApiError> {
        self.client
            .build_post(&format!("/worklogs/{work_log_id}/stopTimer"), &EmptyBody {})
    }

    pub fn parse_summary(&self, request: &HttpRequest, response: HttpResponse) -> Result<Vec<Timer>, ApiError> {
        self.client.parse_json(request, response)
    }

    /// Parses the reply of either `startTimer` or `stopTimer`.
    pub fn parse_timer(&self, request: &HttpRequest, response: HttpResponse) -> Result<Timer, ApiError> {
        self.client.parse_json(request, response)
    }
}

impl<T: Transport> TimerRepository<T> {
    pub async fn fetch_summary(&self, work_log_id: WorkLogId) -> Result<Vec<Timer>, ApiError> {
        let request = self.build_summary_request(work_log_id);
        let response = self.client.send(request.clone()).await?;
        self.parse_summary(&request, response)
    }

    pub async fn start(&self, work_log_id: WorkLogId) -> Result<Timer, ApiError> {
        let request = self.build_start_request(work_log_id)?;
        let response = self.client.send(request.clone()).await?;
        self.parse_timer(&request, response)
    }

    pub async fn stop(&self, work_log_id: WorkLogId) -> Result<Timer, ApiError> {
        let request = self.build_stop_request(work_log_id)?;
        let response = self.client.send(request.clone()).await?;
        self.parse_timer(&request, response)
    }
}
