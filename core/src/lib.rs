//! Timer reconciliation core for the work-log time tracker.
//!
//! # Overview
//! `TimerSyncEngine` derives "is a timer running, and for how long" from
//! periodic server snapshots, ticks a live clock while a timer runs, and
//! serializes start/stop requests against the server. It talks to the
//! backend through `TimerRepository`, which maps three endpoints onto the
//! typed `HttpClient`.
//!
//! # Design
//! - `HttpClient` splits every call into `build_*` (plain `HttpRequest`) and
//!   `parse_*` (plain `HttpResponse`), with a [`Transport`] doing the I/O in
//!   between. `ReqwestTransport` is the production transport.
//! - Every failure is one of the three `ApiError` variants; the engine stores
//!   failures in `last_error` and never propagates them.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod duration;
pub mod engine;
pub mod error;
pub mod http;
pub mod repository;
pub mod transport;
pub mod types;

mod ticker;

#[cfg(test)]
mod test_support;

pub use client::HttpClient;
pub use config::{ClientConfig, ConfigError};
pub use duration::{elapsed_seconds, format_duration, ZERO_DURATION};
pub use engine::{Anomaly, TimerSyncEngine, TimerView};
pub use error::{ApiError, ErrorKind};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, TransportError};
pub use repository::TimerRepository;
pub use transport::ReqwestTransport;
pub use types::{EmptyBody, ErrorBody, Timer, TimerStatus, WorkLogId};

/// Build an engine that talks to `config.base_url` over `ReqwestTransport`.
pub fn connect(config: &ClientConfig) -> Result<TimerSyncEngine<ReqwestTransport>, TransportError> {
    let transport = ReqwestTransport::new(config)?;
    let client = HttpClient::new(&config.base_url, transport);
    Ok(TimerSyncEngine::new(TimerRepository::new(client)).with_tick_interval(config.tick_interval))
}
