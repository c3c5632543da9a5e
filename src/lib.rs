#![allow(clippy::return_self_not_must_use)]

//! # microhost
//!
//! A small library for building HTTP microservices on hyper, served by a pool
//! of independent event loops sharing one listening socket.
//!
//! ## Features
//! - Multi-worker listener: N threads, each with its own tokio event loop
//! - Regex routes under a common prefix, first registration wins
//! - Built-in `GET <prefix>/health` endpoint aggregating health probes
//! - Default probe checking access to configured directories
//! - Configuration from a file, `.env` and `MICROHOST_*` variables
//!
//! ## Example
//! ```no_run
//! use microhost::{MicroService, Method, ServiceConfig};
//!
//! fn main() -> microhost::Result<()> {
//!     let mut service = MicroService::new(ServiceConfig::new()?)?;
//!     service.add_handler(Method::GET, "/ping", |_req, resp| {
//!         resp.data_mut().set_text("pong");
//!     })?;
//!     service.start()?;
//!
//!     std::thread::park();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//! - `MicroService`: configuration, route and probe registration, lifecycle
//! - `Router` / `Dispatcher`: ordered regex routes and their frozen snapshot
//! - `WorkerPool` / `Worker`: event-loop threads accepting on a shared socket
//! - `HealthCheck`: probes and severity aggregation
//!
//! ## Configuration
//! Keys live under `service` (`name`, `prefix`, `address`, `port`,
//! `pool_size`) and `dirs.<id>` (`path`, `access`). Environment variables use
//! the `MICROHOST_` prefix with `__` between nested keys.
//!
//! ## Cargo features
//! - `http2`: Enables HTTP/2 support (enabled by default)

pub use crate::config::{DirectoryConfig, ServiceConfig, ServiceSettings};
pub use crate::error::{Result, ServiceError};
pub use crate::health::{
    aggregate, check_directories, directories_probe, HealthCheck, HealthReport, HealthStatus,
    Probe, DIRECTORIES_CHECK,
};
pub use crate::http::{
    Bytes, ContentKind, Data, Header, Method, Request, Response, StatusCode, Uri, CLIENT,
};
pub use crate::pool::WorkerPool;
pub use crate::router::{Dispatch, Dispatcher, Handler, Router};
pub use crate::service::MicroService;
pub use crate::worker::Worker;

mod config;
mod error;
mod health;
pub mod http;
mod pool;
mod router;
mod service;
mod worker;

// Re-export common types
pub use hyper;
