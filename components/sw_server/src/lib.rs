//! Service worker emulation proxy.
//!
//! Serves HTTP on one port. Every request is offered to the active worker as
//! a fetch event and falls back to the upstream origin when the worker does
//! not answer. WebSocket upgrades on any path open the control channel used
//! to flag navigations and exchange messages with the worker.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod navigation;
pub mod network;
pub mod pipeline;
pub mod server;
pub mod watcher;

pub use cli::Cli;
pub use config::Config;
pub use control::ControlMessage;
pub use error::{ConfigError, ServerError, ServerResult};
pub use navigation::NavigationFlag;
pub use network::NetworkClient;
pub use pipeline::{Dispatcher, RequestContext, ResponseSink};
pub use server::{load_worker, router, run, AppState};
pub use watcher::{watch, WorkerWatcher};
