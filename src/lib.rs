//! A small HTTP/1.x file server built directly on `mio`
//!
//! The listener thread accepts connections and hands them to a
//! `WorkerPool`. Every worker runs its own event loop over the
//! connections it owns, parsing requests and streaming responses
//! incrementally, one request per connection.

#[macro_use] extern crate quick_error;
#[macro_use] extern crate log;

pub mod config;
pub mod listener;
pub mod server;
pub mod shared;
pub mod worker;

pub use config::{Config, ConfigError};
pub use listener::{ConnectionListener, Listener};
pub use server::{Context, Dispatch, Handler, Limits, Request, Response};
pub use shared::version::Version;
pub use worker::{Worker, WorkerPool};
