//! HTTP/1.x protocol pieces used by a single connection
//!
//! The parser turns byte chunks into a `Request`, a handler picked by
//! `Dispatch` turns it into a `Response`, and `ResponseWriter` streams
//! that back in chunks. None of these types touch sockets.
use std::env;
use std::path::PathBuf;

pub mod body;
pub mod context;
pub mod error;
pub mod handler;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

pub use self::body::{RequestBody, BodyReader};
pub use self::context::{Context, MimeTypes};
pub use self::error::{RequestError, HttpError};
pub use self::handler::{Handler, Dispatch};
pub use self::parser::RequestParser;
pub use self::request::{Method, Request};
pub use self::response::{Response, Cleanup};
pub use self::writer::ResponseWriter;


/// Default limit for the request line and every single header line
pub const MAX_LINE_SIZE: usize = 8192;
/// Default limit for the declared `Content-Length`
pub const MAX_ENTITY_SIZE: u64 = 10_444_800;

/// Protocol limits applied by every `RequestParser`
///
/// The in-memory part of a request body is twice `max_line_size`,
/// anything larger is spilled into `temp_dir`.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_line_size: usize,
    pub max_entity_size: u64,
    pub temp_dir: PathBuf,
}

impl Default for Limits {
    fn default() -> Limits {
        Limits {
            max_line_size: MAX_LINE_SIZE,
            max_entity_size: MAX_ENTITY_SIZE,
            temp_dir: env::temp_dir(),
        }
    }
}
