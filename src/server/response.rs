use std::fmt;
use std::io::Read;
use std::time::SystemTime;

use httpdate::fmt_http_date;

use crate::shared::headers::Headers;


/// Value of the `Server` header of every response
pub const SERVER_NAME: &str = "selector-http";

/// Resource-release action, run once the response is done with
pub type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Byte source of a response body
pub type BodySource = Box<dyn Read + Send + 'static>;

/// A response as built by a handler
///
/// Carries the status, headers, an optional body source and the cleanup
/// chain. Serialization is done by `ResponseWriter`.
pub struct Response {
    status: u16,
    headers: Headers,
    body: Option<BodySource>,
    cleanup: Option<Cleanup>,
}

impl Response {
    /// Creates a response with the `Server`, `Date` and `Connection: Close`
    /// headers already set
    pub fn new(status: u16) -> Response {
        let mut headers = Headers::new();
        headers.set("Server", SERVER_NAME);
        headers.set("Date", fmt_http_date(SystemTime::now()));
        headers.set("Connection", "Close");
        Response {
            status: status,
            headers: headers,
            body: None,
            cleanup: None,
        }
    }
    pub fn status(&self) -> u16 {
        self.status
    }
    pub fn headers(&self) -> &Headers {
        &self.headers
    }
    pub fn add_header<N, V>(&mut self, name: N, value: V)
        where N: Into<String>, V: Into<String>
    {
        self.headers.set(name, value);
    }
    pub fn set_body<R: Read + Send + 'static>(&mut self, body: R) {
        self.body = Some(Box::new(body));
    }
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
    /// Adds a callback to the cleanup chain
    ///
    /// Callbacks run in the order they were added, exactly once, when the
    /// response is fully sent or abandoned.
    pub fn on_complete<F>(&mut self, f: F)
        where F: FnOnce() + Send + 'static
    {
        self.cleanup = Some(match self.cleanup.take() {
            Some(prev) => Box::new(move || { prev(); f(); }),
            None => Box::new(f),
        });
    }
    /// Splits the response into the serialized head, body and cleanup
    pub(crate) fn into_parts(mut self)
        -> (Vec<u8>, Option<BodySource>, Option<Cleanup>)
    {
        let head = format!("HTTP/1.1 {} {}\r\n{}\r\n",
            self.status, reason(self.status), self.headers);
        (head.into_bytes(), self.body.take(), self.cleanup.take())
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &self.body.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        // Response was never handed to a writer
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

/// Standard reason phrase of the status code
pub fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Unknown",
    }
}
