use std::fmt;

use crate::shared::headers::Headers;
use crate::shared::version::Version;
use super::body::RequestBody;


/// The HTTP method of a request
///
/// Only methods that have a handler get their own variant, everything
/// else is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Other(String),
}

impl Method {
    /// Method tokens are case-sensitive
    pub fn parse(token: &str) -> Method {
        match token {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            other => Method::Other(other.to_string()),
        }
    }
    pub fn as_str(&self) -> &str {
        match *self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Other(ref token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully parsed request
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    /// The request-target exactly as it appeared on the request line
    pub target: String,
    pub version: Version,
    pub headers: Headers,
    /// Value of `Content-Length`, `None` when the header is absent
    pub content_length: Option<u64>,
    /// The entity body, finalized and ready for reading
    pub body: RequestBody,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }
}
