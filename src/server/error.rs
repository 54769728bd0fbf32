use std::io;


quick_error!{
    /// Error type which is produced by the request parser and the socket
    /// reading code of the worker
    ///
    /// Everything except `Io` is turned into an error response with
    /// `Dispatch::error`. Socket errors close the connection silently.
    #[derive(Debug)]
    pub enum RequestError {
        BadRequest(reason: &'static str) {
            display("bad request: {}", reason)
        }
        HeaderTooLarge {
            display("header line is larger than the line size limit")
        }
        UriTooLong {
            display("request line is larger than the line size limit")
        }
        EntityTooLarge(declared: u64, limit: u64) {
            display("declared entity of {} bytes exceeds limit of {}",
                    declared, limit)
        }
        Io(err: io::Error) {
            display("socket error: {}", err)
            source(err)
        }
        Storage(err: io::Error) {
            display("error buffering request body: {}", err)
            source(err)
        }
        Internal(reason: &'static str) {
            display("internal error: {}", reason)
        }
    }
}

/// A trait which represents an error which can be formatted as HTTP error page
pub trait HttpError {
    /// Return HTTP status code and status text
    fn http_status(&self) -> (u16, &'static str);
}

impl HttpError for RequestError {
    fn http_status(&self) -> (u16, &'static str) {
        use self::RequestError::*;
        match *self {
            BadRequest(_) => (400, "Bad Request"),
            HeaderTooLarge => (431, "Request Header Fields Too Large"),
            UriTooLong => (414, "URI Too Long"),
            EntityTooLarge(..) => (413, "Payload Too Large"),
            // Never reaches the client, the connection is just closed
            Io(_) => (500, "Internal Server Error"),
            Storage(_) => (500, "Internal Server Error"),
            Internal(_) => (500, "Internal Server Error"),
        }
    }
}
