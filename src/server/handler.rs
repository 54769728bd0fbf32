use std::fs::File;
use std::io;
use std::path::Path;

use super::context::Context;
use super::error::{RequestError, HttpError};
use super::request::{Method, Request};
use super::response::Response;


/// A handler of a fully parsed request
///
/// Handlers are shared by every worker thread, so they only get a shared
/// reference to themselves. The request is mutable so that the handler
/// can read the body.
pub trait Handler: Send + Sync {
    fn handle(&self, request: &mut Request, ctx: &Context) -> Response;
}

/// Serves files from the document root
///
/// When `body` is false only the headers are sent, this is how `HEAD`
/// is answered.
#[derive(Debug, Clone, Copy)]
pub struct StaticFiles {
    pub body: bool,
}

/// Answers every request with `501 Not Implemented`
#[derive(Debug, Clone, Copy)]
pub struct NotImplemented;

/// Response without body, with an explicit zero `Content-Length`
pub fn empty(status: u16) -> Response {
    let mut response = Response::new(status);
    response.add_header("Content-Length", "0");
    response
}

fn open(path: &Path) -> io::Result<(File, u64)> {
    let file = File::open(path)?;
    let length = file.metadata()?.len();
    Ok((file, length))
}

impl Handler for StaticFiles {
    fn handle(&self, request: &mut Request, ctx: &Context) -> Response {
        let path = match ctx.resolve(&request.target) {
            Some(path) => path,
            None => {
                debug!("{} {}: not found", request.method, request.target);
                return empty(404);
            }
        };
        let (file, length) = match open(&path) {
            Ok(pair) => pair,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => {
                return empty(404);
            }
            Err(ref e) if e.kind() == io::ErrorKind::PermissionDenied => {
                debug!("Can't open {:?}: {}", path, e);
                return empty(403);
            }
            Err(e) => {
                warn!("Can't open {:?}: {}", path, e);
                return empty(500);
            }
        };
        let mut response = Response::new(200);
        response.add_header("Content-Type",
            ctx.mime_types().for_path(&path));
        response.add_header("Content-Length", length.to_string());
        if self.body {
            response.set_body(file);
        }
        response
    }
}

impl Handler for NotImplemented {
    fn handle(&self, request: &mut Request, _ctx: &Context) -> Response {
        debug!("Method {} is not implemented", request.method);
        empty(501)
    }
}

/// Routes requests to handlers by method
///
/// `POST` is served the same way as `GET`, any method without a handler
/// of its own goes to the fallback.
pub struct Dispatch {
    context: Context,
    get: Box<dyn Handler>,
    head: Box<dyn Handler>,
    post: Box<dyn Handler>,
    fallback: Box<dyn Handler>,
}

impl Dispatch {
    pub fn new(context: Context) -> Dispatch {
        Dispatch {
            context: context,
            get: Box::new(StaticFiles { body: true }),
            head: Box::new(StaticFiles { body: false }),
            post: Box::new(StaticFiles { body: true }),
            fallback: Box::new(NotImplemented),
        }
    }
    /// Replaces the handler for a method
    ///
    /// Setting a handler for `Method::Other` replaces the fallback, which
    /// then serves every method except `GET`, `HEAD` and `POST`.
    pub fn set_handler<H: Handler + 'static>(&mut self, method: Method,
        handler: H)
    {
        let slot = match method {
            Method::Get => &mut self.get,
            Method::Head => &mut self.head,
            Method::Post => &mut self.post,
            Method::Other(_) => &mut self.fallback,
        };
        *slot = Box::new(handler);
    }
    pub fn handler(&self, method: &Method) -> &dyn Handler {
        match *method {
            Method::Get => &*self.get,
            Method::Head => &*self.head,
            Method::Post => &*self.post,
            Method::Other(_) => &*self.fallback,
        }
    }
    pub fn respond(&self, request: &mut Request) -> Response {
        debug!("{} {} {}", request.method, request.target, request.version);
        self.handler(&request.method).handle(request, &self.context)
    }
    /// Builds the response sent when the request could not be parsed
    pub fn error(&self, err: &RequestError) -> Response {
        let (status, _) = err.http_status();
        empty(status)
    }
}
