use std::cmp::min;
use std::io::{self, Read};

use super::response::{Response, Cleanup, BodySource};


/// Incremental serializer of a single response
///
/// The status line and header block are rendered once, on construction.
/// Each `write_chunk()` fills the caller's buffer up to a limit: first with
/// the unsent part of the head, then with bytes pulled from the body.
pub struct ResponseWriter {
    head: Vec<u8>,
    head_sent: usize,
    body: Option<BodySource>,
    cleanup: Option<Cleanup>,
    finished: bool,
}

impl ResponseWriter {
    pub fn new(response: Response) -> ResponseWriter {
        let (head, body, cleanup) = response.into_parts();
        ResponseWriter {
            head: head,
            head_sent: 0,
            body: body,
            cleanup: cleanup,
            finished: false,
        }
    }
    /// Appends the next part of the response to `dest`
    ///
    /// Never grows `dest` beyond `limit` bytes. Returns `true` once the
    /// body is exhausted, at which point the cleanup chain has run. Read
    /// errors of the body are returned as is; the cleanup then runs when
    /// the writer is dropped.
    pub fn write_chunk(&mut self, dest: &mut Vec<u8>, limit: usize)
        -> io::Result<bool>
    {
        if self.finished {
            return Ok(true);
        }
        if self.head_sent < self.head.len() {
            let room = limit.saturating_sub(dest.len());
            let bytes = min(room, self.head.len() - self.head_sent);
            dest.extend_from_slice(
                &self.head[self.head_sent..self.head_sent + bytes]);
            self.head_sent += bytes;
            if self.head_sent < self.head.len() {
                return Ok(false);
            }
        }
        let exhausted = match self.body {
            None => true,
            Some(ref mut source) => fill(source, dest, limit)?,
        };
        if exhausted {
            self.finish();
        }
        Ok(exhausted)
    }
    pub fn is_finished(&self) -> bool {
        self.finished
    }
    fn finish(&mut self) {
        self.finished = true;
        self.body = None;
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

/// Reads from the source until `dest` is full or the source is exhausted
///
/// Returns true when the source is exhausted.
fn fill(source: &mut BodySource, dest: &mut Vec<u8>, limit: usize)
    -> io::Result<bool>
{
    while dest.len() < limit {
        let start = dest.len();
        dest.resize(limit, 0);
        let result = source.read(&mut dest[start..]);
        match result {
            Ok(0) => {
                dest.truncate(start);
                return Ok(true);
            }
            Ok(bytes) => dest.truncate(start + bytes),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {
                dest.truncate(start);
            }
            Err(e) => {
                dest.truncate(start);
                return Err(e);
            }
        }
    }
    Ok(false)
}

impl Drop for ResponseWriter {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            debug!("Response abandoned after {} head bytes", self.head_sent);
            cleanup();
        }
    }
}
