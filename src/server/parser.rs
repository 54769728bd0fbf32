use crate::shared::headers::{Headers, latin1, is_content_length};
use crate::shared::version::Version;
use super::Limits;
use super::body::RequestBody;
use super::error::RequestError;
use super::request::{Method, Request};


#[derive(Debug)]
enum State {
    RequestLine,
    Headers,
    Body,
    Done,
    Error(RequestError),
}

/// Per-connection incremental request parser
///
/// Bytes may be fed in chunks of any size. Lines are only framed until
/// the blank line after the headers, everything after it goes to the
/// `RequestBody` verbatim.
#[derive(Debug)]
pub struct RequestParser {
    state: State,
    /// Unconsumed bytes of the current line
    buf: Vec<u8>,
    max_line_size: usize,
    max_entity_size: u64,
    head: Option<(Method, String, Version)>,
    headers: Headers,
    /// Last header seen, kept open for folded continuation lines
    pending: Option<(String, String)>,
    content_length: Option<u64>,
    body: RequestBody,
    finished: bool,
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}

fn parse_content_length(value: &str) -> Result<u64, RequestError> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RequestError::BadRequest("invalid Content-Length"));
    }
    value.parse()
        .map_err(|_| RequestError::BadRequest("invalid Content-Length"))
}

fn parse_header(line: &[u8]) -> Result<(String, String), RequestError> {
    let mut raw = Vec::with_capacity(line.len() + 4);
    raw.extend_from_slice(line);
    raw.extend_from_slice(b"\r\n\r\n");
    let mut headers = [httparse::EMPTY_HEADER; 1];
    match httparse::parse_headers(&raw, &mut headers) {
        Ok(httparse::Status::Complete((_, parsed))) if parsed.len() == 1 => {
            Ok((parsed[0].name.to_string(), latin1(parsed[0].value)))
        }
        _ => Err(RequestError::BadRequest("malformed header line")),
    }
}

fn parse_request_line(line: &[u8])
    -> Result<(Method, String, Version), RequestError>
{
    let line = latin1(line);
    let mut parts = line.split(' ');
    let (method, target, version) = match
        (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(m), Some(t), Some(v), None) if !m.is_empty() && !t.is_empty()
        => (m, t, v),
        _ => return Err(RequestError::BadRequest("malformed request line")),
    };
    let version = Version::parse(version)
        .ok_or(RequestError::BadRequest("malformed protocol version"))?;
    Ok((Method::parse(method), target.to_string(), version))
}

impl RequestParser {
    pub fn new(limits: &Limits) -> RequestParser {
        RequestParser {
            state: State::RequestLine,
            buf: Vec::new(),
            max_line_size: limits.max_line_size,
            max_entity_size: limits.max_entity_size,
            head: None,
            headers: Headers::new(),
            pending: None,
            content_length: None,
            body: RequestBody::new(limits.max_line_size * 2,
                                   limits.temp_dir.clone()),
            finished: false,
        }
    }
    /// Consumes the next chunk of bytes read from the connection
    ///
    /// Returns true when parsing is finished, either with a complete
    /// request or with an error. Data fed after that is ignored.
    pub fn feed(&mut self, data: &[u8]) -> bool {
        if self.finished {
            return true;
        }
        if let Err(e) = self.advance(data) {
            self.state = State::Error(e);
        }
        if let State::Body = self.state {
            if self.body.is_over_limit() {
                self.state = State::Error(RequestError::BadRequest(
                    "entity body is longer than Content-Length"));
            } else if self.body.should_finish() {
                self.state = State::Done;
            }
        }
        match self.state {
            State::Done | State::Error(_) => self.finish(),
            _ => {}
        }
        self.finished
    }
    /// Returns the completed request or the reason parsing failed
    ///
    /// On failure the temporary file of the body, if any, is removed
    /// right away.
    pub fn into_request(mut self) -> Result<Request, RequestError> {
        match self.state {
            State::Done => {}
            State::Error(e) => {
                self.body.cleanup()();
                return Err(e);
            }
            _ => return Err(RequestError::Internal("request is incomplete")),
        }
        let (method, target, version) = match self.head.take() {
            Some(head) => head,
            None => return Err(RequestError::Internal("no request line")),
        };
        Ok(Request {
            method: method,
            target: target,
            version: version,
            headers: self.headers,
            content_length: self.content_length,
            body: self.body,
        })
    }
    fn finish(&mut self) {
        self.finished = true;
        self.buf = Vec::new();
        if let Err(e) = self.body.finalize() {
            match self.state {
                State::Done => self.state = State::Error(
                    RequestError::Storage(e)),
                _ => warn!("Can't finalize request body: {}", e),
            }
        }
    }
    fn advance(&mut self, data: &[u8]) -> Result<(), RequestError> {
        match self.state {
            State::RequestLine | State::Headers => {}
            State::Body => {
                return self.body.append(data).map_err(RequestError::Storage);
            }
            State::Done | State::Error(_) => return Ok(()),
        }
        self.buf.extend_from_slice(data);
        let mut pos = 0;
        while let Some(len) = find_crlf(&self.buf[pos..]) {
            self.check_line(len)?;
            let line = self.buf[pos..pos + len].to_vec();
            pos += len + 2;
            self.line(&line)?;
            match self.state {
                State::Body => {
                    let result = self.body.append(&self.buf[pos..]);
                    self.buf.clear();
                    return result.map_err(RequestError::Storage);
                }
                State::Done => {
                    self.buf.clear();
                    return Ok(());
                }
                _ => {}
            }
        }
        self.buf.drain(..pos);
        // Don't wait for the terminator of a line which is already too long
        let mut unterminated = self.buf.len();
        if self.buf.last() == Some(&b'\r') {
            unterminated -= 1;
        }
        self.check_line(unterminated)
    }
    fn check_line(&self, len: usize) -> Result<(), RequestError> {
        if len <= self.max_line_size {
            return Ok(());
        }
        match self.state {
            State::RequestLine => Err(RequestError::UriTooLong),
            _ => Err(RequestError::HeaderTooLarge),
        }
    }
    fn line(&mut self, line: &[u8]) -> Result<(), RequestError> {
        match self.state {
            State::RequestLine => {
                self.head = Some(parse_request_line(line)?);
                self.state = State::Headers;
            }
            State::Headers if line.is_empty() => {
                self.flush_header()?;
                self.start_body()?;
            }
            State::Headers if line[0] == b' ' || line[0] == b'\t' => {
                let (_, ref mut value) = *self.pending.as_mut()
                    .ok_or(RequestError::BadRequest(
                        "continuation line without a header"))?;
                let cont = latin1(line);
                let cont = cont.trim();
                if !cont.is_empty() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(cont);
                }
            }
            State::Headers => {
                let header = parse_header(line)?;
                self.flush_header()?;
                self.pending = Some(header);
            }
            _ => unreachable!("line framing after headers"),
        }
        Ok(())
    }
    fn flush_header(&mut self) -> Result<(), RequestError> {
        if let Some((name, value)) = self.pending.take() {
            if is_content_length(&name) {
                self.content_length = Some(parse_content_length(&value)?);
            }
            self.headers.set(name, value);
        }
        Ok(())
    }
    fn start_body(&mut self) -> Result<(), RequestError> {
        match self.content_length {
            Some(len) if len > self.max_entity_size => {
                Err(RequestError::EntityTooLarge(len, self.max_entity_size))
            }
            Some(len) if len > 0 => {
                self.body.set_declared(len);
                self.state = State::Body;
                Ok(())
            }
            _ => {
                self.state = State::Done;
                Ok(())
            }
        }
    }
}
