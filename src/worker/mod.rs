//! Worker threads, each multiplexing many connections with `mio`
//!
//! A connection lives on exactly one worker. It is read until the request
//! is parsed, then written until the response is sent, then closed.
use std::io::{self, Read, Write};
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use concurrent_queue::ConcurrentQueue;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use mio::net::TcpStream;
use slab::Slab;

use crate::server::{Dispatch, Limits, RequestParser, RequestError};
use crate::server::{Response, ResponseWriter};

pub mod pool;

pub use self::pool::WorkerPool;


const WAKER: Token = Token(usize::MAX);
const EVENTS: usize = 1024;

/// State shared between the worker handle and its thread
struct Shared {
    capacity: usize,
    free: AtomicUsize,
    incoming: ConcurrentQueue<TcpStream>,
    waker: Waker,
    shutdown: AtomicBool,
}

/// Handle to a worker thread
///
/// Dropping the handle asks the thread to stop but does not wait for it.
pub struct Worker {
    id: usize,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

enum State {
    Reading(RequestParser),
    Writing(Output),
    Closed,
}

/// The response being sent and the bytes not yet accepted by the socket
struct Output {
    writer: ResponseWriter,
    buf: Vec<u8>,
    pos: usize,
}

struct Connection {
    stream: TcpStream,
    state: State,
}

enum Progress {
    /// Socket is not ready, wait for the next event
    Wait,
    /// Request is fully read, time to respond
    Respond,
    Close,
}

struct EventLoop {
    id: usize,
    poll: Poll,
    shared: Arc<Shared>,
    limits: Limits,
    dispatch: Arc<Dispatch>,
    connections: Slab<Connection>,
    buf: Vec<u8>,
}

impl Worker {
    /// Starts a worker thread serving up to `capacity` connections
    pub fn spawn(id: usize, capacity: usize, limits: Limits,
        dispatch: Arc<Dispatch>)
        -> io::Result<Worker>
    {
        if capacity == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput,
                "worker capacity must be positive"));
        }
        let poll = Poll::new()?;
        let waker = Waker::new(poll.registry(), WAKER)?;
        let shared = Arc::new(Shared {
            capacity: capacity,
            free: AtomicUsize::new(capacity),
            incoming: ConcurrentQueue::bounded(capacity),
            waker: waker,
            shutdown: AtomicBool::new(false),
        });
        let event_loop = EventLoop {
            id: id,
            poll: poll,
            shared: shared.clone(),
            buf: vec![0; limits.max_line_size],
            limits: limits,
            dispatch: dispatch,
            connections: Slab::with_capacity(capacity),
        };
        let thread = thread::Builder::new()
            .name(format!("worker-{}", id))
            .spawn(move || event_loop.run())?;
        Ok(Worker {
            id: id,
            shared: shared,
            thread: Some(thread),
        })
    }
    pub fn id(&self) -> usize {
        self.id
    }
    pub fn free_slots(&self) -> usize {
        self.shared.free.load(Ordering::SeqCst)
    }
    /// True when the worker owns no connections at all
    pub fn is_idle(&self) -> bool {
        self.free_slots() == self.shared.capacity
    }
    /// True once the worker was stopped or its event loop failed
    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }
    /// Admits a connection if a slot is free
    ///
    /// The connection is given back when the worker is full or shut down.
    pub fn handle(&self, stream: TcpStream) -> Result<(), TcpStream> {
        if self.is_shut_down() {
            return Err(stream);
        }
        let reserved = self.shared.free.fetch_update(
            Ordering::SeqCst, Ordering::SeqCst,
            |free| free.checked_sub(1));
        if reserved.is_err() {
            return Err(stream);
        }
        if let Err(e) = self.shared.incoming.push(stream) {
            self.shared.free.fetch_add(1, Ordering::SeqCst);
            return Err(e.into_inner());
        }
        if let Err(e) = self.shared.waker.wake() {
            error!("Can't wake worker {}: {}", self.id, e);
        }
        Ok(())
    }
    /// Asks the worker thread to exit
    ///
    /// Connections it still owns are closed without a response.
    pub fn stop(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        if let Err(e) = self.shared.waker.wake() {
            debug!("Can't wake worker {}: {}", self.id, e);
        }
    }
    /// Stops the worker and waits for its thread to exit
    pub fn shutdown(mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Worker {} panicked", self.id);
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

impl Output {
    fn new(response: Response) -> Output {
        Output {
            writer: ResponseWriter::new(response),
            buf: Vec::new(),
            pos: 0,
        }
    }
}

impl EventLoop {
    fn run(mut self) {
        debug!("Worker {} started", self.id);
        let mut events = Events::with_capacity(EVENTS);
        loop {
            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!("Worker {} can't poll: {}", self.id, e);
                break;
            }
            if self.shared.shutdown.load(Ordering::SeqCst) {
                break;
            }
            self.accept_incoming();
            for event in events.iter() {
                if event.token() != WAKER {
                    self.ready(event.token());
                }
            }
        }
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let abandoned = self.connections.len();
        self.connections.clear();
        while let Ok(stream) = self.shared.incoming.pop() {
            drop(stream);
        }
        debug!("Worker {} exited, {} connections dropped",
               self.id, abandoned);
    }
    fn accept_incoming(&mut self) {
        while let Ok(mut stream) = self.shared.incoming.pop() {
            let entry = self.connections.vacant_entry();
            let token = Token(entry.key());
            let registry = self.poll.registry();
            match registry.register(&mut stream, token, Interest::READABLE) {
                Ok(()) => {
                    debug!("Worker {}: connection {} accepted",
                           self.id, token.0);
                    entry.insert(Connection {
                        stream: stream,
                        state: State::Reading(
                            RequestParser::new(&self.limits)),
                    });
                }
                Err(e) => {
                    warn!("Worker {} can't register connection: {}",
                          self.id, e);
                    self.shared.free.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }
    fn ready(&mut self, token: Token) {
        let limit = self.limits.max_line_size;
        let conn = match self.connections.get_mut(token.0) {
            Some(conn) => conn,
            // Closed earlier in this round of events
            None => return,
        };
        let mut progress = match conn.state {
            State::Reading(ref mut parser) => {
                match read_request(&mut conn.stream, parser, &mut self.buf) {
                    Ok(progress) => progress,
                    Err(e) => {
                        debug!("Worker {}: connection {} dropped: {}",
                               self.id, token.0, e);
                        Progress::Close
                    }
                }
            }
            State::Writing(ref mut output) => {
                write_response(&mut conn.stream, output, limit)
            }
            State::Closed => Progress::Close,
        };
        if let Progress::Respond = progress {
            let registry = self.poll.registry();
            progress = start_response(conn, token, registry, &self.dispatch,
                                      limit);
        }
        if let Progress::Close = progress {
            self.close(token);
        }
    }
    fn close(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.try_remove(token.0) {
            if let Err(e) = self.poll.registry().deregister(&mut conn.stream) {
                debug!("Can't deregister connection {}: {}", token.0, e);
            }
            // Runs the cleanup chain of an unfinished response
            drop(conn);
            self.shared.free.fetch_add(1, Ordering::SeqCst);
            debug!("Worker {}: connection {} closed", self.id, token.0);
        }
    }
}

/// Reads until the socket would block or the parser is finished
///
/// Socket failures, including end of stream before the request is
/// complete, are returned as `RequestError::Io`. No response is written
/// for them.
fn read_request(stream: &mut TcpStream, parser: &mut RequestParser,
    buf: &mut [u8])
    -> Result<Progress, RequestError>
{
    loop {
        match stream.read(buf) {
            Ok(0) => {
                return Err(RequestError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed before the request was complete")));
            }
            Ok(bytes) => {
                if parser.feed(&buf[..bytes]) {
                    return Ok(Progress::Respond);
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Ok(Progress::Wait);
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(RequestError::Io(e)),
        }
    }
}

/// Builds the response, switches the socket to writing and starts sending
fn start_response(conn: &mut Connection, token: Token, registry: &Registry,
    dispatch: &Dispatch, limit: usize)
    -> Progress
{
    let parser = match mem::replace(&mut conn.state, State::Closed) {
        State::Reading(parser) => parser,
        _ => return Progress::Close,
    };
    let response = respond(parser, dispatch);
    conn.state = State::Writing(Output::new(response));
    if let Err(e) = registry.reregister(&mut conn.stream, token,
                                        Interest::WRITABLE)
    {
        debug!("Can't reregister connection {}: {}", token.0, e);
        return Progress::Close;
    }
    match conn.state {
        State::Writing(ref mut output) => {
            write_response(&mut conn.stream, output, limit)
        }
        _ => Progress::Close,
    }
}

fn respond(parser: RequestParser, dispatch: &Dispatch) -> Response {
    match parser.into_request() {
        Ok(mut request) => {
            let mut response = dispatch.respond(&mut request);
            response.on_complete(request.body.cleanup());
            response
        }
        Err(e) => {
            debug!("Request failed: {}", e);
            dispatch.error(&e)
        }
    }
}

/// Writes until the socket would block or the response is sent
fn write_response(stream: &mut TcpStream, output: &mut Output, limit: usize)
    -> Progress
{
    loop {
        if output.pos == output.buf.len() {
            if output.writer.is_finished() {
                return Progress::Close;
            }
            output.buf.clear();
            output.pos = 0;
            if let Err(e) = output.writer.write_chunk(&mut output.buf, limit) {
                warn!("Can't read response body: {}", e);
                return Progress::Close;
            }
            continue;
        }
        match stream.write(&output.buf[output.pos..]) {
            Ok(0) => return Progress::Close,
            Ok(bytes) => output.pos += bytes,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Progress::Wait;
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                debug!("Error writing response: {}", e);
                return Progress::Close;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::fs;
    use std::io::{Read, Write};
    use std::net::{TcpListener, Shutdown};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use mio::net::TcpStream;
    use tempfile::TempDir;

    use crate::server::{Context, Dispatch, Limits, MimeTypes};
    use super::Worker;

    pub struct Site {
        pub dir: TempDir,
        pub listener: TcpListener,
        pub dispatch: Arc<Dispatch>,
    }

    impl Site {
        pub fn new() -> Site {
            let dir = TempDir::new().unwrap();
            let root = dir.path().join("www");
            fs::create_dir_all(&root).unwrap();
            fs::write(root.join("hello.txt"), b"hello world").unwrap();
            let ctx = Context::new(root, MimeTypes::new());
            Site {
                dir: dir,
                listener: TcpListener::bind("127.0.0.1:0").unwrap(),
                dispatch: Arc::new(Dispatch::new(ctx)),
            }
        }
        pub fn limits(&self) -> Limits {
            Limits {
                max_line_size: 256,
                max_entity_size: 4096,
                temp_dir: self.dir.path().to_path_buf(),
            }
        }
        /// Returns the client side and the server side of a new connection
        pub fn connect(&self) -> (std::net::TcpStream, TcpStream) {
            let addr = self.listener.local_addr().unwrap();
            let client = std::net::TcpStream::connect(addr).unwrap();
            let (server, _) = self.listener.accept().unwrap();
            server.set_nonblocking(true).unwrap();
            (client, TcpStream::from_std(server))
        }
    }

    pub fn wait_for<F: Fn() -> bool>(f: F) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !f() {
            assert!(Instant::now() < deadline, "timed out");
            thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn exchange(client: &mut std::net::TcpStream, request: &[u8])
        -> Vec<u8>
    {
        client.write_all(request).unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).unwrap();
        out
    }

    fn status_of(response: &[u8]) -> u16 {
        let mut headers = [httparse::EMPTY_HEADER; 16];
        let mut parsed = httparse::Response::new(&mut headers);
        parsed.parse(response).unwrap();
        parsed.code.unwrap()
    }

    #[test]
    fn serves_request() {
        let site = Site::new();
        let worker = Worker::spawn(0, 2, site.limits(),
                                   site.dispatch.clone()).unwrap();
        let (mut client, server) = site.connect();
        assert!(worker.handle(server).is_ok());
        let out = exchange(&mut client, b"GET /hello.txt HTTP/1.1\r\n\r\n");
        assert_eq!(status_of(&out), 200);
        assert!(out.ends_with(b"\r\n\r\nhello world"));
        wait_for(|| worker.is_idle());
        worker.shutdown();
    }

    #[test]
    fn request_in_pieces() {
        let site = Site::new();
        let worker = Worker::spawn(0, 1, site.limits(),
                                   site.dispatch.clone()).unwrap();
        let (mut client, server) = site.connect();
        worker.handle(server).unwrap();
        for piece in &[&b"GET /hel"[..], b"lo.txt HTTP/1.0\r", b"\n\r\n"] {
            client.write_all(piece).unwrap();
            client.flush().unwrap();
            thread::sleep(Duration::from_millis(20));
        }
        let mut out = Vec::new();
        client.read_to_end(&mut out).unwrap();
        assert_eq!(status_of(&out), 200);
        worker.shutdown();
    }

    #[test]
    fn parse_error_gets_response() {
        let site = Site::new();
        let worker = Worker::spawn(0, 1, site.limits(),
                                   site.dispatch.clone()).unwrap();
        let (mut client, server) = site.connect();
        worker.handle(server).unwrap();
        let out = exchange(&mut client, b"GARBAGE\r\n\r\n");
        assert_eq!(status_of(&out), 400);
        let (mut client, server) = site.connect();
        wait_for(|| worker.is_idle());
        worker.handle(server).unwrap();
        let long = format!("GET /{} HTTP/1.1\r\n\r\n", "x".repeat(300));
        let out = exchange(&mut client, long.as_bytes());
        assert_eq!(status_of(&out), 414);
        worker.shutdown();
    }

    #[test]
    fn early_eof_closes_silently() {
        let site = Site::new();
        let worker = Worker::spawn(0, 1, site.limits(),
                                   site.dispatch.clone()).unwrap();
        let (mut client, server) = site.connect();
        worker.handle(server).unwrap();
        client.write_all(b"GET /hello.txt HT").unwrap();
        client.shutdown(Shutdown::Write).unwrap();
        let mut out = Vec::new();
        client.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
        wait_for(|| worker.is_idle());
        worker.shutdown();
    }

    #[test]
    fn admission_is_bounded_by_capacity() {
        let site = Site::new();
        let worker = Worker::spawn(0, 1, site.limits(),
                                   site.dispatch.clone()).unwrap();
        let (mut client1, server1) = site.connect();
        let (_client2, server2) = site.connect();
        assert!(worker.handle(server1).is_ok());
        assert_eq!(worker.free_slots(), 0);
        assert!(worker.handle(server2).is_err());
        let out = exchange(&mut client1, b"GET /missing HTTP/1.1\r\n\r\n");
        assert_eq!(status_of(&out), 404);
        wait_for(|| worker.free_slots() == 1);
        let (_client3, server3) = site.connect();
        assert!(worker.handle(server3).is_ok());
        worker.shutdown();
    }

    #[test]
    fn stopped_worker_refuses() {
        let site = Site::new();
        let worker = Worker::spawn(3, 4, site.limits(),
                                   site.dispatch.clone()).unwrap();
        let (mut client, server) = site.connect();
        worker.handle(server).unwrap();
        wait_for(|| worker.free_slots() == 3);
        worker.stop();
        assert!(worker.is_shut_down());
        let (_client2, server2) = site.connect();
        assert!(worker.handle(server2).is_err());
        worker.shutdown();
        let mut out = Vec::new();
        client.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn large_response_waits_for_writable() {
        let site = Site::new();
        let payload: Vec<u8> = (0..8_000_000u32)
            .map(|x| (x % 251) as u8).collect();
        fs::write(site.dir.path().join("www/big.bin"), &payload).unwrap();
        let worker = Worker::spawn(0, 1, site.limits(),
                                   site.dispatch.clone()).unwrap();
        let (mut client, server) = site.connect();
        worker.handle(server).unwrap();
        client.write_all(b"GET /big.bin HTTP/1.1\r\n\r\n").unwrap();
        // Let the send buffer fill up so the worker has to wait
        thread::sleep(Duration::from_millis(300));
        assert_eq!(worker.free_slots(), 0);
        let mut out = Vec::new();
        client.read_to_end(&mut out).unwrap();

        let mut headers = [httparse::EMPTY_HEADER; 16];
        let mut parsed = httparse::Response::new(&mut headers);
        let head_len = match parsed.parse(&out).unwrap() {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => panic!("partial head"),
        };
        assert_eq!(parsed.code, Some(200));
        let length = parsed.headers.iter()
            .find(|h| h.name == "Content-Length").unwrap();
        assert_eq!(length.value, b"8000000");
        assert_eq!(out.len() - head_len, payload.len());
        assert!(out[head_len..] == payload[..]);
        wait_for(|| worker.is_idle());
        worker.shutdown();
    }
}
