use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use selector_http::{Config, Dispatch, Listener, WorkerPool};


struct Reply {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Reply {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|&&(ref n, _)| n.eq_ignore_ascii_case(name))
            .map(|&(_, ref v)| &v[..])
    }
}

fn start(dir: &TempDir) -> SocketAddr {
    let root = dir.path().join("www");
    let spill = dir.path().join("tmp");
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::create_dir_all(&spill).unwrap();
    fs::write(root.join("index.html"), b"<h1>index</h1>").unwrap();
    fs::write(root.join("docs/guide.txt"), b"read me").unwrap();
    fs::write(root.join("style.CSS"), b"p {}").unwrap();

    let config = Config::parse(&format!(r#"
        min_workers = 1
        max_workers = 2
        clients_per_worker = 4
        max_line_size = 256
        max_entity_size = 4096
        temp_dir = {:?}
        document_root = {:?}
    "#, spill.to_str().unwrap(), root.to_str().unwrap())).unwrap();
    let dispatch = Arc::new(Dispatch::new(config.context()));
    let pool = WorkerPool::new(config.min_workers, config.max_workers,
        config.clients_per_worker, config.limits(), dispatch).unwrap();
    let mut listener = Listener::bind("127.0.0.1:0", pool).unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || listener.run());
    addr
}

fn request(addr: SocketAddr, data: &[u8]) -> Reply {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(data).unwrap();
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    let mut headers = [httparse::EMPTY_HEADER; 32];
    let mut parsed = httparse::Response::new(&mut headers);
    let len = match parsed.parse(&out).unwrap() {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => panic!("partial response {:?}", out),
    };
    Reply {
        status: parsed.code.unwrap(),
        headers: parsed.headers.iter().map(|h| {
            (h.name.to_string(),
             String::from_utf8_lossy(h.value).into_owned())
        }).collect(),
        body: out[len..].to_vec(),
    }
}

fn wait_empty(dir: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while fs::read_dir(dir).unwrap().next().is_some() {
        assert!(Instant::now() < deadline, "temporary files left");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn get_and_head() {
    let dir = TempDir::new().unwrap();
    let addr = start(&dir);

    let reply = request(addr, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
    assert_eq!(reply.status, 200);
    assert_eq!(reply.header("Content-Type"), Some("text/html"));
    assert_eq!(reply.header("Content-Length"), Some("14"));
    assert_eq!(reply.header("Server"), Some("selector-http"));
    assert_eq!(reply.header("Connection"), Some("Close"));
    assert!(reply.header("Date").is_some());
    assert_eq!(reply.body, b"<h1>index</h1>");

    let reply = request(addr, b"HEAD /docs/guide.txt HTTP/1.0\r\n\r\n");
    assert_eq!(reply.status, 200);
    assert_eq!(reply.header("Content-Type"), Some("text/plain"));
    assert_eq!(reply.header("Content-Length"), Some("7"));
    assert!(reply.body.is_empty());

    let reply = request(addr, b"GET /style.CSS?v=2 HTTP/1.1\r\n\r\n");
    assert_eq!(reply.header("Content-Type"), Some("text/css"));
    assert_eq!(reply.body, b"p {}");
}

#[test]
fn error_statuses() {
    let dir = TempDir::new().unwrap();
    let addr = start(&dir);

    assert_eq!(request(addr, b"GET /nope.html HTTP/1.1\r\n\r\n").status,
               404);
    assert_eq!(request(addr, b"GET /../secret HTTP/1.1\r\n\r\n").status,
               404);
    assert_eq!(request(addr, b"DELETE / HTTP/1.1\r\n\r\n").status, 501);
    assert_eq!(request(addr, b"GET / HTTP/x\r\n\r\n").status, 400);
    let reply = request(addr,
        b"POST / HTTP/1.1\r\nContent-Length: 100000\r\n\r\n");
    assert_eq!(reply.status, 413);
    let long = format!("GET / HTTP/1.1\r\nX-Long: {}\r\n\r\n",
                       "a".repeat(300));
    assert_eq!(request(addr, long.as_bytes()).status, 431);
}

#[test]
fn post_body_spills_and_is_removed() {
    let dir = TempDir::new().unwrap();
    let addr = start(&dir);
    let body = vec![b'z'; 3000];
    let mut data = format!(
        "POST /docs/guide.txt HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
        body.len()).into_bytes();
    data.extend_from_slice(&body);
    let reply = request(addr, &data);
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, b"read me");
    wait_empty(&dir.path().join("tmp"));
}

#[test]
fn concurrent_clients() {
    let dir = TempDir::new().unwrap();
    let addr = start(&dir);
    let threads: Vec<_> = (0..6).map(|_| thread::spawn(move || {
        request(addr, b"GET /docs/guide.txt HTTP/1.1\r\n\r\n")
    })).collect();
    for thread in threads {
        let reply = thread.join().unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.body, b"read me");
    }
}
