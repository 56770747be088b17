//! Minimal HTTP/1.1 origin for backend tests.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

/// Path -> (status, body, Content-Length sent).
type Routes = HashMap<String, (u16, Vec<u8>, usize)>;

pub(crate) struct TestServer {
    addr: SocketAddr,
    hits: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    /// Serve `(path, status, body)` routes; anything else is a 404.
    pub(crate) fn start(routes: Vec<(String, u16, Vec<u8>)>) -> Self {
        Self::start_with_lengths(
            routes
                .into_iter()
                .map(|(path, status, body)| {
                    let len = body.len();
                    (path, status, body, len)
                })
                .collect(),
        )
    }

    /// Like `start`, with an explicit Content-Length per route; a length
    /// larger than the body makes the server hang up early.
    pub(crate) fn start_with_lengths(routes: Vec<(String, u16, Vec<u8>, usize)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<Routes> = Arc::new(
            routes
                .into_iter()
                .map(|(path, status, body, len)| (path, (status, body, len)))
                .collect(),
        );
        let hits = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                serve(stream, &routes, &seen);
            }
        });
        Self { addr, hits }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub(crate) fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Request paths received so far, in order.
    pub(crate) fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

fn serve(stream: TcpStream, routes: &Routes, hits: &Mutex<Vec<String>>) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) if line == "\r\n" || line == "\n" => break,
            Ok(_) => {}
            Err(_) => return,
        }
    }
    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    hits.lock().unwrap().push(path.clone());

    let (status, body, len) = routes
        .get(&path)
        .cloned()
        .unwrap_or((404, b"not found".to_vec(), 9));
    let mut head = format!(
        "HTTP/1.1 {} X\r\nContent-Length: {}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n",
        status, len
    );
    if body.starts_with(&[0x1f, 0x8b]) {
        head.push_str("Content-Encoding: gzip\r\n");
    }
    head.push_str("\r\n");
    let mut stream = reader.into_inner();
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}
