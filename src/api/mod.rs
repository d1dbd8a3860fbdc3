use crate::status::StatusBoard;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const MAX_REQUEST_BYTES: usize = 8192;
/// Concurrent `/video_feed` clients; further ones get 503 until a stream ends.
pub const MAX_STREAMS: usize = 16;
const STREAM_WRITE_TIMEOUT: Duration = Duration::from_secs(5);
const STREAM_BOUNDARY: &str = "frame";
const INDEX_HTML: &str = include_str!("index.html");

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    /// Delay between parts of `/video_feed`.
    pub stream_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:9000".to_string(),
            stream_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    /// Stop accepting, end open streams at their next part, and join every server thread.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

/// Read-only HTTP view over a `StatusBoard`.
pub struct ApiServer {
    cfg: ApiConfig,
    board: Arc<StatusBoard>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, board: Arc<StatusBoard>) -> Self {
        Self { cfg, board }
    }

    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg.clone();
        let board = self.board.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, cfg, board, shutdown_thread) {
                log::error!("slot api stopped: {}", err);
            }
        });

        log::info!("slot api listening on http://{}", addr);
        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_api(
    listener: TcpListener,
    cfg: ApiConfig,
    board: Arc<StatusBoard>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let mut streams: Vec<JoinHandle<()>> = Vec::new();
    let result = loop {
        if shutdown.load(Ordering::SeqCst) {
            break Ok(());
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(err) = handle_connection(stream, &cfg, &board, &shutdown, &mut streams)
                {
                    log::warn!("slot api request from {} failed: {}", peer, err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => break Err(err.into()),
        }
    };
    shutdown.store(true, Ordering::SeqCst);
    for handle in streams {
        if handle.join().is_err() {
            log::warn!("video feed thread panicked");
        }
    }
    result
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ApiConfig,
    board: &Arc<StatusBoard>,
    shutdown: &Arc<AtomicBool>,
    streams: &mut Vec<JoinHandle<()>>,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    let request = read_request(&mut stream)?;
    if request.method != "GET" {
        write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        return Ok(());
    }
    match request.path.as_str() {
        "/" => write_response(
            &mut stream,
            200,
            "text/html; charset=utf-8",
            &[],
            INDEX_HTML.as_bytes(),
        ),
        "/health" => write_json_response(&mut stream, 200, r#"{"status":"ok"}"#),
        "/slots" => {
            let latest = board.latest()?;
            let payload = latest.report.to_json()?;
            write_json_response(&mut stream, 200, &payload)
        }
        "/frame.jpg" => serve_frame(&mut stream, &request, board),
        "/video_feed" => {
            streams.retain(|handle| !handle.is_finished());
            if streams.len() >= MAX_STREAMS {
                log::warn!("video feed refused: {} streams already open", streams.len());
                return write_json_response(&mut stream, 503, r#"{"error":"too_many_streams"}"#);
            }
            stream.set_write_timeout(Some(STREAM_WRITE_TIMEOUT))?;
            let board = board.clone();
            let shutdown = shutdown.clone();
            let interval = cfg.stream_interval;
            streams.push(std::thread::spawn(move || {
                match stream_frames(&mut stream, &board, &shutdown, interval) {
                    Ok(parts) => log::debug!("video feed closed after {} parts", parts),
                    Err(err) => log::debug!("video feed ended: {}", err),
                }
            }));
            Ok(())
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn serve_frame(stream: &mut TcpStream, request: &HttpRequest, board: &StatusBoard) -> Result<()> {
    let latest = board.latest()?;
    let (Some(jpeg), Some(etag)) = (latest.frame_jpeg.as_ref(), latest.etag.as_deref()) else {
        return write_json_response(stream, 503, r#"{"error":"no_frame"}"#);
    };
    let quoted = format!("\"{}\"", etag);
    if request.if_none_match(&quoted) {
        return write_response(stream, 304, "image/jpeg", &[("ETag", quoted.as_str())], &[]);
    }
    write_response(stream, 200, "image/jpeg", &[("ETag", quoted.as_str())], jpeg)
}

/// Write one multipart part per interval until the client goes away or shutdown is set.
/// The board is re-read for every part, so refreshed frames show up mid-stream.
fn stream_frames(
    stream: &mut TcpStream,
    board: &StatusBoard,
    shutdown: &AtomicBool,
    interval: Duration,
) -> Result<u64> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
        STREAM_BOUNDARY
    );
    stream.write_all(header.as_bytes())?;
    let mut parts = 0u64;
    while !shutdown.load(Ordering::SeqCst) {
        if let Some(jpeg) = board.latest()?.frame_jpeg.clone() {
            let part_header = format!(
                "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                STREAM_BOUNDARY,
                jpeg.len()
            );
            stream.write_all(part_header.as_bytes())?;
            stream.write_all(&jpeg)?;
            stream.write_all(b"\r\n")?;
            stream.flush()?;
            parts += 1;
        }
        std::thread::sleep(interval);
    }
    Ok(parts)
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        if data.len() > MAX_REQUEST_BYTES {
            return Err(anyhow!("request too large"));
        }
        if data.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let text = String::from_utf8_lossy(&data);
    let mut lines = text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", &[], body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    extra_headers: &[(&str, &str)],
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        304 => "HTTP/1.1 304 Not Modified",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        503 => "HTTP/1.1 503 Service Unavailable",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let mut header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    for (name, value) in extra_headers {
        header.push_str(&format!("{}: {}\r\n", name, value));
    }
    header.push_str("\r\n");
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
}

impl HttpRequest {
    fn if_none_match(&self, etag: &str) -> bool {
        self.headers
            .get("if-none-match")
            .is_some_and(|value| value.split(',').any(|tag| tag.trim() == etag || tag.trim() == "*"))
    }
}
