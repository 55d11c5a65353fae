use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Minimal HTTP/1.1 fixture hosting a single resource with byte-range
/// support, enough for reqwest to talk to. Every connection is logged so
/// tests can assert which requests the engine actually issued.
pub struct FixtureServer {
    addr: SocketAddr,
    body: Arc<RwLock<Vec<u8>>>,
    ignore_range: Arc<AtomicBool>,
    requests: Arc<Mutex<Vec<LoggedRequest>>>,
}

#[derive(Debug, Clone)]
pub struct LoggedRequest {
    /// Start offset of the Range header, if one was sent.
    pub range: Option<u64>,
}

impl FixtureServer {
    pub async fn start(body: Vec<u8>) -> Self {
        Self::start_with(body, None).await
    }

    /// `throttle` inserts a delay between 4 KiB response chunks so tests can
    /// act while a transfer is in flight.
    pub async fn start_with(body: Vec<u8>, throttle: Option<Duration>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let body = Arc::new(RwLock::new(body));
        let ignore_range = Arc::new(AtomicBool::new(false));
        let requests = Arc::new(Mutex::new(Vec::new()));

        {
            let body = body.clone();
            let ignore_range = ignore_range.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    let body = body.clone();
                    let ignore = ignore_range.load(Ordering::SeqCst);
                    let requests = requests.clone();
                    tokio::spawn(async move {
                        // Client may hang up early (header-only probes).
                        let _ = handle(stream, body, ignore, throttle, requests).await;
                    });
                }
            });
        }

        Self {
            addr,
            body,
            ignore_range,
            requests,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/data.bin", self.addr)
    }

    #[allow(dead_code)]
    pub fn set_body(&self, body: Vec<u8>) {
        *self.body.write().unwrap() = body;
    }

    /// When set, range requests are answered with a full 200 response.
    #[allow(dead_code)]
    pub fn ignore_range(&self, on: bool) {
        self.ignore_range.store(on, Ordering::SeqCst);
    }

    #[allow(dead_code)]
    pub fn requests(&self) -> Vec<LoggedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn handle(
    mut stream: TcpStream,
    body: Arc<RwLock<Vec<u8>>>,
    ignore_range: bool,
    throttle: Option<Duration>,
    requests: Arc<Mutex<Vec<LoggedRequest>>>,
) -> std::io::Result<()> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
        if raw.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }
    let head = String::from_utf8_lossy(&raw);
    let range = head.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if !name.eq_ignore_ascii_case("range") {
            return None;
        }
        let rest = value.trim().strip_prefix("bytes=")?;
        rest.split('-').next()?.parse::<u64>().ok()
    });
    requests.lock().unwrap().push(LoggedRequest { range });

    let content = body.read().unwrap().clone();
    let total = content.len();

    let (status, start) = match range {
        Some(start) if !ignore_range && (start as usize) <= total => {
            ("206 Partial Content", start as usize)
        }
        _ => ("200 OK", 0),
    };
    let payload = &content[start..];

    let mut response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        payload.len()
    );
    if start > 0 || status.starts_with("206") {
        response.push_str(&format!(
            "Content-Range: bytes {}-{}/{}\r\n",
            start,
            total.saturating_sub(1),
            total
        ));
    }
    response.push_str("\r\n");
    stream.write_all(response.as_bytes()).await?;

    match throttle {
        None => stream.write_all(payload).await?,
        Some(delay) => {
            for chunk in payload.chunks(4096) {
                stream.write_all(chunk).await?;
                stream.flush().await?;
                tokio::time::sleep(delay).await;
            }
        }
    }
    stream.flush().await?;
    Ok(())
}
