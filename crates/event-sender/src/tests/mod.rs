//! Delivery tests against a scripted local collector.
//!
//! - `delivery.rs` - status handling, retry, redirects, compression


use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// A request the collector received.
#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: String,
    pub target: String,
    /// Header names lowercased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Minimal HTTP/1.1 server answering with scripted statuses.
///
/// The last status repeats once the script runs out.
pub(crate) struct MockCollector {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl MockCollector {
    pub async fn start(statuses: Vec<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = tokio::spawn({
            let requests = requests.clone();
            async move {
                let mut served = 0usize;
                loop {
                    let Ok((socket, _)) = listener.accept().await else {
                        break;
                    };
                    let status = statuses
                        .get(served)
                        .or_else(|| statuses.last())
                        .copied()
                        .unwrap_or(200);
                    served += 1;
                    handle_connection(socket, status, &requests).await;
                }
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    pub fn host(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockCollector {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Records the request before answering, so a client that saw the
/// response always finds its request recorded.
async fn handle_connection(
    socket: TcpStream,
    status: u16,
    requests: &Mutex<Vec<RecordedRequest>>,
) -> Option<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await.ok()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).await.ok()?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await.ok()?;

    requests.lock().unwrap().push(RecordedRequest {
        method,
        target,
        headers,
        body,
    });

    let location = if (300..400).contains(&status) {
        "Location: http://127.0.0.1:1/elsewhere\r\n"
    } else {
        ""
    };
    let response = format!(
        "HTTP/1.1 {status} Scripted\r\n{location}Content-Length: 0\r\nConnection: close\r\n\r\n"
    );
    writer.write_all(response.as_bytes()).await.ok()?;
    writer.shutdown().await.ok()
}
