//! End-to-end scenarios for a started tracker.
//!
//! - `pipeline.rs`  - tracking, flushing, clearing against a local collector
//! - `lifecycle.rs` - lifecycle transitions and listener subscriptions
//! - `startup.rs`   - config validation and startup housekeeping


use crate::Tracker;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracker_config_and_utils::{Paths, TrackerConfig};

/// Collector answering every request with one status and recording the
/// request targets.
struct Collector {
    addr: SocketAddr,
    targets: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl Collector {
    async fn start(status: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let targets = Arc::new(Mutex::new(Vec::new()));

        let handle = tokio::spawn({
            let targets = targets.clone();
            async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let (reader, mut writer) = socket.into_split();
                    let mut reader = BufReader::new(reader);
                    let mut request_line = String::new();
                    if reader.read_line(&mut request_line).await.is_err() {
                        continue;
                    }
                    let mut length = 0usize;
                    loop {
                        let mut line = String::new();
                        if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                            break;
                        }
                        let line = line.trim_end();
                        if line.is_empty() {
                            break;
                        }
                        if let Some((name, value)) = line.split_once(':') {
                            if name.eq_ignore_ascii_case("content-length") {
                                length = value.trim().parse().unwrap_or(0);
                            }
                        }
                    }
                    let mut body = vec![0u8; length];
                    let _ = reader.read_exact(&mut body).await;

                    if let Some(target) = request_line.split_whitespace().nth(1) {
                        targets.lock().unwrap().push(target.to_string());
                    }
                    let response = format!(
                        "HTTP/1.1 {status} Scripted\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    );
                    let _ = writer.write_all(response.as_bytes()).await;
                    let _ = writer.shutdown().await;
                }
            }
        });

        Self {
            addr,
            targets,
            handle,
        }
    }

    fn host(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Config aimed at `host` with timers long enough to stay out of the way.
fn config_for(host: &str) -> TrackerConfig {
    TrackerConfig {
        project_id: "proj".to_string(),
        data_collection_server_host: host.to_string(),
        data_upload_interval_secs: 3600,
        max_retries: 0,
        retry_delay_ms: 10,
        connect_timeout_secs: 2,
        read_timeout_secs: 2,
        ..TrackerConfig::default()
    }
}

async fn start_tracker(config: TrackerConfig) -> (TempDir, Tracker) {
    let dir = tempfile::tempdir().unwrap();
    let paths = Paths::with_base_dir(dir.path().to_path_buf());
    let tracker = Tracker::start(config, paths).await.unwrap();
    (dir, tracker)
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Wait until the store holds exactly `expected` rows.
async fn wait_for_pending(tracker: &Tracker, expected: usize) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if tracker.store().count(None).await == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
