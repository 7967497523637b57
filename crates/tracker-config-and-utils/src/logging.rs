//! Logging initialization for tracker processes.
//!
//! Thin wrapper over the observability crate: picks the service name and
//! decides between stderr-only and the shared JSONL file.

use crate::Paths;

/// Initialize logging for the `trackerd` service.
///
/// Logs go to stderr; when `TRACKER_LOG_FILE` is set (to a path, or to `1`
/// for the default `logs/tracker.jsonl` under `paths`) they are also
/// appended to that JSONL file.
pub fn init_logging(level: &str, paths: &Paths) {
    init_logging_for_service("trackerd", level, paths);
}

/// Initialize logging with a custom service name.
pub fn init_logging_for_service(service_name: &str, level: &str, paths: &Paths) {
    let log_path = std::env::var("TRACKER_LOG_FILE")
        .ok()
        .and_then(non_empty_env)
        .map(|value| match value.as_str() {
            "1" | "true" => paths.log_file(),
            _ => value.into(),
        });

    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        also_stderr: true,
        log_path,
    });
}

fn non_empty_env(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
