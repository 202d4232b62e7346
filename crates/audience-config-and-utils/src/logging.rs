//! Logging initialization.
//!
//! Thin wrapper over the observability crate so binaries pick up the same
//! defaults: compact stderr output plus a JSONL file under the logs dir.

use crate::Paths;

/// Service name written into every JSONL entry.
const SERVICE_NAME: &str = "audience-segments";

/// Initialize logging at `level`.
///
/// When `paths` is given, events are also appended to
/// `<base>/logs/audience.jsonl`. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str, paths: Option<&Paths>) {
    observability::init_with_config(observability::LogConfig {
        service_name: SERVICE_NAME.into(),
        default_level: level.into(),
        log_path: paths.map(Paths::log_file),
        also_stderr: true,
    });
}
