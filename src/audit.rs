//! Append-only wire log.
//!
//! When a log directory is configured, every gateway exchange is appended
//! to `<dir>/<YYYYMM>/api_log_<DD>.log`: one file per day inside a month
//! directory. Each exchange is written with a single append so concurrent
//! writers interleave at entry granularity; no locking is taken. Logging
//! never fails a payment call: write errors are reported through
//! `tracing` and swallowed.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};

use chrono::Local;
use tracing::warn;

/// Appends request/response records under a month-directory layout.
#[derive(Debug, Clone)]
pub struct WireLog {
    dir: PathBuf,
}

impl WireLog {
    /// Creates a wire log rooted at `dir`. Directories are created lazily
    /// on first append.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Appends one exchange record. Failures are logged and swallowed.
    pub fn append(&self, url: &str, request: &str, response: &str) {
        if let Err(e) = self.try_append(url, request, response) {
            warn!(error = %e, "wire log append failed");
        }
    }

    fn try_append(&self, url: &str, request: &str, response: &str) -> std::io::Result<()> {
        let now = Local::now();
        let month_dir = self.dir.join(now.format("%Y%m").to_string());
        fs::create_dir_all(&month_dir)?;
        let path = month_dir.join(format!("api_log_{}.log", now.format("%d")));

        let entry = format!(
            "{}\n[request] {url}\n{request}\n[response]\n{response}\n",
            now.format("%Y-%m-%d %H:%M:%S")
        );
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(entry.as_bytes())
    }
}
