//! Externalised supervisor state.
//!
//! Three artifacts survive the warden itself: a pid file, a line-oriented
//! event log, and a JSON status document. Operators and the next warden
//! instance read these; the warden only ever appends or atomically rewrites.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::policy::WorkerState;

/// Status document schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StatusDocument {
    pub state: WorkerState,
    pub worker_pid: Option<u32>,
    pub restarts_in_window: usize,
    pub last_event: String,
    pub updated_at: String,
}

/// Paths for the externalised state.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub status_file: PathBuf,
}

impl StatePaths {
    pub fn under(dir: &Path) -> Self {
        Self {
            pid_file: dir.join("warden.pid"),
            log_file: dir.join("warden.log"),
            status_file: dir.join("warden-status.json"),
        }
    }
}

pub struct StateWriter {
    paths: StatePaths,
}

impl StateWriter {
    pub fn new(paths: StatePaths) -> Self {
        Self { paths }
    }

    pub fn write_pid(&self, pid: u32) -> std::io::Result<()> {
        let mut file = File::create(&self.paths.pid_file)?;
        writeln!(file, "{pid}")
    }

    pub fn clear_pid(&self) {
        let _ = std::fs::remove_file(&self.paths.pid_file);
    }

    /// Append one line to the event log.
    pub fn log(&self, line: &str) {
        let stamped = format!("{} {line}\n", Utc::now().to_rfc3339());
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.paths.log_file)
            .and_then(|mut f| f.write_all(stamped.as_bytes()));
        if let Err(err) = result {
            tracing::warn!(error = %err, "warden log append failed");
        }
    }

    /// Rewrite the status document via a temp file rename.
    pub fn write_status(&self, status: &StatusDocument) {
        let tmp = self.paths.status_file.with_extension("json.tmp");
        let result = serde_json::to_vec_pretty(status)
            .map_err(std::io::Error::other)
            .and_then(|bytes| std::fs::write(&tmp, bytes))
            .and_then(|_| std::fs::rename(&tmp, &self.paths.status_file));
        if let Err(err) = result {
            tracing::warn!(error = %err, "warden status write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_log_round_trip() {
        let dir = std::env::temp_dir().join(format!("warden-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let writer = StateWriter::new(StatePaths::under(&dir));

        writer.write_pid(4242).unwrap();
        writer.log("worker started");
        writer.write_status(&StatusDocument {
            state: WorkerState::Running,
            worker_pid: Some(4242),
            restarts_in_window: 0,
            last_event: "started".into(),
            updated_at: Utc::now().to_rfc3339(),
        });

        let pid = std::fs::read_to_string(dir.join("warden.pid")).unwrap();
        assert_eq!(pid.trim(), "4242");
        let log = std::fs::read_to_string(dir.join("warden.log")).unwrap();
        assert!(log.contains("worker started"));
        let status: StatusDocument =
            serde_json::from_str(&std::fs::read_to_string(dir.join("warden-status.json")).unwrap())
                .unwrap();
        assert_eq!(status.state, WorkerState::Running);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
