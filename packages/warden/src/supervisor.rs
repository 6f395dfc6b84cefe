//! Warden runtime.
//!
//! Owns one worker process and runs the detection cycle: process/port
//! liveness, parent-pid watch, memory ceiling, and consecutive health-probe
//! failures. Detections go through the restart budget; quarantine ends
//! automatic recovery and leaves the externalised state behind for
//! operators.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use tokio::process::{Child, Command};

use crate::policy::{BudgetDecision, Detection, RestartBudget, WardenPolicy, WorkerState};
use crate::state_files::{StatePaths, StateWriter, StatusDocument};

const PORT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const PAGE_SIZE: u64 = 4096;

#[derive(Debug, Clone)]
pub struct WardenConfig {
    pub policy: WardenPolicy,
    /// Program and arguments for the supervised worker.
    pub worker_command: Vec<String>,
    pub worker_port: u16,
    pub health_url: String,
    /// Restart the worker if this pid disappears (the launcher).
    pub watch_parent_pid: Option<u32>,
    pub state_dir: PathBuf,
}

pub struct Warden {
    config: WardenConfig,
    budget: RestartBudget,
    writer: StateWriter,
    http: reqwest::Client,
    child: Option<Child>,
}

impl Warden {
    pub fn new(config: WardenConfig) -> Self {
        let writer = StateWriter::new(StatePaths::under(&config.state_dir));
        let budget = RestartBudget::new(config.policy.clone());
        let http = reqwest::Client::builder()
            .timeout(HEALTH_PROBE_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self {
            config,
            budget,
            writer,
            http,
            child: None,
        }
    }

    /// Supervise until quarantined or externally killed.
    pub async fn run(mut self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.config.state_dir)?;
        self.spawn_worker().await?;

        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.policy.cycle_interval_s));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(detection) = self.detect().await else {
                self.budget.record_probe_success();
                self.write_status("healthy");
                continue;
            };

            let now_ms = Utc::now().timestamp_millis().max(0) as u64;
            match self.budget.request_restart(now_ms, detection) {
                BudgetDecision::Restart => {
                    self.writer.log(&format!("restart: {detection:?}"));
                    self.kill_worker().await;
                    self.spawn_worker().await?;
                    self.write_status(&format!("restarted after {detection:?}"));
                }
                BudgetDecision::Quarantine => {
                    self.writer.log("quarantined: restart budget exhausted");
                    self.kill_worker().await;
                    self.writer.clear_pid();
                    self.write_status("quarantined");
                    anyhow::bail!("worker quarantined after exhausting restart budget");
                }
            }
        }
    }

    async fn spawn_worker(&mut self) -> anyhow::Result<()> {
        let (program, args) = self
            .config
            .worker_command
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("worker command is empty"))?;
        let child = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;
        if let Some(pid) = child.id() {
            self.writer.write_pid(pid)?;
            tracing::info!(pid, "worker spawned");
            self.writer.log(&format!("spawned pid {pid}"));
        }
        self.child = Some(child);
        Ok(())
    }

    async fn kill_worker(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
    }

    /// Run the detection layers in severity order. `None` means healthy.
    async fn detect(&mut self) -> Option<Detection> {
        // Layer 0: the launcher we track is gone.
        if let Some(parent) = self.config.watch_parent_pid {
            if !pid_alive(parent) {
                return Some(Detection::ParentDead);
            }
        }

        // Layer 1: process exit or dead port while we are still here.
        if let Some(child) = self.child.as_mut() {
            if matches!(child.try_wait(), Ok(Some(_)) | Err(_)) {
                return Some(Detection::PortDead);
            }
        } else {
            return Some(Detection::PortDead);
        }
        if !port_open(self.config.worker_port).await {
            return Some(Detection::PortDead);
        }

        // Layer 2: resident memory ceiling.
        if let Some(pid) = self.child.as_ref().and_then(Child::id) {
            if let Some(rss) = read_rss_bytes(pid) {
                if rss > self.config.policy.memory_limit_bytes {
                    tracing::warn!(rss, limit = self.config.policy.memory_limit_bytes, "memory over limit");
                    return Some(Detection::MemoryLimit);
                }
            }
        }

        // Layer 3: consecutive health-probe failures.
        match self.http.get(&self.config.health_url).send().await {
            Ok(response) if response.status().is_success() => None,
            _ => self.budget.record_probe_failure(),
        }
    }

    fn write_status(&self, event: &str) {
        self.writer.write_status(&StatusDocument {
            state: self.budget.state(),
            worker_pid: self.child.as_ref().and_then(Child::id),
            restarts_in_window: self.budget.restarts_in_window(),
            last_event: event.to_string(),
            updated_at: Utc::now().to_rfc3339(),
        });
    }

    pub fn state(&self) -> WorkerState {
        self.budget.state()
    }
}

fn pid_alive(pid: u32) -> bool {
    std::path::Path::new(&format!("/proc/{pid}")).exists()
}

async fn port_open(port: u16) -> bool {
    matches!(
        tokio::time::timeout(
            PORT_PROBE_TIMEOUT,
            tokio::net::TcpStream::connect(("127.0.0.1", port)),
        )
        .await,
        Ok(Ok(_))
    )
}

/// Resident set size from /proc/<pid>/statm (second field, pages).
fn read_rss_bytes(pid: u32) -> Option<u64> {
    let statm = std::fs::read_to_string(format!("/proc/{pid}/statm")).ok()?;
    let resident_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(resident_pages * PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_alive() {
        assert!(pid_alive(std::process::id()));
        // Pid 0 is never a /proc entry on Linux.
        assert!(!pid_alive(0));
    }

    #[tokio::test]
    async fn unbound_port_reads_closed() {
        // Port 1 is essentially never listening in test environments.
        assert!(!port_open(1).await);
    }

    #[test]
    fn own_rss_is_readable() {
        let rss = read_rss_bytes(std::process::id()).unwrap();
        assert!(rss > 0);
    }
}
