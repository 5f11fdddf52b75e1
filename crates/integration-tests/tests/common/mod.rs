//! Shared fixtures: a scripted fake `backy2` and a wired orchestrator.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use backy_core::application::{BackupWorker, Orchestrator, OrchestratorConfig};
use backy_core::domain::BackupTool;
use backy_core::port::id_provider::UuidProvider;
use backy_core::port::time_provider::SystemTimeProvider;
use backy_infra_fs::FileMappingStore;
use backy_infra_system::ShellExecutor;
use tempfile::TempDir;

pub const SOURCE_PATH: &str = "file:///backup-source/backup-this";
pub const VERSION_SIZE_BYTES: i64 = 4 * 1024 * 1024;

/// Behaves like the parts of backy2 the webhook uses. Versions live in
/// `versions` as `uid|size_bytes|valid|protected`.
const FAKE_BACKY2: &str = r#"#!/usr/bin/env bash
STATE="__STATE__"
echo "$*" >> "$STATE/calls"

case "$1" in
  ls)
    if [ ! -f "$STATE/initialized" ]; then
      echo "ERROR: database not initialized" >&2
      exit 1
    fi
    echo "    INFO: $(wc -l < "$STATE/versions" 2>/dev/null || echo 0) versions"
    ;;
  initdb)
    touch "$STATE/initialized"
    echo "    INFO: Empty database created." >&2
    ;;
  -m)
    echo "type|date|name|snapshot_name|size|size_bytes|uid|valid|protected|tags|expire"
    if [ -f "$STATE/versions" ]; then
      while IFS='|' read -r uid size valid protected; do
        echo "version|2024-05-01 10:00:00|backup-this||1|$size|$uid|$valid|$protected|b_daily|"
      done < "$STATE/versions"
    fi
    ;;
  backup)
    echo $$ > "$STATE/backup_pid"
    if [ -f "$STATE/backup_delay" ]; then
      sleep "$(cat "$STATE/backup_delay")"
    fi
    if [ -f "$STATE/backup_fail" ]; then
      echo "    ERROR: Unable to read source $2" >&2
      exit 1
    fi
    n=$(( $(cat "$STATE/counter" 2>/dev/null || echo 0) + 1 ))
    echo "$n" > "$STATE/counter"
    uid=$(printf 'aaaaaaaa-0000-4000-8000-%012d' "$n")
    echo "$uid|__SIZE__|1|0" >> "$STATE/versions"
    echo "    INFO: Backed up 1/1 blocks" >&2
    echo "    INFO: New version: $uid (Tags: [b_daily])" >&2
    echo "    INFO: Backy complete." >&2
    ;;
  rm)
    line=$(grep "^$2|" "$STATE/versions" 2>/dev/null)
    if [ -z "$line" ]; then
      echo "    ERROR: Version $2 not found." >&2
      exit 1
    fi
    if [ "$(echo "$line" | cut -d'|' -f4)" = "1" ]; then
      echo "    ERROR: Version $2 is too young. Will not delete." >&2
      exit 100
    fi
    grep -v "^$2|" "$STATE/versions" > "$STATE/versions.new"
    mv "$STATE/versions.new" "$STATE/versions"
    echo "    INFO: Removed backup version $2 with 1 blocks." >&2
    ;;
  *)
    echo "    ERROR: unknown command $1" >&2
    exit 2
    ;;
esac
"#;

/// Fake backy2 script plus the state directory it reads
pub struct FakeBacky2 {
    dir: TempDir,
}

impl FakeBacky2 {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("state");
        std::fs::create_dir_all(&state).unwrap();

        let script = FAKE_BACKY2
            .replace("__STATE__", &state.display().to_string())
            .replace("__SIZE__", &VERSION_SIZE_BYTES.to_string());
        let path = dir.path().join("backy2");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self { dir }
    }

    pub fn binary(&self) -> PathBuf {
        self.dir.path().join("backy2")
    }

    fn state(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    pub fn initialize(&self) {
        std::fs::write(self.state().join("initialized"), "").unwrap();
    }

    pub fn is_initialized(&self) -> bool {
        self.state().join("initialized").exists()
    }

    pub fn set_backup_delay(&self, seconds: f64) {
        std::fs::write(self.state().join("backup_delay"), seconds.to_string()).unwrap();
    }

    pub fn clear_backup_delay(&self) {
        let _ = std::fs::remove_file(self.state().join("backup_delay"));
    }

    pub fn fail_backups(&self) {
        std::fs::write(self.state().join("backup_fail"), "").unwrap();
    }

    /// Mark a version as inside the protection window
    pub fn protect(&self, uid: &str) {
        let path = self.state().join("versions");
        let versions = std::fs::read_to_string(&path).unwrap();
        let updated: Vec<String> = versions
            .lines()
            .map(|line| {
                let fields: Vec<&str> = line.split('|').collect();
                if fields[0] == uid {
                    format!("{}|{}|{}|1", fields[0], fields[1], fields[2])
                } else {
                    line.to_string()
                }
            })
            .collect();
        std::fs::write(&path, updated.join("\n") + "\n").unwrap();
    }

    pub fn version_uids(&self) -> Vec<String> {
        std::fs::read_to_string(self.state().join("versions"))
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.split('|').next())
            .map(str::to_string)
            .collect()
    }

    pub fn backup_pid(&self) -> Option<i32> {
        std::fs::read_to_string(self.state().join("backup_pid"))
            .ok()
            .and_then(|pid| pid.trim().parse().ok())
    }

    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.state().join("calls"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

pub fn config(fake: &FakeBacky2) -> OrchestratorConfig {
    OrchestratorConfig::new(SOURCE_PATH)
        .with_tool(BackupTool::new(fake.binary().display().to_string()))
        .with_max_running_time(Duration::from_secs(30))
}

/// Orchestrator over the real shell executor and file store, worker spawned
pub fn start(config: OrchestratorConfig, ids_dir: &Path) -> Arc<Orchestrator> {
    let store = Arc::new(FileMappingStore::open(ids_dir).unwrap());
    let (orchestrator, worker): (Orchestrator, BackupWorker) = Orchestrator::new(
        config,
        Arc::new(ShellExecutor::default()),
        store,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    );
    tokio::spawn(worker.run());
    Arc::new(orchestrator)
}

/// A killed process is gone or a zombie awaiting its reaper
#[cfg(target_os = "linux")]
pub fn process_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => {
            let state = stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next());
            state != Some("Z")
        }
        Err(_) => false,
    }
}
