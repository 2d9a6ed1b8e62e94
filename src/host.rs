// src/host.rs

//! External package tool (opkg)
//!
//! The receiver's package manager is driven through a fixed command
//! interface: `opkg <verb> [package]`.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Package operation requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageAction {
    Install,
    Remove,
}

impl PackageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageAction::Install => "install",
            PackageAction::Remove => "remove",
        }
    }
}

/// Host package manager
pub trait PackageTool: Send + Sync {
    /// Installed packages as name -> version
    fn list_installed(&self) -> Result<HashMap<String, String>>;

    /// Install or remove one package, returning the tool's output
    fn run(&self, action: PackageAction, package: &str) -> Result<String>;

    /// Refresh the package lists from all configured feeds
    fn update(&self) -> Result<String>;
}

/// Parse `opkg list-installed` output (`name - version` per line)
pub fn parse_installed(output: &str) -> HashMap<String, String> {
    output
        .lines()
        .filter_map(|line| {
            let (name, version) = line.split_once(" - ")?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            // Newer opkg appends " - description"; keep only the version.
            let version = version.split(" - ").next().unwrap_or(version).trim();
            Some((name.to_string(), version.to_string()))
        })
        .collect()
}

/// opkg invoked as an external process
pub struct Opkg {
    program: PathBuf,
    timeout: Duration,
}

impl Opkg {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: PathBuf::from("opkg"),
            timeout,
        }
    }

    /// Use a different binary (wrappers, test doubles)
    pub fn with_program(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn execute(&self, args: &[&str]) -> Result<String> {
        info!("Running {} {}", self.program.display(), args.join(" "));
        let output = run_with_timeout(
            Command::new(&self.program).args(args),
            self.timeout,
        )?;

        if !output.success {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim().to_string()
            } else {
                output.stderr.trim().to_string()
            };
            return Err(Error::CommandError(format!(
                "{} {} failed: {}",
                self.program.display(),
                args.join(" "),
                detail
            )));
        }
        Ok(output.stdout)
    }
}

impl PackageTool for Opkg {
    fn list_installed(&self) -> Result<HashMap<String, String>> {
        let stdout = self.execute(&["list-installed"])?;
        let installed = parse_installed(&stdout);
        debug!("{} packages installed", installed.len());
        Ok(installed)
    }

    fn run(&self, action: PackageAction, package: &str) -> Result<String> {
        self.execute(&[action.as_str(), package])
    }

    fn update(&self) -> Result<String> {
        self.execute(&["update"])
    }
}

/// Captured result of a finished process
#[derive(Debug)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Run a command, killing it once `timeout` elapses
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<CommandOutput> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::CommandError(format!("Failed to start {}: {}", program, e)))?;

    // Drain both pipes on their own threads so a chatty process cannot
    // block on a full pipe while we wait for it.
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            warn!("Command {} timed out after {:?}", program, timeout);
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::CommandError(format!(
                "{} timed out after {} seconds",
                program,
                timeout.as_secs()
            )));
        }
        thread::sleep(POLL_INTERVAL);
    };

    Ok(CommandOutput {
        success: status.success(),
        stdout: stdout.map(join_reader).unwrap_or_default(),
        stderr: stderr.map(join_reader).unwrap_or_default(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = pipe.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    })
}

fn join_reader(handle: thread::JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed() {
        let output = "busybox - 1.36.1-r0\nenigma2-plugin-extensions-e2kodi - 2.1 - Kodi addons\n\ngarbage line\n";
        let installed = parse_installed(output);
        assert_eq!(installed.len(), 2);
        assert_eq!(installed["busybox"], "1.36.1-r0");
        assert_eq!(installed["enigma2-plugin-extensions-e2kodi"], "2.1");
    }

    #[test]
    fn test_action_verbs() {
        assert_eq!(PackageAction::Install.as_str(), "install");
        assert_eq!(PackageAction::Remove.as_str(), "remove");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_timeout_captures_output() {
        let output = run_with_timeout(
            Command::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]),
            Duration::from_secs(10),
        )
        .unwrap();
        assert!(!output.success);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_timeout_kills_slow_process() {
        let result = run_with_timeout(
            Command::new("sh").args(["-c", "sleep 5"]),
            Duration::from_millis(200),
        );
        assert!(matches!(result, Err(Error::CommandError(_))));
    }

    #[test]
    fn test_missing_program_is_command_error() {
        let opkg = Opkg::with_program("/nonexistent/opkg", Duration::from_secs(1));
        assert!(matches!(opkg.update(), Err(Error::CommandError(_))));
    }
}
