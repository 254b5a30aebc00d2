//! Backend as a local child process.

use parking_lot::Mutex;
use tokio::process::{Child, Command};

use crate::error::ProcessError;

pub struct SystemProcess {
    directory: String,
    start_command: Vec<String>,
    stop_command: Option<Vec<String>>,
    child: Mutex<Option<Child>>,
}

fn parse_command(cmd: &str) -> Option<Vec<String>> {
    let parts: Vec<String> = cmd.split_whitespace().map(str::to_owned).collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

impl SystemProcess {
    pub fn new(directory: &str, start_command: &str, stop_command: &str) -> Result<Self, ProcessError> {
        let start_command = parse_command(start_command).ok_or(ProcessError::NoStartCommand)?;

        Ok(Self {
            directory: directory.to_owned(),
            start_command,
            stop_command: parse_command(stop_command),
            child: Mutex::new(None),
        })
    }

    fn command(&self, argv: &[String]) -> Command {
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        if !self.directory.is_empty() {
            cmd.current_dir(&self.directory);
        }
        cmd
    }
}

#[async_trait::async_trait]
impl super::Process for SystemProcess {
    async fn start(&self) -> Result<(), ProcessError> {
        let child = self.command(&self.start_command).spawn()?;
        *self.child.lock() = Some(child);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProcessError> {
        if let Some(stop) = &self.stop_command {
            self.command(stop).spawn()?;
            return Ok(());
        }

        let pid = match self.child.lock().as_ref().and_then(Child::id) {
            Some(pid) => pid,
            None => return Ok(()),
        };

        kill_gracefully(pid)
    }

    async fn is_running(&self) -> Result<bool, ProcessError> {
        let mut child = self.child.lock();

        match child.as_mut() {
            None => Ok(false),
            // try_wait returns the exit status once the child is gone.
            Some(c) => Ok(c.try_wait()?.is_none()),
        }
    }
}

#[cfg(unix)]
fn kill_gracefully(pid: u32) -> Result<(), ProcessError> {
    // Minecraft servers save and exit on SIGQUIT.
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGQUIT) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error().into())
    }
}

#[cfg(windows)]
fn kill_gracefully(pid: u32) -> Result<(), ProcessError> {
    std::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .status()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::Process;
    use super::*;

    #[test]
    fn empty_start_command_is_rejected() {
        assert!(matches!(
            SystemProcess::new("", "", ""),
            Err(ProcessError::NoStartCommand)
        ));
    }

    #[tokio::test]
    async fn not_started_means_not_running() {
        let process = SystemProcess::new("", "sleep 30", "").unwrap();
        assert!(!process.is_running().await.unwrap());
    }

    #[tokio::test]
    async fn started_child_is_running_until_stopped() {
        let process = SystemProcess::new("", "sleep 30", "").unwrap();

        process.start().await.unwrap();
        assert!(process.is_running().await.unwrap());

        process.stop().await.unwrap();
    }
}
