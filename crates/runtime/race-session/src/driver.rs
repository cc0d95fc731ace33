//! Command-backed safepoint driver
//!
//! Starts an external command that forces the target into a global pause
//! (for a JVM, `jcmd <pid> GC.run`). The child is spawned synchronously so a
//! missing binary is reported as a failed request; waiting for it happens on a
//! detached thread.

use std::process::{Command, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;
use race_core::{RaceError, RaceResult, SafepointDriver};
use tracing::{debug, warn};

/// Last observed result of a request command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Running,
    Exited(Option<i32>),
    WaitFailed(String),
}

/// Runs `program args...` per request
#[derive(Debug, Clone)]
pub struct CommandSafepointDriver {
    program: String,
    args: Vec<String>,
    status: Arc<Mutex<Option<RequestStatus>>>,
}

impl CommandSafepointDriver {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            status: Arc::new(Mutex::new(None)),
        }
    }

    /// `jcmd <pid> GC.run`
    pub fn jcmd_gc(pid: u32) -> Self {
        Self::new("jcmd", [pid.to_string(), "GC.run".to_string()])
    }

    /// Status of the most recent request, `None` before the first one
    pub fn last_status(&self) -> Option<RequestStatus> {
        self.status.lock().clone()
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl SafepointDriver for CommandSafepointDriver {
    fn request_global_pause(&self) -> RaceResult<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| RaceError::debugger(format!("cannot run `{}`: {e}", self.command_line())))?;
        *self.status.lock() = Some(RequestStatus::Running);
        debug!(command = %self.command_line(), pid = child.id(), "safepoint request started");

        let status = Arc::clone(&self.status);
        let command = self.command_line();
        std::thread::Builder::new()
            .name("safepoint-request".to_string())
            .spawn(move || {
                let result = match child.wait() {
                    Ok(exit) => {
                        if !exit.success() {
                            warn!(command = %command, code = ?exit.code(), "safepoint request exited with failure");
                        }
                        RequestStatus::Exited(exit.code())
                    }
                    Err(e) => RequestStatus::WaitFailed(e.to_string()),
                };
                *status.lock() = Some(result);
            })
            .map_err(|e| RaceError::debugger(format!("cannot start request waiter: {e}")))?;
        Ok(())
    }
}
