//! Blocking execution of external tools under a wall-clock limit.

use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

/// Result of one external process invocation.
#[derive(Debug)]
pub enum ProcessOutcome {
    Finished(Output),
    /// The child was killed after exceeding the limit.
    TimedOut,
}

impl ProcessOutcome {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProcessOutcome::TimedOut)
    }
}

/// Runs `program` with `args`, capturing stdout and stderr.
///
/// Spawn failures come back as the raw `io::Error` so callers can tell a
/// missing binary (`NotFound`) apart from other problems. A dedicated
/// current-thread runtime drives the child. On Unix the child leads its own
/// process group, and a timeout kills the whole group, so helpers it forked
/// (`soffice` starts `soffice.bin`) go too.
pub fn run_with_timeout<I, S>(
    program: &Path,
    args: I,
    timeout: Duration,
) -> std::io::Result<ProcessOutcome>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let mut std_command = std::process::Command::new(program);
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std_command.process_group(0);
    }

    let mut command = tokio::process::Command::from(std_command);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    runtime.block_on(async move {
        let child = command.spawn()?;
        let pid = child.id();
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output.map(ProcessOutcome::Finished),
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                Ok(ProcessOutcome::TimedOut)
            }
        }
    })
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use log::debug;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        // ESRCH: the group already exited.
        debug!("killpg({}) failed: {}", raw, e);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

/// Human-readable exit status for error messages.
pub fn describe_status(output: &Output) -> String {
    match output.status.code() {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}
