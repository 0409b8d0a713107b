use std::path::Path;
use std::process::{Child, Command as ProcessCommand, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub(crate) enum ProcessError {
    #[error("player process has already been started")]
    AlreadyStarted,
    #[error("player process was never started")]
    NotStarted,
    #[error("failed to start player process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to kill player process: {0}")]
    Kill(#[source] std::io::Error),
}

/// How the supervised child ended, delivered once on the completion channel.
#[derive(Debug, Clone)]
pub(crate) enum ExitOutcome {
    Exited(ExitStatus),
    WaitFailed(String),
}

impl ExitOutcome {
    pub(crate) fn success(&self) -> bool {
        matches!(self, Self::Exited(status) if status.success())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessState {
    NotStarted,
    Running,
    Exited,
}

#[derive(Debug)]
struct Slot {
    state: ProcessState,
    command: Option<ProcessCommand>,
    child: Option<Child>,
    completion_tx: Option<Sender<ExitOutcome>>,
}

/// Owns the single player child process of a session.
///
/// `start` may succeed once. A waiter thread reaps the child and sends its outcome on a
/// one-slot channel, then drops the sender, so every later receive returns immediately.
#[derive(Debug)]
pub(crate) struct PlayerProcess {
    slot: Arc<Mutex<Slot>>,
    completion_rx: Receiver<ExitOutcome>,
}

impl PlayerProcess {
    pub(crate) fn new(command: ProcessCommand) -> Self {
        let (completion_tx, completion_rx) = crossbeam_channel::bounded(1);
        Self {
            slot: Arc::new(Mutex::new(Slot {
                state: ProcessState::NotStarted,
                command: Some(command),
                child: None,
                completion_tx: Some(completion_tx),
            })),
            completion_rx,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ProcessState {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub(crate) fn start(&self) -> Result<(), ProcessError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(mut command) = slot.command.take() else {
            return Err(ProcessError::AlreadyStarted);
        };

        let child = command
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(ProcessError::Spawn)?;
        tracing::info!(pid = child.id(), "player process started");

        let completion_tx = slot.completion_tx.take();
        slot.child = Some(child);
        slot.state = ProcessState::Running;
        drop(slot);

        let shared = Arc::clone(&self.slot);
        thread::spawn(move || {
            let outcome = wait_for_exit(&shared);
            if let Some(tx) = completion_tx {
                let _ = tx.send(outcome);
            }
        });
        Ok(())
    }

    /// Asks the child to stop without waiting for it. Interrupt first, kill if that fails.
    pub(crate) fn stop(&self) -> Result<(), ProcessError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.state {
            ProcessState::NotStarted => return Err(ProcessError::NotStarted),
            ProcessState::Exited => {
                tracing::debug!("player process already exited");
                return Ok(());
            }
            ProcessState::Running => {}
        }
        let Some(child) = slot.child.as_mut() else {
            return Ok(());
        };

        if let Err(err) = interrupt(child) {
            tracing::warn!(error = %err, "interrupt failed, killing player process");
            child.kill().map_err(ProcessError::Kill)?;
        }
        Ok(())
    }

    /// Receiver for the single exit outcome. Disconnected (never blocking) once it fired.
    pub(crate) fn completion(&self) -> Receiver<ExitOutcome> {
        self.completion_rx.clone()
    }
}

fn wait_for_exit(shared: &Mutex<Slot>) -> ExitOutcome {
    loop {
        {
            let mut slot = shared.lock().unwrap_or_else(PoisonError::into_inner);
            let polled = match slot.child.as_mut() {
                Some(child) => child.try_wait(),
                None => return ExitOutcome::WaitFailed("child handle missing".to_string()),
            };
            match polled {
                Ok(Some(status)) => {
                    slot.child = None;
                    slot.state = ProcessState::Exited;
                    tracing::debug!(%status, "player process exited");
                    return ExitOutcome::Exited(status);
                }
                Ok(None) => {}
                Err(err) => {
                    slot.child = None;
                    slot.state = ProcessState::Exited;
                    return ExitOutcome::WaitFailed(err.to_string());
                }
            }
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn interrupt(child: &Child) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| std::io::Error::other("pid out of range"))?;
    if unsafe { libc::kill(pid, libc::SIGINT) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn interrupt(_child: &Child) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "interrupt is not supported on this platform",
    ))
}

/// `<player> <file> --extraintf <intf> --http-port <port> --http-password <pw> [--start-time=<s>]`
pub(crate) fn player_command(
    player_bin: &Path,
    media_file: &str,
    extra_intf: &str,
    http_port: u16,
    http_password: &str,
    start_second: i64,
) -> ProcessCommand {
    let mut cmd = ProcessCommand::new(player_bin);
    cmd.arg(media_file)
        .arg("--extraintf")
        .arg(extra_intf)
        .arg("--http-port")
        .arg(http_port.to_string())
        .arg("--http-password")
        .arg(http_password);
    if start_second > 0 {
        cmd.arg(format!("--start-time={start_second}"));
    }
    cmd
}

#[cfg(test)]
fn command_args(cmd: &ProcessCommand) -> Vec<std::ffi::OsString> {
    cmd.get_args().map(|arg| arg.to_os_string()).collect()
}

#[cfg(unix)]
mod signals {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::thread;

    use anyhow::{Result, anyhow};
    use crossbeam_channel::Receiver;

    static SIGNAL_PIPE_WRITE: AtomicI32 = AtomicI32::new(-1);

    extern "C" fn forward_signal(signum: libc::c_int) {
        let fd = SIGNAL_PIPE_WRITE.load(Ordering::Relaxed);
        if fd < 0 {
            return;
        }
        let byte = signum as u8;
        unsafe {
            let _ = libc::write(fd, (&byte as *const u8).cast::<libc::c_void>(), 1);
        }
    }

    fn install(signum: libc::c_int) -> Result<()> {
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction =
                forward_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::sigemptyset(&mut action.sa_mask);
            action.sa_flags = libc::SA_RESTART;
            if libc::sigaction(signum, &action, std::ptr::null_mut()) != 0 {
                return Err(anyhow!("failed to install handler for signal {signum}"));
            }
        }
        Ok(())
    }

    /// Routes SIGINT, SIGTERM and SIGQUIT through a self-pipe into a channel.
    pub(crate) fn termination_signals() -> Result<Receiver<i32>> {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(anyhow!(
                "failed to create signal pipe: {}",
                std::io::Error::last_os_error()
            ));
        }
        let [read_fd, write_fd] = fds;
        SIGNAL_PIPE_WRITE.store(write_fd, Ordering::Relaxed);
        for signum in [libc::SIGINT, libc::SIGTERM, libc::SIGQUIT] {
            install(signum)?;
        }

        let (tx, rx) = crossbeam_channel::bounded(4);
        thread::spawn(move || {
            loop {
                let mut byte = 0_u8;
                let read = unsafe {
                    libc::read(read_fd, (&mut byte as *mut u8).cast::<libc::c_void>(), 1)
                };
                if read == 1 {
                    if tx.send(i32::from(byte)).is_err() {
                        break;
                    }
                    continue;
                }
                if read < 0
                    && std::io::Error::last_os_error().kind() == std::io::ErrorKind::Interrupted
                {
                    continue;
                }
                break;
            }
        });
        Ok(rx)
    }
}

#[cfg(unix)]
pub(crate) use signals::termination_signals;

#[cfg(not(unix))]
pub(crate) fn termination_signals() -> anyhow::Result<Receiver<i32>> {
    Ok(crossbeam_channel::never())
}
