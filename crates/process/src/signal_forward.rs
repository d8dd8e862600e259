// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Forwards termination signals received on an injected channel to the
//! current child (spec.md §5). The runner returns an error distinguishable
//! from ordinary non-zero exit once a signal has been forwarded.

use pr_core::{ProcessError, Signal};
use tokio::process::Child;
use tokio::sync::broadcast;

pub async fn wait_with_signal_forwarding(
    child: &mut Child,
    mut signal_rx: Option<broadcast::Receiver<Signal>>,
    program: &str,
) -> Result<(), ProcessError> {
    let mut signalled = false;
    loop {
        tokio::select! {
            biased;
            status = child.wait() => {
                let status = status.map_err(|source| ProcessError::Io {
                    program: program.to_string(),
                    source,
                })?;
                if signalled {
                    return Err(ProcessError::SignalTerminated { program: program.to_string() });
                }
                return interpret_status(status, program);
            }
            signal = recv_signal(&mut signal_rx) => {
                if let Some(signal) = signal {
                    signalled = true;
                    forward_signal(child, signal);
                } else {
                    // Channel closed with no more senders: stop polling it.
                    signal_rx = None;
                }
            }
        }
    }
}

async fn recv_signal(rx: &mut Option<broadcast::Receiver<Signal>>) -> Option<Signal> {
    match rx {
        Some(rx) => match rx.recv().await {
            Ok(signal) => Some(signal),
            Err(broadcast::error::RecvError::Lagged(_)) => None,
            Err(broadcast::error::RecvError::Closed) => None,
        },
        None => std::future::pending().await,
    }
}

fn interpret_status(status: std::process::ExitStatus, program: &str) -> Result<(), ProcessError> {
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(ProcessError::Exited {
            program: program.to_string(),
            code,
        }),
        None => Err(ProcessError::SignalTerminated {
            program: program.to_string(),
        }),
    }
}

#[cfg(unix)]
fn forward_signal(child: &Child, signal: Signal) {
    use nix::sys::signal::{kill, Signal as NixSignal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let nix_signal = match signal {
        Signal::Interrupt => NixSignal::SIGINT,
        Signal::Terminate => NixSignal::SIGTERM,
    };
    if let Err(err) = kill(Pid::from_raw(pid as i32), nix_signal) {
        tracing::warn!(error = %err, pid, "failed to forward signal to child");
    }
}

#[cfg(not(unix))]
fn forward_signal(child: &mut Child, _signal: Signal) {
    if let Err(err) = child.start_kill() {
        tracing::warn!(error = %err, "failed to kill child");
    }
}

#[cfg(test)]
#[path = "signal_forward_tests.rs"]
mod tests;
