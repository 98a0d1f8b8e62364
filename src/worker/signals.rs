// Signal handling for graceful worker shutdown

use crate::error::{RagSqlError, Result};
use tokio::signal::unix::{signal, Signal as TokioSignal, SignalKind};
use tokio::sync::watch;

/// Unix signals that stop the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Terminate,
    Interrupt,
    Hangup,
}

/// Signal handler that manages multiple Unix signals
pub struct SignalHandler {
    sigterm: TokioSignal,
    sigint: TokioSignal,
    sighup: TokioSignal,
}

fn install(kind: SignalKind, name: &str) -> Result<TokioSignal> {
    signal(kind).map_err(|e| RagSqlError::Io {
        source: e,
        context: format!("Failed to setup {} handler", name),
    })
}

impl SignalHandler {
    /// Sets up handlers for SIGTERM, SIGINT and SIGHUP
    pub fn new() -> Result<Self> {
        Ok(Self {
            sigterm: install(SignalKind::terminate(), "SIGTERM")?,
            sigint: install(SignalKind::interrupt(), "SIGINT")?,
            sighup: install(SignalKind::hangup(), "SIGHUP")?,
        })
    }

    /// Wait for any signal to be received
    pub async fn wait(&mut self) -> Signal {
        tokio::select! {
            _ = self.sigterm.recv() => {
                tracing::info!("Received SIGTERM");
                Signal::Terminate
            }
            _ = self.sigint.recv() => {
                tracing::info!("Received SIGINT");
                Signal::Interrupt
            }
            _ = self.sighup.recv() => {
                tracing::info!("Received SIGHUP");
                Signal::Hangup
            }
        }
    }

    /// Forward the first signal into a watch channel the worker observes
    pub fn spawn_shutdown(mut self) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            let signal = self.wait().await;
            tracing::info!("Shutdown requested by {:?}", signal);
            let _ = tx.send(true);
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_hangup_raises_shutdown() {
        let mut shutdown = SignalHandler::new().unwrap().spawn_shutdown();
        assert!(!*shutdown.borrow());

        let status = std::process::Command::new("kill")
            .args(["-HUP", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), shutdown.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(*shutdown.borrow());
    }
}
