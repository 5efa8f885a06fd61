// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::delay_range::{DelayRange, DurationRange};
use crate::errors::DelayRangeError;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub type KillFn = Box<dyn FnOnce() + Send + 'static>;

/// Terminates the process after a random delay.
pub struct Killer {
    range: DelayRange,
    kill: KillFn,
}

impl Killer {
    pub fn new(kill_delay: DurationRange, kill: KillFn) -> Result<Self, DelayRangeError> {
        Ok(Killer {
            range: DelayRange::try_from(kill_delay)?,
            kill,
        })
    }

    /// Killer wired to [`kill_process`].
    pub fn for_process(kill_delay: DurationRange) -> Result<Self, DelayRangeError> {
        Self::new(kill_delay, Box::new(kill_process))
    }

    pub fn start(self) -> JoinHandle<()> {
        let delay = self.range.delay();
        info!("Process will be killed in {delay:?}");
        let kill = self.kill;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            kill();
        })
    }
}

/// Sends SIGKILL to the current process. There is no graceful shutdown.
#[cfg(unix)]
pub fn kill_process() {
    // SAFETY: kill(2) on our own pid has no memory-safety preconditions.
    let rc = unsafe { libc::kill(libc::getpid(), libc::SIGKILL) };
    if rc != 0 {
        error!(
            "Failed to kill process: {}",
            std::io::Error::last_os_error()
        );
        std::process::abort();
    }
}

#[cfg(not(unix))]
pub fn kill_process() {
    error!("Killing process");
    std::process::abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::Instant;

    #[test]
    fn test_rejects_zero_width_range() {
        let result = Killer::new(DurationRange::ZERO, Box::new(|| {}));
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_kills_within_range() {
        let (tx, rx) = oneshot::channel();
        let killer = Killer::new(
            DurationRange {
                min: Duration::from_millis(1),
                max: Duration::from_millis(5),
            },
            Box::new(move || {
                let _ = tx.send(Instant::now());
            }),
        )
        .unwrap();

        let started = Instant::now();
        let _handle = killer.start();
        let killed_at = rx.await.unwrap();

        let elapsed = killed_at - started;
        assert!(elapsed >= Duration::from_millis(1), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(5), "{elapsed:?}");
    }
}
