// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

use super::Progress;

use std::fmt::Display;
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{spawn, JoinHandle};
use std::time::Duration;

use indicatif::HumanBytes;
use log::{info, warn};

/// One observation of a copy in flight
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub written: u64,
    pub compressed: u64,
    pub read: u64,
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "written={}, compressed={}, read={}",
            HumanBytes(self.written),
            HumanBytes(self.compressed),
            HumanBytes(self.read)
        )
    }
}

/// Periodically reports the counters of a copy from a background thread
///
/// Stopping (or dropping) the reporter emits one last report and waits for
/// the thread to finish, so the final counts are never lost.
pub struct Reporter {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Reporter {
    fn drop(&mut self) {
        self.halt();
    }
}

impl Reporter {
    pub const INTERVAL: Duration = Duration::from_secs(5);

    /// Logs progress every [`Reporter::INTERVAL`]
    pub fn start(progress: Progress, compressed: u64) -> Self {
        Self::spawn(progress, compressed, Self::INTERVAL, |report| {
            info!("Progress: {}", report)
        })
    }

    pub fn spawn<F>(progress: Progress, compressed: u64, interval: Duration, mut emit: F) -> Self
    where
        F: FnMut(Report) + Send + 'static,
    {
        let (tx, rx) = channel::<()>();
        let thread = spawn(move || loop {
            // Any outcome but a timeout means the owner asked us to stop.
            let last = !matches!(rx.recv_timeout(interval), Err(RecvTimeoutError::Timeout));

            emit(Report {
                written: progress.write_count(),
                compressed,
                read: progress.read_count(),
            });

            if last {
                break;
            }
        });

        Self {
            stop: Some(tx),
            thread: Some(thread),
        }
    }

    /// Emits the final report and waits for it
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("progress reporter panicked");
            }
        }
    }
}
