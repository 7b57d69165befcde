// Copyright (c) 2026 AccountabilityMe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Background anchor batch creation.
//!
//! Periodically sweeps the event log and commits every contiguous range of
//! unanchored events to pending Merkle batches. Publication to an external
//! witness is left to the operator; the scheduler only does the bookkeeping.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::anchor::{AnchorBatch, AnchorService};
use crate::error::LedgerResult;
use crate::store::EventStore;

pub const ANCHOR_BATCH_SIZE_ENV: &str = "ACCOUNTABLE_ANCHOR_BATCH_SIZE";
pub const ANCHOR_INTERVAL_ENV: &str = "ACCOUNTABLE_ANCHOR_INTERVAL_SECONDS";
pub const ANCHOR_ENABLED_ENV: &str = "ACCOUNTABLE_ANCHOR_ENABLED";
pub const ANCHOR_MIN_EVENTS_ENV: &str = "ACCOUNTABLE_ANCHOR_MIN_EVENTS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorConfig {
    pub batch_size: usize,
    pub interval: Duration,
    pub enabled: bool,
    /// Minimum number of unanchored events before a batch is created.
    pub min_events: usize,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            interval: Duration::from_secs(3600),
            enabled: false,
            min_events: 1,
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AnchorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let enabled = std::env::var(ANCHOR_ENABLED_ENV)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(defaults.enabled);
        Self {
            batch_size: env_usize(ANCHOR_BATCH_SIZE_ENV, defaults.batch_size),
            interval: Duration::from_secs(
                env_usize(ANCHOR_INTERVAL_ENV, defaults.interval.as_secs() as usize) as u64,
            ),
            enabled,
            min_events: env_usize(ANCHOR_MIN_EVENTS_ENV, defaults.min_events),
        }
    }
}

struct StopSignal {
    stopped: Mutex<bool>,
    condvar: Condvar,
}

pub struct AnchorScheduler {
    signal: Arc<StopSignal>,
    handle: Option<JoinHandle<()>>,
}

impl AnchorScheduler {
    /// Create pending batches for every unanchored range, up to the tail.
    pub fn run_once(
        store: &dyn EventStore,
        anchors: &AnchorService,
        config: &AnchorConfig,
    ) -> LedgerResult<Vec<AnchorBatch>> {
        let mut created = Vec::new();
        loop {
            let head = store.head()?;
            let Some(last) = head.last_sequence else {
                break;
            };
            let next = anchors
                .batches()
                .iter()
                .map(|b| b.end_sequence + 1)
                .max()
                .unwrap_or(0);
            if last + 1 < next + config.min_events as u64 {
                break;
            }
            match anchors.create_batch(store, config.batch_size)? {
                Some(batch) => created.push(batch),
                None => break,
            }
        }
        Ok(created)
    }

    /// Spawn the background sweep thread.
    pub fn start(
        store: Arc<dyn EventStore>,
        anchors: Arc<AnchorService>,
        config: AnchorConfig,
    ) -> Self {
        let signal = Arc::new(StopSignal {
            stopped: Mutex::new(false),
            condvar: Condvar::new(),
        });
        let thread_signal = Arc::clone(&signal);

        let handle = std::thread::spawn(move || loop {
            {
                let mut stopped = thread_signal.stopped.lock();
                if !*stopped {
                    let _ = thread_signal
                        .condvar
                        .wait_for(&mut stopped, config.interval);
                }
                if *stopped {
                    break;
                }
            }
            match Self::run_once(store.as_ref(), &anchors, &config) {
                Ok(batches) if !batches.is_empty() => {
                    tracing::info!(count = batches.len(), "anchor sweep created batches");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "anchor sweep failed; will retry");
                }
            }
        });

        Self {
            signal,
            handle: Some(handle),
        }
    }

    /// Stop the sweep thread and wait for it to exit.
    pub fn stop(mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.condvar.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AnchorScheduler {
    fn drop(&mut self) {
        *self.signal.stopped.lock() = true;
        self.signal.condvar.notify_all();
    }
}
