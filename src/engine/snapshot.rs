//! # Materialized Snapshot
//!
//! A dense copy of an array's values in position order, rebuilt in the
//! background after mutations.
//!
//! Every rebuild draws a ticket. A finished rebuild only installs if its
//! ticket is newer than the installed one, so overlapping rebuilds always
//! converge on the most recently requested state.
//!
//! Two read modes:
//! - cached: whatever was installed last (may lag the latest mutation)
//! - forced: build now, install, return

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::position::entry_key;
use crate::core::{ArrayResult, Element};
use crate::ports::Table;

struct Installed<T> {
    ticket: u64,
    values: Arc<Vec<T>>,
}

/// Holder for the latest installed snapshot
pub(crate) struct SnapshotCell<T> {
    installed: RwLock<Installed<T>>,
    issued: AtomicU64,
    completed: watch::Sender<u64>,
}

impl<T> SnapshotCell<T> {
    pub fn new() -> Self {
        let (completed, _) = watch::channel(0);
        Self {
            installed: RwLock::new(Installed {
                ticket: 0,
                values: Arc::new(Vec::new()),
            }),
            issued: AtomicU64::new(0),
            completed,
        }
    }

    /// Draw the next ticket
    pub fn issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Most recently issued ticket
    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Acquire)
    }

    /// The cached snapshot
    pub fn current(&self) -> Arc<Vec<T>> {
        self.installed.read().values.clone()
    }

    /// Install `values` built for `ticket` unless something newer is already in.
    /// Returns the installed snapshot either way.
    pub fn install(&self, ticket: u64, values: Vec<T>) -> Arc<Vec<T>> {
        let mut installed = self.installed.write();
        let values = Arc::new(values);
        if ticket > installed.ticket {
            installed.ticket = ticket;
            installed.values = values.clone();
            tracing::trace!(ticket, len = values.len(), "snapshot.install");
        } else {
            tracing::trace!(ticket, current = installed.ticket, "snapshot.superseded");
        }
        values
    }

    /// Mark `ticket` as done, successful or not
    pub fn finish(&self, ticket: u64) {
        self.completed.send_if_modified(|done| {
            if ticket > *done {
                *done = ticket;
                true
            } else {
                false
            }
        });
    }

    /// Wait until a rebuild with ticket `>= ticket` has finished
    pub async fn wait_for(&self, ticket: u64) {
        let mut done = self.completed.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = done.wait_for(|done| *done >= ticket).await;
    }
}

/// Handle to one snapshot rebuild.
///
/// Dropping it leaves the rebuild running in the background.
#[derive(Debug)]
pub struct Refresh {
    ticket: u64,
    handle: Option<JoinHandle<ArrayResult<()>>>,
}

impl Refresh {
    pub(crate) fn spawned(ticket: u64, handle: JoinHandle<ArrayResult<()>>) -> Self {
        Self {
            ticket,
            handle: Some(handle),
        }
    }

    /// A refresh that never ran (no runtime to run it on)
    pub(crate) fn skipped(ticket: u64) -> Self {
        Self {
            ticket,
            handle: None,
        }
    }

    /// This rebuild's ticket; later refreshes have larger tickets
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Check if the rebuild has finished
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the rebuild and surface its error, if any
    pub async fn settled(self) -> ArrayResult<()> {
        match self.handle {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }
}

/// Resolve `positions` in order into a dense vector.
///
/// Positions without a backing entry are skipped with a warning.
pub(crate) async fn materialize<T: Element>(
    table: &dyn Table,
    positions: &[usize],
) -> ArrayResult<Vec<T>> {
    let mut values = Vec::with_capacity(positions.len());
    for &position in positions {
        match table.get(&entry_key(position)).await? {
            Some(raw) => values.push(serde_json::from_value(raw)?),
            None => tracing::warn!(position, "snapshot.missing_entry"),
        }
    }
    Ok(values)
}
