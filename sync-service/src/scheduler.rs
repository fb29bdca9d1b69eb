//! Round-robin sync scheduler.
//!
//! Each tick picks one connection among those holding selections and
//! refreshes all of its selections sequentially through a single session.
//! At most one tick does sync work at a time; a tick that finds the previous
//! one still running is skipped.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

use common::errors::AppResult;
use common::models::{Selection, SelectionGroup, SNAPSHOT_LIMIT};

use crate::drivers::{SessionProvider, SourceSession};
use crate::store::SelectionStore;

/// What the scheduler is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Starting,
    Connecting(String),
    Running { connection: String, detail: String },
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => f.write_str("Idle"),
            SyncStatus::Starting => f.write_str("Starting sync cycle"),
            SyncStatus::Connecting(connection) => write!(f, "Connecting to {connection}"),
            SyncStatus::Running { connection, detail } => write!(f, "{connection}: {detail}"),
        }
    }
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The previous tick was still in flight.
    Skipped,
    /// No connection has selections.
    Idle,
    Processed {
        connection: String,
        succeeded: usize,
        failed: usize,
    },
    /// A connection-level error ended the pass early.
    Aborted { connection: String, error: String },
    /// The selection store could not be read.
    Failed { error: String },
}

pub struct SyncScheduler {
    store: SelectionStore,
    sessions: Arc<dyn SessionProvider>,
    snapshot_limit: usize,
    cursor: AtomicUsize,
    in_flight: Mutex<()>,
    status: watch::Sender<SyncStatus>,
}

impl SyncScheduler {
    pub fn new(store: SelectionStore, sessions: Arc<dyn SessionProvider>) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            store,
            sessions,
            snapshot_limit: SNAPSHOT_LIMIT,
            cursor: AtomicUsize::new(0),
            in_flight: Mutex::new(()),
            status,
        }
    }

    /// Latest published status.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    fn publish(&self, status: SyncStatus) {
        tracing::trace!(status = %status, "sync status");
        self.status.send_replace(status);
    }

    /// Runs one scheduling round.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("previous sync pass still running; tick skipped");
            return TickOutcome::Skipped;
        };

        let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.publish(SyncStatus::Starting);
        let outcome = self.pass(turn).await;
        self.publish(SyncStatus::Idle);

        match &outcome {
            TickOutcome::Processed {
                connection,
                succeeded,
                failed,
            } => tracing::info!(connection = %connection, succeeded, failed, "sync pass finished"),
            TickOutcome::Aborted { connection, error } => {
                tracing::warn!(connection = %connection, error = %error, "sync pass aborted")
            }
            TickOutcome::Failed { error } => {
                tracing::error!(error = %error, "sync pass could not start")
            }
            TickOutcome::Idle | TickOutcome::Skipped => {}
        }
        outcome
    }

    async fn pass(&self, turn: usize) -> TickOutcome {
        let groups = match self.store.list_grouped().await {
            Ok(groups) => groups,
            Err(e) => return TickOutcome::Failed { error: e.to_string() },
        };
        if groups.is_empty() {
            return TickOutcome::Idle;
        }
        let group = &groups[turn % groups.len()];
        self.sync_group(group).await
    }

    async fn sync_group(&self, group: &SelectionGroup) -> TickOutcome {
        let connection = &group.connection_name;
        self.publish(SyncStatus::Connecting(connection.clone()));

        let mut session = match self.sessions.open_session(connection).await {
            Ok(session) => session,
            Err(e) => {
                return TickOutcome::Aborted {
                    connection: connection.clone(),
                    error: e.to_string(),
                }
            }
        };

        let mut succeeded = 0;
        let mut failed = 0;
        let mut abort = None;
        for selection in &group.selections {
            self.publish(SyncStatus::Running {
                connection: connection.clone(),
                detail: session.describe_fetch(
                    &selection.table_name,
                    &selection.column_name,
                    self.snapshot_limit,
                ),
            });

            match fetch_and_store(session.as_mut(), &self.store, selection, self.snapshot_limit)
                .await
            {
                Ok(count) => {
                    succeeded += 1;
                    tracing::debug!(
                        connection = %connection,
                        selection_id = selection.id,
                        table = %selection.table_name,
                        column = %selection.column_name,
                        values = count,
                        "snapshot refreshed"
                    );
                }
                Err(e) if e.is_connection_level() => {
                    abort = Some(e);
                    break;
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        connection = %connection,
                        selection_id = selection.id,
                        table = %selection.table_name,
                        column = %selection.column_name,
                        error = %e,
                        "selection sync failed; previous snapshot kept"
                    );
                }
            }
        }

        if let Err(e) = session.close().await {
            tracing::warn!(connection = %connection, error = %e, "failed to close session");
        }

        match abort {
            Some(e) => TickOutcome::Aborted {
                connection: connection.clone(),
                error: e.to_string(),
            },
            None => TickOutcome::Processed {
                connection: connection.clone(),
                succeeded,
                failed,
            },
        }
    }

    /// Ticks every `period` until `shutdown` turns true or its sender drops.
    ///
    /// Returns only after a tick already in flight has finished.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(period_ms = period.as_millis() as u64, "sync scheduler started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let scheduler = Arc::clone(&self);
                    tokio::spawn(async move {
                        scheduler.tick().await;
                    });
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        let _idle = self.in_flight.lock().await;
        tracing::info!("sync scheduler stopped");
    }
}

/// Fetches one selection's column and overwrites its snapshot.
///
/// Returns the number of values stored.
pub async fn fetch_and_store(
    session: &mut dyn SourceSession,
    store: &SelectionStore,
    selection: &Selection,
    limit: usize,
) -> AppResult<usize> {
    let values = session
        .fetch_column_values(&selection.table_name, &selection.column_name, limit)
        .await?;
    store.update_snapshot(selection.id, &values, Utc::now()).await?;
    Ok(values.len().min(SNAPSHOT_LIMIT))
}
