//! Live aggregation for the session under observation.
//!
//! A single task owns the result set. Commands, feed deliveries and bulk-load
//! completions are all messages into that task, so each one is applied whole
//! before the next is looked at. Bulk loads run on their own tasks and are
//! tagged with a sequence number; a completion that is not the newest one,
//! or that belongs to a session no longer active, is dropped.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::common::SessionId;
use crate::domains::aggregation::{AggregateView, LiveSnapshot, ResultSet, RECENT_LIMIT};
use crate::domains::results::TossResult;
use crate::kernel::{BaseExperimentStore, FeedEvent, ResultSubscription};

const LOAD_FAILED_MESSAGE: &str = "Could not load results. Please try again.";

#[derive(Debug)]
enum Command {
    Activate(Option<SessionId>),
    Reload,
}

struct LoadOutcome {
    seq: u64,
    session_id: SessionId,
    rows: Result<Vec<TossResult>>,
}

enum Step {
    Command(Option<Command>),
    Feed(Option<FeedEvent>),
    Loaded(LoadOutcome),
}

/// Client handle. Dropping it (or calling `shutdown`) stops the task and
/// releases the feed subscription.
pub struct AggregationPipeline {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<LiveSnapshot>,
    task: JoinHandle<()>,
}

impl AggregationPipeline {
    pub fn spawn(store: Arc<dyn BaseExperimentStore>) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(LiveSnapshot::idle());
        let (load_tx, load_rx) = mpsc::unbounded_channel();

        let worker = Worker {
            store,
            set: ResultSet::new(None),
            subscription: None,
            load_seq: 0,
            load_task: None,
            load_tx,
            loading: false,
            load_error: None,
            snapshots: snapshot_tx,
        };
        let task = tokio::spawn(worker.run(command_rx, load_rx));

        Self {
            commands,
            snapshots,
            task,
        }
    }

    /// Observe `session_id` instead of the current session, or nothing.
    pub fn activate(&self, session_id: Option<SessionId>) {
        let _ = self.commands.send(Command::Activate(session_id));
    }

    /// Bulk-load the active session again.
    pub fn reload(&self) {
        let _ = self.commands.send(Command::Reload);
    }

    pub fn current(&self) -> LiveSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LiveSnapshot> {
        self.snapshots.clone()
    }

    /// Stop the task and wait until it released its subscription.
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        let _ = task.await;
    }
}

struct Worker {
    store: Arc<dyn BaseExperimentStore>,
    set: ResultSet,
    subscription: Option<ResultSubscription>,
    load_seq: u64,
    load_task: Option<JoinHandle<()>>,
    load_tx: mpsc::UnboundedSender<LoadOutcome>,
    loading: bool,
    load_error: Option<String>,
    snapshots: watch::Sender<LiveSnapshot>,
}

impl Worker {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut loads: mpsc::UnboundedReceiver<LoadOutcome>,
    ) {
        loop {
            let step = tokio::select! {
                command = commands.recv() => Step::Command(command),
                event = next_event(&mut self.subscription) => Step::Feed(event),
                Some(outcome) = loads.recv() => Step::Loaded(outcome),
            };

            match step {
                Step::Command(None) => break,
                Step::Command(Some(Command::Activate(session_id))) => {
                    self.activate(session_id).await
                }
                Step::Command(Some(Command::Reload)) => self.reload().await,
                Step::Feed(event) => self.on_feed(event),
                Step::Loaded(outcome) => self.on_loaded(outcome),
            }
        }

        self.stop_observing().await;
        debug!("Aggregation pipeline stopped");
    }

    async fn activate(&mut self, session_id: Option<SessionId>) {
        self.stop_observing().await;
        self.set = ResultSet::new(session_id);
        self.load_error = None;

        if let Some(id) = session_id {
            info!(session_id = %id, "Observing session");
            // subscribe before loading so nothing inserted meanwhile is missed
            self.subscribe(id).await;
            self.start_load(id);
        }
        self.publish();
    }

    async fn reload(&mut self) {
        let Some(id) = self.set.session_id() else {
            return;
        };
        if self.subscription.is_none() {
            self.subscribe(id).await;
        }
        self.start_load(id);
        self.publish();
    }

    async fn subscribe(&mut self, session_id: SessionId) {
        match self.store.subscribe_to_new_results(session_id).await {
            Ok(subscription) => self.subscription = Some(subscription),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Result feed unavailable");
            }
        }
    }

    fn start_load(&mut self, session_id: SessionId) {
        if let Some(previous) = self.load_task.take() {
            previous.abort();
        }
        self.load_seq += 1;
        self.loading = true;

        let seq = self.load_seq;
        let store = self.store.clone();
        let tx = self.load_tx.clone();
        self.load_task = Some(tokio::spawn(async move {
            let rows = store.list_results(session_id).await;
            let _ = tx.send(LoadOutcome {
                seq,
                session_id,
                rows,
            });
        }));
    }

    fn on_feed(&mut self, event: Option<FeedEvent>) {
        match event {
            Some(FeedEvent::ResultInserted { result }) => {
                let result_id = result.id;
                if self.set.apply_inserted(result) {
                    debug!(result_id = %result_id, "Applied result from feed");
                    self.publish();
                }
            }
            Some(FeedEvent::Resync) => {
                if let Some(id) = self.set.session_id() {
                    debug!(session_id = %id, "Feed asked for resync");
                    self.start_load(id);
                    self.publish();
                }
            }
            None => {
                warn!("Result feed closed");
                self.subscription = None;
                self.publish();
            }
        }
    }

    fn on_loaded(&mut self, outcome: LoadOutcome) {
        if outcome.seq != self.load_seq || Some(outcome.session_id) != self.set.session_id() {
            debug!(session_id = %outcome.session_id, seq = outcome.seq, "Discarding stale load");
            return;
        }
        self.loading = false;
        self.load_task = None;

        match outcome.rows {
            Ok(rows) => {
                let added = self.set.merge_bulk(rows);
                self.load_error = None;
                debug!(session_id = %outcome.session_id, added, total = self.set.len(), "Bulk load merged");
            }
            Err(e) => {
                warn!(session_id = %outcome.session_id, error = %e, "Bulk load failed");
                self.load_error = Some(LOAD_FAILED_MESSAGE.to_string());
            }
        }
        self.publish();
    }

    async fn stop_observing(&mut self) {
        if let Some(task) = self.load_task.take() {
            task.abort();
        }
        self.loading = false;
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe().await;
        }
    }

    fn publish(&self) {
        let snapshot = LiveSnapshot {
            aggregate: AggregateView::from_set(&self.set),
            recent: self.set.results().iter().take(RECENT_LIMIT).cloned().collect(),
            realtime: self.subscription.is_some(),
            loading: self.loading,
            load_error: self.load_error.clone(),
        };
        self.snapshots.send_replace(snapshot);
    }
}

async fn next_event(subscription: &mut Option<ResultSubscription>) -> Option<FeedEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
