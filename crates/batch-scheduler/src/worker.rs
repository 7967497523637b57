//! The single worker that owns every store mutation and send.

use crate::{FlushReport, PolicyState, SchedulerConfig, SharedState};
use component_registry::ComponentRegistry;
use event_model::{Event, EventDatabase, EventDbResult, SendPolicy};
use event_sender::EventHttpSender;
use event_sequencer::{ProcessLock, SequenceGenerator};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

pub(crate) enum Command {
    /// Store, then trigger sends; the reply, if any, gets the insert result.
    Track(Event, Option<oneshot::Sender<EventDbResult>>),
    AppBackground,
    Flush(oneshot::Sender<FlushReport>),
    Clear(oneshot::Sender<EventDbResult>),
    RemoveOverdue(oneshot::Sender<EventDbResult>),
    Sync(oneshot::Sender<()>),
}

pub(crate) struct Worker {
    pub config: SchedulerConfig,
    pub registry: Arc<ComponentRegistry>,
    pub sender: EventHttpSender,
    pub sequencer: Option<Arc<SequenceGenerator>>,
    pub process_lock: Option<ProcessLock>,
    pub state: Arc<SharedState>,
    pub shutdown: watch::Receiver<bool>,
    pub cached_batch_events: usize,
    pub ticker: Option<Interval>,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl Worker {
    pub fn ticker(config: &SchedulerConfig) -> Option<Interval> {
        config.upload_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        })
    }

    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!(
            interval_secs = self.config.upload_interval.map(|d| d.as_secs()),
            bulk_size = self.config.events_bulk_size,
            "Batch scheduler started"
        );
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = next_tick(&mut self.ticker) => {
                    debug!("upload timer fired");
                    self.send_batched().await;
                }
            }
        }

        // Events already accepted are stored; nothing more is sent.
        commands.close();
        let mut stored = 0usize;
        while let Ok(command) = commands.try_recv() {
            if let Command::Track(event, reply) = command {
                let event = self.assign_sequence_id(event).await;
                let result = self.storage(EventDatabase::insert(event)).await;
                if result.is_success() {
                    stored += 1;
                }
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
        }
        info!(stored, "Batch scheduler stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Track(event, reply) => self.track(event, reply).await,
            Command::AppBackground => {
                debug!("app entered background");
                self.send_batched().await;
            }
            Command::Flush(reply) => {
                let report = self.send_pass(&SendPolicy::ALL).await;
                self.cached_batch_events = 0;
                let _ = reply.send(report);
            }
            Command::Clear(reply) => {
                let result = self.storage(EventDatabase::clear()).await;
                if result.is_success() {
                    self.cached_batch_events = 0;
                    for policy in SendPolicy::ALL {
                        self.state.set_policy(policy, PolicyState::Idle);
                    }
                }
                let _ = reply.send(result);
            }
            Command::RemoveOverdue(reply) => {
                let _ = reply.send(self.storage(EventDatabase::outdated()).await);
            }
            Command::Sync(reply) => {
                let _ = reply.send(());
            }
        }
    }

    async fn track(&mut self, event: Event, reply: Option<oneshot::Sender<EventDbResult>>) {
        let policy = event.send_policy;
        let event = self.assign_sequence_id(event).await;
        let inserted = self.storage(EventDatabase::insert(event)).await;
        let stored = inserted.is_success();
        if let Some(reply) = reply {
            let _ = reply.send(inserted);
        }
        if !stored {
            return;
        }
        self.state.set_policy(policy, PolicyState::Accumulating);

        match policy {
            SendPolicy::Instant => {
                self.send_pass(&[SendPolicy::Instant]).await;
            }
            SendPolicy::Batch => {
                self.cached_batch_events += 1;
                if self.config.upload_interval.is_none()
                    || self.cached_batch_events >= self.config.events_bulk_size
                {
                    self.send_batched().await;
                }
            }
        }
    }

    /// Send every policy and re-arm the timer.
    async fn send_batched(&mut self) {
        self.send_pass(&SendPolicy::ALL).await;
        self.cached_batch_events = 0;
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.reset();
        }
    }

    async fn assign_sequence_id(&self, event: Event) -> Event {
        let Some(sequencer) = self.sequencer.clone() else {
            return event;
        };
        let event_type = event.event_type.clone();
        match tokio::task::spawn_blocking(move || sequencer.get_and_increment(&event_type)).await
        {
            Ok(Ok(id)) => event.with_sequence_id(id),
            Ok(Err(e)) => {
                warn!(event_type = %event.event_type, error = %e, "sequence id not assigned");
                event
            }
            Err(e) => {
                warn!(error = %e, "sequencer task failed");
                event
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Only the process holding the sender lock sends.
    fn may_send(&mut self) -> bool {
        let Some(lock) = self.process_lock.as_mut() else {
            return true;
        };
        if lock.is_acquired() {
            return true;
        }
        match lock.retry() {
            Ok(true) => true,
            Ok(false) => {
                debug!("another process is the sender");
                false
            }
            Err(e) => {
                warn!(error = %e, "sender lock check failed");
                false
            }
        }
    }

    async fn storage(&self, operation: EventDatabase) -> EventDbResult {
        let Some(loader) = self.registry.resolve::<EventDatabase, EventDbResult>() else {
            warn!(operation = operation.name(), "no storage registered");
            return EventDbResult::failed();
        };
        loader.build_load_data(operation).execute().await
    }

    async fn send_pass(&mut self, policies: &[SendPolicy]) -> FlushReport {
        let mut report = FlushReport::default();
        if self.is_cancelled() || !self.may_send() {
            return report;
        }
        for &policy in policies {
            report.merge(self.drain_policy(policy).await);
            if self.is_cancelled() {
                break;
            }
        }
        if report.batches > 0 || report.failed {
            info!(
                batches = report.batches,
                rows = report.rows,
                failed = report.failed,
                "send pass finished"
            );
        }
        report
    }

    /// query, send, delete; repeated until the policy is empty or a step fails.
    async fn drain_policy(&mut self, policy: SendPolicy) -> FlushReport {
        self.state.set_policy(policy, PolicyState::Sending);
        let limit = self.config.events_per_request(self.state.low_memory());
        let mut report = FlushReport::default();
        let mut drained = false;

        while !self.is_cancelled() {
            let batch = self.storage(EventDatabase::query(policy, limit)).await;
            if !batch.is_success() {
                report.failed = true;
                break;
            }
            if batch.sum() == 0 {
                drained = true;
                break;
            }
            let Some(category) = batch.category else {
                report.failed = true;
                break;
            };

            let response = {
                let mut shutdown = self.shutdown.clone();
                tokio::select! {
                    response = self.sender.send_batch(&batch) => Some(response),
                    _ = shutdown.wait_for(|stop| *stop) => None,
                }
            };
            let Some(response) = response else {
                debug!(policy = %policy, "send cancelled");
                break;
            };
            if !response.succeeded {
                warn!(
                    policy = %policy,
                    rows = batch.sum(),
                    status = response.status,
                    "batch not delivered, rows kept"
                );
                report.failed = true;
                break;
            }
            if self.is_cancelled() {
                break;
            }

            let deleted = self
                .storage(EventDatabase::delete(batch.last_id, policy, category))
                .await;
            report.batches += 1;
            report.rows += deleted.sum();
            if !deleted.is_success() {
                report.failed = true;
                break;
            }
        }

        let next = if drained {
            PolicyState::Idle
        } else {
            PolicyState::Accumulating
        };
        self.state.set_policy(policy, next);
        report
    }
}
