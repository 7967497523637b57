//! Handle to the scheduler worker.

use crate::state::SharedState;
use crate::worker::{Command, Worker};
use crate::{FlushReport, PolicyState, SchedulerConfig, SchedulerError, SchedulerResult};
use component_registry::ComponentRegistry;
use event_model::{Event, EventDbResult, SendPolicy};
use event_sender::EventHttpSender;
use event_sequencer::{ProcessLock, SequenceGenerator};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// Configures and starts a [`BatchScheduler`].
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    registry: Arc<ComponentRegistry>,
    sender: EventHttpSender,
    sequencer: Option<Arc<SequenceGenerator>>,
    process_lock: Option<ProcessLock>,
}

impl SchedulerBuilder {
    /// Stamp events with cross-process sequence ids before storing them.
    pub fn sequencer(mut self, sequencer: Arc<SequenceGenerator>) -> Self {
        self.sequencer = Some(sequencer);
        self
    }

    /// Send only while this lock is held.
    pub fn process_lock(mut self, lock: ProcessLock) -> Self {
        self.process_lock = Some(lock);
        self
    }

    /// Spawn the worker on the current Tokio runtime.
    pub fn start(self) -> BatchScheduler {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let state = Arc::new(SharedState::default());

        let worker = Worker {
            ticker: Worker::ticker(&self.config),
            config: self.config,
            registry: self.registry,
            sender: self.sender,
            sequencer: self.sequencer,
            process_lock: self.process_lock,
            state: state.clone(),
            shutdown: shutdown_rx,
            cached_batch_events: 0,
        };
        let task = tokio::spawn(worker.run(receiver));

        BatchScheduler {
            commands,
            shutdown,
            state,
            task: Mutex::new(Some(task)),
        }
    }
}

/// Serializes every store mutation and send onto one worker task.
///
/// Producers enqueue and return immediately. Batched events are sent when
/// `events_bulk_size` of them are stored, when the upload timer fires, or
/// when the host goes to the background; instant events are sent right
/// after they are stored. A failed send keeps its rows for the next
/// trigger.
pub struct BatchScheduler {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: watch::Sender<bool>,
    state: Arc<SharedState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BatchScheduler {
    pub fn builder(
        config: SchedulerConfig,
        registry: Arc<ComponentRegistry>,
        sender: EventHttpSender,
    ) -> SchedulerBuilder {
        SchedulerBuilder {
            config,
            registry,
            sender,
            sequencer: None,
            process_lock: None,
        }
    }

    fn submit(&self, command: Command) -> SchedulerResult<()> {
        if *self.shutdown.borrow() {
            return Err(SchedulerError::Stopped);
        }
        self.commands
            .send(command)
            .map_err(|_| SchedulerError::Stopped)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> SchedulerResult<T> {
        let (reply, response) = oneshot::channel();
        self.submit(command(reply))?;
        response.await.map_err(|_| SchedulerError::Cancelled)
    }

    /// Queue an event for storage and delivery.
    pub fn track(&self, event: Event) -> SchedulerResult<()> {
        self.submit(Command::Track(event, None))
    }

    /// Queue an event and wait until it is stored.
    ///
    /// Resolves with the insert result as soon as the row is written; any
    /// send the event triggers runs afterwards.
    pub async fn track_stored(&self, event: Event) -> SchedulerResult<EventDbResult> {
        self.request(|reply| Command::Track(event, Some(reply))).await
    }

    /// The host moved to the background: send everything now.
    pub fn app_entered_background(&self) -> SchedulerResult<()> {
        self.submit(Command::AppBackground)
    }

    /// Run a full send pass after everything queued so far.
    pub async fn flush(&self) -> SchedulerResult<FlushReport> {
        self.request(Command::Flush).await
    }

    /// Delete every stored event.
    pub async fn clear(&self) -> SchedulerResult<EventDbResult> {
        self.request(Command::Clear).await
    }

    /// Run the retention sweep.
    pub async fn remove_overdue(&self) -> SchedulerResult<EventDbResult> {
        self.request(Command::RemoveOverdue).await
    }

    /// Wait until every command queued before this call has been handled.
    pub async fn sync(&self) -> SchedulerResult<()> {
        self.request(Command::Sync).await
    }

    /// Shrink requests while the host is short on memory.
    pub fn set_low_memory(&self, low_memory: bool) {
        debug!(low_memory, "low memory mode");
        self.state.set_low_memory(low_memory);
    }

    pub fn policy_state(&self, policy: SendPolicy) -> PolicyState {
        self.state.policy(policy)
    }

    pub fn is_running(&self) -> bool {
        !*self.shutdown.borrow() && !self.commands.is_closed()
    }

    /// Stop the worker.
    ///
    /// An in-flight send is abandoned and its rows stay stored. Events
    /// queued before this call are still stored but not sent.
    pub async fn shutdown(&self) -> SchedulerResult<()> {
        self.shutdown.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.await?;
        }
        Ok(())
    }
}

impl Drop for BatchScheduler {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}
