//! Scheduler scenarios over a real in-memory store and a scripted
//! transport registered in place of HTTP.
//!
//! - `triggers.rs`   - instant, bulk size, timer, background, flush
//! - `failures.rs`   - failed sends keep rows, cancellation, sender lock
//! - `sequencing.rs` - sequence ids stamped before storage

mod failures;
mod sequencing;
mod triggers;

use crate::{BatchScheduler, SchedulerBuilder, SchedulerConfig};
use async_trait::async_trait;
use component_registry::{ComponentRegistry, DataFetcher, FnLoaderFactory, LoadData, ModelLoader};
use event_database::{DatabaseModule, EventDatabaseLoader, EventStore, RegistryFormatter};
use event_marshaller::JsonMarshallerModule;
use event_model::{EventResponse, EventUrl};
use event_sender::EventHttpSender;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Transport answering from a script and recording every request.
///
/// Once the script is used up every send gets the fallback outcome.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    outcomes: Mutex<VecDeque<bool>>,
    fallback_failure: bool,
    delay: Mutex<Duration>,
    requests: Mutex<Vec<EventUrl>>,
}

impl ScriptedTransport {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fallback_failure: true,
            ..Default::default()
        })
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = bool>) {
        self.outcomes.lock().extend(outcomes);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn requests(&self) -> Vec<EventUrl> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_outcome(&self) -> bool {
        self.outcomes
            .lock()
            .pop_front()
            .unwrap_or(!self.fallback_failure)
    }
}

struct ScriptedFetcher {
    transport: Arc<ScriptedTransport>,
    request: Option<EventUrl>,
}

#[async_trait]
impl DataFetcher<EventResponse> for ScriptedFetcher {
    async fn execute_data(&mut self) -> EventResponse {
        let Some(request) = self.request.take() else {
            return EventResponse::failed(None);
        };
        let bytes = request.body.len() as u64;
        self.transport.requests.lock().push(request);

        let delay = *self.transport.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.transport.next_outcome() {
            EventResponse {
                succeeded: true,
                status: Some(200),
                used_bytes: bytes,
            }
        } else {
            EventResponse::failed(Some(503))
        }
    }
}

struct ScriptedLoader(Arc<ScriptedTransport>);

impl ModelLoader<EventUrl, EventResponse> for ScriptedLoader {
    fn build_load_data(&self, model: EventUrl) -> LoadData<EventResponse> {
        LoadData::new(ScriptedFetcher {
            transport: self.0.clone(),
            request: Some(model),
        })
    }
}

pub(crate) struct Harness {
    pub store: EventStore,
    pub transport: Arc<ScriptedTransport>,
    pub registry: Arc<ComponentRegistry>,
}

impl Harness {
    pub async fn new(transport: Arc<ScriptedTransport>) -> Self {
        let store = EventStore::open_in_memory().await.unwrap();
        let registry = Arc::new(ComponentRegistry::new());
        registry.install(&JsonMarshallerModule);
        let formatter = Arc::new(RegistryFormatter::new(&registry));
        registry.install(&DatabaseModule::new(EventDatabaseLoader::new(
            store.clone(),
            formatter,
        )));

        let loader: Arc<dyn ModelLoader<EventUrl, EventResponse>> =
            Arc::new(ScriptedLoader(transport.clone()));
        registry.register::<EventUrl, EventResponse, _>(FnLoaderFactory::new(loader));

        Self {
            store,
            transport,
            registry,
        }
    }

    pub fn builder(&self, config: SchedulerConfig) -> SchedulerBuilder {
        let sender = EventHttpSender::new(self.registry.clone(), "http://collector.test", "proj");
        BatchScheduler::builder(config, self.registry.clone(), sender)
    }

    pub fn start(&self, config: SchedulerConfig) -> BatchScheduler {
        self.builder(config).start()
    }
}

/// Long timer so only explicit triggers send.
pub(crate) fn manual_config() -> SchedulerConfig {
    SchedulerConfig {
        upload_interval: Some(Duration::from_secs(3600)),
        ..Default::default()
    }
}

/// Poll `check` until it holds or five seconds pass.
pub(crate) async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
