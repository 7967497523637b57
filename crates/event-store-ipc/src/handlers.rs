//! Store methods served over IPC.

use crate::protocol::{BatchParams, DeleteParams, InsertParams, WireDbResult};
use crate::{error_codes, IpcServer, Method, Request, Response};
use async_trait::async_trait;
use component_registry::ComponentRegistry;
use event_model::{Event, EventDatabase, EventDbResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Takes events inserted over IPC into a running pipeline.
///
/// With an intake installed, `events.insert` gets sequence ids and send
/// triggers like a local `track`; the row is stored before `ingest`
/// returns.
#[async_trait]
pub trait EventIntake: Send + Sync {
    /// `None` when the pipeline no longer accepts events.
    async fn ingest(&self, event: Event) -> Option<EventDbResult>;
}

/// Runs storage operations for IPC clients through the registry's storage
/// stage, one at a time.
pub struct StoreService {
    registry: Arc<ComponentRegistry>,
    intake: Option<Arc<dyn EventIntake>>,
    gate: Mutex<()>,
}

impl StoreService {
    /// Store-only service: inserts are written as received.
    pub fn new(registry: Arc<ComponentRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            intake: None,
            gate: Mutex::new(()),
        })
    }

    /// Service whose inserts go through `intake`.
    pub fn with_intake(
        registry: Arc<ComponentRegistry>,
        intake: Arc<dyn EventIntake>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            intake: Some(intake),
            gate: Mutex::new(()),
        })
    }

    /// `None` when no storage component is registered.
    pub async fn execute(&self, model: EventDatabase) -> Option<EventDbResult> {
        let loader = self.registry.resolve::<EventDatabase, EventDbResult>()?;
        let _guard = self.gate.lock().await;
        debug!(op = model.name(), "IPC storage operation");
        Some(loader.build_load_data(model).execute().await)
    }

    pub fn has_storage(&self) -> bool {
        self.registry.contains::<EventDatabase, EventDbResult>()
    }

    async fn handle(&self, request: Request) -> Response {
        let model = match model_for(&request) {
            Ok(model) => model,
            Err(e) => {
                warn!(method = ?request.method, error = %e, "Invalid IPC params");
                return Response::error(
                    &request.id,
                    error_codes::INVALID_PARAMS,
                    &format!("Invalid params: {}", e),
                );
            }
        };

        let result = match (model, &self.intake) {
            (EventDatabase::Insert(event), Some(intake)) => {
                debug!(event_type = %event.event_type, "IPC insert through the pipeline");
                intake.ingest(event).await
            }
            (model, _) => self.execute(model).await,
        };

        match result {
            Some(result) => match serde_json::to_value(WireDbResult::from(&result)) {
                Ok(value) => Response::success(&request.id, value),
                Err(e) => Response::error(
                    &request.id,
                    error_codes::INTERNAL_ERROR,
                    &format!("Failed to encode result: {}", e),
                ),
            },
            None => Response::error(
                &request.id,
                error_codes::STORE_UNAVAILABLE,
                "Event store unavailable",
            ),
        }
    }
}

fn model_for(request: &Request) -> Result<EventDatabase, serde_json::Error> {
    Ok(match request.method {
        Method::EventsInsert => {
            let params: InsertParams = request.parse_params()?;
            EventDatabase::insert(params.event)
        }
        Method::EventsQuery => {
            let params: BatchParams = request.parse_params()?;
            EventDatabase::query(params.policy, params.limit)
        }
        Method::EventsQueryAndDelete => {
            let params: BatchParams = request.parse_params()?;
            EventDatabase::query_and_delete(params.policy, params.limit)
        }
        Method::EventsDelete => {
            let params: DeleteParams = request.parse_params()?;
            EventDatabase::delete(params.last_id, params.policy, params.category)
        }
        Method::EventsRemoveOverdue => EventDatabase::outdated(),
        Method::EventsClear => EventDatabase::clear(),
        Method::Health => {
            return Err(serde::de::Error::custom(
                "health is not a storage operation",
            ))
        }
    })
}

/// Register `health` and every `events.*` method on `server`.
pub async fn register_store_handlers(server: &IpcServer, service: Arc<StoreService>) {
    let health = service.clone();
    server
        .register_handler(Method::Health, move |req| {
            let service = health.clone();
            async move {
                Response::success(
                    &req.id,
                    serde_json::json!({
                        "status": "ok",
                        "version": env!("CARGO_PKG_VERSION"),
                        "storage": service.has_storage(),
                    }),
                )
            }
        })
        .await;

    for method in Method::ALL.into_iter().filter(|m| *m != Method::Health) {
        let service = service.clone();
        server
            .register_handler(method, move |req| {
                let service = service.clone();
                async move { service.handle(req).await }
            })
            .await;
    }
}
