//! IPC surface of the event store.
//!
//! The process that owns the store serves it on a Unix socket so other
//! processes of the same app can insert, query and delete events without
//! opening the database file. Storage calls coming in over the socket run
//! one at a time through the storage stage of the component registry;
//! inserts go through an [`EventIntake`] when the serving process runs the
//! pipeline, so they are sequenced and scheduled like local events.

mod error;
mod handlers;
pub mod protocol;
mod server;

#[cfg(test)]
mod tests;

pub use error::{IpcError, IpcResult};
pub use handlers::{register_store_handlers, EventIntake, StoreService};
pub use protocol::{error_codes, ErrorInfo, Method, Request, Response};
pub use server::{HandlerFn, IpcClient, IpcServer};
