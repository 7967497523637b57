//! Typed registry of pluggable pipeline stages.
//!
//! Storage, formatting, transport and encoding are each looked up by a
//! `(model, data)` type pair instead of being wired in directly. A crate
//! providing an implementation registers a [`ModelLoaderFactory`] for its
//! pair, usually through a [`ComponentModule`]; consumers resolve the pair
//! and drive the returned [`ModelLoader`]. An unresolved pair means the
//! feature is not configured.

mod loader;
mod registry;

pub use loader::{
    ComponentModule, DataFetcher, FnLoaderFactory, LoadData, ModelLoader, ModelLoaderFactory,
};
pub use registry::{ComponentRegistry, ErasedLoader};
