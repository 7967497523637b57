//! Loader contracts for pipeline stages.

use async_trait::async_trait;
use std::sync::Arc;

/// Produces one `D` for one model.
///
/// A fetch in flight is cancelled by dropping its future. `cancel` is for
/// a fetch that has been built but not run: a cancelled fetcher must not
/// write anything when `execute_data` is called afterwards.
#[async_trait]
pub trait DataFetcher<D>: Send {
    async fn execute_data(&mut self) -> D;

    fn cancel(&self) {}

    fn cleanup(&mut self) {}
}

/// A fetcher ready to run.
pub struct LoadData<D> {
    pub fetcher: Box<dyn DataFetcher<D>>,
}

impl<D> LoadData<D> {
    pub fn new(fetcher: impl DataFetcher<D> + 'static) -> Self {
        Self {
            fetcher: Box::new(fetcher),
        }
    }

    /// Run the fetcher to completion and release it.
    pub async fn execute(mut self) -> D {
        let data = self.fetcher.execute_data().await;
        self.fetcher.cleanup();
        data
    }
}

/// Turns a model into a runnable fetch.
pub trait ModelLoader<M, D>: Send + Sync {
    fn build_load_data(&self, model: M) -> LoadData<D>;
}

/// Builds loaders for one `(M, D)` pair.
pub trait ModelLoaderFactory<M, D>: Send + Sync {
    fn build(&self) -> Arc<dyn ModelLoader<M, D>>;
}

/// Factory returning a fixed loader instance.
pub struct FnLoaderFactory<M, D> {
    loader: Arc<dyn ModelLoader<M, D>>,
}

impl<M, D> FnLoaderFactory<M, D> {
    pub fn new(loader: Arc<dyn ModelLoader<M, D>>) -> Self {
        Self { loader }
    }
}

impl<M, D> ModelLoaderFactory<M, D> for FnLoaderFactory<M, D>
where
    M: 'static,
    D: 'static,
{
    fn build(&self) -> Arc<dyn ModelLoader<M, D>> {
        self.loader.clone()
    }
}

/// A bundle of registrations supplied by an optional crate.
pub trait ComponentModule: Send + Sync {
    fn register_components(&self, registry: &crate::ComponentRegistry);
}
