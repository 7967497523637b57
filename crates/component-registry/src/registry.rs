//! The `(model, data)` keyed registry.

use crate::{ComponentModule, ModelLoader, ModelLoaderFactory};
use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

type ErasedBuild = Arc<dyn Fn() -> Arc<dyn Any + Send + Sync> + Send + Sync>;

struct Entry {
    model: TypeId,
    data: TypeId,
    model_name: &'static str,
    data_name: &'static str,
    build: ErasedBuild,
}

/// A loader resolved by model type alone; its data type is only known at
/// runtime.
#[derive(Clone)]
pub struct ErasedLoader {
    data: TypeId,
    data_name: &'static str,
    loader: Arc<dyn Any + Send + Sync>,
}

impl ErasedLoader {
    pub fn data_type_name(&self) -> &'static str {
        self.data_name
    }

    pub fn produces<D: 'static>(&self) -> bool {
        self.data == TypeId::of::<D>()
    }

    /// Recover the typed loader; `None` when `D` is not the data type.
    pub fn downcast<M: 'static, D: 'static>(&self) -> Option<Arc<dyn ModelLoader<M, D>>> {
        self.loader
            .downcast_ref::<Arc<dyn ModelLoader<M, D>>>()
            .cloned()
    }
}

/// Registry mapping `(model, data)` pairs to loader factories.
///
/// Registering a pair that already exists replaces it; resolution picks the
/// most recently registered match. Resolved loaders are cached per model
/// type (and data type, when given); every `register`/`unregister` clears
/// the cache.
#[derive(Default)]
pub struct ComponentRegistry {
    entries: RwLock<Vec<Entry>>,
    /// Bumped under the `entries` write lock on every change.
    generation: AtomicU64,
    cache: RwLock<HashMap<(TypeId, Option<TypeId>), ErasedLoader>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the factory for `(M, D)`.
    pub fn register<M, D, F>(&self, factory: F)
    where
        M: 'static,
        D: 'static,
        F: ModelLoaderFactory<M, D> + 'static,
    {
        let factory = Arc::new(factory);
        let build: ErasedBuild = Arc::new(move || {
            let loader: Arc<dyn ModelLoader<M, D>> = factory.build();
            Arc::new(loader) as Arc<dyn Any + Send + Sync>
        });

        let model = TypeId::of::<M>();
        let data = TypeId::of::<D>();
        {
            let mut entries = self.entries.write();
            entries.retain(|entry| !(entry.model == model && entry.data == data));
            entries.push(Entry {
                model,
                data,
                model_name: type_name::<M>(),
                data_name: type_name::<D>(),
                build,
            });
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        self.cache.write().clear();

        debug!(
            model = type_name::<M>(),
            data = type_name::<D>(),
            "component registered"
        );
    }

    /// Remove the factory for `(M, D)`. Returns whether one was present.
    pub fn unregister<M: 'static, D: 'static>(&self) -> bool {
        let model = TypeId::of::<M>();
        let data = TypeId::of::<D>();
        let removed = {
            let mut entries = self.entries.write();
            let before = entries.len();
            entries.retain(|entry| !(entry.model == model && entry.data == data));
            self.generation.fetch_add(1, Ordering::AcqRel);
            before != entries.len()
        };
        self.cache.write().clear();

        if removed {
            debug!(
                model = type_name::<M>(),
                data = type_name::<D>(),
                "component unregistered"
            );
        }
        removed
    }

    /// Install every registration of a component module.
    pub fn install(&self, module: &dyn ComponentModule) {
        module.register_components(self);
    }

    /// Resolve the loader for `(M, D)`.
    pub fn resolve<M: 'static, D: 'static>(&self) -> Option<Arc<dyn ModelLoader<M, D>>> {
        self.resolve_erased(TypeId::of::<M>(), Some(TypeId::of::<D>()))?
            .downcast::<M, D>()
    }

    /// Resolve the most recently registered loader for `M`, whatever it
    /// produces.
    pub fn resolve_for_model<M: 'static>(&self) -> Option<ErasedLoader> {
        self.resolve_erased(TypeId::of::<M>(), None)
    }

    pub fn contains<M: 'static, D: 'static>(&self) -> bool {
        let model = TypeId::of::<M>();
        let data = TypeId::of::<D>();
        self.entries
            .read()
            .iter()
            .any(|entry| entry.model == model && entry.data == data)
    }

    /// `(model, data)` type names in registration order.
    pub fn registered(&self) -> Vec<(&'static str, &'static str)> {
        self.entries
            .read()
            .iter()
            .map(|entry| (entry.model_name, entry.data_name))
            .collect()
    }

    fn resolve_erased(&self, model: TypeId, data: Option<TypeId>) -> Option<ErasedLoader> {
        let key = (model, data);
        if let Some(hit) = self.cache.read().get(&key) {
            return Some(hit.clone());
        }

        let (entry_data, data_name, build, generation) = {
            let entries = self.entries.read();
            let entry = entries.iter().rev().find(|entry| {
                entry.model == model && data.map_or(true, |data| entry.data == data)
            })?;
            (
                entry.data,
                entry.data_name,
                entry.build.clone(),
                self.generation.load(Ordering::Acquire),
            )
        };

        // Built outside the entries lock: factories may consult the registry.
        let resolved = ErasedLoader {
            data: entry_data,
            data_name,
            loader: build(),
        };

        // A registration during the build may have replaced this entry.
        let mut cache = self.cache.write();
        if self.generation.load(Ordering::Acquire) == generation {
            cache.insert(key, resolved.clone());
        }
        Some(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataFetcher, FnLoaderFactory, LoadData};
    use async_trait::async_trait;

    struct Greeting(&'static str);
    struct Text(String);
    struct Length(usize);

    struct PrefixLoader(&'static str);

    struct PrefixFetcher {
        prefix: &'static str,
        name: &'static str,
    }

    #[async_trait]
    impl DataFetcher<Text> for PrefixFetcher {
        async fn execute_data(&mut self) -> Text {
            Text(format!("{}{}", self.prefix, self.name))
        }
    }

    impl ModelLoader<Greeting, Text> for PrefixLoader {
        fn build_load_data(&self, model: Greeting) -> LoadData<Text> {
            LoadData::new(PrefixFetcher {
                prefix: self.0,
                name: model.0,
            })
        }
    }

    struct LengthLoader;

    struct LengthFetcher(usize);

    #[async_trait]
    impl DataFetcher<Length> for LengthFetcher {
        async fn execute_data(&mut self) -> Length {
            Length(self.0)
        }
    }

    impl ModelLoader<Greeting, Length> for LengthLoader {
        fn build_load_data(&self, model: Greeting) -> LoadData<Length> {
            LoadData::new(LengthFetcher(model.0.len()))
        }
    }

    fn prefix(p: &'static str) -> FnLoaderFactory<Greeting, Text> {
        FnLoaderFactory::new(Arc::new(PrefixLoader(p)))
    }

    #[tokio::test]
    async fn test_resolve_and_execute() {
        let registry = ComponentRegistry::new();
        registry.register::<Greeting, Text, _>(prefix("hello "));

        let loader = registry.resolve::<Greeting, Text>().unwrap();
        let Text(text) = loader.build_load_data(Greeting("ada")).execute().await;
        assert_eq!(text, "hello ada");
    }

    #[test]
    fn test_unresolved_pair_is_none() {
        let registry = ComponentRegistry::new();
        assert!(registry.resolve::<Greeting, Text>().is_none());
        assert!(registry.resolve_for_model::<Greeting>().is_none());

        registry.register::<Greeting, Text, _>(prefix("x"));
        assert!(registry.resolve::<Greeting, Length>().is_none());
    }

    #[tokio::test]
    async fn test_last_registration_wins_and_cache_is_invalidated() {
        let registry = ComponentRegistry::new();
        registry.register::<Greeting, Text, _>(prefix("first "));

        let first = registry.resolve::<Greeting, Text>().unwrap();
        let Text(text) = first.build_load_data(Greeting("a")).execute().await;
        assert_eq!(text, "first a");

        registry.register::<Greeting, Text, _>(prefix("second "));
        assert_eq!(registry.registered().len(), 1);

        let second = registry.resolve::<Greeting, Text>().unwrap();
        let Text(text) = second.build_load_data(Greeting("a")).execute().await;
        assert_eq!(text, "second a");
    }

    #[tokio::test]
    async fn test_resolve_for_model_picks_most_recent_pair() {
        let registry = ComponentRegistry::new();
        registry.register::<Greeting, Text, _>(prefix("hi "));
        registry.register::<Greeting, Length, _>(FnLoaderFactory::<Greeting, Length>::new(
            Arc::new(LengthLoader),
        ));

        let erased = registry.resolve_for_model::<Greeting>().unwrap();
        assert!(erased.produces::<Length>());
        assert!(erased.downcast::<Greeting, Text>().is_none());

        let loader = erased.downcast::<Greeting, Length>().unwrap();
        let Length(len) = loader.build_load_data(Greeting("four")).execute().await;
        assert_eq!(len, 4);

        // The typed lookup still reaches the older pair.
        assert!(registry.resolve::<Greeting, Text>().is_some());
    }

    #[test]
    fn test_unregister() {
        let registry = ComponentRegistry::new();
        registry.register::<Greeting, Text, _>(prefix("x"));
        assert!(registry.resolve::<Greeting, Text>().is_some());

        assert!(registry.unregister::<Greeting, Text>());
        assert!(!registry.contains::<Greeting, Text>());
        assert!(registry.resolve::<Greeting, Text>().is_none());
        assert!(!registry.unregister::<Greeting, Text>());
    }

    /// Registers a replacement for its own pair the first time it builds.
    struct ReplacingFactory {
        registry: Arc<ComponentRegistry>,
        replaced: std::sync::atomic::AtomicBool,
    }

    impl ModelLoaderFactory<Greeting, Text> for ReplacingFactory {
        fn build(&self) -> Arc<dyn ModelLoader<Greeting, Text>> {
            if !self.replaced.swap(true, Ordering::AcqRel) {
                self.registry
                    .register::<Greeting, Text, _>(prefix("replacement "));
            }
            Arc::new(PrefixLoader("stale "))
        }
    }

    #[tokio::test]
    async fn test_registration_during_build_is_not_shadowed_by_cache() {
        let registry = Arc::new(ComponentRegistry::new());
        registry.register::<Greeting, Text, _>(ReplacingFactory {
            registry: registry.clone(),
            replaced: std::sync::atomic::AtomicBool::new(false),
        });

        // resolved while the replacement lands
        let racing = registry.resolve::<Greeting, Text>().unwrap();
        let Text(text) = racing.build_load_data(Greeting("a")).execute().await;
        assert_eq!(text, "stale a");

        let loader = registry.resolve::<Greeting, Text>().unwrap();
        let Text(text) = loader.build_load_data(Greeting("a")).execute().await;
        assert_eq!(text, "replacement a");

        // the replacement is cached from here on
        let again = registry.resolve::<Greeting, Text>().unwrap();
        assert!(Arc::ptr_eq(&loader, &again));
    }

    struct GreetingModule;

    impl ComponentModule for GreetingModule {
        fn register_components(&self, registry: &ComponentRegistry) {
            registry.register::<Greeting, Text, _>(prefix("module "));
        }
    }

    #[test]
    fn test_install_module() {
        let registry = ComponentRegistry::new();
        registry.install(&GreetingModule);
        assert!(registry.contains::<Greeting, Text>());
    }
}
