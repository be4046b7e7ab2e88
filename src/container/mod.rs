//! Dependency-injection container
//!
//! The container maps a service identifier to a factory and a scope. It is the
//! only way plugins receive shared infrastructure (configuration access,
//! logging sink, shared data stores); plugins never construct these directly.
//!
//! - [`Scope::Singleton`] services are built on first `resolve` and cached for
//!   the container's lifetime (at most one construction).
//! - [`Scope::PerActivation`] services are built fresh on every `resolve`.
//!
//! A factory receives a [`Resolution`] describing the call in progress: who
//! asked for the service (the plugin being activated, if any) and which
//! identifiers are already under construction on this call path. A factory
//! resolves its own dependencies through that context, so re-entrant
//! resolution of an identifier already being built fails fast with
//! [`HyperError::CircularService`] instead of recursing. The in-progress
//! chain belongs to the call, not the container, so unrelated resolutions
//! on other threads never see each other.
//!
//! ```rust
//! use hyper_cmd::container::{Container, Scope};
//!
//! let container = Container::new();
//! container
//!     .register("greeting", Scope::Singleton, |_| Ok(String::from("hello")))
//!     .unwrap();
//!
//! let greeting = container.resolve_as::<String>("greeting").unwrap();
//! assert_eq!(greeting.as_str(), "hello");
//! ```

pub mod services;

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HyperError, Result};

pub use services::{register_builtin_services, ConfigAccess, LogSink, SharedStore};

/// A constructed service, shared by reference count.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Deferred construction step for a service.
pub type ServiceFactory = Arc<dyn Fn(&Resolution<'_>) -> Result<ServiceInstance> + Send + Sync>;

/// Lifetime of a constructed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Constructed once, cached for the process lifetime.
    Singleton,
    /// Constructed fresh for every resolution.
    PerActivation,
}

struct ServiceEntry {
    scope: Scope,
    factory: Option<ServiceFactory>,
    instance: Option<ServiceInstance>,
}

/// Registry of service factories and cached singleton instances.
///
/// Shared behind an `Arc`; registration and resolution take `&self`.
/// Two threads racing on the first resolution of the same singleton may
/// both run its factory, but only the first instance stored is ever
/// returned.
#[derive(Default)]
pub struct Container {
    entries: Mutex<HashMap<String, ServiceEntry>>,
}

/// One service construction in progress.
///
/// Links to the resolution that triggered it, so the chain of identifiers
/// being built on this call path can be walked without shared state.
pub struct Resolution<'a> {
    container: &'a Container,
    id: &'a str,
    requester: Option<&'a str>,
    parent: Option<&'a Resolution<'a>>,
}

impl<'a> Resolution<'a> {
    /// Identifier being constructed.
    pub fn id(&self) -> &str {
        self.id
    }

    /// Plugin the service is built for.
    ///
    /// `None` for singletons (shared by every plugin) and for resolutions
    /// made outside plugin activation.
    pub fn requester(&self) -> Option<&str> {
        self.requester
    }

    /// Resolve a dependency of the service under construction.
    pub fn resolve(&self, id: &str) -> Result<ServiceInstance> {
        self.container.resolve_with(id, self.requester, Some(self))
    }

    /// Resolve a dependency and downcast to `T`.
    pub fn resolve_as<T>(&self, id: &str) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        downcast(id, self.resolve(id)?)
    }

    /// Identifiers under construction, outermost first.
    fn chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut node = Some(self);
        while let Some(current) = node {
            chain.push(current.id.to_string());
            node = current.parent;
        }
        chain.reverse();
        chain
    }
}

impl Container {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `id`.
    ///
    /// Fails with [`HyperError::DuplicateService`] if `id` is taken.
    pub fn register<T, F>(&self, id: impl Into<String>, scope: Scope, factory: F) -> Result<()>
    where
        T: Any + Send + Sync,
        F: Fn(&Resolution<'_>) -> Result<T> + Send + Sync + 'static,
    {
        let factory: ServiceFactory =
            Arc::new(move |resolution| factory(resolution).map(|v| Arc::new(v) as ServiceInstance));
        self.insert(
            id.into(),
            ServiceEntry {
                scope,
                factory: Some(factory),
                instance: None,
            },
        )
    }

    /// Register an already-built singleton.
    pub fn register_instance<T>(&self, id: impl Into<String>, value: T) -> Result<()>
    where
        T: Any + Send + Sync,
    {
        self.insert(
            id.into(),
            ServiceEntry {
                scope: Scope::Singleton,
                factory: None,
                instance: Some(Arc::new(value)),
            },
        )
    }

    fn insert(&self, id: String, entry: ServiceEntry) -> Result<()> {
        let mut entries = lock(&self.entries);
        if entries.contains_key(&id) {
            return Err(HyperError::DuplicateService(id));
        }
        debug!(service = %id, scope = ?entry.scope, "Registered service");
        entries.insert(id, entry);
        Ok(())
    }

    /// Resolve `id` to an instance, constructing it if needed.
    pub fn resolve(&self, id: &str) -> Result<ServiceInstance> {
        self.resolve_with(id, None, None)
    }

    /// Resolve `id` on behalf of `plugin`.
    ///
    /// Per-activation factories see `plugin` as the requester, so the
    /// instance can be scoped to it (a log sink tagged with its name, its
    /// own settings block).
    pub fn resolve_for(&self, id: &str, plugin: &str) -> Result<ServiceInstance> {
        self.resolve_with(id, Some(plugin), None)
    }

    fn resolve_with<'a>(
        &'a self,
        id: &'a str,
        requester: Option<&'a str>,
        parent: Option<&'a Resolution<'a>>,
    ) -> Result<ServiceInstance> {
        if let Some(parent) = parent {
            let mut chain = parent.chain();
            if let Some(pos) = chain.iter().position(|s| s == id) {
                let mut cycle = chain.split_off(pos);
                cycle.push(id.to_string());
                return Err(HyperError::CircularService { chain: cycle });
            }
        }

        let (scope, factory) = {
            let entries = lock(&self.entries);
            let entry = entries
                .get(id)
                .ok_or_else(|| HyperError::UnknownService(id.to_string()))?;
            if let Some(instance) = &entry.instance {
                return Ok(Arc::clone(instance));
            }
            match &entry.factory {
                Some(factory) => (entry.scope, Arc::clone(factory)),
                None => return Err(HyperError::UnknownService(id.to_string())),
            }
        };

        let resolution = Resolution {
            container: self,
            id,
            requester: match scope {
                Scope::Singleton => None,
                Scope::PerActivation => requester,
            },
            parent,
        };

        // The entries lock is released here so the factory may resolve others.
        let instance = factory(&resolution)?;

        if scope == Scope::Singleton {
            let mut entries = lock(&self.entries);
            if let Some(entry) = entries.get_mut(id) {
                if let Some(existing) = &entry.instance {
                    return Ok(Arc::clone(existing));
                }
                entry.instance = Some(Arc::clone(&instance));
            }
            debug!(service = %id, "Constructed singleton");
        }

        Ok(instance)
    }

    /// Resolve `id` and downcast to `T`.
    pub fn resolve_as<T>(&self, id: &str) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        downcast(id, self.resolve(id)?)
    }

    /// Whether `id` has been registered.
    pub fn contains(&self, id: &str) -> bool {
        lock(&self.entries).contains_key(id)
    }

    /// Declared scope of `id`, if registered.
    pub fn scope_of(&self, id: &str) -> Option<Scope> {
        lock(&self.entries).get(id).map(|e| e.scope)
    }

    /// All registered identifiers, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.entries).keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Downcast a resolved instance to a concrete service type.
pub fn downcast<T>(id: &str, instance: ServiceInstance) -> Result<Arc<T>>
where
    T: Any + Send + Sync,
{
    instance.downcast::<T>().map_err(|_| HyperError::ServiceType {
        id: id.to_string(),
        expected: type_name::<T>(),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Endpoint {
        url: String,
    }

    #[test]
    fn test_singleton_resolves_identical_instance() {
        let container = Container::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        container
            .register("endpoint", Scope::Singleton, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Endpoint {
                    url: "http://localhost".into(),
                })
            })
            .unwrap();

        let a = container.resolve_as::<Endpoint>("endpoint").unwrap();
        let b = container.resolve_as::<Endpoint>("endpoint").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_per_activation_resolves_distinct_equal_instances() {
        let container = Container::new();
        container
            .register("endpoint", Scope::PerActivation, |_| {
                Ok(Endpoint {
                    url: "http://localhost".into(),
                })
            })
            .unwrap();

        let a = container.resolve_as::<Endpoint>("endpoint").unwrap();
        let b = container.resolve_as::<Endpoint>("endpoint").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(*a, *b);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let container = Container::new();
        container
            .register("x", Scope::Singleton, |_| Ok(1u32))
            .unwrap();
        let err = container
            .register("x", Scope::PerActivation, |_| Ok(2u32))
            .unwrap_err();
        assert!(matches!(err, HyperError::DuplicateService(id) if id == "x"));

        let err = container.register_instance("x", 3u32).unwrap_err();
        assert!(matches!(err, HyperError::DuplicateService(_)));
    }

    #[test]
    fn test_unknown_service() {
        let container = Container::new();
        let err = container.resolve("missing").unwrap_err();
        assert!(matches!(err, HyperError::UnknownService(id) if id == "missing"));
    }

    #[test]
    fn test_self_resolution_fails_fast() {
        let container = Container::new();
        container
            .register("loop", Scope::Singleton, |c| {
                c.resolve("loop")?;
                Ok(0u8)
            })
            .unwrap();

        let err = container.resolve("loop").unwrap_err();
        match err {
            HyperError::CircularService { chain } => assert_eq!(chain, vec!["loop", "loop"]),
            other => panic!("unexpected error: {other}"),
        }
        // Nothing is left marked in progress: a retry fails the same way.
        assert!(matches!(
            container.resolve("loop"),
            Err(HyperError::CircularService { .. })
        ));
    }

    #[test]
    fn test_transitive_cycle_reports_chain() {
        let container = Container::new();
        container
            .register("a", Scope::Singleton, |c| {
                c.resolve("b")?;
                Ok(0u8)
            })
            .unwrap();
        container
            .register("b", Scope::PerActivation, |c| {
                c.resolve("a")?;
                Ok(0u8)
            })
            .unwrap();

        match container.resolve("a").unwrap_err() {
            HyperError::CircularService { chain } => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_factory_can_depend_on_other_service() {
        let container = Container::new();
        container
            .register_instance("base_url", String::from("http://svc"))
            .unwrap();
        container
            .register("endpoint", Scope::Singleton, |c| {
                let base = c.resolve_as::<String>("base_url")?;
                Ok(Endpoint {
                    url: format!("{}/v1", base),
                })
            })
            .unwrap();

        let endpoint = container.resolve_as::<Endpoint>("endpoint").unwrap();
        assert_eq!(endpoint.url, "http://svc/v1");
    }

    #[test]
    fn test_failed_singleton_is_not_cached() {
        let container = Container::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        container
            .register("flaky", Scope::Singleton, move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(HyperError::Config("not ready".into()))
                } else {
                    Ok(7u32)
                }
            })
            .unwrap();

        assert!(container.resolve("flaky").is_err());
        assert_eq!(*container.resolve_as::<u32>("flaky").unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_resolution_is_not_circular() {
        let container = Arc::new(Container::new());
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let gate = Arc::clone(&barrier);
        container
            .register("slow", Scope::PerActivation, move |_| {
                // Both threads are inside this factory at the same time.
                gate.wait();
                Ok(1u8)
            })
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let container = Arc::clone(&container);
                std::thread::spawn(move || container.resolve_as::<u8>("slow").map(|v| *v))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 1);
        }
    }

    #[test]
    fn test_requester_reaches_per_activation_factories_only() {
        let container = Container::new();
        container
            .register("tagged", Scope::PerActivation, |r| {
                Ok(r.requester().unwrap_or("host").to_string())
            })
            .unwrap();
        container
            .register("shared", Scope::Singleton, |r| {
                Ok(r.requester().unwrap_or("host").to_string())
            })
            .unwrap();
        container
            .register("wrapper", Scope::PerActivation, |r| {
                Ok(format!("wrapped {}", r.resolve_as::<String>("tagged")?))
            })
            .unwrap();

        let for_plugin = |id: &str, plugin: &str| {
            downcast::<String>(id, container.resolve_for(id, plugin).unwrap()).unwrap()
        };

        assert_eq!(for_plugin("tagged", "git-tools").as_str(), "git-tools");
        assert_eq!(container.resolve_as::<String>("tagged").unwrap().as_str(), "host");

        assert_eq!(for_plugin("shared", "git-tools").as_str(), "host");
        assert_eq!(for_plugin("wrapper", "deploy").as_str(), "wrapped deploy");
    }

    #[test]
    fn test_type_mismatch() {
        let container = Container::new();
        container.register_instance("n", 5u32).unwrap();
        let err = container.resolve_as::<String>("n").unwrap_err();
        assert!(matches!(err, HyperError::ServiceType { .. }));
    }

    #[test]
    fn test_introspection() {
        let container = Container::new();
        container.register_instance("b", 1u8).unwrap();
        container
            .register("a", Scope::PerActivation, |_| Ok(2u8))
            .unwrap();

        assert_eq!(container.ids(), vec!["a", "b"]);
        assert!(container.contains("a"));
        assert_eq!(container.scope_of("a"), Some(Scope::PerActivation));
        assert_eq!(container.scope_of("b"), Some(Scope::Singleton));
        assert_eq!(container.scope_of("c"), None);
    }
}
