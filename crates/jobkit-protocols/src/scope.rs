//! Per-attempt resource scope.
//!
//! Every execution attempt owns exactly one [`ExecutionScope`]. Resources
//! stored in or resolved from it are shared by all hooks and the handler of
//! that attempt and are never visible to another attempt. Release runs the
//! registered callbacks once, in reverse registration order.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::job::JobId;

type Resource = Arc<dyn Any + Send + Sync>;
type Provider = Arc<dyn Fn(&ExecutionScope) -> Resource + Send + Sync>;
type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Factories for scoped services, built lazily once per scope.
#[derive(Clone, Default)]
pub struct ScopeProviders {
    providers: HashMap<TypeId, Provider>,
}

impl ScopeProviders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the factory for scoped service `T`. Replaces any previous one.
    pub fn provide<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&ExecutionScope) -> T + Send + Sync + 'static,
    {
        let provider: Provider =
            Arc::new(move |scope: &ExecutionScope| Arc::new(factory(scope)) as Resource);
        self.providers.insert(TypeId::of::<T>(), provider);
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.providers.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    fn get(&self, type_id: &TypeId) -> Option<Provider> {
        self.providers.get(type_id).cloned()
    }
}

impl fmt::Debug for ScopeProviders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeProviders")
            .field("count", &self.providers.len())
            .finish()
    }
}

pub struct ExecutionScope {
    id: Uuid,
    job_id: JobId,
    resources: Mutex<HashMap<TypeId, Resource>>,
    providers: ScopeProviders,
    release_hooks: Mutex<Vec<ReleaseHook>>,
    released: AtomicBool,
}

impl ExecutionScope {
    pub fn new(job_id: JobId, providers: ScopeProviders) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            resources: Mutex::new(HashMap::new()),
            providers,
            release_hooks: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
        }
    }

    /// Unique per scope instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Store a resource, replacing any previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&self, value: T) -> Arc<T> {
        let value = Arc::new(value);
        self.resources
            .lock()
            .insert(TypeId::of::<T>(), value.clone() as Resource);
        value
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        let resource = self.resources.lock().get(&TypeId::of::<T>()).cloned()?;
        resource.downcast::<T>().ok()
    }

    /// Get a stored resource or build it from the registered provider.
    ///
    /// The provider runs at most once per scope unless it races with itself;
    /// the first stored instance wins.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        if let Some(existing) = self.get::<T>() {
            return Some(existing);
        }
        let provider = self.providers.get(&TypeId::of::<T>())?;
        // Built outside the lock so providers may resolve other services.
        let built = provider(self);
        let stored = self
            .resources
            .lock()
            .entry(TypeId::of::<T>())
            .or_insert(built)
            .clone();
        stored.downcast::<T>().ok()
    }

    /// Register a callback run when the scope is released.
    ///
    /// Registering on an already released scope runs the callback immediately.
    pub fn on_release<F: FnOnce() + Send + 'static>(&self, hook: F) {
        if self.is_released() {
            hook();
            return;
        }
        self.release_hooks.lock().push(Box::new(hook));
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Run the release callbacks and drop all resources.
    ///
    /// Returns `false` if the scope was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        let hooks = std::mem::take(&mut *self.release_hooks.lock());
        for hook in hooks.into_iter().rev() {
            hook();
        }
        self.resources.lock().clear();
        true
    }
}

impl Drop for ExecutionScope {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ExecutionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionScope")
            .field("id", &self.id)
            .field("job_id", &self.job_id)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Creates the scope of one execution attempt.
pub trait ScopeFactory: Send + Sync {
    fn create_scope(&self, job_id: &JobId) -> ExecutionScope;
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
