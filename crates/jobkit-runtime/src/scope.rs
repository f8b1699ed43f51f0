//! Scope factory backed by registered scoped-service providers.

use jobkit_protocols::{ExecutionScope, JobId, ScopeFactory, ScopeProviders};

/// Creates a fresh [`ExecutionScope`] per attempt from a shared set of providers.
#[derive(Debug, Clone, Default)]
pub struct ServiceScopeFactory {
    providers: ScopeProviders,
}

impl ServiceScopeFactory {
    pub fn new(providers: ScopeProviders) -> Self {
        Self { providers }
    }

    pub fn providers(&self) -> &ScopeProviders {
        &self.providers
    }
}

impl ScopeFactory for ServiceScopeFactory {
    fn create_scope(&self, job_id: &JobId) -> ExecutionScope {
        ExecutionScope::new(job_id.clone(), self.providers.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct DbSession(usize);

    #[test]
    fn test_each_scope_builds_its_own_services() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut providers = ScopeProviders::new();
        let c = counter.clone();
        providers.provide(move |_scope| DbSession(c.fetch_add(1, Ordering::SeqCst)));

        let factory = ServiceScopeFactory::new(providers);
        let job_id = JobId::from("job-1");
        let first = factory.create_scope(&job_id);
        let second = factory.create_scope(&job_id);

        let a = first.resolve::<DbSession>().unwrap();
        let b = second.resolve::<DbSession>().unwrap();
        assert_ne!(a.0, b.0);
        assert_eq!(first.job_id(), &job_id);
        assert!(factory.providers().contains::<DbSession>());
    }
}
