// Worker Registry: process-wide name -> handler table.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::worker::Worker;

/// Maps worker name to definition. Registration and lookup are safe under
/// concurrent dispatch; the lock only ever guards the map itself, never a
/// handler invocation.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, Arc<dyn Worker>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Registering a name that already exists replaces the prior entry.
    pub fn register(&self, worker: Arc<dyn Worker>) {
        let mut guard = self.workers.write().expect("worker registry lock poisoned");
        guard.insert(worker.name().to_string(), worker);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Worker>> {
        self.workers
            .read()
            .expect("worker registry lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.workers
            .read()
            .expect("worker registry lock poisoned")
            .contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.workers
            .read()
            .expect("worker registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.workers
            .write()
            .expect("worker registry lock poisoned")
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::Job;
    use async_trait::async_trait;

    struct Noop(&'static str);

    #[async_trait]
    impl Worker for Noop {
        fn name(&self) -> &str {
            self.0
        }

        async fn perform(&self, _job: &Job) -> crate::domain::worker::WorkerOutcome {
            crate::domain::worker::WorkerOutcome::Ok(None)
        }
    }

    #[test]
    fn register_same_name_replaces_prior_entry() {
        let registry = WorkerRegistry::new();
        registry.register(Arc::new(Noop("send_email")));
        registry.register(Arc::new(Noop("send_email")));
        assert_eq!(registry.names(), vec!["send_email".to_string()]);
        assert!(registry.has("send_email"));
    }

    #[test]
    fn unregistered_name_is_absent() {
        let registry = WorkerRegistry::new();
        assert!(!registry.has("ghost"));
        assert!(registry.get("ghost").is_none());
    }
}
