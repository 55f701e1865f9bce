use crate::error::ProviderError;
use crate::model::ModelTemplate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerId {
    Thread(ThreadId),
    Task(u64),
}

impl WorkerId {
    pub fn current() -> Self {
        Self::Thread(thread::current().id())
    }
}

type Slot<C> = Arc<Mutex<C>>;

/// One execution context per worker, created from the shared template the
/// first time that worker asks for it.
pub struct ContextPool<T: ModelTemplate> {
    template: Arc<T>,
    contexts: RwLock<HashMap<WorkerId, Slot<T::Context>>>,
}

impl<T: ModelTemplate> ContextPool<T> {
    pub fn new(template: Arc<T>) -> Self {
        Self {
            template,
            contexts: RwLock::new(HashMap::new()),
        }
    }

    pub fn template(&self) -> &Arc<T> {
        &self.template
    }

    pub fn with_context<R>(
        &self,
        f: impl FnOnce(&mut T::Context) -> Result<R, ProviderError>,
    ) -> Result<R, ProviderError> {
        self.with_context_for(WorkerId::current(), f)
    }

    pub fn with_context_for<R>(
        &self,
        worker: WorkerId,
        f: impl FnOnce(&mut T::Context) -> Result<R, ProviderError>,
    ) -> Result<R, ProviderError> {
        let slot = self.slot(worker)?;
        // Only `worker` ever holds this slot, so the lock is never contended.
        let mut context = slot
            .lock()
            .map_err(|_| ProviderError::evaluation("execution context poisoned by an earlier fault"))?;
        f(&mut context)
    }

    fn slot(&self, worker: WorkerId) -> Result<Slot<T::Context>, ProviderError> {
        let known = self
            .contexts
            .read()
            .map_err(|_| ProviderError::evaluation("context pool poisoned"))?
            .get(&worker)
            .cloned();
        if let Some(slot) = known {
            return Ok(slot);
        }

        let mut contexts = self
            .contexts
            .write()
            .map_err(|_| ProviderError::evaluation("context pool poisoned"))?;
        if let Some(slot) = contexts.get(&worker) {
            return Ok(Arc::clone(slot));
        }
        let context = self.template.create_context()?;
        debug!(?worker, workers = contexts.len() + 1, "created execution context");
        let slot = Arc::new(Mutex::new(context));
        contexts.insert(worker, Arc::clone(&slot));
        Ok(slot)
    }

    pub fn len(&self) -> usize {
        self.contexts.read().map(|contexts| contexts.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ModelTemplate> std::fmt::Debug for ContextPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPool")
            .field("contexts", &self.len())
            .finish()
    }
}
