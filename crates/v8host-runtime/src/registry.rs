//! Per-thread engine registry.
//!
//! Every calling thread gets its own engine, created on first use and torn
//! down when the host reports that the thread is exiting. The map is an
//! ordinary `DashMap` keyed by `ThreadId`; entries are wrapped in
//! [`ThreadBound`] so an engine is only ever touched by the thread that
//! created it.

use std::cell::RefCell;
use std::mem::ManuallyDrop;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::DashMap;

use crate::engine::Engine;
use crate::error::{EngineError, RegistryError};

/// Operations the registry needs from an engine.
pub trait ScriptEngine: 'static {
    fn invoke(&mut self, request: &[u8]) -> Result<Option<Vec<u8>>, EngineError>;
    fn collect_garbage(&mut self);
}

impl ScriptEngine for Engine {
    fn invoke(&mut self, request: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        Engine::invoke(self, request)
    }

    fn collect_garbage(&mut self) {
        Engine::collect_garbage(self)
    }
}

/// Builds a fresh engine for a thread.
pub type EngineFactory<E> = Arc<dyn Fn() -> Result<E, EngineError> + Send + Sync>;

enum Slot<E> {
    Constructing,
    Ready(Rc<RefCell<E>>),
}

/// Map from thread to that thread's engine.
pub struct EngineRegistry<E: ScriptEngine> {
    engines: DashMap<ThreadId, ThreadBound<Slot<E>>>,
    factory: EngineFactory<E>,
}

impl<E: ScriptEngine> EngineRegistry<E> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<E, EngineError> + Send + Sync + 'static,
    {
        Self {
            engines: DashMap::new(),
            factory: Arc::new(factory),
        }
    }

    /// Run `request` on the calling thread's engine, creating it if needed.
    pub fn run_script(&self, request: &[u8]) -> Result<Option<Vec<u8>>, RegistryError> {
        let engine = self.engine_for_current_thread()?;
        let mut guard = engine.try_borrow_mut().map_err(|_| RegistryError::Busy)?;
        Ok(guard.invoke(request)?)
    }

    /// Collect garbage in the calling thread's engine, if it has one.
    pub fn run_garbage_collector(&self) {
        let Some(engine) = self.existing_engine() else {
            tracing::debug!("[registry] No engine on this thread, skipping GC");
            return;
        };
        match engine.try_borrow_mut() {
            Ok(mut guard) => guard.collect_garbage(),
            Err(_) => tracing::debug!("[registry] Engine busy, skipping GC"),
        };
    }

    /// Dispose the engine of an exiting thread.
    ///
    /// Must be called on that thread; an engine removed from any other
    /// thread is leaked rather than disposed.
    pub fn clean_thread_local(&self, thread_id: ThreadId) {
        if let Some((_, slot)) = self.engines.remove(&thread_id) {
            tracing::debug!("[registry] Cleaning engine of thread {:?}", thread_id);
            drop(slot);
        }
    }

    /// Number of threads with an engine (or one under construction).
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    pub fn contains(&self, thread_id: ThreadId) -> bool {
        self.engines.contains_key(&thread_id)
    }

    fn existing_engine(&self) -> Option<Rc<RefCell<E>>> {
        let entry = self.engines.get(&thread::current().id())?;
        match entry.get()? {
            Slot::Ready(engine) => Some(Rc::clone(engine)),
            Slot::Constructing => None,
        }
    }

    fn engine_for_current_thread(&self) -> Result<Rc<RefCell<E>>, RegistryError> {
        let id = thread::current().id();
        if let Some(entry) = self.engines.get(&id) {
            match entry.get() {
                Some(Slot::Ready(engine)) => return Ok(Rc::clone(engine)),
                // The bootstrap script of this thread's engine called back in.
                Some(Slot::Constructing) => return Err(RegistryError::Busy),
                None => {}
            }
        }

        // No map lock is held while the bootstrap script runs.
        tracing::debug!("[registry] Creating engine for thread {:?}", id);
        self.engines.insert(id, ThreadBound::new(Slot::Constructing));
        match (self.factory)() {
            Ok(engine) => {
                let engine = Rc::new(RefCell::new(engine));
                self.engines
                    .insert(id, ThreadBound::new(Slot::Ready(Rc::clone(&engine))));
                Ok(engine)
            }
            Err(e) => {
                self.engines.remove(&id);
                Err(e.into())
            }
        }
    }
}

/// A value that is only reachable from the thread that created it.
pub struct ThreadBound<T> {
    owner: ThreadId,
    value: ManuallyDrop<T>,
}

// SAFETY: `value` is only handed out by `get`, which checks that the caller
// is the owning thread, and `Drop` only runs its destructor on that thread.
unsafe impl<T> Send for ThreadBound<T> {}
unsafe impl<T> Sync for ThreadBound<T> {}

impl<T> ThreadBound<T> {
    pub fn new(value: T) -> Self {
        Self {
            owner: thread::current().id(),
            value: ManuallyDrop::new(value),
        }
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// The value, if called from the owning thread.
    pub fn get(&self) -> Option<&T> {
        (thread::current().id() == self.owner).then(|| &*self.value)
    }
}

impl<T> Drop for ThreadBound<T> {
    fn drop(&mut self) {
        if thread::current().id() == self.owner {
            // SAFETY: on the owning thread, and `value` is never used again.
            unsafe { ManuallyDrop::drop(&mut self.value) }
        } else {
            tracing::warn!(
                "[registry] Value owned by thread {:?} dropped on thread {:?}, leaking it",
                self.owner,
                thread::current().id()
            );
        }
    }
}
