//! Host module: named calls and startup wiring.
//!
//! The host talks to the engines through a [`CallTable`] of named handlers.
//! [`HostModule::init`] parses the configuration, brings up the platform and
//! registers `runscript_v8` and `rungc_v8`. The same table is what scripts
//! reach through `call_host(name, input)`, so a script can call any
//! registered host operation.

use std::sync::{Arc, Weak};
use std::thread::ThreadId;

use dashmap::DashMap;

use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::error::{HostCallError, PlatformError};
use crate::platform;
use crate::registry::EngineRegistry;
use crate::services::{HostDispatcher, HostServices, ResourceLoader};

/// Runs a request on the calling thread's engine.
pub const RUNSCRIPT_CALL: &str = "runscript_v8";

/// Collects garbage in the calling thread's engine.
pub const RUNGC_CALL: &str = "rungc_v8";

/// Result of a named call: output bytes (if any) or a diagnostic.
pub type CallResult = Result<Option<Vec<u8>>, String>;

/// Handler registered under a call name.
pub type CallHandler = Arc<dyn Fn(&[u8]) -> CallResult + Send + Sync>;

/// Thread-exit hook handed to the host.
pub type ThreadCleaner = Arc<dyn Fn(ThreadId) + Send + Sync>;

/// Named handlers, shared between the host and the scripts.
#[derive(Clone, Default)]
pub struct CallTable {
    handlers: Arc<DashMap<String, CallHandler>>,
}

impl CallTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name`. Returns `true` if it replaced an
    /// existing handler.
    pub fn register<F>(&self, name: impl Into<String>, handler: F) -> bool
    where
        F: Fn(&[u8]) -> CallResult + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!("[calls] Registering {}", name);
        self.handlers.insert(name, Arc::new(handler)).is_some()
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Run the handler registered under `name`.
    pub fn call(&self, name: &str, input: &[u8]) -> CallResult {
        let handler = self
            .handler(name)
            .ok_or_else(|| HostCallError::UnknownCall(name.to_string()).to_string())?;
        handler(input)
    }

    // Handlers run without holding the map lock; they may call back in.
    fn handler(&self, name: &str) -> Option<CallHandler> {
        self.handlers.get(name).map(|h| Arc::clone(h.value()))
    }
}

impl HostDispatcher for CallTable {
    fn dispatch(&self, name: &str, input: &[u8]) -> Result<Option<Vec<u8>>, HostCallError> {
        let handler = self
            .handler(name)
            .ok_or_else(|| HostCallError::UnknownCall(name.to_string()))?;
        handler(input).map_err(HostCallError::Failed)
    }
}

/// The engine host as seen by the embedding process.
pub struct HostModule {
    config: EngineConfig,
    calls: CallTable,
    registry: Arc<EngineRegistry<Engine>>,
}

impl HostModule {
    /// Parse `env`, initialize the platform and register the engine calls.
    ///
    /// Every engine runs `bootstrap` on creation and loads further scripts
    /// through `loader`.
    pub fn init<I, K, V>(
        env: I,
        bootstrap: impl Into<Vec<u8>>,
        loader: Arc<dyn ResourceLoader>,
    ) -> Result<Self, PlatformError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let config = EngineConfig::from_env_map(env)?;
        platform::initialize(&config)?;
        Ok(Self::with_initialized_platform(config, bootstrap, loader))
    }

    /// Build the module on a platform that is already initialized.
    pub fn with_initialized_platform(
        config: EngineConfig,
        bootstrap: impl Into<Vec<u8>>,
        loader: Arc<dyn ResourceLoader>,
    ) -> Self {
        let bootstrap: Arc<[u8]> = bootstrap.into().into();
        let calls = CallTable::new();
        let services = HostServices::new(loader, Arc::new(calls.clone()));

        let registry = Arc::new(EngineRegistry::new(move || {
            Engine::new(&bootstrap, services.clone())
        }));

        // Handlers hold the registry weakly: engines reach the table through
        // their services, so a strong reference would form a cycle.
        let weak = Arc::downgrade(&registry);
        calls.register(RUNSCRIPT_CALL, move |input| {
            let registry = upgrade(&weak)?;
            registry.run_script(input).map_err(|e| e.to_string())
        });
        let weak = Arc::downgrade(&registry);
        calls.register(RUNGC_CALL, move |_input| {
            upgrade(&weak)?.run_garbage_collector();
            Ok(None)
        });

        tracing::info!("[module] Engine module initialized");
        Self {
            config,
            calls,
            registry,
        }
    }

    /// Run the named call with `input`.
    pub fn call(&self, name: &str, input: &[u8]) -> CallResult {
        self.calls.call(name, input)
    }

    /// The call table, for registering additional host operations.
    pub fn calls(&self) -> &CallTable {
        &self.calls
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Dispose the engine of `thread_id`. Call from the exiting thread.
    pub fn clean_thread_local(&self, thread_id: ThreadId) {
        self.registry.clean_thread_local(thread_id);
    }

    /// Thread-exit hook for the host's thread lifecycle callbacks.
    pub fn thread_cleaner(&self) -> ThreadCleaner {
        let weak = Arc::downgrade(&self.registry);
        Arc::new(move |thread_id| {
            if let Some(registry) = weak.upgrade() {
                registry.clean_thread_local(thread_id);
            }
        })
    }

    /// Number of threads that currently own an engine.
    pub fn engine_count(&self) -> usize {
        self.registry.len()
    }
}

fn upgrade(weak: &Weak<EngineRegistry<Engine>>) -> Result<Arc<EngineRegistry<Engine>>, String> {
    weak.upgrade()
        .ok_or_else(|| "Engine module has been shut down".to_string())
}
