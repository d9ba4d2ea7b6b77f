//! Embedded V8 script engine for a host process.
//!
//! The host hands opaque request strings to a JavaScript dispatcher defined
//! by a bootstrap script. Each calling thread gets its own [`Engine`]
//! (isolate plus persistent context), created on first use by the
//! [`EngineRegistry`] and disposed when the thread exits.
//!
//! Scripts see three globals:
//! - `print(value?)` writes a line to stdout
//! - `load(path)` evaluates another script through the [`ResourceLoader`]
//! - `call_host(name, input)` runs a named host operation through the
//!   [`HostDispatcher`]
//!
//! # Startup
//!
//! ```ignore
//! let module = HostModule::init(std::env::vars(), bootstrap, Arc::new(FsLoader::new(root)))?;
//! let reply = module.call(RUNSCRIPT_CALL, br#"{"module":"app/main"}"#)?;
//! ```

mod bindings;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod module;
pub mod platform;
pub mod registry;
pub mod services;
pub mod trace;

pub use config::EngineConfig;
pub use engine::{BOOTSTRAP_SCRIPT_NAME, DISPATCHER_NAME, Engine};
pub use error::{
    BindingError, ConfigError, EngineError, HostCallError, LoadError, PlatformError,
    RegistryError,
};
pub use module::{CallResult, CallTable, HostModule, RUNGC_CALL, RUNSCRIPT_CALL};
pub use registry::{EngineRegistry, ScriptEngine, ThreadBound};
pub use services::{FsLoader, HostDispatcher, HostServices, ResourceLoader};
pub use trace::{LOADER_SOURCES, filter_stack_trace};
