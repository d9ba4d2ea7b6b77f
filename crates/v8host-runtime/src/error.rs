//! Error types for the script engine host.

/// Errors produced while parsing the engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown engine configuration field: [{key}]")]
    UnknownKey { key: String },

    #[error("Empty value for engine configuration field: [{key}]")]
    EmptyValue { key: String },

    #[error("Error parsing parameter: [{key}], value: [{value}]: {reason}")]
    InvalidNumber {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid engine configuration document: {0}")]
    Document(String),
}

/// Errors from the process-wide platform setup.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("V8 platform is already initialized")]
    AlreadyInitialized,

    #[error("Invalid engine configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Errors surfaced by an engine instance.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine construction failed: {0}")]
    Construction(String),

    #[error("Dispatcher function '{0}' is undefined or not a function")]
    DispatcherMissing(String),

    #[error("Script invocation failed: {0}")]
    Invocation(String),

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("Value conversion failed: {0}")]
    Conversion(String),
}

/// Errors raised inside host binding functions.
///
/// These never reach the native caller: the binding boundary turns them
/// into script-visible exceptions.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Error loading script, path: [{path}]\n{reason}")]
    Load { path: String, reason: String },

    #[error("Host call error, name: [{name}]\n{reason}")]
    HostCall { name: String, reason: String },

    #[error("Host services are not attached to this isolate")]
    ServicesMissing,
}

/// Error returned by a resource loader.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Resource not found: [{0}]")]
    NotFound(String),

    #[error("Failed to read resource [{path}]: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Error returned by a host-call dispatcher.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HostCallError {
    #[error("Unknown host call: [{0}]")]
    UnknownCall(String),

    #[error("{0}")]
    Failed(String),
}

/// Errors from the per-thread engine registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Engine for this thread is busy (re-entrant script run)")]
    Busy,
}
