//! Process-wide V8 platform setup.
//!
//! V8 must be initialized exactly once, before the first isolate is created.
//! The host module calls [`initialize`] during startup; engines refuse to
//! construct until it has completed.

use std::sync::atomic::{AtomicBool, Ordering};

use deno_core::JsRuntime;
use deno_core::v8;

use crate::config::EngineConfig;
use crate::error::PlatformError;

static INIT_STARTED: AtomicBool = AtomicBool::new(false);
static INIT_DONE: AtomicBool = AtomicBool::new(false);

/// Initialize the V8 platform with the given tunables.
///
/// Configures the worker thread pool, passes heap limits as V8 flags and lets
/// deno_core load ICU data and start V8. A second call returns
/// [`PlatformError::AlreadyInitialized`] without touching V8.
pub fn initialize(config: &EngineConfig) -> Result<(), PlatformError> {
    if INIT_STARTED.swap(true, Ordering::SeqCst) {
        return Err(PlatformError::AlreadyInitialized);
    }

    tracing::info!(
        "[platform] Initializing V8, config: {}",
        config.to_json()
    );

    let flags = config.v8_flags();
    if !flags.is_empty() {
        // Flags must be in place before V8::Initialize runs.
        let joined = flags.join(" ");
        tracing::debug!("[platform] Setting V8 flags: {}", joined);
        v8::V8::set_flags_from_string(&joined);
    }
    if config.code_range_size > 0 || config.max_zone_pool_size > 0 {
        tracing::debug!(
            "[platform] code_range_size={} max_zone_pool_size={} kept at engine defaults",
            config.code_range_size,
            config.max_zone_pool_size
        );
    }

    // Engines are created on arbitrary host threads, not only on descendants
    // of this one, so the platform must not use memory protection keys.
    let platform =
        v8::new_unprotected_default_platform(u32::from(config.thread_pool_size), false)
            .make_shared();
    JsRuntime::init_platform(Some(platform), false);

    INIT_DONE.store(true, Ordering::SeqCst);
    tracing::info!("[platform] V8 {} initialized", v8::V8::get_version());
    Ok(())
}

/// Whether [`initialize`] has completed.
pub fn is_initialized() -> bool {
    INIT_DONE.load(Ordering::SeqCst)
}
