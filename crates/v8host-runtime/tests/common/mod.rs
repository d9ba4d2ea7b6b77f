//! Shared setup for the V8-backed integration tests.

#![allow(dead_code)]

use std::sync::Once;

use v8host_runtime::{Engine, EngineConfig, HostServices, platform};

static INIT: Once = Once::new();

/// Initialize logging and the V8 platform once per test binary.
pub fn init_platform() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        platform::initialize(&EngineConfig::default()).expect("V8 platform init");
    });
}

/// Engine with the given bootstrap and no host services.
pub fn engine(bootstrap: &str) -> Engine {
    init_platform();
    Engine::new(bootstrap.as_bytes(), HostServices::default()).expect("engine construction")
}

pub const ECHO_BOOTSTRAP: &str = "function __dispatch(request) { return request; }";

pub fn text(bytes: Option<Vec<u8>>) -> String {
    String::from_utf8(bytes.expect("string result")).expect("utf-8 result")
}
