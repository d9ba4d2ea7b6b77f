//! Captures engine log output with a scoped subscriber; no global
//! subscriber is installed in this binary.

use std::io::Write;
use std::sync::{Arc, Mutex};

use v8host_runtime::{Engine, EngineConfig, HostServices, platform};

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn capture_logs(f: impl FnOnce()) -> String {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    captured.text()
}

#[test]
fn test_disposal_logged_only_for_constructed_engines() {
    platform::initialize(&EngineConfig::default()).unwrap();

    let failed = capture_logs(|| {
        let result = Engine::new(b"throw new Error('no boot');", HostServices::default());
        assert!(result.is_err());
    });
    assert!(failed.contains("Releasing isolate of failed engine construction"), "{}", failed);
    assert!(!failed.contains("Disposing engine instance"), "{}", failed);

    let constructed = capture_logs(|| {
        let mut engine = Engine::new(
            b"function __dispatch(r) { return r; }",
            HostServices::default(),
        )
        .unwrap();
        engine.invoke(b"x").unwrap();
    });
    assert!(
        constructed.contains("Disposing engine instance after 1 invocations"),
        "{}",
        constructed
    );
}
