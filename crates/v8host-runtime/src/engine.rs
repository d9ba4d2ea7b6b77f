//! A single V8 engine instance.
//!
//! An [`Engine`] owns one isolate and one persistent context. The context is
//! created from a global template carrying the host bindings, then the
//! bootstrap script runs in it and defines the dispatcher function that
//! [`Engine::invoke`] routes every request through.
//!
//! All operations run synchronously on the calling thread. An engine must
//! stay on the thread that created it.

use deno_core::v8;

use crate::bindings;
use crate::bridge;
use crate::error::EngineError;
use crate::platform;
use crate::services::HostServices;
use crate::trace::format_exception;

/// Global function every request is routed through.
pub const DISPATCHER_NAME: &str = "__dispatch";

/// Script name of the bootstrap code in stack traces.
pub const BOOTSTRAP_SCRIPT_NAME: &str = "bootstrap script";

/// One isolate with its persistent context.
pub struct Engine {
    // Declaration order is drop order: the context handle is released
    // before the isolate is disposed.
    context: v8::Global<v8::Context>,
    isolate: v8::OwnedIsolate,
    invocations: u64,
    ready: bool,
}

impl Engine {
    /// Create an isolate, install the host bindings and run `init_code`.
    ///
    /// Fails if the platform is not initialized or the bootstrap script
    /// throws; the isolate is released in either case.
    pub fn new(init_code: &[u8], services: HostServices) -> Result<Self, EngineError> {
        if !platform::is_initialized() {
            return Err(EngineError::Construction(
                "V8 platform is not initialized".to_string(),
            ));
        }
        tracing::info!("[engine] Initializing engine instance ...");

        let params =
            v8::CreateParams::default().array_buffer_allocator(v8::new_default_allocator());
        let mut isolate = v8::Isolate::new(params);
        isolate.set_slot(services);

        let context = {
            let scope = &mut v8::HandleScope::new(&mut isolate);
            let global = v8::ObjectTemplate::new(scope);
            bindings::install(scope, global)?;
            let context = v8::Context::new(
                scope,
                v8::ContextOptions {
                    global_template: Some(global),
                    ..Default::default()
                },
            );
            v8::Global::new(scope, context)
        };

        let mut engine = Self {
            context,
            isolate,
            invocations: 0,
            ready: false,
        };
        engine.run_bootstrap(init_code)?;
        engine.ready = true;

        tracing::info!("[engine] Engine initialization complete");
        Ok(engine)
    }

    fn run_bootstrap(&mut self, code: &[u8]) -> Result<(), EngineError> {
        let scope = &mut v8::HandleScope::with_context(&mut *self.isolate, &self.context);
        let tc = &mut v8::TryCatch::new(scope);
        compile_and_run(tc, code, BOOTSTRAP_SCRIPT_NAME)
            .map(|_| ())
            .map_err(|diag| EngineError::Construction(format!("Bootstrap script failed\n{}", diag)))
    }

    /// Route `request` through the dispatcher function.
    ///
    /// The request is passed as one string argument. A string result comes
    /// back as its UTF-8 bytes; any other result is `None`.
    pub fn invoke(&mut self, request: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        self.invocations += 1;
        tracing::debug!("[engine] Running callback script ({} bytes)", request.len());

        let scope = &mut v8::HandleScope::with_context(&mut *self.isolate, &self.context);
        let tc = &mut v8::TryCatch::new(scope);

        let dispatcher = resolve_function(tc, DISPATCHER_NAME)?;
        let argument = bridge::bytes_to_v8(tc, request)?;
        let receiver = tc.get_current_context().global(tc);

        let Some(result) = dispatcher.call(tc, receiver.into(), &[argument.into()]) else {
            return Err(EngineError::Invocation(caught(tc)));
        };
        let output = bridge::string_bytes(tc, result);
        tracing::debug!(
            "[engine] Callback run complete, result: [{}]",
            output.is_some()
        );
        Ok(output)
    }

    /// Compile and run `code` in the persistent context and return its
    /// completion value as JSON.
    pub fn evaluate(&mut self, name: &str, code: &[u8]) -> Result<serde_json::Value, EngineError> {
        tracing::debug!("[engine] Evaluating {} ({} bytes)", name, code.len());
        let scope = &mut v8::HandleScope::with_context(&mut *self.isolate, &self.context);
        let tc = &mut v8::TryCatch::new(scope);
        let value = compile_and_run(tc, code, name).map_err(EngineError::Evaluation)?;
        bridge::v8_to_json(tc, value)
    }

    /// Call the global function `name` with JSON arguments.
    pub fn call_function(
        &mut self,
        name: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, EngineError> {
        tracing::debug!("[engine] Calling {} with {} args", name, args.len());
        let scope = &mut v8::HandleScope::with_context(&mut *self.isolate, &self.context);
        let tc = &mut v8::TryCatch::new(scope);

        let function = resolve_function(tc, name)?;
        let argv = args
            .iter()
            .map(|arg| bridge::json_to_v8(tc, arg))
            .collect::<Result<Vec<_>, _>>()?;
        let receiver = tc.get_current_context().global(tc);

        let Some(result) = function.call(tc, receiver.into(), &argv) else {
            return Err(EngineError::Invocation(caught(tc)));
        };
        bridge::v8_to_json(tc, result)
    }

    /// Ask V8 to collect garbage. Blocks until the collection finishes.
    pub fn collect_garbage(&mut self) {
        tracing::debug!("[engine] Running garbage collector");
        self.isolate.low_memory_notification();
    }

    /// Number of `invoke` calls made on this instance.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.ready {
            tracing::info!(
                "[engine] Disposing engine instance after {} invocations",
                self.invocations
            );
        } else {
            tracing::debug!("[engine] Releasing isolate of failed engine construction");
        }
    }
}

/// Look up a callable on the global object.
fn resolve_function<'s>(
    scope: &mut v8::HandleScope<'s>,
    name: &str,
) -> Result<v8::Local<'s, v8::Function>, EngineError> {
    let key = bridge::str_to_v8(scope, name)?;
    let global = scope.get_current_context().global(scope);
    let value = global
        .get(scope, key.into())
        .ok_or_else(|| EngineError::DispatcherMissing(name.to_string()))?;
    v8::Local::<v8::Function>::try_from(value)
        .map_err(|_| EngineError::DispatcherMissing(name.to_string()))
}

fn caught(tc: &mut v8::TryCatch<v8::HandleScope>) -> String {
    if tc.has_terminated() {
        return "Script execution was terminated".to_string();
    }
    let diag = format_exception(tc);
    if diag.is_empty() {
        "Script failed without exception details".to_string()
    } else {
        diag
    }
}

/// Compile `code` as a classic script named `name` and run it in the
/// current context. Errors carry the formatted exception.
pub(crate) fn compile_and_run<'s>(
    tc: &mut v8::TryCatch<v8::HandleScope<'s>>,
    code: &[u8],
    name: &str,
) -> Result<v8::Local<'s, v8::Value>, String> {
    let source = v8::String::new_from_utf8(tc, code, v8::NewStringType::Normal)
        .ok_or_else(|| format!("Cannot allocate source of [{}]", name))?;
    let resource = v8::String::new(tc, name)
        .ok_or_else(|| format!("Cannot allocate script name [{}]", name))?;
    let origin = v8::ScriptOrigin::new(
        tc,
        resource.into(),
        0,
        0,
        false,
        0,
        None,
        false,
        false,
        false,
        None,
    );

    let Some(script) = v8::Script::compile(tc, source, Some(&origin)) else {
        return Err(caught(tc));
    };
    match script.run(tc) {
        Some(value) => Ok(value),
        None => Err(caught(tc)),
    }
}
