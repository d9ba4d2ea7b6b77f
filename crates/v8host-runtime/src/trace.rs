//! Diagnostics for script exceptions.
//!
//! Exceptions caught on the native side become a single filtered stack trace
//! string; native failures raised while a script is running go back into the
//! script as ordinary `Error` objects.

use deno_core::v8;

/// Source files of the module loader evaluated by the bootstrap script.
/// Their frames are noise in user-facing diagnostics.
pub const LOADER_SOURCES: [&str; 2] = ["requirejs/require.js", "requirejs-bootstrap.js"];

/// Drop blank and loader frames from a stack trace.
pub fn filter_stack_trace(trace: &str) -> String {
    let mut out = String::with_capacity(trace.len());
    for line in trace.lines() {
        if line.chars().count() > 1 && !LOADER_SOURCES.iter().any(|src| line.contains(src)) {
            out.push_str(line);
            out.push('\n');
        }
    }
    if out.ends_with('\n') {
        out.pop();
    }
    out
}

/// Render the exception held by `tc` as a filtered diagnostic.
///
/// Falls back to the exception text and its source location when V8 has no
/// stack for it (syntax errors, thrown primitives).
pub fn format_exception(tc: &mut v8::TryCatch<v8::HandleScope>) -> String {
    let stack = tc
        .stack_trace()
        .filter(|s| !s.is_null_or_undefined())
        .map(|s| s.to_rust_string_lossy(tc))
        .unwrap_or_default();

    if !stack.is_empty() {
        return filter_stack_trace(&stack);
    }

    let mut text = tc
        .exception()
        .map(|e| e.to_rust_string_lossy(tc))
        .unwrap_or_default();

    if let Some(message) = tc.message() {
        let resource = message
            .get_script_resource_name(tc)
            .filter(|r| !r.is_null_or_undefined())
            .map(|r| r.to_rust_string_lossy(tc));
        if let Some(resource) = resource {
            let line = message.get_line_number(tc).unwrap_or(0);
            text.push_str(&format!("\n    at {}:{}", resource, line));
        }
    }

    filter_stack_trace(&text)
}

/// Throw `message` into the running script as `Error{message, stack: ""}`.
///
/// If the error object cannot be built the raw message string is thrown
/// instead. Never fails.
pub fn throw_script_exception(scope: &mut v8::HandleScope, message: &str) {
    let Some(text) = v8::String::new(scope, message) else {
        let undefined = v8::undefined(scope);
        scope.throw_exception(undefined.into());
        return;
    };
    match build_error(scope, text) {
        Some(error) => scope.throw_exception(error),
        None => scope.throw_exception(text.into()),
    };
}

fn build_error<'s>(
    scope: &mut v8::HandleScope<'s>,
    message: v8::Local<'s, v8::String>,
) -> Option<v8::Local<'s, v8::Value>> {
    let error = v8::Exception::error(scope, message);
    let object = error.to_object(scope)?;
    let key = v8::String::new(scope, "stack")?;
    let empty = v8::String::empty(scope);
    object.set(scope, key.into(), empty.into())?;
    Some(error)
}
