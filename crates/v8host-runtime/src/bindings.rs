//! Global functions installed into every engine context.
//!
//! - `print(value?)` writes a line to stdout
//! - `load(path)` evaluates another script in the same context
//! - `call_host(name, input)` runs a named host operation
//!
//! Each binding does its work in a `*_impl` function returning
//! `Result<_, BindingError>`; the V8 callback turns an `Err` into a script
//! exception so scripts can catch it.

use std::io::Write;

use deno_core::v8;

use crate::bridge;
use crate::engine::compile_and_run;
use crate::error::{BindingError, EngineError};
use crate::services::HostServices;
use crate::trace::throw_script_exception;

/// Add the host functions to a global object template.
pub(crate) fn install(
    scope: &mut v8::HandleScope<()>,
    global: v8::Local<v8::ObjectTemplate>,
) -> Result<(), EngineError> {
    set_function(scope, global, "print", print)?;
    set_function(scope, global, "load", load)?;
    set_function(scope, global, "call_host", call_host)?;
    Ok(())
}

fn set_function(
    scope: &mut v8::HandleScope<()>,
    template: v8::Local<v8::ObjectTemplate>,
    name: &str,
    callback: impl v8::MapFnTo<v8::FunctionCallback>,
) -> Result<(), EngineError> {
    let key = v8::String::new(scope, name)
        .ok_or_else(|| EngineError::Construction(format!("cannot allocate name '{}'", name)))?;
    let function = v8::FunctionTemplate::new(scope, callback);
    template.set(key.into(), function.into());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// print
// ─────────────────────────────────────────────────────────────────────────────

fn print(scope: &mut v8::HandleScope, args: v8::FunctionCallbackArguments, _rv: v8::ReturnValue) {
    let line = if args.length() > 0 {
        // Exceptions from toString() are swallowed when tc goes out of scope.
        let tc = &mut v8::TryCatch::new(scope);
        args.get(0)
            .to_string(tc)
            .map(|s| s.to_rust_string_lossy(tc))
            .unwrap_or_default()
    } else {
        String::new()
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
        tracing::debug!("[print] stdout write failed: {}", e);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// load
// ─────────────────────────────────────────────────────────────────────────────

fn load(scope: &mut v8::HandleScope, args: v8::FunctionCallbackArguments, _rv: v8::ReturnValue) {
    if let Err(e) = load_impl(scope, &args) {
        throw_script_exception(scope, &e.to_string());
    }
}

fn load_impl(
    scope: &mut v8::HandleScope,
    args: &v8::FunctionCallbackArguments,
) -> Result<(), BindingError> {
    let path = string_arg(scope, args, 0, "path")?;
    let services = attached_services(scope)?;

    let code = services.loader.load(&path).map_err(|e| BindingError::Load {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    let name = services.loader.short_path(&path);
    tracing::debug!("[load] Evaluating {} ({} bytes)", name, code.len());

    let tc = &mut v8::TryCatch::new(scope);
    compile_and_run(tc, &code, &name)
        .map(|_| ())
        .map_err(|reason| BindingError::Load { path, reason })
}

// ─────────────────────────────────────────────────────────────────────────────
// call_host
// ─────────────────────────────────────────────────────────────────────────────

fn call_host(
    scope: &mut v8::HandleScope,
    args: v8::FunctionCallbackArguments,
    mut rv: v8::ReturnValue,
) {
    match call_host_impl(scope, &args) {
        Ok(Some(output)) => match bridge::bytes_to_v8(scope, &output) {
            Ok(text) => rv.set(text.into()),
            Err(e) => throw_script_exception(scope, &e.to_string()),
        },
        Ok(None) => rv.set_null(),
        Err(e) => throw_script_exception(scope, &e.to_string()),
    }
}

fn call_host_impl(
    scope: &mut v8::HandleScope,
    args: &v8::FunctionCallbackArguments,
) -> Result<Option<Vec<u8>>, BindingError> {
    if args.length() != 2 {
        return Err(BindingError::InvalidArguments(format!(
            "call_host expects 2 string arguments (name, input), got {}",
            args.length()
        )));
    }
    let name = string_arg(scope, args, 0, "name")?;
    let input = string_arg(scope, args, 1, "input")?;
    let services = attached_services(scope)?;

    tracing::debug!("[call_host] {} ({} bytes)", name, input.len());
    services
        .dispatcher
        .dispatch(&name, input.as_bytes())
        .map_err(|e| BindingError::HostCall {
            name,
            reason: e.to_string(),
        })
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn string_arg(
    scope: &mut v8::HandleScope,
    args: &v8::FunctionCallbackArguments,
    index: i32,
    what: &str,
) -> Result<String, BindingError> {
    let value = args.get(index);
    if !value.is_string() {
        return Err(BindingError::InvalidArguments(format!(
            "argument {} ({}) must be a string",
            index, what
        )));
    }
    Ok(value.to_rust_string_lossy(scope))
}

fn attached_services(scope: &mut v8::HandleScope) -> Result<HostServices, BindingError> {
    scope
        .get_slot::<HostServices>()
        .cloned()
        .ok_or(BindingError::ServicesMissing)
}
