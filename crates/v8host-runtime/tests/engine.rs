mod common;

use serde_json::json;
use v8host_runtime::{EngineError, LOADER_SOURCES};

use common::{ECHO_BOOTSTRAP, engine, text};

#[test]
fn test_echo_dispatcher_returns_request() {
    let mut engine = engine(ECHO_BOOTSTRAP);
    let out = engine.invoke(b"\"ping\"").unwrap();
    assert_eq!(text(out), "\"ping\"");
}

#[test]
fn test_dispatcher_parses_json_requests() {
    let mut engine = engine(
        r#"
        function __dispatch(request) {
            var req = JSON.parse(request);
            return JSON.stringify({ sum: req.a + req.b, unicode: "é中" });
        }
        "#,
    );
    let out = text(engine.invoke(br#"{"a": 1, "b": 2}"#).unwrap());
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value["sum"].as_f64(), Some(3.0));
    assert_eq!(value["unicode"], "é中");
}

#[test]
fn test_non_string_results_are_absent() {
    let mut engine = engine(
        r#"
        function __dispatch(request) {
            if (request === "number") return 42;
            if (request === "null") return null;
            if (request === "object") return { a: 1 };
            return undefined;
        }
        "#,
    );
    for request in ["number", "null", "object", "undefined"] {
        assert_eq!(engine.invoke(request.as_bytes()).unwrap(), None, "{}", request);
    }
}

#[test]
fn test_state_persists_between_invocations() {
    let mut engine =
        engine("var count = 0; function __dispatch() { count++; return String(count); }");
    assert_eq!(text(engine.invoke(b"").unwrap()), "1");
    assert_eq!(text(engine.invoke(b"").unwrap()), "2");
    assert_eq!(text(engine.invoke(b"").unwrap()), "3");
    assert_eq!(engine.invocations(), 3);
}

#[test]
fn test_missing_dispatcher() {
    let mut engine = engine("var notTheDispatcher = 1;");
    let err = engine.invoke(b"x").unwrap_err();
    assert!(matches!(err, EngineError::DispatcherMissing(_)));
    let message = err.to_string();
    assert!(message.contains("__dispatch"));
    assert!(message.contains("not a function"));
}

#[test]
fn test_non_function_dispatcher() {
    let mut engine = engine("var __dispatch = 5;");
    assert!(matches!(
        engine.invoke(b"x"),
        Err(EngineError::DispatcherMissing(_))
    ));
}

#[test]
fn test_throwing_bootstrap_fails_construction() {
    common::init_platform();
    let bootstrap = r#"
        eval("function boot() {\n  throw new Error('boot failed');\n}\n" +
             "//# sourceURL=requirejs/require.js");
        boot();
    "#;
    let err = match v8host_runtime::Engine::new(bootstrap.as_bytes(), Default::default()) {
        Ok(_) => panic!("bootstrap should fail"),
        Err(e) => e,
    };
    assert!(matches!(err, EngineError::Construction(_)));

    let message = err.to_string();
    assert!(message.contains("Bootstrap script failed"));
    assert!(message.contains("boot failed"));
    assert!(message.contains("bootstrap script"));
    for line in message.lines() {
        assert!(
            !LOADER_SOURCES.iter().any(|src| line.contains(src)),
            "loader frame leaked: {}",
            line
        );
    }
}

#[test]
fn test_syntax_error_in_bootstrap() {
    common::init_platform();
    let err = match v8host_runtime::Engine::new(b"function (", Default::default()) {
        Ok(_) => panic!("bootstrap should fail"),
        Err(e) => e,
    };
    let message = err.to_string();
    assert!(message.contains("SyntaxError"), "{}", message);
}

#[test]
fn test_dispatcher_exception_keeps_engine_usable() {
    let mut engine = engine(
        r#"
        function __dispatch(request) {
            if (request === "bad") throw new Error("bad request");
            return "ok:" + request;
        }
        "#,
    );

    let err = engine.invoke(b"bad").unwrap_err();
    assert!(matches!(err, EngineError::Invocation(_)));
    assert!(err.to_string().contains("bad request"));

    assert_eq!(text(engine.invoke(b"good").unwrap()), "ok:good");
}

#[test]
fn test_thrown_primitive_is_reported() {
    let mut engine = engine("function __dispatch() { throw 'plain string'; }");
    let err = engine.invoke(b"").unwrap_err();
    assert!(err.to_string().contains("plain string"));
}

#[test]
fn test_collect_garbage_keeps_results() {
    let mut engine = engine(
        r#"
        var cache = {};
        function __dispatch(request) {
            for (var i = 0; i < 1000; i++) { var garbage = { index: i, text: "x" + i }; }
            cache[request] = (cache[request] || 0) + 1;
            return request + ":" + cache[request];
        }
        "#,
    );
    assert_eq!(text(engine.invoke(b"a").unwrap()), "a:1");
    engine.collect_garbage();
    engine.collect_garbage();
    assert_eq!(text(engine.invoke(b"a").unwrap()), "a:2");
    assert_eq!(text(engine.invoke(b"b").unwrap()), "b:1");
}

#[test]
fn test_collect_garbage_on_fresh_engine() {
    let mut engine = engine(ECHO_BOOTSTRAP);
    engine.collect_garbage();
    assert_eq!(text(engine.invoke(b"x").unwrap()), "x");
}

#[test]
fn test_drop_after_zero_one_and_many_invocations() {
    drop(engine(ECHO_BOOTSTRAP));

    let mut once = engine(ECHO_BOOTSTRAP);
    once.invoke(b"1").unwrap();
    drop(once);

    let mut many = engine(ECHO_BOOTSTRAP);
    for i in 0..100 {
        let request = i.to_string();
        assert_eq!(text(many.invoke(request.as_bytes()).unwrap()), request);
    }
    assert_eq!(many.invocations(), 100);
    drop(many);
}

#[test]
fn test_evaluate_returns_json() {
    let mut engine = engine("var base = 10;");
    let number = engine.evaluate("calc", b"base + 5").unwrap();
    assert_eq!(number.as_f64(), Some(15.0));

    let object = engine
        .evaluate("object", b"({ name: 'x', items: [1, true, null] })")
        .unwrap();
    assert_eq!(object["name"], "x");
    assert_eq!(object["items"][1], true);
    assert!(object["items"][2].is_null());

    assert!(engine.evaluate("nothing", b"undefined").unwrap().is_null());
}

#[test]
fn test_evaluate_error() {
    let mut engine = engine("");
    let err = engine
        .evaluate("broken.js", b"null.property")
        .unwrap_err();
    assert!(matches!(err, EngineError::Evaluation(_)));
    assert!(err.to_string().contains("TypeError"));
}

#[test]
fn test_call_function_with_json_arguments() {
    let mut engine = engine(
        r#"
        function add(a, b) { return a + b; }
        function describe(person) {
            return { greeting: "hi " + person.name, tags: person.tags.length };
        }
        "#,
    );

    let sum = engine.call_function("add", &[json!(2), json!(3)]).unwrap();
    assert_eq!(sum.as_f64(), Some(5.0));

    let described = engine
        .call_function("describe", &[json!({ "name": "ada", "tags": ["a", "b"] })])
        .unwrap();
    assert_eq!(described["greeting"], "hi ada");
    assert_eq!(described["tags"].as_f64(), Some(2.0));

    assert!(matches!(
        engine.call_function("missing", &[]),
        Err(EngineError::DispatcherMissing(_))
    ));
}
