//! Diagnostics: static errors, runtime traces, and trace cropping.

use glaze::{ErrorKind, EvalConfig, EvalError, NoImports, Runner};

fn eval_err_with(source: &str, config: EvalConfig) -> EvalError {
    let runner = match Runner::new(source, "test.glz", config) {
        Ok(runner) => runner,
        Err(err) => return err,
    };
    runner.run(&mut NoImports).expect_err("expected an error")
}

fn eval_err(source: &str) -> EvalError {
    eval_err_with(source, EvalConfig::default())
}

#[test]
fn static_errors_have_locations() {
    let err = eval_err("local x = 1; y");
    assert_eq!(err.kind(), ErrorKind::Static);
    assert_eq!(err.message(), "Unknown variable: y");
    let rendered = err.to_string();
    assert!(rendered.starts_with("STATIC ERROR: test.glz:1:14"), "got: {rendered}");
}

#[test]
fn self_outside_an_object() {
    let err = eval_err("self.x");
    assert_eq!(err.kind(), ErrorKind::Static);
    assert_eq!(err.message(), "Can't use self outside of an object.");
}

#[test]
fn duplicate_function_parameter() {
    let err = eval_err("local f(a, a) = a; f(1, 2)");
    assert_eq!(err.message(), "Duplicate function parameter: a");
}

#[test]
fn duplicate_local() {
    let err = eval_err("local a = 1, a = 2; a");
    assert_eq!(err.message(), "Duplicate local var: a");
}

#[test]
fn self_referential_local_is_static() {
    let err = eval_err("local x = x; x");
    assert_eq!(err.kind(), ErrorKind::Static);
    assert_eq!(err.message(), "Unbound variable: x");
}

#[test]
fn self_referential_cycle_through_two_locals() {
    let err = eval_err("local a = b, b = a; a");
    assert_eq!(err.kind(), ErrorKind::Static);
    assert!(err.message().starts_with("Unbound variable:"), "got: {}", err.message());
}

#[test]
fn guarded_self_reference_is_fine() {
    // References behind a function are what make recursion work.
    let runner = Runner::new(
        "local f = function(n) if n == 0 then 1 else f(n - 1); f(3)",
        "test.glz",
        EvalConfig::default(),
    )
    .unwrap();
    assert_eq!(runner.run(&mut NoImports).unwrap(), "1");
}

#[test]
fn unterminated_string_is_static() {
    let err = eval_err("\"abc");
    assert_eq!(err.kind(), ErrorKind::Static);
    assert!(err.message().contains("Unterminated string"), "got: {}", err.message());
}

#[test]
fn computed_import_is_static() {
    let err = eval_err("import (\"a\" + \".glz\")");
    assert_eq!(err.message(), "Computed imports are not allowed.");
}

#[test]
fn runtime_errors_render_a_trace() {
    let err = eval_err("local f(x) = error \"boom\"; f(1)");
    assert_eq!(err.kind(), ErrorKind::Runtime);
    let rendered = err.to_string();
    assert!(rendered.starts_with("RUNTIME ERROR: boom\n"), "got: {rendered}");
    assert!(rendered.contains("test.glz:1:14"), "got: {rendered}");
    assert!(rendered.contains("function <f>"), "got: {rendered}");
}

#[test]
fn trace_is_most_recent_first() {
    let err = eval_err("local inner() = error \"x\", outer() = inner(); outer()");
    let trace = err.trace();
    assert!(trace.len() >= 3);
    // The first frame is the raise site inside `inner`.
    assert_eq!(trace[0].location.begin.line, 1);
}

#[test]
fn long_traces_are_cropped_in_the_middle() {
    let config = EvalConfig {
        max_trace: 4,
        ..EvalConfig::default()
    };
    let err = eval_err_with(
        "local f(n) = if n == 0 then error \"deep\" else f(n - 1); f(30)",
        config,
    );
    let rendered = err.to_string();
    assert!(rendered.contains("\t...\n"), "got: {rendered}");
    // Header, two head frames, the ellipsis, two tail frames.
    assert_eq!(rendered.lines().count(), 6, "got: {rendered}");
    assert!(err.trace().len() > 4);
}

#[test]
fn zero_max_trace_means_unlimited() {
    let config = EvalConfig {
        max_trace: 0,
        ..EvalConfig::default()
    };
    let err = eval_err_with(
        "local f(n) = if n == 0 then error \"deep\" else f(n - 1); f(30)",
        config,
    );
    assert!(!err.to_string().contains("\t...\n"));
}

#[test]
fn stack_limit_is_configurable() {
    let config = EvalConfig {
        max_stack: 10,
        ..EvalConfig::default()
    };
    let err = eval_err_with("local f(n) = if n == 0 then 0 else f(n - 1); f(50)", config);
    assert_eq!(err.message(), "Max stack frames exceeded.");
}

#[test]
fn anonymous_functions_in_traces() {
    let err = eval_err("(function(x) error \"anon\")(1)");
    assert!(err.to_string().contains("anonymous"), "got: {err}");
}
