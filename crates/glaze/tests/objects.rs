//! Object semantics: self, super, inheritance, visibility, comprehensions.

use glaze::{EvalConfig, EvalError, NoImports, Runner};
use pretty_assertions::assert_eq;
use serde_json::json;

fn eval(source: &str) -> String {
    Runner::new(source, "test.glz", EvalConfig::default())
        .unwrap()
        .run(&mut NoImports)
        .unwrap()
}

fn eval_json(source: &str) -> serde_json::Value {
    serde_json::from_str(&eval(source)).expect("output should be valid JSON")
}

fn eval_err(source: &str) -> EvalError {
    let runner = match Runner::new(source, "test.glz", EvalConfig::default()) {
        Ok(runner) => runner,
        Err(err) => return err,
    };
    runner.run(&mut NoImports).expect_err("expected an error")
}

#[test]
fn self_reference() {
    assert_eq!(eval_json("{x: 1, y: self.x + 1}"), json!({"x": 1, "y": 2}));
}

#[test]
fn super_resolves_past_the_override() {
    assert_eq!(
        eval_json("{a: 1} + {a: 2, b: super.a}"),
        json!({"a": 2, "b": 1})
    );
}

#[test]
fn self_is_late_bound_through_extension() {
    // In the composed object, self.x resolves to the overriding field.
    assert_eq!(
        eval_json("({x: 1, y: self.x} + {x: 10}).y"),
        json!(10)
    );
}

#[test]
fn super_chains_across_three_levels() {
    let source = "{a: 1} + {a: super.a + 1} + {a: super.a + 1}";
    assert_eq!(eval_json(source), json!({"a": 3}));
}

#[test]
fn brace_application_is_extension() {
    assert_eq!(
        eval_json("local base = {retries: 3}; base {retries: 5}"),
        json!({"retries": 5})
    );
}

#[test]
fn plus_colon_merges_with_super() {
    assert_eq!(
        eval_json("{a: {x: 1}} + {a+: {y: 2}}"),
        json!({"a": {"x": 1, "y": 2}})
    );
    assert_eq!(eval_json("{n: 1} + {n+: 10}"), json!({"n": 11}));
}

#[test]
fn field_order_is_alphabetical() {
    assert_eq!(
        eval("{b: 1, a: 2, c: 3}"),
        "{\n   \"a\": 2,\n   \"b\": 1,\n   \"c\": 3\n}"
    );
}

#[test]
fn empty_object_and_array_render_with_a_space() {
    assert_eq!(eval("{}"), "{ }");
    assert_eq!(eval("[]"), "[ ]");
}

#[test]
fn hidden_fields_do_not_manifest() {
    assert_eq!(eval_json("{a:: 1, b: 2}"), json!({"b": 2}));
    // Hidden fields are still reachable by indexing.
    assert_eq!(eval("{a:: 41}.a + 1"), "42");
}

#[test]
fn hidden_stays_hidden_under_inherit_override() {
    assert_eq!(eval("{x:: 1} + {x: 2}"), "{ }");
    assert_eq!(eval("({x:: 1} + {x: 2}).x"), "2");
    // A ::: override forces the field into the output.
    assert_eq!(eval_json("{x:: 1} + {x::: 2}"), json!({"x": 2}));
}

#[test]
fn object_has_and_fields_skip_hidden() {
    assert_eq!(eval("std.objectHas({a:: 1, b: 2}, \"a\")"), "false");
    assert_eq!(eval("std.objectHas({a:: 1, b: 2}, \"b\")"), "true");
    assert_eq!(eval_json("std.objectFields({b: 1, a:: 2, c: 3})"), json!(["b", "c"]));
}

#[test]
fn field_does_not_exist() {
    assert_eq!(eval_err("{a: 1}.b").message(), "Field does not exist: b");
}

#[test]
fn computed_field_names() {
    assert_eq!(
        eval_json("local k = \"key\"; {[k + \"1\"]: 1}"),
        json!({"key1": 1})
    );
    // A null computed name omits the field.
    assert_eq!(eval_json("{[null]: 1, a: 2}"), json!({"a": 2}));
}

#[test]
fn duplicate_literal_fields_are_static_errors() {
    let err = eval_err("{a: 1, a: 2}");
    assert!(err.message().contains("Duplicate field"), "got: {}", err.message());
}

#[test]
fn duplicate_computed_fields_are_runtime_errors() {
    let err = eval_err("local k = \"a\"; {[k]: 1, [\"a\"]: 2}");
    assert_eq!(err.message(), "Duplicate field name: \"a\"");
}

#[test]
fn object_comprehension_manifests_sorted() {
    assert_eq!(
        eval("{[k]: k for k in [\"b\", \"a\", \"c\"]}"),
        "{\n   \"a\": \"a\",\n   \"b\": \"b\",\n   \"c\": \"c\"\n}"
    );
}

#[test]
fn object_comprehension_binds_the_loop_variable() {
    assert_eq!(
        eval_json("{[\"k\" + x]: x * 10 for x in [1, 2]}"),
        json!({"k1": 10, "k2": 20})
    );
}

#[test]
fn object_comprehension_duplicate_keys() {
    let err = eval_err("{[k]: 1 for k in [\"a\", \"a\"]}");
    assert_eq!(err.message(), "Duplicate field name: \"a\"");
}

#[test]
fn object_comprehension_supports_locals() {
    assert_eq!(
        eval_json("{local double = 2, [k]: double for k in [\"a\"]}"),
        json!({"a": 2})
    );
}

#[test]
fn object_level_locals() {
    assert_eq!(
        eval_json("{local two = 2, a: two, b: two + 1}"),
        json!({"a": 2, "b": 3})
    );
}

#[test]
fn dollar_refers_to_the_outermost_object() {
    assert_eq!(
        eval_json("{a: 1, b: {c: $.a + 10}}"),
        json!({"a": 1, "b": {"c": 11}})
    );
}

#[test]
fn methods() {
    assert_eq!(
        eval_json("{double(x):: x * 2, a: self.double(21)}"),
        json!({"a": 42})
    );
}

#[test]
fn functions_cannot_manifest() {
    let err = eval_err("{f: function(x) x}");
    assert_eq!(err.message(), "Couldn't manifest function in JSON output.");
}

#[test]
fn super_without_a_base_is_an_error() {
    let err = eval_err("{a: super.x}.a");
    assert_eq!(
        err.message(),
        "Attempt to use super when there is no super class."
    );
}

#[test]
fn super_outside_an_object_is_static() {
    let err = eval_err("super.x");
    assert_eq!(err.message(), "Can't use super outside of an object.");
}

#[test]
fn object_asserts_run_at_manifestation() {
    assert_eq!(
        eval_json("{assert self.x > 0, x: 1}"),
        json!({"x": 1})
    );
    let err = eval_err("{assert self.x > 0 : \"x must be positive\", x: -1}");
    assert_eq!(err.message(), "x must be positive");
    let err = eval_err("{assert self.x > 0, x: -1}");
    assert_eq!(err.message(), "Object assertion failed.");
}

#[test]
fn asserts_see_the_composed_object() {
    // The assertion lives in the base but checks the overridden value.
    let err = eval_err("{assert self.x < 10, x: 1} + {x: 12}");
    assert_eq!(err.message(), "Object assertion failed.");
}

#[test]
fn object_equality_ignores_hidden_fields() {
    assert_eq!(eval("{a:: 1} == {}"), "true");
    assert_eq!(eval("{a: 1, b:: 0} == {a: 1}"), "true");
}

#[test]
fn extended_object_equality() {
    assert_eq!(eval("({a: 1} + {b: 2}) == {a: 1, b: 2}"), "true");
}

#[test]
fn length_counts_visible_fields() {
    assert_eq!(eval("std.length({a: 1, b:: 2, c: 3})"), "2");
}
