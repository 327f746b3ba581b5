//! Expression-level evaluation: literals, operators, locals, functions.

use glaze::{ErrorKind, EvalConfig, EvalError, NoImports, Runner};
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
fn literals() {
    assert_eq!(eval("null"), "null");
    assert_eq!(eval("true"), "true");
    assert_eq!(eval("false"), "false");
    assert_eq!(eval("42"), "42");
    assert_eq!(eval("2.5"), "2.5");
    assert_eq!(eval("\"hi\""), "\"hi\"");
}

#[test]
fn arithmetic() {
    assert_eq!(eval("1 + 2 * 3"), "7");
    assert_eq!(eval("(1 + 2) * 3"), "9");
    assert_eq!(eval("10 - 4 / 2"), "8");
    assert_eq!(eval("2.5 + 2.5"), "5");
    assert_eq!(eval("-3 + 1"), "-2");
}

#[test]
fn division_by_zero() {
    let err = eval_err("1 / 0");
    assert_eq!(err.kind(), ErrorKind::Runtime);
    assert_eq!(err.message(), "Division by zero.");
}

#[test]
fn overflow_is_an_error() {
    let err = eval_err("1e308 * 10");
    assert_eq!(err.message(), "Overflow");
}

#[test]
fn huge_literal_is_an_error() {
    let err = eval_err("1e999");
    assert_eq!(err.message(), "Overflow");
}

#[test]
fn modulo() {
    assert_eq!(eval("7 % 3"), "1");
    assert_eq!(eval("-5 % 3"), "-2");
    assert_eq!(eval_err("1 % 0").message(), "Division by zero.");
}

#[test]
fn bitwise_operators() {
    assert_eq!(eval("5 << 2"), "20");
    assert_eq!(eval("20 >> 2"), "5");
    assert_eq!(eval("7 & 3"), "3");
    assert_eq!(eval("5 ^ 3"), "6");
    assert_eq!(eval("4 | 1"), "5");
    assert_eq!(eval("~5"), "-6");
}

#[test]
fn bitwise_requires_safe_integers() {
    let err = eval_err("1e308 | 0");
    assert!(err.message().contains("safe range"), "got: {}", err.message());
}

#[test]
fn comparisons() {
    assert_eq!(eval("1 < 2"), "true");
    assert_eq!(eval("2 <= 2"), "true");
    assert_eq!(eval("3 > 4"), "false");
    assert_eq!(eval("\"abc\" < \"abd\""), "true");
    assert_eq!(eval("\"b\" >= \"a\""), "true");
}

#[test]
fn logical_operators_short_circuit() {
    assert_eq!(eval("false && error \"never\""), "false");
    assert_eq!(eval("true || error \"never\""), "true");
    assert_eq!(eval("true && false"), "false");
    assert_eq!(eval("!true"), "false");
}

#[test]
fn mismatched_operand_types() {
    let err = eval_err("1 + true");
    assert!(
        err.message().contains("requires matching types"),
        "got: {}",
        err.message()
    );
}

#[test]
fn string_concatenation_coerces() {
    assert_eq!(eval("\"n=\" + 4"), "\"n=4\"");
    assert_eq!(eval("4 + \"!\""), "\"4!\"");
    assert_eq!(eval("\"v: \" + [1, 2]"), "\"v: [1, 2]\"");
    assert_eq!(eval("\"is \" + null"), "\"is null\"");
}

#[test]
fn equality() {
    assert_eq!(eval("1 == 1"), "true");
    assert_eq!(eval("1 == 2"), "false");
    assert_eq!(eval("1 != 2"), "true");
    assert_eq!(eval("\"a\" == \"a\""), "true");
    assert_eq!(eval("null == null"), "true");
    assert_eq!(eval("1 == \"1\""), "false");
    assert_eq!(eval("[1, [2]] == [1, [2]]"), "true");
    assert_eq!(eval("[1, 2] == [1]"), "false");
    assert_eq!(eval("{a: 1} == {a: 1}"), "true");
    assert_eq!(eval("{a: 1} == {a: 2}"), "false");
    assert_eq!(eval("(function(x) x) == (function(x) x)"), "false");
}

#[test]
fn equality_is_symmetric() {
    for (a, b) in [("1", "1"), ("1", "\"1\""), ("[1]", "[1, 2]"), ("{a: 1}", "{a: 1}")] {
        assert_eq!(eval(&format!("{a} == {b}")), eval(&format!("{b} == {a}")));
    }
}

#[test]
fn conditionals() {
    assert_eq!(eval("if 1 < 2 then \"yes\" else \"no\""), "\"yes\"");
    assert_eq!(eval("if false then 1"), "null");
    let err = eval_err("if 1 then 2 else 3");
    assert_eq!(err.message(), "If condition must be boolean, got number.");
}

#[test]
fn locals_and_functions() {
    assert_eq!(eval("local x = 2; x * x"), "4");
    assert_eq!(eval("local add(a, b) = a + b; add(1, 2)"), "3");
    assert_eq!(eval("local f = function(x) x + 1; f(41)"), "42");
    assert_eq!(eval("local x = 1, y = x + 1; y"), "2");
}

#[test]
fn locals_are_lazy() {
    assert_eq!(eval("local boom = error \"untouched\"; 7"), "7");
}

#[test]
fn recursion() {
    assert_eq!(
        eval("local fact(n) = if n == 0 then 1 else n * fact(n - 1); fact(10)"),
        "3628800"
    );
}

#[test]
fn mutual_recursion() {
    let source = "
        local is_even(n) = if n == 0 then true else is_odd(n - 1),
              is_odd(n) = if n == 0 then false else is_even(n - 1);
        is_even(10)
    ";
    assert_eq!(eval(source), "true");
}

#[test]
fn tailstrict_supports_deep_recursion() {
    let source = "
        local sum(n, acc) = if n == 0 then acc else sum(n - 1, acc + n) tailstrict;
        sum(10000, 0)
    ";
    assert_eq!(eval(source), "50005000");
}

#[test]
fn deep_recursion_without_tailstrict_exhausts_the_stack() {
    let source = "local f(n) = if n == 0 then 0 else f(n - 1); f(600)";
    let err = eval_err(source);
    assert_eq!(err.message(), "Max stack frames exceeded.");
}

#[test]
fn wrong_argument_count() {
    let err = eval_err("local f(a, b) = a; f(1)");
    assert_eq!(err.message(), "Expected 2 arguments, got 1.");
}

#[test]
fn calling_a_non_function() {
    let err = eval_err("local x = 3; x(1)");
    assert_eq!(err.message(), "Only functions can be called, got number");
}

#[test]
fn arrays_and_indexing() {
    assert_eq!(eval_json("[1, 2, 3]"), json!([1, 2, 3]));
    assert_eq!(eval("[1, 2, 3][1]"), "2");
    assert_eq!(eval("([1] + [2, 3])[2]"), "3");
    assert_eq!(eval("\"abc\"[1]"), "\"b\"");
}

#[test]
fn array_elements_are_lazy() {
    assert_eq!(eval("[error \"no\", 42][1]"), "42");
}

#[test]
fn index_bounds() {
    assert_eq!(
        eval_err("[1, 2][2]").message(),
        "Array bounds error: 2 not within [0, 2)"
    );
    assert_eq!(
        eval_err("[1, 2][-1]").message(),
        "Array bounds error: -1 not within [0, 2)"
    );
    assert_eq!(
        eval_err("\"ab\"[2]").message(),
        "String bounds error: 2 not within [0, 2)"
    );
}

#[test]
fn slices() {
    assert_eq!(eval("\"hello world\"[0:5]"), "\"hello\"");
    assert_eq!(eval("\"abcdef\"[0:6:2]"), "\"ace\"");
    assert_eq!(eval("\"abcdef\"[2:]"), "\"cdef\"");
    assert_eq!(eval("\"abcdef\"[:2]"), "\"ab\"");
    assert_eq!(eval_json("[1, 2, 3, 4, 5][1:4]"), json!([2, 3, 4]));
    assert_eq!(eval_json("[1, 2, 3, 4, 5][::2]"), json!([1, 3, 5]));
}

#[test]
fn array_comprehensions() {
    assert_eq!(
        eval_json("[i * i for i in std.makeArray(5, function(i) i)]"),
        json!([0, 1, 4, 9, 16])
    );
    assert_eq!(
        eval_json("[x for x in [1, 2, 3, 4] if x % 2 == 0]"),
        json!([2, 4])
    );
}

#[test]
fn assert_expressions() {
    assert_eq!(eval("assert 1 == 1; 42"), "42");
    assert_eq!(eval_err("assert 1 == 2; 42").message(), "Assertion failed.");
    assert_eq!(eval_err("assert false : \"nope\"; 1").message(), "nope");
}

#[test]
fn error_expression() {
    let err = eval_err("error \"boom\"");
    assert_eq!(err.message(), "boom");
    assert_eq!(
        eval_err("error 42").message(),
        "Error message must be string, got number."
    );
}

#[test]
fn unary_operator_type_errors() {
    assert_eq!(
        eval_err("!1").message(),
        "Unary operator ! does not operate on numbers."
    );
    assert_eq!(
        eval_err("-true").message(),
        "Unary operator - does not operate on booleans."
    );
}

#[test]
fn reevaluation_is_deterministic() {
    let source = "{a: [1, 2.5, \"x\"], b: {c: 1 / 3}, d: std.makeArray(3, function(i) i)}";
    let runner = Runner::new(source, "test.glz", EvalConfig::default()).unwrap();
    let first = runner.run(&mut NoImports).unwrap();
    let second = runner.run(&mut NoImports).unwrap();
    assert_eq!(first, second);
}
