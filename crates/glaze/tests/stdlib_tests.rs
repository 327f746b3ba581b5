//! Coverage for the standard library: native builtins and std.glz functions.

use glaze::{EvalConfig, EvalError, ExtVar, NoImports, Runner};
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
fn type_names() {
    assert_eq!(eval("std.type(null)"), "\"null\"");
    assert_eq!(eval("std.type(true)"), "\"boolean\"");
    assert_eq!(eval("std.type(1)"), "\"number\"");
    assert_eq!(eval("std.type(\"s\")"), "\"string\"");
    assert_eq!(eval("std.type([])"), "\"array\"");
    assert_eq!(eval("std.type({})"), "\"object\"");
    assert_eq!(eval("std.type(function(x) x)"), "\"function\"");
}

#[test]
fn length() {
    assert_eq!(eval("std.length(\"héllo\")"), "5");
    assert_eq!(eval("std.length([1, 2, 3])"), "3");
    assert_eq!(eval("std.length({a: 1, b: 2})"), "2");
    assert_eq!(eval("std.length(function(a, b) a)"), "2");
    assert!(eval_err("std.length(3)").message().contains("length operates on"));
}

#[test]
fn make_array() {
    assert_eq!(eval_json("std.makeArray(3, function(i) i * 2)"), json!([0, 2, 4]));
    assert_eq!(eval("std.makeArray(0, function(i) i)"), "[ ]");
    assert!(
        eval_err("std.makeArray(-1, function(i) i)")
            .message()
            .contains("requires size >= 0")
    );
}

#[test]
fn filter() {
    assert_eq!(
        eval_json("std.filter(function(x) x > 2, [1, 2, 3, 4])"),
        json!([3, 4])
    );
    assert_eq!(eval("std.filter(function(x) false, [1, 2])"), "[ ]");
    assert!(
        eval_err("std.filter(function(x) 1, [1])")
            .message()
            .contains("must return boolean")
    );
}

#[test]
fn map_and_filter_map() {
    assert_eq!(eval_json("std.map(function(x) x + 1, [1, 2])"), json!([2, 3]));
    assert_eq!(
        eval_json("std.filterMap(function(x) x > 1, function(x) x * 10, [1, 2, 3])"),
        json!([20, 30])
    );
}

#[test]
fn folds() {
    assert_eq!(
        eval("std.foldl(function(acc, x) acc + x, std.range(1, 100), 0)"),
        "5050"
    );
    assert_eq!(
        eval("std.foldr(function(x, acc) acc + x, [\"a\", \"b\", \"c\"], \"\")"),
        "\"cba\""
    );
}

#[test]
fn range() {
    assert_eq!(eval_json("std.range(2, 5)"), json!([2, 3, 4, 5]));
    assert_eq!(eval("std.range(1, 0)"), "[ ]");
}

#[test]
fn join_and_lines() {
    assert_eq!(eval("std.join(\", \", [\"a\", \"b\"])"), "\"a, b\"");
    assert_eq!(eval("std.join(\"-\", [\"x\"])"), "\"x\"");
    assert_eq!(eval("std.join(\"-\", [])"), "\"\"");
    assert_eq!(eval_json("std.join([0], [[1], [2]])"), json!([1, 0, 2]));
    assert_eq!(eval("std.lines([\"a\", \"b\"])"), "\"a\\nb\\n\"");
}

#[test]
fn numeric_helpers() {
    assert_eq!(eval("std.abs(-3)"), "3");
    assert_eq!(eval("std.max(2, 7)"), "7");
    assert_eq!(eval("std.min(2, 7)"), "2");
    assert_eq!(eval("std.clamp(10, 0, 5)"), "5");
    assert_eq!(eval("std.clamp(-1, 0, 5)"), "0");
    assert_eq!(eval("std.clamp(3, 0, 5)"), "3");
}

#[test]
fn math_builtins() {
    assert_eq!(eval("std.floor(2.7)"), "2");
    assert_eq!(eval("std.ceil(2.1)"), "3");
    assert_eq!(eval("std.sqrt(16)"), "4");
    assert_eq!(eval("std.pow(2, 10)"), "1024");
    assert_eq!(eval("std.exp(0)"), "1");
    assert_eq!(eval("std.log(1)"), "0");
    assert_eq!(eval("std.sin(0)"), "0");
    assert_eq!(eval("std.cos(0)"), "1");
    assert!(eval_err("std.sqrt(-1)").message() == "Not a number");
    assert!(eval_err("std.log(0)").message() == "Overflow");
}

#[test]
fn mantissa_and_exponent() {
    assert_eq!(eval("std.mantissa(8)"), "0.5");
    assert_eq!(eval("std.exponent(8)"), "4");
    assert_eq!(eval("std.mantissa(1) * std.pow(2, std.exponent(1))"), "1");
}

#[test]
fn modulo_builtin() {
    assert_eq!(eval("std.modulo(10, 3)"), "1");
    assert_eq!(eval_err("std.modulo(1, 0)").message(), "Division by zero.");
}

#[test]
fn char_and_codepoint() {
    assert_eq!(eval("std.char(65)"), "\"A\"");
    assert_eq!(eval("std.char(960)"), "\"π\"");
    assert_eq!(eval("std.codepoint(\"A\")"), "65");
    assert_eq!(eval("std.codepoint(\"π\")"), "960");
    assert!(eval_err("std.char(-1)").message().contains("must be >= 0"));
    assert!(eval_err("std.char(1114112)").message().contains("Invalid unicode"));
    assert!(
        eval_err("std.codepoint(\"ab\")")
            .message()
            .contains("string of length 1")
    );
}

#[test]
fn to_string() {
    assert_eq!(eval("std.toString(1)"), "\"1\"");
    assert_eq!(eval("std.toString(\"s\")"), "\"s\"");
    assert_eq!(eval("std.toString([1, 2])"), "\"[1, 2]\"");
    assert_eq!(eval("std.toString({a: 1})"), "\"{\\\"a\\\": 1}\"");
}

#[test]
fn substr() {
    assert_eq!(eval("std.substr(\"hello world\", 6, 5)"), "\"world\"");
    assert_eq!(eval("std.substr(\"abc\", 1, 10)"), "\"bc\"");
}

#[test]
fn slice_builtin() {
    assert_eq!(eval("std.slice(\"abcdef\", 1, 4, null)"), "\"bcd\"");
    assert_eq!(eval_json("std.slice([1, 2, 3, 4], 0, null, 2)"), json!([1, 3]));
    assert!(eval_err("std.slice([1], 0, 1, 0)").message().contains("step must be >= 1"));
}

#[test]
fn percent_formats_strings() {
    assert_eq!(eval("\"x=%d!\" % 5"), "\"x=5!\"");
    assert_eq!(eval("\"%s-%s\" % [\"a\", \"b\"]"), "\"a-b\"");
    assert_eq!(eval("\"%(who)s!\" % {who: \"world\"}"), "\"world!\"");
    assert_eq!(eval("\"%05.2f\" % 3.14159"), "\"03.14\"");
    assert_eq!(eval("\"%x\" % 255"), "\"ff\"");
    assert_eq!(eval("\"%-4d|\" % 7"), "\"7   |\"");
    assert_eq!(eval("\"%+d\" % 7"), "\"+7\"");
    assert_eq!(eval("\"100%%\""), "\"100%%\"");
    assert_eq!(eval("\"100%%\" % []"), "\"100%\"");
    assert_eq!(eval("\"%e\" % 250"), "\"2.500000e+02\"");
    assert_eq!(eval("\"%g\" % 1250"), "\"1250\"");
    assert_eq!(eval("\"%g\" % 0.25"), "\"0.25\"");
    assert_eq!(eval("\"%s\" % [[1, 2]]"), "\"[1, 2]\"");
}

#[test]
fn percent_format_errors() {
    assert_eq!(eval_err("\"%d\" % []").message(), "Not enough values to format.");
    assert!(
        eval_err("\"%d\" % [1, 2]")
            .message()
            .contains("Too many values to format")
    );
    assert!(
        eval_err("\"%d\" % \"x\"")
            .message()
            .contains("expected number")
    );
}

#[test]
fn percent_on_numbers_is_modulo() {
    assert_eq!(eval("10 % 4"), "2");
}

#[test]
fn ext_var_strings() {
    let mut runner = Runner::new(
        "std.extVar(\"env\") + \"!\"",
        "test.glz",
        EvalConfig::default(),
    )
    .unwrap();
    runner.add_ext_var("env", ExtVar::Str("prod".to_string()));
    assert_eq!(runner.run(&mut NoImports).unwrap(), "\"prod!\"");
}

#[test]
fn ext_var_code() {
    let mut runner = Runner::new(
        "std.extVar(\"n\") * 2",
        "test.glz",
        EvalConfig::default(),
    )
    .unwrap();
    runner.add_ext_var("n", ExtVar::Code("3 + 4".to_string()));
    assert_eq!(runner.run(&mut NoImports).unwrap(), "14");
}

#[test]
fn ext_var_code_can_use_std() {
    let mut runner = Runner::new(
        "std.length(std.extVar(\"xs\"))",
        "test.glz",
        EvalConfig::default(),
    )
    .unwrap();
    runner.add_ext_var("xs", ExtVar::Code("std.makeArray(4, function(i) i)".to_string()));
    assert_eq!(runner.run(&mut NoImports).unwrap(), "4");
}

#[test]
fn undefined_ext_var() {
    assert_eq!(
        eval_err("std.extVar(\"nope\")").message(),
        "Undefined external variable: nope"
    );
}

#[test]
fn assert_equal() {
    assert_eq!(eval("std.assertEqual(2 + 2, 4)"), "true");
    assert_eq!(
        eval_err("std.assertEqual(1, 2)").message(),
        "Assertion failed. 1 != 2"
    );
}

#[test]
fn builtin_argument_type_errors() {
    let err = eval_err("std.pow(\"a\", 2)");
    assert_eq!(
        err.message(),
        "Builtin function pow expected (number, number) but got (string, number)"
    );
}
