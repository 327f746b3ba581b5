//! Output modes (string, multi, stream), formatting details, and the
//! tracer/GC observability hooks.

use glaze::{EvalConfig, NoImports, RecordingTracer, Runner};
use pretty_assertions::assert_eq;

fn config() -> EvalConfig {
    EvalConfig::default()
}

#[test]
fn pretty_json_uses_three_space_indent() {
    let runner = Runner::new("{a: [1, {b: 2}]}", "test.glz", config()).unwrap();
    let out = runner.run(&mut NoImports).unwrap();
    assert_eq!(
        out,
        "{\n   \"a\": [\n      1,\n      {\n         \"b\": 2\n      }\n   ]\n}"
    );
}

#[test]
fn strings_escape_control_characters() {
    let runner = Runner::new("\"a\\u0001b\\u007f\"", "test.glz", config()).unwrap();
    assert_eq!(runner.run(&mut NoImports).unwrap(), "\"a\\u0001b\\u007f\"");
}

#[test]
fn unicode_passes_through() {
    let runner = Runner::new("\"héllo π\"", "test.glz", config()).unwrap();
    assert_eq!(runner.run(&mut NoImports).unwrap(), "\"héllo π\"");
}

#[test]
fn string_output_mode() {
    let cfg = EvalConfig {
        string_output: true,
        ..config()
    };
    let runner = Runner::new("\"hello\\n\"", "test.glz", cfg).unwrap();
    assert_eq!(runner.run(&mut NoImports).unwrap(), "hello\n");
}

#[test]
fn string_output_mode_rejects_non_strings() {
    let cfg = EvalConfig {
        string_output: true,
        ..config()
    };
    let runner = Runner::new("{a: 1}", "test.glz", cfg).unwrap();
    let err = runner.run(&mut NoImports).expect_err("expected an error");
    assert_eq!(err.message(), "Expected string result, got: object");
}

#[test]
fn multi_mode_returns_sorted_documents() {
    let runner = Runner::new(
        "{\"b.json\": {x: 2}, \"a.json\": [1]}",
        "test.glz",
        config(),
    )
    .unwrap();
    let documents = runner.run_multi(&mut NoImports).unwrap();
    let keys: Vec<&String> = documents.keys().collect();
    assert_eq!(keys, ["a.json", "b.json"]);
    assert_eq!(documents["a.json"], "[\n   1\n]");
    assert_eq!(documents["b.json"], "{\n   \"x\": 2\n}");
}

#[test]
fn multi_mode_requires_an_object() {
    let runner = Runner::new("[1]", "test.glz", config()).unwrap();
    let err = runner.run_multi(&mut NoImports).expect_err("expected an error");
    assert!(err.message().starts_with("Multi mode:"), "got: {}", err.message());
}

#[test]
fn multi_mode_with_string_output() {
    let cfg = EvalConfig {
        string_output: true,
        ..config()
    };
    let runner = Runner::new(
        "{\"a.txt\": \"alpha\\n\", \"b.txt\": \"beta\\n\"}",
        "test.glz",
        cfg,
    )
    .unwrap();
    let documents = runner.run_multi(&mut NoImports).unwrap();
    assert_eq!(documents["a.txt"], "alpha\n");
}

#[test]
fn stream_mode_returns_documents_in_order() {
    let runner = Runner::new("[{a: 1}, 2, \"three\"]", "test.glz", config()).unwrap();
    let documents = runner.run_stream(&mut NoImports).unwrap();
    assert_eq!(
        documents,
        vec!["{\n   \"a\": 1\n}".to_string(), "2".to_string(), "\"three\"".to_string()]
    );
}

#[test]
fn stream_mode_requires_an_array() {
    let runner = Runner::new("{a: 1}", "test.glz", config()).unwrap();
    let err = runner.run_stream(&mut NoImports).expect_err("expected an error");
    assert!(err.message().starts_with("Stream mode:"), "got: {}", err.message());
}

#[test]
fn number_formatting() {
    for (source, expected) in [
        ("0", "0"),
        ("-0", "-0"),
        ("1e2", "100"),
        ("0.5", "0.5"),
        ("1 / 3", "0.3333333333333333"),
        ("1e15", "1000000000000000"),
    ] {
        let runner = Runner::new(source, "test.glz", config()).unwrap();
        assert_eq!(runner.run(&mut NoImports).unwrap(), expected, "for {source}");
    }
}

#[test]
fn gc_runs_under_allocation_pressure() {
    let cfg = EvalConfig {
        gc_min_objects: 16,
        gc_growth_trigger: 1.5,
        ..config()
    };
    let source = "std.foldl(function(acc, x) acc + x, std.map(function(i) i * i, std.range(1, 200)), 0)";
    let runner = Runner::new(source, "test.glz", cfg).unwrap();
    let mut tracer = RecordingTracer::default();
    let out = runner.run_traced(&mut NoImports, &mut tracer).unwrap();
    assert_eq!(out, "2686700");
    assert!(!tracer.gc_cycles.is_empty(), "expected at least one GC cycle");
    for (before, after) in &tracer.gc_cycles {
        assert!(after <= before);
    }
}

#[test]
fn tracer_reports_final_heap_stats() {
    let runner = Runner::new("{a: std.range(1, 5)}", "test.glz", config()).unwrap();
    let mut tracer = RecordingTracer::default();
    runner.run_traced(&mut NoImports, &mut tracer).unwrap();
    let stats = tracer.final_stats.expect("stats should be recorded");
    assert!(stats.live_objects > 0);
    assert!(stats.objects_by_type.contains_key("Thunk"));
}

#[test]
fn tracer_sees_call_depth() {
    let runner = Runner::new(
        "local f(n) = if n == 0 then 0 else f(n - 1); f(20)",
        "test.glz",
        config(),
    )
    .unwrap();
    let mut tracer = RecordingTracer::default();
    runner.run_traced(&mut NoImports, &mut tracer).unwrap();
    assert!(tracer.max_call_depth >= 20, "got {}", tracer.max_call_depth);
}

#[test]
fn results_are_byte_identical_across_runs() {
    let source = "{
        data: [x * 1.5 for x in std.range(1, 20)],
        derived: {sum: std.foldl(function(a, b) a + b, self.data, 0)},
    }";
    let runner = Runner::new(source, "test.glz", config()).unwrap();
    let first = runner.run(&mut NoImports).unwrap();
    let second = runner.run(&mut NoImports).unwrap();
    assert_eq!(first, second);
}
