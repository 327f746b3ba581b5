//! Import resolution, caching, and importstr.

use std::collections::HashMap;

use glaze::{EvalConfig, ImportResolver, NoImports, RecordingTracer, Runner};
use pretty_assertions::assert_eq;
use serde_json::json;

/// In-memory resolver keyed by joined path, counting resolver calls.
struct MapResolver {
    files: HashMap<String, String>,
    calls: usize,
}

impl MapResolver {
    fn new(files: &[(&str, &str)]) -> Self {
        Self {
            files: files
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            calls: 0,
        }
    }
}

impl ImportResolver for MapResolver {
    fn resolve(&mut self, base_dir: &str, rel_path: &str) -> Result<(String, String), String> {
        self.calls += 1;
        let path = if rel_path.starts_with('/') {
            rel_path.to_string()
        } else {
            format!("{base_dir}{rel_path}")
        };
        self.files
            .get(&path)
            .cloned()
            .map(|contents| (contents, path.clone()))
            .ok_or_else(|| "No match locally or in the library search paths.".to_string())
    }
}

fn runner(source: &str) -> Runner {
    Runner::new(source, "test.glz", EvalConfig::default()).unwrap()
}

#[test]
fn import_evaluates_the_target() {
    let mut resolver = MapResolver::new(&[("lib.glz", "{port: 8080}")]);
    let out = runner("(import \"lib.glz\").port + 1")
        .run(&mut resolver)
        .unwrap();
    assert_eq!(out, "8081");
}

#[test]
fn imported_files_can_use_std() {
    let mut resolver = MapResolver::new(&[("lib.glz", "std.makeArray(2, function(i) i)")]);
    let out = runner("std.length(import \"lib.glz\")")
        .run(&mut resolver)
        .unwrap();
    assert_eq!(out, "2");
}

#[test]
fn imports_resolve_relative_to_the_importer() {
    let mut resolver = MapResolver::new(&[
        ("pkg/a.glz", "import \"b.glz\""),
        ("pkg/b.glz", "\"nested\""),
    ]);
    let out = runner("import \"pkg/a.glz\"").run(&mut resolver).unwrap();
    assert_eq!(out, "\"nested\"");
}

#[test]
fn repeated_imports_hit_the_cache() {
    let mut resolver = MapResolver::new(&[("v.glz", "21")]);
    let mut tracer = RecordingTracer::default();
    let out = runner("local a = import \"v.glz\", b = import \"v.glz\"; a + b")
        .run_traced(&mut resolver, &mut tracer)
        .unwrap();
    assert_eq!(out, "42");
    assert_eq!(resolver.calls, 1);
    assert_eq!(tracer.imports.len(), 2);
    assert!(!tracer.imports[0].1, "first import should miss the cache");
    assert!(tracer.imports[1].1, "second import should hit the cache");
}

#[test]
fn importstr_yields_raw_contents() {
    let mut resolver = MapResolver::new(&[("motd.txt", "hello\nworld")]);
    let out = runner("importstr \"motd.txt\"").run(&mut resolver).unwrap();
    assert_eq!(out, "\"hello\\nworld\"");
}

#[test]
fn importstr_is_not_parsed() {
    let mut resolver = MapResolver::new(&[("junk.txt", "{{{ not code")]);
    let out = runner("std.length(importstr \"junk.txt\")")
        .run(&mut resolver)
        .unwrap();
    assert_eq!(out, "12");
}

#[test]
fn missing_import_reports_the_resolver_message() {
    let mut resolver = MapResolver::new(&[]);
    let err = runner("import \"nope.glz\"")
        .run(&mut resolver)
        .expect_err("expected an error");
    assert_eq!(
        err.message(),
        "Couldn't open import \"nope.glz\": No match locally or in the library search paths."
    );
}

#[test]
fn no_imports_resolver_refuses() {
    let err = runner("import \"x.glz\"")
        .run(&mut NoImports)
        .expect_err("expected an error");
    assert!(err.message().contains("Imports are not available"), "got: {}", err.message());
}

#[test]
fn static_errors_inside_imports_surface() {
    let mut resolver = MapResolver::new(&[("bad.glz", "local x = ; x")]);
    let err = runner("import \"bad.glz\"")
        .run(&mut resolver)
        .expect_err("expected an error");
    assert!(err.message().contains("bad.glz"), "got: {}", err.message());
}

#[test]
fn imported_objects_compose() {
    let mut resolver = MapResolver::new(&[("base.glz", "{a: 1, b: 2}")]);
    let out = runner("import \"base.glz\" + {b: 3}")
        .run(&mut resolver)
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(value, json!({"a": 1, "b": 3}));
}
