//! Evaluation tracing hooks.
//!
//! A trait-based tracing system with zero-cost abstraction: the evaluator is
//! generic over the tracer, so with [`NoopTracer`] every hook compiles away.
//! All methods have default no-op implementations; implementations override
//! only the hooks they care about.

/// Hook points for observing an evaluation.
pub trait EvalTracer {
    /// A garbage collection cycle completed, with the live cell counts
    /// before and after the sweep.
    fn gc_cycle(&mut self, live_before: usize, live_after: usize) {
        let _ = (live_before, live_after);
    }

    /// An import was requested; `cached` is true when the contents were
    /// served from the per-run cache without calling the resolver.
    fn import_resolved(&mut self, path: &str, cached: bool) {
        let _ = (path, cached);
    }

    /// The call stack reached a new high-water mark.
    fn call_depth(&mut self, depth: usize) {
        let _ = depth;
    }

    /// The run finished (successfully or not); `stats` is the final heap
    /// snapshot before teardown.
    fn finished(&mut self, stats: &crate::heap::HeapStats) {
        let _ = stats;
    }
}

/// The production default: does nothing, costs nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl EvalTracer for NoopTracer {}

/// Logs evaluation events to stderr, for debugging.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrTracer;

impl EvalTracer for StderrTracer {
    fn gc_cycle(&mut self, live_before: usize, live_after: usize) {
        eprintln!("gc: {live_before} -> {live_after} live cells");
    }

    fn import_resolved(&mut self, path: &str, cached: bool) {
        if cached {
            eprintln!("import (cached): {path}");
        } else {
            eprintln!("import: {path}");
        }
    }

    fn call_depth(&mut self, depth: usize) {
        if depth.is_multiple_of(100) {
            eprintln!("call depth: {depth}");
        }
    }
}

/// Records GC and import activity for inspection in tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    pub gc_cycles: Vec<(usize, usize)>,
    pub imports: Vec<(String, bool)>,
    pub max_call_depth: usize,
    pub final_stats: Option<crate::heap::HeapStats>,
}

impl EvalTracer for RecordingTracer {
    fn gc_cycle(&mut self, live_before: usize, live_after: usize) {
        self.gc_cycles.push((live_before, live_after));
    }

    fn import_resolved(&mut self, path: &str, cached: bool) {
        self.imports.push((path.to_string(), cached));
    }

    fn call_depth(&mut self, depth: usize) {
        self.max_call_depth = self.max_call_depth.max(depth);
    }

    fn finished(&mut self, stats: &crate::heap::HeapStats) {
        self.final_stats = Some(stats.clone());
    }
}
