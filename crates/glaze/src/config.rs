//! Evaluator configuration.

use serde::{Deserialize, Serialize};

/// Tuning knobs for one evaluator instance.
///
/// The defaults match the reference behaviour; embedders usually only touch
/// `max_stack` (to allow deeper recursion) or `string_output` (when the
/// program yields a raw string rather than JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Maximum number of call frames (function application, thunk forcing,
    /// field evaluation) before the run is aborted. Non-call frames are not
    /// counted.
    pub max_stack: u32,
    /// The garbage collector does not run while fewer cells than this are
    /// live.
    pub gc_min_objects: u32,
    /// Growth factor of the live count since the last collection cycle that
    /// triggers a new cycle.
    pub gc_growth_trigger: f64,
    /// Maximum number of stack trace lines before the middle is elided.
    /// Zero means unlimited.
    pub max_trace: u32,
    /// When true, the program must evaluate to a string, which is emitted
    /// raw instead of being encoded as JSON.
    pub string_output: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_stack: 500,
            gc_min_objects: 1000,
            gc_growth_trigger: 2.0,
            max_trace: 20,
            string_output: false,
        }
    }
}
