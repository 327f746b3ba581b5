//! Public interface for evaluating glaze programs.

use std::{fs, path::Path};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    ast::ExprRef,
    config::EvalConfig,
    error::{EvalError, LocationRange, RunResult, StaticError},
    import::ImportResolver,
    intern::Interner,
    stdlib::StdLib,
    tracer::{EvalTracer, NoopTracer},
    vm::Interpreter,
};

/// An external variable supplied by the host, reachable from programs via
/// `std.extVar(name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExtVar {
    /// Injected as a string value.
    Str(String),
    /// A source fragment, parsed at evaluator construction and injected as
    /// an unforced thunk.
    Code(String),
}

/// Primary interface for evaluating programs.
///
/// A `Runner` parses and analyses the source once; each `run*` call builds a
/// fresh evaluator (heap, stack, import cache) and evaluates to completion,
/// so re-running with the same inputs yields byte-identical output.
///
/// # Example
/// ```
/// use glaze::{EvalConfig, NoImports, Runner};
///
/// let runner = Runner::new("{ x: 1, y: self.x + 1 }", "example.glz", EvalConfig::default())
///     .unwrap();
/// let json = runner.run(&mut NoImports).unwrap();
/// assert!(json.contains("\"y\": 2"));
/// ```
#[derive(Debug)]
pub struct Runner {
    program: ExprRef,
    interner: Interner,
    stdlib: StdLib,
    config: EvalConfig,
    ext_vars: IndexMap<String, ExtVar>,
}

impl Runner {
    /// Parses and statically analyses `source`. `filename` is used only in
    /// diagnostics and as the base for relative imports.
    pub fn new(source: &str, filename: &str, config: EvalConfig) -> Result<Self, EvalError> {
        let mut interner = Interner::new();
        let stdlib = StdLib::new(&mut interner).map_err(EvalError::from_static)?;
        let program = stdlib
            .load_program(source, filename, &mut interner)
            .map_err(EvalError::from_static)?;
        Ok(Self {
            program,
            interner,
            stdlib,
            config,
            ext_vars: IndexMap::new(),
        })
    }

    /// Reads and parses a program from a file. Imports resolve relative to
    /// the file's directory.
    pub fn from_file(path: impl AsRef<Path>, config: EvalConfig) -> Result<Self, EvalError> {
        let path = path.as_ref();
        let filename = path.to_string_lossy().into_owned();
        let source = fs::read_to_string(path).map_err(|err| {
            EvalError::from_static(StaticError::new(
                LocationRange::synthetic(&filename),
                format!("Could not read input file: {err}"),
            ))
        })?;
        Self::new(&source, &filename, config)
    }

    /// Registers an external variable. Later registrations win.
    pub fn add_ext_var(&mut self, name: impl Into<String>, value: ExtVar) {
        self.ext_vars.insert(name.into(), value);
    }

    #[must_use]
    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Evaluates to a single document: pretty-printed JSON, or the raw
    /// string when `string_output` is configured.
    pub fn run(&self, resolver: &mut impl ImportResolver) -> Result<String, EvalError> {
        self.run_traced(resolver, &mut NoopTracer)
    }

    pub fn run_traced(
        &self,
        resolver: &mut impl ImportResolver,
        tracer: &mut impl EvalTracer,
    ) -> Result<String, EvalError> {
        let string_output = self.config.string_output;
        self.with_vm(resolver, tracer, |vm, program| {
            vm.evaluate(program)?;
            let loc = LocationRange::synthetic("During manifestation");
            if string_output {
                vm.manifest_string(&loc)
            } else {
                vm.manifest_json(&loc, true, "")
            }
        })
    }

    /// Multi-file mode: the program must evaluate to an object; each field
    /// manifests to its own document, keyed by field name in alphabetical
    /// order.
    pub fn run_multi(
        &self,
        resolver: &mut impl ImportResolver,
    ) -> Result<IndexMap<String, String>, EvalError> {
        self.run_multi_traced(resolver, &mut NoopTracer)
    }

    pub fn run_multi_traced(
        &self,
        resolver: &mut impl ImportResolver,
        tracer: &mut impl EvalTracer,
    ) -> Result<IndexMap<String, String>, EvalError> {
        let string_output = self.config.string_output;
        self.with_vm(resolver, tracer, |vm, program| {
            vm.evaluate(program)?;
            vm.manifest_multi(string_output)
        })
    }

    /// Stream mode: the program must evaluate to an array; each element
    /// manifests to its own JSON document, in order.
    pub fn run_stream(
        &self,
        resolver: &mut impl ImportResolver,
    ) -> Result<Vec<String>, EvalError> {
        self.run_stream_traced(resolver, &mut NoopTracer)
    }

    pub fn run_stream_traced(
        &self,
        resolver: &mut impl ImportResolver,
        tracer: &mut impl EvalTracer,
    ) -> Result<Vec<String>, EvalError> {
        self.with_vm(resolver, tracer, |vm, program| {
            vm.evaluate(program)?;
            vm.manifest_stream()
        })
    }

    /// Builds a fresh evaluator, runs `body`, and reports the final heap
    /// snapshot to the tracer.
    fn with_vm<Out, R: ImportResolver, T: EvalTracer>(
        &self,
        resolver: &mut R,
        tracer: &mut T,
        body: impl FnOnce(&mut Interpreter<'_, R, T>, ExprRef) -> RunResult<Out>,
    ) -> Result<Out, EvalError> {
        let mut vm = Interpreter::new(
            &self.config,
            self.interner.clone(),
            &self.stdlib,
            &self.ext_vars,
            resolver,
            tracer,
        )
        .map_err(EvalError::from_static)?;
        let result = body(&mut vm, self.program.clone());
        let stats = vm.heap.stats();
        vm.tracer.finished(&stats);
        result.map_err(|err| EvalError::from_runtime(err, self.config.max_trace as usize))
    }
}
