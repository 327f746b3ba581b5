//! Error types for the parser, static analyser, and evaluator.
//!
//! There are two internal error families: [`StaticError`] (raised while
//! lexing, parsing, or analysing, always with a source location) and
//! [`RuntimeError`] (raised by the evaluator, with a stack trace built from
//! the continuation stack). Both converge into the public [`EvalError`],
//! which renders the user-visible diagnostic.

use std::{fmt, rc::Rc};

/// Result type alias for operations that can raise a runtime error.
pub(crate) type RunResult<T> = Result<T, RuntimeError>;

/// A 1-based line/column position. Line 0 means "unset" and is used by
/// synthetic locations such as the manifestation entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub(crate) fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    pub(crate) fn is_set(self) -> bool {
        self.line != 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A source span: file name plus begin/end positions.
///
/// Attached to every AST node and every stack frame. The file name is a
/// shared `Rc<str>` so that cloning a location (which the evaluator does for
/// every frame) never copies the string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRange {
    pub file: Rc<str>,
    pub begin: Location,
    pub end: Location,
}

impl LocationRange {
    pub(crate) fn new(file: Rc<str>, begin: Location, end: Location) -> Self {
        Self { file, begin, end }
    }

    /// A location with no positions, e.g. "during manifestation".
    pub(crate) fn synthetic(what: &str) -> Self {
        Self {
            file: Rc::from(what),
            begin: Location::default(),
            end: Location::default(),
        }
    }

    /// Directory of the file this range points into, including the trailing
    /// slash, or the empty string when the file name has no directory part.
    pub(crate) fn dir_name(&self) -> String {
        match self.file.rfind('/') {
            Some(idx) => self.file[..=idx].to_string(),
            None => String::new(),
        }
    }
}

impl fmt::Display for LocationRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.begin.is_set() {
            write!(f, "{}:{}", self.file, self.begin)
        } else {
            write!(f, "{}", self.file)
        }
    }
}

/// A single line of a runtime stack trace.
#[derive(Debug, Clone)]
pub struct TraceFrame {
    pub location: LocationRange,
    /// Best-effort name of the function, thunk, or object being evaluated;
    /// empty when nothing suitable was found.
    pub name: String,
}

impl TraceFrame {
    pub(crate) fn new(location: LocationRange) -> Self {
        Self {
            location,
            name: String::new(),
        }
    }
}

/// Error raised during lexing, parsing, or static analysis.
#[derive(Debug, Clone)]
pub(crate) struct StaticError {
    pub loc: LocationRange,
    pub msg: String,
}

impl StaticError {
    pub fn new(loc: LocationRange, msg: impl Into<String>) -> Self {
        Self {
            loc,
            msg: msg.into(),
        }
    }
}

/// Error raised by the evaluator: a message plus the stack trace captured
/// from the continuation stack, most recent frame first.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeError {
    pub msg: String,
    pub trace: Vec<TraceFrame>,
}

/// The kind of failure carried by an [`EvalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Lex/parse/analysis failure, including import resolution failures
    /// reported by the host.
    Static,
    /// Failure during evaluation or manifestation.
    Runtime,
}

/// Public error type returned by [`Runner`](crate::Runner) methods.
///
/// `Display` renders the user-visible diagnostic: `STATIC ERROR:` with a
/// single location, or `RUNTIME ERROR:` followed by the stack trace with the
/// most recent frames first. Traces longer than the configured maximum are
/// elided in the middle.
#[derive(Debug, Clone)]
pub struct EvalError {
    kind: ErrorKind,
    msg: String,
    trace: Vec<TraceFrame>,
    max_trace: usize,
}

impl EvalError {
    pub(crate) fn from_static(err: StaticError) -> Self {
        Self {
            kind: ErrorKind::Static,
            msg: err.msg,
            trace: vec![TraceFrame::new(err.loc)],
            max_trace: usize::MAX,
        }
    }

    pub(crate) fn from_runtime(err: RuntimeError, max_trace: usize) -> Self {
        Self {
            kind: ErrorKind::Runtime,
            msg: err.msg,
            trace: err.trace,
            max_trace: if max_trace == 0 { usize::MAX } else { max_trace },
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// The stack trace, most recent frame first. Static errors carry a
    /// single frame holding the error location.
    #[must_use]
    pub fn trace(&self) -> &[TraceFrame] {
        &self.trace
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Static => {
                let loc = &self.trace[0].location;
                if loc.begin.is_set() {
                    writeln!(f, "STATIC ERROR: {}: {}", loc, self.msg)
                } else {
                    writeln!(f, "STATIC ERROR: {}", self.msg)
                }
            }
            ErrorKind::Runtime => {
                writeln!(f, "RUNTIME ERROR: {}", self.msg)?;
                let total = self.trace.len();
                if total <= self.max_trace {
                    for frame in &self.trace {
                        write_trace_line(f, frame)?;
                    }
                } else {
                    // Keep the newest and oldest frames, elide the middle.
                    let head = self.max_trace.div_ceil(2);
                    let tail = self.max_trace / 2;
                    for frame in &self.trace[..head] {
                        write_trace_line(f, frame)?;
                    }
                    writeln!(f, "\t...")?;
                    for frame in &self.trace[total - tail..] {
                        write_trace_line(f, frame)?;
                    }
                }
                Ok(())
            }
        }
    }
}

fn write_trace_line(f: &mut fmt::Formatter<'_>, frame: &TraceFrame) -> fmt::Result {
    if frame.name.is_empty() {
        writeln!(f, "\t{}", frame.location)
    } else {
        writeln!(f, "\t{}\t{}", frame.location, frame.name)
    }
}

impl std::error::Error for EvalError {}
