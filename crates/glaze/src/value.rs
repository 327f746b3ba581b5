//! Runtime values and the payloads stored in heap cells.
//!
//! Primitive values (null, booleans, numbers) are carried inline; strings,
//! arrays, functions, and objects live on the heap and are referred to by
//! [`HeapId`]. Arrays hold thunk ids rather than values, which is what makes
//! the language lazy.

use std::rc::Rc;

use ahash::AHashMap;

use crate::{
    ast::{ExprRef, Hide, ObjectAssert},
    builtins::Builtin,
    heap::HeapId,
    intern::Identifier,
};

/// A runtime value. Copying is cheap: heap-backed variants copy only the id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(HeapId),
    Array(HeapId),
    Function(HeapId),
    Object(HeapId),
}

impl Value {
    /// The type name used in error messages and by `std.type`.
    pub fn kind_str(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::Array(_) => "array",
            Self::Function(_) => "function",
            Self::Object(_) => "object",
        }
    }

    /// The heap cell behind this value, if any.
    pub fn heap_id(self) -> Option<HeapId> {
        match self {
            Self::Null | Self::Bool(_) | Self::Number(_) => None,
            Self::Str(id) | Self::Array(id) | Self::Function(id) | Self::Object(id) => Some(id),
        }
    }
}

/// Lexical bindings: identifier to thunk cell. Environments are captured by
/// copying only the free variables of the expression that needs them, so
/// these maps stay small.
pub(crate) type Bindings = AHashMap<Identifier, HeapId>;

/// A suspended or forced computation.
#[derive(Debug)]
pub(crate) struct ThunkCell {
    /// Used only to name the thunk in stack traces.
    pub name: Identifier,
    pub state: ThunkState,
}

#[derive(Debug)]
pub(crate) enum ThunkState {
    Pending {
        env: Bindings,
        self_obj: Option<HeapId>,
        offset: u32,
        body: ExprRef,
    },
    Filled(Value),
}

impl ThunkCell {
    /// A suspension with an environment filled in later, for bindings that
    /// may refer back to themselves.
    pub fn pending(
        name: Identifier,
        self_obj: Option<HeapId>,
        offset: u32,
        body: ExprRef,
    ) -> Self {
        Self::pending_in(name, Bindings::new(), self_obj, offset, body)
    }

    pub fn pending_in(
        name: Identifier,
        env: Bindings,
        self_obj: Option<HeapId>,
        offset: u32,
        body: ExprRef,
    ) -> Self {
        Self {
            name,
            state: ThunkState::Pending {
                env,
                self_obj,
                offset,
                body,
            },
        }
    }

    pub fn filled(name: Identifier, value: Value) -> Self {
        Self {
            name,
            state: ThunkState::Filled(value),
        }
    }

    /// Memoises the result. Dropping the pending state releases the captured
    /// environment, which helps the collector.
    pub fn fill(&mut self, value: Value) {
        self.state = ThunkState::Filled(value);
    }

    pub fn content(&self) -> Option<Value> {
        match &self.state {
            ThunkState::Filled(v) => Some(*v),
            ThunkState::Pending { .. } => None,
        }
    }
}

/// What a closure runs when called: a user function body, or a native
/// builtin dispatched by id.
#[derive(Debug)]
pub(crate) enum ClosureKind {
    User { body: ExprRef },
    Builtin(Builtin),
}

/// A function value: captured environment, captured `self` (when the
/// function literal appeared inside an object body), parameters, and body.
#[derive(Debug)]
pub(crate) struct ClosureCell {
    pub env: Bindings,
    pub self_obj: Option<HeapId>,
    pub offset: u32,
    pub params: Rc<[Identifier]>,
    pub kind: ClosureKind,
}

/// A field of a simple object: declared visibility plus the body expression,
/// evaluated on demand in the object's captured environment.
#[derive(Debug, Clone)]
pub(crate) struct SimpleField {
    pub hide: Hide,
    pub body: ExprRef,
}

/// The object algebra. `Extended` composes two objects; field lookup walks
/// its leaves right to left. `Super` is a view of `root` that skips the
/// first `offset` leaves. See the field-lookup logic in the evaluator.
#[derive(Debug)]
pub(crate) enum ObjectCell {
    Simple {
        env: Bindings,
        fields: AHashMap<Identifier, SimpleField>,
        asserts: Vec<ObjectAssert>,
    },
    Extended {
        left: HeapId,
        right: HeapId,
    },
    Super {
        root: HeapId,
        offset: u32,
    },
    Comprehension {
        env: Bindings,
        /// The shared field-value expression.
        value: ExprRef,
        /// The bound loop variable.
        id: Identifier,
        /// Field name to the thunk holding that iteration's element.
        elements: AHashMap<Identifier, HeapId>,
    },
}

/// Payload of a heap cell.
#[derive(Debug)]
pub(crate) enum HeapData {
    Thunk(ThunkCell),
    /// Element thunks, in order.
    Array(Vec<HeapId>),
    Closure(ClosureCell),
    Object(ObjectCell),
    Str(Rc<str>),
}

impl HeapData {
    /// Variant name for heap statistics and internal errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Thunk(_) => "Thunk",
            Self::Array(_) => "Array",
            Self::Closure(_) => "Closure",
            Self::Object(_) => "Object",
            Self::Str(_) => "Str",
        }
    }
}
