//! The desugared core AST.
//!
//! The parser lowers all surface sugar (comprehensions, `%`, `!=`, slices,
//! brace application, method fields) while building this tree, so these node
//! kinds are exactly what the evaluator has to handle. Nodes are shared via
//! `Rc`: closures, thunks, and simple objects all keep references to the
//! expressions they will evaluate later.

use std::{cell::OnceCell, rc::Rc};

use strum::Display;

use crate::{builtins::Builtin, error::LocationRange, intern::Identifier};

pub(crate) type ExprRef = Rc<Expr>;

/// An expression node: kind, source span, and the free-variable set filled
/// in by static analysis before evaluation starts.
#[derive(Debug)]
pub(crate) struct Expr {
    pub kind: ExprKind,
    pub loc: LocationRange,
    free_vars: OnceCell<Rc<[Identifier]>>,
}

impl Expr {
    pub fn new(kind: ExprKind, loc: LocationRange) -> Self {
        Self {
            kind,
            loc,
            free_vars: OnceCell::new(),
        }
    }

    /// Free variables of this node. Filled exactly once by the analyser;
    /// reading before analysis is an internal error.
    pub fn free_vars(&self) -> &[Identifier] {
        self.free_vars
            .get()
            .unwrap_or_else(|| unreachable!("expression evaluated before static analysis"))
    }

    /// Free variables when already analysed. The std object's tree is shared
    /// between the main program and every import, so the analyser consults
    /// this to avoid re-walking it.
    pub fn free_vars_opt(&self) -> Option<&[Identifier]> {
        self.free_vars.get().map(|vars| &**vars)
    }

    pub fn set_free_vars(&self, vars: Rc<[Identifier]>) {
        if self.free_vars.set(vars).is_err() {
            unreachable!("free variables filled twice");
        }
    }
}

/// Field visibility within an object.
///
/// `Inherit` (the `:` marker) takes the visibility of a field with the same
/// name further right in the inheritance chain, defaulting to visible.
/// `Hidden` (`::`) is excluded from manifestation; `Visible` (`:::`) forces
/// the field into the output even when a hidden field is being overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hide {
    Inherit,
    Hidden,
    Visible,
}

/// A field of a (desugared) object literal. The name is an arbitrary
/// expression that must evaluate to a string, or to `null` to omit the
/// field.
#[derive(Debug, Clone)]
pub(crate) struct ObjectFieldAst {
    pub name: ExprRef,
    pub hide: Hide,
    pub body: ExprRef,
}

/// An object-level assertion: `assert cond` or `assert cond : message`.
#[derive(Debug, Clone)]
pub(crate) struct ObjectAssert {
    pub cond: ExprRef,
    pub msg: Option<ExprRef>,
}

#[derive(Debug)]
pub(crate) enum ExprKind {
    /// Function application, with optional `tailstrict` annotation.
    Apply {
        target: ExprRef,
        args: Vec<ExprRef>,
        tailstrict: bool,
    },
    /// Array literal; elements become unforced thunks.
    Array(Vec<ExprRef>),
    /// `assert cond [: msg]; rest`
    Assert {
        cond: ExprRef,
        msg: Option<ExprRef>,
        rest: ExprRef,
    },
    Binary {
        left: ExprRef,
        op: BinaryOp,
        right: ExprRef,
    },
    /// A native function reference. There is no surface syntax for this
    /// node; it only appears inside the generated std object.
    BuiltinFunction(Builtin),
    Conditional {
        cond: ExprRef,
        then_branch: ExprRef,
        else_branch: ExprRef,
    },
    /// `error msg`
    Error(ExprRef),
    Function {
        params: Rc<[Identifier]>,
        body: ExprRef,
    },
    Import(Rc<str>),
    ImportStr(Rc<str>),
    Index {
        target: ExprRef,
        index: ExprRef,
    },
    Local {
        binds: Vec<(Identifier, ExprRef)>,
        body: ExprRef,
    },
    LiteralBool(bool),
    LiteralNull,
    LiteralNumber(f64),
    LiteralString(Rc<str>),
    /// Desugared object literal: named fields plus assertions.
    Object {
        fields: Vec<ObjectFieldAst>,
        asserts: Vec<ObjectAssert>,
    },
    /// `{[field]: value for id in array}`
    ObjectComp {
        field: ExprRef,
        value: ExprRef,
        id: Identifier,
        array: ExprRef,
    },
    SelfExpr,
    Super,
    Unary {
        op: UnaryOp,
        expr: ExprRef,
    },
    Var(Identifier),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub(crate) enum BinaryOp {
    #[strum(serialize = "*")]
    Mult,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "<<")]
    ShiftL,
    #[strum(serialize = ">>")]
    ShiftR,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEq,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEq,
    #[strum(serialize = "==")]
    ManifestEqual,
    #[strum(serialize = "&")]
    BitwiseAnd,
    #[strum(serialize = "^")]
    BitwiseXor,
    #[strum(serialize = "|")]
    BitwiseOr,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

impl BinaryOp {
    /// Binary operator precedence; lower binds tighter. Unary operators sit
    /// at level 4, `%` at level 5 alongside `*` and `/`.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Mult | Self::Div => 5,
            Self::Plus | Self::Minus => 6,
            Self::ShiftL | Self::ShiftR => 7,
            Self::Greater | Self::GreaterEq | Self::Less | Self::LessEq => 8,
            Self::ManifestEqual => 9,
            Self::BitwiseAnd => 10,
            Self::BitwiseXor => 11,
            Self::BitwiseOr => 12,
            Self::And => 13,
            Self::Or => 14,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub(crate) enum UnaryOp {
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "~")]
    BitwiseNot,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
}
