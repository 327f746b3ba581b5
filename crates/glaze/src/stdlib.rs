//! The standard library object and program loading.
//!
//! Every program (the main file, every import, every code-valued external
//! variable) is wrapped as `local std = <std object>; <program>`. The std
//! object is the parsed `std.glz` source with one hidden field per native
//! builtin appended. The parsed object is built once per runner and shared
//! across all wrappers.

use std::rc::Rc;

use crate::{
    analyze::analyze,
    ast::{Expr, ExprKind, ExprRef, Hide, ObjectFieldAst},
    builtins::Builtin,
    error::{LocationRange, StaticError},
    intern::Interner,
    parse::parse_source,
};

const STD_SOURCE: &str = include_str!("std.glz");

/// The shared std object, ready to be bound around programs.
#[derive(Debug)]
pub(crate) struct StdLib {
    std_ast: ExprRef,
}

impl StdLib {
    /// Parses `std.glz` and appends the native builtins as hidden fields.
    pub fn new(interner: &mut Interner) -> Result<Self, StaticError> {
        let parsed = parse_source(STD_SOURCE, "std.glz", interner)?;
        let ExprKind::Object { fields, asserts } = &parsed.kind else {
            unreachable!("std source is not an object literal")
        };
        let mut fields = fields.clone();
        let loc = LocationRange::synthetic("std.glz");
        for builtin in Builtin::ALL {
            fields.push(ObjectFieldAst {
                name: Rc::new(Expr::new(
                    ExprKind::LiteralString(Rc::from(builtin.name())),
                    loc.clone(),
                )),
                hide: Hide::Hidden,
                body: Rc::new(Expr::new(ExprKind::BuiltinFunction(builtin), loc.clone())),
            });
        }
        let std_ast = Rc::new(Expr::new(
            ExprKind::Object {
                fields,
                asserts: asserts.clone(),
            },
            parsed.loc.clone(),
        ));
        Ok(Self { std_ast })
    }

    /// Parses a source file, wraps it with the std binding, and runs static
    /// analysis over the result.
    pub fn load_program(
        &self,
        source: &str,
        filename: &str,
        interner: &mut Interner,
    ) -> Result<ExprRef, StaticError> {
        let program = parse_source(source, filename, interner)?;
        let std_id = interner.intern("std");
        let loc = program.loc.clone();
        let wrapped = Rc::new(Expr::new(
            ExprKind::Local {
                binds: vec![(std_id, Rc::clone(&self.std_ast))],
                body: program,
            },
            loc,
        ));
        analyze(&wrapped, interner)?;
        Ok(wrapped)
    }
}
