//! Static analysis: free-variable annotation and scope checks.
//!
//! Runs once over a freshly parsed tree, before evaluation. Rejects unbound
//! variables, duplicate function parameters, `self`/`super` outside an
//! object, and local bindings that force themselves while being defined.
//! Fills every node's free-variable set, which is what environment capture
//! uses at runtime.

use ahash::AHashSet;

use crate::{
    ast::{Expr, ExprKind, ExprRef},
    error::StaticError,
    intern::{Identifier, Interner},
};

type IdSet = AHashSet<Identifier>;

/// Analyses a whole program. Safe to call on trees whose subtrees were
/// already analysed (the shared std object); their stored sets are reused.
pub(crate) fn analyze(root: &ExprRef, interner: &Interner) -> Result<(), StaticError> {
    visit(root, false, &IdSet::new(), interner)?;
    Ok(())
}

fn visit(
    node: &Expr,
    in_object: bool,
    vars: &IdSet,
    interner: &Interner,
) -> Result<IdSet, StaticError> {
    if let Some(stored) = node.free_vars_opt() {
        // Already analysed (shared std subtree): reuse the stored set.
        return Ok(stored.iter().copied().collect());
    }
    let mut free = IdSet::new();
    match &node.kind {
        ExprKind::Apply { target, args, .. } => {
            free.extend(visit(target, in_object, vars, interner)?);
            for arg in args {
                free.extend(visit(arg, in_object, vars, interner)?);
            }
        }
        ExprKind::Array(elements) => {
            for element in elements {
                free.extend(visit(element, in_object, vars, interner)?);
            }
        }
        ExprKind::Assert { cond, msg, rest } => {
            free.extend(visit(cond, in_object, vars, interner)?);
            if let Some(msg) = msg {
                free.extend(visit(msg, in_object, vars, interner)?);
            }
            free.extend(visit(rest, in_object, vars, interner)?);
        }
        ExprKind::Binary { left, right, .. } => {
            free.extend(visit(left, in_object, vars, interner)?);
            free.extend(visit(right, in_object, vars, interner)?);
        }
        ExprKind::BuiltinFunction(_)
        | ExprKind::Import(_)
        | ExprKind::ImportStr(_)
        | ExprKind::LiteralBool(_)
        | ExprKind::LiteralNull
        | ExprKind::LiteralNumber(_)
        | ExprKind::LiteralString(_) => {}
        ExprKind::Conditional {
            cond,
            then_branch,
            else_branch,
        } => {
            free.extend(visit(cond, in_object, vars, interner)?);
            free.extend(visit(then_branch, in_object, vars, interner)?);
            free.extend(visit(else_branch, in_object, vars, interner)?);
        }
        ExprKind::Error(inner) => {
            free.extend(visit(inner, in_object, vars, interner)?);
        }
        ExprKind::Function { params, body } => {
            let mut new_vars = vars.clone();
            let mut seen = IdSet::new();
            for param in params.iter() {
                if !seen.insert(*param) {
                    return Err(StaticError::new(
                        node.loc.clone(),
                        format!("Duplicate function parameter: {}", interner.name(*param)),
                    ));
                }
                new_vars.insert(*param);
            }
            let mut body_free = visit(body, in_object, &new_vars, interner)?;
            for param in params.iter() {
                body_free.remove(param);
            }
            free.extend(body_free);
        }
        ExprKind::Index { target, index } => {
            free.extend(visit(target, in_object, vars, interner)?);
            free.extend(visit(index, in_object, vars, interner)?);
        }
        ExprKind::Local { binds, body } => {
            let mut new_vars = vars.clone();
            for (id, _) in binds {
                new_vars.insert(*id);
            }
            let mut inner_free = IdSet::new();
            for (_, init) in binds {
                inner_free.extend(visit(init, in_object, &new_vars, interner)?);
            }
            inner_free.extend(visit(body, in_object, &new_vars, interner)?);
            check_binding_cycles(node, binds, interner)?;
            for (id, _) in binds {
                inner_free.remove(id);
            }
            free.extend(inner_free);
        }
        ExprKind::Object { fields, asserts } => {
            for field in fields {
                free.extend(visit(&field.name, in_object, vars, interner)?);
                free.extend(visit(&field.body, true, vars, interner)?);
            }
            for assert in asserts {
                free.extend(visit(&assert.cond, true, vars, interner)?);
                if let Some(msg) = &assert.msg {
                    free.extend(visit(msg, true, vars, interner)?);
                }
            }
        }
        ExprKind::ObjectComp {
            field,
            value,
            id,
            array,
        } => {
            let mut new_vars = vars.clone();
            new_vars.insert(*id);
            // The field name cannot refer to self; the value can.
            let mut inner = visit(field, false, &new_vars, interner)?;
            inner.extend(visit(value, true, &new_vars, interner)?);
            inner.remove(id);
            free.extend(inner);
            free.extend(visit(array, in_object, vars, interner)?);
        }
        ExprKind::SelfExpr => {
            if !in_object {
                return Err(StaticError::new(
                    node.loc.clone(),
                    "Can't use self outside of an object.",
                ));
            }
        }
        ExprKind::Super => {
            if !in_object {
                return Err(StaticError::new(
                    node.loc.clone(),
                    "Can't use super outside of an object.",
                ));
            }
        }
        ExprKind::Unary { expr, .. } => {
            free.extend(visit(expr, in_object, vars, interner)?);
        }
        ExprKind::Var(id) => {
            if !vars.contains(id) {
                return Err(StaticError::new(
                    node.loc.clone(),
                    format!("Unknown variable: {}", interner.name(*id)),
                ));
            }
            free.insert(*id);
        }
    }

    let mut sorted: Vec<Identifier> = free.iter().copied().collect();
    sorted.sort_unstable();
    node.set_free_vars(sorted.into());
    Ok(free)
}

/// Rejects `local` blocks whose thunks would force themselves, e.g.
/// `local x = x; x`. References under a laziness guard (function bodies,
/// array elements, object field bodies, call arguments, conditional
/// branches) are fine; that is what makes mutual recursion work.
fn check_binding_cycles(
    node: &Expr,
    binds: &[(Identifier, ExprRef)],
    interner: &Interner,
) -> Result<(), StaticError> {
    let bound: IdSet = binds.iter().map(|(id, _)| *id).collect();
    // Edges bind -> binds referenced before the init produces a value.
    let edges: Vec<Vec<Identifier>> = binds
        .iter()
        .map(|(_, init)| {
            let mut needed = IdSet::new();
            immediate_vars(init, &mut needed);
            binds
                .iter()
                .map(|(id, _)| *id)
                .filter(|id| needed.contains(id) && bound.contains(id))
                .collect()
        })
        .collect();
    // Depth-first cycle search over at most |binds| nodes.
    for (start_index, (start, _)) in binds.iter().enumerate() {
        let mut stack = vec![*start];
        let mut visited = IdSet::new();
        while let Some(current) = stack.pop() {
            let index = binds
                .iter()
                .position(|(id, _)| *id == current)
                .unwrap_or_else(|| unreachable!("edge to unbound identifier"));
            for next in &edges[index] {
                if *next == binds[start_index].0 {
                    return Err(StaticError::new(
                        node.loc.clone(),
                        format!("Unbound variable: {}", interner.name(*start)),
                    ));
                }
                if visited.insert(*next) {
                    stack.push(*next);
                }
            }
        }
    }
    Ok(())
}

/// Variables whose thunks are forced while evaluating `node` itself, before
/// it produces a value. Anything behind a thunk boundary is excluded.
fn immediate_vars(node: &Expr, out: &mut IdSet) {
    match &node.kind {
        ExprKind::Var(id) => {
            out.insert(*id);
        }
        ExprKind::Binary { left, right, .. } => {
            immediate_vars(left, out);
            immediate_vars(right, out);
        }
        ExprKind::Unary { expr, .. } => immediate_vars(expr, out),
        ExprKind::Conditional { cond, .. } => immediate_vars(cond, out),
        ExprKind::Assert { cond, .. } => immediate_vars(cond, out),
        ExprKind::Index { target, index } => {
            immediate_vars(target, out);
            immediate_vars(index, out);
        }
        ExprKind::Apply { target, .. } => immediate_vars(target, out),
        ExprKind::Error(inner) => immediate_vars(inner, out),
        ExprKind::Local { binds, body } => {
            let mut inner = IdSet::new();
            immediate_vars(body, &mut inner);
            for (id, _) in binds {
                inner.remove(id);
            }
            out.extend(inner);
        }
        // Functions, arrays, objects, comprehensions, and literals all delay
        // their contents behind thunks or closures.
        ExprKind::Array(_)
        | ExprKind::Function { .. }
        | ExprKind::Object { .. }
        | ExprKind::ObjectComp { .. }
        | ExprKind::BuiltinFunction(_)
        | ExprKind::Import(_)
        | ExprKind::ImportStr(_)
        | ExprKind::LiteralBool(_)
        | ExprKind::LiteralNull
        | ExprKind::LiteralNumber(_)
        | ExprKind::LiteralString(_)
        | ExprKind::SelfExpr
        | ExprKind::Super => {}
    }
}
