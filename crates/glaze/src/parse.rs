//! The parser: token stream to desugared core AST.
//!
//! Precedence-climbing expression parser. All surface sugar is lowered while
//! parsing: array comprehensions become `std.map`/`std.filterMap` calls, `%`
//! becomes `std.mod`, `!=` becomes `!(==)`, slices become `std.slice`,
//! `e { ... }` becomes `e + { ... }`, `f(x): body` fields become function
//! literals, and `name+: body` fields become `super.name + body`. Object
//! level locals are wrapped around every field body, and `$` is a hidden
//! `$ = self` binding introduced by the outermost object.

use std::rc::Rc;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, ExprRef, Hide, ObjectAssert, ObjectFieldAst, UnaryOp},
    error::{LocationRange, StaticError},
    intern::{Identifier, Interner},
    lexer::{Token, TokenKind, lex},
};

/// Function calls and indexing.
const APPLY_PRECEDENCE: u8 = 2;
/// Logical and bitwise negation, unary `+` and `-`.
const UNARY_PRECEDENCE: u8 = 4;
/// Modulo and string formatting.
const PERCENT_PRECEDENCE: u8 = 5;
/// Local, if, function, error, assert.
const MAX_PRECEDENCE: u8 = 15;

fn unary_op(data: &str) -> Option<UnaryOp> {
    Some(match data {
        "!" => UnaryOp::Not,
        "~" => UnaryOp::BitwiseNot,
        "+" => UnaryOp::Plus,
        "-" => UnaryOp::Minus,
        _ => return None,
    })
}

/// Binary operators as written; `!=` is handled separately because it
/// desugars to a negated `==`.
fn binary_op(data: &str) -> Option<BinaryOp> {
    Some(match data {
        "*" => BinaryOp::Mult,
        "/" => BinaryOp::Div,
        "+" => BinaryOp::Plus,
        "-" => BinaryOp::Minus,
        "<<" => BinaryOp::ShiftL,
        ">>" => BinaryOp::ShiftR,
        ">" => BinaryOp::Greater,
        ">=" => BinaryOp::GreaterEq,
        "<" => BinaryOp::Less,
        "<=" => BinaryOp::LessEq,
        "==" => BinaryOp::ManifestEqual,
        "&" => BinaryOp::BitwiseAnd,
        "^" => BinaryOp::BitwiseXor,
        "|" => BinaryOp::BitwiseOr,
        "&&" => BinaryOp::And,
        "||" => BinaryOp::Or,
        _ => return None,
    })
}

fn expr(kind: ExprKind, loc: LocationRange) -> ExprRef {
    Rc::new(Expr::new(kind, loc))
}

fn span(begin: &LocationRange, end: &LocationRange) -> LocationRange {
    LocationRange::new(Rc::clone(&begin.file), begin.begin, end.end)
}

pub(crate) struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    interner: &'a mut Interner,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn pop(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn pop_expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, StaticError> {
        let token = self.pop();
        if token.kind != kind {
            return Err(StaticError::new(
                token.loc.clone(),
                format!("Expected {kind} while {context}, got {token}"),
            ));
        }
        Ok(token)
    }

    fn pop_expect_op(&mut self, op: &str, context: &str) -> Result<Token, StaticError> {
        let token = self.pop();
        if token.kind != TokenKind::Operator || token.data != op {
            return Err(StaticError::new(
                token.loc.clone(),
                format!("Expected \"{op}\" while {context}, got {token}"),
            ));
        }
        Ok(token)
    }

    fn unexpected(&self, token: &Token, context: &str) -> StaticError {
        StaticError::new(
            token.loc.clone(),
            format!("Unexpected: {token} while {context}"),
        )
    }

    /// Builds `std.<field>` with a synthetic location, for desugared calls.
    fn std_field(&mut self, field: &str, loc: &LocationRange) -> ExprRef {
        let std_id = self.interner.intern("std");
        let target = expr(ExprKind::Var(std_id), loc.clone());
        let index = expr(ExprKind::LiteralString(Rc::from(field)), loc.clone());
        expr(ExprKind::Index { target, index }, loc.clone())
    }

    /// `local` bind: `name = body` or `name(params) = body`.
    fn parse_bind(
        &mut self,
        binds: &mut Vec<(Identifier, ExprRef)>,
        obj_level: u32,
    ) -> Result<(), StaticError> {
        let name_tok = self.pop_expect(TokenKind::Identifier, "parsing local variable")?;
        let id = self.interner.intern(&name_tok.data);
        if binds.iter().any(|(existing, _)| *existing == id) {
            return Err(StaticError::new(
                name_tok.loc,
                format!("Duplicate local var: {}", name_tok.data),
            ));
        }
        let params = if self.peek().kind == TokenKind::ParenL {
            self.pop();
            Some(self.parse_identifier_list("function parameter")?)
        } else {
            None
        };
        self.pop_expect_op("=", "parsing local variable")?;
        let body = self.parse(MAX_PRECEDENCE, obj_level)?;
        let init = match params {
            Some(params) => expr(
                ExprKind::Function {
                    params: params.into(),
                    body: Rc::clone(&body),
                },
                body.loc.clone(),
            ),
            None => body,
        };
        binds.push((id, init));
        Ok(())
    }

    fn parse_identifier_list(&mut self, context: &str) -> Result<Vec<Identifier>, StaticError> {
        let mut ids = Vec::new();
        let mut first = true;
        loop {
            if self.peek().kind == TokenKind::ParenR {
                self.pop();
                return Ok(ids);
            }
            if !first {
                let comma = self.pop();
                if comma.kind != TokenKind::Comma {
                    return Err(self.unexpected(&comma, context));
                }
                if self.peek().kind == TokenKind::ParenR {
                    self.pop();
                    return Ok(ids);
                }
            }
            first = false;
            let tok = self.pop_expect(TokenKind::Identifier, context)?;
            ids.push(self.interner.intern(&tok.data));
        }
    }

    /// Comma-separated expressions up to a closing token. Allows a trailing
    /// comma. Returns the elements and the closing token.
    fn parse_comma_list(
        &mut self,
        close: TokenKind,
        context: &str,
        obj_level: u32,
    ) -> Result<(Vec<ExprRef>, Token), StaticError> {
        let mut elements = Vec::new();
        let mut first = true;
        loop {
            if self.peek().kind == close {
                return Ok((elements, self.pop()));
            }
            if !first {
                let comma = self.pop();
                if comma.kind != TokenKind::Comma {
                    return Err(StaticError::new(
                        comma.loc,
                        format!("Expected a comma before next {context}."),
                    ));
                }
                if self.peek().kind == close {
                    return Ok((elements, self.pop()));
                }
            }
            first = false;
            elements.push(self.parse(MAX_PRECEDENCE, obj_level)?);
        }
    }

    /// Wraps `body` with the object-level locals, when there are any.
    fn wrap_object_locals(let_binds: &[(Identifier, ExprRef)], body: ExprRef) -> ExprRef {
        if let_binds.is_empty() {
            return body;
        }
        let loc = body.loc.clone();
        expr(
            ExprKind::Local {
                binds: let_binds.to_vec(),
                body,
            },
            loc,
        )
    }

    /// Parses the remainder of an object literal or object comprehension,
    /// after the opening brace. Returns the object expression and the
    /// closing brace token.
    fn parse_object_remainder(
        &mut self,
        open: Token,
        obj_level: u32,
    ) -> Result<(ExprRef, Token), StaticError> {
        let mut literal_fields: Vec<String> = Vec::new();
        let mut fields: Vec<ObjectFieldAst> = Vec::new();
        let mut asserts: Vec<ObjectAssert> = Vec::new();
        let mut let_binds: Vec<(Identifier, ExprRef)> = Vec::new();

        // Hidden binding to let $ refer to the outermost object.
        if obj_level == 0 {
            let dollar = self.interner.intern("$");
            let_binds.push((dollar, expr(ExprKind::SelfExpr, open.loc.clone())));
        }

        let mut got_comma = true;
        let mut last_was_local = false;
        loop {
            let mut next = self.pop();
            if !got_comma && next.kind == TokenKind::Comma {
                next = self.pop();
                got_comma = true;
            }
            if next.kind == TokenKind::BraceR {
                let fields = fields
                    .into_iter()
                    .map(|f| ObjectFieldAst {
                        name: f.name,
                        hide: f.hide,
                        body: Self::wrap_object_locals(&let_binds, f.body),
                    })
                    .collect();
                let asserts = asserts
                    .into_iter()
                    .map(|a| ObjectAssert {
                        cond: Self::wrap_object_locals(&let_binds, a.cond),
                        msg: a.msg.map(|m| Self::wrap_object_locals(&let_binds, m)),
                    })
                    .collect();
                let loc = span(&open.loc, &next.loc);
                return Ok((expr(ExprKind::Object { fields, asserts }, loc), next));
            }
            if next.kind == TokenKind::For {
                // Object comprehension: exactly one field, nothing else.
                if fields.len() != 1 {
                    return Err(StaticError::new(
                        next.loc,
                        "Object composition can only have one field/value pair.",
                    ));
                }
                if last_was_local {
                    return Err(StaticError::new(
                        next.loc,
                        "Locals must appear first in an object comprehension.",
                    ));
                }
                if !asserts.is_empty() {
                    return Err(StaticError::new(
                        next.loc,
                        "Object comprehensions cannot have assertions.",
                    ));
                }
                if got_comma {
                    return Err(StaticError::new(next.loc, "Unexpected comma before for."));
                }
                let field = fields.remove(0);
                if field.hide != Hide::Inherit {
                    return Err(StaticError::new(
                        next.loc,
                        "Object comprehensions cannot have hidden fields.",
                    ));
                }
                let value = Self::wrap_object_locals(&let_binds, field.body);
                let id_tok =
                    self.pop_expect(TokenKind::Identifier, "parsing object comprehension")?;
                let id = self.interner.intern(&id_tok.data);
                self.pop_expect(TokenKind::In, "parsing object comprehension")?;
                let array = self.parse(MAX_PRECEDENCE, obj_level)?;
                let last = self.pop_expect(TokenKind::BraceR, "parsing object comprehension")?;
                let loc = span(&open.loc, &last.loc);
                return Ok((
                    expr(
                        ExprKind::ObjectComp {
                            field: field.name,
                            value,
                            id,
                            array,
                        },
                        loc,
                    ),
                    last,
                ));
            }
            if !got_comma {
                return Err(StaticError::new(
                    next.loc,
                    "Expected a comma before next field.",
                ));
            }
            match next.kind {
                TokenKind::Identifier | TokenKind::Str => {
                    last_was_local = false;
                    let mut params = None;
                    if self.peek().kind == TokenKind::ParenL {
                        self.pop();
                        params = Some(self.parse_identifier_list("method parameter")?);
                    }
                    let mut plus_sugar = false;
                    let mut plus_loc = next.loc.clone();
                    if self.peek().kind == TokenKind::Operator && self.peek().data == "+" {
                        plus_loc = self.pop().loc;
                        plus_sugar = true;
                    }
                    if params.is_some() && plus_sugar {
                        return Err(StaticError::new(
                            next.loc,
                            format!("Cannot use +: syntax sugar in a method: {}", next.data),
                        ));
                    }
                    let hide = self.parse_hide()?;
                    if literal_fields.contains(&next.data) {
                        return Err(StaticError::new(
                            next.loc,
                            format!("Duplicate field: {}", next.data),
                        ));
                    }
                    literal_fields.push(next.data.clone());
                    let name = expr(
                        ExprKind::LiteralString(Rc::from(next.data.as_str())),
                        next.loc.clone(),
                    );
                    let mut body = self.parse(MAX_PRECEDENCE, obj_level + 1)?;
                    if let Some(params) = params {
                        let loc = body.loc.clone();
                        body = expr(
                            ExprKind::Function {
                                params: params.into(),
                                body,
                            },
                            loc,
                        );
                    }
                    if plus_sugar {
                        let super_f = expr(
                            ExprKind::Index {
                                target: expr(ExprKind::Super, plus_loc.clone()),
                                index: expr(
                                    ExprKind::LiteralString(Rc::from(next.data.as_str())),
                                    plus_loc.clone(),
                                ),
                            },
                            plus_loc,
                        );
                        let loc = body.loc.clone();
                        body = expr(
                            ExprKind::Binary {
                                left: super_f,
                                op: BinaryOp::Plus,
                                right: body,
                            },
                            loc,
                        );
                    }
                    fields.push(ObjectFieldAst { name, hide, body });
                }
                TokenKind::Local => {
                    last_was_local = true;
                    self.parse_bind(&mut let_binds, obj_level)?;
                }
                TokenKind::BracketL => {
                    last_was_local = false;
                    let name = self.parse(MAX_PRECEDENCE, obj_level)?;
                    self.pop_expect(TokenKind::BracketR, "parsing computed field name")?;
                    let hide = self.parse_hide()?;
                    let body = self.parse(MAX_PRECEDENCE, obj_level + 1)?;
                    fields.push(ObjectFieldAst { name, hide, body });
                }
                TokenKind::Assert => {
                    last_was_local = false;
                    let cond = self.parse(MAX_PRECEDENCE, obj_level + 1)?;
                    let msg = if self.peek().kind == TokenKind::Colon {
                        self.pop();
                        Some(self.parse(MAX_PRECEDENCE, obj_level + 1)?)
                    } else {
                        None
                    };
                    asserts.push(ObjectAssert { cond, msg });
                }
                _ => return Err(self.unexpected(&next, "parsing field definition")),
            }
            got_comma = false;
        }
    }

    /// `:` inherit, `::` hidden, `:::` visible.
    fn parse_hide(&mut self) -> Result<Hide, StaticError> {
        self.pop_expect(TokenKind::Colon, "parsing field definition")?;
        let mut hide = Hide::Inherit;
        if self.peek().kind == TokenKind::Colon {
            self.pop();
            hide = Hide::Hidden;
            if self.peek().kind == TokenKind::Colon {
                self.pop();
                hide = Hide::Visible;
            }
        }
        Ok(hide)
    }

    fn parse_terminal(&mut self, obj_level: u32) -> Result<ExprRef, StaticError> {
        let tok = self.pop();
        match tok.kind {
            TokenKind::BraceL => {
                let (obj, _) = self.parse_object_remainder(tok, obj_level)?;
                Ok(obj)
            }
            TokenKind::BracketL => self.parse_array_remainder(tok, obj_level),
            TokenKind::ParenL => {
                let inner = self.parse(MAX_PRECEDENCE, obj_level)?;
                self.pop_expect(TokenKind::ParenR, "parsing parenthesised expression")?;
                Ok(inner)
            }
            TokenKind::Number => {
                // The lexer guarantees the shape; the value may still round
                // to infinity, which evaluation rejects at the literal.
                let value = tok
                    .data
                    .parse::<f64>()
                    .unwrap_or_else(|_| unreachable!("lexer produced malformed number"));
                Ok(expr(ExprKind::LiteralNumber(value), tok.loc))
            }
            TokenKind::Str => Ok(expr(
                ExprKind::LiteralString(Rc::from(tok.data.as_str())),
                tok.loc,
            )),
            TokenKind::False => Ok(expr(ExprKind::LiteralBool(false), tok.loc)),
            TokenKind::True => Ok(expr(ExprKind::LiteralBool(true), tok.loc)),
            TokenKind::NullLit => Ok(expr(ExprKind::LiteralNull, tok.loc)),
            TokenKind::Import | TokenKind::ImportStr => {
                let is_code = tok.kind == TokenKind::Import;
                let file = self.pop();
                if file.kind != TokenKind::Str {
                    return Err(StaticError::new(
                        file.loc,
                        "Computed imports are not allowed.",
                    ));
                }
                let loc = span(&tok.loc, &file.loc);
                let path: Rc<str> = Rc::from(file.data.as_str());
                Ok(expr(
                    if is_code {
                        ExprKind::Import(path)
                    } else {
                        ExprKind::ImportStr(path)
                    },
                    loc,
                ))
            }
            TokenKind::Dollar => {
                if obj_level == 0 {
                    return Err(StaticError::new(tok.loc, "No top-level object found."));
                }
                let id = self.interner.intern("$");
                Ok(expr(ExprKind::Var(id), tok.loc))
            }
            TokenKind::Identifier => {
                let id = self.interner.intern(&tok.data);
                Ok(expr(ExprKind::Var(id), tok.loc))
            }
            TokenKind::SelfTok => Ok(expr(ExprKind::SelfExpr, tok.loc)),
            TokenKind::SuperTok => Ok(expr(ExprKind::Super, tok.loc)),
            TokenKind::EndOfFile => {
                Err(StaticError::new(tok.loc, "Unexpected end of file."))
            }
            _ => Err(self.unexpected(&tok, "parsing terminal")),
        }
    }

    /// The remainder of `[...]`: an array literal or an array comprehension.
    /// Comprehensions lower to `std.map` / `std.filterMap`.
    fn parse_array_remainder(
        &mut self,
        open: Token,
        obj_level: u32,
    ) -> Result<ExprRef, StaticError> {
        if self.peek().kind == TokenKind::BracketR {
            let close = self.pop();
            return Ok(expr(ExprKind::Array(Vec::new()), span(&open.loc, &close.loc)));
        }
        let first = self.parse(MAX_PRECEDENCE, obj_level)?;
        if self.peek().kind == TokenKind::For {
            self.pop();
            let id_tok = self.pop_expect(TokenKind::Identifier, "parsing array comprehension")?;
            let id = self.interner.intern(&id_tok.data);
            let map_func = expr(
                ExprKind::Function {
                    params: Rc::from([id]),
                    body: Rc::clone(&first),
                },
                first.loc.clone(),
            );
            self.pop_expect(TokenKind::In, "parsing array comprehension")?;
            let array = self.parse(MAX_PRECEDENCE, obj_level)?;
            let next = self.pop();
            match next.kind {
                TokenKind::BracketR => {
                    let map = self.std_field("map", &open.loc);
                    Ok(expr(
                        ExprKind::Apply {
                            target: map,
                            args: vec![map_func, array],
                            tailstrict: false,
                        },
                        span(&open.loc, &next.loc),
                    ))
                }
                TokenKind::If => {
                    let cond = self.parse(MAX_PRECEDENCE, obj_level)?;
                    let last = self.pop_expect(TokenKind::BracketR, "parsing array comprehension")?;
                    let filter_func = expr(
                        ExprKind::Function {
                            params: Rc::from([id]),
                            body: cond,
                        },
                        first.loc.clone(),
                    );
                    let filter_map = self.std_field("filterMap", &open.loc);
                    Ok(expr(
                        ExprKind::Apply {
                            target: filter_map,
                            args: vec![filter_func, map_func, array],
                            tailstrict: false,
                        },
                        span(&open.loc, &last.loc),
                    ))
                }
                _ => Err(StaticError::new(
                    next.loc.clone(),
                    format!("Expected if or ] after for clause, got: {next}"),
                )),
            }
        } else {
            let mut elements = vec![first];
            loop {
                let mut got_comma = false;
                if self.peek().kind == TokenKind::Comma {
                    self.pop();
                    got_comma = true;
                }
                if self.peek().kind == TokenKind::BracketR {
                    let close = self.pop();
                    return Ok(expr(
                        ExprKind::Array(elements),
                        span(&open.loc, &close.loc),
                    ));
                }
                if !got_comma {
                    return Err(StaticError::new(
                        self.peek().loc.clone(),
                        "Expected a comma before next array element.",
                    ));
                }
                elements.push(self.parse(MAX_PRECEDENCE, obj_level)?);
            }
        }
    }

    /// `e[i]`, `e[a:b]`, `e[a:b:c]` and the empty-bound variants. Slices
    /// lower to `std.slice` with `null` for absent bounds.
    fn parse_index_or_slice(
        &mut self,
        lhs: ExprRef,
        obj_level: u32,
    ) -> Result<ExprRef, StaticError> {
        let begin = lhs.loc.clone();
        let mut parts: [Option<ExprRef>; 3] = [None, None, None];
        let mut section = 0usize;
        let end = loop {
            match self.peek().kind {
                TokenKind::BracketR => break self.pop(),
                TokenKind::Colon => {
                    let colon = self.pop();
                    section += 1;
                    if section > 2 {
                        return Err(StaticError::new(colon.loc, "Too many colons in slice."));
                    }
                }
                _ => {
                    if parts[section].is_some() {
                        let tok = self.pop();
                        return Err(self.unexpected(&tok, "parsing index"));
                    }
                    parts[section] = Some(self.parse(MAX_PRECEDENCE, obj_level)?);
                }
            }
        };
        let loc = span(&begin, &end.loc);
        if section == 0 {
            let Some(index) = parts[0].take() else {
                return Err(StaticError::new(loc, "Index requires an expression."));
            };
            return Ok(expr(ExprKind::Index { target: lhs, index }, loc));
        }
        let null_at = |part: &mut Option<ExprRef>, loc: &LocationRange| {
            part.take()
                .unwrap_or_else(|| expr(ExprKind::LiteralNull, loc.clone()))
        };
        let slice = self.std_field("slice", &loc);
        let args = vec![
            lhs,
            null_at(&mut parts[0], &loc),
            null_at(&mut parts[1], &loc),
            null_at(&mut parts[2], &loc),
        ];
        Ok(expr(
            ExprKind::Apply {
                target: slice,
                args,
                tailstrict: false,
            },
            loc,
        ))
    }

    pub(crate) fn parse(
        &mut self,
        precedence: u8,
        obj_level: u32,
    ) -> Result<ExprRef, StaticError> {
        let begin = self.peek().clone();
        match begin.kind {
            // These parse at effectively maximum precedence.
            TokenKind::Error => {
                self.pop();
                let inner = self.parse(MAX_PRECEDENCE, obj_level)?;
                let loc = span(&begin.loc, &inner.loc);
                return Ok(expr(ExprKind::Error(inner), loc));
            }
            TokenKind::Assert => {
                self.pop();
                let cond = self.parse(MAX_PRECEDENCE, obj_level)?;
                let msg = if self.peek().kind == TokenKind::Colon {
                    self.pop();
                    Some(self.parse(MAX_PRECEDENCE, obj_level)?)
                } else {
                    None
                };
                self.pop_expect(TokenKind::Semicolon, "parsing assert expression")?;
                let rest = self.parse(MAX_PRECEDENCE, obj_level)?;
                let loc = span(&begin.loc, &rest.loc);
                return Ok(expr(ExprKind::Assert { cond, msg, rest }, loc));
            }
            TokenKind::If => {
                self.pop();
                let cond = self.parse(MAX_PRECEDENCE, obj_level)?;
                self.pop_expect(TokenKind::Then, "parsing conditional")?;
                let then_branch = self.parse(MAX_PRECEDENCE, obj_level)?;
                let else_branch = if self.peek().kind == TokenKind::Else {
                    self.pop();
                    self.parse(MAX_PRECEDENCE, obj_level)?
                } else {
                    expr(ExprKind::LiteralNull, span(&begin.loc, &then_branch.loc))
                };
                let loc = span(&begin.loc, &else_branch.loc);
                return Ok(expr(
                    ExprKind::Conditional {
                        cond,
                        then_branch,
                        else_branch,
                    },
                    loc,
                ));
            }
            TokenKind::Function => {
                self.pop();
                self.pop_expect(TokenKind::ParenL, "parsing function literal")?;
                let params = self.parse_identifier_list("function parameter")?;
                let body = self.parse(MAX_PRECEDENCE, obj_level)?;
                let loc = span(&begin.loc, &body.loc);
                return Ok(expr(
                    ExprKind::Function {
                        params: params.into(),
                        body,
                    },
                    loc,
                ));
            }
            TokenKind::Local => {
                self.pop();
                let mut binds = Vec::new();
                loop {
                    self.parse_bind(&mut binds, obj_level)?;
                    let delim = self.pop();
                    match delim.kind {
                        TokenKind::Semicolon => break,
                        TokenKind::Comma => {}
                        _ => {
                            return Err(StaticError::new(
                                delim.loc.clone(),
                                format!("Expected , or ; but got {delim}"),
                            ));
                        }
                    }
                }
                let body = self.parse(MAX_PRECEDENCE, obj_level)?;
                let loc = span(&begin.loc, &body.loc);
                return Ok(expr(ExprKind::Local { binds, body }, loc));
            }
            _ => {}
        }

        // Unary operator.
        if begin.kind == TokenKind::Operator
            && precedence == UNARY_PRECEDENCE
            && let Some(op) = unary_op(&begin.data)
        {
            self.pop();
            let operand = self.parse(precedence, obj_level)?;
            let loc = span(&begin.loc, &operand.loc);
            return Ok(expr(ExprKind::Unary { op, expr: operand }, loc));
        }

        if precedence == 0 {
            return self.parse_terminal(obj_level);
        }

        let mut lhs = self.parse(precedence - 1, obj_level)?;
        loop {
            // The next token must be a binary operator at this precedence
            // level, otherwise hand back to the outer levels.
            let mut bop = None;
            match self.peek().kind {
                TokenKind::Operator => {
                    if self.peek().data == "%" {
                        if precedence != PERCENT_PRECEDENCE {
                            return Ok(lhs);
                        }
                    } else if self.peek().data == "!=" {
                        if BinaryOp::ManifestEqual.precedence() != precedence {
                            return Ok(lhs);
                        }
                        bop = Some(BinaryOp::ManifestEqual);
                    } else {
                        let Some(op) = binary_op(&self.peek().data) else {
                            return Err(StaticError::new(
                                self.peek().loc.clone(),
                                format!("Not a binary operator: {}", self.peek().data),
                            ));
                        };
                        if op.precedence() != precedence {
                            return Ok(lhs);
                        }
                        bop = Some(op);
                    }
                }
                TokenKind::Dot
                | TokenKind::BracketL
                | TokenKind::ParenL
                | TokenKind::BraceL => {
                    if precedence != APPLY_PRECEDENCE {
                        return Ok(lhs);
                    }
                }
                _ => return Ok(lhs),
            }

            let op = self.pop();
            match op.kind {
                TokenKind::BracketL => {
                    lhs = self.parse_index_or_slice(lhs, obj_level)?;
                }
                TokenKind::Dot => {
                    let field = self.pop_expect(TokenKind::Identifier, "parsing field access")?;
                    let index = expr(
                        ExprKind::LiteralString(Rc::from(field.data.as_str())),
                        field.loc.clone(),
                    );
                    let loc = span(&lhs.loc, &field.loc);
                    lhs = expr(ExprKind::Index { target: lhs, index }, loc);
                }
                TokenKind::ParenL => {
                    let (args, end) =
                        self.parse_comma_list(TokenKind::ParenR, "function argument", obj_level)?;
                    let mut tailstrict = false;
                    if self.peek().kind == TokenKind::TailStrict {
                        self.pop();
                        tailstrict = true;
                    }
                    let loc = span(&lhs.loc, &end.loc);
                    lhs = expr(
                        ExprKind::Apply {
                            target: lhs,
                            args,
                            tailstrict,
                        },
                        loc,
                    );
                }
                TokenKind::BraceL => {
                    let (obj, end) = self.parse_object_remainder(op, obj_level)?;
                    let loc = span(&lhs.loc, &end.loc);
                    lhs = expr(
                        ExprKind::Binary {
                            left: lhs,
                            op: BinaryOp::Plus,
                            right: obj,
                        },
                        loc,
                    );
                }
                TokenKind::Operator if op.data == "%" => {
                    let rhs = self.parse(precedence - 1, obj_level)?;
                    let target = self.std_field("mod", &op.loc);
                    let loc = span(&lhs.loc, &rhs.loc);
                    lhs = expr(
                        ExprKind::Apply {
                            target,
                            args: vec![lhs, rhs],
                            tailstrict: false,
                        },
                        loc,
                    );
                }
                _ => {
                    let invert = op.data == "!=";
                    let rhs = self.parse(precedence - 1, obj_level)?;
                    let loc = span(&lhs.loc, &rhs.loc);
                    lhs = expr(
                        ExprKind::Binary {
                            left: lhs,
                            op: bop.unwrap_or_else(|| unreachable!("operator without mapping")),
                            right: rhs,
                        },
                        loc.clone(),
                    );
                    if invert {
                        lhs = expr(
                            ExprKind::Unary {
                                op: UnaryOp::Not,
                                expr: lhs,
                            },
                            loc,
                        );
                    }
                }
            }
        }
    }
}

/// Parses a whole source file into a core AST, without the std wrapper and
/// without static analysis.
pub(crate) fn parse_source(
    source: &str,
    filename: &str,
    interner: &mut Interner,
) -> Result<ExprRef, StaticError> {
    let file: Rc<str> = Rc::from(filename);
    let tokens = lex(&file, source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        interner,
    };
    let root = parser.parse(MAX_PRECEDENCE, 0)?;
    let trailing = parser.pop();
    if trailing.kind != TokenKind::EndOfFile {
        return Err(StaticError::new(
            trailing.loc.clone(),
            format!("Did not expect: {trailing}"),
        ));
    }
    Ok(root)
}
