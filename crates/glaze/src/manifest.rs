//! Manifestation: turning the final value into text.
//!
//! Walking a value forces every remaining thunk, evaluates object fields
//! through the normal field-lookup path, and runs object assertions before
//! any field is emitted. All of that can allocate, so the value being
//! manifested is kept reachable through a call frame while its parts are
//! forced. JSON output uses three-space indentation with keys in
//! alphabetical order; numbers that equal their floor print as integers.

use std::{fmt::Write, rc::Rc};

use indexmap::IndexMap;

use crate::{
    builtins::{FormatCode, FormatPart, parse_format},
    error::{LocationRange, RunResult},
    heap::HeapId,
    import::ImportResolver,
    intern::Identifier,
    tracer::EvalTracer,
    value::{ObjectCell, ThunkState, Value},
    vm::{ArgValues, Cont, Interpreter},
};

/// Unparses a double: integers print without a fraction, everything else as
/// the shortest string that round-trips.
pub(crate) fn unparse_number(v: f64) -> String {
    if v == v.floor() {
        format!("{v:.0}")
    } else {
        let mut buffer = ryu::Buffer::new();
        buffer.format_finite(v).to_string()
    }
}

/// JSON-escapes a string, quotes included. Control characters, DEL, and the
/// C1 range are emitted as `\u00XX`.
pub(crate) fn unparse_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || (0x7f..=0x9f).contains(&(c as u32)) => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

impl<R: ImportResolver, T: EvalTracer> Interpreter<'_, R, T> {
    /// Renders the scratch value as a one-line string, used by `+` string
    /// coercion and `%s` formatting.
    pub(crate) fn to_display_string(&mut self, loc: &LocationRange) -> RunResult<String> {
        self.manifest_json(loc, false, "")
    }

    /// Manifests the scratch value as JSON. `multiline` selects the
    /// pretty-printed form.
    pub(crate) fn manifest_json(
        &mut self,
        loc: &LocationRange,
        multiline: bool,
        indent: &str,
    ) -> RunResult<String> {
        let mut out = String::new();
        match self.scratch {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
            Value::Number(v) => out.push_str(&unparse_number(v)),
            Value::Function(_) => {
                return Err(self.error(loc, "Couldn't manifest function in JSON output."));
            }
            Value::Str(id) => out.push_str(&unparse_escape(self.heap.str_value(id))),
            Value::Array(arr_id) => {
                let elements = self.heap.array(arr_id).clone();
                if elements.is_empty() {
                    out.push_str("[ ]");
                } else {
                    let indent2 = if multiline {
                        format!("{indent}   ")
                    } else {
                        indent.to_string()
                    };
                    let mut prefix = if multiline { "[\n" } else { "[" };
                    for th in elements {
                        let tloc = self.thunk_loc(th, loc);
                        self.enter_thunk_protected(loc, th)?;
                        let element = self.manifest_json(&tloc, multiline, &indent2)?;
                        self.scratch = self.top_frame().val;
                        self.pop_frame();
                        out.push_str(prefix);
                        out.push_str(&indent2);
                        out.push_str(&element);
                        prefix = if multiline { ",\n" } else { ", " };
                    }
                    if multiline {
                        out.push('\n');
                    }
                    out.push_str(indent);
                    out.push(']');
                }
            }
            Value::Object(obj_id) => {
                self.run_object_asserts(loc, obj_id)?;
                let fields = self.sorted_visible_fields(obj_id);
                if fields.is_empty() {
                    out.push_str("{ }");
                } else {
                    let indent2 = if multiline {
                        format!("{indent}   ")
                    } else {
                        indent.to_string()
                    };
                    let mut prefix = if multiline { "{\n" } else { "{" };
                    for (name, fid) in fields {
                        let body = self.object_index(loc, obj_id, fid)?;
                        let saved = self.scratch;
                        self.top_frame_mut().val = saved;
                        self.evaluate(Rc::clone(&body))?;
                        let vstr = self.manifest_json(&body.loc, multiline, &indent2)?;
                        self.scratch = self.top_frame().val;
                        self.pop_frame();
                        out.push_str(prefix);
                        out.push_str(&indent2);
                        out.push_str(&unparse_escape(&name));
                        out.push_str(": ");
                        out.push_str(&vstr);
                        prefix = if multiline { ",\n" } else { ", " };
                    }
                    if multiline {
                        out.push('\n');
                    }
                    out.push_str(indent);
                    out.push('}');
                }
            }
        }
        Ok(out)
    }

    /// String-output mode: the scratch value must already be a string.
    pub(crate) fn manifest_string(&mut self, loc: &LocationRange) -> RunResult<String> {
        match self.scratch {
            Value::Str(id) => Ok(self.heap.str_value(id).to_string()),
            other => Err(self.error(
                loc,
                format!("Expected string result, got: {}", other.kind_str()),
            )),
        }
    }

    /// Multi-file mode: the scratch value must be an object; every field
    /// manifests to its own document. Keys come back alphabetically.
    pub(crate) fn manifest_multi(
        &mut self,
        string_output: bool,
    ) -> RunResult<IndexMap<String, String>> {
        let loc = LocationRange::synthetic("During manifestation");
        let Value::Object(obj_id) = self.scratch else {
            return Err(self.error(
                &loc,
                format!(
                    "Multi mode: Top-level object was a {}, should be an object whose keys are \
                     filenames and values hold the JSON for that file.",
                    self.scratch.kind_str()
                ),
            ));
        };
        self.run_object_asserts(&loc, obj_id)?;
        let mut result = IndexMap::new();
        for (name, fid) in self.sorted_visible_fields(obj_id) {
            let body = self.object_index(&loc, obj_id, fid)?;
            let saved = self.scratch;
            self.top_frame_mut().val = saved;
            self.evaluate(Rc::clone(&body))?;
            let document = if string_output {
                self.manifest_string(&body.loc)?
            } else {
                self.manifest_json(&body.loc, true, "")?
            };
            self.scratch = self.top_frame().val;
            self.pop_frame();
            result.insert(name, document);
        }
        Ok(result)
    }

    /// Stream mode: the scratch value must be an array; every element
    /// manifests to its own document, in order.
    pub(crate) fn manifest_stream(&mut self) -> RunResult<Vec<String>> {
        let loc = LocationRange::synthetic("During manifestation");
        let Value::Array(arr_id) = self.scratch else {
            return Err(self.error(
                &loc,
                format!(
                    "Stream mode: Top-level value was a {}, should be an array of documents.",
                    self.scratch.kind_str()
                ),
            ));
        };
        let elements = self.heap.array(arr_id).clone();
        let mut documents = Vec::with_capacity(elements.len());
        for th in elements {
            let tloc = self.thunk_loc(th, &loc);
            self.enter_thunk_protected(&loc, th)?;
            let document = self.manifest_json(&tloc, true, "")?;
            self.scratch = self.top_frame().val;
            self.pop_frame();
            documents.push(document);
        }
        Ok(documents)
    }

    /// Source location of a thunk's body, for diagnostics; falls back to the
    /// manifestation site when the thunk is already forced.
    fn thunk_loc(&self, th: HeapId, fallback: &LocationRange) -> LocationRange {
        match &self.heap.thunk(th).state {
            ThunkState::Pending { body, .. } => body.loc.clone(),
            ThunkState::Filled(_) => fallback.clone(),
        }
    }

    /// Forces a thunk behind a call frame that also keeps the current
    /// scratch value (the container being manifested) reachable. On return
    /// the frame is still on the stack, scratch holds the element value, and
    /// the frame's `val` holds the container.
    fn enter_thunk_protected(&mut self, loc: &LocationRange, th: HeapId) -> RunResult<()> {
        match &self.heap.thunk(th).state {
            ThunkState::Filled(v) => {
                let v = *v;
                self.new_call(loc, Some(th), None, 0, crate::value::Bindings::new())?;
                let saved = self.scratch;
                self.top_frame_mut().val = saved;
                self.scratch = v;
            }
            ThunkState::Pending {
                env,
                self_obj,
                offset,
                body,
            } => {
                let (env, self_obj, offset, body) =
                    (env.clone(), *self_obj, *offset, Rc::clone(body));
                self.new_call(loc, Some(th), self_obj, offset, env)?;
                let saved = self.scratch;
                self.top_frame_mut().val = saved;
                self.evaluate(body)?;
                let value = self.scratch;
                self.heap.thunk_mut(th).fill(value);
            }
        }
        Ok(())
    }

    /// Visible fields of an object, `(name, id)`, alphabetically by name.
    fn sorted_visible_fields(&self, obj: HeapId) -> Vec<(String, Identifier)> {
        let mut fields: Vec<(String, Identifier)> = self
            .visible_fields(obj)
            .into_iter()
            .map(|fid| (self.interner.name(fid).to_string(), fid))
            .collect();
        fields.sort();
        fields
    }

    /// Evaluates every assertion of every leaf, with `self` bound to the
    /// manifested object and the super level bound to the leaf's depth, the
    /// same way a field body of that leaf would see them.
    pub(crate) fn run_object_asserts(
        &mut self,
        loc: &LocationRange,
        obj: HeapId,
    ) -> RunResult<()> {
        let mut leaves = Vec::new();
        let mut counter = 0;
        self.collect_leaves(obj, obj, 0, &mut counter, &mut leaves);
        for (leaf, depth, root) in leaves {
            let (env, asserts) = match self.heap.object(leaf) {
                ObjectCell::Simple { env, asserts, .. } => {
                    if asserts.is_empty() {
                        continue;
                    }
                    (env.clone(), asserts.clone())
                }
                _ => continue,
            };
            for assert in asserts {
                self.new_call(loc, Some(leaf), Some(root), depth, env.clone())?;
                let saved = self.scratch;
                self.top_frame_mut().val = saved;
                self.evaluate(Rc::clone(&assert.cond))?;
                let cond = self.scratch;
                let Value::Bool(cond) = cond else {
                    return Err(self.error(
                        &assert.cond.loc,
                        format!(
                            "Object assertion condition must be boolean, got {}.",
                            cond.kind_str()
                        ),
                    ));
                };
                if !cond {
                    let Some(msg) = &assert.msg else {
                        return Err(self.error(&assert.cond.loc, "Object assertion failed."));
                    };
                    self.evaluate(Rc::clone(msg))?;
                    let Value::Str(id) = self.scratch else {
                        return Err(self.error(
                            &msg.loc,
                            format!(
                                "Object assertion message must be string, got {}.",
                                self.scratch.kind_str()
                            ),
                        ));
                    };
                    return Err(self.error(&assert.cond.loc, self.heap.str_value(id).to_string()));
                }
                self.scratch = self.top_frame().val;
                self.pop_frame();
            }
        }
        Ok(())
    }

    /// Enumerates the leaves of an object's tree with their depths, in the
    /// same right-to-left order field lookup uses.
    fn collect_leaves(
        &self,
        root: HeapId,
        curr: HeapId,
        start_from: u32,
        counter: &mut u32,
        out: &mut Vec<(HeapId, u32, HeapId)>,
    ) {
        match self.heap.object(curr) {
            ObjectCell::Extended { left, right } => {
                let (left, right) = (*left, *right);
                self.collect_leaves(root, right, start_from, counter, out);
                self.collect_leaves(root, left, start_from, counter, out);
            }
            ObjectCell::Super { root: sroot, offset } => {
                let (sroot, offset) = (*sroot, *offset);
                let mut counter2 = 0;
                self.collect_leaves(sroot, sroot, offset, &mut counter2, out);
            }
            ObjectCell::Simple { .. } | ObjectCell::Comprehension { .. } => {
                if *counter >= start_from {
                    out.push((curr, *counter, root));
                }
                *counter += 1;
            }
        }
    }

    /// `std.format(str, vals)`: printf-style formatting. `vals` is consumed
    /// positionally from an array (or a single scalar), or by key from an
    /// object when the string uses `%(key)` codes.
    pub(crate) fn builtin_format(
        &mut self,
        loc: &LocationRange,
        args: &ArgValues,
    ) -> RunResult<Cont> {
        let Value::Str(fmt_id) = args[0] else {
            return Err(self.error(
                loc,
                format!("format expected string, got {}", args[0].kind_str()),
            ));
        };
        let fmt = Rc::clone(self.heap.str_value(fmt_id));
        let parts = parse_format(&fmt).map_err(|msg| self.error(loc, msg))?;
        let named = parts.iter().any(|part| {
            matches!(part, FormatPart::Code(code) if code.key.is_some())
        });
        let mut out = String::new();
        if named {
            let Value::Object(obj_id) = args[1] else {
                return Err(self.error(
                    loc,
                    format!(
                        "Format with named codes expected object, got {}",
                        args[1].kind_str()
                    ),
                ));
            };
            for part in &parts {
                match part {
                    FormatPart::Literal(s) => out.push_str(s),
                    FormatPart::Code(code) => {
                        let Some(key) = &code.key else {
                            return Err(self.error(
                                loc,
                                "Cannot mix named and positional conversions.",
                            ));
                        };
                        let fid = self.interner.intern(key);
                        let value = self.eval_object_field(loc, obj_id, fid)?;
                        let rendered = self.format_code(loc, code, value)?;
                        out.push_str(&rendered);
                    }
                }
            }
        } else {
            let values: Vec<Value> = match args[1] {
                Value::Array(arr_id) => {
                    let elements = self.heap.array(arr_id).clone();
                    let mut values = Vec::with_capacity(elements.len());
                    for th in elements {
                        values.push(self.force_thunk(loc, th)?);
                    }
                    values
                }
                other => vec![other],
            };
            let mut next = 0;
            for part in &parts {
                match part {
                    FormatPart::Literal(s) => out.push_str(s),
                    FormatPart::Code(code) => {
                        if next >= values.len() {
                            return Err(self.error(loc, "Not enough values to format."));
                        }
                        let rendered = self.format_code(loc, code, values[next])?;
                        out.push_str(&rendered);
                        next += 1;
                    }
                }
            }
            if next < values.len() {
                return Err(self.error(
                    loc,
                    format!("Too many values to format: {}, expected {next}", values.len()),
                ));
            }
        }
        self.scratch = self.make_string(&out);
        Ok(Cont::Pop)
    }

    /// Evaluates one object field to a value, preserving scratch.
    fn eval_object_field(
        &mut self,
        loc: &LocationRange,
        obj: HeapId,
        fid: Identifier,
    ) -> RunResult<Value> {
        let body = self.object_index(loc, obj, fid)?;
        let saved = self.scratch;
        self.top_frame_mut().val = saved;
        self.evaluate(body)?;
        let value = self.scratch;
        self.scratch = self.top_frame().val;
        self.pop_frame();
        Ok(value)
    }

    fn format_number(&self, loc: &LocationRange, code: &FormatCode, v: Value) -> RunResult<f64> {
        match v {
            Value::Number(n) => Ok(n),
            other => Err(self.error(
                loc,
                format!(
                    "Format code %{} expected number, got {}",
                    code.conversion,
                    other.kind_str()
                ),
            )),
        }
    }

    /// Renders one conversion.
    fn format_code(
        &mut self,
        loc: &LocationRange,
        code: &FormatCode,
        value: Value,
    ) -> RunResult<String> {
        let body = match code.conversion {
            'd' | 'i' | 'u' => {
                let n = self.format_number(loc, code, value)?;
                render_int(n, 10, false, code)
            }
            'o' => {
                let n = self.format_number(loc, code, value)?;
                render_int(n, 8, false, code)
            }
            'x' => {
                let n = self.format_number(loc, code, value)?;
                render_int(n, 16, false, code)
            }
            'X' => {
                let n = self.format_number(loc, code, value)?;
                render_int(n, 16, true, code)
            }
            'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
                let n = self.format_number(loc, code, value)?;
                render_float(n, code)
            }
            'c' => match value {
                Value::Number(n) => {
                    let c = u32::try_from(n as i64).ok().and_then(char::from_u32);
                    let Some(c) = c else {
                        return Err(
                            self.error(loc, format!("%c expected a valid codepoint, got {n}"))
                        );
                    };
                    c.to_string()
                }
                Value::Str(id) => {
                    let s = Rc::clone(self.heap.str_value(id));
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => c.to_string(),
                        _ => {
                            return Err(self.error(loc, "%c expected 1-sized string".to_string()));
                        }
                    }
                }
                other => {
                    return Err(self.error(
                        loc,
                        format!("%c expected number / string, got {}", other.kind_str()),
                    ));
                }
            },
            's' => match value {
                Value::Str(id) => self.heap.str_value(id).to_string(),
                other => {
                    self.scratch = other;
                    self.to_display_string(loc)?
                }
            },
            conv => {
                return Err(self.error(loc, format!("Unrecognised conversion type: {conv}")));
            }
        };
        Ok(pad(body, code))
    }
}

/// Applies width padding per the code's flags.
fn pad(body: String, code: &FormatCode) -> String {
    let Some(width) = code.width else {
        return body;
    };
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let padding = width - len;
    if code.left_align {
        let mut out = body;
        out.extend(std::iter::repeat_n(' ', padding));
        out
    } else if code.zero_pad && !body.is_empty() {
        // Zero padding goes after any sign.
        let (sign, digits) = match body.chars().next() {
            Some(c @ ('-' | '+' | ' ')) => (Some(c), &body[c.len_utf8()..]),
            _ => (None, body.as_str()),
        };
        let mut out = String::new();
        if let Some(sign) = sign {
            out.push(sign);
        }
        out.extend(std::iter::repeat_n('0', padding));
        out.push_str(digits);
        out
    } else {
        let mut out = String::new();
        out.extend(std::iter::repeat_n(' ', padding));
        out.push_str(&body);
        out
    }
}

fn sign_prefix(negative: bool, code: &FormatCode) -> &'static str {
    if negative {
        "-"
    } else if code.plus_sign {
        "+"
    } else if code.blank_sign {
        " "
    } else {
        ""
    }
}

fn render_int(v: f64, radix: u32, upper: bool, code: &FormatCode) -> String {
    let i = v.trunc() as i64;
    let magnitude = i.unsigned_abs();
    let mut digits = match radix {
        8 => format!("{magnitude:o}"),
        16 => format!("{magnitude:x}"),
        _ => format!("{magnitude}"),
    };
    if upper {
        digits = digits.to_uppercase();
    }
    if let Some(precision) = code.precision {
        while digits.len() < precision {
            digits.insert(0, '0');
        }
    }
    let alternate = match (code.alternate, radix) {
        (true, 8) => "0",
        (true, 16) => {
            if upper {
                "0X"
            } else {
                "0x"
            }
        }
        _ => "",
    };
    format!("{}{}{}", sign_prefix(i < 0, code), alternate, digits)
}

fn render_float(v: f64, code: &FormatCode) -> String {
    let upper = code.conversion.is_ascii_uppercase();
    let conv = code.conversion.to_ascii_lowercase();
    let precision = code.precision.unwrap_or(6);
    let magnitude = v.abs();
    let body = match conv {
        'f' => format!("{magnitude:.precision$}"),
        'e' => exp_style(magnitude, precision, false),
        _ => {
            // %g: pick fixed or scientific by the decimal exponent.
            let p = precision.max(1);
            let exponent = if magnitude == 0.0 {
                0
            } else {
                magnitude.log10().floor() as i32
            };
            if exponent >= -4 && exponent < p as i32 {
                let fixed_precision = (p as i32 - 1 - exponent).max(0) as usize;
                let s = format!("{magnitude:.fixed_precision$}");
                if code.alternate { s } else { trim_fraction(s) }
            } else {
                exp_style(magnitude, p - 1, !code.alternate)
            }
        }
    };
    let body = if upper { body.to_uppercase() } else { body };
    format!("{}{body}", sign_prefix(v < 0.0, code))
}

/// `%e` rendering with a signed, two-digit-minimum exponent.
fn exp_style(magnitude: f64, precision: usize, trim: bool) -> String {
    let rendered = format!("{magnitude:.precision$e}");
    let (mantissa, exponent) = rendered
        .split_once('e')
        .unwrap_or_else(|| unreachable!("exponential format always contains e"));
    let exponent: i32 = exponent
        .parse()
        .unwrap_or_else(|_| unreachable!("exponent is an integer"));
    let mantissa = if trim {
        trim_fraction(mantissa.to_string())
    } else {
        mantissa.to_string()
    };
    format!("{mantissa}e{}{:02}", if exponent < 0 { "-" } else { "+" }, exponent.abs())
}

/// Drops trailing zeros (and a trailing point) from a fixed rendering.
fn trim_fraction(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_print_as_integers_when_whole() {
        assert_eq!(unparse_number(0.0), "0");
        assert_eq!(unparse_number(3628800.0), "3628800");
        assert_eq!(unparse_number(-4.0), "-4");
        assert_eq!(unparse_number(2.5), "2.5");
    }

    #[test]
    fn escape_covers_control_range() {
        assert_eq!(unparse_escape("a\"b"), "\"a\\\"b\"");
        assert_eq!(unparse_escape("a\nb"), "\"a\\nb\"");
        assert_eq!(unparse_escape("\u{1}"), "\"\\u0001\"");
        assert_eq!(unparse_escape("\u{7f}"), "\"\\u007f\"");
        assert_eq!(unparse_escape("héllo"), "\"héllo\"");
    }

    #[test]
    fn int_rendering_honours_flags() {
        let code = |precision, alternate| FormatCode {
            key: None,
            left_align: false,
            plus_sign: false,
            blank_sign: false,
            alternate,
            zero_pad: false,
            width: None,
            precision,
            conversion: 'd',
        };
        assert_eq!(render_int(42.0, 10, false, &code(None, false)), "42");
        assert_eq!(render_int(-42.0, 10, false, &code(None, false)), "-42");
        assert_eq!(render_int(42.0, 10, false, &code(Some(4), false)), "0042");
        assert_eq!(render_int(255.0, 16, false, &code(None, true)), "0xff");
        assert_eq!(render_int(255.0, 16, true, &code(None, true)), "0XFF");
        assert_eq!(render_int(8.0, 8, false, &code(None, true)), "010");
    }

    #[test]
    fn exp_style_pads_exponent() {
        assert_eq!(exp_style(250.0, 6, false), "2.500000e+02");
        assert_eq!(exp_style(0.0025, 2, false), "2.50e-03");
    }
}
