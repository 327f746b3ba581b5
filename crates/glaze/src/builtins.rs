//! The table of native standard-library functions.
//!
//! Each builtin has a stable small-integer id and a fixed parameter list.
//! The std object binds one hidden field per builtin; the evaluator
//! dispatches on the id once all argument thunks have been forced.

use strum::{Display, FromRepr, IntoStaticStr};

/// Native functions reachable through the `std` object.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromRepr, IntoStaticStr)]
#[strum(serialize_all = "camelCase")]
pub(crate) enum Builtin {
    MakeArray = 0,
    Pow,
    Floor,
    Ceil,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Type,
    Filter,
    ObjectHas,
    Length,
    ObjectFields,
    Codepoint,
    Char,
    Log,
    Exp,
    Mantissa,
    Exponent,
    Modulo,
    ExtVar,
    Slice,
    Format,
}

impl Builtin {
    /// Every builtin, in id order. Used to populate the std object.
    pub const ALL: [Self; 26] = [
        Self::MakeArray,
        Self::Pow,
        Self::Floor,
        Self::Ceil,
        Self::Sqrt,
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::Asin,
        Self::Acos,
        Self::Atan,
        Self::Type,
        Self::Filter,
        Self::ObjectHas,
        Self::Length,
        Self::ObjectFields,
        Self::Codepoint,
        Self::Char,
        Self::Log,
        Self::Exp,
        Self::Mantissa,
        Self::Exponent,
        Self::Modulo,
        Self::ExtVar,
        Self::Slice,
        Self::Format,
    ];

    /// The name under which the builtin appears as a field of `std`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Parameter names, fixed per builtin.
    pub fn params(self) -> &'static [&'static str] {
        match self {
            Self::MakeArray => &["sz", "func"],
            Self::Pow => &["x", "n"],
            Self::Floor | Self::Ceil | Self::Sqrt | Self::Sin | Self::Cos | Self::Tan
            | Self::Asin | Self::Acos | Self::Atan | Self::Type | Self::Length => &["x"],
            Self::Filter => &["func", "arr"],
            Self::ObjectHas => &["obj", "f"],
            Self::ObjectFields => &["obj"],
            Self::Codepoint => &["str"],
            Self::Char | Self::Log | Self::Exp | Self::Mantissa | Self::Exponent => &["n"],
            Self::Modulo => &["a", "b"],
            Self::ExtVar => &["x"],
            Self::Slice => &["indexable", "index", "end", "step"],
            Self::Format => &["str", "vals"],
        }
    }
}

/// One parsed `%` conversion from a format string.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FormatCode {
    /// Named argument key for `%(key)s` forms.
    pub key: Option<String>,
    pub left_align: bool,
    pub plus_sign: bool,
    pub blank_sign: bool,
    pub alternate: bool,
    pub zero_pad: bool,
    pub width: Option<usize>,
    pub precision: Option<usize>,
    pub conversion: char,
}

/// A format string split into literal runs and conversions.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FormatPart {
    Literal(String),
    Code(FormatCode),
}

/// Parses a printf-style format string.
///
/// Supported: flags `- + <space> # 0`, width, `.precision`, named keys
/// `%(key)`, and the conversions `d i u o x X e E f F g G c s %`.
pub(crate) fn parse_format(fmt: &str) -> Result<Vec<FormatPart>, String> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        if !literal.is_empty() {
            parts.push(FormatPart::Literal(std::mem::take(&mut literal)));
        }
        let mut code = FormatCode {
            key: None,
            left_align: false,
            plus_sign: false,
            blank_sign: false,
            alternate: false,
            zero_pad: false,
            width: None,
            precision: None,
            conversion: 's',
        };
        if chars.peek() == Some(&'(') {
            chars.next();
            let mut key = String::new();
            loop {
                match chars.next() {
                    Some(')') => break,
                    Some(k) => key.push(k),
                    None => return Err("Truncated format key".to_string()),
                }
            }
            code.key = Some(key);
        }
        loop {
            match chars.peek() {
                Some('-') => code.left_align = true,
                Some('+') => code.plus_sign = true,
                Some(' ') => code.blank_sign = true,
                Some('#') => code.alternate = true,
                Some('0') => code.zero_pad = true,
                _ => break,
            }
            chars.next();
        }
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            chars.next();
            code.width = Some(code.width.unwrap_or(0) * 10 + d as usize);
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = 0;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                chars.next();
                precision = precision * 10 + d as usize;
            }
            code.precision = Some(precision);
        }
        match chars.next() {
            Some('%') => {
                literal.push('%');
                continue;
            }
            Some(conv) if "diuoxXeEfFgGcs".contains(conv) => code.conversion = conv,
            Some(conv) => return Err(format!("Unrecognised conversion type: {conv}")),
            None => return Err("Truncated format code".to_string()),
        }
        parts.push(FormatPart::Code(code));
    }
    if !literal.is_empty() {
        parts.push(FormatPart::Literal(literal));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_camel_case() {
        assert_eq!(Builtin::MakeArray.name(), "makeArray");
        assert_eq!(Builtin::ObjectFields.name(), "objectFields");
        assert_eq!(Builtin::ExtVar.name(), "extVar");
        assert_eq!(Builtin::Pow.name(), "pow");
    }

    #[test]
    fn ids_are_stable() {
        assert_eq!(Builtin::from_repr(0), Some(Builtin::MakeArray));
        assert_eq!(Builtin::from_repr(23), Some(Builtin::ExtVar));
        assert_eq!(Builtin::from_repr(25), Some(Builtin::Format));
    }

    #[test]
    fn parse_simple_format() {
        let parts = parse_format("x=%d!").unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], FormatPart::Literal("x=".to_string()));
        match &parts[1] {
            FormatPart::Code(code) => assert_eq!(code.conversion, 'd'),
            FormatPart::Literal(_) => panic!("expected code"),
        }
    }

    #[test]
    fn parse_flags_width_precision() {
        let parts = parse_format("%-08.3f").unwrap();
        match &parts[0] {
            FormatPart::Code(code) => {
                assert!(code.left_align);
                assert!(code.zero_pad);
                assert_eq!(code.width, Some(8));
                assert_eq!(code.precision, Some(3));
                assert_eq!(code.conversion, 'f');
            }
            FormatPart::Literal(_) => panic!("expected code"),
        }
    }

    #[test]
    fn percent_escape_folds_into_literal() {
        let parts = parse_format("100%%").unwrap();
        assert_eq!(parts, vec![FormatPart::Literal("100%".to_string())]);
    }

    #[test]
    fn named_key() {
        let parts = parse_format("%(who)s").unwrap();
        match &parts[0] {
            FormatPart::Code(code) => assert_eq!(code.key.as_deref(), Some("who")),
            FormatPart::Literal(_) => panic!("expected code"),
        }
    }
}
