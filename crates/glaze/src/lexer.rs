//! The lexer: source text to a token stream.
//!
//! Comments (`//`, `#`, `/* */`) are discarded. String escapes are decoded
//! here, so a string token's payload is the final contents. All failures are
//! static errors carrying the offending location.

use std::{fmt, rc::Rc};

use crate::error::{Location, LocationRange, StaticError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    // Symbols
    BraceL,
    BraceR,
    BracketL,
    BracketR,
    Colon,
    Comma,
    Dollar,
    Dot,
    ParenL,
    ParenR,
    Semicolon,

    // Arbitrary-length lexemes
    Identifier,
    Number,
    Operator,
    Str,

    // Keywords
    Assert,
    Else,
    Error,
    False,
    For,
    Function,
    If,
    Import,
    ImportStr,
    In,
    Local,
    NullLit,
    SelfTok,
    SuperTok,
    TailStrict,
    Then,
    True,

    /// Carries the position of the end of input.
    EndOfFile,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BraceL => "\"{\"",
            Self::BraceR => "\"}\"",
            Self::BracketL => "\"[\"",
            Self::BracketR => "\"]\"",
            Self::Colon => "\":\"",
            Self::Comma => "\",\"",
            Self::Dollar => "\"$\"",
            Self::Dot => "\".\"",
            Self::ParenL => "\"(\"",
            Self::ParenR => "\")\"",
            Self::Semicolon => "\";\"",
            Self::Identifier => "IDENTIFIER",
            Self::Number => "NUMBER",
            Self::Operator => "OPERATOR",
            Self::Str => "STRING",
            Self::Assert => "assert",
            Self::Else => "else",
            Self::Error => "error",
            Self::False => "false",
            Self::For => "for",
            Self::Function => "function",
            Self::If => "if",
            Self::Import => "import",
            Self::ImportStr => "importstr",
            Self::In => "in",
            Self::Local => "local",
            Self::NullLit => "null",
            Self::SelfTok => "self",
            Self::SuperTok => "super",
            Self::TailStrict => "tailstrict",
            Self::Then => "then",
            Self::True => "true",
            Self::EndOfFile => "end of file",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub data: String,
    pub loc: LocationRange,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.data.is_empty() {
            write!(f, "{}", self.kind)
        } else if self.kind == TokenKind::Operator {
            write!(f, "\"{}\"", self.data)
        } else {
            write!(f, "({}, \"{}\")", self.kind, self.data)
        }
    }
}

fn keyword_kind(word: &str) -> Option<TokenKind> {
    Some(match word {
        "assert" => TokenKind::Assert,
        "else" => TokenKind::Else,
        "error" => TokenKind::Error,
        "false" => TokenKind::False,
        "for" => TokenKind::For,
        "function" => TokenKind::Function,
        "if" => TokenKind::If,
        "import" => TokenKind::Import,
        "importstr" => TokenKind::ImportStr,
        "in" => TokenKind::In,
        "local" => TokenKind::Local,
        "null" => TokenKind::NullLit,
        "self" => TokenKind::SelfTok,
        "super" => TokenKind::SuperTok,
        "tailstrict" => TokenKind::TailStrict,
        "then" => TokenKind::Then,
        "true" => TokenKind::True,
        _ => return None,
    })
}

/// Maximal-munch operator set, longest first.
const OPERATORS: [&str; 19] = [
    "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "*", "/", "%", "+", "-", "<", ">", "!", "~",
    "&", "|",
];

struct Lexer<'s> {
    file: Rc<str>,
    src: &'s [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'s> Lexer<'s> {
    fn new(file: Rc<str>, src: &'s str) -> Self {
        Self {
            file,
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn here(&self) -> Location {
        Location::new(self.line, self.column)
    }

    fn range(&self, begin: Location) -> LocationRange {
        LocationRange::new(Rc::clone(&self.file), begin, self.here())
    }

    fn err(&self, begin: Location, msg: impl Into<String>) -> StaticError {
        StaticError::new(self.range(begin), msg)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<u8> {
        self.src.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if b & 0xC0 != 0x80 {
            // Count characters, not UTF-8 continuation bytes.
            self.column += 1;
        }
        Some(b)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), StaticError> {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.bump();
                }
                Some(b'#') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek2() == Some(b'/') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek2() == Some(b'*') => {
                    let begin = self.here();
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some(b'*') if self.peek2() == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => return Err(self.err(begin, "Unterminated comment.")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex_number(&mut self) -> Result<Token, StaticError> {
        let begin = self.here();
        let start = self.pos;
        // Integer part: 0 on its own, or a nonzero digit run.
        match self.peek() {
            Some(b'0') => {
                self.bump();
                if matches!(self.peek(), Some(b'0'..=b'9')) {
                    return Err(self.err(begin, "Couldn't lex number, junk after leading zero."));
                }
            }
            Some(b'1'..=b'9') => {
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.bump();
                }
            }
            _ => return Err(self.err(begin, "Couldn't lex number.")),
        }
        if self.peek() == Some(b'.') {
            self.bump();
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(self.err(begin, "Couldn't lex number, junk after decimal point."));
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.bump();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.bump();
            }
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(self.err(begin, "Couldn't lex number, junk after exponent."));
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos])
            .unwrap_or_else(|_| unreachable!("number lexeme is ASCII"));
        Ok(Token {
            kind: TokenKind::Number,
            data: text.to_string(),
            loc: self.range(begin),
        })
    }

    fn lex_string(&mut self, quote: u8) -> Result<Token, StaticError> {
        let begin = self.here();
        self.bump();
        let mut data = String::new();
        loop {
            let Some(b) = self.peek() else {
                return Err(self.err(begin, "Unterminated string literal."));
            };
            if b == quote {
                self.bump();
                break;
            }
            if b == b'\\' {
                self.bump();
                let esc = self
                    .bump()
                    .ok_or_else(|| self.err(begin, "Unterminated string literal."))?;
                match esc {
                    b'"' => data.push('"'),
                    b'\'' => data.push('\''),
                    b'\\' => data.push('\\'),
                    b'/' => data.push('/'),
                    b'b' => data.push('\u{8}'),
                    b'f' => data.push('\u{c}'),
                    b'n' => data.push('\n'),
                    b'r' => data.push('\r'),
                    b't' => data.push('\t'),
                    b'u' => {
                        let first = self.lex_unicode_escape(begin)?;
                        let cp = if (0xD800..0xDC00).contains(&first) {
                            // High surrogate: a \uXXXX low surrogate must follow.
                            if self.bump() != Some(b'\\') || self.bump() != Some(b'u') {
                                return Err(self.err(begin, "Unpaired surrogate in unicode escape."));
                            }
                            let second = self.lex_unicode_escape(begin)?;
                            if !(0xDC00..0xE000).contains(&second) {
                                return Err(self.err(begin, "Unpaired surrogate in unicode escape."));
                            }
                            0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
                        } else {
                            first
                        };
                        let c = char::from_u32(cp).ok_or_else(|| {
                            self.err(begin, format!("Invalid unicode codepoint: {cp:#x}"))
                        })?;
                        data.push(c);
                    }
                    other => {
                        return Err(self.err(
                            begin,
                            format!("Unknown escape sequence: \\{}", char::from(other)),
                        ));
                    }
                }
            } else {
                // Copy the raw byte; input is valid UTF-8 so runs of
                // continuation bytes stay intact.
                self.bump();
                // Safe to reconstruct: pushing bytes of a char one at a time
                // is not possible on String, so gather the full char.
                let mut buf = vec![b];
                while self.peek().is_some_and(|nb| nb & 0xC0 == 0x80) {
                    buf.push(self.bump().unwrap_or_else(|| unreachable!("peeked byte")));
                }
                let s = std::str::from_utf8(&buf)
                    .unwrap_or_else(|_| unreachable!("source text is valid UTF-8"));
                data.push_str(s);
            }
        }
        Ok(Token {
            kind: TokenKind::Str,
            data,
            loc: self.range(begin),
        })
    }

    fn lex_unicode_escape(&mut self, begin: Location) -> Result<u32, StaticError> {
        let mut cp = 0u32;
        for _ in 0..4 {
            let b = self
                .bump()
                .ok_or_else(|| self.err(begin, "Truncated unicode escape."))?;
            let digit = char::from(b)
                .to_digit(16)
                .ok_or_else(|| self.err(begin, "Malformed unicode escape."))?;
            cp = cp * 16 + digit;
        }
        Ok(cp)
    }

    fn next_token(&mut self) -> Result<Token, StaticError> {
        self.skip_whitespace_and_comments()?;
        let begin = self.here();
        let Some(b) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::EndOfFile,
                data: String::new(),
                loc: self.range(begin),
            });
        };
        match b {
            b'{' | b'}' | b'[' | b']' | b':' | b',' | b'$' | b'.' | b'(' | b')' | b';' => {
                let kind = match b {
                    b'{' => TokenKind::BraceL,
                    b'}' => TokenKind::BraceR,
                    b'[' => TokenKind::BracketL,
                    b']' => TokenKind::BracketR,
                    b':' => TokenKind::Colon,
                    b',' => TokenKind::Comma,
                    b'$' => TokenKind::Dollar,
                    b'.' => TokenKind::Dot,
                    b'(' => TokenKind::ParenL,
                    b')' => TokenKind::ParenR,
                    _ => TokenKind::Semicolon,
                };
                self.bump();
                Ok(Token {
                    kind,
                    data: String::new(),
                    loc: self.range(begin),
                })
            }
            b'0'..=b'9' => self.lex_number(),
            b'"' | b'\'' => self.lex_string(b),
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
                let start = self.pos;
                while matches!(
                    self.peek(),
                    Some(b'_' | b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9')
                ) {
                    self.bump();
                }
                let word = std::str::from_utf8(&self.src[start..self.pos])
                    .unwrap_or_else(|_| unreachable!("identifier lexeme is ASCII"));
                match keyword_kind(word) {
                    Some(kind) => Ok(Token {
                        kind,
                        data: String::new(),
                        loc: self.range(begin),
                    }),
                    None => Ok(Token {
                        kind: TokenKind::Identifier,
                        data: word.to_string(),
                        loc: self.range(begin),
                    }),
                }
            }
            b'=' if self.peek2() == Some(b'=') => {
                self.bump();
                self.bump();
                Ok(Token {
                    kind: TokenKind::Operator,
                    data: "==".to_string(),
                    loc: self.range(begin),
                })
            }
            b'=' => {
                self.bump();
                Ok(Token {
                    kind: TokenKind::Operator,
                    data: "=".to_string(),
                    loc: self.range(begin),
                })
            }
            _ => {
                for op in OPERATORS {
                    let bytes = op.as_bytes();
                    if self.src[self.pos..].starts_with(bytes) {
                        for _ in 0..bytes.len() {
                            self.bump();
                        }
                        return Ok(Token {
                            kind: TokenKind::Operator,
                            data: op.to_string(),
                            loc: self.range(begin),
                        });
                    }
                }
                Err(self.err(
                    begin,
                    format!("Could not lex the character '{}'", char::from(b)),
                ))
            }
        }
    }
}

/// Lexes `input` into a token list ending with an end-of-file token.
pub(crate) fn lex(file: &Rc<str>, input: &str) -> Result<Vec<Token>, StaticError> {
    let mut lexer = Lexer::new(Rc::clone(file), input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::EndOfFile;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let file: Rc<str> = Rc::from("test.glz");
        lex(&file, input).unwrap().iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lex_symbols_and_keywords() {
        assert_eq!(
            kinds("local x = self;"),
            vec![
                TokenKind::Local,
                TokenKind::Identifier,
                TokenKind::Operator,
                TokenKind::SelfTok,
                TokenKind::Semicolon,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn lex_operators_longest_match() {
        let file: Rc<str> = Rc::from("test.glz");
        let tokens = lex(&file, "a<<b<=c!=d").unwrap();
        let ops: Vec<&str> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Operator)
            .map(|t| t.data.as_str())
            .collect();
        assert_eq!(ops, vec!["<<", "<=", "!="]);
    }

    #[test]
    fn lex_string_escapes() {
        let file: Rc<str> = Rc::from("test.glz");
        let tokens = lex(&file, r#""a\nA\\""#).unwrap();
        assert_eq!(tokens[0].data, "a\nA\\");
    }

    #[test]
    fn lex_surrogate_pair() {
        let file: Rc<str> = Rc::from("test.glz");
        let tokens = lex(&file, r#""😀""#).unwrap();
        assert_eq!(tokens[0].data, "\u{1F600}");
    }

    #[test]
    fn lex_comments() {
        assert_eq!(
            kinds("1 // one\n# two\n/* three */ 2"),
            vec![TokenKind::Number, TokenKind::Number, TokenKind::EndOfFile]
        );
    }

    #[test]
    fn lex_number_rejects_leading_zero_junk() {
        let file: Rc<str> = Rc::from("test.glz");
        assert!(lex(&file, "012").is_err());
    }

    #[test]
    fn lex_unterminated_string() {
        let file: Rc<str> = Rc::from("test.glz");
        assert!(lex(&file, "\"abc").is_err());
    }

    #[test]
    fn locations_are_one_based(){
        let file: Rc<str> = Rc::from("test.glz");
        let tokens = lex(&file, "x\n  y").unwrap();
        assert_eq!(tokens[0].loc.begin.line, 1);
        assert_eq!(tokens[0].loc.begin.column, 1);
        assert_eq!(tokens[1].loc.begin.line, 2);
        assert_eq!(tokens[1].loc.begin.column, 3);
    }
}
