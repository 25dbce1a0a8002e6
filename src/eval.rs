//! The expression grammar.
//!
//! Expressions arrive as single strings and classify, in order, as a
//! regex over symbol names (`re:`), a symbol lookup (`sym:`), a source
//! lookup at a numeric pc (`src:`), or a bare numeric address. Anything
//! else is a syntax error. The engine interprets the parsed form against
//! its symbol tables.

use crate::errors::{DebuggerError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr<'a> {
    /// `re:` regex over symbol names; evaluates to matching names.
    Regex(&'a str),
    /// `sym:` symbol lookup; evaluates to one hex address string.
    Symbol(&'a str),
    /// `src:` numeric pc; evaluates to one `file:line` string.
    Source(u64),
    /// bare numeric pc; evaluates to the enclosing function's name.
    Address(u64),
}

pub fn parse(expr: &str) -> Result<Expr<'_>> {
    if let Some(re) = expr.strip_prefix("re:") {
        return Ok(Expr::Regex(re));
    }
    if let Some(name) = expr.strip_prefix("sym:") {
        return Ok(Expr::Symbol(name));
    }
    if let Some(num) = expr.strip_prefix("src:") {
        return Ok(Expr::Source(parse_uint(num)?));
    }
    if expr.starts_with(|c: char| c.is_ascii_digit()) {
        return Ok(Expr::Address(parse_uint(expr)?));
    }
    Err(DebuggerError::BadExpression(expr.to_string()))
}

/// Parses an unsigned integer with the base implied by its prefix:
/// `0x`/`0X` hex, `0o`/`0O` octal, `0b`/`0B` binary, a bare leading zero
/// octal, decimal otherwise.
pub fn parse_uint(s: &str) -> Result<u64> {
    let (digits, radix) = match s.as_bytes() {
        [b'0', b'x' | b'X', ..] => (&s[2..], 16),
        [b'0', b'o' | b'O', ..] => (&s[2..], 8),
        [b'0', b'b' | b'B', ..] => (&s[2..], 2),
        [b'0', _, ..] => (&s[1..], 8),
        _ => (s, 10),
    };
    Ok(u64::from_str_radix(digits, radix)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_uint_bases() {
        assert_eq!(parse_uint("42").unwrap(), 42);
        assert_eq!(parse_uint("0x2a").unwrap(), 42);
        assert_eq!(parse_uint("0X2A").unwrap(), 42);
        assert_eq!(parse_uint("0o52").unwrap(), 42);
        assert_eq!(parse_uint("052").unwrap(), 42);
        assert_eq!(parse_uint("0b101010").unwrap(), 42);
        assert_eq!(parse_uint("0").unwrap(), 0);
        assert!(parse_uint("zzz").is_err());
        assert!(parse_uint("").is_err());
    }

    #[test]
    fn test_parse_classification() {
        assert_eq!(parse("re:main\\..*").unwrap(), Expr::Regex("main\\..*"));
        assert_eq!(parse("sym:main.foo").unwrap(), Expr::Symbol("main.foo"));
        assert_eq!(parse("src:0x401000").unwrap(), Expr::Source(0x401000));
        assert_eq!(parse("4198400").unwrap(), Expr::Address(4198400));
        assert_eq!(parse("0x401000").unwrap(), Expr::Address(0x401000));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse("main.foo"),
            Err(DebuggerError::BadExpression(_))
        ));
        assert!(matches!(parse(""), Err(DebuggerError::BadExpression(_))));
        // numeric shapes with bad digits propagate the parse error
        assert!(matches!(parse("src:xyz"), Err(DebuggerError::ParseInt(_))));
        assert!(matches!(parse("12zz"), Err(DebuggerError::ParseInt(_))));
    }
}
