//! Tokenizer for expression text
//!
//! Each token parser is a small winnow function over `&str`; [`tokenize`]
//! drives them and records byte spans so the parser can position errors.

use docql_diagnostics::{
    DQL0001, DQL0005, DQL0006, DQL0007, DQL0008, DocqlError, ErrorCode, Result, Span,
};
use docql_value::Value;
use winnow::ModalResult;
use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, opt};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{any, one_of, take_while};

type Input<'a> = &'a str;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word: a keyword, function name or unquoted identifier
    Word(String),
    /// Backquoted identifier, optionally suffixed with `i`
    Quoted { name: String, case_insensitive: bool },
    Str(String),
    Number(Value),
    NamedParam(String),
    PositionalParam(usize),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl TokenKind {
    /// Keyword test, case-insensitive
    pub fn is_word(&self, keyword: &str) -> bool {
        matches!(self, TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    pub fn describe(&self) -> String {
        match self {
            TokenKind::Word(w) => format!("'{w}'"),
            TokenKind::Quoted { name, .. } => format!("identifier `{name}`"),
            TokenKind::Str(s) => format!("string \"{s}\""),
            TokenKind::Number(n) => format!("number {n}"),
            TokenKind::NamedParam(p) => format!("parameter ${p}"),
            TokenKind::PositionalParam(p) => format!("parameter ${p}"),
            other => format!("'{}'", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Concat => "||",
            TokenKind::Eq => "=",
            TokenKind::Ne => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            _ => "?",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Split `source` into tokens
pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut input: Input<'_> = source;
    let mut tokens = Vec::new();
    loop {
        let _ = multispace0::<_, ErrMode<ContextError>>.parse_next(&mut input);
        if input.is_empty() {
            break;
        }
        let start = source.len() - input.len();
        let first = input.chars().next().unwrap_or(' ');
        match token.parse_next(&mut input) {
            Ok(kind) => {
                let end = source.len() - input.len();
                tokens.push(Token {
                    kind,
                    span: Span::new(start, end),
                });
            }
            Err(err) => {
                let (code, message) = lex_failure(first, &err);
                let end = start + first.len_utf8();
                return Err(DocqlError::parse_at(code, message, source, Span::new(start, end)));
            }
        }
    }
    log::trace!("tokenized {} tokens", tokens.len());
    Ok(tokens)
}

fn lex_failure(first: char, err: &ErrMode<ContextError>) -> (ErrorCode, String) {
    let cut = matches!(err, ErrMode::Cut(_));
    match first {
        '"' | '\'' if cut => (DQL0005, "Invalid escape sequence in string literal".to_string()),
        '"' | '\'' => (DQL0006, "Unterminated string literal".to_string()),
        '`' => (DQL0008, "Missing closing '`' for quoted identifier".to_string()),
        '0'..='9' => (DQL0007, "Invalid number".to_string()),
        '$' => (DQL0001, "Expected parameter name or position after '$'".to_string()),
        c => (DQL0001, format!("Unexpected character '{c}'")),
    }
}

fn backtrack<T>() -> ModalResult<T> {
    Err(ErrMode::Backtrack(ContextError::new()))
}

fn token(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    let Some(c) = input.chars().next() else {
        return backtrack();
    };
    match c {
        '`' => quoted_identifier(input),
        '"' | '\'' => string_literal.map(TokenKind::Str).parse_next(input),
        '$' => parameter(input),
        '0'..='9' => number(input),
        c if c.is_alphabetic() || c == '_' => word(input),
        _ => symbol(input),
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn word(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    take_while(1.., is_word_char)
        .map(|w: &str| TokenKind::Word(w.to_string()))
        .parse_next(input)
}

fn quoted_identifier(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    '`'.parse_next(input)?;
    let mut name = String::new();
    loop {
        match any.parse_next(input)? {
            '`' => break,
            '\\' => name.push(any.parse_next(input)?),
            c => name.push(c),
        }
    }
    // A trailing `i` marks case-insensitive matching unless it starts a word
    let mut rest = input.chars();
    let case_insensitive = rest.next() == Some('i') && !rest.next().is_some_and(is_word_char);
    if case_insensitive {
        'i'.parse_next(input)?;
    }
    Ok(TokenKind::Quoted {
        name,
        case_insensitive,
    })
}

/// JSON-style string in double or single quotes
fn string_literal(input: &mut Input<'_>) -> ModalResult<String> {
    let quote = one_of(['"', '\'']).parse_next(input)?;
    let mut out = String::new();
    loop {
        let c = any.parse_next(input)?;
        if c == quote {
            return Ok(out);
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match any.parse_next(input)? {
            '"' => '"',
            '\'' => '\'',
            '\\' => '\\',
            '/' => '/',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'b' => '\u{08}',
            'f' => '\u{0c}',
            'u' => unicode_escape(input)?,
            _ => return Err(ErrMode::Cut(ContextError::new())),
        };
        out.push(escaped);
    }
}

fn unicode_escape(input: &mut Input<'_>) -> ModalResult<char> {
    let hex = take_while(4, |c: char| c.is_ascii_hexdigit())
        .parse_next(input)
        .map_err(|_: ErrMode<ContextError>| ErrMode::Cut(ContextError::new()))?;
    u32::from_str_radix(hex, 16)
        .ok()
        .and_then(char::from_u32)
        .ok_or_else(|| ErrMode::Cut(ContextError::new()))
}

fn parameter(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    '$'.parse_next(input)?;
    alt((
        digit1.try_map(|d: &str| d.parse::<usize>().map(TokenKind::PositionalParam)),
        take_while(1.., is_word_char).map(|w: &str| TokenKind::NamedParam(w.to_string())),
    ))
    .parse_next(input)
}

/// Unsigned integer or float; sign is a unary operator
fn number(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    let text = (
        digit1,
        opt(('.', digit1)),
        opt((one_of(['e', 'E']), opt(one_of(['+', '-'])), digit1)),
    )
        .take()
        .parse_next(input)?;
    if input.chars().next().is_some_and(is_word_char) {
        return backtrack();
    }
    let value = if text.contains(['.', 'e', 'E']) {
        text.parse::<f64>().ok().map(Value::float)
    } else {
        text.parse::<i64>()
            .ok()
            .map(Value::int)
            .or_else(|| text.parse::<f64>().ok().map(Value::float))
    };
    match value {
        Some(v) => Ok(TokenKind::Number(v)),
        None => backtrack(),
    }
}

fn symbol(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    alt((
        "||".value(TokenKind::Concat),
        "==".value(TokenKind::Eq),
        "!=".value(TokenKind::Ne),
        "<>".value(TokenKind::Ne),
        "<=".value(TokenKind::Le),
        ">=".value(TokenKind::Ge),
        any.verify_map(|c: char| {
            Some(match c {
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                ',' => TokenKind::Comma,
                ':' => TokenKind::Colon,
                '.' => TokenKind::Dot,
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '%' => TokenKind::Percent,
                '=' => TokenKind::Eq,
                '<' => TokenKind::Lt,
                '>' => TokenKind::Gt,
                _ => return None,
            })
        }),
    ))
    .parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_words_and_symbols() {
        assert_eq!(
            kinds("a.b <= 3 || 'x'"),
            vec![
                TokenKind::Word("a".into()),
                TokenKind::Dot,
                TokenKind::Word("b".into()),
                TokenKind::Le,
                TokenKind::Number(Value::int(3)),
                TokenKind::Concat,
                TokenKind::Str("x".into()),
            ]
        );
    }

    #[rstest]
    #[case("`a`", "a", false)]
    #[case("`Name`i", "Name", true)]
    #[case("`a\\`b`", "a`b", false)]
    fn test_quoted_identifiers(#[case] source: &str, #[case] name: &str, #[case] ci: bool) {
        assert_eq!(
            kinds(source),
            vec![TokenKind::Quoted {
                name: name.into(),
                case_insensitive: ci
            }]
        );
    }

    #[test]
    fn test_quoted_identifier_followed_by_in() {
        let toks = kinds("`v`in");
        assert_eq!(toks.len(), 2);
        assert!(toks[1].is_word("in"));
    }

    #[rstest]
    #[case("42", Value::int(42))]
    #[case("1.5", Value::float(1.5))]
    #[case("2e3", Value::float(2000.0))]
    #[case("99999999999999999999", Value::float(1e20))]
    fn test_numbers(#[case] source: &str, #[case] expected: Value) {
        assert_eq!(kinds(source), vec![TokenKind::Number(expected)]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\nA""#),
            vec![TokenKind::Str("a\"b\nA".into())]
        );
    }

    #[test]
    fn test_parameters() {
        assert_eq!(
            kinds("$1 $name"),
            vec![
                TokenKind::PositionalParam(1),
                TokenKind::NamedParam("name".into())
            ]
        );
    }

    #[test]
    fn test_spans() {
        let toks = tokenize("  ab  + 1").unwrap();
        assert_eq!(toks[0].span, Span::new(2, 4));
        assert_eq!(toks[1].span, Span::new(6, 7));
        assert_eq!(toks[2].span, Span::new(8, 9));
    }

    #[rstest]
    #[case("\"abc", DQL0006)]
    #[case("\"a\\qb\"", DQL0005)]
    #[case("`abc", DQL0008)]
    #[case("12abc", DQL0007)]
    #[case("a # b", DQL0001)]
    fn test_lex_errors(#[case] source: &str, #[case] code: ErrorCode) {
        assert_eq!(tokenize(source).unwrap_err().code(), code);
    }
}
