//! Expression grammar
//!
//! Precedence, loosest first:
//!
//! | Level          | Operators                                        |
//! |----------------|--------------------------------------------------|
//! | or             | `or`                                             |
//! | and            | `and`                                            |
//! | not            | prefix `not`                                     |
//! | comparison     | `= != < <= > >= like in within between is`       |
//! | concatenation  | `\|\|`                                           |
//! | additive       | `+ -`                                            |
//! | multiplicative | `* / %`                                          |
//! | unary          | `-`, `exists`, `all`, `distinct`                 |
//! | postfix        | `.field`, `.[expr]`, `[index]`, `[start : end]`  |
//!
//! Chains of `+`, `*`, `||`, `and`, `or` collapse into a single n-ary node.

use crate::lexer::{Token, TokenKind, tokenize};
use docql_diagnostics::{
    DQL0001, DQL0002, DQL0008, DQL0009, DQL0010, DQL0011, DQL0012, DQL0101, DQL0102, DocqlError,
    ErrorCode, Result, Span,
};
use docql_expr::functions;
use docql_expr::{Binding, Bindings, EvalError, Expression, Flags, WhenTerm};
use docql_value::Value;

/// Words that never name an identifier or function
const RESERVED: &[&str] = &[
    "all", "and", "any", "array", "between", "case", "cover", "distinct", "else", "end", "every",
    "exists", "false", "first", "for", "in", "is", "like", "missing", "not", "null", "object",
    "or", "satisfies", "self", "some", "then", "true", "valued", "when", "within",
];

fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

pub struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'s> Parser<'s> {
    /// Tokenize `source`; lexical errors surface here
    pub fn new(source: &'s str) -> Result<Self> {
        Ok(Self {
            source,
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    // ========================================================================
    // Token cursor
    // ========================================================================

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_nth(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + n).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == Some(kind)
    }

    fn at_word(&self, keyword: &str) -> bool {
        self.peek().is_some_and(|k| k.is_word(keyword))
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        let hit = self.at(kind);
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn eat_word(&mut self, keyword: &str) -> bool {
        let hit = self.at_word(keyword);
        if hit {
            self.pos += 1;
        }
        hit
    }

    /// Byte offset where the next token starts
    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source.len(), |t| t.span.start)
    }

    /// Byte offset where the last consumed token ends
    fn last_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map_or(0, |t| t.span.end)
    }

    fn spanned(&self, start: usize, expr: Expression) -> Expression {
        expr.with_span(Span::new(start, self.last_end()))
    }

    // ========================================================================
    // Errors
    // ========================================================================

    fn error_here(&self, code: ErrorCode, message: impl Into<String>) -> DocqlError {
        let span = self
            .tokens
            .get(self.pos)
            .map_or(Span::point(self.source.len()), |t| t.span);
        DocqlError::parse_at(code, message, self.source, span)
    }

    fn unexpected(&self, expected: &str) -> DocqlError {
        match self.peek() {
            Some(kind) => self.error_here(
                DQL0001,
                format!("Expected {expected}, found {}", kind.describe()),
            ),
            None => self.error_here(
                DQL0002,
                format!("Unexpected end of input, expected {expected}"),
            ),
        }
    }

    fn expect(&mut self, kind: &TokenKind, code: ErrorCode, what: &str) -> Result<()> {
        if self.eat(kind) {
            return Ok(());
        }
        if self.peek().is_none() {
            return Err(self.unexpected(what));
        }
        Err(self.error_here(code, format!("Expected {what}")))
    }

    fn expect_word(&mut self, keyword: &str) -> Result<()> {
        if self.eat_word(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", keyword.to_uppercase())))
        }
    }

    /// Fail unless every token has been consumed
    pub fn expect_end(&self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(kind) => Err(self.error_here(
                DQL0001,
                format!("Unexpected {} after expression", kind.describe()),
            )),
        }
    }

    /// No tokens left
    pub fn at_end(&self) -> bool {
        self.peek().is_none()
    }

    /// Consume a `,` if one is next
    pub fn eat_comma(&mut self) -> bool {
        self.eat(&TokenKind::Comma)
    }

    // ========================================================================
    // Logical levels
    // ========================================================================

    /// One full expression at the lowest precedence (`OR`)
    pub fn expression(&mut self) -> Result<Expression> {
        self.or_expression()
    }

    fn or_expression(&mut self) -> Result<Expression> {
        let start = self.offset();
        let first = self.and_expression()?;
        if !self.at_word("or") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat_word("or") {
            operands.push(self.and_expression()?);
        }
        Ok(self.spanned(start, Expression::or(operands)))
    }

    fn and_expression(&mut self) -> Result<Expression> {
        let start = self.offset();
        let first = self.not_expression()?;
        if !self.at_word("and") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat_word("and") {
            operands.push(self.not_expression()?);
        }
        Ok(self.spanned(start, Expression::and(operands)))
    }

    fn not_expression(&mut self) -> Result<Expression> {
        let start = self.offset();
        if self.eat_word("not") {
            let operand = self.not_expression()?;
            return Ok(self.spanned(start, Expression::not(operand)));
        }
        self.comparison()
    }

    /// Comparisons do not chain: `a = b = c` is rejected
    fn comparison(&mut self) -> Result<Expression> {
        let start = self.offset();
        let left = self.concatenation()?;

        let simple: Option<fn(Expression, Expression) -> Expression> = match self.peek() {
            Some(TokenKind::Eq) => Some(Expression::equal),
            Some(TokenKind::Ne) => Some(Expression::not_equal),
            Some(TokenKind::Lt) => Some(Expression::less_than),
            Some(TokenKind::Le) => Some(Expression::less_or_equal),
            Some(TokenKind::Gt) => Some(Expression::greater_than),
            Some(TokenKind::Ge) => Some(Expression::greater_or_equal),
            _ => None,
        };
        if let Some(build) = simple {
            self.pos += 1;
            let right = self.concatenation()?;
            return Ok(self.spanned(start, build(left, right)));
        }

        if self.eat_word("is") {
            let negated = self.eat_word("not");
            let built = if self.eat_word("missing") {
                if negated { Expression::is_not_missing(left) } else { Expression::is_missing(left) }
            } else if self.eat_word("null") {
                if negated { Expression::is_not_null(left) } else { Expression::is_null(left) }
            } else if self.eat_word("valued") {
                if negated { Expression::is_not_valued(left) } else { Expression::is_valued(left) }
            } else {
                return Err(self.unexpected("MISSING, NULL or VALUED"));
            };
            return Ok(self.spanned(start, built));
        }

        let negated = self.at_word("not")
            && self
                .peek_nth(1)
                .is_some_and(|k| ["between", "like", "in", "within"].iter().any(|w| k.is_word(w)));
        if negated {
            self.pos += 1;
        }

        let built = if self.eat_word("between") {
            let low = self.concatenation()?;
            self.expect_word("and")?;
            let high = self.concatenation()?;
            Expression::between(left, low, high)
        } else if self.eat_word("like") {
            Expression::like(left, self.concatenation()?)
        } else if self.eat_word("in") {
            Expression::in_list(left, self.concatenation()?)
        } else if self.eat_word("within") {
            Expression::within(left, self.concatenation()?)
        } else {
            return Ok(left);
        };
        let built = if negated { Expression::not(built) } else { built };
        Ok(self.spanned(start, built))
    }

    // ========================================================================
    // Arithmetic levels
    // ========================================================================

    fn concatenation(&mut self) -> Result<Expression> {
        let start = self.offset();
        let first = self.additive()?;
        if !self.at(&TokenKind::Concat) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(&TokenKind::Concat) {
            operands.push(self.additive()?);
        }
        Ok(self.spanned(start, Expression::concat(operands)))
    }

    /// `a + b + c` is one Add; a `-` closes the running sum as its left side
    fn additive(&mut self) -> Result<Expression> {
        let start = self.offset();
        let mut run = vec![self.multiplicative()?];
        loop {
            if self.eat(&TokenKind::Plus) {
                run.push(self.multiplicative()?);
            } else if self.eat(&TokenKind::Minus) {
                let left = self.collapse(start, run, Expression::add);
                let right = self.multiplicative()?;
                run = vec![self.spanned(start, Expression::sub(left, right))];
            } else {
                return Ok(self.collapse(start, run, Expression::add));
            }
        }
    }

    fn multiplicative(&mut self) -> Result<Expression> {
        let start = self.offset();
        let mut run = vec![self.unary()?];
        loop {
            let divide: Option<fn(Expression, Expression) -> Expression> = match self.peek() {
                Some(TokenKind::Slash) => Some(Expression::div),
                Some(TokenKind::Percent) => Some(Expression::modulo),
                _ => None,
            };
            if self.eat(&TokenKind::Star) {
                run.push(self.unary()?);
            } else if let Some(build) = divide {
                self.pos += 1;
                let left = self.collapse(start, run, Expression::mult);
                let right = self.unary()?;
                run = vec![self.spanned(start, build(left, right))];
            } else {
                return Ok(self.collapse(start, run, Expression::mult));
            }
        }
    }

    fn collapse(
        &self,
        start: usize,
        mut run: Vec<Expression>,
        build: fn(Vec<Expression>) -> Expression,
    ) -> Expression {
        match run.pop() {
            Some(only) if run.is_empty() => only,
            Some(last) => {
                run.push(last);
                self.spanned(start, build(run))
            }
            None => Expression::missing(),
        }
    }

    fn unary(&mut self) -> Result<Expression> {
        let start = self.offset();
        if self.eat(&TokenKind::Minus) {
            if let Some(TokenKind::Number(Value::Number(n))) = self.peek() {
                let negated = n.neg();
                self.pos += 1;
                let literal = self.postfix(start, Expression::constant(Value::Number(negated)))?;
                return Ok(literal);
            }
            let operand = self.unary()?;
            return Ok(self.spanned(start, Expression::neg(operand)));
        }
        if self.eat_word("exists") {
            let operand = self.unary()?;
            return Ok(self.spanned(start, Expression::exists(operand)));
        }
        for (keyword, distinct) in [("all", false), ("distinct", true)] {
            if self.eat_word(keyword) {
                let array = self.unary()?;
                return Ok(self.spanned(start, Expression::all(array, distinct)));
            }
        }
        let primary = self.primary()?;
        self.postfix(start, primary)
    }

    fn postfix(&mut self, start: usize, mut base: Expression) -> Result<Expression> {
        loop {
            if self.eat(&TokenKind::Dot) {
                base = if self.eat(&TokenKind::LBracket) {
                    let name = self.expression()?;
                    self.expect(&TokenKind::RBracket, DQL0008, "']'")?;
                    Expression::field_expr(base, name)
                } else {
                    match self.advance().map(|t| t.kind) {
                        Some(TokenKind::Word(name)) => Expression::field(base, name),
                        Some(TokenKind::Quoted {
                            name,
                            case_insensitive: true,
                        }) => Expression::field_ci(base, name),
                        Some(TokenKind::Quoted { name, .. }) => Expression::field(base, name),
                        None => return Err(self.unexpected("field name")),
                        Some(_) => {
                            self.pos = self.pos.saturating_sub(1);
                            return Err(self.error_here(DQL0010, "Expected field name after '.'"));
                        }
                    }
                };
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.expression()?;
                base = if self.eat(&TokenKind::Colon) {
                    let end = if self.at(&TokenKind::RBracket) {
                        None
                    } else {
                        Some(self.expression()?)
                    };
                    Expression::slice(base, index, end)
                } else {
                    Expression::element(base, index)
                };
                self.expect(&TokenKind::RBracket, DQL0008, "']'")?;
            } else {
                return Ok(base);
            }
            base = self.spanned(start, base);
        }
    }

    // ========================================================================
    // Primaries
    // ========================================================================

    fn primary(&mut self) -> Result<Expression> {
        let start = self.offset();
        let Some(token) = self.advance() else {
            return Err(self.unexpected("expression"));
        };
        let expr = match token.kind {
            TokenKind::Number(v) => Expression::constant(v),
            TokenKind::Str(s) => Expression::constant(s),
            TokenKind::NamedParam(name) => Expression::named_parameter(name),
            TokenKind::PositionalParam(pos) => Expression::positional_parameter(pos),
            TokenKind::Quoted {
                name,
                case_insensitive,
            } => {
                if case_insensitive {
                    Expression::identifier_ci(name)
                } else {
                    Expression::identifier(name)
                }
            }
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(&TokenKind::RParen, DQL0008, "')'")?;
                inner.with_flag(Flags::PARENTHESIZED)
            }
            TokenKind::LBracket => {
                let items = self.list_until(&TokenKind::RBracket, "']'")?;
                Expression::array_construct(items)
            }
            TokenKind::LBrace => self.object_constructor()?,
            TokenKind::Word(word) => self.word(start, &word)?,
            other => {
                self.pos -= 1;
                return Err(self.error_here(
                    DQL0009,
                    format!("Expected expression, found {}", other.describe()),
                ));
            }
        };
        Ok(self.spanned(start, expr))
    }

    fn word(&mut self, start: usize, word: &str) -> Result<Expression> {
        match word.to_ascii_lowercase().as_str() {
            "true" => Ok(Expression::boolean(true)),
            "false" => Ok(Expression::boolean(false)),
            "null" => Ok(Expression::null()),
            "missing" => Ok(Expression::missing()),
            "self" => Ok(Expression::self_ref()),
            "case" => self.case_expression(),
            "any" | "some" => {
                if self.at_word("and") && self.peek_nth(1).is_some_and(|k| k.is_word("every")) {
                    self.pos += 2;
                    let (bindings, satisfies) = self.quantified()?;
                    Ok(Expression::any_every(bindings, satisfies))
                } else {
                    let (bindings, satisfies) = self.quantified()?;
                    Ok(Expression::any(bindings, satisfies))
                }
            }
            "every" => {
                let (bindings, satisfies) = self.quantified()?;
                Ok(Expression::every(bindings, satisfies))
            }
            "array" | "first" => {
                let mapping = self.expression()?;
                self.expect_word("for")?;
                let bindings = self.bindings()?;
                let when = self.optional_when()?;
                self.expect_word("end")?;
                Ok(if word.eq_ignore_ascii_case("array") {
                    Expression::array(mapping, bindings, when)
                } else {
                    Expression::first(mapping, bindings, when)
                })
            }
            "object" => {
                let name = self.expression()?;
                self.expect(&TokenKind::Colon, DQL0001, "':'")?;
                let value = self.expression()?;
                self.expect_word("for")?;
                let bindings = self.bindings()?;
                let when = self.optional_when()?;
                self.expect_word("end")?;
                Ok(Expression::object(name, value, bindings, when))
            }
            "cover" => {
                self.expect(&TokenKind::LParen, DQL0001, "'('")?;
                let covered = self.expression()?;
                self.expect(&TokenKind::RParen, DQL0008, "')'")?;
                Ok(Expression::cover(covered))
            }
            _ if is_reserved(word) => {
                self.pos -= 1;
                Err(self.error_here(
                    DQL0009,
                    format!("Expected expression, found keyword '{word}'"),
                ))
            }
            _ if self.at(&TokenKind::LParen) => {
                self.pos += 1;
                let args = self.list_until(&TokenKind::RParen, "')'")?;
                self.function_call(start, word, args)
            }
            _ => Ok(Expression::identifier(word)),
        }
    }

    fn function_call(&self, start: usize, name: &str, args: Vec<Expression>) -> Result<Expression> {
        if functions::lookup(name).is_none() {
            log::debug!("'{name}' is not a builtin, deferring to user functions");
            return Ok(Expression::user_function(name, args));
        }
        Expression::function(name, args).map_err(|err| {
            let code = match err {
                EvalError::ArityMismatch { .. } => DQL0101,
                _ => DQL0001,
            };
            let span = Span::new(start, self.last_end());
            DocqlError::parse_at(code, err.to_string(), self.source, span)
        })
    }

    /// Comma-separated expressions up to `close`, which is consumed
    fn list_until(&mut self, close: &TokenKind, what: &str) -> Result<Vec<Expression>> {
        let mut items = Vec::new();
        if self.eat(close) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(close, DQL0008, what)?;
        Ok(items)
    }

    fn object_constructor(&mut self) -> Result<Expression> {
        let mut entries = Vec::new();
        if self.eat(&TokenKind::RBrace) {
            return Ok(Expression::object_construct(entries));
        }
        loop {
            let name = match self.advance().map(|t| t.kind) {
                Some(TokenKind::Str(s) | TokenKind::Word(s) | TokenKind::Quoted { name: s, .. }) => s,
                None => return Err(self.unexpected("field name")),
                Some(_) => {
                    self.pos = self.pos.saturating_sub(1);
                    return Err(self.unexpected("field name"));
                }
            };
            self.expect(&TokenKind::Colon, DQL0001, "':'")?;
            entries.push((name, self.expression()?));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, DQL0008, "'}'")?;
        Ok(Expression::object_construct(entries))
    }

    fn case_expression(&mut self) -> Result<Expression> {
        let search = if self.at_word("when") || self.at_word("end") {
            None
        } else {
            Some(self.expression()?)
        };
        let mut whens = Vec::new();
        while self.eat_word("when") {
            let when = self.expression()?;
            self.expect_word("then")?;
            let then = self.expression()?;
            whens.push(WhenTerm { when, then });
        }
        if whens.is_empty() {
            return Err(self.error_here(DQL0012, "CASE requires at least one WHEN arm"));
        }
        let else_term = if self.eat_word("else") {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect_word("end")?;
        Ok(match search {
            Some(search) => Expression::simple_case(search, whens, else_term),
            None => Expression::searched_case(whens, else_term),
        })
    }

    // ========================================================================
    // Collections
    // ========================================================================

    fn quantified(&mut self) -> Result<(Bindings, Expression)> {
        let bindings = self.bindings()?;
        self.expect_word("satisfies")?;
        let satisfies = self.expression()?;
        self.expect_word("end")?;
        Ok((bindings, satisfies))
    }

    fn optional_when(&mut self) -> Result<Option<Expression>> {
        if self.eat_word("when") {
            Ok(Some(self.expression()?))
        } else {
            Ok(None)
        }
    }

    fn variable(&mut self) -> Result<String> {
        match self.peek() {
            Some(TokenKind::Quoted { name, .. }) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            Some(TokenKind::Word(w)) if !is_reserved(w) => {
                let name = w.clone();
                self.pos += 1;
                Ok(name)
            }
            Some(_) => Err(self.error_here(DQL0010, "Expected variable name")),
            None => Err(self.unexpected("variable name")),
        }
    }

    /// `[name :] var IN|WITHIN expr, ...`
    fn bindings(&mut self) -> Result<Bindings> {
        let start = self.offset();
        let mut bindings = Bindings::new();
        loop {
            let first = self.variable()?;
            let (name_variable, variable) = if self.eat(&TokenKind::Colon) {
                (Some(first), self.variable()?)
            } else {
                (None, first)
            };
            let descend = if self.eat_word("within") {
                true
            } else if self.eat_word("in") {
                false
            } else {
                return Err(self.error_here(DQL0011, "Expected IN or WITHIN in collection binding"));
            };
            let expr = self.expression()?;
            let binding = match name_variable {
                Some(name) => Binding::with_name(name, variable, expr),
                None => Binding::new(variable, expr),
            };
            bindings.push(if descend { binding.descending() } else { binding });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        let names = bindings.variable_names();
        let duplicated = names
            .iter()
            .enumerate()
            .find(|(i, n)| names[..*i].contains(n))
            .map(|(_, n)| n.to_string());
        if let Some(name) = duplicated {
            return Err(DocqlError::parse_at(
                DQL0102,
                format!("Variable '{name}' is bound more than once"),
                self.source,
                Span::new(start, self.last_end()),
            ));
        }
        Ok(bindings)
    }
}
