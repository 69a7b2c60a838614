// forge-executor/src/template.rs
// ============================================================================
// Module: Template Expressions
// Description: A small `{{expression}}` language over the step namespace
//              (`params`, `steps.<name>`, `item`) plus the safe built-ins
//              `len`, `str`, `int`, `bool`.
// Purpose: Give `Step::params` and `Step::condition` one shared evaluator
//          instead of each call site growing its own ad hoc substitution.
// Dependencies: forge-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! [`evaluate`] parses and evaluates one expression against a scope object.
//! [`render`] walks a `Step::params` JSON tree and replaces embedded
//! `{{expr}}` templates: a string that is *entirely* one `{{expr}}`
//! (after trimming) renders to that expression's native JSON value, so a
//! templated param can carry a number, list, or object through unchanged
//! rather than always stringifying; a string with other text around the
//! template interpolates each `{{expr}}` as its string form.

// ============================================================================
// SECTION: Imports
// ============================================================================

use forge_core::value::get_path;
use forge_core::value::is_truthy;
use serde_json::Map;
use serde_json::Value as Json;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised parsing or evaluating a template expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// The expression ended before a complete term was parsed.
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    /// A token did not fit the grammar at its position.
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
    /// A built-in function was called with the wrong number of arguments.
    #[error("{0} expects exactly one argument")]
    Arity(&'static str),
    /// An identifier was used as a function call but is not a known builtin.
    #[error("unknown function: {0}")]
    UnknownFunction(String),
}

// ============================================================================
// SECTION: Lexer
// ============================================================================

/// One lexical token of an expression.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    /// A bare word: a path segment, builtin name, or keyword not matched below.
    Ident(String),
    /// A numeric literal.
    Number(f64),
    /// A single- or double-quoted string literal.
    Str(String),
    /// `true` / `True`.
    True,
    /// `false` / `False`.
    False,
    /// `null` / `None` / `none`.
    Null,
    /// `and`.
    And,
    /// `or`.
    Or,
    /// `not`.
    Not,
    /// `in`.
    In,
    /// `==`.
    Eq,
    /// `!=`.
    Ne,
    /// `<=`.
    Le,
    /// `>=`.
    Ge,
    /// `<`.
    Lt,
    /// `>`.
    Gt,
    /// `.`.
    Dot,
    /// `,`.
    Comma,
    /// `(`.
    LParen,
    /// `)`.
    RParen,
    /// `[`.
    LBracket,
    /// `]`.
    RBracket,
}

/// Splits `input` into a flat token stream.
fn lex(input: &str) -> Result<Vec<Token>, TemplateError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0usize;
    while index < chars.len() {
        let current = chars[index];
        if current.is_whitespace() {
            index += 1;
            continue;
        }
        match current {
            '.' => {
                tokens.push(Token::Dot);
                index += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                index += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                index += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                index += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                index += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                index += 1;
            }
            '=' if chars.get(index + 1) == Some(&'=') => {
                tokens.push(Token::Eq);
                index += 2;
            }
            '!' if chars.get(index + 1) == Some(&'=') => {
                tokens.push(Token::Ne);
                index += 2;
            }
            '<' if chars.get(index + 1) == Some(&'=') => {
                tokens.push(Token::Le);
                index += 2;
            }
            '>' if chars.get(index + 1) == Some(&'=') => {
                tokens.push(Token::Ge);
                index += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                index += 1;
            }
            '>' => {
                tokens.push(Token::Gt);
                index += 1;
            }
            '\'' | '"' => {
                let quote = current;
                index += 1;
                let mut text = String::new();
                while index < chars.len() && chars[index] != quote {
                    text.push(chars[index]);
                    index += 1;
                }
                if index >= chars.len() {
                    return Err(TemplateError::UnexpectedEnd);
                }
                index += 1;
                tokens.push(Token::Str(text));
            }
            digit if digit.is_ascii_digit() => {
                let start = index;
                while index < chars.len() && (chars[index].is_ascii_digit() || chars[index] == '.') {
                    index += 1;
                }
                let text: String = chars[start..index].iter().collect();
                let number: f64 = text
                    .parse()
                    .map_err(|_| TemplateError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(number));
            }
            letter if letter.is_alphabetic() || letter == '_' => {
                let start = index;
                while index < chars.len() && (chars[index].is_alphanumeric() || chars[index] == '_') {
                    index += 1;
                }
                let word: String = chars[start..index].iter().collect();
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    "null" | "None" | "none" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(TemplateError::UnexpectedToken(other.to_string())),
        }
    }
    Ok(tokens)
}

// ============================================================================
// SECTION: Parser / Evaluator
// ============================================================================

/// Recursive-descent parser/evaluator over a token stream, evaluating
/// directly against `scope` rather than building an intermediate AST.
struct Parser<'a> {
    /// The full token stream.
    tokens: &'a [Token],
    /// Index of the next unconsumed token.
    position: usize,
    /// The scope object path lookups resolve against.
    scope: &'a Json,
}

impl<'a> Parser<'a> {
    /// Returns the next unconsumed token without advancing.
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    /// Consumes and returns the next token.
    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.position);
        self.position += 1;
        token
    }

    /// Lowest-precedence level: `or`.
    fn parse_or(&mut self) -> Result<Json, TemplateError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = Json::Bool(is_truthy(&left) || is_truthy(&right));
        }
        Ok(left)
    }

    /// `and`, binds tighter than `or`.
    fn parse_and(&mut self) -> Result<Json, TemplateError> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.parse_not()?;
            left = Json::Bool(is_truthy(&left) && is_truthy(&right));
        }
        Ok(left)
    }

    /// Unary `not`, binds tighter than `and`.
    fn parse_not(&mut self) -> Result<Json, TemplateError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let value = self.parse_not()?;
            return Ok(Json::Bool(!is_truthy(&value)));
        }
        self.parse_comparison()
    }

    /// Comparison/`in` level, binds tighter than `not`; non-associative (at
    /// most one operator per comparison).
    fn parse_comparison(&mut self) -> Result<Json, TemplateError> {
        let left = self.parse_term()?;
        let operator = match self.peek() {
            Some(Token::Eq) => Some(Token::Eq),
            Some(Token::Ne) => Some(Token::Ne),
            Some(Token::Le) => Some(Token::Le),
            Some(Token::Ge) => Some(Token::Ge),
            Some(Token::Lt) => Some(Token::Lt),
            Some(Token::Gt) => Some(Token::Gt),
            Some(Token::In) => Some(Token::In),
            _ => None,
        };
        let Some(operator) = operator else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_term()?;
        Ok(Json::Bool(match operator {
            Token::Eq => left == right,
            Token::Ne => left != right,
            Token::In => right.as_array().is_some_and(|items| items.contains(&left)),
            _ => compare_ordered(&left, &right, &operator),
        }))
    }

    /// Highest-precedence level: literals, parenthesized expressions, list
    /// literals, dotted paths, and builtin calls.
    fn parse_term(&mut self) -> Result<Json, TemplateError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Json::from(*value)),
            Some(Token::Str(text)) => Ok(Json::String(text.clone())),
            Some(Token::True) => Ok(Json::Bool(true)),
            Some(Token::False) => Ok(Json::Bool(false)),
            Some(Token::Null) => Ok(Json::Null),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => self.parse_list(),
            Some(Token::Ident(name)) => {
                let name = name.clone();
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.advance();
                    self.parse_call(&name)
                } else {
                    self.parse_path(name)
                }
            }
            Some(other) => Err(TemplateError::UnexpectedToken(format!("{other:?}"))),
            None => Err(TemplateError::UnexpectedEnd),
        }
    }

    /// Parses a `[...]` list literal, the opening bracket already consumed.
    fn parse_list(&mut self) -> Result<Json, TemplateError> {
        let mut items = Vec::new();
        if matches!(self.peek(), Some(Token::RBracket)) {
            self.advance();
            return Ok(Json::Array(items));
        }
        loop {
            items.push(self.parse_or()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => break,
                Some(other) => return Err(TemplateError::UnexpectedToken(format!("{other:?}"))),
                None => return Err(TemplateError::UnexpectedEnd),
            }
        }
        Ok(Json::Array(items))
    }

    /// Parses a builtin call's argument list, the opening paren already
    /// consumed, then dispatches to [`call_builtin`].
    fn parse_call(&mut self, name: &str) -> Result<Json, TemplateError> {
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Token::RParen)) {
            loop {
                args.push(self.parse_or()?);
                match self.advance() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    Some(other) => return Err(TemplateError::UnexpectedToken(format!("{other:?}"))),
                    None => return Err(TemplateError::UnexpectedEnd),
                }
            }
        } else {
            self.advance();
        }
        call_builtin(name, args)
    }

    /// Parses a dotted path starting at an already-consumed first segment
    /// and resolves it against `scope`.
    fn parse_path(&mut self, first: String) -> Result<Json, TemplateError> {
        let mut segments = vec![first];
        while matches!(self.peek(), Some(Token::Dot)) {
            self.advance();
            match self.advance() {
                Some(Token::Ident(segment)) => segments.push(segment.clone()),
                Some(other) => return Err(TemplateError::UnexpectedToken(format!("{other:?}"))),
                None => return Err(TemplateError::UnexpectedEnd),
            }
        }
        let path = segments.join(".");
        Ok(get_path(self.scope, &path).cloned().unwrap_or(Json::Null))
    }

    /// Consumes the next token, erroring if it isn't `expected`.
    fn expect(&mut self, expected: &Token) -> Result<(), TemplateError> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(other) => Err(TemplateError::UnexpectedToken(format!("{other:?}"))),
            None => Err(TemplateError::UnexpectedEnd),
        }
    }
}

/// Evaluates `<`/`<=`/`>`/`>=` for two values, numerically if both are
/// numbers, lexicographically if both are strings, otherwise `false`.
fn compare_ordered(left: &Json, right: &Json, operator: &Token) -> bool {
    if let (Some(left), Some(right)) = (left.as_f64(), right.as_f64()) {
        return match operator {
            Token::Le => left <= right,
            Token::Ge => left >= right,
            Token::Lt => left < right,
            Token::Gt => left > right,
            _ => false,
        };
    }
    if let (Some(left), Some(right)) = (left.as_str(), right.as_str()) {
        return match operator {
            Token::Le => left <= right,
            Token::Ge => left >= right,
            Token::Lt => left < right,
            Token::Gt => left > right,
            _ => false,
        };
    }
    false
}

/// Dispatches a parsed call to one of the safe builtins (`len`/`str`/
/// `int`/`bool`), each of which takes exactly one argument.
fn call_builtin(name: &str, mut args: Vec<Json>) -> Result<Json, TemplateError> {
    if args.len() != 1 {
        return Err(TemplateError::Arity(builtin_static_name(name)));
    }
    let arg = args.remove(0);
    Ok(match name {
        "len" => Json::from(json_len(&arg)),
        "str" => Json::String(json_to_string(&arg)),
        "int" => Json::from(json_to_i64(&arg)),
        "bool" => Json::Bool(is_truthy(&arg)),
        other => return Err(TemplateError::UnknownFunction(other.to_string())),
    })
}

/// Maps a builtin name to a `'static` label for [`TemplateError::Arity`].
fn builtin_static_name(name: &str) -> &'static str {
    match name {
        "len" => "len",
        "str" => "str",
        "int" => "int",
        "bool" => "bool",
        _ => "function",
    }
}

/// Length of a string (in chars), array, or object; `0` for anything else.
fn json_len(value: &Json) -> i64 {
    match value {
        Json::String(text) => i64::try_from(text.chars().count()).unwrap_or(i64::MAX),
        Json::Array(items) => i64::try_from(items.len()).unwrap_or(i64::MAX),
        Json::Object(map) => i64::try_from(map.len()).unwrap_or(i64::MAX),
        _ => 0,
    }
}

/// Renders a value as `str()` would: strings pass through unquoted, `null`
/// becomes empty, everything else uses its JSON form.
fn json_to_string(value: &Json) -> String {
    match value {
        Json::String(text) => text.clone(),
        Json::Null => String::new(),
        Json::Bool(flag) => flag.to_string(),
        Json::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

/// Coerces a value to an integer: numbers truncate toward zero, strings
/// parse, `true` is `1`, everything else is `0`.
fn json_to_i64(value: &Json) -> i64 {
    match value {
        Json::Number(number) => number.as_i64().unwrap_or_else(|| {
            let truncated = number.as_f64().unwrap_or(0.0).trunc().clamp(i64::MIN as f64, i64::MAX as f64);
            #[allow(clippy::cast_possible_truncation, reason = "clamped to i64::MIN..=i64::MAX above")]
            {
                truncated as i64
            }
        }),
        Json::String(text) => text.trim().parse().unwrap_or(0),
        Json::Bool(true) => 1,
        _ => 0,
    }
}

// ============================================================================
// SECTION: Public API
// ============================================================================

/// Evaluates one expression (without the surrounding `{{ }}`) against
/// `scope`, a JSON object exposing `params`, `steps`, and `item`.
///
/// # Errors
///
/// Returns [`TemplateError`] on a malformed expression.
pub fn evaluate(expr: &str, scope: &Json) -> Result<Json, TemplateError> {
    let tokens = lex(expr)?;
    let mut parser = Parser {
        tokens: &tokens,
        position: 0,
        scope,
    };
    let value = parser.parse_or()?;
    if parser.position != tokens.len() {
        return Err(TemplateError::UnexpectedToken(format!("{:?}", tokens[parser.position])));
    }
    Ok(value)
}

/// Evaluates `condition` for step/branch guards: a malformed expression or a
/// non-boolean result falls back to [`is_truthy`] rather than erroring, since
/// a guard is a best-effort gate, not a validated computation.
#[must_use]
pub fn is_condition_met(condition: &str, scope: &Json) -> bool {
    match evaluate(condition, scope) {
        Ok(Json::Bool(flag)) => flag,
        Ok(value) => is_truthy(&value),
        Err(_) => false,
    }
}

/// Returns the `{{...}}` expression body when `text` (trimmed) is *entirely*
/// one template, so callers can render it to a native JSON value rather
/// than a string.
fn whole_template(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

/// Renders every `{{expr}}` occurrence in `text`, interpolating each as its
/// string form.
fn render_string(text: &str, scope: &Json) -> String {
    let mut output = String::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            output.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let expr = after_open[..end].trim();
        let value = evaluate(expr, scope).unwrap_or(Json::Null);
        output.push_str(&json_to_string(&value));
        rest = &after_open[end + 2..];
    }
    output.push_str(rest);
    output
}

/// Recursively renders `{{expr}}` templates embedded in `value`'s strings.
#[must_use]
pub fn render(value: &Json, scope: &Json) -> Json {
    match value {
        Json::String(text) => {
            if let Some(expr) = whole_template(text) {
                evaluate(expr, scope).unwrap_or(Json::Null)
            } else if text.contains("{{") {
                Json::String(render_string(text, scope))
            } else {
                Json::String(text.clone())
            }
        }
        Json::Array(items) => Json::Array(items.iter().map(|item| render(item, scope)).collect()),
        Json::Object(map) => {
            let mut rendered = Map::with_capacity(map.len());
            for (key, value) in map {
                rendered.insert(key.clone(), render(value, scope));
            }
            Json::Object(rendered)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> Json {
        json!({
            "params": {"threshold": 5, "name": "acme"},
            "steps": {"fetch": {"items": [1, 2, 3], "status": "success"}},
            "item": {"id": "x1", "active": true},
        })
    }

    #[test]
    fn resolves_dotted_path() {
        assert_eq!(evaluate("steps.fetch.status", &scope()).unwrap(), json!("success"));
    }

    #[test]
    fn equality_comparison() {
        assert_eq!(evaluate("params.name == 'acme'", &scope()).unwrap(), json!(true));
    }

    #[test]
    fn numeric_comparison() {
        assert_eq!(evaluate("params.threshold > 3", &scope()).unwrap(), json!(true));
    }

    #[test]
    fn len_builtin_over_array_path() {
        assert_eq!(evaluate("len(steps.fetch.items)", &scope()).unwrap(), json!(3));
    }

    #[test]
    fn and_or_not_short_circuit_semantics() {
        assert_eq!(evaluate("item.active and not params.missing", &scope()).unwrap(), json!(true));
    }

    #[test]
    fn in_operator_checks_list_literal_membership() {
        assert_eq!(evaluate("params.name in ['acme', 'other']", &scope()).unwrap(), json!(true));
    }

    #[test]
    fn missing_path_is_null() {
        assert_eq!(evaluate("steps.missing.field", &scope()).unwrap(), Json::Null);
    }

    #[test]
    fn whole_string_template_preserves_native_type() {
        let params = json!({"count": "{{ len(steps.fetch.items) }}"});
        assert_eq!(render(&params, &scope()), json!({"count": 3}));
    }

    #[test]
    fn embedded_template_interpolates_as_string() {
        let params = json!({"label": "hello {{ params.name }}!"});
        assert_eq!(render(&params, &scope()), json!({"label": "hello acme!"}));
    }

    #[test]
    fn condition_falls_back_to_truthy_for_non_boolean_result() {
        assert!(is_condition_met("steps.fetch.items", &scope()));
        assert!(!is_condition_met("params.missing", &scope()));
    }

    #[test]
    fn malformed_condition_is_not_met() {
        assert!(!is_condition_met("((", &scope()));
    }
}
