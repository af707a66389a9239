use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// `${dotted.path}` substitution against a context map — always lenient, a
/// missing path leaves the placeholder literal.
fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([a-zA-Z0-9_.]+)\}").unwrap())
}

/// `$(expr)` sandboxed evaluation spans — the body is handed to [`eval_expr`],
/// never to a general interpreter.
fn expr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\(([^()]*)\)").unwrap())
}

/// Resolves `${dotted.path}` and `$(expression)` substitutions against a
/// JSON context. The `$(...)` evaluator is a closed recursive-descent
/// grammar with no access to reflection or built-ins, rather than a
/// general-purpose `eval`.
pub struct ExpressionTemplater;

impl ExpressionTemplater {
    pub fn new() -> Self {
        Self
    }

    /// Apply both substitution forms to one string.
    pub fn render(&self, template: &str, context: &Value) -> String {
        let after_vars = variable_re().replace_all(template, |caps: &regex::Captures| {
            match lookup_path(context, &caps[1]) {
                Some(v) => value_to_string(&v),
                None => caps[0].to_string(),
            }
        });

        expr_re()
            .replace_all(&after_vars, |caps: &regex::Captures| {
                match eval_expr(caps[1].trim(), context) {
                    Ok(v) => value_to_string(&v),
                    Err(_) => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Render every string value in a JSON body (recursing through objects
    /// and arrays), leaving non-string leaves untouched.
    pub fn render_value(&self, value: &Value, context: &Value) -> Value {
        match value {
            Value::String(s) => {
                // A body field that is *exactly* one substitution keeps the
                // resolved value's native type (number/bool/object) instead
                // of stringifying it; mixed text falls back to string
                // interpolation.
                if let Some(caps) = full_match_re().captures(s) {
                    if let Some(path) = caps.get(1) {
                        if let Some(v) = lookup_path(context, path.as_str()) {
                            return v;
                        }
                        return Value::String(s.clone());
                    }
                    if let Some(expr) = caps.get(2) {
                        if let Ok(v) = eval_expr(expr.as_str().trim(), context) {
                            return v;
                        }
                        return Value::String(s.clone());
                    }
                }
                Value::String(self.render(s, context))
            }
            Value::Array(items) => Value::Array(items.iter().map(|i| self.render_value(i, context)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render_value(v, context)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Default for ExpressionTemplater {
    fn default() -> Self {
        Self::new()
    }
}

fn full_match_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\$\{([a-zA-Z0-9_.]+)\}$|^\$\(([^()]*)\)$").unwrap())
}

fn lookup_path(context: &Value, path: &str) -> Option<Value> {
    let mut current = context;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current.clone())
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Tokens the restricted grammar recognises: numbers, quoted strings, dotted
/// paths, and the operators `+ - * / == != < > <= >= && || !`. No
/// function calls, no attribute access beyond dotted-path lookup, no
/// built-ins — the sandboxing comes from never invoking a general
/// interpreter in the first place.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    let mut tokens = Vec::new();
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if c == '"' || c == '\'' {
            let quote = c;
            let mut s = String::new();
            i += 1;
            while i < chars.len() && chars[i] != quote {
                s.push(chars[i]);
                i += 1;
            }
            if i >= chars.len() {
                return Err("unterminated string literal".to_string());
            }
            i += 1;
            tokens.push(Token::Str(s));
        } else if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let num_str: String = chars[start..i].iter().collect();
            tokens.push(Token::Num(num_str.parse().map_err(|_| format!("bad number '{num_str}'"))?));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            match two.as_str() {
                "==" | "!=" | "<=" | ">=" | "&&" | "||" => {
                    tokens.push(Token::Op(match two.as_str() {
                        "==" => "==",
                        "!=" => "!=",
                        "<=" => "<=",
                        ">=" => ">=",
                        "&&" => "&&",
                        _ => "||",
                    }));
                    i += 2;
                }
                _ => {
                    let op = match c {
                        '+' => "+",
                        '-' => "-",
                        '*' => "*",
                        '/' => "/",
                        '<' => "<",
                        '>' => ">",
                        '!' => "!",
                        _ => return Err(format!("unexpected character '{c}'")),
                    };
                    tokens.push(Token::Op(op));
                    i += 1;
                }
            }
        }
    }
    Ok(tokens)
}

/// Recursive-descent parser/evaluator over the token stream: `||` binds
/// loosest, then `&&`, then comparisons, then `+ -`, then `* /`, then unary
/// `!`/`-`, then atoms. Entirely self-contained — no access to Rust's
/// evaluator, no reflection, no calling into arbitrary code.
struct Evaluator<'a> {
    tokens: &'a [Token],
    pos: usize,
    context: &'a Value,
}

impl<'a> Evaluator<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn parse_or(&mut self) -> Result<Value, String> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Op("||"))) {
            self.advance();
            let right = self.parse_and()?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value, String> {
        let mut left = self.parse_cmp()?;
        while matches!(self.peek(), Some(Token::Op("&&"))) {
            self.advance();
            let right = self.parse_cmp()?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn parse_cmp(&mut self) -> Result<Value, String> {
        let left = self.parse_add()?;
        if let Some(Token::Op(op @ ("==" | "!=" | "<" | ">" | "<=" | ">="))) = self.peek().cloned() {
            self.advance();
            let right = self.parse_add()?;
            return Ok(Value::Bool(compare(&left, &right, op)?));
        }
        Ok(left)
    }

    fn parse_add(&mut self) -> Result<Value, String> {
        let mut left = self.parse_mul()?;
        loop {
            match self.peek() {
                Some(Token::Op("+")) => {
                    self.advance();
                    let right = self.parse_mul()?;
                    left = add(&left, &right)?;
                }
                Some(Token::Op("-")) => {
                    self.advance();
                    let right = self.parse_mul()?;
                    left = Value::from(num(&left)? - num(&right)?);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<Value, String> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Op("*")) => {
                    self.advance();
                    let right = self.parse_unary()?;
                    left = Value::from(num(&left)? * num(&right)?);
                }
                Some(Token::Op("/")) => {
                    self.advance();
                    let right = self.parse_unary()?;
                    let divisor = num(&right)?;
                    if divisor == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    left = Value::from(num(&left)? / divisor);
                }
                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Value, String> {
        match self.peek() {
            Some(Token::Op("!")) => {
                self.advance();
                let v = self.parse_unary()?;
                Ok(Value::Bool(!truthy(&v)))
            }
            Some(Token::Op("-")) => {
                self.advance();
                let v = self.parse_unary()?;
                Ok(Value::from(-num(&v)?))
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<Value, String> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(Value::from(*n)),
            Some(Token::Str(s)) => Ok(Value::String(s.clone())),
            Some(Token::Ident(name)) => {
                if name == "true" {
                    Ok(Value::Bool(true))
                } else if name == "false" {
                    Ok(Value::Bool(false))
                } else if name == "null" {
                    Ok(Value::Null)
                } else {
                    Ok(lookup_path(self.context, name).unwrap_or(Value::Null))
                }
            }
            Some(Token::LParen) => {
                let v = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(v),
                    _ => Err("expected ')'".to_string()),
                }
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn num(v: &Value) -> Result<f64, String> {
    v.as_f64().ok_or_else(|| format!("expected a number, got {v}"))
}

fn add(a: &Value, b: &Value) -> Result<Value, String> {
    if let (Value::String(x), _) = (a, b) {
        return Ok(Value::String(format!("{x}{}", value_to_string(b))));
    }
    if let (_, Value::String(y)) = (a, b) {
        return Ok(Value::String(format!("{}{y}", value_to_string(a))));
    }
    Ok(Value::from(num(a)? + num(b)?))
}

fn compare(a: &Value, b: &Value, op: &str) -> Result<bool, String> {
    let result = match (a, b) {
        (Value::String(x), Value::String(y)) => match op {
            "==" => x == y,
            "!=" => x != y,
            "<" => x < y,
            ">" => x > y,
            "<=" => x <= y,
            ">=" => x >= y,
            _ => unreachable!(),
        },
        _ => {
            let (x, y) = (num(a)?, num(b)?);
            match op {
                "==" => x == y,
                "!=" => x != y,
                "<" => x < y,
                ">" => x > y,
                "<=" => x <= y,
                ">=" => x >= y,
                _ => unreachable!(),
            }
        }
    };
    Ok(result)
}

pub fn eval_expr(expr: &str, context: &Value) -> Result<Value, String> {
    let tokens = tokenize(expr)?;
    let mut evaluator = Evaluator {
        tokens: &tokens,
        pos: 0,
        context,
    };
    let result = evaluator.parse_or()?;
    if evaluator.pos != tokens.len() {
        return Err("trailing tokens after expression".to_string());
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variable_substitution_resolves_dotted_path() {
        let templater = ExpressionTemplater::new();
        let ctx = json!({ "user": { "name": "ada" } });
        assert_eq!(templater.render("hello ${user.name}", &ctx), "hello ada");
    }

    #[test]
    fn missing_variable_path_is_left_literal() {
        let templater = ExpressionTemplater::new();
        let ctx = json!({});
        assert_eq!(templater.render("hello ${missing.path}", &ctx), "hello ${missing.path}");
    }

    #[test]
    fn arithmetic_expression_evaluates() {
        let ctx = json!({ "count": 3 });
        assert_eq!(eval_expr("count * 2 + 1", &ctx).unwrap(), json!(7.0));
    }

    #[test]
    fn comparison_and_boolean_logic() {
        let ctx = json!({ "count": 10 });
        assert_eq!(eval_expr("count > 5 && count < 20", &ctx).unwrap(), json!(true));
    }

    #[test]
    fn string_concatenation_via_plus() {
        let ctx = json!({ "name": "bo" });
        assert_eq!(eval_expr("'hi ' + name", &ctx).unwrap(), json!("hi bo"));
    }

    #[test]
    fn render_value_preserves_native_type_for_exact_match() {
        let templater = ExpressionTemplater::new();
        let ctx = json!({ "enabled": true, "count": 5 });
        let body = json!({ "flag": "${enabled}", "total": "$(count * 2)" });
        let rendered = templater.render_value(&body, &ctx);
        assert_eq!(rendered["flag"], json!(true));
        assert_eq!(rendered["total"], json!(10.0));
    }
}
