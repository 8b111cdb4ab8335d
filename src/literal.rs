//! Safe literal grammar for doctest text.
//!
//! Accepts Python-style literals (numbers, strings, `True`/`False`/`None`,
//! `null`/`true`/`false`, lists, tuples, dicts) and a closed arithmetic
//! language over them. Nothing here can reach a name outside the whitelist
//! below, so parsing user or model text never executes code.

use thiserror::Error;

use crate::value::Value;

#[derive(Debug, Error, PartialEq)]
pub enum LiteralError {
    #[error("empty literal")]
    Empty,
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected character {0:?} at offset {1}")]
    UnexpectedChar(char, usize),
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    #[error("name {0:?} is not allowed in a literal")]
    UnknownName(String),
    #[error("unsupported syntax: {0}")]
    Unsupported(String),
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("unsupported operand types for {op}: {left} and {right}")]
    BadOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("bad argument to {0}()")]
    BadArgument(String),
    #[error("literal too large")]
    TooLarge,
    #[error("literal nested too deeply")]
    TooDeep,
}

/// Upper bound on the size of a value built by sequence repetition,
/// counted in characters and container elements.
const MAX_WEIGHT: usize = 1 << 20;

/// Expression nesting bound; keeps recursive descent off the end of the stack.
const MAX_DEPTH: usize = 64;

/// Parses one literal or expression. A bare top-level comma list
/// (`1, 2`) is a tuple, as in Python.
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(LiteralError::Empty);
    }

    let mut parser = Parser::new(tokens);
    let value = parser.parse_top()?;
    if let Some(tok) = parser.peek() {
        return Err(LiteralError::UnexpectedToken(tok.describe()));
    }
    Ok(value)
}

/// Parses text that must denote a list (or tuple) of values.
pub fn parse_value_list(text: &str) -> Result<Vec<Value>, LiteralError> {
    match parse_literal(text)? {
        Value::List(items) | Value::Tuple(items) => Ok(items),
        other => Err(LiteralError::Unsupported(format!(
            "expected a list, found {}",
            other.kind()
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    Punct(char),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Int(i) => i.to_string(),
            Token::Float(x) => x.to_string(),
            Token::Str(s) => format!("{s:?}"),
            Token::Ident(s) => s.clone(),
            Token::Op(op) => (*op).to_string(),
            Token::Punct(c) => c.to_string(),
        }
    }
}

const TWO_CHAR_OPS: [&str; 4] = ["**", "//", "<<", ">>"];

fn tokenize(input: &str) -> Result<Vec<Token>, LiteralError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        if ch == '#' {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }

        if ch == '\'' || ch == '"' {
            let (s, next) = lex_string(&chars, i)?;
            tokens.push(Token::Str(s));
            i = next;
            continue;
        }

        if ch.is_ascii_digit() || (ch == '.' && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit()))
        {
            let (tok, next) = lex_number(&chars, i)?;
            tokens.push(tok);
            i = next;
            continue;
        }

        if ch.is_alphabetic() || ch == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            if matches!(ident.as_str(), "b" | "r" | "f" | "rb" | "br" | "u")
                && chars.get(i).is_some_and(|c| *c == '\'' || *c == '"')
            {
                return Err(LiteralError::Unsupported(format!("{ident}-prefixed string")));
            }
            tokens.push(Token::Ident(ident));
            continue;
        }

        if let Some(op) = TWO_CHAR_OPS
            .iter()
            .find(|op| chars[i..].starts_with(&op.chars().collect::<Vec<_>>()))
        {
            tokens.push(Token::Op(*op));
            i += 2;
            continue;
        }

        let single = match ch {
            '+' => Some("+"),
            '-' => Some("-"),
            '*' => Some("*"),
            '/' => Some("/"),
            '%' => Some("%"),
            '^' => Some("^"),
            '&' => Some("&"),
            '|' => Some("|"),
            '~' => Some("~"),
            _ => None,
        };
        if let Some(op) = single {
            tokens.push(Token::Op(op));
            i += 1;
            continue;
        }

        if matches!(ch, '(' | ')' | '[' | ']' | '{' | '}' | ',' | ':' | '.') {
            tokens.push(Token::Punct(ch));
            i += 1;
            continue;
        }

        return Err(LiteralError::UnexpectedChar(ch, i));
    }

    Ok(tokens)
}

fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), LiteralError> {
    let quote = chars[start];
    let mut i = start + 1;
    let mut out = String::new();

    while i < chars.len() {
        let c = chars[i];
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\n' {
            return Err(LiteralError::UnterminatedString);
        }
        if c == '\\' {
            let esc = *chars.get(i + 1).ok_or(LiteralError::UnterminatedString)?;
            i += 2;
            match esc {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                '\n' => {}
                'x' | 'u' => {
                    let width = if esc == 'x' { 2 } else { 4 };
                    let hex: String = chars.iter().skip(i).take(width).collect();
                    let code = u32::from_str_radix(&hex, 16)
                        .ok()
                        .filter(|_| hex.len() == width)
                        .and_then(char::from_u32)
                        .ok_or_else(|| LiteralError::InvalidNumber(format!("\\{esc}{hex}")))?;
                    out.push(code);
                    i += width;
                }
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
            continue;
        }
        out.push(c);
        i += 1;
    }

    Err(LiteralError::UnterminatedString)
}

fn lex_number(chars: &[char], start: usize) -> Result<(Token, usize), LiteralError> {
    let mut i = start;

    if chars[i] == '0' && chars.get(i + 1).is_some_and(|c| matches!(c, 'x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
        let radix = match chars[i + 1].to_ascii_lowercase() {
            'x' => 16,
            'o' => 8,
            _ => 2,
        };
        i += 2;
        let digits_start = i;
        while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
            i += 1;
        }
        let digits: String = chars[digits_start..i].iter().filter(|c| **c != '_').collect();
        let raw: String = chars[start..i].iter().collect();
        let value = i64::from_str_radix(&digits, radix).map_err(|_| LiteralError::InvalidNumber(raw))?;
        return Ok((Token::Int(value), i));
    }

    let mut is_float = false;
    while i < chars.len() {
        let c = chars[i];
        if c.is_ascii_digit() || c == '_' {
            i += 1;
        } else if c == '.' && !is_float {
            is_float = true;
            i += 1;
        } else if matches!(c, 'e' | 'E') {
            is_float = true;
            i += 1;
            if chars.get(i).is_some_and(|c| *c == '+' || *c == '-') {
                i += 1;
            }
        } else {
            break;
        }
    }

    let raw: String = chars[start..i].iter().collect();
    let cleaned: String = raw.chars().filter(|c| *c != '_').collect();

    if is_float {
        let value = cleaned
            .parse::<f64>()
            .map_err(|_| LiteralError::InvalidNumber(raw.clone()))?;
        Ok((Token::Float(value), i))
    } else {
        match cleaned.parse::<i64>() {
            Ok(value) => Ok((Token::Int(value), i)),
            Err(_) if cleaned.chars().all(|c| c.is_ascii_digit()) => Err(LiteralError::IntegerOverflow),
            Err(_) => Err(LiteralError::InvalidNumber(raw)),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, depth: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, LiteralError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or(LiteralError::UnexpectedEof)?;
        self.pos += 1;
        Ok(tok)
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), LiteralError> {
        match self.next()? {
            Token::Punct(p) if p == c => Ok(()),
            other => Err(LiteralError::UnexpectedToken(other.describe())),
        }
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn parse_top(&mut self) -> Result<Value, LiteralError> {
        let first = self.parse_expr()?;
        if !self.eat_punct(',') {
            return Ok(first);
        }

        let mut items = vec![first];
        while self.peek().is_some() {
            items.push(self.parse_expr()?);
            if !self.eat_punct(',') {
                break;
            }
        }
        Ok(Value::Tuple(items))
    }

    fn parse_expr(&mut self) -> Result<Value, LiteralError> {
        self.parse_binary_level(0)
    }

    /// Precedence climbing over Python's binary operator levels, loosest first.
    fn parse_binary_level(&mut self, level: usize) -> Result<Value, LiteralError> {
        const LEVELS: [&[&str]; 6] = [
            &["|"],
            &["^"],
            &["&"],
            &["<<", ">>"],
            &["+", "-"],
            &["*", "/", "//", "%"],
        ];

        if level == LEVELS.len() {
            return self.parse_unary();
        }

        let mut left = self.parse_binary_level(level + 1)?;
        while let Some(op) = self.eat_op(LEVELS[level]) {
            let right = self.parse_binary_level(level + 1)?;
            left = arith::binary(op, left, right)?;
        }
        Ok(left)
    }

    /// Every nested expression passes through here, so the depth bound
    /// lives here too.
    fn parse_unary(&mut self) -> Result<Value, LiteralError> {
        if self.depth >= MAX_DEPTH {
            return Err(LiteralError::TooDeep);
        }
        self.depth += 1;
        let value = self.parse_unary_inner();
        self.depth -= 1;
        value
    }

    fn parse_unary_inner(&mut self) -> Result<Value, LiteralError> {
        if let Some(op) = self.eat_op(&["-", "+", "~"]) {
            let operand = self.parse_unary()?;
            return arith::unary(op, operand);
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Value, LiteralError> {
        let base = self.parse_atom()?;
        if self.eat_op(&["**"]).is_some() {
            let exponent = self.parse_unary()?;
            return arith::binary("**", base, exponent);
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<Value, LiteralError> {
        match self.next()? {
            Token::Int(i) => Ok(Value::Int(i)),
            Token::Float(x) => Ok(Value::Float(x)),
            Token::Str(mut s) => {
                // adjacent literals concatenate
                while let Some(Token::Str(more)) = self.peek() {
                    s.push_str(more);
                    self.pos += 1;
                }
                Ok(Value::Str(s))
            }
            Token::Punct('(') => self.parse_paren(),
            Token::Punct('[') => {
                let items = self.parse_items(']')?;
                Ok(Value::List(items))
            }
            Token::Punct('{') => self.parse_dict(),
            Token::Ident(name) => self.parse_name(name),
            other => Err(LiteralError::UnexpectedToken(other.describe())),
        }
    }

    fn parse_paren(&mut self) -> Result<Value, LiteralError> {
        if self.eat_punct(')') {
            return Ok(Value::Tuple(Vec::new()));
        }

        let first = self.parse_expr()?;
        if self.eat_punct(')') {
            return Ok(first);
        }

        self.expect_punct(',')?;
        let mut items = vec![first];
        items.extend(self.parse_items(')')?);
        Ok(Value::Tuple(items))
    }

    /// Comma-separated expressions up to `close`, trailing comma allowed.
    fn parse_items(&mut self, close: char) -> Result<Vec<Value>, LiteralError> {
        let mut items = Vec::new();
        loop {
            if self.eat_punct(close) {
                return Ok(items);
            }
            items.push(self.parse_expr()?);
            if !self.eat_punct(',') {
                self.expect_punct(close)?;
                return Ok(items);
            }
        }
    }

    fn parse_dict(&mut self) -> Result<Value, LiteralError> {
        let mut pairs = Vec::new();
        loop {
            if self.eat_punct('}') {
                return Ok(Value::Dict(pairs));
            }
            let key = self.parse_expr()?;
            if !self.eat_punct(':') {
                return Err(LiteralError::Unsupported("set literal".into()));
            }
            let value = self.parse_expr()?;
            match pairs.iter_mut().find(|pair| pair.0 == key) {
                Some(slot) => slot.1 = value,
                None => pairs.push((key, value)),
            }
            if !self.eat_punct(',') {
                self.expect_punct('}')?;
                return Ok(Value::Dict(pairs));
            }
        }
    }

    fn parse_name(&mut self, name: String) -> Result<Value, LiteralError> {
        match name.as_str() {
            "True" | "true" => return Ok(Value::Bool(true)),
            "False" | "false" => return Ok(Value::Bool(false)),
            "None" | "null" => return Ok(Value::None),
            _ => {}
        }

        let qualified = if name == "math" && self.eat_punct('.') {
            match self.next()? {
                Token::Ident(attr) => format!("math.{attr}"),
                other => return Err(LiteralError::UnexpectedToken(other.describe())),
            }
        } else {
            name
        };

        match qualified.as_str() {
            "math.inf" => return Ok(Value::Float(f64::INFINITY)),
            "math.nan" => return Ok(Value::Float(f64::NAN)),
            "math.pi" => return Ok(Value::Float(std::f64::consts::PI)),
            "math.e" => return Ok(Value::Float(std::f64::consts::E)),
            "math.tau" => return Ok(Value::Float(std::f64::consts::TAU)),
            _ => {}
        }

        if !self.eat_punct('(') {
            return Err(LiteralError::UnknownName(qualified));
        }
        let args = self.parse_items(')')?;
        arith::call(&qualified, args)
    }
}

/// Closed evaluator for the operators and functions the grammar admits.
mod arith {
    use super::{LiteralError, MAX_WEIGHT};
    use crate::value::Value;

    enum Num {
        Int(i64),
        Float(f64),
    }

    fn num(v: &Value) -> Option<Num> {
        match v {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(x) => Some(Num::Float(*x)),
            _ => None,
        }
    }

    fn as_f64(n: &Num) -> f64 {
        match n {
            Num::Int(i) => *i as f64,
            Num::Float(x) => *x,
        }
    }

    fn bad(op: &'static str, l: &Value, r: &Value) -> LiteralError {
        LiteralError::BadOperands {
            op,
            left: l.kind(),
            right: r.kind(),
        }
    }

    pub fn unary(op: &'static str, v: Value) -> Result<Value, LiteralError> {
        match (op, num(&v)) {
            ("+", Some(Num::Int(i))) => Ok(Value::Int(i)),
            ("+", Some(Num::Float(x))) => Ok(Value::Float(x)),
            ("-", Some(Num::Int(i))) => i.checked_neg().map(Value::Int).ok_or(LiteralError::IntegerOverflow),
            ("-", Some(Num::Float(x))) => Ok(Value::Float(-x)),
            ("~", Some(Num::Int(i))) => Ok(Value::Int(!i)),
            _ => Err(LiteralError::BadOperands {
                op,
                left: v.kind(),
                right: v.kind(),
            }),
        }
    }

    pub fn binary(op: &'static str, l: Value, r: Value) -> Result<Value, LiteralError> {
        if let (Some(a), Some(b)) = (num(&l), num(&r)) {
            return match (a, b) {
                (Num::Int(a), Num::Int(b)) => int_op(op, a, b),
                (a, b) => float_op(op, as_f64(&a), as_f64(&b)).ok_or_else(|| bad(op, &l, &r))?,
            };
        }

        match (op, &l, &r) {
            ("+", Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            ("+", Value::List(a), Value::List(b)) => Ok(Value::List([a.clone(), b.clone()].concat())),
            ("+", Value::Tuple(a), Value::Tuple(b)) => Ok(Value::Tuple([a.clone(), b.clone()].concat())),
            ("*", seq, n) | ("*", n, seq) if num(n).is_some() && !matches!(num(n), Some(Num::Float(_))) => {
                let count = match num(n) {
                    Some(Num::Int(i)) => usize::try_from(i.max(0)).map_err(|_| LiteralError::IntegerOverflow)?,
                    _ => return Err(bad(op, &l, &r)),
                };
                if !matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_)) {
                    return Err(bad(op, &l, &r));
                }
                match weight(seq).checked_mul(count) {
                    Some(total) if total <= MAX_WEIGHT => Ok(repeat(seq, count)),
                    _ => Err(LiteralError::TooLarge),
                }
            }
            _ => Err(bad(op, &l, &r)),
        }
    }

    fn repeat(seq: &Value, count: usize) -> Value {
        let cycle = |items: &[Value]| (0..count).flat_map(|_| items.iter().cloned()).collect();
        match seq {
            Value::Str(s) => Value::Str(s.repeat(count)),
            Value::List(items) => Value::List(cycle(items)),
            Value::Tuple(items) => Value::Tuple(cycle(items)),
            other => other.clone(),
        }
    }

    /// Characters plus container elements, recursively.
    fn weight(v: &Value) -> usize {
        match v {
            Value::Str(s) => s.len(),
            Value::List(items) | Value::Tuple(items) => items.iter().map(weight).fold(1, usize::saturating_add),
            Value::Dict(pairs) => pairs
                .iter()
                .map(|(k, v)| weight(k).saturating_add(weight(v)))
                .fold(1, usize::saturating_add),
            _ => 1,
        }
    }

    fn int_op(op: &'static str, a: i64, b: i64) -> Result<Value, LiteralError> {
        let overflow = LiteralError::IntegerOverflow;
        let v = match op {
            "+" => a.checked_add(b).ok_or(overflow)?,
            "-" => a.checked_sub(b).ok_or(overflow)?,
            "*" => a.checked_mul(b).ok_or(overflow)?,
            "/" => {
                if b == 0 {
                    return Err(LiteralError::DivisionByZero);
                }
                return Ok(Value::Float(a as f64 / b as f64));
            }
            "//" => floor_div(a, b)?,
            "%" => floor_mod(a, b)?,
            "**" => {
                if b < 0 {
                    if a == 0 {
                        return Err(LiteralError::DivisionByZero);
                    }
                    return Ok(Value::Float((a as f64).powf(b as f64)));
                }
                let exp = u32::try_from(b).map_err(|_| LiteralError::IntegerOverflow)?;
                a.checked_pow(exp).ok_or(overflow)?
            }
            "|" => a | b,
            "^" => a ^ b,
            "&" => a & b,
            "<<" => {
                let shift = u32::try_from(b).map_err(|_| LiteralError::IntegerOverflow)?;
                let shifted = a.checked_shl(shift).ok_or(LiteralError::IntegerOverflow)?;
                if shifted >> shift != a {
                    return Err(LiteralError::IntegerOverflow);
                }
                shifted
            }
            ">>" => {
                let shift = u32::try_from(b).map_err(|_| LiteralError::IntegerOverflow)?;
                a >> shift.min(63)
            }
            _ => {
                return Err(LiteralError::BadOperands {
                    op,
                    left: "int",
                    right: "int",
                })
            }
        };
        Ok(Value::Int(v))
    }

    fn floor_div(a: i64, b: i64) -> Result<i64, LiteralError> {
        if b == 0 {
            return Err(LiteralError::DivisionByZero);
        }
        let q = a.checked_div(b).ok_or(LiteralError::IntegerOverflow)?;
        if a % b != 0 && ((a < 0) != (b < 0)) {
            Ok(q - 1)
        } else {
            Ok(q)
        }
    }

    fn floor_mod(a: i64, b: i64) -> Result<i64, LiteralError> {
        if b == 0 {
            return Err(LiteralError::DivisionByZero);
        }
        let r = a.checked_rem(b).ok_or(LiteralError::IntegerOverflow)?;
        if r != 0 && ((r < 0) != (b < 0)) {
            Ok(r + b)
        } else {
            Ok(r)
        }
    }

    /// `None` when the operator has no float meaning.
    fn float_op(op: &'static str, a: f64, b: f64) -> Option<Result<Value, LiteralError>> {
        let zero_div = || Some(Err(LiteralError::DivisionByZero));
        let v = match op {
            "+" => a + b,
            "-" => a - b,
            "*" => a * b,
            "/" if b == 0.0 => return zero_div(),
            "/" => a / b,
            "//" if b == 0.0 => return zero_div(),
            "//" => (a / b).floor(),
            "%" if b == 0.0 => return zero_div(),
            "%" => {
                let r = a % b;
                if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                    r + b
                } else {
                    r
                }
            }
            "**" => a.powf(b),
            _ => return None,
        };
        Some(Ok(Value::Float(v)))
    }

    pub fn call(name: &str, args: Vec<Value>) -> Result<Value, LiteralError> {
        let [arg] = <[Value; 1]>::try_from(args).map_err(|_| LiteralError::BadArgument(name.to_string()))?;
        let bad_arg = || LiteralError::BadArgument(name.to_string());

        match name {
            "float" => match (&arg, num(&arg)) {
                (_, Some(n)) => Ok(Value::Float(as_f64(&n))),
                (Value::Str(s), _) => parse_float_text(s).map(Value::Float).ok_or_else(bad_arg),
                _ => Err(bad_arg()),
            },
            "int" => match (&arg, num(&arg)) {
                (_, Some(Num::Int(i))) => Ok(Value::Int(i)),
                (_, Some(Num::Float(x))) if x.is_finite() && x.abs() < 9.2e18 => Ok(Value::Int(x.trunc() as i64)),
                (Value::Str(s), _) => s.trim().replace('_', "").parse::<i64>().map(Value::Int).map_err(|_| bad_arg()),
                _ => Err(bad_arg()),
            },
            "abs" => match num(&arg) {
                Some(Num::Int(i)) => i.checked_abs().map(Value::Int).ok_or(LiteralError::IntegerOverflow),
                Some(Num::Float(x)) => Ok(Value::Float(x.abs())),
                None => Err(bad_arg()),
            },
            "math.sqrt" => match num(&arg) {
                Some(n) if as_f64(&n) >= 0.0 => Ok(Value::Float(as_f64(&n).sqrt())),
                _ => Err(bad_arg()),
            },
            "math.floor" | "math.ceil" => match num(&arg) {
                Some(Num::Int(i)) => Ok(Value::Int(i)),
                Some(Num::Float(x)) if x.is_finite() && x.abs() < 9.2e18 => {
                    let r = if name == "math.floor" { x.floor() } else { x.ceil() };
                    Ok(Value::Int(r as i64))
                }
                _ => Err(bad_arg()),
            },
            other => Err(LiteralError::UnknownName(other.to_string())),
        }
    }

    fn parse_float_text(s: &str) -> Option<f64> {
        let t = s.trim().to_ascii_lowercase();
        match t.trim_start_matches(['+', '-']) {
            "inf" | "infinity" | "nan" => t.parse::<f64>().ok(),
            _ => t.replace('_', "").parse::<f64>().ok().filter(|x| x.is_finite()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars() {
        assert_eq!(parse_literal("42").unwrap(), Value::Int(42));
        assert_eq!(parse_literal("-3.5").unwrap(), Value::Float(-3.5));
        assert_eq!(parse_literal("'hi'").unwrap(), Value::str("hi"));
        assert_eq!(parse_literal("None").unwrap(), Value::None);
        assert_eq!(parse_literal("null").unwrap(), Value::None);
        assert_eq!(parse_literal("True").unwrap(), Value::Bool(true));
        assert_eq!(parse_literal("0x1F").unwrap(), Value::Int(31));
        assert_eq!(parse_literal("1_000").unwrap(), Value::Int(1000));
    }

    #[test]
    fn parses_containers() {
        assert_eq!(
            parse_literal("(1, 'a', [2, 3])").unwrap(),
            Value::tuple([
                Value::Int(1),
                Value::str("a"),
                Value::List(vec![Value::Int(2), Value::Int(3)]),
            ])
        );
        assert_eq!(parse_literal("(5,)").unwrap(), Value::tuple([Value::Int(5)]));
        assert_eq!(parse_literal("(5)").unwrap(), Value::Int(5));
        assert_eq!(parse_literal("()").unwrap(), Value::Tuple(vec![]));
        assert_eq!(parse_literal("2, 3").unwrap(), Value::tuple([Value::Int(2), Value::Int(3)]));
        assert_eq!(
            parse_literal("{'a': 1}").unwrap(),
            Value::Dict(vec![(Value::str("a"), Value::Int(1))])
        );
    }

    #[test]
    fn evaluates_closed_arithmetic() {
        assert_eq!(parse_literal("2**31 - 1").unwrap(), Value::Int(2_147_483_647));
        assert_eq!(parse_literal("-7 // 2").unwrap(), Value::Int(-4));
        assert_eq!(parse_literal("-7 % 3").unwrap(), Value::Int(2));
        assert_eq!(parse_literal("2 ** -1").unwrap(), Value::Float(0.5));
        assert_eq!(parse_literal("-2 ** 2").unwrap(), Value::Int(-4));
        // `^` is xor and binds looser than `-`
        assert_eq!(parse_literal("2^31 - 1").unwrap(), Value::Int(2 ^ 30));
        assert_eq!(parse_literal("'ab' * 3").unwrap(), Value::str("ababab"));
        assert_eq!(parse_literal("\"a\" + 'b'").unwrap(), Value::str("ab"));
    }

    #[test]
    fn whitelisted_functions_and_constants() {
        assert_eq!(parse_literal("float('inf')").unwrap(), Value::Float(f64::INFINITY));
        assert_eq!(parse_literal("float(\"-inf\")").unwrap(), Value::Float(f64::NEG_INFINITY));
        assert_eq!(parse_literal("math.pi").unwrap(), Value::Float(std::f64::consts::PI));
        assert_eq!(parse_literal("int(3.9)").unwrap(), Value::Int(3));
        assert_eq!(parse_literal("abs(-4)").unwrap(), Value::Int(4));
    }

    #[test]
    fn rejects_anything_that_needs_execution() {
        assert_eq!(
            parse_literal("__import__('os')").unwrap_err(),
            LiteralError::UnknownName("__import__".into())
        );
        assert!(matches!(parse_literal("open('x')"), Err(LiteralError::UnknownName(_))));
        assert!(matches!(parse_literal("math.system"), Err(LiteralError::UnknownName(_))));
        assert!(matches!(parse_literal("[x for x in y]"), Err(_)));
        assert!(matches!(parse_literal("lambda: 1"), Err(_)));
        assert_eq!(parse_literal("").unwrap_err(), LiteralError::Empty);
    }

    #[test]
    fn reports_overflow_and_zero_division() {
        assert_eq!(parse_literal("2**64").unwrap_err(), LiteralError::IntegerOverflow);
        assert_eq!(parse_literal("1 / 0").unwrap_err(), LiteralError::DivisionByZero);
        assert_eq!(
            parse_literal("99999999999999999999").unwrap_err(),
            LiteralError::IntegerOverflow
        );
    }

    #[test]
    fn repeats_containers_by_cloning() {
        assert_eq!(
            parse_literal("[1, 'a'] * 2").unwrap(),
            Value::List(vec![Value::Int(1), Value::str("a"), Value::Int(1), Value::str("a")])
        );
        assert_eq!(parse_literal("2 * (0,)").unwrap(), Value::tuple([Value::Int(0), Value::Int(0)]));
        assert_eq!(parse_literal("[[1]] * -3").unwrap(), Value::List(vec![]));
    }

    #[test]
    fn huge_repetition_is_rejected_before_allocating() {
        assert_eq!(parse_literal("'a' * 10**18").unwrap_err(), LiteralError::TooLarge);
        assert_eq!(parse_literal("['x'] * 2**30").unwrap_err(), LiteralError::TooLarge);
        assert_eq!(parse_literal("[[0] * 1000] * 100000").unwrap_err(), LiteralError::TooLarge);
        assert_eq!(parse_value_list("['ab' * 10**12]").unwrap_err(), LiteralError::TooLarge);
    }

    #[test]
    fn deep_nesting_is_an_error_not_a_stack_overflow() {
        let brackets = "[".repeat(100_000);
        assert_eq!(parse_literal(&brackets).unwrap_err(), LiteralError::TooDeep);

        let signs = format!("{}1", "-".repeat(100_000));
        assert_eq!(parse_literal(&signs).unwrap_err(), LiteralError::TooDeep);

        let modest = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(parse_literal(&modest).unwrap(), Value::Int(1));
    }

    #[test]
    fn strips_comments_in_value_lists() {
        let text = "[\n  (1, 2),  # small\n  (-1, 0),\n]";
        let items = parse_value_list(text).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], Value::tuple([Value::Int(-1), Value::Int(0)]));
    }
}
