//! Parser for the Python-style literals used as codebook values
//! (`['tema', 'genero']`, `{'1': 'No', 2: "Sí"}`).

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    List(Vec<Literal>),
    Dict(Vec<(Literal, Literal)>),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} at offset {offset}")]
pub struct LiteralError {
    pub offset: usize,
    pub message: String,
}

impl Literal {
    /// Scalar as text; containers and `None` have no text form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Str(value) => Some(value.clone()),
            Self::Int(value) => Some(value.to_string()),
            Self::Float(value) => Some(value.to_string()),
            Self::Bool(true) => Some("True".to_string()),
            Self::Bool(false) => Some("False".to_string()),
            Self::None | Self::List(_) | Self::Dict(_) => None,
        }
    }

    pub fn as_string_list(&self) -> Option<Vec<String>> {
        match self {
            Self::List(items) => items.iter().map(Literal::as_text).collect(),
            _ => None,
        }
    }

    pub fn as_string_map(&self) -> Option<Vec<(String, String)>> {
        match self {
            Self::Dict(entries) => entries
                .iter()
                .map(|(key, value)| Some((key.as_text()?, value.as_text()?)))
                .collect(),
            _ => None,
        }
    }

    pub fn is_dict(&self) -> bool {
        matches!(self, Self::Dict(_))
    }
}

impl From<&Value> for Literal {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::None,
            Value::Bool(flag) => Self::Bool(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(int) => Self::Int(int),
                None => Self::Float(number.as_f64().unwrap_or_default()),
            },
            Value::String(text) => Self::Str(text.clone()),
            Value::Array(items) => Self::List(items.iter().map(Literal::from).collect()),
            Value::Object(map) => Self::Dict(
                map.iter()
                    .map(|(key, value)| (Self::Str(key.clone()), Literal::from(value)))
                    .collect(),
            ),
        }
    }
}

/// Parses one literal; on failure retries once with typographic quotes made ASCII.
pub fn parse_literal(input: &str) -> Result<Literal, LiteralError> {
    match Parser::new(input).parse_document() {
        Ok(value) => Ok(value),
        Err(first) => {
            let cleaned = normalize_quotes(input);
            if cleaned == input {
                return Err(first);
            }
            Parser::new(&cleaned).parse_document().map_err(|_| first)
        }
    }
}

pub fn normalize_quotes(input: &str) -> String {
    input
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace(['\u{201C}', '\u{201D}'], "\"")
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> LiteralError {
        LiteralError {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(value) = self.peek() {
            if value.is_whitespace() {
                self.pos += 1;
            } else if value == '#' {
                while let Some(inner) = self.peek() {
                    if inner == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, wanted: char) -> Result<(), LiteralError> {
        self.skip_whitespace();
        match self.peek() {
            Some(found) if found == wanted => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(self.error(format!("expected '{wanted}', found '{found}'"))),
            None => Err(self.error(format!("expected '{wanted}', found end of input"))),
        }
    }

    fn parse_document(&mut self) -> Result<Literal, LiteralError> {
        let value = self.parse_value()?;
        self.skip_whitespace();
        if self.pos < self.chars.len() {
            return Err(self.error("trailing characters after literal"));
        }
        Ok(value)
    }

    fn parse_value(&mut self) -> Result<Literal, LiteralError> {
        self.skip_whitespace();
        match self.peek() {
            Some('\'') | Some('"') => self.parse_string().map(Literal::Str),
            Some('[') => self.parse_sequence('[', ']').map(Literal::List),
            Some('(') => self.parse_sequence('(', ')').map(Literal::List),
            Some('{') => self.parse_dict(),
            Some(value) if value == '-' || value == '+' || value.is_ascii_digit() => {
                self.parse_number()
            }
            Some(value) if value.is_alphabetic() => self.parse_keyword(),
            Some(value) => Err(self.error(format!("unexpected character '{value}'"))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_string(&mut self) -> Result<String, LiteralError> {
        let quote = self.peek().ok_or_else(|| self.error("expected string"))?;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let value = self
                .peek()
                .ok_or_else(|| self.error("unterminated string"))?;
            self.pos += 1;
            if value == quote {
                break;
            }
            if value == '\\' {
                let escaped = self
                    .peek()
                    .ok_or_else(|| self.error("unterminated escape"))?;
                self.pos += 1;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    'u' => {
                        let hex: String = self.chars.iter().skip(self.pos).take(4).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| self.error("invalid unicode escape"))?;
                        self.pos += 4;
                        out.push(code);
                    }
                    other => out.push(other),
                }
                continue;
            }
            out.push(value);
        }
        self.skip_whitespace();
        // Adjacent literals concatenate, as in Python.
        if matches!(self.peek(), Some('\'') | Some('"')) {
            out.push_str(&self.parse_string()?);
        }
        Ok(out)
    }

    fn parse_sequence(&mut self, open: char, close: char) -> Result<Vec<Literal>, LiteralError> {
        self.expect(open)?;
        let mut items = vec![];
        loop {
            self.skip_whitespace();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok(items);
            }
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(found) if found == close => {}
                Some(found) => {
                    return Err(self.error(format!("expected ',' or '{close}', found '{found}'")))
                }
                None => return Err(self.error(format!("missing '{close}'"))),
            }
        }
    }

    fn parse_dict(&mut self) -> Result<Literal, LiteralError> {
        self.expect('{')?;
        let mut entries = vec![];
        loop {
            self.skip_whitespace();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Literal::Dict(entries));
            }
            let key = self.parse_value()?;
            if matches!(key, Literal::List(_) | Literal::Dict(_)) {
                return Err(self.error("dictionary keys must be scalars"));
            }
            self.expect(':')?;
            let value = self.parse_value()?;
            entries.push((key, value));
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {}
                Some(found) => return Err(self.error(format!("expected ',' or '}}', found '{found}'"))),
                None => return Err(self.error("missing '}'")),
            }
        }
    }

    fn parse_number(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.pos += 1;
        }
        while let Some(value) = self.peek() {
            if value.is_ascii_digit() || matches!(value, '.' | '_' | 'e' | 'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let raw: String = self.chars[start..self.pos]
            .iter()
            .filter(|value| **value != '_')
            .collect();
        if let Ok(int) = raw.parse::<i64>() {
            return Ok(Literal::Int(int));
        }
        raw.parse::<f64>()
            .map(Literal::Float)
            .map_err(|_| LiteralError {
                offset: start,
                message: format!("invalid number '{raw}'"),
            })
    }

    fn parse_keyword(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while let Some(value) = self.peek() {
            if value.is_alphanumeric() || value == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "true" => Ok(Literal::Bool(true)),
            "False" | "false" => Ok(Literal::Bool(false)),
            "None" | "null" => Ok(Literal::None),
            _ => Err(LiteralError {
                offset: start,
                message: format!("unknown name '{word}'"),
            }),
        }
    }
}
