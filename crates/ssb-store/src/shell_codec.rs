//! Flat `NAME=value` files with shell quoting and `( ... )` arrays.

use std::iter::Peekable;
use std::str::Chars;

use anyhow::{anyhow, bail, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Scalar(String),
    Array(Vec<String>),
}

impl ConfigValue {
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }
}

/// Single-quotes `value` so a shell reads it back verbatim.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn render_assignment(name: &str, value: &ConfigValue) -> String {
    match value {
        ConfigValue::Scalar(value) => format!("{name}={}", quote(value)),
        ConfigValue::Array(items) => {
            let quoted = items.iter().map(|item| quote(item)).collect::<Vec<_>>();
            if quoted.is_empty() {
                format!("{name}=()")
            } else {
                format!("{name}=( {} )", quoted.join(" "))
            }
        }
    }
}

/// Parses every assignment in `raw`, in file order.
pub fn parse_assignments(raw: &str) -> Result<Vec<(String, ConfigValue)>> {
    let mut parser = Parser {
        chars: raw.chars().peekable(),
        line: 1,
    };
    let mut assignments = Vec::new();
    while let Some(assignment) = parser.next_assignment()? {
        assignments.push(assignment);
    }
    Ok(assignments)
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl Parser<'_> {
    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next();
        if ch == Some('\n') {
            self.line += 1;
        }
        ch
    }

    fn skip_blank_and_comments(&mut self) {
        while let Some(&ch) = self.chars.peek() {
            if ch.is_whitespace() || ch == ';' {
                self.bump();
            } else if ch == '#' {
                self.skip_line();
            } else {
                break;
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.bump() {
            if ch == '\n' {
                break;
            }
        }
    }

    fn next_assignment(&mut self) -> Result<Option<(String, ConfigValue)>> {
        self.skip_blank_and_comments();
        if self.chars.peek().is_none() {
            return Ok(None);
        }

        let line = self.line;
        let mut name = String::new();
        while let Some(&ch) = self.chars.peek() {
            if ch == '=' {
                break;
            }
            if !(ch.is_ascii_alphanumeric() || ch == '_') {
                bail!("line {line}: expected NAME=value, found {ch:?}");
            }
            name.push(ch);
            self.bump();
        }
        if self.bump() != Some('=') || name.is_empty() {
            bail!("line {line}: expected NAME=value");
        }
        if name.starts_with(|ch: char| ch.is_ascii_digit()) {
            bail!("line {line}: invalid variable name {name}");
        }

        let value = if self.chars.peek() == Some(&'(') {
            self.bump();
            ConfigValue::Array(self.array_items(line)?)
        } else {
            ConfigValue::Scalar(self.word()?.unwrap_or_default())
        };
        Ok(Some((name, value)))
    }

    fn array_items(&mut self, start_line: usize) -> Result<Vec<String>> {
        let mut items = Vec::new();
        loop {
            while matches!(self.chars.peek(), Some(ch) if ch.is_whitespace()) {
                self.bump();
            }
            match self.chars.peek() {
                None => bail!("line {start_line}: unterminated array"),
                Some(')') => {
                    self.bump();
                    return Ok(items);
                }
                Some('#') => self.skip_line(),
                Some(_) => {
                    if let Some(word) = self.word()? {
                        items.push(word);
                    }
                }
            }
        }
    }

    /// One shell word; stops at unquoted whitespace, `;`, or `)`.
    fn word(&mut self) -> Result<Option<String>> {
        let mut word = String::new();
        let mut seen = false;
        while let Some(&ch) = self.chars.peek() {
            match ch {
                ch if ch.is_whitespace() || ch == ';' || ch == ')' => break,
                '\'' => {
                    self.bump();
                    seen = true;
                    self.single_quoted(&mut word)?;
                }
                '"' => {
                    self.bump();
                    seen = true;
                    self.double_quoted(&mut word)?;
                }
                '\\' => {
                    self.bump();
                    seen = true;
                    match self.bump() {
                        Some('\n') | None => {}
                        Some(escaped) => word.push(escaped),
                    }
                }
                other => {
                    self.bump();
                    seen = true;
                    word.push(other);
                }
            }
        }
        Ok(seen.then_some(word))
    }

    fn single_quoted(&mut self, word: &mut String) -> Result<()> {
        let line = self.line;
        loop {
            match self.bump() {
                Some('\'') => return Ok(()),
                Some(ch) => word.push(ch),
                None => return Err(anyhow!("line {line}: unterminated single quote")),
            }
        }
    }

    fn double_quoted(&mut self, word: &mut String) -> Result<()> {
        let line = self.line;
        loop {
            match self.bump() {
                Some('"') => return Ok(()),
                Some('\\') => match self.bump() {
                    Some(ch @ ('"' | '\\' | '$' | '`')) => word.push(ch),
                    Some('\n') => {}
                    Some(other) => {
                        word.push('\\');
                        word.push(other);
                    }
                    None => return Err(anyhow!("line {line}: unterminated double quote")),
                },
                Some(ch) => word.push(ch),
                None => return Err(anyhow!("line {line}: unterminated double quote")),
            }
        }
    }
}
