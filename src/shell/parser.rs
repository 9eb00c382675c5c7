//! Shell command line parser
//!
//! Turns one input line into assignments, arguments, and redirections:
//! 1. Words, split on unquoted whitespace
//! 2. Single quotes (literal) and double quotes (substituted)
//! 3. Backslash escapes
//! 4. Redirection operators `<`, `>`, `>>`
//! 5. Variable substitution, with same-line assignments taking priority
//!
//! Parsing never fails. An unterminated quote runs to the end of the line
//! and an operator with no target is dropped.

use super::environment::{Environment, is_valid_name};
use crate::vfs::OpenMode;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;

/// A `NAME=VALUE` that precedes the command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub name: String,
    pub value: String,
    /// Some part of the token was quoted
    pub quoted: bool,
}

/// Where a redirection sends or reads data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectMode {
    /// `<`
    Read,
    /// `>`
    Overwrite,
    /// `>>`
    Append,
}

impl RedirectMode {
    pub fn open_mode(self) -> OpenMode {
        match self {
            RedirectMode::Read => OpenMode::Read,
            RedirectMode::Overwrite => OpenMode::Overwrite,
            RedirectMode::Append => OpenMode::Append,
        }
    }

    pub fn is_write(self) -> bool {
        !matches!(self, RedirectMode::Read)
    }
}

/// Redirection specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub target: String,
    pub mode: RedirectMode,
}

impl Redirection {
    pub fn new(target: impl Into<String>, mode: RedirectMode) -> Self {
        Self {
            target: target.into(),
            mode,
        }
    }
}

/// One parsed input line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLine {
    pub variables: Vec<Assignment>,
    pub args: Vec<String>,
    pub redirections: Vec<Redirection>,
}

impl ParsedLine {
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.args.is_empty() && self.redirections.is_empty()
    }

    /// Assignments as (name, value) pairs
    pub fn exports(&self) -> Vec<(String, String)> {
        self.variables
            .iter()
            .map(|a| (a.name.clone(), a.value.clone()))
            .collect()
    }
}

/// How a piece of a word was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    Bare,
    Single,
    Double,
    /// A backslash-escaped character
    Escaped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    text: String,
    quoting: Quoting,
}

impl Segment {
    fn substitutes(&self) -> bool {
        matches!(self.quoting, Quoting::Bare | Quoting::Double)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(Vec<Segment>),
    Redirect(RedirectMode),
}

/// Tokenizer for shell input
struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    tokens: Vec<Token>,
    word: Vec<Segment>,
    bare: String,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            tokens: Vec::new(),
            word: Vec::new(),
            bare: String::new(),
        }
    }

    fn push_segment(&mut self, text: String, quoting: Quoting) {
        self.word.push(Segment { text, quoting });
    }

    /// Move pending bare characters into the current word
    fn flush_bare(&mut self) {
        if !self.bare.is_empty() {
            let text = std::mem::take(&mut self.bare);
            self.push_segment(text, Quoting::Bare);
        }
    }

    /// End the current word. Words with no characters at all are dropped.
    fn end_word(&mut self) {
        self.flush_bare();
        let word = std::mem::take(&mut self.word);
        if word.iter().any(|s| !s.text.is_empty()) {
            self.tokens.push(Token::Word(word));
        }
    }

    fn tokenize(mut self) -> Vec<Token> {
        while let Some(c) = self.chars.next() {
            match c {
                c if c.is_whitespace() => self.end_word(),
                '\'' => {
                    self.flush_bare();
                    let text = self.read_single_quoted();
                    self.push_segment(text, Quoting::Single);
                }
                '"' => {
                    self.flush_bare();
                    let text = self.read_double_quoted();
                    self.push_segment(text, Quoting::Double);
                }
                '\\' => match self.chars.next() {
                    Some(escaped) => {
                        self.flush_bare();
                        self.push_segment(escaped.to_string(), Quoting::Escaped);
                    }
                    // A trailing backslash stands for itself
                    None => self.bare.push('\\'),
                },
                '>' | '<' => {
                    self.end_word();
                    let mut run = 1;
                    while self.chars.next_if_eq(&c).is_some() {
                        run += 1;
                    }
                    let mode = match (c, run) {
                        ('<', _) => RedirectMode::Read,
                        (_, 1) => RedirectMode::Overwrite,
                        _ => RedirectMode::Append,
                    };
                    self.tokens.push(Token::Redirect(mode));
                }
                c => self.bare.push(c),
            }
        }
        self.end_word();
        self.tokens
    }

    /// Everything up to the closing quote, or to the end of input
    fn read_single_quoted(&mut self) -> String {
        self.chars.by_ref().take_while(|&c| c != '\'').collect()
    }

    /// Like single quotes, but `\\` and `\"` are escapes
    fn read_double_quoted(&mut self) -> String {
        let mut content = String::new();
        while let Some(c) = self.chars.next() {
            match c {
                '"' => break,
                '\\' => match self.chars.next_if(|&n| n == '\\' || n == '"') {
                    Some(escaped) => content.push(escaped),
                    None => content.push('\\'),
                },
                c => content.push(c),
            }
        }
        content
    }
}

/// Render a word, substituting where its quoting allows
fn expand(word: &[Segment], env: &Environment, locals: &HashMap<String, String>) -> String {
    word.iter()
        .map(|segment| {
            if segment.substitutes() {
                env.substitute(&segment.text, locals)
            } else {
                segment.text.clone()
            }
        })
        .collect()
}

/// Name of an assignment word: its first segment is bare and starts with
/// `NAME=`
fn assignment_name(word: &[Segment]) -> Option<&str> {
    let first = word.first()?;
    if first.quoting != Quoting::Bare {
        return None;
    }
    let (name, _) = first.text.split_once('=')?;
    is_valid_name(name).then_some(name)
}

/// Parse a command line
pub fn parse(line: &str, env: &Environment) -> ParsedLine {
    let tokens = Lexer::new(line).tokenize();

    let mut parsed = ParsedLine::default();
    let mut locals: HashMap<String, String> = HashMap::new();
    let mut before_command = true;
    let mut pending: Option<RedirectMode> = None;

    for token in tokens {
        let word = match token {
            Token::Redirect(mode) => {
                pending = Some(mode);
                continue;
            }
            Token::Word(word) => word,
        };

        if let Some(mode) = pending.take() {
            parsed
                .redirections
                .push(Redirection::new(expand(&word, env, &locals), mode));
            continue;
        }

        if before_command && let Some(name) = assignment_name(&word) {
            let name = name.to_string();
            let expanded = expand(&word, env, &locals);
            let value = expanded
                .split_once('=')
                .map(|(_, value)| value.to_string())
                .unwrap_or_default();
            locals.insert(name.clone(), value.clone());
            parsed.variables.push(Assignment {
                name,
                value,
                quoted: word.iter().any(|s| s.quoting != Quoting::Bare),
            });
            continue;
        }

        before_command = false;
        parsed.args.push(expand(&word, env, &locals));
    }

    parsed
}
