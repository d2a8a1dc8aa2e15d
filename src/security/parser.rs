//! A small POSIX-shell parser used for command validation.
//!
//! The policy checks need to see the command the way the shell will: `|`
//! inside a quoted string is not a pipe, `$(…)` inside double quotes or a
//! heredoc body is still a command substitution, `1>&2` is a redirection.
//! Substring scanning gets all of these wrong, so validation parses the
//! command into a tree first. The grammar covered here is the subset the
//! policy cares about: simple commands, pipelines, `&&`/`||` chains, `;` and
//! newline separators, background `&`, subshells, redirections (including
//! fd-prefixed forms and heredocs) and detection of command substitution.
//!
//! Parse failure is always an error; callers treat it as a denial.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unterminated single-quoted string")]
    UnterminatedSingleQuote,
    #[error("unterminated double-quoted string")]
    UnterminatedDoubleQuote,
    #[error("missing redirection target after '{0}'")]
    MissingRedirectTarget(&'static str),
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unterminated subshell")]
    UnterminatedSubshell,
    #[error("unexpected end of input")]
    UnexpectedEof,
}

/// Flavor of command substitution found while lexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstKind {
    DollarParen,
    Backtick,
}

impl fmt::Display for SubstKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubstKind::DollarParen => write!(f, "dollar-parentheses"),
            SubstKind::Backtick => write!(f, "backticks"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirOp {
    In,
    Out,
    Append,
    Heredoc,
    HereString,
    DupIn,
    DupOut,
    OutErr,
}

impl RedirOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            RedirOp::In => "<",
            RedirOp::Out => ">",
            RedirOp::Append => ">>",
            RedirOp::Heredoc => "<<",
            RedirOp::HereString => "<<<",
            RedirOp::DupIn => "<&",
            RedirOp::DupOut => ">&",
            RedirOp::OutErr => "&>",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    /// Explicit file descriptor prefix, e.g. the `2` in `2>`.
    pub fd: Option<u32>,
    pub op: RedirOp,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Pipe,
    AndIf,
    OrIf,
    Amp,
    Semi,
    Newline,
    LParen,
    RParen,
    Redirect(Redirection),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Word(w) => w.clone(),
            Token::Pipe => "|".into(),
            Token::AndIf => "&&".into(),
            Token::OrIf => "||".into(),
            Token::Amp => "&".into(),
            Token::Semi => ";".into(),
            Token::Newline => "newline".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Redirect(r) => r.op.symbol().into(),
        }
    }
}

/// A whole command string: statements separated by `;` or newlines, plus
/// every command substitution the lexer saw anywhere outside single quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    pub statements: Vec<Statement>,
    pub substitutions: Vec<SubstKind>,
}

/// One and-or list, e.g. `a | b && c`. `background` is set by a trailing `&`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub first: Pipeline,
    pub rest: Vec<(ChainOp, Pipeline)>,
    pub background: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOp {
    AndIf,
    OrIf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Simple(SimpleCommand),
    Subshell {
        statements: Vec<Statement>,
        redirections: Vec<Redirection>,
    },
}

/// Words carry their unquoted text, so `echo 'a|b'` yields the word `a|b`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimpleCommand {
    pub words: Vec<String>,
    pub redirections: Vec<Redirection>,
}

impl Script {
    pub fn has_background(&self) -> bool {
        self.statements.iter().any(Statement::has_background)
    }

    pub fn has_pipes(&self) -> bool {
        self.statements.iter().any(Statement::has_pipes)
    }

    pub fn has_redirections(&self) -> bool {
        self.statements.iter().any(Statement::has_redirections)
    }

    /// True when more than one statement is present (counting inside
    /// subshells) or any `&&`/`||` chain exists.
    pub fn has_chaining(&self) -> bool {
        self.statements.len() > 1 || self.statements.iter().any(Statement::has_chaining)
    }

    /// The first simple command in execution order, descending into
    /// subshells.
    pub fn first_simple_command(&self) -> Option<&SimpleCommand> {
        self.statements.iter().find_map(Statement::first_simple_command)
    }
}

impl Statement {
    fn pipelines(&self) -> impl Iterator<Item = &Pipeline> {
        std::iter::once(&self.first).chain(self.rest.iter().map(|(_, p)| p))
    }

    fn has_background(&self) -> bool {
        self.background
            || self
                .pipelines()
                .flat_map(|p| p.commands.iter())
                .any(Command::has_background)
    }

    fn has_pipes(&self) -> bool {
        self.pipelines()
            .any(|p| p.commands.len() > 1 || p.commands.iter().any(Command::has_pipes))
    }

    fn has_redirections(&self) -> bool {
        self.pipelines()
            .flat_map(|p| p.commands.iter())
            .any(Command::has_redirections)
    }

    fn has_chaining(&self) -> bool {
        !self.rest.is_empty()
            || self
                .pipelines()
                .flat_map(|p| p.commands.iter())
                .any(Command::has_chaining)
    }

    fn first_simple_command(&self) -> Option<&SimpleCommand> {
        self.pipelines()
            .flat_map(|p| p.commands.iter())
            .find_map(Command::first_simple_command)
    }
}

impl Command {
    fn subshell_statements(&self) -> &[Statement] {
        match self {
            Command::Simple(_) => &[],
            Command::Subshell { statements, .. } => statements,
        }
    }

    fn has_background(&self) -> bool {
        self.subshell_statements().iter().any(Statement::has_background)
    }

    fn has_pipes(&self) -> bool {
        self.subshell_statements().iter().any(Statement::has_pipes)
    }

    fn has_redirections(&self) -> bool {
        match self {
            Command::Simple(cmd) => !cmd.redirections.is_empty(),
            Command::Subshell {
                statements,
                redirections,
            } => {
                !redirections.is_empty() || statements.iter().any(Statement::has_redirections)
            }
        }
    }

    fn has_chaining(&self) -> bool {
        let statements = self.subshell_statements();
        statements.len() > 1 || statements.iter().any(Statement::has_chaining)
    }

    fn first_simple_command(&self) -> Option<&SimpleCommand> {
        match self {
            Command::Simple(cmd) => Some(cmd),
            Command::Subshell { statements, .. } => {
                statements.iter().find_map(Statement::first_simple_command)
            }
        }
    }
}

/// Parse `input` into a [`Script`].
pub fn parse(input: &str) -> Result<Script, ParseError> {
    let mut lexer = Lexer::new(input);
    lexer.run()?;
    let substitutions = lexer.substitutions;
    let mut parser = Parser {
        tokens: lexer.tokens,
        pos: 0,
    };
    let statements = parser.parse_statements(false)?;
    Ok(Script {
        statements,
        substitutions,
    })
}

struct Lexer {
    src: Vec<char>,
    pos: usize,
    tokens: Vec<Token>,
    substitutions: Vec<SubstKind>,
    // Heredoc delimiters whose bodies start after the next newline.
    pending_heredocs: Vec<String>,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Self {
            src: input.chars().collect(),
            pos: 0,
            tokens: Vec::new(),
            substitutions: Vec::new(),
            pending_heredocs: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn run(&mut self) -> Result<(), ParseError> {
        loop {
            while matches!(self.peek(), Some(' ') | Some('\t') | Some('\r')) {
                self.pos += 1;
            }
            let Some(c) = self.peek() else { break };
            match c {
                '\n' => {
                    self.pos += 1;
                    self.drain_heredocs();
                    self.tokens.push(Token::Newline);
                }
                '#' => {
                    // Comment to end of line; only reachable at a word start.
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.pos += 1;
                    }
                }
                '|' => {
                    self.pos += 1;
                    if self.eat('|') {
                        self.tokens.push(Token::OrIf);
                    } else {
                        self.tokens.push(Token::Pipe);
                    }
                }
                '&' => {
                    self.pos += 1;
                    if self.eat('&') {
                        self.tokens.push(Token::AndIf);
                    } else if self.eat('>') {
                        // `&>` / `&>>` redirect both stdout and stderr.
                        self.eat('>');
                        self.push_redirect(None, RedirOp::OutErr)?;
                    } else {
                        self.tokens.push(Token::Amp);
                    }
                }
                ';' => {
                    self.pos += 1;
                    self.tokens.push(Token::Semi);
                }
                '(' => {
                    self.pos += 1;
                    self.tokens.push(Token::LParen);
                }
                ')' => {
                    self.pos += 1;
                    self.tokens.push(Token::RParen);
                }
                '<' | '>' => self.lex_redirect(None)?,
                c if c.is_ascii_digit() => {
                    // A run of digits directly followed by `<` or `>` is a
                    // file-descriptor prefix, e.g. `2>` or `1>&2`.
                    let mut end = self.pos;
                    while matches!(self.src.get(end), Some(d) if d.is_ascii_digit()) {
                        end += 1;
                    }
                    if matches!(self.src.get(end), Some('<') | Some('>')) {
                        let fd: u32 = self.src[self.pos..end]
                            .iter()
                            .collect::<String>()
                            .parse()
                            .unwrap_or(0);
                        self.pos = end;
                        self.lex_redirect(Some(fd))?;
                    } else {
                        self.lex_word()?;
                    }
                }
                _ => self.lex_word()?,
            }
        }
        Ok(())
    }

    fn lex_redirect(&mut self, fd: Option<u32>) -> Result<(), ParseError> {
        let op = match self.bump() {
            Some('<') => {
                if self.eat('<') {
                    if self.eat('<') {
                        RedirOp::HereString
                    } else {
                        self.eat('-');
                        RedirOp::Heredoc
                    }
                } else if self.eat('&') {
                    RedirOp::DupIn
                } else {
                    RedirOp::In
                }
            }
            Some('>') => {
                if self.eat('>') {
                    RedirOp::Append
                } else if self.eat('&') {
                    RedirOp::DupOut
                } else {
                    RedirOp::Out
                }
            }
            _ => return Err(ParseError::UnexpectedEof),
        };
        self.push_redirect(fd, op)
    }

    fn push_redirect(&mut self, fd: Option<u32>, op: RedirOp) -> Result<(), ParseError> {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.pos += 1;
        }
        let target = match self.peek() {
            Some(c) if !is_metachar(c) => self.word_text()?,
            _ => return Err(ParseError::MissingRedirectTarget(op.symbol())),
        };
        if op == RedirOp::Heredoc {
            self.pending_heredocs.push(target.clone());
        }
        self.tokens.push(Token::Redirect(Redirection { fd, op, target }));
        Ok(())
    }

    fn lex_word(&mut self) -> Result<(), ParseError> {
        let word = self.word_text()?;
        self.tokens.push(Token::Word(word));
        Ok(())
    }

    /// Lex one word, removing quotes and recording substitutions.
    fn word_text(&mut self) -> Result<String, ParseError> {
        let mut text = String::new();
        loop {
            let Some(c) = self.peek() else { break };
            match c {
                c if is_metachar(c) => break,
                '\'' => {
                    self.pos += 1;
                    loop {
                        match self.bump() {
                            Some('\'') => break,
                            Some(inner) => text.push(inner),
                            None => return Err(ParseError::UnterminatedSingleQuote),
                        }
                    }
                }
                '"' => {
                    self.pos += 1;
                    self.double_quoted(&mut text)?;
                }
                '\\' => {
                    self.pos += 1;
                    match self.bump() {
                        Some('\n') => {} // line continuation
                        Some(escaped) => text.push(escaped),
                        None => text.push('\\'),
                    }
                }
                '$' => {
                    self.pos += 1;
                    self.dollar(&mut text);
                }
                '`' => {
                    self.pos += 1;
                    self.substitutions.push(SubstKind::Backtick);
                    self.skip_backquoted();
                }
                _ => {
                    self.pos += 1;
                    text.push(c);
                }
            }
        }
        Ok(text)
    }

    fn double_quoted(&mut self, text: &mut String) -> Result<(), ParseError> {
        loop {
            match self.bump() {
                Some('"') => return Ok(()),
                Some('\\') => match self.bump() {
                    Some('\n') => {}
                    Some(c @ ('$' | '`' | '"' | '\\')) => text.push(c),
                    Some(c) => {
                        text.push('\\');
                        text.push(c);
                    }
                    None => return Err(ParseError::UnterminatedDoubleQuote),
                },
                Some('$') => self.dollar(text),
                Some('`') => {
                    self.substitutions.push(SubstKind::Backtick);
                    self.skip_backquoted();
                }
                Some(c) => text.push(c),
                None => return Err(ParseError::UnterminatedDoubleQuote),
            }
        }
    }

    /// Handle the character after `$`: `$(…)` is a command substitution,
    /// `$((…))` is arithmetic, anything else is ordinary expansion text.
    fn dollar(&mut self, text: &mut String) {
        if self.peek() == Some('(') {
            if self.peek_at(1) == Some('(') {
                self.pos += 2;
                self.skip_balanced_parens(2);
            } else {
                self.pos += 1;
                self.substitutions.push(SubstKind::DollarParen);
                self.skip_balanced_parens(1);
            }
        } else {
            text.push('$');
        }
    }

    /// Skip past `depth` unbalanced open parens, respecting quotes and
    /// escapes. Stops quietly at end of input; the recorded substitution is
    /// what matters.
    fn skip_balanced_parens(&mut self, mut depth: u32) {
        while depth > 0 {
            match self.bump() {
                Some('(') => depth += 1,
                Some(')') => depth -= 1,
                Some('\\') => {
                    self.pos += 1;
                }
                Some('\'') => while !matches!(self.bump(), Some('\'') | None) {},
                Some('"') => loop {
                    match self.bump() {
                        Some('"') | None => break,
                        Some('\\') => {
                            self.pos += 1;
                        }
                        _ => {}
                    }
                },
                Some(_) => {}
                None => return,
            }
        }
    }

    fn skip_backquoted(&mut self) {
        loop {
            match self.bump() {
                Some('`') | None => return,
                Some('\\') => {
                    self.pos += 1;
                }
                Some(_) => {}
            }
        }
    }

    /// Consume heredoc bodies that begin after a newline, scanning them for
    /// command substitution. Bodies are raw text, not tokens.
    fn drain_heredocs(&mut self) {
        let delimiters: Vec<String> = self.pending_heredocs.drain(..).collect();
        for delim in delimiters {
            loop {
                let start = self.pos;
                while !matches!(self.peek(), None | Some('\n')) {
                    self.pos += 1;
                }
                let line: String = self.src[start..self.pos].iter().collect();
                self.scan_heredoc_line(&line);
                let at_eof = self.peek().is_none();
                self.eat('\n');
                if line.trim() == delim || at_eof {
                    break;
                }
            }
        }
    }

    fn scan_heredoc_line(&mut self, line: &str) {
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '$' if chars.peek() == Some(&'(') => {
                    self.substitutions.push(SubstKind::DollarParen);
                    chars.next();
                }
                '`' => self.substitutions.push(SubstKind::Backtick),
                _ => {}
            }
        }
    }
}

fn is_metachar(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | '|' | '&' | ';' | '<' | '>' | '(' | ')')
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_statements(&mut self, in_subshell: bool) -> Result<Vec<Statement>, ParseError> {
        let mut statements = Vec::new();
        loop {
            while matches!(self.peek(), Some(Token::Semi) | Some(Token::Newline)) {
                self.pos += 1;
            }
            match self.peek() {
                None => {
                    if in_subshell {
                        return Err(ParseError::UnterminatedSubshell);
                    }
                    break;
                }
                Some(Token::RParen) => {
                    if in_subshell {
                        break;
                    }
                    return Err(ParseError::UnexpectedToken(")".into()));
                }
                _ => {}
            }
            let mut statement = self.parse_statement()?;
            match self.peek() {
                Some(Token::Amp) => {
                    self.pos += 1;
                    statement.background = true;
                }
                Some(Token::Semi) | Some(Token::Newline) => {
                    self.pos += 1;
                }
                Some(Token::RParen) if in_subshell => {}
                None => {}
                Some(tok) => return Err(ParseError::UnexpectedToken(tok.describe())),
            }
            statements.push(statement);
        }
        Ok(statements)
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let first = self.parse_pipeline()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Token::AndIf) => ChainOp::AndIf,
                Some(Token::OrIf) => ChainOp::OrIf,
                _ => break,
            };
            self.pos += 1;
            rest.push((op, self.parse_pipeline()?));
        }
        Ok(Statement {
            first,
            rest,
            background: false,
        })
    }

    fn parse_pipeline(&mut self) -> Result<Pipeline, ParseError> {
        let mut commands = vec![self.parse_command()?];
        while matches!(self.peek(), Some(Token::Pipe)) {
            self.pos += 1;
            commands.push(self.parse_command()?);
        }
        Ok(Pipeline { commands })
    }

    fn parse_command(&mut self) -> Result<Command, ParseError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.pos += 1;
            let statements = self.parse_statements(true)?;
            match self.bump() {
                Some(Token::RParen) => {}
                _ => return Err(ParseError::UnterminatedSubshell),
            }
            let mut redirections = Vec::new();
            while let Some(Token::Redirect(_)) = self.peek() {
                if let Some(Token::Redirect(r)) = self.bump() {
                    redirections.push(r);
                }
            }
            return Ok(Command::Subshell {
                statements,
                redirections,
            });
        }

        let mut command = SimpleCommand::default();
        loop {
            match self.peek() {
                Some(Token::Word(_)) => {
                    if let Some(Token::Word(w)) = self.bump() {
                        command.words.push(w);
                    }
                }
                Some(Token::Redirect(_)) => {
                    if let Some(Token::Redirect(r)) = self.bump() {
                        command.redirections.push(r);
                    }
                }
                _ => break,
            }
        }
        if command.words.is_empty() && command.redirections.is_empty() {
            let found = self
                .peek()
                .map(Token::describe)
                .unwrap_or_else(|| "end of input".into());
            return Err(ParseError::UnexpectedToken(found));
        }
        Ok(Command::Simple(command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(script: &Script) -> Vec<String> {
        script
            .first_simple_command()
            .map(|c| c.words.clone())
            .unwrap_or_default()
    }

    #[test]
    fn simple_command_words() {
        let script = parse("echo hello world").unwrap();
        assert_eq!(words(&script), vec!["echo", "hello", "world"]);
        assert!(!script.has_pipes());
        assert!(!script.has_chaining());
        assert!(script.substitutions.is_empty());
    }

    #[test]
    fn quoted_metacharacters_are_literal() {
        let script = parse("echo 'a|b' \"c && d\"").unwrap();
        assert_eq!(words(&script), vec!["echo", "a|b", "c && d"]);
        assert!(!script.has_pipes());
        assert!(!script.has_chaining());
    }

    #[test]
    fn pipes_and_chains_detected() {
        assert!(parse("a | b").unwrap().has_pipes());
        assert!(parse("a && b").unwrap().has_chaining());
        assert!(parse("a || b").unwrap().has_chaining());
        assert!(parse("a; b").unwrap().has_chaining());
        assert!(parse("a\nb").unwrap().has_chaining());
        assert!(!parse("a").unwrap().has_chaining());
    }

    #[test]
    fn background_flag() {
        assert!(parse("sleep 5 &").unwrap().has_background());
        assert!(!parse("sleep 5").unwrap().has_background());
        // `&` inside quotes is text
        assert!(!parse("echo 'a &'").unwrap().has_background());
    }

    #[test]
    fn fd_prefixed_redirection() {
        let script = parse("echo err 1>&2").unwrap();
        assert!(script.has_redirections());
        let cmd = script.first_simple_command().unwrap();
        assert_eq!(cmd.words, vec!["echo", "err"]);
        assert_eq!(
            cmd.redirections,
            vec![Redirection {
                fd: Some(1),
                op: RedirOp::DupOut,
                target: "2".into()
            }]
        );
    }

    #[test]
    fn plain_redirections() {
        assert!(parse("echo hi > /tmp/out").unwrap().has_redirections());
        assert!(parse("cat < /tmp/in").unwrap().has_redirections());
        assert!(parse("echo hi >> log").unwrap().has_redirections());
        assert!(parse("cmd &> all.log").unwrap().has_redirections());
        assert!(!parse("echo '2>1'").unwrap().has_redirections());
    }

    #[test]
    fn digits_without_redirect_are_a_word() {
        let script = parse("echo 123 456").unwrap();
        assert_eq!(words(&script), vec!["echo", "123", "456"]);
        assert!(!script.has_redirections());
    }

    #[test]
    fn dollar_paren_substitution() {
        let script = parse("echo $(date)").unwrap();
        assert_eq!(script.substitutions, vec![SubstKind::DollarParen]);
    }

    #[test]
    fn backtick_substitution() {
        let script = parse("echo `date`").unwrap();
        assert_eq!(script.substitutions, vec![SubstKind::Backtick]);
    }

    #[test]
    fn substitution_inside_double_quotes() {
        let script = parse("echo \"today is $(date)\"").unwrap();
        assert_eq!(script.substitutions, vec![SubstKind::DollarParen]);
    }

    #[test]
    fn substitution_inside_single_quotes_is_text() {
        let script = parse("echo '$(date)'").unwrap();
        assert!(script.substitutions.is_empty());
        assert_eq!(words(&script), vec!["echo", "$(date)"]);
    }

    #[test]
    fn arithmetic_expansion_is_not_substitution() {
        let script = parse("echo $((1 + 2))").unwrap();
        assert!(script.substitutions.is_empty());
    }

    #[test]
    fn substitution_inside_heredoc_body() {
        let script = parse("cat <<EOF\nhello $(whoami)\nEOF").unwrap();
        assert!(script.has_redirections());
        assert_eq!(script.substitutions, vec![SubstKind::DollarParen]);
    }

    #[test]
    fn heredoc_body_is_not_tokenized() {
        // The `|` in the body must not register as a pipe.
        let script = parse("cat <<EOF\na | b\nEOF").unwrap();
        assert!(!script.has_pipes());
    }

    #[test]
    fn subshell_contents_counted() {
        let script = parse("(cd /tmp && ls)").unwrap();
        assert!(script.has_chaining());
        assert_eq!(words(&script), vec!["cd", "/tmp"]);
    }

    #[test]
    fn dollar_variable_is_plain_text() {
        let script = parse("echo $HOME ${USER}").unwrap();
        assert!(script.substitutions.is_empty());
        assert_eq!(words(&script), vec!["echo", "$HOME", "${USER}"]);
    }

    #[test]
    fn comment_ignored() {
        let script = parse("echo hi # not | a pipe").unwrap();
        assert!(!script.has_pipes());
        assert_eq!(words(&script), vec!["echo", "hi"]);
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            parse("echo 'oops").unwrap_err(),
            ParseError::UnterminatedSingleQuote
        );
        assert_eq!(
            parse("echo \"oops").unwrap_err(),
            ParseError::UnterminatedDoubleQuote
        );
        assert_eq!(
            parse("echo hi >").unwrap_err(),
            ParseError::MissingRedirectTarget(">")
        );
        assert!(matches!(
            parse("| grep x").unwrap_err(),
            ParseError::UnexpectedToken(_)
        ));
        assert_eq!(
            parse("(echo hi").unwrap_err(),
            ParseError::UnterminatedSubshell
        );
    }

    #[test]
    fn empty_input_parses_to_nothing() {
        let script = parse("").unwrap();
        assert!(script.statements.is_empty());
    }

    #[test]
    fn escaped_operator_is_literal() {
        let script = parse("echo a\\|b").unwrap();
        assert!(!script.has_pipes());
        assert_eq!(words(&script), vec!["echo", "a|b"]);
    }
}
