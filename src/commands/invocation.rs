//! Parsed command lines.

/// The closed set of commands the resolver knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind<'a> {
    Whoami,
    Fastfetch,
    Help,
    Exit,
    /// Any other first token.
    NotFound(&'a str),
}

impl<'a> CommandKind<'a> {
    /// Resolve a command name. Matching is exact and case-sensitive.
    pub fn from_name(name: &'a str) -> Self {
        match name {
            "whoami" => Self::Whoami,
            "fastfetch" => Self::Fastfetch,
            "help" => Self::Help,
            "exit" => Self::Exit,
            other => Self::NotFound(other),
        }
    }
}

/// One input line split into a command name and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation<'a> {
    /// The line as received.
    pub raw: &'a str,
    /// First whitespace-delimited token.
    pub name: &'a str,
    /// Remaining tokens. No command reads them yet.
    pub args: Vec<&'a str>,
}

impl<'a> Invocation<'a> {
    /// Tokenize a line on whitespace.
    ///
    /// Returns `None` when the line holds no tokens at all.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let mut tokens = raw.split_whitespace();
        let name = tokens.next()?;

        Some(Self {
            raw,
            name,
            args: tokens.collect(),
        })
    }

    /// The command this invocation dispatches to.
    pub fn kind(&self) -> CommandKind<'a> {
        CommandKind::from_name(self.name)
    }
}
