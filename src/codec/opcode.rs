//! Operation tokens used in frame headers.

use std::fmt;

/// Known operation tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// `path-symbols`: push or response carrying a path and its symbols.
    PathSymbols,
    /// `path-symbols?`: query symbols for a server-visible path.
    PathSymbolsQuery,
    /// `watch!`: subscribe to pushes for paths matching a wildcard.
    Watch,
    /// `SYMBOLS`: legacy response carrying only symbols.
    Symbols,
    /// `SYMBOLS?`: legacy query.
    SymbolsQuery,
}

impl Opcode {
    /// Look up a header token. Unknown tokens yield `None`.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "path-symbols" => Some(Opcode::PathSymbols),
            "path-symbols?" => Some(Opcode::PathSymbolsQuery),
            "watch!" => Some(Opcode::Watch),
            "SYMBOLS" => Some(Opcode::Symbols),
            "SYMBOLS?" => Some(Opcode::SymbolsQuery),
            _ => None,
        }
    }

    /// Header token for this opcode.
    pub fn as_str(self) -> &'static str {
        match self {
            Opcode::PathSymbols => "path-symbols",
            Opcode::PathSymbolsQuery => "path-symbols?",
            Opcode::Watch => "watch!",
            Opcode::Symbols => "SYMBOLS",
            Opcode::SymbolsQuery => "SYMBOLS?",
        }
    }

    /// True for client-to-server opcodes.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Opcode::PathSymbolsQuery | Opcode::Watch | Opcode::SymbolsQuery
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
