//! Symbol table types carried in `path-symbols` / `SYMBOLS` payloads.
//!
//! The server sends these as JSON. Every field except `name`, `arity`,
//! `line` and `error` may be absent; the legacy dialect sends only
//! `functions`.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Symbols extracted from one source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbols {
    /// Module declared by the file, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Function definitions.
    #[serde(default)]
    pub functions: Vec<FunctionInfo>,
    /// Diagnostics reported while indexing.
    #[serde(default)]
    pub errors: Vec<ErrorInfo>,
}

impl Symbols {
    /// Decode a JSON symbols document.
    pub fn from_json(json: &[u8]) -> Result<Self, ParseError> {
        Ok(serde_json::from_slice(json)?)
    }

    /// Encode as a JSON document.
    pub fn to_json(&self) -> Result<String, ParseError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Find a function by name and arity.
    pub fn function(&self, name: &str, arity: u32) -> Option<&FunctionInfo> {
        self.functions
            .iter()
            .find(|f| f.name == name && f.arity == arity)
    }

    /// True when the server reported at least one error.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// A function definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub name: String,
    pub arity: u32,
    pub line: u32,
}

impl FunctionInfo {
    /// `name/arity`, the way functions are usually written.
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.name, self.arity)
    }
}

/// A diagnostic attached to a source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub error: String,
    pub line: u32,
}

/// Symbols pushed for a specific path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSymbols {
    pub path: String,
    pub symbols: Symbols,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_document() {
        let json = br#"{
            "module": "lists",
            "functions": [{"module": "lists", "name": "map", "arity": 2, "line": 10}],
            "errors": [{"error": "syntax error before: ')'", "line": 42}]
        }"#;

        let symbols = Symbols::from_json(json).unwrap();

        assert_eq!(symbols.module.as_deref(), Some("lists"));
        assert_eq!(symbols.functions.len(), 1);
        assert_eq!(symbols.functions[0].display_name(), "map/2");
        assert_eq!(symbols.functions[0].line, 10);
        assert!(symbols.has_errors());
        assert_eq!(symbols.errors[0].line, 42);
    }

    #[test]
    fn test_decode_empty_lists() {
        let symbols = Symbols::from_json(br#"{"functions":[],"errors":[]}"#).unwrap();
        assert_eq!(symbols, Symbols::default());
    }

    #[test]
    fn test_decode_legacy_document() {
        let json = br#"{"functions":[{"name":"start","arity":0,"line":3},{"name":"start","arity":1,"line":7}]}"#;
        let symbols = Symbols::from_json(json).unwrap();

        assert!(symbols.module.is_none());
        assert!(symbols.errors.is_empty());
        let names: Vec<String> = symbols.functions.iter().map(|f| f.display_name()).collect();
        assert_eq!(names, ["start/0", "start/1"]);
        assert_eq!(symbols.function("start", 1).map(|f| f.line), Some(7));
        assert!(symbols.function("stop", 0).is_none());
    }

    #[test]
    fn test_decode_rejects_missing_required_fields() {
        let err = Symbols::from_json(br#"{"functions":[{"name":"f"}]}"#).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Symbols::from_json(b"not json").is_err());
    }

    #[test]
    fn test_to_json_omits_absent_module() {
        let json = Symbols::default().to_json().unwrap();
        assert_eq!(json, r#"{"functions":[],"errors":[]}"#);
    }
}
