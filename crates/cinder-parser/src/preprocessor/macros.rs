//! Macro definitions
//!
//! Parses `NAME`, `NAME=VALUE` and `NAME(args)=BODY` tokens into compiler
//! `-D` arguments.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static MACRO_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[A-Za-z_][A-Za-z0-9_]*(\([A-Za-z0-9_, .]*\))?)(=(?P<value>(?s:.*)))?$")
        .expect("macro token pattern is valid")
});

/// Errors for malformed macro tokens
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MacroError {
    #[error("invalid macro token: {0:?}")]
    InvalidToken(String),
}

/// A macro definition passed to the preprocessor and the compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    pub name: String,
    pub value: Option<String>,
}

impl MacroDefinition {
    /// Create a macro that is simply defined (no value)
    pub fn defined(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
        }
    }

    /// Create a macro with a specific value
    pub fn with_value(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value.to_string()),
        }
    }

    /// Parse a `NAME` or `NAME=VALUE` token
    pub fn parse(token: &str) -> Result<Self, MacroError> {
        let captures = MACRO_TOKEN
            .captures(token)
            .ok_or_else(|| MacroError::InvalidToken(token.to_string()))?;

        Ok(Self {
            name: captures["name"].to_string(),
            value: captures.name("value").map(|m| m.as_str().to_string()),
        })
    }

    /// Parse every token, stopping at the first malformed one
    pub fn parse_all<I, S>(tokens: I) -> Result<Vec<Self>, MacroError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tokens
            .into_iter()
            .map(|token| Self::parse(token.as_ref()))
            .collect()
    }

    /// Convert to a `-D` argument
    pub fn to_arg(&self) -> String {
        match &self.value {
            Some(v) => format!("-D{}={}", self.name, v),
            None => format!("-D{}", self.name),
        }
    }
}

impl std::str::FromStr for MacroDefinition {
    type Err = MacroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
