use std::{error::Error as StdError, fmt, str::FromStr};

/// The `<module>.<function>` reference a container is started with.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerTarget {
    module: String,
    function: String,
}

impl HandlerTarget {
    /// Builds a target from its two parts, validating both.
    pub fn new(module: &str, function: &str) -> Result<Self, TargetError> {
        format!("{}.{}", module, function).parse()
    }

    /// The module part.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The function part.
    pub fn function(&self) -> &str {
        &self.function
    }
}

impl FromStr for HandlerTarget {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TargetError::Empty);
        }
        let mut parts = s.split('.');
        let (module, function) = match (parts.next(), parts.next(), parts.next()) {
            (Some(module), Some(function), None) => (module, function),
            _ => return Err(TargetError::Malformed(s.to_owned())),
        };
        if module.is_empty() || function.is_empty() {
            return Err(TargetError::Malformed(s.to_owned()));
        }
        if let Some(ch) = s.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '.')) {
            return Err(TargetError::InvalidCharacter {
                target: s.to_owned(),
                ch,
            });
        }
        Ok(HandlerTarget {
            module: module.to_owned(),
            function: function.to_owned(),
        })
    }
}

impl fmt::Display for HandlerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.module, self.function)
    }
}

/// Why a string is not a valid `<module>.<function>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    /// Nothing was given.
    Empty,
    /// Not exactly two non-empty parts separated by a single `.`.
    Malformed(String),
    /// A character other than ASCII alphanumerics, `_` and the separator.
    InvalidCharacter {
        /// The rejected reference.
        target: String,
        /// The first offending character.
        ch: char,
    },
}

impl fmt::Display for TargetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetError::Empty => f.write_str("handler target is empty"),
            TargetError::Malformed(target) => {
                write!(f, "handler target {:?} is not of the form <module>.<function>", target)
            }
            TargetError::InvalidCharacter { target, ch } => {
                write!(f, "handler target {:?} contains invalid character {:?}", target, ch)
            }
        }
    }
}

impl StdError for TargetError {}
