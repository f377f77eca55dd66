use std::fmt;

/// Errors that can occur while compiling or evaluating a cost formula.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaError {
    /// Lexical or syntactic errors in the formula text
    ParseError {
        message: String,
        position: Option<usize>,
    },

    /// Identifier not present in the parameter bag
    UnknownIdentifier { name: String },

    /// Operand or result of the wrong kind (boolean where a number is
    /// required, or the other way around)
    TypeError { message: String },
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaError::ParseError { message, position } => {
                if let Some(pos) = position {
                    write!(f, "formula parse error at position {}: {}", pos, message)
                } else {
                    write!(f, "formula parse error: {}", message)
                }
            }
            FormulaError::UnknownIdentifier { name } => {
                write!(f, "unknown parameter '{}'", name)
            }
            FormulaError::TypeError { message } => {
                write!(f, "formula type error: {}", message)
            }
        }
    }
}

impl std::error::Error for FormulaError {}

impl FormulaError {
    /// Create a parse error with position
    pub fn parse_error(message: impl Into<String>, position: Option<usize>) -> Self {
        FormulaError::ParseError {
            message: message.into(),
            position,
        }
    }

    /// Create an unknown-identifier error
    pub fn unknown_identifier(name: impl Into<String>) -> Self {
        FormulaError::UnknownIdentifier { name: name.into() }
    }

    /// Create a type error
    pub fn type_error(message: impl Into<String>) -> Self {
        FormulaError::TypeError {
            message: message.into(),
        }
    }
}

/// Result type for formula operations
pub type FormulaResult<T> = Result<T, FormulaError>;
