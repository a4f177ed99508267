use std::fmt::{Display, Formatter, Result as FmtResult};
use thiserror::Error;

/// Which chemistry-engine operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolkitOperation {
    Parse,
    BondBreak,
    Canonicalize,
    Match,
}

impl Display for ToolkitOperation {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        match self {
            Self::Parse => write!(f, "parse"),
            Self::BondBreak => write!(f, "bond break"),
            Self::Canonicalize => write!(f, "canonicalize"),
            Self::Match => write!(f, "match"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SmilesError {
    #[error("Unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),
    #[error("Unknown element '{0}' at position {1}")]
    UnknownElement(String, usize),
    #[error("Unclosed bracket '[' at position {0}")]
    UnclosedBracket(usize),
    #[error("Branch start '(' at position {0} without a current atom")]
    BranchNoCurrentAtom(usize),
    #[error("Branch end ')' at position {0} without a matching '('")]
    BranchEndNoStart(usize),
    #[error("Unclosed branch at end of input")]
    UnclosedBranch,
    #[error("Ring closure {0} at position {1} without a current atom")]
    RingClosureNoCurrentAtom(u16, usize),
    #[error("Ring closure {0} opened but never closed")]
    UnclosedRing(u16),
    #[error("Ring closure {0} joins an atom to itself or to an existing neighbor")]
    InvalidRingClosure(u16),
    #[error("Bond symbol at position {0} is not followed by an atom")]
    DanglingBond(usize),
    #[error("Empty SMILES string")]
    Empty,
}

#[derive(Error, Debug)]
pub enum MmpError {
    #[error("Failed to parse '{input}': {source}")]
    Parse {
        input: String,
        #[source]
        source: SmilesError,
    },
    #[error("No valid fragmentation: {0}")]
    NoValidFragmentation(String),
    #[error("Complexity limit exceeded: {estimate} cuts estimated, ceiling is {ceiling}")]
    ComplexityLimitExceeded { estimate: u128, ceiling: u128 },
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Toolkit {operation} failure: {message}")]
    Toolkit {
        operation: ToolkitOperation,
        message: String,
    },
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    #[error("Batch cancelled")]
    Cancelled,
    #[error("Fragmentation factory is closed")]
    FactoryClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MmpError {
    pub fn parse(input: impl Into<String>, source: SmilesError) -> Self {
        Self::Parse {
            input: input.into(),
            source,
        }
    }

    pub fn toolkit(operation: ToolkitOperation, message: impl Into<String>) -> Self {
        Self::Toolkit {
            operation,
            message: message.into(),
        }
    }

    /// Fatal errors halt a whole batch. Everything else only rejects the
    /// offending row.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ResourceExhausted(_)
                | Self::Cancelled
                | Self::InvalidConfiguration(_)
                | Self::Io(_)
                | Self::Csv(_)
                | Self::Json(_)
        )
    }

    /// A short, stable reason string written to the reject output.
    pub fn reason(&self) -> String {
        match self {
            Self::Parse { .. } => "Could not parse".to_string(),
            Self::NoValidFragmentation(why) => format!("No valid fragmentation: {why}"),
            Self::ComplexityLimitExceeded { .. } => "Too many cuts".to_string(),
            Self::Toolkit { operation, .. } => format!("Toolkit {operation} failure"),
            other => other.to_string(),
        }
    }
}

pub type Result<T, E = MmpError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(MmpError::ResourceExhausted("out of memory".into()).is_fatal());
        assert!(MmpError::Cancelled.is_fatal());
        assert!(!MmpError::NoValidFragmentation("no bonds".into()).is_fatal());
        assert!(!MmpError::toolkit(ToolkitOperation::Canonicalize, "boom").is_fatal());
        assert!(!MmpError::parse("C(", SmilesError::UnclosedBranch).is_fatal());
    }

    #[test]
    fn test_reasons() {
        let err = MmpError::ComplexityLimitExceeded {
            estimate: 10,
            ceiling: 5,
        };
        assert_eq!(err.reason(), "Too many cuts");
        let err = MmpError::toolkit(ToolkitOperation::BondBreak, "missing bond");
        assert_eq!(err.reason(), "Toolkit bond break failure");
        assert!(err.to_string().contains("missing bond"));
    }
}
