use super::BinaryName;
use std::fmt;

/// Errors building up the class graph or reading method bodies
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Malformed assembly input
    Parse { line: usize, message: String },

    /// Invalid class, field, or method name
    MalformedName(String),

    /// Invalid field or method descriptor
    MalformedDescriptor(String, std::io::Error),

    /// A class was declared twice
    DuplicateClass(BinaryName),

    /// A class is referred to as a super type but never declared
    MissingClass(BinaryName),

    /// The superclass chain of a class loops back on itself
    CyclicInheritance(BinaryName),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::Parse { line, message } => write!(f, "line {}: {}", line, message),
            Error::MalformedName(msg) => f.write_str(msg),
            Error::MalformedDescriptor(desc, err) => {
                write!(f, "malformed descriptor '{}': {}", desc, err)
            }
            Error::DuplicateClass(name) => write!(f, "class '{}' is declared twice", name),
            Error::MissingClass(name) => write!(f, "class '{}' is never declared", name),
            Error::CyclicInheritance(name) => {
                write!(f, "class '{}' is its own super type", name)
            }
        }
    }
}

impl std::error::Error for Error {}

/// Failure to resolve a class referenced from code being verified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Class is not in the class graph at all
    MissingClass(BinaryName),

    /// Class is in the class graph, but it failed verification
    RejectedClass(BinaryName),
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::MissingClass(name) => {
                write!(f, "class '{}' could not be found", name)
            }
            ResolutionError::RejectedClass(name) => {
                write!(f, "class '{}' was rejected by the verifier", name)
            }
        }
    }
}
