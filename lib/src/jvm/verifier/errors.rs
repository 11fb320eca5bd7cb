use super::Frame;
use crate::jvm::code::{InsnIndex, Instruction};
use crate::jvm::{BinaryName, ResolutionError};
use std::fmt;

/// Everything that can stop verification of a method
#[derive(Debug, Clone, PartialEq)]
pub enum VerifierError {
    /// Code breaks one of the structural constraints, so the method is rejected
    Violation(ConstraintViolation),

    /// Code refers to a class which is missing or rejected
    Resolution(ResolutionError),

    /// Code refers to a class which has not been verified yet
    NotYet(BinaryName),

    /// Internal inconsistency in the verifier itself
    Assertion(AssertionViolated),
}

impl VerifierError {
    /// Verification failure without any location information (yet)
    pub fn violation(message: impl Into<String>) -> VerifierError {
        VerifierError::Violation(ConstraintViolation::new(message))
    }

    /// Attach the instruction being checked to a verification failure
    ///
    /// The innermost location wins: if the failure already knows where it happened, it is left
    /// untouched.
    pub fn at(mut self, index: InsnIndex, instruction: &Instruction) -> VerifierError {
        if let VerifierError::Violation(violation) = &mut self {
            if violation.instruction.is_none() {
                violation.instruction = Some((index, instruction.clone()));
            }
        }
        self
    }

    /// Attach the frame the failing instruction was executed in
    pub fn in_frame(mut self, frame: &Frame) -> VerifierError {
        if let VerifierError::Violation(violation) = &mut self {
            if violation.frame.is_none() {
                violation.frame = Some(frame.clone());
            }
        }
        self
    }

    /// Attach the chain of pending `jsr` instructions leading to the failure
    pub fn in_subroutines(mut self, chain: &[InsnIndex]) -> VerifierError {
        if let VerifierError::Violation(violation) = &mut self {
            if violation.subroutine_chain.is_empty() {
                violation.subroutine_chain = chain.to_vec();
            }
        }
        self
    }
}

impl From<ResolutionError> for VerifierError {
    fn from(err: ResolutionError) -> VerifierError {
        VerifierError::Resolution(err)
    }
}

impl From<AssertionViolated> for VerifierError {
    fn from(err: AssertionViolated) -> VerifierError {
        VerifierError::Assertion(err)
    }
}

impl From<ConstraintViolation> for VerifierError {
    fn from(err: ConstraintViolation) -> VerifierError {
        VerifierError::Violation(err)
    }
}

impl fmt::Display for VerifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierError::Violation(violation) => violation.fmt(f),
            VerifierError::Resolution(err) => err.fmt(f),
            VerifierError::NotYet(class) => {
                write!(f, "class '{}' has not been verified yet", class)
            }
            VerifierError::Assertion(err) => err.fmt(f),
        }
    }
}

/// Structural constraint broken by the code being verified
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintViolation {
    /// Human readable description of what went wrong
    pub message: String,

    /// Instruction at which the problem was detected
    pub instruction: Option<(InsnIndex, Instruction)>,

    /// Frame the instruction was executed in
    pub frame: Option<Frame>,

    /// Pending `jsr` instructions (outermost first) at the point of failure
    pub subroutine_chain: Vec<InsnIndex>,
}

impl ConstraintViolation {
    pub fn new(message: impl Into<String>) -> ConstraintViolation {
        ConstraintViolation {
            message: message.into(),
            instruction: None,
            frame: None,
            subroutine_chain: vec![],
        }
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some((index, instruction)) = &self.instruction {
            write!(f, "\nInstruction: {}: {}", index, instruction)?;
        }
        if !self.subroutine_chain.is_empty() {
            f.write_str("\nPending subroutine calls:")?;
            for jsr in &self.subroutine_chain {
                write!(f, " {}", jsr)?;
            }
        }
        if let Some(frame) = &self.frame {
            write!(f, "\nExecution frame:\n{}", frame)?;
        }
        Ok(())
    }
}

/// Internal invariant of the verifier was broken
///
/// This never depends on the code being verified: if one of these shows up, there is a bug in the
/// verifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionViolated(pub String);

impl AssertionViolated {
    pub fn new(message: impl Into<String>) -> AssertionViolated {
        AssertionViolated(message.into())
    }
}

impl fmt::Display for AssertionViolated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "verifier assertion violated: {}", self.0)
    }
}

impl std::error::Error for AssertionViolated {}

/// Outcome of verifying one method
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: VerificationStatus,

    /// Things that look suspicious but are not grounds for rejection
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerificationStatus {
    /// The method is well-typed
    Ok,

    /// The method must not be run
    Rejected(Rejection),

    /// The method depends on a class whose verification is still pending
    NotYet(BinaryName),
}

/// Why a method was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Verification(ConstraintViolation),
    Resolution(ResolutionError),
}

impl Verdict {
    pub fn is_ok(&self) -> bool {
        self.status == VerificationStatus::Ok
    }

    /// Message of the verification failure, if there is one
    pub fn violation_message(&self) -> Option<&str> {
        match &self.status {
            VerificationStatus::Rejected(Rejection::Verification(violation)) => {
                Some(&violation.message)
            }
            _ => None,
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationStatus::Ok => f.write_str("passed"),
            VerificationStatus::Rejected(Rejection::Verification(violation)) => {
                write!(f, "rejected: {}", violation)
            }
            VerificationStatus::Rejected(Rejection::Resolution(err)) => {
                write!(f, "rejected: {}", err)
            }
            VerificationStatus::NotYet(class) => {
                write!(f, "not yet verifiable: depends on '{}'", class)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn innermost_location_wins() {
        let err = VerifierError::violation("Stack underflow")
            .at(InsnIndex(3), &Instruction::Pop)
            .at(InsnIndex(7), &Instruction::Nop)
            .in_subroutines(&[InsnIndex(1)]);

        match err {
            VerifierError::Violation(violation) => {
                assert_eq!(violation.instruction, Some((InsnIndex(3), Instruction::Pop)));
                assert_eq!(violation.subroutine_chain, vec![InsnIndex(1)]);
                assert_eq!(
                    violation.to_string(),
                    "Stack underflow\nInstruction: #3: pop\nPending subroutine calls: #1"
                );
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn locations_only_apply_to_violations() {
        let err = VerifierError::from(AssertionViolated::new("broken"))
            .at(InsnIndex(0), &Instruction::Nop);
        assert_eq!(err, VerifierError::Assertion(AssertionViolated::new("broken")));
    }
}
