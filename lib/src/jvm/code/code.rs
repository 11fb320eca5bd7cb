use crate::jvm::code::{InsnIndex, Instruction};
use crate::jvm::BinaryName;
use std::fmt;

/// Semantic representation of a method body
#[derive(Clone, Debug, PartialEq)]
pub struct Code {
    /// Maximum size of stack through the method (in slots)
    pub max_stack: u16,

    /// Maximum size of locals through the method (in slots)
    pub max_locals: u16,

    /// Instructions, in the order they appear in the code array
    pub instructions: Vec<Instruction>,

    /// Exception handlers, in order of priority
    pub exception_table: Vec<ExceptionHandler>,
}

/// Entry in the exception table of a method
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First instruction protected by the handler
    pub start: InsnIndex,

    /// First instruction after `start` _not_ protected by the handler
    pub end: InsnIndex,

    /// Start of the handler code
    pub handler: InsnIndex,

    /// Type of exceptions caught (`None` means everything is caught)
    pub catch_type: Option<BinaryName>,
}

impl ExceptionHandler {
    /// Is the instruction protected by this handler?
    pub fn covers(&self, index: InsnIndex) -> bool {
        self.start <= index && index < self.end
    }

    /// Type of the exception the handler receives on the stack
    pub fn caught_class(&self) -> BinaryName {
        self.catch_type.clone().unwrap_or(BinaryName::THROWABLE)
    }
}

impl Code {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn get(&self, index: InsnIndex) -> Option<&Instruction> {
        self.instructions.get(index.0)
    }

    /// Iterate through the instructions along with their indices
    pub fn iter(&self) -> impl Iterator<Item = (InsnIndex, &Instruction)> {
        self.instructions
            .iter()
            .enumerate()
            .map(|(idx, insn)| (InsnIndex(idx), insn))
    }

    /// Exception handlers protecting an instruction
    pub fn handlers_covering(&self, index: InsnIndex) -> impl Iterator<Item = &ExceptionHandler> {
        self.exception_table
            .iter()
            .filter(move |handler| handler.covers(index))
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "max_stack = {}, max_locals = {}",
            self.max_stack, self.max_locals
        )?;
        for (idx, insn) in self.iter() {
            writeln!(f, "{:>5}: {}", idx.0, insn)?;
        }
        for handler in &self.exception_table {
            let catch_type = match &handler.catch_type {
                None => "all",
                Some(name) => name.as_ref(),
            };
            writeln!(
                f,
                "catch {} from {} to {} using {}",
                catch_type, handler.start, handler.end, handler.handler
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn handler_ranges_are_exclusive() {
        let handler = ExceptionHandler {
            start: InsnIndex(2),
            end: InsnIndex(4),
            handler: InsnIndex(6),
            catch_type: None,
        };
        assert!(!handler.covers(InsnIndex(1)));
        assert!(handler.covers(InsnIndex(2)));
        assert!(handler.covers(InsnIndex(3)));
        assert!(!handler.covers(InsnIndex(4)));
        assert_eq!(handler.caught_class(), BinaryName::THROWABLE);
    }

    #[test]
    fn listing() {
        let code = Code {
            max_stack: 1,
            max_locals: 0,
            instructions: vec![Instruction::IConst1, Instruction::IReturn],
            exception_table: vec![],
        };
        assert_eq!(
            code.to_string(),
            "max_stack = 1, max_locals = 0\n    0: iconst_1\n    1: ireturn\n"
        );
    }
}
