use super::{LocalVariables, OperandStack, UninitializedType, VerificationType, VerifierError};
use crate::jvm::class_graph::ClassGraph;
use crate::jvm::BinaryName;
use std::fmt;

/// Snapshot of the types of the local variables and stack at a point in the bytecode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Local variables
    pub locals: LocalVariables,

    /// Types of values on the stack
    pub stack: OperandStack,

    /// Set inside a constructor until the receiver has been initialized by a call to another
    /// constructor (of the superclass or of the same class)
    pub uninitialized_this: Option<UninitializedType>,
}

impl Frame {
    /// Frame with all locals unknown and an empty stack
    pub fn new(max_locals: usize, max_stack: usize) -> Frame {
        Frame {
            locals: LocalVariables::new(max_locals),
            stack: OperandStack::new(max_stack),
            uninitialized_this: None,
        }
    }

    /// Merge in the frame from another control flow path
    ///
    /// The receiver of a constructor only counts as initialized if it is initialized on both
    /// paths.
    pub fn merge(&mut self, class_graph: &ClassGraph, other: &Frame) -> Result<(), VerifierError> {
        self.stack.merge(class_graph, &other.stack)?;
        self.locals.merge(class_graph, &other.locals)?;
        if self.uninitialized_this.is_none() {
            self.uninitialized_this = other.uninitialized_this.clone();
        }
        Ok(())
    }

    /// Mark an uninitialized object as initialized everywhere it appears
    pub fn initialize_object(&mut self, uninit: &UninitializedType) {
        self.stack.initialize_object(uninit);
        self.locals.initialize_object(uninit);
        if self.uninitialized_this.as_ref() == Some(uninit) {
            self.uninitialized_this = None;
        }
    }

    /// Frame at the start of an exception handler catching `caught` thrown from this frame
    ///
    /// The locals are unchanged, but the stack is replaced with just the exception.
    pub fn for_handler(&self, caught: BinaryName) -> Result<Frame, VerifierError> {
        let mut stack = OperandStack::new(self.stack.max_stack());
        stack.push(VerificationType::object(caught))?;
        Ok(Frame {
            locals: self.locals.clone(),
            stack,
            uninitialized_this: self.uninitialized_this.clone(),
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Local variables:")?;
        write!(f, "{}", self.locals)?;
        writeln!(f, "Operand stack:")?;
        write!(f, "{}", self.stack)?;
        if let Some(uninit) = &self.uninitialized_this {
            writeln!(f, "Receiver not yet initialized: {}", uninit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::ClassGraphArenas;
    use crate::jvm::verifier::NewSite;

    fn this_type() -> UninitializedType {
        UninitializedType {
            class: BinaryName::EXCEPTION,
            site: NewSite::This,
        }
    }

    #[test]
    fn merge_is_idempotent() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let mut frame = Frame::new(3, 2);
        frame
            .locals
            .set(0, VerificationType::Uninitialized(this_type()))
            .unwrap();
        frame.locals.set(1, VerificationType::Long).unwrap();
        frame.stack.push(VerificationType::Null).unwrap();
        frame.uninitialized_this = Some(this_type());

        let mut merged = frame.clone();
        merged.merge(&class_graph, &frame).unwrap();
        assert_eq!(merged, frame);
    }

    #[test]
    fn uninitialized_this_is_sticky() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let initialized = Frame::new(1, 1);
        let mut uninitialized = Frame::new(1, 1);
        uninitialized.uninitialized_this = Some(this_type());

        let mut merged = initialized.clone();
        merged.merge(&class_graph, &uninitialized).unwrap();
        assert_eq!(merged.uninitialized_this, Some(this_type()));

        let mut merged = uninitialized.clone();
        merged.merge(&class_graph, &initialized).unwrap();
        assert_eq!(merged.uninitialized_this, Some(this_type()));
    }

    #[test]
    fn initializing_the_receiver() {
        let mut frame = Frame::new(2, 2);
        frame
            .locals
            .set(0, VerificationType::Uninitialized(this_type()))
            .unwrap();
        frame
            .stack
            .push(VerificationType::Uninitialized(this_type()))
            .unwrap();
        frame.uninitialized_this = Some(this_type());

        frame.initialize_object(&this_type());
        assert_eq!(frame.uninitialized_this, None);
        assert_eq!(
            frame.locals.get(0),
            Ok(&VerificationType::object(BinaryName::EXCEPTION))
        );
        assert_eq!(
            frame.stack.peek(0),
            Ok(&VerificationType::object(BinaryName::EXCEPTION))
        );
    }

    #[test]
    fn handler_frames() {
        let mut frame = Frame::new(1, 2);
        frame.locals.set(0, VerificationType::Float).unwrap();
        frame.stack.push(VerificationType::Long).unwrap();

        let handler = frame.for_handler(BinaryName::RUNTIMEEXCEPTION).unwrap();
        assert_eq!(handler.locals, frame.locals);
        assert_eq!(handler.stack.size(), 1);
        assert_eq!(
            handler.stack.peek(0),
            Ok(&VerificationType::object(BinaryName::RUNTIMEEXCEPTION))
        );
    }
}
