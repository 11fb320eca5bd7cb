use super::types::merge_types;
use super::{AssertionViolated, UninitializedType, VerificationType, VerifierError};
use crate::jvm::class_graph::ClassGraph;
use crate::util::{OffsetVec, Width};
use std::fmt;

/// Types of the values on the operand stack
///
/// The capacity (`max_stack`) is measured in slots, where `long` and `double` take up two slots.
/// Values are still pushed and popped as single elements, so the stack tracks both the number of
/// elements and the number of slots they take up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandStack {
    stack: OffsetVec<VerificationType>,
    max_stack: usize,
}

impl OperandStack {
    /// Empty stack
    pub fn new(max_stack: usize) -> OperandStack {
        OperandStack {
            stack: OffsetVec::new(),
            max_stack,
        }
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Number of slots used up by the values on the stack
    pub fn slots_used(&self) -> usize {
        self.stack.offset_len().0
    }

    /// Number of values on the stack
    pub fn size(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn push(&mut self, typ: VerificationType) -> Result<(), AssertionViolated> {
        if typ == VerificationType::Unknown {
            return Err(AssertionViolated::new(
                "Pushing an unknown type onto the operand stack",
            ));
        }
        if self.slots_used() + typ.width() > self.max_stack {
            return Err(AssertionViolated::new(format!(
                "Operand stack overflow pushing {} ({} of {} slots used)",
                typ,
                self.slots_used(),
                self.max_stack
            )));
        }
        self.stack.push(typ);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<VerificationType, AssertionViolated> {
        self.stack
            .pop()
            .map(|(_, typ)| typ)
            .ok_or_else(|| AssertionViolated::new("Popping from an empty operand stack"))
    }

    /// Pop values off the stack, returning them in the order they were popped
    pub fn pop_n(&mut self, count: usize) -> Result<Vec<VerificationType>, AssertionViolated> {
        (0..count).map(|_| self.pop()).collect()
    }

    /// Look at a value on the stack (`0` is the top)
    pub fn peek(&self, depth: usize) -> Result<&VerificationType, AssertionViolated> {
        self.stack.get_from_back(depth).ok_or_else(|| {
            AssertionViolated::new(format!(
                "Peeking at depth {} of an operand stack with {} values",
                depth,
                self.stack.len()
            ))
        })
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// Values from the bottom of the stack to the top
    pub fn iter(&self) -> impl Iterator<Item = &VerificationType> + DoubleEndedIterator {
        self.stack.iter().map(|(_, typ)| typ)
    }

    /// Merge in the stack from another control flow path
    ///
    /// Stacks must agree on their shape (size and slots) and on the kind of every value. Reference
    /// types get generalized to their first common superclass.
    pub fn merge(
        &mut self,
        class_graph: &ClassGraph,
        other: &OperandStack,
    ) -> Result<(), VerifierError> {
        if self.slots_used() != other.slots_used() || self.size() != other.size() {
            return Err(VerifierError::violation(format!(
                "Cannot merge stacks of different size:\nOperandStack A:\n{}OperandStack B:\n{}",
                self, other
            )));
        }

        let mut merged = OffsetVec::new();
        for ((_, existing), (_, incoming)) in self.stack.iter().zip(other.stack.iter()) {
            match merge_types(class_graph, existing, incoming, "on the stack")? {
                Some(typ) if typ.width() == existing.width() => {
                    merged.push(typ);
                }
                _ => {
                    return Err(VerifierError::violation(format!(
                        "Cannot merge stacks of different types:\nStack A:\n{}Stack B:\n{}",
                        self, other
                    )))
                }
            }
        }
        self.stack = merged;

        Ok(())
    }

    /// Replace every occurrence of an uninitialized object with its initialized type
    pub fn initialize_object(&mut self, uninit: &UninitializedType) {
        self.stack.replace_where(|typ| match typ {
            VerificationType::Uninitialized(u) if u == uninit => Some(uninit.initialized()),
            _ => None,
        });
    }
}

impl fmt::Display for OperandStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  (slots used: {}, max stack: {})",
            self.slots_used(),
            self.max_stack
        )?;
        for typ in self.iter().rev() {
            writeln!(f, "  {}", typ)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::ClassGraphArenas;
    use crate::jvm::code::InsnIndex;
    use crate::jvm::verifier::NewSite;
    use crate::jvm::BinaryName;

    fn stack(max_stack: usize, types: Vec<VerificationType>) -> OperandStack {
        let mut stack = OperandStack::new(max_stack);
        for typ in types {
            stack.push(typ).unwrap();
        }
        stack
    }

    #[test]
    fn slot_accounting() {
        let mut stack = OperandStack::new(3);
        stack.push(VerificationType::Integer).unwrap();
        stack.push(VerificationType::Long).unwrap();
        assert_eq!(stack.size(), 2);
        assert_eq!(stack.slots_used(), 3);

        // Full
        assert!(stack.push(VerificationType::Integer).is_err());

        assert_eq!(stack.pop(), Ok(VerificationType::Long));
        assert_eq!(stack.slots_used(), 1);
        assert!(stack.push(VerificationType::Double).is_ok());
        assert_eq!(stack.slots_used(), 3);
    }

    #[test]
    fn push_pop_peek() {
        let mut stack = OperandStack::new(4);
        assert!(stack.pop().is_err());
        assert!(stack.push(VerificationType::Unknown).is_err());

        stack.push(VerificationType::Float).unwrap();
        stack.push(VerificationType::Null).unwrap();
        assert_eq!(stack.peek(0), Ok(&VerificationType::Null));
        assert_eq!(stack.peek(1), Ok(&VerificationType::Float));
        assert!(stack.peek(2).is_err());
        assert_eq!(stack.size(), 2);

        assert_eq!(
            stack.pop_n(2),
            Ok(vec![VerificationType::Null, VerificationType::Float])
        );
        assert!(stack.is_empty());
    }

    #[test]
    fn merge_stacks() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let mut merged = stack(
            4,
            vec![
                VerificationType::Integer,
                VerificationType::object(BinaryName::INTEGER),
                VerificationType::Null,
            ],
        );
        let incoming = stack(
            4,
            vec![
                VerificationType::Integer,
                VerificationType::object(BinaryName::NUMBER),
                VerificationType::object(BinaryName::STRING),
            ],
        );
        merged.merge(&class_graph, &incoming).unwrap();
        assert_eq!(merged, incoming);

        // Idempotent
        let before = merged.clone();
        merged.merge(&class_graph, &before).unwrap();
        assert_eq!(merged, before);
    }

    #[test]
    fn merge_failures() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas);
        class_graph.insert_java_library_types();

        let message = |result: Result<(), VerifierError>| match result {
            Err(VerifierError::Violation(violation)) => violation.message,
            other => panic!("expected a violation, got {:?}", other),
        };

        let mut merged = stack(4, vec![VerificationType::Integer]);
        let incoming = stack(4, vec![VerificationType::Integer, VerificationType::Integer]);
        assert!(message(merged.merge(&class_graph, &incoming))
            .starts_with("Cannot merge stacks of different size"));

        let mut merged = stack(4, vec![VerificationType::Integer]);
        let incoming = stack(4, vec![VerificationType::Float]);
        assert!(message(merged.merge(&class_graph, &incoming))
            .starts_with("Cannot merge stacks of different types"));

        let uninit = UninitializedType {
            class: BinaryName::OBJECT,
            site: NewSite::New(InsnIndex(0)),
        };
        let mut merged = stack(4, vec![VerificationType::object(BinaryName::OBJECT)]);
        let incoming = stack(4, vec![VerificationType::Uninitialized(uninit)]);
        assert!(message(merged.merge(&class_graph, &incoming))
            .starts_with("Backwards branch with an uninitialized object on the stack"));
    }

    #[test]
    fn initialize_object() {
        let uninit = UninitializedType {
            class: BinaryName::STRING,
            site: NewSite::New(InsnIndex(0)),
        };
        let mut stack = stack(
            4,
            vec![
                VerificationType::Uninitialized(uninit.clone()),
                VerificationType::Long,
                VerificationType::Uninitialized(uninit.clone()),
            ],
        );
        stack.initialize_object(&uninit);
        assert_eq!(
            stack.iter().cloned().collect::<Vec<_>>(),
            vec![
                VerificationType::object(BinaryName::STRING),
                VerificationType::Long,
                VerificationType::object(BinaryName::STRING),
            ]
        );
    }
}
