use super::types::merge_types;
use super::{AssertionViolated, UninitializedType, VerificationType, VerifierError};
use crate::jvm::class_graph::ClassGraph;
use std::fmt;

/// Types of the local variables
///
/// Unlike the operand stack, the local variables have a fixed size (`max_locals`) for the whole
/// method. Every local starts off as `Unknown`. A `long` or `double` occupies the local it is
/// stored in and the one after that, which is set to `Unknown` so it can't be read separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariables {
    locals: Vec<VerificationType>,
}

impl LocalVariables {
    /// All locals `Unknown`
    pub fn new(max_locals: usize) -> LocalVariables {
        LocalVariables {
            locals: vec![VerificationType::Unknown; max_locals],
        }
    }

    pub fn max_locals(&self) -> usize {
        self.locals.len()
    }

    pub fn get(&self, index: usize) -> Result<&VerificationType, AssertionViolated> {
        self.locals.get(index).ok_or_else(|| {
            AssertionViolated::new(format!(
                "Local variable {} is outside of the {} local variables",
                index,
                self.locals.len()
            ))
        })
    }

    /// Overwrite the type of a local
    ///
    /// This doesn't touch the local after a two-slot type: the caller decides what happens to it.
    pub fn set(&mut self, index: usize, typ: VerificationType) -> Result<(), AssertionViolated> {
        let max_locals = self.locals.len();
        let local = self.locals.get_mut(index).ok_or_else(|| {
            AssertionViolated::new(format!(
                "Local variable {} is outside of the {} local variables",
                index, max_locals
            ))
        })?;
        *local = typ;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &VerificationType> {
        self.locals.iter()
    }

    /// Merge in the locals from another control flow path
    ///
    /// Locals that have nothing in common become `Unknown`. Merging an uninitialized object into
    /// a slot that holds anything else is rejected.
    pub fn merge(
        &mut self,
        class_graph: &ClassGraph,
        other: &LocalVariables,
    ) -> Result<(), VerifierError> {
        if self.locals.len() != other.locals.len() {
            return Err(AssertionViolated::new(format!(
                "Merging local variable arrays of different sizes ({} and {})",
                self.locals.len(),
                other.locals.len()
            ))
            .into());
        }

        for (existing, incoming) in self.locals.iter_mut().zip(&other.locals) {
            let merged = merge_types(class_graph, existing, incoming, "in the local variables")?;
            *existing = merged.unwrap_or(VerificationType::Unknown);
        }

        Ok(())
    }

    /// Replace every occurrence of an uninitialized object with its initialized type
    pub fn initialize_object(&mut self, uninit: &UninitializedType) {
        for local in &mut self.locals {
            if matches!(local, VerificationType::Uninitialized(u) if u == uninit) {
                *local = uninit.initialized();
            }
        }
    }
}

impl fmt::Display for LocalVariables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, local) in self.locals.iter().enumerate() {
            writeln!(f, "  {}: {}", index, local)?;
        }
        Ok(())
    }
}
