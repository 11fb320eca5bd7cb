use crate::jvm::class_graph::MethodId;
use crate::jvm::code::Code;
use crate::jvm::descriptors::RenderDescriptor;
use std::fmt;

/// Semantic representation of a method
pub struct Method<'g> {
    /// The current method
    pub id: MethodId<'g>,

    /// Method code implementation
    ///
    /// Abstract and native methods have no code.
    pub code_impl: Option<Code>,
}

impl<'g> Method<'g> {
    /// Create a new method
    pub fn new(id: MethodId<'g>) -> Method<'g> {
        Method {
            id,
            code_impl: None,
        }
    }

    /// Human readable name of the method, eg. `me/alec/Point.<init>(II)V`
    pub fn qualified_name(&self) -> String {
        format!(
            "{}.{}{}",
            self.id.class.name,
            self.id.name,
            self.id.descriptor.render()
        )
    }
}

impl<'g> fmt::Debug for Method<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("id", &self.id)
            .field("code_impl", &self.code_impl)
            .finish()
    }
}
