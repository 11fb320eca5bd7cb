//! Bytecode representation
//!
//! ### Structure
//!
//! The verifier sees a method body as a flat list of [`Instruction`]s, addressed by their
//! position ([`InsnIndex`]) rather than by byte offset, along with the exception table and the
//! declared stack and local variable limits. All of this is bundled up in [`Code`].
//!
//! Unlike in a class file, there is no constant pool: instructions carry the constants, field
//! references, and method references they use directly. Resolving those references against the
//! [class graph](crate::jvm::class_graph) is left to the verifier.

mod code;
mod instructions;

pub use code::*;
pub use instructions::*;
