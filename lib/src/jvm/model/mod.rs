//! Semantic representations of class members
//!
//! Methods are represented using [`Method`], which has an `id` field to query the class graph
//! representation (owning class, name, descriptor, access flags) along with the method body.

mod method;

pub use method::*;
