//! Verify JVM method bodies
//!
//! ### Simple example
//!
//! Consider the following simple Java class:
//!
//! ```java,ignore,no_run
//! public class Counter {
//!     private int count;
//!
//!     public int next() {
//!         count += 1;
//!         return count;
//!     }
//! }
//! ```
//!
//! Checking that the bytecode of `next` is well-typed can be done as follows:
//!
//! ```
//! use jverify::jvm::assembly::parse_assembly;
//! use jverify::jvm::class_graph::{ClassGraph, ClassGraphArenas};
//! use jverify::jvm::verifier::{verify_method, Settings, VerificationStatus};
//!
//! # fn verify_counter() -> Result<(), Box<dyn std::error::Error>> {
//! // Setup the class graph, add in Java standard library types
//! let class_graph_arenas = ClassGraphArenas::new();
//! let class_graph = ClassGraph::new(&class_graph_arenas);
//! class_graph.insert_java_library_types();
//!
//! // Declare the class, its members, and the method bodies
//! let methods = parse_assembly(
//!     r#"
//!     .class public me/alec/Counter
//!     .super java/lang/Object
//!     .field private count I
//!
//!     .method public next ()I
//!         .limit stack 3
//!         aload 0
//!         dup
//!         getfield me/alec/Counter.count I
//!         iconst_1
//!         iadd
//!         putfield me/alec/Counter.count I
//!         aload 0
//!         getfield me/alec/Counter.count I
//!         ireturn
//!     .end method
//!     "#,
//!     &class_graph,
//! )?;
//!
//! // Run the data-flow analysis over the method body
//! let verdict = verify_method(&class_graph, &methods[0], &Settings::new())?;
//! assert_eq!(verdict.status, VerificationStatus::Ok);
//! # Ok(())
//! # }
//! # verify_counter().unwrap();
//! ```

mod access_flags;
pub mod assembly;
pub mod class_graph;
pub mod code;
mod descriptors;
mod errors;
pub mod model;
mod names;
pub mod verifier;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
