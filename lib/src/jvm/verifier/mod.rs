//! Structural verification of method bodies
//!
//! Verification is done by simulating the code on the _types_ of the values in the local
//! variables and on the operand stack, rather than on the values themselves. The types known at a
//! point in the code are a [`Frame`]. Before an instruction is run on a frame, the
//! [`constraints`] check that it can be (eg. `dadd` only makes sense if the top two elements on the
//! stack are of type `double`), then [`execution`] computes the frame after it.
//!
//! When an instruction can be reached from several places (jump targets, loop heads, exception
//! handlers), the frames coming in are merged: types are generalized until they cover every
//! incoming path. This is a fixed-point iteration which converges since types can only get more
//! general a bounded number of times. When two frames can't be merged (eg. an `int` on one path
//! and a `float` on the other, at the same depth on the stack), the method is rejected.
//!
//! Subroutines (`jsr`/`ret`) make this more complicated: the same instruction in a subroutine is
//! analysed separately for each `jsr` calling it, so that locals which the subroutine doesn't
//! touch keep their precise types once the subroutine returns. See [`Subroutines`] for the rules
//! subroutines must follow.
//!
//! The entry point is [`verify_method`].

mod cfg;
pub mod constraints;
mod errors;
pub mod execution;
mod frame;
mod locals;
mod pass;
mod settings;
mod stack;
mod subroutines;
mod types;

pub use cfg::*;
pub use errors::*;
pub use frame::*;
pub use locals::*;
pub use pass::*;
pub use settings::*;
pub use stack::*;
pub use subroutines::*;
pub use types::*;
