//! Compiler internals for a block-based visual programming language.
//!
//! The front end lowers the visual block graph into the IR in
//! [`compiler::intermediate`]; [`compiler::iroptimizer`] narrows the
//! possible runtime type of every variable and expression so the code
//! generator can skip coercions that are provably redundant. The analysis
//! stays sound under the runtime's cooperative scheduler by discarding all
//! inferred knowledge at every point a script may be suspended.

// Library code must not write to stderr; user-facing binaries own the
// terminal.
#![deny(clippy::print_stderr)]

pub mod compiler;

pub use compiler::{
    optimize_program, InputOpcode, InputType, IntermediateInput, IntermediateRepresentation,
    IntermediateScript, IntermediateStack, IntermediateStackBlock, IrOptimizer, OptimizeError,
    OptimizerConfig, StackOpcode, TypeState, Variable, YieldPolicy,
};
