//! Script compiler internals.
//!
//! # Module Organization
//!
//! - `enums`: opcode vocabularies and the input-type lattice
//! - `intermediate`: the IR consumed and annotated by the optimizer
//! - `iroptimizer`: the type-inference optimizer
//! - `compat`: legacy-format shim applied before IR construction

pub mod compat;
pub mod enums;
pub mod intermediate;
pub mod iroptimizer;

pub use compat::OldCompilerCompatibility;
pub use enums::{InputOpcode, InputType, StackOpcode};
pub use intermediate::{
    BinaryNumericOp, ConstantValue, InputKind, IntermediateInput, IntermediateRepresentation,
    IntermediateScript, IntermediateStack, IntermediateStackBlock, StackBlockKind, Variable,
};
pub use iroptimizer::{
    optimize_program, IrOptimizer, OptimizeError, OptimizerConfig, TypeState, YieldPolicy,
};
