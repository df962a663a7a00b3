//! Intermediate representation of compiled scripts.
//!
//! The front end lowers the visual block graph into this IR; the optimizer
//! annotates it in place; the code generator consumes it. A program is one
//! designated entry script plus a map of named procedure scripts. A script
//! is an ordered stack of statement nodes; statements own nested stacks
//! (branch arms, loop bodies) and expression trees supplying their operands.
//!
//! The optimizer's only permitted mutation is writing the `inferred`
//! annotation of expression nodes. It never adds, removes, or reorders
//! nodes.

use crate::compiler::enums::{InputOpcode, InputType, StackOpcode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Variable descriptor as produced by the front end.
///
/// `id` is the stable identity the optimizer keys its type state on; `name`
/// is the user-visible label and carries no semantic weight. Shared (global)
/// and script-local variables live in the same identity space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    pub name: String,
}

impl Variable {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Literal value carried by a `CONSTANT` input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstantValue {
    Number(f64),
    Text(String),
    Boolean(bool),
}

/// Numeric operator of a binary arithmetic input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryNumericOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Expression node kind. One variant per `InputOpcode`, with the four
/// arithmetic opcodes collapsed into [`InputKind::Binary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputKind {
    Constant {
        value: ConstantValue,
    },
    VarGet {
        variable: Variable,
    },
    /// Call into a loaded extension. The target is opaque to the compiler.
    AddonCall {
        opcode: String,
        args: Vec<IntermediateInput>,
    },
    /// Coerce to a well-formed number; NaN coerces to 0.
    CastNumber {
        target: Box<IntermediateInput>,
    },
    /// Coerce to a number, letting NaN through.
    CastNumberOrNan {
        target: Box<IntermediateInput>,
    },
    Binary {
        op: BinaryNumericOp,
        left: Box<IntermediateInput>,
        right: Box<IntermediateInput>,
    },
    /// Reporter-style call of a named procedure.
    ProcedureCall {
        procedure: String,
        args: Vec<IntermediateInput>,
    },
}

/// Expression node: a kind plus the lattice annotation the optimizer
/// maintains. Freshly built nodes are annotated `ANY`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateInput {
    pub kind: InputKind,
    pub inferred: InputType,
}

impl IntermediateInput {
    pub fn new(kind: InputKind) -> Self {
        Self {
            kind,
            inferred: InputType::ANY,
        }
    }

    pub fn constant_number(n: f64) -> Self {
        Self::new(InputKind::Constant {
            value: ConstantValue::Number(n),
        })
    }

    pub fn constant_text(s: impl Into<String>) -> Self {
        Self::new(InputKind::Constant {
            value: ConstantValue::Text(s.into()),
        })
    }

    pub fn var_get(variable: Variable) -> Self {
        Self::new(InputKind::VarGet { variable })
    }

    pub fn cast_number(target: IntermediateInput) -> Self {
        Self::new(InputKind::CastNumber {
            target: Box::new(target),
        })
    }

    pub fn cast_number_or_nan(target: IntermediateInput) -> Self {
        Self::new(InputKind::CastNumberOrNan {
            target: Box::new(target),
        })
    }

    pub fn binary(op: BinaryNumericOp, left: IntermediateInput, right: IntermediateInput) -> Self {
        Self::new(InputKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn addon_call(opcode: impl Into<String>, args: Vec<IntermediateInput>) -> Self {
        Self::new(InputKind::AddonCall {
            opcode: opcode.into(),
            args,
        })
    }

    /// Stable opcode tag of this node.
    pub fn opcode(&self) -> InputOpcode {
        match &self.kind {
            InputKind::Constant { .. } => InputOpcode::Constant,
            InputKind::VarGet { .. } => InputOpcode::VarGet,
            InputKind::AddonCall { .. } => InputOpcode::AddonCall,
            InputKind::CastNumber { .. } => InputOpcode::CastNumber,
            InputKind::CastNumberOrNan { .. } => InputOpcode::CastNumberOrNan,
            InputKind::Binary { op, .. } => match op {
                BinaryNumericOp::Add => InputOpcode::OpAdd,
                BinaryNumericOp::Subtract => InputOpcode::OpSubtract,
                BinaryNumericOp::Multiply => InputOpcode::OpMultiply,
                BinaryNumericOp::Divide => InputOpcode::OpDivide,
            },
            InputKind::ProcedureCall { .. } => InputOpcode::ProcedureCall,
        }
    }
}

/// Statement node kind. One variant per `StackOpcode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StackBlockKind {
    VarSet {
        variable: Variable,
        value: IntermediateInput,
    },
    ControlIfElse {
        condition: IntermediateInput,
        then_branch: IntermediateStack,
        else_branch: IntermediateStack,
    },
    /// Pre-test conditional loop.
    ControlWhile {
        condition: IntermediateInput,
        body: IntermediateStack,
    },
    /// Counted loop assigning 1..=count to its counter variable.
    ControlFor {
        variable: Variable,
        count: IntermediateInput,
        body: IntermediateStack,
    },
    /// Counted loop without a counter variable.
    ControlRepeat {
        times: IntermediateInput,
        body: IntermediateStack,
    },
    /// Unconditional stop of the running script.
    ControlStopScript,
    /// Suspend until the condition holds; other scripts run in between.
    ControlWaitUntil {
        condition: IntermediateInput,
    },
    ProcedureCall {
        procedure: String,
        args: Vec<IntermediateInput>,
    },
    /// Block executed by the interpretive fallback. The payload is the raw
    /// block data; the compiler never looks inside it.
    CompatibilityLayer {
        block: serde_json::Value,
    },
}

/// Statement node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateStackBlock {
    pub kind: StackBlockKind,
}

impl IntermediateStackBlock {
    pub fn new(kind: StackBlockKind) -> Self {
        Self { kind }
    }

    pub fn var_set(variable: Variable, value: IntermediateInput) -> Self {
        Self::new(StackBlockKind::VarSet { variable, value })
    }

    /// Stable opcode tag of this node.
    pub fn opcode(&self) -> StackOpcode {
        match &self.kind {
            StackBlockKind::VarSet { .. } => StackOpcode::VarSet,
            StackBlockKind::ControlIfElse { .. } => StackOpcode::ControlIfElse,
            StackBlockKind::ControlWhile { .. } => StackOpcode::ControlWhile,
            StackBlockKind::ControlFor { .. } => StackOpcode::ControlFor,
            StackBlockKind::ControlRepeat { .. } => StackOpcode::ControlRepeat,
            StackBlockKind::ControlStopScript => StackOpcode::ControlStopScript,
            StackBlockKind::ControlWaitUntil { .. } => StackOpcode::ControlWaitUntil,
            StackBlockKind::ProcedureCall { .. } => StackOpcode::ProcedureCall,
            StackBlockKind::CompatibilityLayer { .. } => StackOpcode::CompatibilityLayer,
        }
    }
}

/// Ordered sequence of statement nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntermediateStack {
    pub blocks: Vec<IntermediateStackBlock>,
}

impl IntermediateStack {
    pub fn new(blocks: Vec<IntermediateStackBlock>) -> Self {
        Self { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// One compiled script: the entry hat's stack or a procedure body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntermediateScript {
    pub stack: IntermediateStack,
}

impl IntermediateScript {
    pub fn new(stack: IntermediateStack) -> Self {
        Self { stack }
    }
}

/// A whole compiled program: one entry script plus its procedures, keyed by
/// the procedure code the front end assigns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntermediateRepresentation {
    pub entry: IntermediateScript,
    pub procedures: HashMap<String, IntermediateScript>,
}

impl IntermediateRepresentation {
    pub fn new(entry: IntermediateScript) -> Self {
        Self {
            entry,
            procedures: HashMap::new(),
        }
    }

    pub fn add_procedure(&mut self, code: impl Into<String>, script: IntermediateScript) {
        self.procedures.insert(code.into(), script);
    }
}
