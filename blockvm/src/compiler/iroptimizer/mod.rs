//! Type-inference optimizer over the compiled IR.
//!
//! A fixed-point dataflow analysis that narrows the possible runtime type of
//! every variable and expression, so the code generator can elide a runtime
//! coercion whenever an operand's annotation is already a subtype of what
//! the operation requires. The analysis threads one mutable [`TypeState`]
//! through each script: expressions are evaluated bottom-up, branch arms are
//! analyzed on cloned states and rejoined with `or`, loops iterate to a
//! fixed point, and procedure calls fold the callee's published exit state
//! into the caller.
//!
//! The runtime interleaves scripts cooperatively: between a yield and its
//! resumption any other script may mutate any shared variable. Soundness
//! under that model rests on a single rule — at every yield point the
//! analysis discards all inferred knowledge ([`TypeState::clear`]) instead
//! of carrying it across the suspension. Everywhere else the analysis is as
//! precise as the lattice allows.
//!
//! The optimizer never raises an error for anything it merely fails to
//! understand; unknown effects degrade to "no knowledge". The only error is
//! a contract violation of the upstream builder (a call naming a procedure
//! the program does not contain).

mod arith;
mod state;

pub use state::TypeState;

use crate::compiler::enums::{InputType, StackOpcode};
use crate::compiler::intermediate::{
    ConstantValue, InputKind, IntermediateInput, IntermediateRepresentation, IntermediateStack,
    IntermediateStackBlock, StackBlockKind, Variable,
};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::mem;
use thiserror::Error;

/// Raised only for malformed IR, which is a contract violation of the
/// upstream builder. The analysis itself is total.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptimizeError {
    #[error("procedure call targets unknown procedure `{0}`")]
    UnknownProcedure(String),
}

static DEFAULT_YIELD_OPCODES: Lazy<HashSet<StackOpcode>> = Lazy::new(|| {
    [
        StackOpcode::ControlWaitUntil,
        StackOpcode::CompatibilityLayer,
    ]
    .into_iter()
    .collect()
});

/// Statement opcodes at which the running script may be suspended and other
/// scripts may run.
///
/// The default covers the explicit suspend (`CONTROL_WAIT_UNTIL`) and the
/// interpretive fallback (`COMPATIBILITY_LAYER`). Addon calls and calls to
/// yielding procedures are handled structurally and are not part of this
/// table. Removing an opcode asserts that the runtime never suspends there;
/// a wrong assertion makes the analysis unsound.
#[derive(Debug, Clone)]
pub struct YieldPolicy {
    yielding: HashSet<StackOpcode>,
}

impl Default for YieldPolicy {
    fn default() -> Self {
        Self {
            yielding: DEFAULT_YIELD_OPCODES.clone(),
        }
    }
}

impl YieldPolicy {
    /// A policy under which no statement opcode yields.
    pub fn empty() -> Self {
        Self {
            yielding: HashSet::new(),
        }
    }

    pub fn yields_at(&self, opcode: StackOpcode) -> bool {
        self.yielding.contains(&opcode)
    }

    pub fn with_opcode(mut self, opcode: StackOpcode) -> Self {
        self.yielding.insert(opcode);
        self
    }

    pub fn without_opcode(mut self, opcode: StackOpcode) -> Self {
        self.yielding.remove(&opcode);
        self
    }
}

/// Analysis configuration, passed at construction. Nothing in the optimizer
/// is a process-wide flag, so analyses with different settings can run side
/// by side.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Testing toggle: suppress yield-triggered invalidation so the pure
    /// dataflow arithmetic can be exercised on its own. The recursion guard
    /// still invalidates; it models an unanalyzed cycle, not a yield.
    pub ignore_yields: bool,
    pub yield_policy: YieldPolicy,
    /// Defensive cap on loop re-analysis passes. The lattice is finite and
    /// the rules monotone, so convergence is guaranteed well below this; the
    /// cap forces convergence (by dropping to no knowledge) should a future
    /// rule break monotonicity.
    pub max_loop_passes: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            ignore_yields: false,
            yield_policy: YieldPolicy::default(),
            max_loop_passes: 128,
        }
    }
}

/// Exit summary published for an analyzed procedure: what is known once it
/// has run to completion, and whether it can yield on the way.
#[derive(Debug, Clone)]
struct ScriptSummary {
    exit: TypeState,
    yields: bool,
}

/// Whether a walked sequence can flow into what lexically follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlowExit {
    Continues,
    /// The path ended in an unconditional stop; it contributes no further
    /// flow to any enclosing join.
    Terminates,
}

/// The optimizer engine. One instance owns its type states exclusively for
/// the duration of one [`IrOptimizer::optimize`] call; the IR must not be
/// mutated elsewhere while an analysis is in flight.
#[derive(Debug)]
pub struct IrOptimizer<'ir> {
    ir: &'ir mut IntermediateRepresentation,
    config: OptimizerConfig,
    summaries: HashMap<String, ScriptSummary>,
}

impl<'ir> IrOptimizer<'ir> {
    pub fn new(ir: &'ir mut IntermediateRepresentation) -> Self {
        Self::with_config(ir, OptimizerConfig::default())
    }

    pub fn with_config(ir: &'ir mut IntermediateRepresentation, config: OptimizerConfig) -> Self {
        Self {
            ir,
            config,
            summaries: HashMap::new(),
        }
    }

    /// Analyze the program's entry script from an all-top state, annotating
    /// every reachable expression node in place. Returns whether any
    /// annotation changed; a program already annotated by a converged run
    /// reports `false`, because the analysis is monotone and its own fixed
    /// point is stable.
    pub fn optimize(&mut self) -> Result<bool, OptimizeError> {
        let before = annotation_snapshot(self.ir);

        let mut stack = mem::take(&mut self.ir.entry.stack);
        let mut state = TypeState::new();
        let mut visiting = HashSet::new();
        let mut yields = false;
        let walked = self.walk_stack(&mut stack, &mut state, &mut visiting, &mut yields);
        self.ir.entry.stack = stack;
        walked?;

        Ok(annotation_snapshot(self.ir) != before)
    }

    fn walk_stack(
        &mut self,
        stack: &mut IntermediateStack,
        state: &mut TypeState,
        visiting: &mut HashSet<String>,
        yields: &mut bool,
    ) -> Result<FlowExit, OptimizeError> {
        for block in &mut stack.blocks {
            if self.walk_block(block, state, visiting, yields)? == FlowExit::Terminates {
                // Nothing lexically after this block is reachable here.
                return Ok(FlowExit::Terminates);
            }
        }
        Ok(FlowExit::Continues)
    }

    fn walk_block(
        &mut self,
        block: &mut IntermediateStackBlock,
        state: &mut TypeState,
        visiting: &mut HashSet<String>,
        yields: &mut bool,
    ) -> Result<FlowExit, OptimizeError> {
        match &mut block.kind {
            StackBlockKind::VarSet { variable, value } => {
                let ty = self.eval_input(value, state, visiting, yields)?;
                state.set_variable_type(variable, ty);
                Ok(FlowExit::Continues)
            }
            StackBlockKind::ControlIfElse {
                condition,
                then_branch,
                else_branch,
            } => {
                self.eval_input(condition, state, visiting, yields)?;
                let mut then_state = state.clone();
                let then_exit = self.walk_stack(then_branch, &mut then_state, visiting, yields)?;
                let mut else_state = state.clone();
                let else_exit = self.walk_stack(else_branch, &mut else_state, visiting, yields)?;
                match (then_exit, else_exit) {
                    (FlowExit::Continues, FlowExit::Continues) => {
                        *state = then_state;
                        state.or(&else_state);
                        Ok(FlowExit::Continues)
                    }
                    (FlowExit::Continues, FlowExit::Terminates) => {
                        *state = then_state;
                        Ok(FlowExit::Continues)
                    }
                    (FlowExit::Terminates, FlowExit::Continues) => {
                        *state = else_state;
                        Ok(FlowExit::Continues)
                    }
                    (FlowExit::Terminates, FlowExit::Terminates) => Ok(FlowExit::Terminates),
                }
            }
            StackBlockKind::ControlWhile { condition, body } => {
                self.walk_loop(Some(condition), None, body, state, visiting, yields)?;
                Ok(FlowExit::Continues)
            }
            StackBlockKind::ControlFor {
                variable,
                count,
                body,
            } => {
                self.eval_input(count, state, visiting, yields)?;
                let counter = variable.clone();
                self.walk_loop(None, Some(&counter), body, state, visiting, yields)?;
                Ok(FlowExit::Continues)
            }
            StackBlockKind::ControlRepeat { times, body } => {
                self.eval_input(times, state, visiting, yields)?;
                self.walk_loop(None, None, body, state, visiting, yields)?;
                Ok(FlowExit::Continues)
            }
            StackBlockKind::ControlStopScript => Ok(FlowExit::Terminates),
            StackBlockKind::ControlWaitUntil { condition } => {
                // Invalidate before evaluating the condition: the condition
                // is re-polled after other scripts have run, so it observes
                // post-yield state.
                if self.config.yield_policy.yields_at(StackOpcode::ControlWaitUntil) {
                    self.invalidate_at_yield(state, yields);
                }
                self.eval_input(condition, state, visiting, yields)?;
                Ok(FlowExit::Continues)
            }
            StackBlockKind::ProcedureCall { procedure, args } => {
                for arg in args.iter_mut() {
                    self.eval_input(arg, state, visiting, yields)?;
                }
                self.apply_procedure_call(procedure, state, visiting, yields)?;
                Ok(FlowExit::Continues)
            }
            StackBlockKind::CompatibilityLayer { .. } => {
                // The interpreted block can read and write anything.
                if self
                    .config
                    .yield_policy
                    .yields_at(StackOpcode::CompatibilityLayer)
                {
                    self.invalidate_at_yield(state, yields);
                }
                Ok(FlowExit::Continues)
            }
        }
    }

    /// Fixed-point analysis of one loop. The continuation state is the
    /// converged join of the loop-entry state with every body pass, never a
    /// body exit alone, because the loop may run zero times. Convergence is
    /// guaranteed by monotonicity (each variable's mask only grows, and a
    /// mask has at most 32 bits to gain); the pass cap only matters if a
    /// propagation rule is ever non-monotone, and forces convergence by
    /// dropping to no knowledge.
    fn walk_loop(
        &mut self,
        mut condition: Option<&mut IntermediateInput>,
        counter: Option<&Variable>,
        body: &mut IntermediateStack,
        state: &mut TypeState,
        visiting: &mut HashSet<String>,
        yields: &mut bool,
    ) -> Result<(), OptimizeError> {
        let mut passes = 0;
        loop {
            if let Some(cond) = condition.as_deref_mut() {
                self.eval_input(cond, state, visiting, yields)?;
            }
            let mut body_state = state.clone();
            if let Some(variable) = counter {
                // The runtime counts the loop variable up from 1.
                body_state.set_variable_type(variable, InputType::NUMBER_POS_INT);
            }
            let exit = self.walk_stack(body, &mut body_state, visiting, yields)?;
            let changed = exit == FlowExit::Continues && state.or(&body_state);
            if !changed {
                break;
            }
            passes += 1;
            if passes == self.config.max_loop_passes {
                state.clear();
            }
        }
        Ok(())
    }

    fn eval_input(
        &mut self,
        input: &mut IntermediateInput,
        state: &mut TypeState,
        visiting: &mut HashSet<String>,
        yields: &mut bool,
    ) -> Result<InputType, OptimizeError> {
        let ty = match &mut input.kind {
            InputKind::Constant { value } => match value {
                ConstantValue::Number(n) => InputType::of_number(*n),
                // No lattice bits are assigned to strings or booleans.
                ConstantValue::Text(_) | ConstantValue::Boolean(_) => InputType::ANY,
            },
            InputKind::VarGet { variable } => state.get_variable_type(variable),
            InputKind::CastNumber { target } => {
                let operand = self.eval_input(target, state, visiting, yields)?;
                arith::cast_number(operand)
            }
            InputKind::CastNumberOrNan { target } => {
                let operand = self.eval_input(target, state, visiting, yields)?;
                arith::cast_number_or_nan(operand)
            }
            InputKind::Binary { op, left, right } => {
                let op = *op;
                let l = self.eval_input(left, state, visiting, yields)?;
                let r = self.eval_input(right, state, visiting, yields)?;
                arith::binary_result(op, l, r)
            }
            InputKind::AddonCall { args, .. } => {
                for arg in args.iter_mut() {
                    self.eval_input(arg, state, visiting, yields)?;
                }
                // Extension code is opaque: it may mutate anything and may
                // suspend the script.
                self.invalidate_at_yield(state, yields);
                InputType::ANY
            }
            InputKind::ProcedureCall { procedure, args } => {
                for arg in args.iter_mut() {
                    self.eval_input(arg, state, visiting, yields)?;
                }
                self.apply_procedure_call(procedure, state, visiting, yields)?;
                // Reported values are not tracked through the lattice.
                InputType::ANY
            }
        };
        input.inferred = ty;
        Ok(ty)
    }

    /// Fold a call to a named procedure into the caller's running state.
    fn apply_procedure_call(
        &mut self,
        procedure: &str,
        state: &mut TypeState,
        visiting: &mut HashSet<String>,
        yields: &mut bool,
    ) -> Result<(), OptimizeError> {
        if visiting.contains(procedure) {
            // Recursion guard: a call cycle is summarized as fully-top.
            // Precision is deliberately sacrificed to guarantee termination.
            *yields = true;
            state.overwrite(&TypeState::new());
            return Ok(());
        }

        let summary = self.summarize_procedure(procedure, visiting)?;
        if summary.yields && !self.config.ignore_yields {
            // The callee can suspend: only its own post-yield knowledge
            // survives the call.
            state.overwrite(&summary.exit);
        } else {
            // A known, narrower effect sharpens the caller instead of
            // erasing it.
            state.after(&summary.exit);
        }
        *yields |= summary.yields;
        Ok(())
    }

    /// Analyze a procedure from a fresh all-top state and publish its exit
    /// summary. Summaries are context-independent (every analysis starts
    /// from top), so they are computed once per run and cached.
    fn summarize_procedure(
        &mut self,
        procedure: &str,
        visiting: &mut HashSet<String>,
    ) -> Result<ScriptSummary, OptimizeError> {
        if let Some(summary) = self.summaries.get(procedure) {
            return Ok(summary.clone());
        }

        let mut script = self
            .ir
            .procedures
            .remove(procedure)
            .ok_or_else(|| OptimizeError::UnknownProcedure(procedure.to_string()))?;

        visiting.insert(procedure.to_string());
        let mut state = TypeState::new();
        let mut yields = false;
        let walked = self.walk_stack(&mut script.stack, &mut state, visiting, &mut yields);
        visiting.remove(procedure);
        self.ir.procedures.insert(procedure.to_string(), script);
        walked?;

        let summary = ScriptSummary {
            exit: state,
            yields,
        };
        self.summaries.insert(procedure.to_string(), summary.clone());
        Ok(summary)
    }

    fn invalidate_at_yield(&self, state: &mut TypeState, yields: &mut bool) {
        *yields = true;
        if !self.config.ignore_yields {
            state.clear();
        }
    }
}

/// Analyze a program with the default configuration.
pub fn optimize_program(ir: &mut IntermediateRepresentation) -> Result<bool, OptimizeError> {
    IrOptimizer::new(ir).optimize()
}

/// All expression annotations in a deterministic order, used to detect
/// whether a run changed anything.
fn annotation_snapshot(ir: &IntermediateRepresentation) -> Vec<InputType> {
    let mut out = Vec::new();
    snapshot_stack(&ir.entry.stack, &mut out);
    let mut names: Vec<&String> = ir.procedures.keys().collect();
    names.sort();
    for name in names {
        snapshot_stack(&ir.procedures[name].stack, &mut out);
    }
    out
}

fn snapshot_stack(stack: &IntermediateStack, out: &mut Vec<InputType>) {
    for block in &stack.blocks {
        match &block.kind {
            StackBlockKind::VarSet { value, .. } => snapshot_input(value, out),
            StackBlockKind::ControlIfElse {
                condition,
                then_branch,
                else_branch,
            } => {
                snapshot_input(condition, out);
                snapshot_stack(then_branch, out);
                snapshot_stack(else_branch, out);
            }
            StackBlockKind::ControlWhile { condition, body } => {
                snapshot_input(condition, out);
                snapshot_stack(body, out);
            }
            StackBlockKind::ControlFor { count, body, .. } => {
                snapshot_input(count, out);
                snapshot_stack(body, out);
            }
            StackBlockKind::ControlRepeat { times, body } => {
                snapshot_input(times, out);
                snapshot_stack(body, out);
            }
            StackBlockKind::ControlStopScript => {}
            StackBlockKind::ControlWaitUntil { condition } => snapshot_input(condition, out),
            StackBlockKind::ProcedureCall { args, .. } => {
                for arg in args {
                    snapshot_input(arg, out);
                }
            }
            StackBlockKind::CompatibilityLayer { .. } => {}
        }
    }
}

fn snapshot_input(input: &IntermediateInput, out: &mut Vec<InputType>) {
    out.push(input.inferred);
    match &input.kind {
        InputKind::Constant { .. } | InputKind::VarGet { .. } => {}
        InputKind::AddonCall { args, .. } | InputKind::ProcedureCall { args, .. } => {
            for arg in args {
                snapshot_input(arg, out);
            }
        }
        InputKind::CastNumber { target } | InputKind::CastNumberOrNan { target } => {
            snapshot_input(target, out);
        }
        InputKind::Binary { left, right, .. } => {
            snapshot_input(left, out);
            snapshot_input(right, out);
        }
    }
}
