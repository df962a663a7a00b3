//! Sparse per-variable type knowledge threaded through the analysis.

use crate::compiler::enums::InputType;
use crate::compiler::intermediate::Variable;
use std::collections::HashMap;

/// Mapping from variable identity to the lattice value the analysis has
/// proven for it at one program point.
///
/// The map is sparse: a missing key reads back as [`InputType::ANY`].
/// Sparsity is an optimization, not a different meaning — an explicit ANY
/// entry and an absent one are semantically identical. A state never forgets
/// a variable except through [`TypeState::clear`]; every other transition is
/// one of the combinators below.
///
/// Every mutating operation reports whether it changed anything, which is
/// what lets loop analysis detect its fixed point.
#[derive(Debug, Clone, Default)]
pub struct TypeState {
    variables: HashMap<String, InputType>,
}

impl TypeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all knowledge: every variable reads back as ANY afterwards.
    /// Returns false when the state already carried no knowledge.
    pub fn clear(&mut self) -> bool {
        let modified = self.variables.values().any(|&ty| ty != InputType::ANY);
        self.variables.clear();
        modified
    }

    /// Pointwise join with `other`: either path could have run.
    pub fn or(&mut self, other: &TypeState) -> bool {
        self.mutate(other, |ours, theirs| {
            ours.unwrap_or(InputType::ANY) | theirs.unwrap_or(InputType::ANY)
        })
    }

    /// Sequential composition: run `other`'s effects on top of this state.
    /// A variable `other` recorded wins; everything else keeps its value.
    pub fn after(&mut self, other: &TypeState) -> bool {
        self.mutate(other, |ours, theirs| match theirs {
            Some(ty) => ty,
            None => ours.unwrap_or(InputType::ANY),
        })
    }

    /// Wholesale replacement by `other`: a variable `other` did not record
    /// becomes ANY. Used when adopting a summary that invalidated the
    /// receiver's assumptions.
    pub fn overwrite(&mut self, other: &TypeState) -> bool {
        self.mutate(other, |_, theirs| theirs.unwrap_or(InputType::ANY))
    }

    pub fn set_variable_type(&mut self, variable: &Variable, ty: InputType) -> bool {
        if self.variables.get(&variable.id) == Some(&ty) {
            return false;
        }
        self.variables.insert(variable.id.clone(), ty);
        true
    }

    pub fn get_variable_type(&self, variable: &Variable) -> InputType {
        self.lookup(&variable.id)
    }

    pub(crate) fn lookup(&self, id: &str) -> InputType {
        self.variables
            .get(id)
            .copied()
            .unwrap_or(InputType::ANY)
    }

    /// Shared combinator behind `or`/`after`/`overwrite`: recompute every key
    /// `other` mentions, then every key only the receiver mentions, so the
    /// two variable universes are reconciled symmetrically and neither side
    /// silently shadows keys the other never saw.
    fn mutate(
        &mut self,
        other: &TypeState,
        rule: impl Fn(Option<InputType>, Option<InputType>) -> InputType,
    ) -> bool {
        let mut updates: Vec<(String, InputType)> = Vec::new();

        for (id, &theirs) in &other.variables {
            let ours = self.variables.get(id).copied();
            let next = rule(ours, Some(theirs));
            if ours != Some(next) {
                updates.push((id.clone(), next));
            }
        }

        for (id, &ours) in &self.variables {
            if other.variables.contains_key(id) {
                continue;
            }
            let next = rule(Some(ours), None);
            if next != ours {
                updates.push((id.clone(), next));
            }
        }

        let modified = !updates.is_empty();
        for (id, ty) in updates {
            self.variables.insert(id, ty);
        }
        modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(id: &str) -> Variable {
        Variable::new(id, id)
    }

    #[test]
    fn test_missing_key_reads_as_any() {
        let state = TypeState::new();
        assert_eq!(state.get_variable_type(&var("x")), InputType::ANY);
    }

    #[test]
    fn test_set_and_get() {
        let mut state = TypeState::new();
        assert!(state.set_variable_type(&var("x"), InputType::NUMBER));
        assert_eq!(state.get_variable_type(&var("x")), InputType::NUMBER);
        // Re-setting the same value is not a change.
        assert!(!state.set_variable_type(&var("x"), InputType::NUMBER));
    }

    #[test]
    fn test_clone_is_independent() {
        let mut state = TypeState::new();
        state.set_variable_type(&var("x"), InputType::NUMBER_POS_INT);
        let snapshot = state.clone();
        state.set_variable_type(&var("x"), InputType::ANY);
        assert_eq!(
            snapshot.get_variable_type(&var("x")),
            InputType::NUMBER_POS_INT
        );
    }

    #[test]
    fn test_clear_reports_change_only_once() {
        let mut state = TypeState::new();
        assert!(!state.clear());
        state.set_variable_type(&var("x"), InputType::NUMBER);
        assert!(state.clear());
        assert_eq!(state.get_variable_type(&var("x")), InputType::ANY);
        assert!(!state.clear());
    }

    #[test]
    fn test_clear_on_explicit_any_is_not_a_change() {
        let mut state = TypeState::new();
        state.set_variable_type(&var("x"), InputType::ANY);
        assert!(!state.clear());
    }

    #[test]
    fn test_or_joins_pointwise() {
        let mut a = TypeState::new();
        a.set_variable_type(&var("x"), InputType::NUMBER_POS_INT);
        let mut b = TypeState::new();
        b.set_variable_type(&var("x"), InputType::NUMBER_NEG_INT);

        assert!(a.or(&b));
        assert_eq!(a.get_variable_type(&var("x")), InputType(0xC00));
    }

    #[test]
    fn test_or_treats_missing_side_as_any() {
        let mut a = TypeState::new();
        a.set_variable_type(&var("x"), InputType::NUMBER);
        let b = TypeState::new();

        // `b` never mentions x, so x could be anything on that path.
        a.or(&b);
        assert_eq!(a.get_variable_type(&var("x")), InputType::ANY);

        let mut c = TypeState::new();
        let mut d = TypeState::new();
        d.set_variable_type(&var("y"), InputType::NUMBER);
        c.or(&d);
        assert_eq!(c.get_variable_type(&var("y")), InputType::ANY);
    }

    #[test]
    fn test_or_never_narrows() {
        let mut a = TypeState::new();
        a.set_variable_type(&var("x"), InputType::NUMBER_POS_INT);
        let mut b = TypeState::new();
        b.set_variable_type(&var("x"), InputType::NUMBER_INT);

        let before = a.get_variable_type(&var("x"));
        a.or(&b);
        let after = a.get_variable_type(&var("x"));
        assert!(before.is_subtype_of(after));
        assert!(InputType::NUMBER_INT.is_subtype_of(after));
    }

    #[test]
    fn test_after_prefers_later_knowledge() {
        let mut a = TypeState::new();
        a.set_variable_type(&var("x"), InputType::NUMBER);
        a.set_variable_type(&var("y"), InputType::NUMBER_POS_INT);
        let mut b = TypeState::new();
        b.set_variable_type(&var("x"), InputType::NUMBER_NEG_FRACT);

        assert!(a.after(&b));
        assert_eq!(
            a.get_variable_type(&var("x")),
            InputType::NUMBER_NEG_FRACT
        );
        // Untouched variables keep their earlier knowledge.
        assert_eq!(a.get_variable_type(&var("y")), InputType::NUMBER_POS_INT);
    }

    #[test]
    fn test_overwrite_replaces_wholesale() {
        let mut a = TypeState::new();
        a.set_variable_type(&var("x"), InputType::NUMBER);
        a.set_variable_type(&var("y"), InputType::NUMBER_POS_INT);
        let mut b = TypeState::new();
        b.set_variable_type(&var("x"), InputType::NUMBER_ZERO);

        assert!(a.overwrite(&b));
        assert_eq!(a.get_variable_type(&var("x")), InputType::NUMBER_ZERO);
        assert_eq!(a.get_variable_type(&var("y")), InputType::ANY);
    }

    #[test]
    fn test_overwrite_with_empty_equals_clear() {
        let mut a = TypeState::new();
        a.set_variable_type(&var("x"), InputType::NUMBER);
        assert!(a.overwrite(&TypeState::new()));
        assert_eq!(a.get_variable_type(&var("x")), InputType::ANY);
    }
}
