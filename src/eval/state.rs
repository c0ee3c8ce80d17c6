//! Resumable per-step state.
//!
//! An iterative operator that does not finish in one scheduling turn leaves its
//! progress in a [`MethodState`]. The record belongs to the invocation that
//! owns the [`MethodStates`] table and is addressed by the step instance id, so
//! two invocations running the same script never see each other's progress.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StepInstanceId(String);

impl StepInstanceId {
    pub fn root(index: usize) -> Self {
        Self(format!("steps[{}]", index))
    }

    pub fn child(&self, slot: &str) -> Self {
        Self(format!("{}.{}", self.0, slot))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodState {
    /// Next element to visit.
    pub index: usize,
    pub accumulator: Value,
    /// Collection materialized from the left operand on the first turn.
    pub collection: Option<Vec<Value>>,
    /// Turns taken so far, including the current one.
    pub turns: usize,
}

impl MethodState {
    pub fn len(&self) -> usize {
        self.collection.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_exhausted(&self) -> bool {
        self.index >= self.len()
    }

    /// Index range to visit this turn. Never empty before exhaustion, even
    /// for a zero `slice_size`.
    pub fn slice(&self, slice_size: usize) -> std::ops::Range<usize> {
        let end = self.index.saturating_add(slice_size.max(1)).min(self.len());
        self.index..end
    }
}

#[derive(Debug, Default)]
pub struct MethodStates {
    states: HashMap<StepInstanceId, MethodState>,
}

impl MethodStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &StepInstanceId) -> Option<&MethodState> {
        self.states.get(id)
    }

    pub fn get_mut(&mut self, id: &StepInstanceId) -> Option<&mut MethodState> {
        self.states.get_mut(id)
    }

    pub fn entry(&mut self, id: &StepInstanceId) -> &mut MethodState {
        self.states.entry(id.clone()).or_default()
    }

    pub fn remove(&mut self, id: &StepInstanceId) -> Option<MethodState> {
        self.states.remove(id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_instance_ids() {
        let root = StepInstanceId::root(2);
        assert_eq!(root.as_str(), "steps[2]");
        assert_eq!(root.child("left").to_string(), "steps[2].left");
    }

    #[test]
    fn test_slice_is_bounded_by_collection() {
        let mut state = MethodState {
            collection: Some(vec![json!(1), json!(2), json!(3), json!(4), json!(5)]),
            ..Default::default()
        };
        assert_eq!(state.slice(3), 0..3);
        state.index = 3;
        assert_eq!(state.slice(3), 3..5);
        state.index = 5;
        assert!(state.is_exhausted());
        assert_eq!(state.slice(3), 5..5);
    }

    #[test]
    fn test_zero_slice_still_advances() {
        let mut state = MethodState {
            collection: Some(vec![json!(1), json!(2)]),
            ..Default::default()
        };
        assert_eq!(state.slice(0), 0..1);
        state.index = 1;
        assert_eq!(state.slice(0), 1..2);
    }

    #[test]
    fn test_states_are_discarded_on_remove() {
        let mut states = MethodStates::new();
        let id = StepInstanceId::root(0);
        states.entry(&id).index = 4;
        assert_eq!(states.get(&id).map(|s| s.index), Some(4));
        assert!(states.remove(&id).is_some());
        assert!(states.is_empty());
    }
}
