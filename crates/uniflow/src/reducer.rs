//! Reducer - pure state transition function
//!
//! A reducer mutates the state in place for one action. Reducers for parts of
//! the state are lifted onto the whole state and concatenated into a root
//! reducer; the concatenation applies every reducer to the same action, left
//! to right, on the threaded state, and never short-circuits.

use crate::compose::{Lens, Monoid, Prism};
use std::sync::Arc;

pub struct Reducer<S, A> {
    reduce: Arc<dyn Fn(&mut S, &A) + Send + Sync>,
}

impl<S, A> Clone for Reducer<S, A> {
    fn clone(&self) -> Self {
        Self {
            reduce: self.reduce.clone(),
        }
    }
}

impl<S: 'static, A: 'static> Reducer<S, A> {
    pub fn new(reduce: impl Fn(&mut S, &A) + Send + Sync + 'static) -> Self {
        Self {
            reduce: Arc::new(reduce),
        }
    }

    /// Apply the reducer to `state`
    pub fn reduce(&self, state: &mut S, action: &A) {
        (self.reduce)(state, action)
    }

    /// Run this reducer on the part of a larger state picked by `lens`
    pub fn lift_state<T: 'static>(self, lens: Lens<T, S>) -> Reducer<T, A> {
        Reducer::new(move |state: &mut T, action: &A| self.reduce(lens.get_mut(state), action))
    }

    /// Run this reducer for the actions `prism` can extract, ignore the rest
    pub fn lift_action<B: 'static>(self, prism: Prism<B, A>) -> Reducer<S, B> {
        Reducer::new(move |state: &mut S, action: &B| {
            if let Some(action) = prism.preview(action) {
                self.reduce(state, action);
            }
        })
    }

    /// Lift both the state and the action type
    pub fn lift<T: 'static, B: 'static>(self, lens: Lens<T, S>, prism: Prism<B, A>) -> Reducer<T, B> {
        self.lift_state(lens).lift_action(prism)
    }
}

impl<S: 'static, A: 'static> Monoid for Reducer<S, A> {
    /// A reducer that leaves the state untouched
    fn empty() -> Self {
        Reducer::new(|_, _| {})
    }

    fn combine(self, other: Self) -> Self {
        Reducer::new(move |state: &mut S, action: &A| {
            self.reduce(state, action);
            other.reduce(state, action);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct State {
        text: String,
        num: i64,
        items: Vec<String>,
    }

    #[derive(Debug)]
    enum IntAction {
        Add(i64),
    }

    #[derive(Debug)]
    enum StringAction {
        Append(String),
    }

    #[derive(Debug)]
    enum StateAction {
        Int(IntAction),
        Str(StringAction),
        Item(String),
    }

    fn num(state: &State) -> &i64 {
        &state.num
    }
    fn num_mut(state: &mut State) -> &mut i64 {
        &mut state.num
    }
    fn text(state: &State) -> &String {
        &state.text
    }
    fn text_mut(state: &mut State) -> &mut String {
        &mut state.text
    }
    fn int_action(action: &StateAction) -> Option<&IntAction> {
        match action {
            StateAction::Int(inner) => Some(inner),
            _ => None,
        }
    }
    fn string_action(action: &StateAction) -> Option<&StringAction> {
        match action {
            StateAction::Str(inner) => Some(inner),
            _ => None,
        }
    }

    fn root_reducer() -> Reducer<State, StateAction> {
        let int_reducer = Reducer::new(|state: &mut i64, action: &IntAction| match action {
            IntAction::Add(n) => *state += n,
        });
        let string_reducer = Reducer::new(|state: &mut String, action: &StringAction| match action {
            StringAction::Append(suffix) => state.push_str(suffix),
        });
        let item_reducer = Reducer::new(|state: &mut State, action: &StateAction| {
            if let StateAction::Item(item) = action {
                state.items.push(item.clone());
            }
        });

        Reducer::concat([
            int_reducer.lift(Lens::new(num, num_mut), Prism::new(int_action, StateAction::Int)),
            string_reducer.lift(Lens::new(text, text_mut), Prism::new(string_action, StateAction::Str)),
            item_reducer,
        ])
    }

    #[test]
    fn test_lifted_reducers_only_see_their_actions() {
        let reducer = root_reducer();
        let mut state = State {
            text: "A".to_string(),
            num: 1,
            items: Vec::new(),
        };

        reducer.reduce(&mut state, &StateAction::Int(IntAction::Add(2)));
        reducer.reduce(&mut state, &StateAction::Str(StringAction::Append("B".to_string())));
        reducer.reduce(&mut state, &StateAction::Item("#".to_string()));

        assert_eq!(
            state,
            State {
                text: "AB".to_string(),
                num: 3,
                items: vec!["#".to_string()],
            }
        );
    }

    fn push(tag: &'static str) -> Reducer<Vec<String>, u32> {
        Reducer::new(move |state: &mut Vec<String>, action: &u32| state.push(format!("{}{}", tag, action)))
    }

    fn run(reducer: &Reducer<Vec<String>, u32>) -> Vec<String> {
        let mut state = Vec::new();
        reducer.reduce(&mut state, &1);
        reducer.reduce(&mut state, &2);
        state
    }

    #[test]
    fn test_combine_applies_both_in_order() {
        let reducer = push("a").combine(push("b"));
        assert_eq!(run(&reducer), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn test_identity_laws() {
        let plain = run(&push("x"));
        assert_eq!(run(&Reducer::empty().combine(push("x"))), plain);
        assert_eq!(run(&push("x").combine(Reducer::empty())), plain);
    }

    #[test]
    fn test_associativity() {
        let left = push("a").combine(push("b")).combine(push("c"));
        let right = push("a").combine(push("b").combine(push("c")));
        assert_eq!(run(&left), run(&right));
    }
}
