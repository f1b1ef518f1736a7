//! State container: closed schema and per-field reducers
//!
//! A graph's state is a JSON object whose fields are declared up front in a
//! [`StateSchema`]. Each field carries a [`Reducer`] that decides how a node's
//! update combines with the value already in state:
//!
//! | Reducer | current | update | result |
//! |---|---|---|---|
//! | [`OverwriteReducer`] | `"a"` | `"b"` | `"b"` |
//! | [`AppendReducer`] | `["a"]` | `["b", "c"]` | `["a", "b", "c"]` |
//! | [`AppendReducer`] | `["a"]` | `"b"` | `["a", "b"]` |
//!
//! Reducers are fixed when the schema is built and never change during a run.
//!
//! # Merge
//!
//! [`StateSchema::merge`] is pure: it returns a new [`State`] and never touches
//! the one it was given. A node output naming a field the schema does not
//! declare is rejected with [`StateError::UnknownField`] instead of being
//! dropped.
//!
//! ```rust
//! use stategraph_core::state::{AppendReducer, OverwriteReducer, StateSchema};
//! use serde_json::json;
//!
//! let schema = StateSchema::new()
//!     .with_field("status", OverwriteReducer)
//!     .with_field("log", AppendReducer);
//!
//! let state = schema.initial_state(json!({"status": "new"})).unwrap();
//! assert_eq!(state["log"], json!([]));
//!
//! let next = schema
//!     .merge(&state, &json!({"status": "done", "log": ["analyze"]}))
//!     .unwrap();
//! assert_eq!(next["status"], json!("done"));
//! assert_eq!(next["log"], json!(["analyze"]));
//!
//! assert!(schema.merge(&state, &json!({"unknown": 1})).is_err());
//! ```

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Graph state: field name to value, ordered by field name
pub type State = serde_json::Map<String, Value>;

#[derive(Debug, Error)]
pub enum StateError {
    /// An update or seed named a field the schema does not declare
    #[error("Unknown state field: {0}")]
    UnknownField(String),

    /// An update was not a JSON object
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Reducer error: {0}")]
    ReducerError(String),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// Per-field merge policy
pub trait Reducer: Send + Sync {
    /// Combine the current value with an update
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value>;

    /// Value an absent field behaves as; `None` means "no prior value"
    fn identity(&self) -> Option<Value> {
        None
    }

    fn name(&self) -> &str;
}

/// New value replaces the old one
#[derive(Debug, Clone)]
pub struct OverwriteReducer;

impl Reducer for OverwriteReducer {
    fn reduce(&self, _current: &Value, update: &Value) -> Result<Value> {
        Ok(update.clone())
    }

    fn name(&self) -> &str {
        "overwrite"
    }
}

/// Sequence concatenation, order preserved
///
/// A non-array update is pushed as a single item.
#[derive(Debug, Clone)]
pub struct AppendReducer;

impl Reducer for AppendReducer {
    fn reduce(&self, current: &Value, update: &Value) -> Result<Value> {
        match (current, update) {
            (Value::Array(curr_arr), Value::Array(upd_arr)) => {
                let mut result = curr_arr.clone();
                result.extend_from_slice(upd_arr);
                Ok(Value::Array(result))
            }
            (Value::Null, Value::Array(upd_arr)) => Ok(Value::Array(upd_arr.clone())),
            (Value::Array(curr_arr), single_value) => {
                let mut result = curr_arr.clone();
                result.push(single_value.clone());
                Ok(Value::Array(result))
            }
            (Value::Null, single_value) => Ok(Value::Array(vec![single_value.clone()])),
            _ => Err(StateError::ReducerError(
                "AppendReducer requires array values".to_string(),
            )),
        }
    }

    fn identity(&self) -> Option<Value> {
        Some(Value::Array(Vec::new()))
    }

    fn name(&self) -> &str {
        "append"
    }
}

#[derive(Clone)]
struct FieldSpec {
    reducer: Arc<dyn Reducer>,
    default: Option<Value>,
}

/// Closed set of state fields with their reducers
///
/// Cheap to clone; reducers are shared.
#[derive(Clone, Default)]
pub struct StateSchema {
    fields: BTreeMap<String, FieldSpec>,
}

impl std::fmt::Debug for StateSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, spec) in &self.fields {
            map.entry(name, &spec.reducer.name());
        }
        map.finish()
    }
}

impl StateSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field; re-declaring replaces the previous declaration
    pub fn add_field(
        &mut self,
        field_name: impl Into<String>,
        reducer: impl Reducer + 'static,
    ) -> &mut Self {
        self.fields.insert(
            field_name.into(),
            FieldSpec {
                reducer: Arc::new(reducer),
                default: None,
            },
        );
        self
    }

    /// Declare a field with the value it takes when the seed omits it
    pub fn add_field_with_default(
        &mut self,
        field_name: impl Into<String>,
        reducer: impl Reducer + 'static,
        default: Value,
    ) -> &mut Self {
        self.fields.insert(
            field_name.into(),
            FieldSpec {
                reducer: Arc::new(reducer),
                default: Some(default),
            },
        );
        self
    }

    pub fn with_field(mut self, field_name: impl Into<String>, reducer: impl Reducer + 'static) -> Self {
        self.add_field(field_name, reducer);
        self
    }

    pub fn with_field_default(
        mut self,
        field_name: impl Into<String>,
        reducer: impl Reducer + 'static,
        default: Value,
    ) -> Self {
        self.add_field_with_default(field_name, reducer, default);
        self
    }

    /// Declared field names, sorted
    pub fn fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    pub fn contains(&self, field_name: &str) -> bool {
        self.fields.contains_key(field_name)
    }

    pub fn reducer_for(&self, field_name: &str) -> Option<&dyn Reducer> {
        self.fields.get(field_name).map(|spec| spec.reducer.as_ref())
    }

    /// Build a run's starting state from a seed object
    ///
    /// The seed may only name declared fields. Omitted fields take their
    /// declared default, then the reducer's identity (`[]` for append);
    /// overwrite fields with neither stay absent.
    pub fn initial_state(&self, seed: Value) -> Result<State> {
        let mut state = match seed {
            Value::Object(map) => map,
            Value::Null => State::new(),
            other => {
                return Err(StateError::InvalidState(format!(
                    "initial state must be an object, got {}",
                    json_type(&other)
                )))
            }
        };

        if let Some(unknown) = state.keys().find(|k| !self.fields.contains_key(*k)) {
            return Err(StateError::UnknownField(unknown.clone()));
        }

        for (name, spec) in &self.fields {
            if state.contains_key(name) {
                continue;
            }
            if let Some(value) = spec.default.clone().or_else(|| spec.reducer.identity()) {
                state.insert(name.clone(), value);
            }
        }

        Ok(state)
    }

    /// Apply a partial update, returning the new state
    pub fn merge(&self, current: &State, partial: &Value) -> Result<State> {
        let updates = partial.as_object().ok_or_else(|| {
            StateError::InvalidUpdate(format!(
                "update must be an object, got {}",
                json_type(partial)
            ))
        })?;

        let mut next = current.clone();
        for (field_name, update_value) in updates {
            let spec = self
                .fields
                .get(field_name)
                .ok_or_else(|| StateError::UnknownField(field_name.clone()))?;

            let current_value = current
                .get(field_name)
                .cloned()
                .or_else(|| spec.reducer.identity())
                .unwrap_or(Value::Null);

            let reduced = spec
                .reducer
                .reduce(&current_value, update_value)
                .map_err(|e| match e {
                    StateError::ReducerError(msg) => {
                        StateError::ReducerError(format!("field '{}': {}", field_name, msg))
                    }
                    other => other,
                })?;

            next.insert(field_name.clone(), reduced);
        }

        Ok(next)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn schema() -> StateSchema {
        StateSchema::new()
            .with_field("status", OverwriteReducer)
            .with_field("log", AppendReducer)
            .with_field_default("iteration", OverwriteReducer, json!(0))
    }

    #[test]
    fn test_overwrite_reducer() {
        let reducer = OverwriteReducer;
        let result = reducer.reduce(&json!(["a"]), &json!(["b", "c"])).unwrap();
        assert_eq!(result, json!(["b", "c"]));
    }

    #[test]
    fn test_append_reducer_arrays() {
        let reducer = AppendReducer;
        let result = reducer.reduce(&json!(["a"]), &json!(["b", "c"])).unwrap();
        assert_eq!(result, json!(["a", "b", "c"]));
    }

    #[test]
    fn test_append_reducer_single_value() {
        let reducer = AppendReducer;
        let result = reducer.reduce(&json!([1, 2]), &json!(3)).unwrap();
        assert_eq!(result, json!([1, 2, 3]));
    }

    #[test]
    fn test_append_reducer_rejects_non_array_current() {
        let reducer = AppendReducer;
        assert!(reducer.reduce(&json!("text"), &json!(["b"])).is_err());
    }

    #[test]
    fn test_reducer_names() {
        assert_eq!(OverwriteReducer.name(), "overwrite");
        assert_eq!(AppendReducer.name(), "append");
    }

    #[test]
    fn test_initial_state_fills_defaults() {
        let state = schema().initial_state(json!({"status": "new"})).unwrap();

        assert_eq!(state["status"], json!("new"));
        assert_eq!(state["log"], json!([]));
        assert_eq!(state["iteration"], json!(0));
    }

    #[test]
    fn test_initial_state_overwrite_without_default_stays_absent() {
        let state = schema().initial_state(json!({})).unwrap();
        assert!(!state.contains_key("status"));
    }

    #[test]
    fn test_initial_state_rejects_unknown_field() {
        let err = schema().initial_state(json!({"bogus": 1})).unwrap_err();
        assert!(matches!(err, StateError::UnknownField(f) if f == "bogus"));

        let err = schema().initial_state(json!([1, 2])).unwrap_err();
        assert!(matches!(err, StateError::InvalidState(_)));
    }

    #[test]
    fn test_merge_applies_reducers() {
        let schema = schema();
        let state = schema.initial_state(json!({"log": ["a"]})).unwrap();

        let next = schema
            .merge(&state, &json!({"log": ["b", "c"], "status": "b"}))
            .unwrap();

        assert_eq!(next["log"], json!(["a", "b", "c"]));
        assert_eq!(next["status"], json!("b"));
    }

    #[test]
    fn test_merge_absent_append_field_uses_identity() {
        let schema = StateSchema::new().with_field("log", AppendReducer);
        let next = schema.merge(&State::new(), &json!({"log": ["x"]})).unwrap();
        assert_eq!(next["log"], json!(["x"]));
    }

    #[test]
    fn test_merge_is_pure() {
        let schema = schema();
        let state = schema.initial_state(json!({"log": ["a"]})).unwrap();
        let before = state.clone();

        let mut next = schema.merge(&state, &json!({"log": ["b"]})).unwrap();
        next.insert("status".to_string(), json!("mutated"));

        assert_eq!(state, before);
    }

    #[test]
    fn test_merge_unknown_field() {
        let schema = schema();
        let state = schema.initial_state(json!({})).unwrap();

        let err = schema.merge(&state, &json!({"log": ["ok"], "nope": 1})).unwrap_err();
        assert!(matches!(err, StateError::UnknownField(f) if f == "nope"));
    }

    #[test]
    fn test_merge_non_object_update() {
        let schema = schema();
        let err = schema.merge(&State::new(), &json!("oops")).unwrap_err();
        assert!(matches!(err, StateError::InvalidUpdate(_)));
    }

    #[test]
    fn test_merge_reducer_error_names_field() {
        let schema = schema();
        let mut state = State::new();
        state.insert("log".to_string(), json!("not a list"));

        let err = schema.merge(&state, &json!({"log": ["x"]})).unwrap_err();
        assert!(err.to_string().contains("field 'log'"));
    }

    #[test]
    fn test_fields_sorted() {
        assert_eq!(schema().fields(), vec!["iteration", "log", "status"]);
    }

    proptest! {
        #[test]
        fn prop_append_concatenates_in_order(
            base in prop::collection::vec(any::<i64>(), 0..16),
            update in prop::collection::vec(any::<i64>(), 0..16),
        ) {
            let schema = StateSchema::new().with_field("items", AppendReducer);
            let mut state = State::new();
            state.insert("items".to_string(), json!(base));

            let next = schema.merge(&state, &json!({"items": update})).unwrap();

            let mut expected = base.clone();
            expected.extend(update.iter().copied());
            prop_assert_eq!(&next["items"], &json!(expected));
        }

        #[test]
        fn prop_overwrite_replaces(old in any::<i64>(), new in any::<i64>()) {
            let schema = StateSchema::new().with_field("value", OverwriteReducer);
            let mut state = State::new();
            state.insert("value".to_string(), json!(old));

            let next = schema.merge(&state, &json!({"value": new})).unwrap();
            prop_assert_eq!(&next["value"], &json!(new));
        }

        #[test]
        fn prop_untouched_fields_survive(
            log in prop::collection::vec("[a-z]{1,8}", 0..8),
            status in "[a-z]{1,8}",
        ) {
            let schema = StateSchema::new()
                .with_field("log", AppendReducer)
                .with_field("status", OverwriteReducer);
            let mut state = State::new();
            state.insert("log".to_string(), json!(log));
            state.insert("status".to_string(), json!(status));

            let next = schema.merge(&state, &json!({"status": "x"})).unwrap();
            prop_assert_eq!(&next["log"], &state["log"]);
        }
    }
}
