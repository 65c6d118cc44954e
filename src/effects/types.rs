//! Effect parameter types
//!
//! A `Parameter` is a named, typed, bounded value shared between the control
//! surface (any thread) and the effect that owns it (render thread). Every
//! successful mutation runs the parameter's delegate, which forwards the new
//! value to shader state, and then notifies registered listeners.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Errors raised by parameter operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("value {value} for '{name}' is outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: ParameterValue,
        min: ParameterValue,
        max: ParameterValue,
    },
    #[error("parameter '{name}' is {expected:?}, got {actual:?}")]
    TypeMismatch {
        name: String,
        expected: ParameterKind,
        actual: ParameterKind,
    },
    #[error("duplicate parameter name '{0}'")]
    DuplicateName(String),
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
}

/// Semantic type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    Float,
    Int,
    Bool,
    Choice,
}

/// A parameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ParameterValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    /// Index into the parameter's option labels
    Choice(usize),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Float(_) => ParameterKind::Float,
            ParameterValue::Int(_) => ParameterKind::Int,
            ParameterValue::Bool(_) => ParameterKind::Bool,
            ParameterValue::Choice(_) => ParameterKind::Choice,
        }
    }

    /// Get the value as f32 (booleans map to 0.0/1.0)
    pub fn as_f32(&self) -> f32 {
        match self {
            ParameterValue::Float(v) => *v,
            ParameterValue::Int(v) => *v as f32,
            ParameterValue::Bool(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            ParameterValue::Choice(i) => *i as f32,
        }
    }

    /// Get the value as i32 (floats are truncated)
    pub fn as_i32(&self) -> i32 {
        match self {
            ParameterValue::Float(v) => *v as i32,
            ParameterValue::Int(v) => *v,
            ParameterValue::Bool(v) => *v as i32,
            ParameterValue::Choice(i) => *i as i32,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            ParameterValue::Float(v) => *v != 0.0,
            ParameterValue::Int(v) => *v != 0,
            ParameterValue::Bool(v) => *v,
            ParameterValue::Choice(i) => *i != 0,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Bool(v) => write!(f, "{}", v),
            ParameterValue::Choice(i) => write!(f, "#{}", i),
        }
    }
}

/// What `set_value` does with out-of-range input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangePolicy {
    /// Fail with `OutOfRange`, keeping the current value
    #[default]
    Reject,
    /// Clamp into `[min, max]`
    Clamp,
}

/// Forwards a new value to shader state.
///
/// Runs while the parameter's state lock is held and must not call back into
/// the parameter.
pub type Delegate = Box<dyn Fn(&ParameterValue) + Send + Sync>;

/// Observer called after every successful mutation with the parameter name
/// and its new value
pub type Listener = Arc<dyn Fn(&str, &ParameterValue) + Send + Sync>;

/// Identifies a registered listener for removal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Serializable snapshot of a parameter for control surfaces
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: ParameterKind,
    pub min: ParameterValue,
    pub max: ParameterValue,
    pub default: ParameterValue,
    pub value: ParameterValue,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

struct ParameterState {
    value: ParameterValue,
    policy: RangePolicy,
}

/// A named, typed, bounded, observable value bound to shader state.
pub struct Parameter {
    name: String,
    description: Option<String>,
    kind: ParameterKind,
    min: ParameterValue,
    max: ParameterValue,
    default: ParameterValue,
    options: Vec<String>,
    state: Mutex<ParameterState>,
    delegate: Option<Delegate>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
}

impl Parameter {
    fn new(
        name: impl Into<String>,
        kind: ParameterKind,
        min: ParameterValue,
        max: ParameterValue,
        default: ParameterValue,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            kind,
            min,
            max,
            default,
            options: Vec::new(),
            state: Mutex::new(ParameterState {
                value: default,
                policy: RangePolicy::default(),
            }),
            delegate: None,
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Create a float parameter. `default` is clamped into `[min, max]`.
    pub fn float(name: impl Into<String>, min: f32, max: f32, default: f32) -> Self {
        debug_assert!(min <= max);
        Self::new(
            name,
            ParameterKind::Float,
            ParameterValue::Float(min),
            ParameterValue::Float(max),
            ParameterValue::Float(default.clamp(min, max)),
        )
    }

    /// Create an integer parameter. `default` is clamped into `[min, max]`.
    pub fn int(name: impl Into<String>, min: i32, max: i32, default: i32) -> Self {
        debug_assert!(min <= max);
        Self::new(
            name,
            ParameterKind::Int,
            ParameterValue::Int(min),
            ParameterValue::Int(max),
            ParameterValue::Int(default.clamp(min, max)),
        )
    }

    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::new(
            name,
            ParameterKind::Bool,
            ParameterValue::Bool(false),
            ParameterValue::Bool(true),
            ParameterValue::Bool(default),
        )
    }

    /// Create a choice parameter over `options`, selecting `default`.
    pub fn choice<S: Into<String>>(
        name: impl Into<String>,
        options: impl IntoIterator<Item = S>,
        default: usize,
    ) -> Self {
        let options: Vec<String> = options.into_iter().map(Into::into).collect();
        debug_assert!(!options.is_empty());
        let last = options.len().saturating_sub(1);
        let mut parameter = Self::new(
            name,
            ParameterKind::Choice,
            ParameterValue::Choice(0),
            ParameterValue::Choice(last),
            ParameterValue::Choice(default.min(last)),
        );
        parameter.options = options;
        parameter
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_delegate(mut self, delegate: impl Fn(&ParameterValue) + Send + Sync + 'static) -> Self {
        self.delegate = Some(Box::new(delegate));
        self
    }

    pub fn with_policy(self, policy: RangePolicy) -> Self {
        self.state.lock().policy = policy;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn min(&self) -> ParameterValue {
        self.min
    }

    pub fn max(&self) -> ParameterValue {
        self.max
    }

    pub fn default_value(&self) -> ParameterValue {
        self.default
    }

    pub fn options(&self) -> &[String] {
        &self.options
    }

    pub fn value(&self) -> ParameterValue {
        self.state.lock().value
    }

    pub fn policy(&self) -> RangePolicy {
        self.state.lock().policy
    }

    pub fn set_policy(&self, policy: RangePolicy) {
        self.state.lock().policy = policy;
    }

    /// Check type and range of `value`, applying `policy`.
    fn validate(&self, value: ParameterValue, policy: RangePolicy) -> Result<ParameterValue, ParameterError> {
        if value.kind() != self.kind {
            return Err(ParameterError::TypeMismatch {
                name: self.name.clone(),
                expected: self.kind,
                actual: value.kind(),
            });
        }

        let out_of_range = || ParameterError::OutOfRange {
            name: self.name.clone(),
            value,
            min: self.min,
            max: self.max,
        };

        match (value, self.min, self.max) {
            (ParameterValue::Float(v), ParameterValue::Float(min), ParameterValue::Float(max)) => {
                if v.is_nan() {
                    return Err(out_of_range());
                }
                if (min..=max).contains(&v) {
                    Ok(value)
                } else if policy == RangePolicy::Clamp {
                    Ok(ParameterValue::Float(v.clamp(min, max)))
                } else {
                    Err(out_of_range())
                }
            }
            (ParameterValue::Int(v), ParameterValue::Int(min), ParameterValue::Int(max)) => {
                if (min..=max).contains(&v) {
                    Ok(value)
                } else if policy == RangePolicy::Clamp {
                    Ok(ParameterValue::Int(v.clamp(min, max)))
                } else {
                    Err(out_of_range())
                }
            }
            (ParameterValue::Choice(i), ParameterValue::Choice(min), ParameterValue::Choice(max)) => {
                if (min..=max).contains(&i) {
                    Ok(value)
                } else if policy == RangePolicy::Clamp {
                    Ok(ParameterValue::Choice(i.clamp(min, max)))
                } else {
                    Err(out_of_range())
                }
            }
            _ => Ok(value),
        }
    }

    /// Set a new value, returning the value actually stored.
    ///
    /// On success the delegate runs with the new value, then listeners are
    /// notified. On failure nothing changes.
    pub fn set_value(&self, value: ParameterValue) -> Result<ParameterValue, ParameterError> {
        let stored = {
            let mut state = self.state.lock();
            let stored = self.validate(value, state.policy)?;
            state.value = stored;
            // Under the lock, so shader state sees writes in commit order
            self.deliver(&stored);
            stored
        };

        self.notify(&stored);
        Ok(stored)
    }

    pub fn set_float(&self, value: f32) -> Result<ParameterValue, ParameterError> {
        self.set_value(ParameterValue::Float(value))
    }

    pub fn set_int(&self, value: i32) -> Result<ParameterValue, ParameterError> {
        self.set_value(ParameterValue::Int(value))
    }

    pub fn set_bool(&self, value: bool) -> Result<ParameterValue, ParameterError> {
        self.set_value(ParameterValue::Bool(value))
    }

    pub fn set_choice(&self, index: usize) -> Result<ParameterValue, ParameterError> {
        self.set_value(ParameterValue::Choice(index))
    }

    /// Select a choice by its label.
    pub fn set_choice_label(&self, label: &str) -> Result<ParameterValue, ParameterError> {
        let index = self
            .options
            .iter()
            .position(|option| option.eq_ignore_ascii_case(label))
            .ok_or_else(|| ParameterError::UnknownParameter(format!("{}: {}", self.name, label)))?;
        self.set_choice(index)
    }

    /// Restore the default value. Runs the delegate and listeners.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            state.value = self.default;
            self.deliver(&self.default);
        }
        self.notify(&self.default);
    }

    /// Run the delegate with the current value without notifying listeners.
    ///
    /// Used when the owning effect rebuilds its shader state.
    pub fn replay(&self) {
        let state = self.state.lock();
        self.deliver(&state.value);
    }

    fn deliver(&self, value: &ParameterValue) {
        if let Some(delegate) = &self.delegate {
            delegate(value);
        }
    }

    pub fn add_listener(&self, listener: impl Fn(&str, &ParameterValue) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns false if no listener with this id was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    fn notify(&self, value: &ParameterValue) {
        // Listeners may touch this parameter again, so call them unlocked
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(&self.name, value);
        }
    }

    pub fn info(&self) -> ParameterInfo {
        ParameterInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            kind: self.kind,
            min: self.min,
            max: self.max,
            default: self.default,
            value: self.value(),
            options: self.options.clone(),
        }
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("value", &self.value())
            .finish()
    }
}

/// Insertion-ordered, name-unique collection of parameters
#[derive(Debug, Default, Clone)]
pub struct ParameterSet {
    parameters: Vec<Arc<Parameter>>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, rejecting a name already in the set.
    pub fn add(&mut self, parameter: Parameter) -> Result<Arc<Parameter>, ParameterError> {
        self.add_shared(Arc::new(parameter))
    }

    /// Add a parameter already shared with another set.
    pub fn add_shared(&mut self, parameter: Arc<Parameter>) -> Result<Arc<Parameter>, ParameterError> {
        if self.get(parameter.name()).is_some() {
            return Err(ParameterError::DuplicateName(parameter.name().to_string()));
        }
        self.parameters.push(Arc::clone(&parameter));
        Ok(parameter)
    }

    /// Add every parameter of `other`, failing on the first duplicate.
    pub fn extend_from(&mut self, other: &ParameterSet) -> Result<(), ParameterError> {
        for parameter in other.iter() {
            self.add_shared(Arc::clone(parameter))?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Parameter>> {
        self.parameters.iter().find(|p| p.name() == name)
    }

    /// Set a parameter by name.
    pub fn set(&self, name: &str, value: ParameterValue) -> Result<ParameterValue, ParameterError> {
        self.get(name)
            .ok_or_else(|| ParameterError::UnknownParameter(name.to_string()))?
            .set_value(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Parameter>> {
        self.parameters.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name())
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn reset_all(&self) {
        for parameter in &self.parameters {
            parameter.reset();
        }
    }

    pub fn replay_all(&self) {
        for parameter in &self.parameters {
            parameter.replay();
        }
    }

    pub fn set_policy(&self, policy: RangePolicy) {
        for parameter in &self.parameters {
            parameter.set_policy(policy);
        }
    }

    pub fn infos(&self) -> Vec<ParameterInfo> {
        self.parameters.iter().map(|p| p.info()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_reset_matches_default_after_mutation() {
        let param = Parameter::float("Contrast", 0.0, 5.0, 1.0);
        param.set_float(2.5).unwrap();
        param.set_float(0.25).unwrap();
        param.reset();
        assert_eq!(param.value(), ParameterValue::Float(1.0));
        assert_eq!(param.value(), param.default_value());

        param.set_float(3.0).unwrap();
        param.set_value(param.default_value()).unwrap();
        assert_eq!(param.value(), ParameterValue::Float(1.0));
    }

    #[test]
    fn test_out_of_range_rejected_by_default() {
        let param = Parameter::int("Mode", 0, 3, 1);
        let err = param.set_int(4).unwrap_err();
        assert!(matches!(err, ParameterError::OutOfRange { .. }));
        assert_eq!(param.value(), ParameterValue::Int(1));

        let param = Parameter::float("Sigma", 0.0, 10.0, 2.0);
        assert!(param.set_float(f32::NAN).is_err());
        assert!(param.set_float(-0.1).is_err());
        assert_eq!(param.value(), ParameterValue::Float(2.0));
    }

    #[test]
    fn test_clamp_policy() {
        let param = Parameter::float("Brightness", 0.0, 5.0, 1.0).with_policy(RangePolicy::Clamp);
        assert_eq!(param.set_float(9.0).unwrap(), ParameterValue::Float(5.0));
        assert_eq!(param.value(), ParameterValue::Float(5.0));
    }

    #[test]
    fn test_type_mismatch() {
        let param = Parameter::bool("Edges", true);
        let err = param.set_float(1.0).unwrap_err();
        assert!(matches!(err, ParameterError::TypeMismatch { .. }));
        assert_eq!(param.value(), ParameterValue::Bool(true));
    }

    #[test]
    fn test_delegate_runs_before_listeners() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let delegate_order = Arc::clone(&order);
        let param = Parameter::float("Contrast", 0.0, 5.0, 1.0)
            .with_delegate(move |v| delegate_order.lock().push(format!("delegate {}", v)));
        let listener_order = Arc::clone(&order);
        param.add_listener(move |name, v| listener_order.lock().push(format!("{} {}", name, v)));

        param.set_float(2.0).unwrap();
        assert_eq!(*order.lock(), vec!["delegate 2", "Contrast 2"]);

        // Failed sets do not reach either
        let _ = param.set_float(6.0);
        assert_eq!(order.lock().len(), 2);
    }

    #[test]
    fn test_reset_invokes_delegate_and_listeners() {
        let calls = Arc::new(AtomicUsize::new(0));
        let delegate_calls = Arc::clone(&calls);
        let param = Parameter::int("Mode", 0, 3, 1).with_delegate(move |_| {
            delegate_calls.fetch_add(1, Ordering::SeqCst);
        });
        let notified = Arc::new(AtomicUsize::new(0));
        let listener_notified = Arc::clone(&notified);
        param.add_listener(move |_, _| {
            listener_notified.fetch_add(1, Ordering::SeqCst);
        });

        param.reset();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        param.replay();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_can_read_parameter() {
        let param = Arc::new(Parameter::float("Sigma", 0.0, 10.0, 2.0));
        let seen = Arc::new(Mutex::new(None));
        let weak = Arc::downgrade(&param);
        let listener_seen = Arc::clone(&seen);
        param.add_listener(move |_, _| {
            if let Some(param) = weak.upgrade() {
                *listener_seen.lock() = Some(param.value());
            }
        });
        param.set_float(4.0).unwrap();
        assert_eq!(*seen.lock(), Some(ParameterValue::Float(4.0)));
    }

    #[test]
    fn test_remove_listener() {
        let param = Parameter::bool("Edges", true);
        let id = param.add_listener(|_, _| {});
        assert!(param.remove_listener(id));
        assert!(!param.remove_listener(id));
    }

    #[test]
    fn test_choice_by_label() {
        let param = Parameter::choice("Color", ["White", "Red", "Green"], 0);
        param.set_choice_label("green").unwrap();
        assert_eq!(param.value(), ParameterValue::Choice(2));
        assert!(param.set_choice(3).is_err());
        assert_eq!(param.max(), ParameterValue::Choice(2));
    }

    #[test]
    fn test_parameter_set_rejects_duplicates() {
        let mut set = ParameterSet::new();
        set.add(Parameter::float("Contrast", 0.0, 5.0, 1.0)).unwrap();
        set.add(Parameter::float("Brightness", 0.0, 5.0, 1.0)).unwrap();
        let err = set.add(Parameter::float("Contrast", 0.0, 1.0, 0.5)).unwrap_err();
        assert_eq!(err, ParameterError::DuplicateName("Contrast".into()));
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["Contrast", "Brightness"]);
    }

    #[test]
    fn test_parameter_set_unknown_name() {
        let set = ParameterSet::new();
        assert_eq!(
            set.set("Missing", ParameterValue::Float(1.0)).unwrap_err(),
            ParameterError::UnknownParameter("Missing".into())
        );
    }

    #[test]
    fn test_info_serializes_for_control_surfaces() {
        let param = Parameter::choice("Color", ["White", "Red"], 1).with_description("Tint color");
        let json = serde_json::to_value(param.info()).unwrap();
        assert_eq!(json["name"], "Color");
        assert_eq!(json["kind"], "Choice");
        assert_eq!(json["value"]["type"], "Choice");
        assert_eq!(json["value"]["value"], 1);
        assert_eq!(json["options"][1], "Red");

        let json = serde_json::to_value(Parameter::float("Sigma", 0.0, 10.0, 2.0).info()).unwrap();
        assert!(json.get("options").is_none());
        assert!(json.get("description").is_none());
    }

    #[test]
    fn test_parameter_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Parameter>();
        assert_send_sync::<ParameterSet>();
    }
}
