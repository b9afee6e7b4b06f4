// Connector arguments
//
// Each connector advertises its configuration surface as a map of typed,
// named arguments. A front end can render the map without knowing the
// connector, and every value that goes in is checked by the argument's own
// validity rule.

use crate::connect::error::{ConnectError, ConnectResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// Canonical boolean tokens
pub const TRUE_TOKEN: &str = "true";
pub const FALSE_TOKEN: &str = "false";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ArgumentKind {
    String,
    Boolean,
    Integer { min: i32, max: i32 },
    Selected { choices: Vec<String> },
}

impl ArgumentKind {
    /// Pure predicate, no side effects
    pub fn accepts(&self, candidate: &str) -> bool {
        match self {
            ArgumentKind::String => true,
            ArgumentKind::Boolean => candidate == TRUE_TOKEN || candidate == FALSE_TOKEN,
            ArgumentKind::Integer { min, max } => candidate
                .parse::<i32>()
                .map(|v| *min <= v && v <= *max)
                .unwrap_or(false),
            ArgumentKind::Selected { choices } => choices.iter().any(|c| c == candidate),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Argument {
    name: String,
    label: String,
    description: String,
    must_specify: bool,
    #[serde(flatten)]
    kind: ArgumentKind,
    value: Option<String>,
}

impl Argument {
    fn new(name: &str, label: &str, description: &str, kind: ArgumentKind) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            description: description.to_string(),
            must_specify: false,
            kind,
            value: None,
        }
    }

    pub fn string(name: &str, label: &str, description: &str) -> Self {
        Self::new(name, label, description, ArgumentKind::String)
    }

    pub fn boolean(name: &str, label: &str, description: &str) -> Self {
        Self::new(name, label, description, ArgumentKind::Boolean)
    }

    pub fn integer(name: &str, label: &str, description: &str, min: i32, max: i32) -> Self {
        Self::new(name, label, description, ArgumentKind::Integer { min, max })
    }

    pub fn selected<I, S>(name: &str, label: &str, description: &str, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let choices = choices.into_iter().map(Into::into).collect();
        Self::new(name, label, description, ArgumentKind::Selected { choices })
    }

    /// Mark the argument as one that needs a value before use
    pub fn required(mut self) -> Self {
        self.must_specify = true;
        self
    }

    /// Default value carried by a freshly built argument map
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn must_specify(&self) -> bool {
        self.must_specify
    }

    pub fn kind(&self) -> &ArgumentKind {
        &self.kind
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn is_valid(&self, candidate: &str) -> bool {
        self.kind.accepts(candidate)
    }

    /// Set the value, rejecting anything `is_valid` refuses
    ///
    /// On failure the previous value is left untouched.
    pub fn set_value(&mut self, value: impl Into<String>) -> ConnectResult<()> {
        let value = value.into();
        if !self.is_valid(&value) {
            return Err(ConnectError::illegal(&self.name));
        }
        self.value = Some(value);
        Ok(())
    }

    pub fn clear_value(&mut self) {
        self.value = None;
    }

    /// Required arguments are set, and whatever is set is valid
    pub fn is_satisfied(&self) -> bool {
        match &self.value {
            Some(value) => self.is_valid(value),
            None => !self.must_specify,
        }
    }

    pub fn string_value_of(value: bool) -> &'static str {
        if value {
            TRUE_TOKEN
        } else {
            FALSE_TOKEN
        }
    }

    pub fn boolean_value(&self) -> Option<bool> {
        match (&self.kind, self.value.as_deref()) {
            (ArgumentKind::Boolean, Some(TRUE_TOKEN)) => Some(true),
            (ArgumentKind::Boolean, Some(FALSE_TOKEN)) => Some(false),
            _ => None,
        }
    }

    pub fn set_boolean_value(&mut self, value: bool) -> ConnectResult<()> {
        if self.kind != ArgumentKind::Boolean {
            return Err(ConnectError::illegal(&self.name));
        }
        self.set_value(Self::string_value_of(value))
    }

    pub fn int_value(&self) -> Option<i32> {
        match &self.kind {
            ArgumentKind::Integer { .. } => self.value.as_deref().and_then(|v| v.parse().ok()),
            _ => None,
        }
    }

    pub fn set_int_value(&mut self, value: i32) -> ConnectResult<()> {
        if !matches!(self.kind, ArgumentKind::Integer { .. }) {
            return Err(ConnectError::illegal(&self.name));
        }
        self.set_value(value.to_string())
    }

    pub fn min(&self) -> Option<i32> {
        match self.kind {
            ArgumentKind::Integer { min, .. } => Some(min),
            _ => None,
        }
    }

    pub fn max(&self) -> Option<i32> {
        match self.kind {
            ArgumentKind::Integer { max, .. } => Some(max),
            _ => None,
        }
    }

    pub fn choices(&self) -> Option<&[String]> {
        match &self.kind {
            ArgumentKind::Selected { choices } => Some(choices),
            _ => None,
        }
    }
}

/// A connector's argument map
///
/// The key set is fixed when the map is built. Values can be changed, keys
/// can not be added or removed.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Arguments {
    args: BTreeMap<String, Argument>,
}

impl FromIterator<Argument> for Arguments {
    fn from_iter<I: IntoIterator<Item = Argument>>(iter: I) -> Self {
        Self {
            args: iter
                .into_iter()
                .map(|arg| (arg.name.clone(), arg))
                .collect(),
        }
    }
}

impl Arguments {
    pub fn get(&self, name: &str) -> Option<&Argument> {
        self.args.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Argument> {
        self.args.get_mut(name)
    }

    /// Set one value by name; unknown names are reported like invalid values
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> ConnectResult<()> {
        self.args
            .get_mut(name)
            .ok_or_else(|| ConnectError::illegal(name))?
            .set_value(value)
    }

    /// Apply several values, reporting every rejected name at once
    ///
    /// Accepted values stay applied even when others are rejected.
    pub fn apply<I, K, V>(&mut self, values: I) -> ConnectResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut rejected = Vec::new();
        for (name, value) in values {
            let name = name.as_ref();
            if self.set(name, value).is_err() {
                rejected.push(name.to_string());
            }
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(ConnectError::IllegalArguments(rejected))
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.args.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Argument> {
        self.args.values()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn has_same_keys(&self, other: &Arguments) -> bool {
        self.keys().eq(other.keys())
    }

    /// Check every argument, naming all that are missing or invalid
    pub fn validate(&self) -> ConnectResult<()> {
        let offending: Vec<String> = self
            .iter()
            .filter(|arg| !arg.is_satisfied())
            .map(|arg| arg.name.clone())
            .collect();

        if offending.is_empty() {
            Ok(())
        } else {
            Err(ConnectError::IllegalArguments(offending))
        }
    }

    fn argument(&self, name: &str) -> ConnectResult<&Argument> {
        self.get(name).ok_or_else(|| ConnectError::illegal(name))
    }

    /// Current value, with empty strings read as unset
    pub fn string(&self, name: &str) -> ConnectResult<Option<&str>> {
        Ok(self.argument(name)?.value().filter(|v| !v.is_empty()))
    }

    pub fn int(&self, name: &str) -> ConnectResult<Option<i32>> {
        let arg = self.argument(name)?;
        match arg.value() {
            None => Ok(None),
            Some(_) => arg
                .int_value()
                .map(Some)
                .ok_or_else(|| ConnectError::illegal(name)),
        }
    }

    pub fn boolean(&self, name: &str) -> ConnectResult<Option<bool>> {
        let arg = self.argument(name)?;
        match arg.value() {
            None => Ok(None),
            Some(_) => arg
                .boolean_value()
                .map(Some)
                .ok_or_else(|| ConnectError::illegal(name)),
        }
    }
}
