//! Binding Registry: every top-level name a component's logic declares,
//! tagged with how it is bound (prop, local, module-local, store value).
//!
//! The registry is the single owner of the dirty-set: any successful write
//! records the name as changed-since-last-flush. The scheduler drains the
//! dirty-set; the registry never schedules anything itself.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::HashSet;

use crate::validate::{
    RuntimeError, INV_DUPLICATE_BINDING, INV_INVALID_BINDING_NAME, INV_READONLY_BINDING,
    INV_UNKNOWN_BINDING,
};

lazy_static! {
    static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// Opaque runtime value. `Undefined` is distinct from JSON `null`: a prop
/// instantiated without a value is `Undefined`, never `null`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Undefined,
    Data(serde_json::Value),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Undefined => None,
            Value::Data(v) => Some(v),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.data().and_then(|v| v.as_i64())
    }

    pub fn as_str(&self) -> Option<&str> {
        self.data().and_then(|v| v.as_str())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Data(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Data(serde_json::Value::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Data(serde_json::Value::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Data(serde_json::Value::from(v))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingKind {
    Prop,
    Local,
    ModuleLocal,
    /// The `$`-prefixed view of a store: written only by the subscription
    /// callback, never directly by user code.
    StoreValue,
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub kind: BindingKind,
    pub value: Value,
    pub writable: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
pub struct BindingRegistry {
    component: String,
    bindings: HashMap<String, Binding>,
    dirty: HashSet<String>,
}

impl BindingRegistry {
    pub fn new(component: &str) -> Self {
        BindingRegistry {
            component: component.to_string(),
            ..Default::default()
        }
    }

    pub fn declare(
        &mut self,
        name: &str,
        kind: BindingKind,
        initial: Value,
        writable: bool,
    ) -> Result<(), RuntimeError> {
        if !IDENT_RE.is_match(name) {
            return Err(RuntimeError::with_binding(
                INV_INVALID_BINDING_NAME,
                &format!("\"{}\" is not a valid binding name.", name),
                &self.component,
                name,
            ));
        }
        if self.bindings.contains_key(name) {
            return Err(RuntimeError::with_binding(
                INV_DUPLICATE_BINDING,
                &format!("Binding \"{}\" is already declared in this scope.", name),
                &self.component,
                name,
            ));
        }
        self.bindings.insert(
            name.to_string(),
            Binding {
                name: name.to_string(),
                kind,
                value: initial,
                writable,
            },
        );
        Ok(())
    }

    pub fn has(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> Option<BindingKind> {
        self.bindings.get(name).map(|b| b.kind)
    }

    pub fn read(&self, name: &str) -> Result<Value, RuntimeError> {
        match self.bindings.get(name) {
            Some(binding) => Ok(binding.value.clone()),
            None => Err(self.unknown(name)),
        }
    }

    /// Writes a value and records the name in the dirty-set. Fails on
    /// non-writable bindings; store-value routing is the caller's job.
    pub fn write(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        if !self.bindings.contains_key(name) {
            return Err(self.unknown(name));
        }
        if !self.bindings[name].writable {
            return Err(RuntimeError::with_binding(
                INV_READONLY_BINDING,
                &format!("Cannot assign to read-only binding \"{}\".", name),
                &self.component,
                name,
            ));
        }
        if let Some(binding) = self.bindings.get_mut(name) {
            binding.value = value;
        }
        self.dirty.insert(name.to_string());
        Ok(())
    }

    pub fn dirty(&self) -> &HashSet<String> {
        &self.dirty
    }

    pub fn mark_dirty(&mut self, name: &str) {
        self.dirty.insert(name.to_string());
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty.contains(name)
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Marks every declared binding dirty. Used for the mount flush, where
    /// all initial values count as fresh.
    pub fn mark_all_dirty(&mut self) {
        let names: Vec<String> = self.bindings.keys().cloned().collect();
        self.dirty.extend(names);
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.bindings.keys()
    }

    fn unknown(&self, name: &str) -> RuntimeError {
        RuntimeError::with_binding(
            INV_UNKNOWN_BINDING,
            &format!("Unknown binding \"{}\".", name),
            &self.component,
            name,
        )
    }
}
