//! Dynamic classes, enumerations, and instances
//!
//! Ferry classes are runtime objects: defined by executing code, mutated in
//! place, and referenced by identity. A class body is an ordered member dict
//! so that a class can be created empty (a skeleton) and filled afterwards,
//! the construction order the serialization engine depends on to break
//! method-closes-over-class cycles.

use crate::value::{next_object_id, Value};
use parking_lot::Mutex;
use std::sync::Arc;

/// What flavor of type object this is
///
/// Dispatch over dynamic types is a capability check over this closed tag
/// set, not exact-type matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// Ordinary class
    Plain,
    /// Enumeration; members are instances attached as class attributes
    Enum,
    /// Process-special singleton class; always reference-encoded
    Singleton,
}

/// A runtime class object
#[derive(Debug)]
pub struct ClassObject {
    /// Unique object ID
    pub object_id: u64,
    /// Class flavor
    pub kind: ClassKind,
    /// Class name
    pub name: String,
    /// Dotted qualified name within the defining module
    pub qualname: String,
    /// Name of the defining module, if any
    pub module: Option<String>,
    /// Base classes, fixed at construction
    pub bases: Vec<Arc<ClassObject>>,
    /// Ordered member dict; empty in a skeleton, filled in place
    members: Mutex<Vec<(String, Value)>>,
    /// Names of enum members, in definition order
    enum_member_names: Mutex<Vec<String>>,
}

impl ClassObject {
    /// Create a class object (with an empty body)
    pub fn new(
        kind: ClassKind,
        name: impl Into<String>,
        qualname: impl Into<String>,
        module: Option<String>,
        bases: Vec<Arc<ClassObject>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            kind,
            name: name.into(),
            qualname: qualname.into(),
            module,
            bases,
            members: Mutex::new(Vec::new()),
            enum_member_names: Mutex::new(Vec::new()),
        })
    }

    /// True for enumeration classes
    pub fn is_enum(&self) -> bool {
        self.kind == ClassKind::Enum
    }

    /// Set or replace a member of this class's own body
    pub fn set_member(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut members = self.members.lock();
        if let Some(entry) = members.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            members.push((name, value));
        }
    }

    /// Remove a member from this class's own body
    pub fn remove_member(&self, name: &str) -> Option<Value> {
        let mut members = self.members.lock();
        let pos = members.iter().position(|(k, _)| k == name)?;
        Some(members.remove(pos).1)
    }

    /// Member of this class's own body (bases not consulted)
    pub fn get_own_member(&self, name: &str) -> Option<Value> {
        self.members
            .lock()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    /// Snapshot of this class's own body in definition order
    pub fn own_members(&self) -> Vec<(String, Value)> {
        self.members.lock().clone()
    }

    /// Attribute lookup: own body first, then bases depth-first
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.get_own_member(name) {
            return Some(value);
        }
        for base in &self.bases {
            if let Some(value) = base.lookup(name) {
                return Some(value);
            }
        }
        None
    }

    /// Record `name` as an enum member (in definition order)
    pub fn mark_enum_member(&self, name: &str) {
        let mut names = self.enum_member_names.lock();
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }

    /// Enum member names in definition order
    pub fn enum_member_names(&self) -> Vec<String> {
        self.enum_member_names.lock().clone()
    }

    /// Enum members in definition order
    pub fn enum_members(&self) -> Vec<(String, Value)> {
        self.enum_member_names()
            .into_iter()
            .filter_map(|name| self.get_own_member(&name).map(|v| (name, v)))
            .collect()
    }
}

/// An instance of a runtime class
#[derive(Debug)]
pub struct Instance {
    /// Unique object ID
    pub object_id: u64,
    /// The instance's class
    pub class: Arc<ClassObject>,
    /// Ordered field map
    fields: Mutex<Vec<(String, Value)>>,
}

impl Instance {
    /// Create an instance with no fields
    pub fn new(class: &Arc<ClassObject>) -> Arc<Self> {
        Arc::new(Self {
            object_id: next_object_id(),
            class: Arc::clone(class),
            fields: Mutex::new(Vec::new()),
        })
    }

    /// Get a field
    pub fn get_field(&self, name: &str) -> Option<Value> {
        self.fields
            .lock()
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    /// Set or replace a field
    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        let mut fields = self.fields.lock();
        if let Some(entry) = fields.iter_mut().find(|(k, _)| *k == name) {
            entry.1 = value;
        } else {
            fields.push((name, value));
        }
    }

    /// Snapshot of the fields in insertion order
    pub fn fields(&self) -> Vec<(String, Value)> {
        self.fields.lock().clone()
    }
}
