//! Two-phase class reconstruction
//!
//! A dynamic class cannot be rebuilt in one step: its methods may close over
//! the class itself, so the class object must exist, referenceable but
//! body-less, before its body is decoded. The builder makes that explicit:
//! `begin` produces a registered skeleton, `commit` fills its body in place.

use crate::error::DecodeError;
use crate::tracker::{ClassTracker, TrackingId};
use ferry_runtime::{ClassKind, ClassObject, Instance, Value};
use std::sync::Arc;

/// Everything a skeleton needs before its body exists
#[derive(Debug)]
pub struct ClassShape {
    /// Plain class or enumeration
    pub kind: ClassKind,
    /// Class name
    pub name: String,
    /// Dotted qualified name
    pub qualname: String,
    /// Defining module name, if any
    pub module: Option<String>,
    /// Base classes (already reconstructed)
    pub bases: Vec<Arc<ClassObject>>,
    /// Enum members as (name, raw value) pairs; empty for plain classes
    pub members: Vec<(String, Value)>,
}

/// Begin reconstruction: build a body-less shell and register it under the
/// carried tracking id
///
/// If the destination tracker already holds a live class under `id`, the
/// SKELETON and FILL phases are skipped: the existing object is returned
/// with `false`, guaranteeing reference-equality for repeated occurrences of
/// the same dynamic type in this process. A live class of incompatible
/// shape under the same id is a hard failure.
pub fn begin(
    tracker: &ClassTracker,
    shape: ClassShape,
    id: TrackingId,
) -> Result<(Arc<ClassObject>, bool), DecodeError> {
    if let Some(existing) = tracker.lookup(id) {
        if existing.kind != shape.kind || existing.name != shape.name {
            return Err(DecodeError::TrackerConflict { id: id.to_string() });
        }
        log::debug!("dedup: reusing class '{}' for {id}", existing.qualname);
        return Ok((existing, false));
    }

    let class = ClassObject::new(
        shape.kind,
        shape.name,
        shape.qualname,
        shape.module,
        shape.bases,
    );

    // Enum members are part of the skeleton: the member-construction
    // sequence needs only name/value pairs, and methods decoded during FILL
    // may already reference them.
    for (name, value) in shape.members {
        make_enum_member(&class, &name, value);
    }

    tracker
        .register(id, &class)
        .map_err(|id| DecodeError::TrackerConflict { id: id.to_string() })?;
    Ok((class, true))
}

/// Fill a skeleton's body in place
pub fn commit(class: &Arc<ClassObject>, body: Vec<(String, Value)>) {
    for (name, value) in body {
        class.set_member(name, value);
    }
}

/// Dedicated enum-member construction: bind the name/value pair on a fresh
/// instance of the enum class, then attach it as a class attribute.
pub fn make_enum_member(class: &Arc<ClassObject>, name: &str, value: Value) -> Arc<Instance> {
    let member = Instance::new(class);
    member.set_field("name", Value::str(name));
    member.set_field("value", value);
    class.set_member(name, Value::Instance(Arc::clone(&member)));
    class.mark_enum_member(name);
    member
}

/// Encode-side companion: a class's own body minus what it inherits
/// unchanged
///
/// With exactly one base, entries whose value is identical (by identity) to
/// the base's entry of the same name are dropped; they will be found
/// through the base after reconstruction. Enum member entries are also
/// dropped: they travel in the skeleton, not the body.
pub fn extract_class_members(class: &ClassObject) -> Vec<(String, Value)> {
    let member_names = class.enum_member_names();
    let single_base = match class.bases.as_slice() {
        [base] => Some(base),
        _ => None,
    };

    class
        .own_members()
        .into_iter()
        .filter(|(name, value)| {
            if member_names.iter().any(|m| m == name) {
                return false;
            }
            match single_base {
                Some(base) => !base
                    .get_own_member(name)
                    .is_some_and(|inherited| inherited.is(value)),
                None => true,
            }
        })
        .collect()
}
