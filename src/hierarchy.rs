use std::collections::BTreeSet;

use thiserror::Error;

use crate::model::{ClassId, MethodRef, Program};

/// Invariant breaks surfaced by hierarchy queries.
#[derive(Debug, Error)]
pub(crate) enum HierarchyError {
    #[error("class id {0} is not part of the hierarchy index")]
    UnknownClass(ClassId),
    #[error("no override of {name}{descriptor} found from receiver {receiver}")]
    NoOverrideFound {
        name: String,
        descriptor: String,
        receiver: String,
    },
}

/// Precomputed class-hierarchy information: for every class or interface,
/// the concrete classes that could be a run-time receiver when it is the
/// compile-time receiver type.
pub(crate) struct HierarchyIndex<'p> {
    program: &'p Program,
    descendants: Vec<BTreeSet<ClassId>>,
}

impl<'p> HierarchyIndex<'p> {
    /// Build the full descendant mapping in one pass: every concrete class
    /// is propagated upward along its superclass chain and through every
    /// superinterface lattice level.
    pub(crate) fn build(program: &'p Program) -> HierarchyIndex<'p> {
        let mut descendants = vec![BTreeSet::new(); program.classes.len()];
        for (id, class) in program.classes.iter().enumerate() {
            if class.is_concrete() {
                propagate(program, id, id, &mut descendants);
            }
        }
        HierarchyIndex {
            program,
            descendants,
        }
    }

    /// Concrete classes that are `class` or transitively beneath it.
    pub(crate) fn descendants(
        &self,
        class: ClassId,
    ) -> Result<&BTreeSet<ClassId>, HierarchyError> {
        self.descendants
            .get(class)
            .ok_or(HierarchyError::UnknownClass(class))
    }

    /// Simulate run-time virtual dispatch: starting at the receiver class,
    /// walk the superclass chain (never interfaces) and return the first
    /// declared method whose sub-signature matches the static target. The
    /// receiver is checked first, so an override in the concrete class wins.
    ///
    /// A miss cannot happen for receivers drawn from the static target
    /// owner's descendant set; when it does happen the model is inconsistent
    /// and the caller decides how to degrade.
    pub(crate) fn resolve_override(
        &self,
        name: &str,
        descriptor: &str,
        receiver: ClassId,
    ) -> Result<MethodRef, HierarchyError> {
        self.program
            .resolve_declared(receiver, name, descriptor)
            .ok_or_else(|| HierarchyError::NoOverrideFound {
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                receiver: self.program.class(receiver).name.clone(),
            })
    }
}

/// Record `concrete` as a descendant of `ancestor`, then keep climbing. The
/// insertion doubles as memoization: a diamond lattice revisits an ancestor
/// through a second path, finds the class already recorded, and stops.
fn propagate(
    program: &Program,
    concrete: ClassId,
    ancestor: ClassId,
    descendants: &mut [BTreeSet<ClassId>],
) {
    if !descendants[ancestor].insert(concrete) {
        return;
    }
    let class = program.class(ancestor);
    for &interface in &class.interfaces {
        propagate(program, concrete, interface, descendants);
    }
    if let Some(super_class) = class.super_class {
        propagate(program, concrete, super_class, descendants);
    }
}
