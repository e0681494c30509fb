#![allow(dead_code)]

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Method name the JVM gives instance constructors.
pub(crate) const CONSTRUCTOR_NAME: &str = "<init>";
/// Method name the JVM gives static initializers.
pub(crate) const STATIC_INITIALIZER_NAME: &str = "<clinit>";
/// Sub-signature of the finalizer invoked on object destruction.
pub(crate) const FINALIZER_NAME: &str = "finalize";
pub(crate) const FINALIZER_DESCRIPTOR: &str = "()V";
/// Sub-signature of the conventional program entry point.
pub(crate) const ENTRY_NAME: &str = "main";
pub(crate) const ENTRY_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

/// Index of a class within the program model.
pub(crate) type ClassId = usize;

/// Identity of a method: declaring class plus its slot in that class.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub(crate) struct MethodRef {
    pub(crate) class: ClassId,
    pub(crate) index: usize,
}

/// Immutable program model handed over by the upstream representation.
#[derive(Debug)]
pub(crate) struct Program {
    pub(crate) classes: Vec<ClassNode>,
    pub(crate) by_name: HashMap<String, ClassId>,
}

/// A class or interface with its declared methods and hierarchy links.
#[derive(Clone, Debug)]
pub(crate) struct ClassNode {
    pub(crate) name: String,
    pub(crate) is_interface: bool,
    pub(crate) is_abstract: bool,
    /// Superclass when it is part of the model; `None` for the root or for
    /// an unresolved library superclass (the raw name stays in `super_name`).
    pub(crate) super_class: Option<ClassId>,
    pub(crate) super_name: Option<String>,
    pub(crate) interfaces: Vec<ClassId>,
    pub(crate) methods: Vec<MethodNode>,
}

/// A declared method; the body is opaque beyond its call sites.
#[derive(Clone, Debug)]
pub(crate) struct MethodNode {
    pub(crate) name: String,
    pub(crate) descriptor: String,
    pub(crate) is_native: bool,
    pub(crate) is_abstract: bool,
    pub(crate) body: Option<Vec<Stmt>>,
}

/// One statement of a method body: either it carries a call or it does not.
#[derive(Clone, Debug, Default)]
pub(crate) struct Stmt {
    pub(crate) call: Option<CallSite>,
}

/// Call site extracted from a method body.
#[derive(Clone, Debug)]
pub(crate) struct CallSite {
    pub(crate) kind: CallKind,
    pub(crate) owner: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
    /// Static type of the receiver expression; absent for direct calls.
    pub(crate) receiver: Option<String>,
}

/// Call opcode classification used by CHA.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CallKind {
    Virtual,
    Interface,
    Special,
    Static,
}

impl CallKind {
    pub(crate) fn is_direct(self) -> bool {
        matches!(self, CallKind::Static | CallKind::Special)
    }
}

/// Configuration failures raised while locating the entry method.
#[derive(Debug, Error)]
pub(crate) enum EntryError {
    #[error("entry class not found: {0}")]
    ClassNotFound(String),
    #[error("no main([Ljava/lang/String;)V in entry class {0}")]
    MethodNotFound(String),
}

impl ClassNode {
    /// A concrete class can be instantiated and thus be a run-time receiver.
    pub(crate) fn is_concrete(&self) -> bool {
        !self.is_interface && !self.is_abstract
    }

    /// Slot of a declared method matching the given sub-signature.
    pub(crate) fn declared_method(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.methods
            .iter()
            .position(|m| m.name == name && m.descriptor == descriptor)
    }
}

impl Program {
    pub(crate) fn class(&self, id: ClassId) -> &ClassNode {
        &self.classes[id]
    }

    pub(crate) fn class_id(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn method(&self, m: MethodRef) -> &MethodNode {
        &self.classes[m.class].methods[m.index]
    }

    /// Human-readable method label, `owner.name(descriptor)` shape.
    pub(crate) fn describe(&self, m: MethodRef) -> String {
        let class = self.class(m.class);
        let method = self.method(m);
        format!("{}.{}{}", class.name, method.name, method.descriptor)
    }

    /// Resolve a compile-time target against its owner's superclass chain,
    /// matching how the JVM resolves a methodref whose owner inherits the
    /// declaration.
    pub(crate) fn resolve_declared(
        &self,
        owner: ClassId,
        name: &str,
        descriptor: &str,
    ) -> Option<MethodRef> {
        let mut current = Some(owner);
        while let Some(id) = current {
            let class = self.class(id);
            if let Some(index) = class.declared_method(name, descriptor) {
                return Some(MethodRef { class: id, index });
            }
            current = class.super_class;
        }
        None
    }

    /// Locate `main([Ljava/lang/String;)V` on the designated entry class.
    pub(crate) fn entry_method(&self, class_name: &str) -> Result<MethodRef, EntryError> {
        let class = self
            .class_id(class_name)
            .ok_or_else(|| EntryError::ClassNotFound(class_name.to_string()))?;
        let index = self
            .class(class)
            .declared_method(ENTRY_NAME, ENTRY_DESCRIPTOR)
            .ok_or_else(|| EntryError::MethodNotFound(class_name.to_string()))?;
        Ok(MethodRef { class, index })
    }
}

/// Classes shipped with the runtime rather than the analyzed application.
pub(crate) fn is_library_class(name: &str) -> bool {
    name.starts_with("java/") || name.starts_with("javax/") || name.starts_with("sun/")
}
