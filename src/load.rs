use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{CallKind, CallSite, ClassNode, MethodNode, Program, Stmt};

/// Serialized program model as emitted by the upstream bytecode frontend.
#[derive(Deserialize)]
struct RawProgram {
    classes: Vec<RawClass>,
}

#[derive(Deserialize)]
struct RawClass {
    name: String,
    #[serde(default)]
    interface: bool,
    #[serde(default, rename = "abstract")]
    is_abstract: bool,
    #[serde(default, rename = "super")]
    super_name: Option<String>,
    #[serde(default)]
    interfaces: Vec<String>,
    #[serde(default)]
    methods: Vec<RawMethod>,
}

#[derive(Deserialize)]
struct RawMethod {
    name: String,
    descriptor: String,
    #[serde(default)]
    native: bool,
    #[serde(default, rename = "abstract")]
    is_abstract: bool,
    #[serde(default)]
    body: Option<Vec<RawStmt>>,
}

#[derive(Deserialize)]
struct RawStmt {
    #[serde(default)]
    call: Option<RawCall>,
}

#[derive(Deserialize)]
struct RawCall {
    kind: CallKind,
    owner: String,
    name: String,
    descriptor: String,
    #[serde(default)]
    receiver: Option<String>,
}

pub(crate) fn load_program(path: &Path) -> Result<Program> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    program_from_json(&text).with_context(|| format!("failed to load {}", path.display()))
}

pub(crate) fn program_from_json(text: &str) -> Result<Program> {
    let raw: RawProgram =
        serde_json::from_str(text).context("failed to parse program model JSON")?;

    let mut by_name = HashMap::new();
    for (id, class) in raw.classes.iter().enumerate() {
        if by_name.insert(class.name.clone(), id).is_some() {
            anyhow::bail!("duplicate class in program model: {}", class.name);
        }
    }

    let classes = raw
        .classes
        .into_iter()
        .map(|class| link_class(class, &by_name))
        .collect();

    Ok(Program { classes, by_name })
}

/// Resolve hierarchy links by name. Names pointing outside the model are
/// tolerated: the superclass chain simply ends there (unresolved library
/// classes), matching the best-effort policy of the analysis.
fn link_class(class: RawClass, by_name: &HashMap<String, usize>) -> ClassNode {
    let super_class = match class.super_name.as_deref() {
        Some(name) => {
            let id = by_name.get(name).copied();
            if id.is_none() {
                log::debug!(
                    "superclass {} of {} is not part of the model",
                    name,
                    class.name
                );
            }
            id
        }
        None => None,
    };

    let interfaces = class
        .interfaces
        .iter()
        .filter_map(|name| {
            let id = by_name.get(name).copied();
            if id.is_none() {
                log::debug!("interface {} of {} is not part of the model", name, class.name);
            }
            id
        })
        .collect();

    let methods = class.methods.into_iter().map(link_method).collect();

    ClassNode {
        name: class.name,
        is_interface: class.interface,
        is_abstract: class.is_abstract,
        super_class,
        super_name: class.super_name,
        interfaces,
        methods,
    }
}

fn link_method(method: RawMethod) -> MethodNode {
    let body = method.body.map(|statements| {
        statements
            .into_iter()
            .map(|stmt| Stmt {
                call: stmt.call.map(|call| CallSite {
                    kind: call.kind,
                    owner: call.owner,
                    name: call.name,
                    descriptor: call.descriptor,
                    receiver: call.receiver,
                }),
            })
            .collect()
    });

    MethodNode {
        name: method.name,
        descriptor: method.descriptor,
        is_native: method.native,
        is_abstract: method.is_abstract,
        body,
    }
}
