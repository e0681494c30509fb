use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::hierarchy::HierarchyIndex;
use crate::model::{
    CONSTRUCTOR_NAME, CallSite, FINALIZER_DESCRIPTOR, FINALIZER_NAME, MethodRef, Program,
    STATIC_INITIALIZER_NAME,
};
use crate::report::{CallRecord, MethodSummary, Reporter, Resolution};

/// One reachability run: the worklist of discovered-but-unprocessed methods
/// and the set of everything discovered so far. Single-threaded by
/// construction; the hierarchy index is read-only for the whole run.
pub(crate) struct Analysis<'p> {
    program: &'p Program,
    hierarchy: &'p HierarchyIndex<'p>,
    worklist: VecDeque<MethodRef>,
    reachable: HashSet<MethodRef>,
    discovered: Vec<MethodRef>,
}

impl<'p> Analysis<'p> {
    pub(crate) fn new(program: &'p Program, hierarchy: &'p HierarchyIndex<'p>) -> Analysis<'p> {
        Analysis {
            program,
            hierarchy,
            worklist: VecDeque::new(),
            reachable: HashSet::new(),
            discovered: Vec::new(),
        }
    }

    /// Breadth-first fixed point over the call graph. Seeds the entry method
    /// and every static initializer, then drains the worklist in FIFO order.
    pub(crate) fn run(&mut self, entry: MethodRef, reporter: &mut dyn Reporter) {
        self.enqueue(entry);

        // <clinit> methods run whenever the JVM loads a class; no attempt is
        // made to prove a class never loads, so all of them are roots.
        for (class, node) in self.program.classes.iter().enumerate() {
            for (index, method) in node.methods.iter().enumerate() {
                if method.name == STATIC_INITIALIZER_NAME {
                    self.enqueue(MethodRef { class, index });
                }
            }
        }

        while let Some(m) = self.worklist.pop_front() {
            self.process_method(m, reporter);
        }
    }

    /// Reachable methods in FIFO discovery order, frozen after `run`.
    pub(crate) fn reachable(&self) -> &[MethodRef] {
        &self.discovered
    }

    /// Schedule a newly discovered method; a method enters the reachable set
    /// at most once.
    fn enqueue(&mut self, m: MethodRef) {
        if !self.reachable.insert(m) {
            return;
        }
        self.worklist.push_back(m);
        self.discovered.push(m);

        // Any constructible object may later be finalized by the JVM, so a
        // reachable constructor drags the declaring class's finalizer in,
        // whether or not anything calls it explicitly.
        let method = self.program.method(m);
        if method.name == CONSTRUCTOR_NAME {
            let class = self.program.class(m.class);
            if let Some(index) = class.declared_method(FINALIZER_NAME, FINALIZER_DESCRIPTOR) {
                self.enqueue(MethodRef { class: m.class, index });
            }
        }
    }

    fn process_method(&mut self, m: MethodRef, reporter: &mut dyn Reporter) {
        let method = self.program.method(m);
        if method.is_native || method.is_abstract {
            return;
        }
        let Some(body) = method.body.as_deref() else {
            return;
        };

        reporter.begin_method(&MethodSummary::of(self.program, m));
        for stmt in body {
            if let Some(call) = &stmt.call {
                self.process_call(call, reporter);
            }
        }
    }

    fn process_call(&mut self, call: &CallSite, reporter: &mut dyn Reporter) {
        let static_target = self.lookup_static_target(call);

        if call.kind.is_direct() {
            // Compile-time and run-time target coincide.
            match static_target {
                Some(target) => {
                    self.enqueue(target);
                    reporter.call(&CallRecord {
                        kind: call.kind,
                        static_target: static_label(call),
                        resolution: Resolution::Direct {
                            target: MethodSummary::of(self.program, target),
                        },
                    });
                }
                None => self.fallback(call, None, "static target not in program model", reporter),
            }
            return;
        }

        // Virtual or interface call: expand over every concrete class that
        // could be the run-time receiver.
        let Some(receiver_name) = call.receiver.as_deref() else {
            self.fallback(call, static_target, "call site has no receiver type", reporter);
            return;
        };
        if receiver_name.starts_with('[') {
            // Array types cannot carry virtual dispatch.
            return;
        }
        let Some(receiver_class) = self.program.class_id(receiver_name) else {
            self.fallback(call, static_target, "receiver class not in program model", reporter);
            return;
        };
        let possible = match self.hierarchy.descendants(receiver_class) {
            Ok(possible) => possible,
            Err(err) => {
                self.fallback(call, static_target, &err.to_string(), reporter);
                return;
            }
        };

        let mut targets = BTreeSet::new();
        let mut fallback_receivers = Vec::new();
        for &receiver in possible {
            match self
                .hierarchy
                .resolve_override(&call.name, &call.descriptor, receiver)
            {
                Ok(target) => {
                    targets.insert(target);
                }
                Err(err) => {
                    // Guaranteed not to happen for receivers drawn from the
                    // static owner's descendants; degrade to the static
                    // target so one bad site does not stop the run.
                    log::warn!("model integrity: {err}");
                    fallback_receivers.push(self.program.class(receiver).name.clone());
                    if let Some(target) = static_target {
                        targets.insert(target);
                    }
                }
            }
        }

        for &target in &targets {
            self.enqueue(target);
        }

        reporter.call(&CallRecord {
            kind: call.kind,
            static_target: static_label(call),
            resolution: Resolution::Dispatched {
                possible_receivers: possible.len(),
                targets: targets
                    .iter()
                    .map(|&t| MethodSummary::of(self.program, t))
                    .collect(),
                fallback_receivers,
            },
        });
    }

    /// Resolve the compile-time target against the owner's superclass chain.
    fn lookup_static_target(&self, call: &CallSite) -> Option<MethodRef> {
        let owner = self.program.class_id(&call.owner)?;
        self.program
            .resolve_declared(owner, &call.name, &call.descriptor)
    }

    fn fallback(
        &mut self,
        call: &CallSite,
        target: Option<MethodRef>,
        reason: &str,
        reporter: &mut dyn Reporter,
    ) {
        log::warn!("model integrity: {} at call to {}", reason, static_label(call));
        if let Some(target) = target {
            self.enqueue(target);
        }
        reporter.call(&CallRecord {
            kind: call.kind,
            static_target: static_label(call),
            resolution: Resolution::Fallback {
                target: target.map(|t| MethodSummary::of(self.program, t)),
                reason: reason.to_string(),
            },
        });
    }
}

fn static_label(call: &CallSite) -> String {
    format!("{}.{}{}", call.owner, call.name, call.descriptor)
}
