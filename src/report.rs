use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::model::{CallKind, MethodRef, Program, is_library_class};

/// Display record for a method, owner plus sub-signature.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub(crate) struct MethodSummary {
    pub(crate) class: String,
    pub(crate) name: String,
    pub(crate) descriptor: String,
}

impl MethodSummary {
    pub(crate) fn of(program: &Program, m: MethodRef) -> MethodSummary {
        let class = program.class(m.class);
        let method = program.method(m);
        MethodSummary {
            class: class.name.clone(),
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
        }
    }

    pub(crate) fn label(&self) -> String {
        format!("{}.{}{}", self.class, self.name, self.descriptor)
    }

    pub(crate) fn is_library(&self) -> bool {
        is_library_class(&self.class)
    }
}

/// Per-class hierarchy summary: how many concrete receiver classes it has.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct ClassSummary {
    pub(crate) name: String,
    pub(crate) receivers: usize,
}

/// One resolved call site as pushed to the reporting collaborator.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct CallRecord {
    pub(crate) kind: CallKind,
    pub(crate) static_target: String,
    #[serde(flatten)]
    pub(crate) resolution: Resolution,
}

/// Outcome of resolving a call site.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub(crate) enum Resolution {
    /// Static or special call: the compile-time target is the run-time target.
    Direct { target: MethodSummary },
    /// Virtual or interface call expanded through the hierarchy.
    Dispatched {
        possible_receivers: usize,
        targets: Vec<MethodSummary>,
        /// Receivers whose dispatch walk found no override; the static
        /// target stood in for them. Empty on a well-formed model.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        fallback_receivers: Vec<String>,
    },
    /// The site could not be resolved against the model at all; the static
    /// target was enqueued when it exists.
    Fallback {
        target: Option<MethodSummary>,
        reason: String,
    },
}

/// Sink for analysis output. Notifications only accumulate state; file I/O
/// happens in `finish`, after the fixed point is complete.
pub(crate) trait Reporter {
    fn begin_method(&mut self, method: &MethodSummary);
    fn call(&mut self, record: &CallRecord);
    fn hierarchy_summary(&mut self, classes: &[ClassSummary]);
    fn reachable_methods(&mut self, methods: &[MethodSummary]);
    fn finish(&mut self) -> Result<()>;
}

/// Text reporter producing the classic file set in one directory: `calls`,
/// `hier`/`hier_all`, `rmethods`/`rmethods_all`. The unsuffixed variants
/// exclude runtime-library classes.
pub(crate) struct TextReporter {
    dir: PathBuf,
    calls: String,
    hier: String,
    hier_all: String,
    rmethods: String,
    rmethods_all: String,
    inside_app_method: bool,
}

impl TextReporter {
    pub(crate) fn new(dir: &Path) -> TextReporter {
        TextReporter {
            dir: dir.to_path_buf(),
            calls: String::new(),
            hier: String::new(),
            hier_all: String::new(),
            rmethods: String::new(),
            rmethods_all: String::new(),
            inside_app_method: false,
        }
    }
}

impl Reporter for TextReporter {
    fn begin_method(&mut self, method: &MethodSummary) {
        self.inside_app_method = !method.is_library();
        if self.inside_app_method {
            self.calls.push_str(&format!("\n===== Method {}\n", method.label()));
        }
    }

    fn call(&mut self, record: &CallRecord) {
        if !self.inside_app_method {
            return;
        }
        match &record.resolution {
            Resolution::Direct { target } => {
                self.calls.push_str(&format!("[S] {}\n", target.label()));
            }
            Resolution::Dispatched {
                possible_receivers,
                targets,
                fallback_receivers,
            } => {
                self.calls.push_str(&format!(
                    "[C] {},{},{}\n",
                    record.static_target,
                    possible_receivers,
                    targets.len()
                ));
                for receiver in fallback_receivers {
                    self.calls
                        .push_str(&format!("     !! fallback for receiver {receiver}\n"));
                }
                for target in targets {
                    self.calls.push_str(&format!("     {}\n", target.label()));
                }
            }
            Resolution::Fallback { target, reason } => {
                let label = target
                    .as_ref()
                    .map(|t| t.label())
                    .unwrap_or_else(|| record.static_target.clone());
                self.calls.push_str(&format!("[F] {label} ({reason})\n"));
            }
        }
    }

    fn hierarchy_summary(&mut self, classes: &[ClassSummary]) {
        self.hier_all
            .push_str(&format!("Total num classes: {}\n", classes.len()));
        for class in classes {
            let line = format!("{},{}\n", class.name, class.receivers);
            self.hier_all.push_str(&line);
            if !is_library_class(&class.name) {
                self.hier.push_str(&line);
            }
        }
    }

    fn reachable_methods(&mut self, methods: &[MethodSummary]) {
        self.rmethods_all
            .push_str(&format!("Total num reachable methods: {}\n", methods.len()));
        for method in methods {
            let line = format!("{}\n", method.label());
            self.rmethods_all.push_str(&line);
            if !method.is_library() {
                self.rmethods.push_str(&line);
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        for (name, content) in [
            ("calls", &self.calls),
            ("hier", &self.hier),
            ("hier_all", &self.hier_all),
            ("rmethods", &self.rmethods),
            ("rmethods_all", &self.rmethods_all),
        ] {
            let path = self.dir.join(name);
            fs::write(&path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        Ok(())
    }
}

/// JSON reporter assembling one document for the whole run.
pub(crate) struct JsonReporter<W: Write> {
    writer: W,
    traces: Vec<MethodTrace>,
    hierarchy: Vec<ClassSummary>,
    reachable: Vec<MethodSummary>,
}

#[derive(Serialize)]
struct MethodTrace {
    method: MethodSummary,
    sites: Vec<CallRecord>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    hierarchy: HierarchySection<'a>,
    reachable: ReachableSection<'a>,
    calls: &'a [MethodTrace],
}

#[derive(Serialize)]
struct HierarchySection<'a> {
    total_classes: usize,
    classes: &'a [ClassSummary],
}

#[derive(Serialize)]
struct ReachableSection<'a> {
    total: usize,
    methods: &'a [MethodSummary],
}

impl<W: Write> JsonReporter<W> {
    pub(crate) fn new(writer: W) -> JsonReporter<W> {
        JsonReporter {
            writer,
            traces: Vec::new(),
            hierarchy: Vec::new(),
            reachable: Vec::new(),
        }
    }

    fn report(&self) -> JsonReport<'_> {
        JsonReport {
            hierarchy: HierarchySection {
                total_classes: self.hierarchy.len(),
                classes: &self.hierarchy,
            },
            reachable: ReachableSection {
                total: self.reachable.len(),
                methods: &self.reachable,
            },
            calls: &self.traces,
        }
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn begin_method(&mut self, method: &MethodSummary) {
        self.traces.push(MethodTrace {
            method: method.clone(),
            sites: Vec::new(),
        });
    }

    fn call(&mut self, record: &CallRecord) {
        if let Some(trace) = self.traces.last_mut() {
            trace.sites.push(record.clone());
        }
    }

    fn hierarchy_summary(&mut self, classes: &[ClassSummary]) {
        self.hierarchy = classes.to_vec();
    }

    fn reachable_methods(&mut self, methods: &[MethodSummary]) {
        self.reachable = methods.to_vec();
    }

    fn finish(&mut self) -> Result<()> {
        let text =
            serde_json::to_string_pretty(&self.report()).context("failed to serialize report")?;
        self.writer
            .write_all(text.as_bytes())
            .context("failed to write report")?;
        self.writer
            .write_all(b"\n")
            .context("failed to write report")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(class: &str, name: &str) -> MethodSummary {
        MethodSummary {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: "()V".to_string(),
        }
    }

    #[test]
    fn text_reporter_writes_the_classic_file_set() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut reporter = TextReporter::new(dir.path());

        reporter.begin_method(&summary("com/example/App", "run"));
        reporter.call(&CallRecord {
            kind: CallKind::Static,
            static_target: "com/example/Util.helper()V".to_string(),
            resolution: Resolution::Direct {
                target: summary("com/example/Util", "helper"),
            },
        });
        reporter.call(&CallRecord {
            kind: CallKind::Virtual,
            static_target: "com/example/Root.f()V".to_string(),
            resolution: Resolution::Dispatched {
                possible_receivers: 2,
                targets: vec![summary("com/example/A", "f"), summary("com/example/B", "f")],
                fallback_receivers: Vec::new(),
            },
        });
        reporter.hierarchy_summary(&[
            ClassSummary {
                name: "com/example/Root".to_string(),
                receivers: 2,
            },
            ClassSummary {
                name: "java/lang/Object".to_string(),
                receivers: 3,
            },
        ]);
        reporter.reachable_methods(&[
            summary("com/example/App", "run"),
            summary("java/lang/Object", "<init>"),
        ]);
        reporter.finish().expect("finish");

        let calls = fs::read_to_string(dir.path().join("calls")).expect("calls");
        assert!(calls.contains("===== Method com/example/App.run()V"));
        assert!(calls.contains("[S] com/example/Util.helper()V"));
        assert!(calls.contains("[C] com/example/Root.f()V,2,2"));
        assert!(calls.contains("     com/example/A.f()V"));

        let hier_all = fs::read_to_string(dir.path().join("hier_all")).expect("hier_all");
        assert!(hier_all.starts_with("Total num classes: 2\n"));
        assert!(hier_all.contains("java/lang/Object,3"));
        let hier = fs::read_to_string(dir.path().join("hier")).expect("hier");
        assert!(hier.contains("com/example/Root,2"));
        assert!(!hier.contains("java/lang/Object"));

        let all = fs::read_to_string(dir.path().join("rmethods_all")).expect("rmethods_all");
        assert!(all.starts_with("Total num reachable methods: 2\n"));
        let app_only = fs::read_to_string(dir.path().join("rmethods")).expect("rmethods");
        assert!(app_only.contains("com/example/App.run()V"));
        assert!(!app_only.contains("java/lang/Object"));
    }

    #[test]
    fn text_reporter_skips_calls_inside_library_methods() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut reporter = TextReporter::new(dir.path());

        reporter.begin_method(&summary("java/lang/String", "length"));
        reporter.call(&CallRecord {
            kind: CallKind::Static,
            static_target: "java/lang/Math.abs(I)I".to_string(),
            resolution: Resolution::Direct {
                target: summary("java/lang/Math", "abs"),
            },
        });
        reporter.finish().expect("finish");

        let calls = fs::read_to_string(dir.path().join("calls")).expect("calls");
        assert!(calls.is_empty());
    }

    #[test]
    fn fallback_records_are_distinguishable_in_text_output() {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut reporter = TextReporter::new(dir.path());

        reporter.begin_method(&summary("com/example/App", "run"));
        reporter.call(&CallRecord {
            kind: CallKind::Virtual,
            static_target: "lib/Gone.f()V".to_string(),
            resolution: Resolution::Fallback {
                target: None,
                reason: "receiver class not in program model".to_string(),
            },
        });
        reporter.call(&CallRecord {
            kind: CallKind::Interface,
            static_target: "com/example/I.f()V".to_string(),
            resolution: Resolution::Dispatched {
                possible_receivers: 1,
                targets: vec![summary("com/example/I", "f")],
                fallback_receivers: vec!["com/example/C".to_string()],
            },
        });
        reporter.finish().expect("finish");

        let calls = fs::read_to_string(dir.path().join("calls")).expect("calls");
        assert!(calls.contains("[F] lib/Gone.f()V (receiver class not in program model)"));
        assert!(calls.contains("     !! fallback for receiver com/example/C"));
    }

    #[test]
    fn json_report_has_expected_shape() {
        let mut reporter = JsonReporter::new(Vec::new());

        reporter.begin_method(&summary("com/example/App", "run"));
        reporter.call(&CallRecord {
            kind: CallKind::Virtual,
            static_target: "com/example/Root.f()V".to_string(),
            resolution: Resolution::Dispatched {
                possible_receivers: 2,
                targets: vec![summary("com/example/A", "f")],
                fallback_receivers: Vec::new(),
            },
        });
        reporter.hierarchy_summary(&[ClassSummary {
            name: "com/example/Root".to_string(),
            receivers: 2,
        }]);
        reporter.reachable_methods(&[summary("com/example/App", "run")]);

        let value = serde_json::to_value(reporter.report()).expect("serialize report");

        assert_eq!(value["hierarchy"]["total_classes"], 1);
        assert_eq!(value["hierarchy"]["classes"][0]["name"], "com/example/Root");
        assert_eq!(value["hierarchy"]["classes"][0]["receivers"], 2);
        assert_eq!(value["reachable"]["total"], 1);
        assert_eq!(value["reachable"]["methods"][0]["name"], "run");
        let site = &value["calls"][0]["sites"][0];
        assert_eq!(site["kind"], "virtual");
        assert_eq!(site["resolution"], "dispatched");
        assert_eq!(site["possible_receivers"], 2);
        assert_eq!(site["targets"][0]["class"], "com/example/A");
        assert!(site.get("fallback_receivers").is_none());
    }

    #[test]
    fn json_finish_writes_a_document_with_trailing_newline() {
        let mut buffer = Vec::new();
        {
            let mut reporter = JsonReporter::new(&mut buffer);
            reporter.reachable_methods(&[summary("com/example/App", "run")]);
            reporter.finish().expect("finish");
        }

        let text = String::from_utf8(buffer).expect("utf8");
        assert!(text.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(&text).expect("parse");
        assert_eq!(value["reachable"]["total"], 1);
    }
}
