mod engine;
mod hierarchy;
mod load;
mod model;
mod report;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use crate::engine::Analysis;
use crate::hierarchy::HierarchyIndex;
use crate::model::{MethodRef, Program};
use crate::report::{ClassSummary, JsonReporter, MethodSummary, Reporter, TextReporter};

/// CLI arguments for jreach execution.
#[derive(Parser, Debug)]
#[command(
    name = "jreach",
    about = "Class-hierarchy-based reachability analysis over JVM program models.",
    version
)]
struct Cli {
    /// Program-model JSON emitted by the bytecode frontend.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Internal name of the entry class, e.g. com/example/Main.
    #[arg(long, value_name = "CLASS")]
    entry: String,
    #[arg(long, value_enum, default_value = "text")]
    format: Format,
    /// Report directory for text output, report file (or -) for JSON.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
    #[arg(long)]
    quiet: bool,
    #[arg(long)]
    timing: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    if !cli.input.exists() {
        anyhow::bail!("input not found: {}", cli.input.display());
    }

    let started_at = Instant::now();
    let program = load::load_program(&cli.input)?;
    let entry = program
        .entry_method(&cli.entry)
        .context("entry point lookup failed")?;

    let hierarchy = HierarchyIndex::build(&program);
    let mut analysis = Analysis::new(&program, &hierarchy);

    match cli.format {
        Format::Text => {
            let dir = cli.output.clone().unwrap_or_else(|| PathBuf::from("cha-out"));
            let mut reporter = TextReporter::new(&dir);
            run_analysis(&program, &hierarchy, &mut analysis, entry, &mut reporter)?;
        }
        Format::Json => {
            let writer = output_writer(cli.output.as_deref())?;
            let mut reporter = JsonReporter::new(writer);
            run_analysis(&program, &hierarchy, &mut analysis, entry, &mut reporter)?;
        }
    }

    if cli.timing && !cli.quiet {
        eprintln!(
            "timing: total_ms={} classes={} reachable={}",
            started_at.elapsed().as_millis(),
            program.classes.len(),
            analysis.reachable().len()
        );
    }

    Ok(())
}

/// Run the fixed point, then push the summary sections and flush the
/// reporter. Mirrors the run-then-summarize order of the analysis output.
fn run_analysis(
    program: &Program,
    hierarchy: &HierarchyIndex,
    analysis: &mut Analysis,
    entry: MethodRef,
    reporter: &mut dyn Reporter,
) -> Result<()> {
    analysis.run(entry, reporter);

    let mut classes = Vec::new();
    for (id, class) in program.classes.iter().enumerate() {
        classes.push(ClassSummary {
            name: class.name.clone(),
            receivers: hierarchy.descendants(id)?.len(),
        });
    }
    reporter.hierarchy_summary(&classes);

    let methods: Vec<MethodSummary> = analysis
        .reachable()
        .iter()
        .map(|&m| MethodSummary::of(program, m))
        .collect();
    reporter.reachable_methods(&methods);

    reporter.finish()
}

fn output_writer(output: Option<&Path>) -> Result<Box<dyn Write>> {
    match output {
        Some(path) if path == Path::new("-") => Ok(Box::new(io::stdout())),
        Some(path) => Ok(Box::new(
            File::create(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Ok(Box::new(io::stdout())),
    }
}
