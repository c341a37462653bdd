//! The Sable lowering driver.
//!
//! Reads a serialized compilation unit (the front end's AST plus scope
//! tree, as JSON), runs the lowering engine against the recording sink,
//! and writes the finalized listing. Fatal lowering errors are rendered
//! as labeled diagnostics when the original source is available.
//!
//! Options:
//! - `--out` - Output path for the finalized listing
//! - `--build` - Build kind (debug or release)
//! - `--emit` - Artifact shape (library or executable)
//! - `--source` - Original source file, used to label error spans

use std::path::PathBuf;
use std::process;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use sable_ast::item::Unit;
use sable_common::LowerError;
use sable_emit::{CodeSink, RecordingSink};
use sable_lower::{compile_unit, BuildKind, BuildOptions, EmitKind};
use sable_types::{StaticCatalog, TypeCatalog};

#[derive(Parser)]
#[command(name = "sablec", version, about = "The Sable lowering driver")]
struct Cli {
    /// Serialized unit produced by the front end
    unit: PathBuf,

    /// Output path for the finalized listing
    #[arg(short, long, default_value = "out.sbl.json")]
    out: PathBuf,

    /// Build kind
    #[arg(long, value_enum, default_value = "debug")]
    build: BuildArg,

    /// Artifact shape
    #[arg(long, value_enum, default_value = "library")]
    emit: EmitArg,

    /// Original source file, used to label error spans
    #[arg(long)]
    source: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum BuildArg {
    Debug,
    Release,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmitArg {
    Library,
    Executable,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("{e}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let data = std::fs::read_to_string(&cli.unit)
        .map_err(|e| format!("failed to read '{}': {}", cli.unit.display(), e))?;
    let unit: Unit = serde_json::from_str(&data)
        .map_err(|e| format!("'{}' is not a valid unit: {}", cli.unit.display(), e))?;

    let options = BuildOptions {
        out_path: cli.out.clone(),
        build_kind: match cli.build {
            BuildArg::Debug => BuildKind::Debug,
            BuildArg::Release => BuildKind::Release,
        },
        emit_kind: match cli.emit {
            EmitArg::Library => EmitKind::Library,
            EmitArg::Executable => EmitKind::Executable,
        },
    };

    let core = StaticCatalog::core();
    let externals: [&dyn TypeCatalog; 1] = [&core];
    let mut sink = RecordingSink::new();
    if let Err(err) = compile_unit(&unit, &externals, &mut sink, &options) {
        report_error(&err, cli.source.as_deref());
        return Err(format!("lowering '{}' failed", unit.name));
    }

    sink.finalize(&unit.name, &options.out_path)
        .map_err(|e| format!("failed to write '{}': {}", options.out_path.display(), e))?;
    Ok(())
}

/// Render a lowering error. With the source at hand the span gets a
/// labeled ariadne report; without it, a one-line message.
fn report_error(err: &LowerError, source: Option<&std::path::Path>) {
    let Some(text) = source.and_then(|p| std::fs::read_to_string(p).ok()) else {
        eprintln!("error: {err} at {}..{}", err.span.start, err.span.end);
        return;
    };

    // Clamp to the source and keep the span non-empty; ariadne needs at
    // least one character.
    let len = text.len();
    let start = (err.span.start as usize).min(len);
    let end = (err.span.end as usize).clamp(start, len);
    let range = if start == end {
        start..end.saturating_add(1).min(len)
    } else {
        start..end
    };

    let report = Report::build(ReportKind::Error, range.clone())
        .with_message(err.to_string())
        .with_config(Config::default())
        .with_label(
            Label::new(range)
                .with_message(err.kind.to_string())
                .with_color(Color::Red),
        )
        .finish();
    let _ = report.eprint(Source::from(text));
}
