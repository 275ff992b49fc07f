use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use docxide_layout::{ApproxMetrics, EngineOptions, FontFaceMetrics, layout_file};

#[derive(Parser)]
#[command(name = "docxide-layout", version, about = "Paginate a normalized document into a page layout")]
struct Cli {
    /// Document JSON to lay out
    input: PathBuf,

    /// Layout JSON output path (defaults to INPUT with .layout.json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// TrueType/OpenType font used to measure text
    #[arg(long)]
    font: Option<PathBuf>,

    /// Maximum convergence iterations
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Soft time budget for the convergence loop, in milliseconds
    #[arg(long)]
    time_budget_ms: Option<u64>,

    /// Pretty-print the output JSON
    #[arg(long)]
    pretty: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("layout.json"));

    let mut options = EngineOptions::from_env();
    if let Some(n) = cli.max_iterations {
        options.max_iterations = n.max(1);
    }
    if let Some(ms) = cli.time_budget_ms {
        options.time_budget = Duration::from_millis(ms);
    }

    let result = match &cli.font {
        Some(path) => FontFaceMetrics::open(path, 0)
            .and_then(|font| layout_file(&cli.input, &output, font, options, cli.pretty)),
        None => layout_file(&cli.input, &output, ApproxMetrics, options, cli.pretty),
    };

    match result {
        Ok(result) => {
            println!(
                "{} -> {} ({} pages, {} iterations{})",
                cli.input.display(),
                output.display(),
                result.layout.pages.len(),
                result.iterations,
                if result.converged { "" } else { ", not converged" }
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
