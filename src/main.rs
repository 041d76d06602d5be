//! proofmatch - conformity checks between design originals and printer proofs
//!
//! CLI entry point

use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use proofmatch::{
    // CLI
    create_spinner, BarProgress, BatchArgs, Cli, Commands, CompareArgs, ExitCode, PairsArgs,
    // Config
    Config,
    // Engine
    discover_documents, export_rows, rows_from_batch, util, Comparison, ComparisonPipeline,
    DocumentFile, DocumentRenderer, PageOverrides, PageReport, Pair, PairResolver, PipelineConfig,
    SideOutcome, SilentProgress, ValidationLedger, DOCUMENT_EXTENSIONS,
};

type CliResult = Result<ExitCode, Box<dyn std::error::Error>>;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match &cli.command {
        Commands::Compare(args) => run_compare(args, cli.config.as_deref()),
        Commands::Pairs(args) => run_pairs(args),
        Commands::Batch(args) => run_batch(args, cli.config.as_deref(), cli.quiet),
        Commands::Info => run_info(),
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.code());
}

/// stderr logging; `RUST_LOG` wins over `-v`
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (verbose, quiet) {
        (0, true) => tracing::Level::ERROR,
        (0, false) => tracing::Level::WARN,
        (1, _) => tracing::Level::INFO,
        (2, _) => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let filter = if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        tracing_subscriber::EnvFilter::default().add_directive(level.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Explicit `--config` path, else the search path
fn load_config(path: Option<&Path>) -> Config {
    match path {
        Some(config_path) => match Config::load_from_path(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Failed to load config file: {}", e);
                Config::default()
            }
        },
        None => Config::load().unwrap_or_else(|e| {
            warn!("Ignoring config file: {}", e);
            Config::default()
        }),
    }
}

// ============ Compare Command ============

fn run_compare(args: &CompareArgs, config_path: Option<&Path>) -> CliResult {
    for path in [&args.original, &args.printer] {
        if let Err(e) = util::ensure_file_exists(path) {
            eprintln!("Error: {}", e);
            return Ok(ExitCode::InputNotFound);
        }
    }
    if args.page == 0 {
        eprintln!("Error: pages are numbered from 1");
        return Ok(ExitCode::InvalidArgs);
    }

    let config = load_config(config_path).merge_with_cli(&args.overrides());
    let pipeline = ComparisonPipeline::new(config);

    let pair = Pair::both(
        DocumentFile::new(&args.original),
        DocumentFile::new(&args.printer),
    );
    let overrides = PageOverrides {
        original: args.original_rect,
        printer: args.printer_rect,
    };
    let report = pipeline.compare_page(&pair, args.page_index(), overrides);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_page_report(&report);
    }

    Ok(compare_exit_code(&report))
}

fn print_page_report(report: &PageReport) {
    println!("Page {} of {}", report.page + 1, report.total_pages());
    println!(
        "  {}",
        report.original.describe(proofmatch::Side::Original, report.page)
    );
    println!(
        "  {}",
        report.printer.describe(proofmatch::Side::Printer, report.page)
    );

    match &report.comparison {
        Comparison::Scored(result) => {
            for (label, det) in [("Original", &result.original), ("Printer", &result.printer)] {
                println!(
                    "  {} region: {} ({}, confidence {:.1})",
                    label, det.region, det.method, det.confidence
                );
            }
            println!("Similarity: {}%", result.display_score());
            println!(
                "Result: {} (threshold {:.2}%)",
                if result.conformant {
                    "CONFORMANT"
                } else {
                    "NOT CONFORMANT"
                },
                result.threshold
            );
            if result.needs_review() {
                println!("Warning: content detection was uncertain, check the regions");
            }
        }
        Comparison::Undefined { reason } => println!("Similarity: N/A ({})", reason),
        Comparison::Disabled => println!("Similarity: N/A (disabled)"),
        Comparison::Failed { error } => println!("Similarity: error ({})", error),
    }
}

fn compare_exit_code(report: &PageReport) -> ExitCode {
    match &report.comparison {
        Comparison::Scored(result) if result.conformant => ExitCode::Success,
        Comparison::Scored(_) => ExitCode::NotConformant,
        Comparison::Disabled => ExitCode::Success,
        Comparison::Failed { .. } => ExitCode::ProcessingError,
        Comparison::Undefined { .. } => {
            let failed = |side: &SideOutcome| matches!(side, SideOutcome::Failed { .. });
            if failed(&report.original) || failed(&report.printer) {
                ExitCode::RenderError
            } else {
                ExitCode::InvalidArgs
            }
        }
    }
}

// ============ Pairs Command ============

/// Discover both folders and resolve pairs
fn resolve_folders(original_dir: &Path, printer_dir: &Path) -> Result<Vec<Pair>, ExitCode> {
    let discover = |dir: &Path| {
        discover_documents(dir).map_err(|e| {
            eprintln!("Error: {}", e);
            ExitCode::InputNotFound
        })
    };
    let originals = discover(original_dir)?;
    let printers = discover(printer_dir)?;
    info!(
        originals = originals.len(),
        printers = printers.len(),
        "documents discovered"
    );
    Ok(PairResolver::resolve(&originals, &printers))
}

fn run_pairs(args: &PairsArgs) -> CliResult {
    let pairs = match resolve_folders(&args.original_dir, &args.printer_dir) {
        Ok(pairs) => pairs,
        Err(code) => return Ok(code),
    };

    let matched = pairs.iter().filter(|p| p.is_matched()).count();
    for (index, pair) in pairs.iter().enumerate() {
        if args.matched_only && !pair.is_matched() {
            continue;
        }
        println!(
            "{:>4}  {:<10} {:<14} {}",
            index + 1,
            pair.code(),
            pair.match_kind().label(),
            pair.display_name()
        );
    }
    println!();
    println!(
        "{} pairs, {} matched ({:.1}%)",
        pairs.len(),
        matched,
        util::percentage(matched, pairs.len())
    );

    Ok(ExitCode::Success)
}

// ============ Batch Command ============

fn run_batch(args: &BatchArgs, config_path: Option<&Path>, quiet: bool) -> CliResult {
    let Some(delimiter) = args.delimiter_byte() else {
        eprintln!("Error: delimiter must be a single ASCII character");
        return Ok(ExitCode::InvalidArgs);
    };

    let spinner = (!quiet).then(|| create_spinner("Discovering documents..."));
    let resolved = resolve_folders(&args.original_dir, &args.printer_dir);
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let pairs = match resolved {
        Ok(pairs) => pairs,
        Err(code) => return Ok(code),
    };

    let config = load_config(config_path).merge_with_cli(&args.overrides());

    if args.dry_run {
        print_execution_plan(args, &pairs, &config);
        return Ok(ExitCode::Success);
    }

    let pipeline = ComparisonPipeline::new(config);
    let report = if quiet {
        pipeline.run_batch(&pairs, &SilentProgress)?
    } else {
        pipeline.run_batch(&pairs, &BarProgress::new(pairs.len()))?
    };

    let config = pipeline.config();
    let mut ledger = ValidationLedger::new();
    let approved = if config.auto_approve {
        report.auto_approve(&mut ledger, config.threshold)
    } else {
        0
    };

    let rows = rows_from_batch(&report, &ledger);
    if let Err(e) = export_rows(&rows, args.output.as_deref(), args.format, delimiter) {
        eprintln!("Error: {}", e);
        return Ok(ExitCode::OutputError);
    }

    if !quiet {
        eprintln!(
            "{} pairs in {}: {} pages scored, {} conformant, {} failed, {} auto-approved",
            report.pairs.len(),
            util::format_duration(report.elapsed),
            report.scored_pages(),
            report.conformant_pages(),
            report.failed_pages(),
            approved
        );
        if let Some(output) = &args.output {
            eprintln!("Report written to {}", output.display());
        }
    }

    Ok(ExitCode::Success)
}

/// Print execution plan for dry-run mode
fn print_execution_plan(
    args: &BatchArgs,
    pairs: &[Pair],
    config: &PipelineConfig,
) {
    let matched = pairs.iter().filter(|p| p.is_matched()).count();

    println!("=== Dry Run - Execution Plan ===");
    println!();
    println!("Originals: {}", args.original_dir.display());
    println!("Printer proofs: {}", args.printer_dir.display());
    println!("Pairs: {} ({} matched)", pairs.len(), matched);
    println!(
        "Report: {} ({:?})",
        args.output
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".to_string()),
        args.format
    );
    println!();
    println!("Pipeline Configuration:");
    println!(
        "  1. Render (scale {:.2}, {} DPI, timeout {}s)",
        config.render_scale,
        config.render_options().dpi(),
        config.render_timeout_secs
    );
    if config.detection.auto_crop {
        println!("  2. Content Detection: threshold, then edge");
    } else {
        println!("  2. Content Detection: DISABLED (whole page)");
    }
    println!(
        "  3. Normalize to {}x{}",
        config.normalize.target_width, config.normalize.target_height
    );
    if config.similarity_enabled {
        println!("  4. SSIM (threshold {:.2}%)", config.threshold);
    } else {
        println!("  4. SSIM: DISABLED");
    }
    println!(
        "  5. Auto-approve: {}",
        if config.auto_approve { "YES" } else { "NO" }
    );
    println!();
    println!("Threads: {}", config.effective_threads());
    println!();
    println!("Configuration (JSON):");
    println!("{}", config.to_json());
    println!();
    println!("Pairs:");
    for (i, pair) in pairs.iter().enumerate() {
        println!(
            "  {}. {} [{}] {}",
            i + 1,
            pair.code(),
            pair.match_kind().label(),
            pair.display_name()
        );
    }
}

// ============ Info Command ============

fn run_info() -> CliResult {
    println!("proofmatch v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("System Information:");
    println!("  Platform: {}", std::env::consts::OS);
    println!("  Arch: {}", std::env::consts::ARCH);
    println!("  CPUs: {}", num_cpus::get());

    println!();
    println!("Renderers:");
    println!("  Raster: built-in (png, jpg, jpeg, tif, tiff, bmp)");
    if DocumentRenderer::default().pdf_available() {
        check_tool_with_version("magick", "PDF (ImageMagick)", &["-version"]);
    } else {
        println!("  PDF (ImageMagick): Not found, PDF documents cannot be rendered");
    }
    println!("  Document types: {}", DOCUMENT_EXTENSIONS.join(", "));

    println!();
    println!("Config File Locations:");
    for (label, path) in ["Local", "User "].iter().zip(Config::search_paths()) {
        println!("  {}: {}", label, path.display());
    }

    Ok(ExitCode::Success)
}

fn check_tool_with_version(cmd: &str, name: &str, version_args: &[&str]) {
    let Ok(path): Result<PathBuf, _> = which::which(cmd) else {
        println!("  {}: Not found", name);
        return;
    };

    let first_line = std::process::Command::new(&path)
        .args(version_args)
        .output()
        .ok()
        .and_then(|out| {
            String::from_utf8_lossy(&out.stdout)
                .lines()
                .next()
                .map(|l| l.trim().to_string())
        })
        .filter(|l| !l.is_empty() && l.len() < 80);

    match first_line {
        Some(version) => println!("  {}: {} ({})", name, version, path.display()),
        None => println!("  {}: {} (found)", name, path.display()),
    }
}
