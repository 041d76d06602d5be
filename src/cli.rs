//! CLI interface module
//!
//! Provides command-line interface using clap derive macros.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use crate::config::CliOverrides;
use crate::detect::ContentRegion;
use crate::export::ExportFormat;
use crate::pipeline::ProgressCallback;

/// Exit codes for the CLI
///
/// These codes follow standard Unix conventions and provide
/// specific error categories for scripting and automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    InvalidArgs = 2,
    InputNotFound = 3,
    OutputError = 4,
    ProcessingError = 5,
    /// Compared page scored below the threshold
    NotConformant = 6,
    /// A document could not be rendered
    RenderError = 7,
}

impl ExitCode {
    /// Convert to process exit code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Get human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::InvalidArgs => "Invalid arguments",
            ExitCode::InputNotFound => "Input file or directory not found",
            ExitCode::OutputError => "Output error (permission denied, disk full, etc.)",
            ExitCode::ProcessingError => "Processing error",
            ExitCode::NotConformant => "Similarity below threshold",
            ExitCode::RenderError => "Document rendering error (ImageMagick, corrupt file, etc.)",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.code()
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code() as u8)
    }
}

/// Compare original documents against printer proofs
#[derive(Parser, Debug)]
#[command(name = "proofmatch")]
#[command(version)]
#[command(about = "Compare original documents against printer proofs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: ./proofmatch.toml, then the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare one page of two documents
    Compare(CompareArgs),
    /// List how two folders pair up
    Pairs(PairsArgs),
    /// Score every pair of two folders and export a report
    Batch(BatchArgs),
    /// Show system information
    Info,
}

/// Arguments for the compare command
#[derive(clap::Args, Debug)]
pub struct CompareArgs {
    /// Original document (PDF or image)
    pub original: PathBuf,

    /// Printer proof (PDF or image)
    pub printer: PathBuf,

    /// Page to compare (1-based)
    #[arg(short, long, default_value_t = 1)]
    pub page: usize,

    /// Manual content region for the original, as L,T,R,B pixels
    #[arg(long, value_name = "L,T,R,B")]
    pub original_rect: Option<ContentRegion>,

    /// Manual content region for the printer proof, as L,T,R,B pixels
    #[arg(long, value_name = "L,T,R,B")]
    pub printer_rect: Option<ContentRegion>,

    /// Compare whole pages instead of detected content
    #[arg(long = "no-auto-crop")]
    pub no_auto_crop: bool,

    /// Conformity threshold (0-100)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl CompareArgs {
    /// Zero-based page index
    pub fn page_index(&self) -> usize {
        self.page.saturating_sub(1)
    }

    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            threshold: self.threshold,
            auto_crop: self.no_auto_crop.then_some(false),
            ..Default::default()
        }
    }
}

/// Arguments for the pairs command
#[derive(clap::Args, Debug)]
pub struct PairsArgs {
    /// Folder of original documents
    pub original_dir: PathBuf,

    /// Folder of printer proofs
    pub printer_dir: PathBuf,

    /// Only list pairs present on both sides
    #[arg(long)]
    pub matched_only: bool,
}

/// Arguments for the batch command
#[derive(clap::Args, Debug)]
pub struct BatchArgs {
    /// Folder of original documents
    pub original_dir: PathBuf,

    /// Folder of printer proofs
    pub printer_dir: PathBuf,

    /// Report file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format
    #[arg(long, default_value = "csv")]
    pub format: ExportFormat,

    /// CSV field delimiter
    #[arg(long, default_value_t = ';')]
    pub delimiter: char,

    /// Conformity threshold (0-100)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Number of parallel threads
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Leave single-page pairs pending even when they score above threshold
    #[arg(long = "no-auto-approve")]
    pub no_auto_approve: bool,

    /// Compare whole pages instead of detected content
    #[arg(long = "no-auto-crop")]
    pub no_auto_crop: bool,

    /// Show execution plan without processing
    #[arg(long)]
    pub dry_run: bool,
}

impl BatchArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            threshold: self.threshold,
            auto_crop: self.no_auto_crop.then_some(false),
            auto_approve: self.no_auto_approve.then_some(false),
            threads: self.threads,
            ..Default::default()
        }
    }

    /// Delimiter as a byte, if it is a single ASCII character
    pub fn delimiter_byte(&self) -> Option<u8> {
        self.delimiter.is_ascii().then_some(self.delimiter as u8)
    }
}

/// Create a styled progress bar for pair processing
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Create a spinner for indeterminate progress
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Batch progress shown on an indicatif bar
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(total: usize) -> Self {
        Self {
            bar: create_progress_bar(total as u64),
        }
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

impl ProgressCallback for BarProgress {
    fn on_step_start(&self, step: &str) {
        self.bar.set_message(step.to_string());
    }

    fn on_step_progress(&self, current: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(current as u64);
    }

    fn on_step_complete(&self, _step: &str, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    fn on_debug(&self, message: &str) {
        tracing::debug!("{message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_help_display() {
        let mut cmd = Cli::command();
        let help = cmd.render_help().to_string();
        assert!(help.contains("proofmatch"));
        assert!(help.contains("compare"));
        assert!(help.contains("batch"));
    }

    #[test]
    fn test_version_display() {
        let cmd = Cli::command();
        let version = cmd.get_version().unwrap_or("unknown");
        assert!(!version.is_empty());
    }

    #[test]
    fn test_missing_input_error() {
        let result = Cli::try_parse_from(["proofmatch", "compare", "a.pdf"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(err.to_string().contains("required"));
    }

    #[test]
    fn test_compare_options() {
        let cli = Cli::try_parse_from([
            "proofmatch",
            "compare",
            "orig.pdf",
            "proof.pdf",
            "--page",
            "3",
            "--printer-rect",
            "10,20,310,420",
            "--threshold",
            "92",
            "--no-auto-crop",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        if let Commands::Compare(args) = cli.command {
            assert_eq!(args.page_index(), 2);
            assert_eq!(args.original_rect, None);
            assert_eq!(
                args.printer_rect,
                Some(ContentRegion::new(10, 20, 310, 420).unwrap())
            );
            let overrides = args.overrides();
            assert_eq!(overrides.threshold, Some(92.0));
            assert_eq!(overrides.auto_crop, Some(false));
        } else {
            panic!("Expected Compare command");
        }
    }

    #[test]
    fn test_compare_rejects_bad_rect() {
        let result = Cli::try_parse_from([
            "proofmatch",
            "compare",
            "a.pdf",
            "b.pdf",
            "--original-rect",
            "10,20,5",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_compare_defaults() {
        let cli = Cli::try_parse_from(["proofmatch", "compare", "a.png", "b.png"]).unwrap();
        if let Commands::Compare(args) = cli.command {
            assert_eq!(args.page_index(), 0);
            assert!(!args.json);
            let overrides = args.overrides();
            assert_eq!(overrides.threshold, None);
            assert_eq!(overrides.auto_crop, None);
        } else {
            panic!("Expected Compare command");
        }
    }

    #[test]
    fn test_batch_defaults() {
        let cli = Cli::try_parse_from(["proofmatch", "batch", "orig", "proofs"]).unwrap();

        if let Commands::Batch(args) = cli.command {
            assert_eq!(args.format, ExportFormat::Csv);
            assert_eq!(args.delimiter_byte(), Some(b';'));
            assert!(args.output.is_none());
            assert!(!args.dry_run);
            let overrides = args.overrides();
            assert_eq!(overrides.auto_approve, None);
            assert_eq!(overrides.threads, None);
        } else {
            panic!("Expected Batch command");
        }
    }

    #[test]
    fn test_batch_options() {
        let cli = Cli::try_parse_from([
            "proofmatch",
            "batch",
            "orig",
            "proofs",
            "-o",
            "report.json",
            "--format",
            "json",
            "--threads",
            "2",
            "--no-auto-approve",
            "--dry-run",
            "--config",
            "custom.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        if let Commands::Batch(args) = cli.command {
            assert_eq!(args.format, ExportFormat::Json);
            assert_eq!(args.output, Some(PathBuf::from("report.json")));
            assert!(args.dry_run);
            let overrides = args.overrides();
            assert_eq!(overrides.auto_approve, Some(false));
            assert_eq!(overrides.threads, Some(2));
        } else {
            panic!("Expected Batch command");
        }
    }

    #[test]
    fn test_batch_non_ascii_delimiter() {
        let cli = Cli::try_parse_from(["proofmatch", "batch", "o", "p", "--delimiter", "§"]).unwrap();
        if let Commands::Batch(args) = cli.command {
            assert_eq!(args.delimiter_byte(), None);
        } else {
            panic!("Expected Batch command");
        }
    }

    #[test]
    fn test_pairs_command() {
        let cli = Cli::try_parse_from(["proofmatch", "pairs", "o", "p", "--matched-only", "-q"])
            .unwrap();
        assert!(cli.quiet);
        assert!(matches!(
            cli.command,
            Commands::Pairs(PairsArgs {
                matched_only: true,
                ..
            })
        ));
    }

    #[test]
    fn test_info_command() {
        let cli = Cli::try_parse_from(["proofmatch", "info"]).unwrap();
        assert!(matches!(cli.command, Commands::Info));
    }

    #[test]
    fn test_progress_bar_display() {
        let pb = create_progress_bar(100);
        assert_eq!(pb.length(), Some(100));

        pb.set_position(50);
        assert_eq!(pb.position(), 50);

        pb.finish_with_message("done");
    }

    #[test]
    fn test_spinner_creation() {
        let spinner = create_spinner("Discovering documents...");
        assert_eq!(spinner.message(), "Discovering documents...");
        spinner.finish_with_message("Complete");
    }

    #[test]
    fn test_bar_progress_callback() {
        let progress = BarProgress::new(4);
        progress.on_step_start("Comparing 4 pairs...");
        progress.on_step_progress(3, 4);
        assert_eq!(progress.bar().position(), 3);
        progress.on_step_complete("Comparing pairs", "done");
        assert!(progress.bar().is_finished());
    }

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::GeneralError.code(), 1);
        assert_eq!(ExitCode::InvalidArgs.code(), 2);
        assert_eq!(ExitCode::InputNotFound.code(), 3);
        assert_eq!(ExitCode::OutputError.code(), 4);
        assert_eq!(ExitCode::ProcessingError.code(), 5);
        assert_eq!(ExitCode::NotConformant.code(), 6);
        assert_eq!(ExitCode::RenderError.code(), 7);
    }

    #[test]
    fn test_exit_code_descriptions() {
        assert_eq!(ExitCode::Success.description(), "Success");
        assert!(!ExitCode::NotConformant.description().is_empty());
        assert!(!ExitCode::RenderError.description().is_empty());
    }

    #[test]
    fn test_exit_code_into_i32() {
        let code: i32 = ExitCode::Success.into();
        assert_eq!(code, 0);

        let code: i32 = ExitCode::RenderError.into();
        assert_eq!(code, 7);
    }
}
