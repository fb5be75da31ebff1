use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use proteome_dl::app::{App, DownloadResult, FilterResult, LogProgress, filter};
use proteome_dl::catalog::Catalog;
use proteome_dl::config::{ConfigLoader, ConfigOverrides, ResolvedConfig};
use proteome_dl::error::ProteomeError;
use proteome_dl::output::{JsonOutput, OutputMode};
use proteome_dl::selection::{DEFAULT_PAGE_SIZE, Page, Selection};
use proteome_dl::uniprot::UniprotProteomeClient;

#[derive(Parser)]
#[command(name = "proteome-dl")]
#[command(about = "Filter reference proteomes by taxon and download their sequences from UniProt")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true, help = "Reference proteome table (TSV, optionally .gz)")]
    table: Option<Utf8PathBuf>,

    #[arg(long, global = true, help = "UniProtKB REST base URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Preview proteomes matching the given taxa")]
    Filter(FilterArgs),
    #[command(about = "Download matching proteomes as one FASTA file")]
    Download(DownloadArgs),
}

#[derive(Args, Clone)]
struct SelectionArgs {
    #[arg(long, help = "Comma-separated taxon names")]
    taxa: Option<String>,

    #[arg(long, help = "File with one taxon name per line")]
    taxa_file: Option<Utf8PathBuf>,

    #[arg(long, help = "Keep only one proteome per organism")]
    remove_redundancy: bool,
}

#[derive(Args)]
struct FilterArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    #[arg(long, default_value_t = 1)]
    page: usize,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,
}

#[derive(Args)]
struct DownloadArgs {
    #[command(flatten)]
    selection: SelectionArgs,

    #[arg(long, short, default_value = "proteomes.fasta")]
    output: Utf8PathBuf,

    #[arg(long, help = "Maximum concurrent fetches (0 = unlimited)")]
    concurrency: Option<usize>,

    #[arg(long, help = "Per-request timeout in seconds (0 = none)")]
    timeout_secs: Option<u64>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ProteomeError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ProteomeError) -> u8 {
    match error {
        ProteomeError::NoProteomesSelected | ProteomeError::MissingTable(_) => 2,
        ProteomeError::HttpClient(_) => 3,
        ProteomeError::ArtifactCreation(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut overrides = ConfigOverrides {
        reference_table: cli.table,
        base_url: cli.base_url,
        ..ConfigOverrides::default()
    };
    if let Commands::Download(args) = &cli.command {
        overrides.concurrency = args.concurrency;
        overrides.request_timeout_secs = args.timeout_secs;
    }
    let config = ConfigLoader::resolve(cli.config.as_deref(), overrides)?;
    let catalog = Catalog::load(&config.reference_table)?;

    match cli.command {
        Commands::Filter(args) => run_filter(args, &catalog, output_mode),
        Commands::Download(args) => run_download(args, catalog, &config, output_mode),
    }
}

fn selection_from(args: &SelectionArgs) -> Result<Selection, ProteomeError> {
    Selection::from_sources(
        args.taxa.as_deref(),
        args.taxa_file.as_deref(),
        args.remove_redundancy,
    )
}

fn run_filter(args: FilterArgs, catalog: &Catalog, output_mode: OutputMode) -> miette::Result<()> {
    let selection = selection_from(&args.selection)?;
    let page = Page::new(args.page, args.page_size)?;
    let result = filter(catalog, &selection, page);
    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_filter(&result).into_diagnostic(),
        OutputMode::Interactive => {
            print_filter_summary(&result);
            Ok(())
        }
    }
}

fn run_download(
    args: DownloadArgs,
    catalog: Catalog,
    config: &ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let selection = selection_from(&args.selection)?;
    let client = UniprotProteomeClient::with_options(config.http_options())?;
    let app = App::new(catalog, client, config.batch_options());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    let result = runtime.block_on(app.download(&selection, Some(args.output.as_path()), &LogProgress))?;

    match output_mode {
        OutputMode::NonInteractive => JsonOutput::print_download(&result).into_diagnostic(),
        OutputMode::Interactive => {
            print_download_summary(&result);
            Ok(())
        }
    }
}

fn print_filter_summary(result: &FilterResult) {
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!(
        "{cyan}{} proteomes match (page {}, {} per page){reset}",
        result.count, result.page, result.page_size
    );
    for record in &result.preview {
        let count = record
            .protein_count
            .map(|count| count.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{}\t{}\t{}", record.proteome_id, record.organism, count);
    }
}

fn print_download_summary(result: &DownloadResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    println!(
        "{green}Downloaded proteomes: {}/{}{reset}",
        result.entries.len(),
        result.requested
    );
    println!("{green}FASTA file: {}{reset}", result.fasta_file);
    if result.errors.is_empty() {
        return;
    }
    println!("{yellow}Errors: {}{reset}", result.errors.len());
    for error in &result.errors {
        println!("{red}  {error}{reset}");
    }
}
