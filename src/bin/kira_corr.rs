use std::fs::{self, File};
use std::process::ExitCode;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use crossterm::style::Stylize;
use miette::IntoDiagnostic;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use kira_corr::app::{self, App, RunOptions, RunReport, SignificantReport, StatusReport};
use kira_corr::config::{CONFIG_FILE, Config, ConfigLoader};
use kira_corr::domain::{CorrelationSign, GeoSeriesAccession};
use kira_corr::error::KiraError;
use kira_corr::geo::GeoHttpClient;
use kira_corr::output::{JsonOutput, OutputMode};
use kira_corr::progress::{ProgressSink, TracingSink};
use kira_corr::prompt::Console;
use kira_corr::results::CorrelationRecord;
use kira_corr::store::Store;

#[derive(Parser)]
#[command(name = "kira-corr")]
#[command(about = "Correlate a target gene against hepatic fibrosis markers in GEO expression matrices")]
#[command(version, author)]
struct Cli {
    /// Config file (defaults to kira-corr.json when present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print machine-readable JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Acquire, select and correlate (default)")]
    Run(RunArgs),
    #[command(about = "Show which artifacts of a dataset are cached")]
    Status(DatasetArgs),
    #[command(about = "Print significant correlations from a stored summary")]
    Significant(SignificantArgs),
}

#[derive(Args, Clone, Default)]
struct DatasetArgs {
    /// GEO series accession, e.g. GSE300437
    #[arg(long)]
    gse: Option<String>,

    #[arg(long)]
    data_dir: Option<String>,
}

#[derive(Args, Clone, Default)]
struct SelectionArgs {
    #[arg(long)]
    p_threshold: Option<f64>,

    /// Correlation directions to report; repeatable
    #[arg(long = "sign", value_enum)]
    signs: Vec<CorrelationSign>,
}

#[derive(Args, Clone, Default)]
struct RunArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    #[command(flatten)]
    selection: SelectionArgs,

    /// Target gene symbol, e.g. Polb
    #[arg(long)]
    gene: Option<String>,

    /// Restrict matrices to the samples of the selected groups
    #[arg(long)]
    strict: bool,

    /// Do not write the bundle and summary caches
    #[arg(long)]
    no_storage: bool,

    /// Probe the target gene in every loaded matrix
    #[arg(long)]
    debug: bool,

    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Ignore cached bundle and summary (downloads are still reused)
    #[arg(long)]
    refresh: bool,
}

#[derive(Args, Clone, Default)]
struct SignificantArgs {
    #[command(flatten)]
    dataset: DatasetArgs,

    #[command(flatten)]
    selection: SelectionArgs,
}

impl DatasetArgs {
    fn overrides(&self) -> Config {
        Config {
            gse_id: self.gse.clone(),
            data_dir: self.data_dir.clone(),
            ..Config::default()
        }
    }
}

impl SelectionArgs {
    fn apply(&self, config: &mut Config) {
        if self.p_threshold.is_some() {
            config.p_threshold = self.p_threshold;
        }
        if !self.signs.is_empty() {
            config.signs = Some(self.signs.clone());
        }
    }
}

impl RunArgs {
    fn overrides(&self) -> Config {
        let mut config = self.dataset.overrides();
        self.selection.apply(&mut config);
        config.target_gene = self.gene.clone();
        config.strict_mode = self.strict.then_some(true);
        config.storage = self.no_storage.then_some(false);
        config.debug = self.debug.then_some(true);
        config.timeout_secs = self.timeout_secs;
        config
    }
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(kira) = report.downcast_ref::<KiraError>() {
            return ExitCode::from(map_exit_code(kira));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &KiraError) -> u8 {
    match error {
        KiraError::DatasetNotFound(_)
        | KiraError::MissingConfig
        | KiraError::BundleUnavailable { .. } => 2,
        KiraError::GeoHttp(_) | KiraError::GeoStatus { .. } | KiraError::GeoResolution(_) => 3,
        KiraError::EmptyAnalysis(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    let cli = Cli::parse();
    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run_pipeline(cli.config.as_deref(), args, mode),
        Commands::Status(args) => {
            init_tracing(None)?;
            let config = load_config(cli.config.as_deref(), args.overrides())?;
            let (store, accession) = dataset_target(&config)?;
            let report = app::status(&store, &accession);
            match mode {
                OutputMode::Json => JsonOutput::print_status(&report).into_diagnostic(),
                OutputMode::Human => {
                    print_status(&report);
                    Ok(())
                }
            }
        }
        Commands::Significant(args) => {
            init_tracing(None)?;
            let mut overrides = args.dataset.overrides();
            args.selection.apply(&mut overrides);
            let config = load_config(cli.config.as_deref(), overrides)?;
            let (store, accession) = dataset_target(&config)?;
            let (p_threshold, signs) = ConfigLoader::selection_criteria(&config)?;
            let report = app::cached_significant(&store, &accession, p_threshold, &signs)?;
            match mode {
                OutputMode::Json => JsonOutput::print_significant(&report).into_diagnostic(),
                OutputMode::Human => {
                    print_significant(&report);
                    Ok(())
                }
            }
        }
    }
}

fn run_pipeline(config_path: Option<&str>, args: RunArgs, mode: OutputMode) -> miette::Result<()> {
    let config = load_config(config_path, args.overrides())?;
    let resolved = ConfigLoader::resolve_config(config)?;
    init_tracing(Some(resolved.log_dir.as_path()))?;

    let store = Store::new_with_root(resolved.data_dir.clone());
    let geo = GeoHttpClient::new(resolved.timeout)?;
    let app = App::new(store, geo, Console::stdio(), resolved);
    let options = RunOptions {
        refresh: args.refresh,
    };

    match mode {
        OutputMode::Json => {
            let report = app.run(options, &JsonOutput)?;
            JsonOutput::print_run(&report).into_diagnostic()
        }
        OutputMode::Human => {
            let sink: &dyn ProgressSink = &TracingSink;
            let report = app.run(options, sink)?;
            print_run_summary(&report);
            Ok(())
        }
    }
}

fn load_config(path: Option<&str>, overrides: Config) -> miette::Result<Config> {
    let file = match ConfigLoader::read(path) {
        Ok(config) => config,
        Err(KiraError::MissingConfig) => Config::default(),
        Err(err) => return Err(err.into()),
    };
    Ok(file.merge(overrides))
}

fn dataset_target(config: &Config) -> miette::Result<(Store, GeoSeriesAccession)> {
    let accession = config
        .gse_id
        .as_deref()
        .ok_or_else(|| {
            KiraError::InvalidConfig(format!(
                "gse_id is required (set it in {CONFIG_FILE} or pass --gse)"
            ))
        })?
        .parse::<GeoSeriesAccession>()?;
    let data_dir = config.data_dir.clone().unwrap_or_else(|| "data".to_string());
    Ok((Store::new_with_root(Utf8PathBuf::from(data_dir)), accession))
}

fn init_tracing(log_dir: Option<&Utf8Path>) -> miette::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let file_layer = match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir.as_std_path()).into_diagnostic()?;
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            let path = dir.join(format!("{stamp}_kira-corr_error.log"));
            let file = File::create(path.as_std_path()).into_diagnostic()?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::ERROR),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .into_diagnostic()
}

fn print_run_summary(report: &RunReport) {
    println!(
        "{}",
        format!("kira-corr summary: {} / {}", report.accession, report.target_gene).cyan()
    );
    println!("acquisition: {:?}, analysis: {:?}", report.acquisition, report.analysis);
    println!(
        "{}",
        format!("correlations computed: {}", report.record_count).green()
    );
    print_records(&report.significant, report.p_threshold, &report.signs);
    if let Some(path) = &report.bundle_path {
        println!("bundle:  {path}");
    }
    if let Some(path) = &report.summary_path {
        println!("summary: {path}");
    }
}

fn print_status(report: &StatusReport) {
    let mark = |cached: bool| if cached { "cached".green() } else { "missing".yellow() };
    println!("{}", format!("{} in {}", report.accession, report.dataset_dir).cyan());
    println!("bundle:  {} ({})", mark(report.plan.bundle_cached), report.bundle_path);
    println!("summary: {} ({})", mark(report.plan.results_cached), report.summary_path);
}

fn print_significant(report: &SignificantReport) {
    println!(
        "{}",
        format!("{} / {}", report.accession, report.target_gene).cyan()
    );
    print_records(&report.records, report.p_threshold, &report.signs);
}

fn print_records(records: &[CorrelationRecord], p_threshold: f64, signs: &[CorrelationSign]) {
    let signs = signs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    if records.is_empty() {
        println!(
            "{}",
            format!("no correlation passes p < {p_threshold} ({signs})").yellow()
        );
        return;
    }
    println!("significant at p < {p_threshold} ({signs}):");
    for record in records {
        println!(
            "  {:<28} {:<20} {:<8} r={:>7.3} p={:.2e}",
            record.matrix, record.category, record.gene, record.r, record.p_value
        );
    }
}
