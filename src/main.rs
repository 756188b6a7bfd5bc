//! Opsight - LLM-assisted operations analytics
//!
//! A CLI tool that imports production, sales, inventory and customer
//! feedback data, aggregates it, and asks a local Ollama model to answer
//! business questions grounded in those figures.
//!
//! Exit codes:
//!   0 - Success (including "no relevant data" answers)
//!   1 - Runtime error (bad arguments, config, unreadable data file, etc.)
//!   2 - Narrative generation failed

mod analysis;
mod cli;
mod config;
mod error;
mod import;
mod llm;
mod models;
mod report;
mod scanner;
mod service;
mod store;

use analysis::TopicClassifier;
use anyhow::{Context, Result};
use chrono::Local;
use cli::{Args, OutputFormat};
use config::Config;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use llm::{ConversationMemory, OllamaConfig, OllamaGenerator};
use models::Domain;
use report::{AnalysisReport, ReportMetadata, ReportStatus};
use serde::Serialize;
use service::{AnalysisService, DashboardSnapshot, ServiceSettings};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use store::RecordStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Opsight v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .opsight.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(config::CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  .opsight.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .opsight.toml")?;

    println!("✅ Created .opsight.toml with default settings.");
    println!("   Edit it to customize the model, analysis window, language and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", config::CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}

/// One rendered output unit.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum Document {
    Dashboard(DashboardSnapshot),
    Analysis(AnalysisReport),
}

/// Run the requested actions. Returns exit code (0 or 2).
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let service = build_service(&config, Arc::new(RecordStore::new()))?;
    import_sources(&args, &config, &service).await?;

    let mut documents = Vec::new();
    let mut exit_code = 0;

    if args.dashboard {
        documents.push(Document::Dashboard(service.dashboard_snapshot()));
    }

    if let Some(ref question) = args.question {
        let report = answer(&service, question, args.charts, args.quiet).await;
        if report.status == ReportStatus::Failed {
            exit_code = 2;
        }
        documents.push(Document::Analysis(report));
    }

    if !documents.is_empty() {
        let output = render_documents(&documents, args.format)?;
        write_output(&config.general.output, &output)?;
    }

    if args.interactive {
        run_interactive(&service, args.format, args.charts, args.quiet).await?;
    }

    Ok(exit_code)
}

fn build_service(config: &Config, store: Arc<RecordStore>) -> Result<AnalysisService> {
    let generator = OllamaGenerator::new(OllamaConfig {
        ollama_url: config.model.ollama_url.clone(),
        model_name: config.model.name.clone(),
        temperature: config.model.temperature,
        max_tokens: config.model.max_tokens,
        timeout_seconds: config.model.timeout_seconds,
    })
    .context("Failed to create model client")?;

    let mut classifier = TopicClassifier::new();
    for domain in Domain::ALL {
        classifier.extend(domain, config.analysis.keywords.for_domain(domain));
    }

    let settings = ServiceSettings {
        window_months: config.analysis.window_months,
        language: config.analysis.language,
        deadline: Duration::from_secs(config.model.timeout_seconds),
        retries: config.model.retries,
        system_prompt: config.model.system_prompt.clone(),
    };

    Ok(AnalysisService::new(
        store,
        Arc::new(generator),
        ConversationMemory::new(config.memory.max_messages),
        settings,
    )
    .with_classifier(classifier)
    .with_default_user(config.general.user_id.clone()))
}

/// A file waiting to be imported.
struct ImportJob {
    domain: Domain,
    path: PathBuf,
    /// Named on the command line; failures are fatal.
    explicit: bool,
}

/// Parse every data source concurrently, then submit one batch per file.
async fn import_sources(args: &Args, config: &Config, service: &AnalysisService) -> Result<()> {
    if !args.has_data_sources() {
        if !args.quiet {
            eprintln!("ℹ️  No data sources given; answers will ask for data first.");
        }
        return Ok(());
    }

    let mut jobs = Vec::new();

    let explicit = [
        (Domain::Production, &args.production),
        (Domain::Sales, &args.sales),
        (Domain::Inventory, &args.inventory),
        (Domain::Feedback, &args.feedback),
    ];
    for (domain, paths) in explicit {
        jobs.extend(paths.iter().map(|path| ImportJob {
            domain,
            path: path.clone(),
            explicit: true,
        }));
    }

    if let Some(ref dir) = args.data_dir {
        let scan_config = scanner::ScanConfig {
            max_file_size: config.general.max_file_size,
            ..scanner::ScanConfig::default()
        };
        let files = scanner::DataScanner::new(dir.clone(), scan_config).scan()?;
        if files.is_empty() {
            warn!("No data files found in {}", dir.display());
        }
        jobs.extend(files.into_iter().map(|file| {
            debug!("Queued {} as {} ({} bytes)", file.path.display(), file.domain, file.size);
            ImportJob {
                domain: file.domain,
                path: file.path,
                explicit: false,
            }
        }));
    }

    let handles = jobs.into_iter().map(|job| {
        tokio::task::spawn_blocking(move || {
            let result = import::load_file(job.domain, &job.path);
            (job, result)
        })
    });

    for joined in join_all(handles).await {
        let (job, result) = joined.context("Import task panicked")?;
        match result {
            Ok(parsed) => {
                let report = import::submit(service, parsed);
                if !args.quiet {
                    eprintln!(
                        "📥 {} → {}: {} imported, {} skipped",
                        job.path.display(),
                        report.batch_key,
                        report.imported,
                        report.skipped
                    );
                }
            }
            Err(e) if job.explicit => {
                return Err(e).with_context(|| format!("Failed to import {}", job.path.display()));
            }
            Err(e) => warn!("Skipping data file: {}", e),
        }
    }

    for domain in Domain::ALL {
        debug!("{} records stored: {}", domain, service.store().record_count(domain));
    }
    Ok(())
}

/// Spinner shown while the model is generating.
fn generation_spinner(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message("Analyzing...");
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Answer one question for the default caller and wrap the outcome in a report.
async fn answer(service: &AnalysisService, question: &str, charts: bool, quiet: bool) -> AnalysisReport {
    let start_time = Instant::now();
    let spinner = generation_spinner(quiet);

    let metadata = |duration: f64| ReportMetadata {
        question: question.to_string(),
        user_id: service.default_user().to_string(),
        generated_at: Local::now().naive_local(),
        model_used: service.model_name().to_string(),
        duration_seconds: duration,
    };

    let report = if charts {
        let outcome = service.analyze_with_charts(question).await;
        AnalysisReport::from_charted(metadata(start_time.elapsed().as_secs_f64()), outcome)
    } else {
        let analysis = service.analyze(question).await;
        AnalysisReport::from_analysis(metadata(start_time.elapsed().as_secs_f64()), analysis)
    };

    spinner.finish_and_clear();
    report
}

fn render_documents(documents: &[Document], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Markdown => Ok(documents
            .iter()
            .map(|doc| match doc {
                Document::Dashboard(snapshot) => report::generate_dashboard_markdown(snapshot),
                Document::Analysis(analysis) => report::generate_markdown_report(analysis),
            })
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Json => match documents {
            [Document::Dashboard(snapshot)] => report::generate_json_report(snapshot),
            [Document::Analysis(analysis)] => report::generate_json_report(analysis),
            _ => report::generate_json_report(&documents),
        },
    }
}

/// Write to the configured file, or stdout when none is set.
fn write_output(path: &str, content: &str) -> Result<()> {
    if path.is_empty() {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(content.as_bytes())?;
        if !content.ends_with('\n') {
            stdout.write_all(b"\n")?;
        }
        return Ok(());
    }

    std::fs::write(path, content).with_context(|| format!("Failed to write report to {}", path))?;
    eprintln!("✅ Report saved to: {}", path);
    Ok(())
}

const REPL_HELP: &str = "Type a question, or one of:
  :charts       toggle chart series
  :dashboard    show the full-history dashboard
  :memory       show what is remembered for you
  :forget       forget your conversation
  :load FILE    import a data file (domain taken from its name)
  :clear        discard all imported data
  :quit         leave";

/// Read questions and commands from stdin until EOF or :quit.
async fn run_interactive(
    service: &AnalysisService,
    format: OutputFormat,
    mut charts: bool,
    quiet: bool,
) -> Result<()> {
    let user_id = service.default_user();
    eprintln!("💬 Interactive session as '{}'. Type :help for commands.", user_id);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        eprint!("> ");
        std::io::stderr().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (line, ""),
        };

        let output = match command {
            ":quit" | ":q" | ":exit" => break,
            ":help" => REPL_HELP.to_string(),
            ":charts" => {
                charts = !charts;
                format!("Charts {}", if charts { "on" } else { "off" })
            }
            ":dashboard" => render_documents(
                &[Document::Dashboard(service.dashboard_snapshot())],
                format,
            )?,
            ":memory" => {
                let info = service.memory().info(user_id);
                match format {
                    OutputFormat::Json => report::generate_json_report(&info)?,
                    OutputFormat::Markdown => format!(
                        "{} message(s) remembered for {}{} ({} caller(s) in memory)",
                        info.message_count,
                        info.user_id,
                        info.last_activity
                            .map(|at| format!(", last at {}", at.format("%Y-%m-%d %H:%M:%S")))
                            .unwrap_or_default(),
                        service.memory().user_count()
                    ),
                }
            }
            ":forget" => {
                if service.memory().clear(user_id) {
                    "Conversation forgotten".to_string()
                } else {
                    "Nothing to forget".to_string()
                }
            }
            ":clear" => {
                service.clear_all();
                "All imported data discarded".to_string()
            }
            ":load" if !rest.is_empty() => {
                let path = PathBuf::from(rest);
                match import::import_detected(service, &path) {
                    Ok(report) => format!(
                        "{}: {} imported, {} skipped",
                        report.batch_key, report.imported, report.skipped
                    ),
                    Err(e) => format!("Import failed: {}", e),
                }
            }
            c if c.starts_with(':') => format!("Unknown command {}. Type :help.", line),
            _ => {
                let report = answer(service, line, charts, quiet).await;
                render_documents(&[Document::Analysis(report)], format)?
            }
        };

        println!("{}\n", output.trim_end());
    }

    Ok(())
}
