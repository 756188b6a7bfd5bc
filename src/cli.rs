//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::Language;
use clap::Parser;
use std::path::PathBuf;

/// Opsight - LLM-assisted operations analytics
///
/// Import production, sales, inventory and customer-feedback data, then ask
/// questions about it in plain language. Answers come from a local Ollama
/// model grounded in aggregated figures. Markdown/JSON reports.
///
/// Examples:
///   opsight --production prod.json -q "How is production going?"
///   opsight --data-dir ./data -q "各产品销售情况如何" --charts
///   opsight --data-dir ./data --dashboard --format json -o dashboard.json
///   opsight --data-dir ./data --interactive --user alice
///   opsight --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Production data file (JSON rows); repeatable, one batch per file
    #[arg(long, value_name = "FILE")]
    pub production: Vec<PathBuf>,

    /// Sales data file (JSON rows); repeatable
    #[arg(long, value_name = "FILE")]
    pub sales: Vec<PathBuf>,

    /// Inventory data file (JSON rows); repeatable
    #[arg(long, value_name = "FILE")]
    pub inventory: Vec<PathBuf>,

    /// Customer feedback data file (JSON rows); repeatable
    #[arg(long, value_name = "FILE")]
    pub feedback: Vec<PathBuf>,

    /// Directory to scan for data files
    ///
    /// Files are matched by name prefix: production*, sales*, inventory*,
    /// feedback* (or 生产*, 销售*, 库存*, 反馈*) with a .json extension.
    #[arg(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Question to analyze
    #[arg(short, long, value_name = "TEXT")]
    pub question: Option<String>,

    /// Include chart series with the analysis
    #[arg(long)]
    pub charts: bool,

    /// Print the full-history dashboard
    #[arg(long)]
    pub dashboard: bool,

    /// Start an interactive session
    ///
    /// Each line is a question. Commands: :charts, :dashboard, :memory,
    /// :forget, :load FILE, :clear, :quit
    #[arg(short, long)]
    pub interactive: bool,

    /// Caller id used for conversation memory
    #[arg(short, long, value_name = "ID", env = "OPSIGHT_USER")]
    pub user: Option<String>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Output file path for the report (stdout when absent)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Ollama model to use
    ///
    /// Can also be set via OPSIGHT_MODEL env var or .opsight.toml config.
    #[arg(short, long, env = "OPSIGHT_MODEL")]
    pub model: Option<String>,

    /// Ollama API endpoint URL
    #[arg(long, env = "OLLAMA_URL")]
    pub ollama_url: Option<String>,

    /// Temperature for LLM responses (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Generation deadline in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Language for prompts, messages and chart titles
    #[arg(long, value_name = "LANG")]
    pub language: Option<Language>,

    /// Trailing window in months for domain summaries
    #[arg(long, value_name = "MONTHS")]
    pub window_months: Option<u32>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .opsight.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(long)]
    pub quiet: bool,

    /// Generate a default .opsight.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// True when any data source was given.
    pub fn has_data_sources(&self) -> bool {
        self.data_dir.is_some()
            || !self.production.is_empty()
            || !self.sales.is_empty()
            || !self.inventory.is_empty()
            || !self.feedback.is_empty()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.question.is_none() && !self.dashboard && !self.interactive {
            return Err(
                "Nothing to do: pass --question, --dashboard or --interactive".to_string(),
            );
        }

        if let Some(ref question) = self.question {
            if question.trim().is_empty() {
                return Err("Question must not be empty".to_string());
            }
        }

        if self.charts && self.question.is_none() && !self.interactive {
            return Err("--charts needs --question or --interactive".to_string());
        }

        if let Some(ref url) = self.ollama_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Ollama URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=1.0).contains(&temperature) {
                return Err("Temperature must be between 0.0 and 1.0".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref dir) = self.data_dir {
            if !dir.is_dir() {
                return Err(format!("Data directory does not exist: {}", dir.display()));
            }
        }

        let files = self
            .production
            .iter()
            .chain(&self.sales)
            .chain(&self.inventory)
            .chain(&self.feedback);
        for path in files {
            if !path.is_file() {
                return Err(format!("Data file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
