use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "nl2sql",
    version,
    about = "Few-shot NL2SQL generation and evaluation over a financial warehouse"
)]
pub struct Cli {
    /// Log filter, e.g. `info` or `nl2sql_core=debug`
    #[arg(long, global = true, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// text | json
    #[arg(long, global = true, env = "NL2SQL_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run an experiment grid and write per-question results
    Run(RunArgs),
    /// Answer a single question
    Ask(AskArgs),
    /// Failure analysis of a results file
    Analyze(AnalyzeArgs),
    /// Write a sample experiment config and question set
    Init(InitArgs),
    /// Create the warehouse schema
    InitDb(InitDbArgs),
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = "nl2sql.yaml")]
    pub config: PathBuf,

    /// few-shot | selection | pattern | all (defaults to the config grid)
    #[arg(long)]
    pub experiment: Option<String>,

    /// First question to run, 1-based
    #[arg(long)]
    pub from: Option<usize>,

    /// Last question to run, inclusive
    #[arg(long)]
    pub to: Option<usize>,

    #[arg(long)]
    pub model: Option<String>,

    /// openai | groq | huggingface | fake
    #[arg(long)]
    pub provider: Option<String>,

    /// Continue an interrupted run, skipping questions already in the results file
    #[arg(long)]
    pub resume: bool,

    /// Reject unknown config keys
    #[arg(long)]
    pub strict: bool,

    /// Ignore cached completions (new ones are still recorded)
    #[arg(long)]
    pub refresh_cache: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AskArgs {
    pub question: String,

    /// Experiment config to take provider, database and settings from
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub db: Option<PathBuf>,

    #[arg(long, default_value_t = 5)]
    pub shots: usize,

    #[arg(long, default_value = "similarity")]
    pub strategy: String,

    #[arg(long)]
    pub provider: Option<String>,

    #[arg(long)]
    pub model: Option<String>,

    #[arg(long, default_value_t = 20)]
    pub max_rows: usize,

    /// Narrate the result: general (default), comparison or trend
    #[arg(long, value_name = "KIND", num_args = 0..=1, default_missing_value = "general")]
    pub insights: Option<String>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(long)]
    pub results: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "nl2sql.yaml")]
    pub config: PathBuf,

    #[arg(long, default_value = "questions.json")]
    pub questions: PathBuf,

    /// Also write a .gitignore for results and caches
    #[arg(long)]
    pub gitignore: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitDbArgs {
    #[arg(long, default_value = "warehouse.db")]
    pub db: PathBuf,

    /// Seed the demo data set
    #[arg(long)]
    pub demo: bool,
}
