use super::args::*;
use nl2sql_core::config::{load_config, ExperimentConfig, ExperimentPreset, ProviderKind};
use nl2sql_core::dataset::{load_questions, select_range, SAMPLE_QUESTIONS};
use nl2sql_core::errors::ConfigError;
use nl2sql_core::generator::SqlGenerator;
use nl2sql_core::insights::{InsightGenerator, InsightKind};
use nl2sql_core::model::SelectionStrategy;
use nl2sql_core::report::{analysis, console};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::Ordering;

pub mod build;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const GENERATION_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const INTERRUPTED: i32 = 130;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => cmd_run(args).await,
        Command::Ask(args) => cmd_ask(args).await,
        Command::Analyze(args) => cmd_analyze(args),
        Command::Init(args) => cmd_init(args),
        Command::InitDb(args) => cmd_init_db(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn is_config_error(e: &anyhow::Error) -> bool {
    e.chain().any(|c| c.to_string().starts_with("config error"))
}

/// Prints setup failures and turns them into exit code 2; anything else propagates.
fn config_failure(e: anyhow::Error) -> anyhow::Result<i32> {
    if is_config_error(&e) {
        eprintln!("{}", e);
        Ok(exit_codes::CONFIG_ERROR)
    } else {
        Err(e)
    }
}

fn apply_provider_override(cfg: &mut ExperimentConfig, provider: Option<&str>) -> Result<(), ConfigError> {
    if let Some(p) = provider {
        cfg.provider = ProviderKind::parse(p)
            .ok_or_else(|| ConfigError(format!("unknown provider: {}", p)))?;
    }
    Ok(())
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<i32> {
    match run_experiment(&args).await {
        Ok(code) => Ok(code),
        Err(e) => config_failure(e),
    }
}

async fn run_experiment(args: &RunArgs) -> anyhow::Result<i32> {
    let mut cfg = load_config(&args.config, args.strict)?;
    apply_provider_override(&mut cfg, args.provider.as_deref())?;

    let preset = match &args.experiment {
        Some(name) => Some(
            ExperimentPreset::parse(name)
                .ok_or_else(|| ConfigError(format!("unknown experiment: {}", name)))?,
        ),
        None => None,
    };
    if let Some(name) = &args.experiment {
        cfg.experiment = format!("{}_{}", cfg.experiment, name.replace('-', "_"));
    }

    let questions = select_range(load_questions(&cfg.questions)?, args.from, args.to);
    let configs = cfg.configurations(preset, args.model.as_deref());

    tracing::info!(
        event = "nl2sql.cli.run",
        experiment = %cfg.experiment,
        provider = cfg.provider.as_str(),
        questions = questions.len(),
        configurations = configs.len(),
        resume = args.resume
    );

    let runner = build::build_runner(&cfg, &questions, &configs, args.resume, args.refresh_cache)?;
    let stop = runner.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received; finishing the current question");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let run = runner.run(&questions, &configs).await?;

    let carried = run.records.len().saturating_sub(run.processed);
    for rec in run.records.iter().skip(carried) {
        console::print_record(rec);
    }
    console::print_run_summary(&run.summary);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&run.summary)?);
    }
    if let Some(cache) = build::open_cache(&cfg)? {
        let stats = cache.stats()?;
        tracing::info!(
            event = "nl2sql.cache.stats",
            completions = stats.completions,
            embeddings = stats.embeddings
        );
    }
    eprintln!("results: {}", run.results_path.display());
    eprintln!("summary: {}", run.summary_path.display());

    if run.interrupted {
        eprintln!(
            "stopped after {} question(s); rerun with --resume to continue",
            run.processed
        );
        return Ok(exit_codes::INTERRUPTED);
    }
    Ok(exit_codes::OK)
}

async fn cmd_ask(args: AskArgs) -> anyhow::Result<i32> {
    match ask(&args).await {
        Ok(code) => Ok(code),
        Err(e) => config_failure(e),
    }
}

async fn ask(args: &AskArgs) -> anyhow::Result<i32> {
    let mut cfg = match &args.config {
        Some(path) => load_config(path, false)?,
        None => {
            let mut cfg = ExperimentConfig::adhoc("warehouse.db".into());
            cfg.settings.cache = false;
            cfg
        }
    };
    if let Some(db) = &args.db {
        cfg.database = db.clone();
    }
    apply_provider_override(&mut cfg, args.provider.as_deref())?;
    let model = args.model.clone().unwrap_or_else(|| cfg.model.clone());
    let strategy = SelectionStrategy::parse(&args.strategy)
        .ok_or_else(|| ConfigError(format!("unknown strategy: {}", args.strategy)))?;
    let insight_kind = match &args.insights {
        Some(kind) => Some(
            InsightKind::parse(kind)
                .ok_or_else(|| ConfigError(format!("unknown insights kind: {}", kind)))?,
        ),
        None => None,
    };

    let cache = build::open_cache(&cfg)?;
    let store = build::open_store(&cfg)?;
    store.probe().await?;
    let selector = build::build_selector(&cfg, cache.as_ref())?;
    let client = build::build_client(&cfg, &model, &HashMap::new(), cache.as_ref(), false)?;
    let generator = SqlGenerator::new(
        client,
        store,
        build::build_prompts(&cfg)?,
        build::generator_settings(&cfg),
    );

    let examples = match selector.select(&args.question, args.shots, strategy).await {
        Ok(ex) => ex,
        Err(e) => {
            let res = cfg.settings.on_embedding_error.apply_to_error(&e);
            if res.is_blocked() {
                eprintln!("{}", res.message());
                return Ok(exit_codes::GENERATION_FAILED);
            }
            nl2sql_core::on_error::log_fail_safe(res.message(), "ask");
            selector
                .select(&args.question, args.shots, SelectionStrategy::FirstN)
                .await?
        }
    };

    let gen = generator.generate(&args.question, &examples).await;
    match (&gen.sql, &gen.result) {
        (Some(sql), Some(table)) => {
            println!("{}", sql);
            println!();
            println!("{}", table.render(args.max_rows));
            eprintln!(
                "{} row(s) in {:.3}s after {} attempt(s)",
                table.row_count(),
                gen.execution_time,
                gen.attempts.len()
            );
            if let Some(kind) = insight_kind {
                let insights = InsightGenerator::new(generator.client().clone());
                match insights.generate(kind, &args.question, sql, table).await {
                    Ok(found) => {
                        println!();
                        println!("Insights");
                        println!("Summary: {}", found.summary);
                        println!();
                        println!("{}", found.full_text);
                    }
                    Err(e) => eprintln!("insights unavailable: {:#}", e),
                }
            }
            Ok(exit_codes::OK)
        }
        _ => {
            if let Some(sql) = &gen.last_sql {
                eprintln!("last statement: {}", sql);
            }
            eprintln!(
                "generation failed after {} attempt(s): {}",
                gen.attempts.len(),
                gen.error.as_deref().unwrap_or("unknown error")
            );
            Ok(exit_codes::GENERATION_FAILED)
        }
    }
}

fn cmd_analyze(args: AnalyzeArgs) -> anyhow::Result<i32> {
    if !args.results.exists() {
        eprintln!(
            "config error: results file {} does not exist",
            args.results.display()
        );
        return Ok(exit_codes::CONFIG_ERROR);
    }
    let records = nl2sql_core::storage::results::read_records(&args.results)?;
    print!("{}", analysis::analyze(&records).render());
    Ok(exit_codes::OK)
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    write_file_if_missing(&args.config, nl2sql_core::config::SAMPLE_CONFIG)?;
    write_file_if_missing(&args.questions, SAMPLE_QUESTIONS)?;
    if args.gitignore {
        write_file_if_missing(Path::new(".gitignore"), crate::templates::GITIGNORE)?;
    }
    Ok(exit_codes::OK)
}

fn cmd_init_db(args: InitDbArgs) -> anyhow::Result<i32> {
    if args.db.exists() {
        eprintln!("note: {} already exists (skipped)", args.db.display());
        return Ok(exit_codes::OK);
    }
    nl2sql_core::executor::warehouse::create_database(&args.db, args.demo)?;
    eprintln!(
        "created {}{}",
        args.db.display(),
        if args.demo { " with demo data" } else { "" }
    );
    Ok(exit_codes::OK)
}

fn write_file_if_missing(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::write(path, content)?;
        eprintln!("created {}", path.display());
    } else {
        eprintln!("note: {} already exists (skipped)", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_recognized_through_context() {
        let e = anyhow::Error::new(ConfigError("bad".into())).context("while loading");
        assert!(is_config_error(&e));
        assert!(!is_config_error(&anyhow::anyhow!("disk full")));
    }

    #[test]
    fn provider_override_rejects_unknown_names() {
        let mut cfg = ExperimentConfig::adhoc("wh.db".into());
        assert!(apply_provider_override(&mut cfg, Some("fake")).is_ok());
        assert_eq!(cfg.provider, ProviderKind::Fake);
        assert!(apply_provider_override(&mut cfg, Some("nope")).is_err());
    }
}
