use crate::errors::ConfigError;
use crate::model::{Configuration, RowOrder, SelectionStrategy};
use crate::on_error::ErrorPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(rename = "configVersion", alias = "version", default = "default_version")]
    pub version: u32,
    pub experiment: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub provider: ProviderKind,
    /// Override for OpenAI-compatible local servers.
    #[serde(default)]
    pub base_url: Option<String>,
    pub questions: PathBuf,
    pub database: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub pool: Option<PathBuf>,
    #[serde(default)]
    pub embedder: EmbedderKind,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub grid: Option<Grid>,
}

fn default_version() -> u32 {
    SUPPORTED_CONFIG_VERSION
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    #[serde(rename = "openai")]
    OpenAI,
    Groq,
    #[serde(rename = "huggingface", alias = "hf")]
    HuggingFace,
    /// Offline oracle that answers with the ground truth of each question.
    Fake,
}

impl ProviderKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAI),
            "groq" => Some(Self::Groq),
            "huggingface" | "hf" => Some(Self::HuggingFace),
            "fake" => Some(Self::Fake),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Groq => "groq",
            ProviderKind::HuggingFace => "huggingface",
            ProviderKind::Fake => "fake",
        }
    }

    /// Environment variable holding the credential, if the provider needs one.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAI => Some("OPENAI_API_KEY"),
            ProviderKind::Groq => Some("GROQ_API_KEY"),
            ProviderKind::HuggingFace => Some("HUGGINGFACE_API_KEY"),
            ProviderKind::Fake => None,
        }
    }

    pub fn api_key(&self) -> Result<Option<String>, ConfigError> {
        let Some(var) = self.api_key_env() else {
            return Ok(None);
        };
        match std::env::var(var) {
            Ok(v) if !v.trim().is_empty() => Ok(Some(v)),
            _ => Err(ConfigError(format!(
                "provider {} needs {} to be set",
                self.as_str(),
                var
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Local feature hashing, no network.
    #[default]
    Hashing,
    #[serde(rename = "openai")]
    OpenAI,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_attempts: u32,
    pub retry_extraction_failures: bool,
    pub timeout_seconds: u64,
    pub execution_timeout_ms: u64,
    pub min_request_interval_ms: u64,
    pub rate_limit_wait_seconds: u64,
    pub rate_limit_retries: u32,
    pub max_tokens: u32,
    pub token_budget: Option<usize>,
    pub row_order: RowOrder,
    pub seed: u64,
    pub on_embedding_error: ErrorPolicy,
    pub cache: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_extraction_failures: true,
            timeout_seconds: 60,
            execution_timeout_ms: 30_000,
            min_request_interval_ms: 2_500,
            rate_limit_wait_seconds: 60,
            rate_limit_retries: 3,
            max_tokens: 512,
            token_budget: None,
            row_order: RowOrder::Auto,
            seed: 42,
            on_embedding_error: ErrorPolicy::Block,
            cache: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Grid {
    pub shots: Vec<usize>,
    pub strategies: Vec<SelectionStrategy>,
    pub models: Vec<String>,
}

/// Named experiment grids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentPreset {
    /// Number of examples, fixed pool order.
    FewShot,
    /// Selection strategies at k=10.
    Selection,
    /// Similarity at k=15, read per SQL pattern.
    Pattern,
    All,
}

impl ExperimentPreset {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "few-shot" | "fewshot" => Some(Self::FewShot),
            "selection" => Some(Self::Selection),
            "pattern" | "patterns" => Some(Self::Pattern),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn configurations(&self, model: &str) -> Vec<Configuration> {
        match self {
            ExperimentPreset::FewShot => [0, 3, 5, 10, 15]
                .into_iter()
                .map(|k| Configuration::new(k, SelectionStrategy::FirstN, model))
                .collect(),
            ExperimentPreset::Selection => [
                SelectionStrategy::Random,
                SelectionStrategy::PatternBased,
                SelectionStrategy::Similarity,
            ]
            .into_iter()
            .map(|s| Configuration::new(10, s, model))
            .collect(),
            ExperimentPreset::Pattern => {
                vec![Configuration::new(15, SelectionStrategy::Similarity, model)]
            }
            ExperimentPreset::All => dedup(
                [Self::FewShot, Self::Selection, Self::Pattern]
                    .iter()
                    .flat_map(|p| p.configurations(model))
                    .collect(),
            ),
        }
    }
}

fn dedup(configs: Vec<Configuration>) -> Vec<Configuration> {
    let mut seen = HashSet::new();
    configs
        .into_iter()
        .filter(|c| seen.insert(c.label()))
        .collect()
}

impl ExperimentConfig {
    /// The configurations to run: the preset when one is given, otherwise
    /// the grid, otherwise similarity at k=5 on the configured model.
    pub fn configurations(
        &self,
        preset: Option<ExperimentPreset>,
        model_override: Option<&str>,
    ) -> Vec<Configuration> {
        let model = model_override.unwrap_or(&self.model);
        if let Some(p) = preset {
            return p.configurations(model);
        }
        let Some(grid) = &self.grid else {
            return vec![Configuration::new(5, SelectionStrategy::Similarity, model)];
        };

        let models: Vec<&str> = match model_override {
            Some(m) => vec![m],
            None if grid.models.is_empty() => vec![self.model.as_str()],
            None => grid.models.iter().map(String::as_str).collect(),
        };
        let strategies = if grid.strategies.is_empty() {
            vec![SelectionStrategy::Similarity]
        } else {
            grid.strategies.clone()
        };
        let shots = if grid.shots.is_empty() {
            vec![5]
        } else {
            grid.shots.clone()
        };

        let mut out = Vec::new();
        for m in &models {
            for s in &strategies {
                for k in &shots {
                    out.push(Configuration::new(*k, *s, m));
                }
            }
        }
        dedup(out)
    }

    /// Minimal configuration for one-off questions against `database`.
    pub fn adhoc(database: PathBuf) -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            experiment: "ask".to_string(),
            model: default_model(),
            provider: ProviderKind::default(),
            base_url: None,
            questions: PathBuf::new(),
            database,
            output_dir: default_output_dir(),
            pool: None,
            embedder: EmbedderKind::default(),
            embedding_model: default_embedding_model(),
            settings: Settings::default(),
            grid: None,
        }
    }

    pub fn cache_path(&self) -> PathBuf {
        self.output_dir.join(".nl2sql").join("cache.db")
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError(format!(
                "unsupported configVersion {} (supported: {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }
        if self.experiment.trim().is_empty() {
            return Err(ConfigError("experiment name must not be empty".into()));
        }
        if self.settings.max_attempts == 0 {
            return Err(ConfigError("settings.max_attempts must be at least 1".into()));
        }
        if self.settings.token_budget == Some(0) {
            return Err(ConfigError("settings.token_budget must be positive".into()));
        }
        Ok(())
    }

    fn resolve_paths(&mut self, config_path: &Path) {
        let base = config_path.parent().unwrap_or(Path::new("."));
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.questions);
        resolve(&mut self.database);
        resolve(&mut self.output_dir);
        if let Some(p) = self.pool.as_mut() {
            resolve(p);
        }
    }
}

/// Loads an experiment file. Relative paths inside it are resolved against
/// the file's directory. Unknown keys fail in strict mode and warn otherwise.
pub fn load_config(path: &Path, strict: bool) -> Result<ExperimentConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;
    let mut cfg = parse_config(&raw, strict)
        .map_err(|e| ConfigError(format!("{} (file: {})", e.0, path.display())))?;
    cfg.resolve_paths(path);
    Ok(cfg)
}

pub fn parse_config(raw: &str, strict: bool) -> Result<ExperimentConfig, ConfigError> {
    let mut ignored_keys = Vec::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);
    let cfg: ExperimentConfig = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.push(path.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML: {}", e)))?;

    let meaningful: Vec<_> = ignored_keys
        .iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();
    if !meaningful.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "unknown fields in strict mode: {:?}",
                meaningful
            )));
        }
        tracing::warn!(event = "nl2sql.config.unknown_fields", fields = ?meaningful);
    }

    cfg.validate()?;
    Ok(cfg)
}

pub const SAMPLE_CONFIG: &str = r#"configVersion: 1
experiment: demo
provider: fake
model: fake
questions: questions.json
database: warehouse.db
output_dir: results
embedder: hashing
settings:
  max_attempts: 3
  retry_extraction_failures: true
  min_request_interval_ms: 0
  execution_timeout_ms: 10000
  row_order: auto
  on_embedding_error: block
grid:
  shots: [0, 3, 5]
  strategies: [first_n, similarity]
"#;

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(path, SAMPLE_CONFIG)
        .map_err(|e| ConfigError(format!("failed to write sample config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_parses_with_defaults() {
        let cfg = parse_config(SAMPLE_CONFIG, true).unwrap();
        assert_eq!(cfg.provider, ProviderKind::Fake);
        assert_eq!(cfg.settings.rate_limit_retries, 3);
        assert_eq!(cfg.settings.rate_limit_wait_seconds, 60);
        assert_eq!(cfg.settings.seed, 42);
        let labels: Vec<_> = cfg
            .configurations(None, None)
            .iter()
            .map(|c| c.label())
            .collect();
        assert_eq!(
            labels,
            [
                "first_n-0shot@fake",
                "first_n-3shot@fake",
                "first_n-5shot@fake",
                "similarity-0shot@fake",
                "similarity-3shot@fake",
                "similarity-5shot@fake",
            ]
        );
    }

    #[test]
    fn unknown_keys_fail_only_in_strict_mode() {
        let raw = "experiment: x\nquestions: q.json\ndatabase: d.db\nbogus: 1\n";
        let err = parse_config(raw, true).unwrap_err();
        assert!(err.to_string().contains("bogus"));
        assert!(parse_config(raw, false).is_ok());
    }

    #[test]
    fn rejects_bad_version_and_zero_attempts() {
        let raw = "configVersion: 2\nexperiment: x\nquestions: q.json\ndatabase: d.db\n";
        assert!(parse_config(raw, false).is_err());
        let raw = "experiment: x\nquestions: q.json\ndatabase: d.db\nsettings:\n  max_attempts: 0\n";
        assert!(parse_config(raw, false)
            .unwrap_err()
            .to_string()
            .starts_with("config error:"));
    }

    #[test]
    fn presets_match_experiment_grids() {
        let few = ExperimentPreset::FewShot.configurations("m");
        assert_eq!(
            few.iter().map(|c| c.num_few_shot_examples).collect::<Vec<_>>(),
            [0, 3, 5, 10, 15]
        );
        let sel = ExperimentPreset::Selection.configurations("m");
        assert!(sel.iter().all(|c| c.num_few_shot_examples == 10));
        assert_eq!(sel.len(), 3);
        assert_eq!(ExperimentPreset::All.configurations("m").len(), 9);
        assert_eq!(ExperimentPreset::parse("few_shot"), Some(ExperimentPreset::FewShot));
    }

    #[test]
    fn model_override_replaces_grid_models() {
        let raw = "experiment: x\nquestions: q.json\ndatabase: d.db\ngrid:\n  shots: [1]\n  models: [a, b]\n";
        let cfg = parse_config(raw, true).unwrap();
        assert_eq!(cfg.configurations(None, None).len(), 2);
        let over = cfg.configurations(None, Some("c"));
        assert_eq!(over.len(), 1);
        assert_eq!(over[0].model_name, "c");
    }

    #[test]
    fn paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp.yaml");
        write_sample_config(&path).unwrap();
        let cfg = load_config(&path, true).unwrap();
        assert_eq!(cfg.questions, dir.path().join("questions.json"));
        assert_eq!(cfg.cache_path(), dir.path().join("results/.nl2sql/cache.db"));
    }

    #[test]
    fn fake_provider_needs_no_key() {
        assert_eq!(ProviderKind::Fake.api_key().unwrap(), None);
        assert_eq!(ProviderKind::Groq.api_key_env(), Some("GROQ_API_KEY"));
    }
}
