//! Config file discovery and resolution of run settings.
//!
//! Settings are merged with CLI flags first, then the project config file,
//! then built-in defaults. API keys are the exception: provider environment
//! variables win over both flags and files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{Context, Result, bail, eyre};
use serde::Deserialize;
use tracing::{debug, info, warn};

use codeask_analyze::{AnalyzerConfig, STATE_FILE_NAME};
use codeask_provider::{ProviderSettings, api_key_env_vars};
use codeask_scan::{ScanOptions, split_pattern_list};

use crate::cli::Cli;

/// Project-relative config locations, in lookup order.
pub const CONFIG_FILE_NAMES: &[&str] = &[
    "codeask.toml",
    "codeask.yaml",
    "codeask.yml",
    "codeask.json",
    ".codeask/config.toml",
    ".codeask/config.yaml",
    ".codeask/config.yml",
    ".codeask/config.json",
];

const DEFAULT_PROVIDER: &str = "openai";

/// A comma-separated string or a list of patterns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PatternList {
    Joined(String),
    List(Vec<String>),
}

impl PatternList {
    pub fn patterns(&self) -> Vec<String> {
        match self {
            Self::Joined(list) => split_pattern_list(list),
            Self::List(items) => items
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Contents of a config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub api: ApiSection,
    pub analyzer: AnalyzerSection,
    pub templates: TemplatesSection,
    pub filters: Option<PatternList>,
    /// Older spelling of `filters`.
    pub filter: Option<PatternList>,
    /// Deprecated list of file extensions.
    pub extensions: Option<PatternList>,
    pub exclude: Option<PatternList>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub provider: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    #[serde(alias = "azure_endpoint")]
    pub endpoint: Option<String>,
    #[serde(alias = "azure_deployment")]
    pub deployment: Option<String>,
    #[serde(alias = "azure_api_version")]
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalyzerSection {
    pub concurrency: Option<usize>,
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub summary_max_chars: Option<usize>,
    /// State file location, relative to the project root.
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TemplatesSection {
    pub single_page: Option<String>,
    pub summary: Option<String>,
    /// Prompt file relative to the project root; ignored when `single_page` is set.
    pub single_page_file: Option<PathBuf>,
    /// Prompt file relative to the project root; ignored when `summary` is set.
    pub summary_file: Option<PathBuf>,
}

impl FileConfig {
    /// Parse a config file, picking the format from its extension.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let config: Result<Self> = match extension.as_deref() {
            Some("toml") => toml::from_str(&text).map_err(|e| eyre!(e)),
            Some("yaml" | "yml") => serde_yaml::from_str(&text).map_err(|e| eyre!(e)),
            Some("json") => serde_json::from_str(&text).map_err(|e| eyre!(e)),
            _ => bail!(
                "Unsupported config format {} (expected .toml, .yaml, .yml or .json)",
                path.display()
            ),
        };
        config.with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Include patterns from `filters`, `filter` or the deprecated `extensions`.
    pub fn include_patterns(&self) -> Option<Vec<String>> {
        if let Some(list) = self.filters.as_ref().or(self.filter.as_ref()) {
            return Some(list.patterns());
        }

        let extensions = self.extensions.as_ref()?;
        warn!("config field `extensions` is deprecated, use `filters` instead");
        Some(
            extensions
                .patterns()
                .into_iter()
                .map(|ext| format!("**/*{ext}"))
                .collect(),
        )
    }
}

/// First config file present in `root`.
pub fn find_project_config(root: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

/// Config file for `root`: the project's own, else the per-user one.
pub fn discover_config(root: &Path) -> Option<PathBuf> {
    find_project_config(root).or_else(|| {
        let user = dirs::config_dir()?.join("codeask").join("config.toml");
        user.is_file().then_some(user)
    })
}

/// Where the API key came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Env(&'static str),
    Flag,
    ConfigFile,
}

/// Pick the API key for `provider`: environment, then flag, then config file.
pub fn resolve_api_key(
    provider: &str,
    flag: Option<&str>,
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<(String, KeySource)> {
    let present = |key: &str| !key.trim().is_empty();

    for &var in api_key_env_vars(provider) {
        if let Some(key) = env(var).filter(|k| present(k)) {
            return Some((key, KeySource::Env(var)));
        }
    }
    if let Some(key) = flag.filter(|k| present(k)) {
        return Some((key.to_string(), KeySource::Flag));
    }
    file.filter(|k| present(k))
        .map(|key| (key.to_string(), KeySource::ConfigFile))
}

/// Everything a run needs, fully resolved.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub root: PathBuf,
    pub provider: String,
    pub provider_settings: ProviderSettings,
    pub analyzer: AnalyzerConfig,
    pub scan: ScanOptions,
    pub state_path: PathBuf,
    pub incremental: bool,
    pub show_progress: bool,
}

impl RunSettings {
    /// Merge CLI flags with a config file. `root` must be absolute.
    pub fn resolve(
        cli: &Cli,
        root: &Path,
        file: &FileConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let provider = cli
            .provider
            .as_deref()
            .or(file.api.provider.as_deref())
            .unwrap_or(DEFAULT_PROVIDER)
            .trim()
            .to_ascii_lowercase();

        let (api_key, source) = resolve_api_key(
            &provider,
            cli.api_key.as_deref(),
            file.api.api_key.as_deref(),
            env,
        )
        .ok_or_else(|| {
            eyre!(
                "No API key for provider '{provider}'. Set {}, pass --api-key, \
                 or set api.api_key in a config file",
                api_key_env_vars(&provider).join(" or ")
            )
        })?;
        match source {
            KeySource::Env(var) => info!(var, "using API key from environment"),
            KeySource::Flag => info!("using API key from --api-key"),
            KeySource::ConfigFile => info!("using API key from config file"),
        }

        let provider_settings = provider_settings(cli, file, api_key);
        let analyzer = analyzer_config(cli, root, file)?;
        let scan = scan_options(cli, file)?;
        let state_path = state_path(cli, root, file);
        debug!(state = %state_path.display(), provider = %provider, "resolved settings");

        Ok(Self {
            root: root.to_path_buf(),
            provider,
            provider_settings,
            analyzer,
            scan,
            state_path,
            incremental: !cli.full_analysis,
            show_progress: !cli.no_progress,
        })
    }
}

fn provider_settings(cli: &Cli, file: &FileConfig, api_key: String) -> ProviderSettings {
    let api = &file.api;
    let defaults = ProviderSettings::default();

    ProviderSettings {
        api_key,
        model: cli.model.clone().or_else(|| api.model.clone()),
        base_url: cli.base_url.clone().or_else(|| api.base_url.clone()),
        temperature: cli
            .temperature
            .or(api.temperature)
            .unwrap_or(defaults.temperature),
        max_tokens: cli
            .max_tokens
            .or(api.max_tokens)
            .unwrap_or(defaults.max_tokens),
        top_p: cli.top_p.or(api.top_p),
        top_k: cli.top_k.or(api.top_k),
        azure_endpoint: cli.azure_endpoint.clone().or_else(|| api.endpoint.clone()),
        azure_deployment: cli
            .azure_deployment
            .clone()
            .or_else(|| api.deployment.clone()),
        azure_api_version: cli
            .azure_api_version
            .clone()
            .or_else(|| api.api_version.clone()),
        verbose: cli.verbose,
    }
}

fn analyzer_config(cli: &Cli, root: &Path, file: &FileConfig) -> Result<AnalyzerConfig> {
    let section = &file.analyzer;
    let mut builder = AnalyzerConfig::builder();

    if let Some(concurrency) = cli.concurrency.or(section.concurrency) {
        builder.concurrency(concurrency);
    }
    if let Some(attempts) = section.max_attempts {
        builder.max_attempts(attempts);
    }
    if let Some(ms) = section.base_delay_ms {
        builder.base_delay(Duration::from_millis(ms));
    }
    if let Some(ms) = section.max_delay_ms {
        builder.max_delay(Duration::from_millis(ms));
    }
    if let Some(secs) = section.timeout_secs {
        builder.request_timeout(Duration::from_secs(secs));
    }
    if let Some(chars) = section.summary_max_chars {
        builder.summary_max_chars(chars);
    }

    let templates = &file.templates;
    if let Some(prompt) = prompt(
        cli.single_page_prompt.as_deref(),
        templates.single_page.as_deref(),
        templates.single_page_file.as_deref(),
        root,
    )? {
        builder.single_file_prompt(prompt);
    }
    if let Some(prompt) = prompt(
        cli.summary_prompt.as_deref(),
        templates.summary.as_deref(),
        templates.summary_file.as_deref(),
        root,
    )? {
        builder.summary_prompt(prompt);
    }

    builder
        .build()
        .map_err(|e| eyre!("Invalid analyzer settings: {e}"))
}

/// Prompt text from a CLI file, an inline template, or a template file.
fn prompt(
    flag_file: Option<&Path>,
    inline: Option<&str>,
    template_file: Option<&Path>,
    root: &Path,
) -> Result<Option<String>> {
    if let Some(path) = flag_file {
        let text = read_prompt(path)?;
        if text.is_some() {
            return Ok(text);
        }
    }
    if let Some(text) = inline.filter(|t| !t.trim().is_empty()) {
        return Ok(Some(text.to_string()));
    }
    match template_file {
        Some(path) => read_prompt(&root.join(path)),
        None => Ok(None),
    }
}

fn read_prompt(path: &Path) -> Result<Option<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prompt file {}", path.display()))?;
    if text.trim().is_empty() {
        warn!(path = %path.display(), "ignoring empty prompt file");
        return Ok(None);
    }
    Ok(Some(text))
}

fn scan_options(cli: &Cli, file: &FileConfig) -> Result<ScanOptions> {
    let include = match cli.filter.as_deref() {
        Some(list) => split_pattern_list(list),
        None => file.include_patterns().unwrap_or_default(),
    };
    if include.is_empty() {
        bail!(
            "No file filter given. Pass --filter (e.g. --filter 'src/**/*.rs,*.md') \
             or set `filters` in a config file"
        );
    }

    let exclude = match cli.exclude.as_deref() {
        Some(list) => split_pattern_list(list),
        None => file
            .exclude
            .as_ref()
            .map(PatternList::patterns)
            .unwrap_or_default(),
    };

    ScanOptions::builder()
        .include_patterns(include)
        .exclude_patterns(exclude)
        .build()
        .map_err(|e| eyre!("Invalid file filter: {e}"))
}

/// State file location; a directory resolves to the state file inside it.
fn state_path(cli: &Cli, root: &Path, file: &FileConfig) -> PathBuf {
    let path = match (&cli.output, &file.analyzer.output_file) {
        (Some(output), _) => std::path::absolute(output).unwrap_or_else(|_| output.clone()),
        (None, Some(output)) => root.join(output),
        (None, None) => return root.join(STATE_FILE_NAME),
    };

    if path.is_dir() {
        path.join(STATE_FILE_NAME)
    } else {
        path
    }
}
