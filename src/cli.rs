//! Command line definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "codeask",
    version,
    about = "Incremental LLM-driven code analysis",
    long_about = "codeask analyzes every matching file of a project with an LLM, keeps the \
                  results in a state file, and combines them into a project summary.\n\n\
                  Only new or changed files are sent to the backend on later runs."
)]
pub struct Cli {
    /// Project directory to analyze
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Comma-separated glob patterns selecting files (e.g. "src/**/*.rs,*.md")
    #[arg(long)]
    pub filter: Option<String>,

    /// Comma-separated glob patterns removing files from the selection
    #[arg(long)]
    pub exclude: Option<String>,

    /// API key (provider environment variables take precedence)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Config file (default: searched in the project directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// AI provider id
    #[arg(long)]
    pub provider: Option<String>,

    /// API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Model name
    #[arg(long)]
    pub model: Option<String>,

    /// Azure OpenAI resource endpoint
    #[arg(long)]
    pub azure_endpoint: Option<String>,

    /// Azure OpenAI deployment name
    #[arg(long)]
    pub azure_deployment: Option<String>,

    /// Azure OpenAI API version
    #[arg(long)]
    pub azure_api_version: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Maximum output tokens per response
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Top-p sampling
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Top-k sampling (Anthropic and Gemini only)
    #[arg(long)]
    pub top_k: Option<u32>,

    /// Number of files analyzed at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// State file or directory to keep it in (default: <PATH>/.codeaskdata)
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// File holding the per-file analysis prompt
    #[arg(long, value_name = "FILE")]
    pub single_page_prompt: Option<PathBuf>,

    /// File holding the project summary prompt
    #[arg(long, value_name = "FILE")]
    pub summary_prompt: Option<PathBuf>,

    /// Re-analyze every file, ignoring stored results
    #[arg(long)]
    pub full_analysis: bool,

    /// Do not print per-file progress
    #[arg(long)]
    pub no_progress: bool,

    /// Log requests, responses and engine decisions
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List supported AI providers
    Providers,
}
