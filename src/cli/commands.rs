//! CLI command definitions for pipeforge.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::builder::{BuildConfig, PipelineBuilder, PipelineBuildOutcome};
use crate::guard::PromptGuard;
use crate::llm::LlmClient;

/// Natural-language data pipelines, synthesized and sandbox-tested.
#[derive(Parser)]
#[command(name = "pipeforge")]
#[command(about = "Turn natural-language requests into validated, sandbox-tested data pipelines")]
#[command(version)]
#[command(
    long_about = "pipeforge screens a free-text request, synthesizes a pipeline spec and code\nthrough a generative collaborator, and verifies the result inside a disposable\nsandbox, retrying with failure feedback until the test passes.\n\nExample usage:\n  pipeforge build \"load sales.csv and aggregate revenue by region daily\""
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Build a pipeline from a natural-language request.
    Build(BuildArgs),

    /// Run only the risk gate and print its verdict.
    Gate(GateArgs),
}

/// Arguments for `pipeforge build`.
#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// The natural-language pipeline request.
    pub request: String,

    /// Root directory of input data files.
    #[arg(long, env = "PIPEFORGE_DATA_ROOT")]
    pub data_root: Option<String>,

    /// Output directory for generated pipelines.
    #[arg(long, env = "PIPEFORGE_PIPELINES_ROOT")]
    pub pipelines_root: Option<String>,

    /// Sandbox strategy (venv, docker).
    #[arg(long, env = "PIPEFORGE_SANDBOX")]
    pub sandbox: Option<String>,

    /// Maximum generation+sandbox attempts.
    #[arg(long, env = "PIPEFORGE_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// LLM model override.
    #[arg(short, long, env = "PIPEFORGE_MODEL")]
    pub model: Option<String>,
}

/// Arguments for `pipeforge gate`.
#[derive(Parser, Debug)]
pub struct GateArgs {
    /// The text to analyze.
    pub text: String,

    /// Also apply the strict safe-character allowlist.
    #[arg(long)]
    pub strict: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with pre-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Build(args) => run_build(args).await,
        Commands::Gate(args) => run_gate(args),
    }
}

async fn run_build(args: BuildArgs) -> anyhow::Result<()> {
    let mut config = BuildConfig::from_env()?;
    if let Some(data_root) = args.data_root {
        config.data_root = data_root.into();
    }
    if let Some(pipelines_root) = args.pipelines_root {
        config.pipelines_root = pipelines_root.into();
    }
    if let Some(sandbox) = args.sandbox {
        config.sandbox_strategy = sandbox.parse().map_err(anyhow::Error::msg)?;
    }
    if let Some(max_attempts) = args.max_attempts {
        config.max_attempts = max_attempts;
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    config.validate()?;

    let llm = Arc::new(LlmClient::from_env()?);
    let builder = PipelineBuilder::new(llm, config);

    match builder.build(&args.request).await {
        PipelineBuildOutcome::Success { spec, attempts, .. } => {
            info!(pipeline = %spec.name, attempts = attempts.len(), "pipeline built");
            println!("pipeline built: {}", spec.name);
            println!("  source:      {} ({})", spec.source_path, spec.source_kind);
            println!(
                "  destination: {} ({})",
                spec.destination_name, spec.destination_kind
            );
            println!("  schedule:    {}", spec.schedule);
            println!("  attempts:    {}", attempts.len());
            Ok(())
        }
        PipelineBuildOutcome::Failure {
            reason,
            detail,
            findings,
        } => {
            println!("build failed: {}", reason);
            if !detail.is_empty() {
                println!("  detail: {}", detail);
            }
            for finding in &findings {
                println!(
                    "  finding: {} ({}, {} hit{})",
                    finding.rule,
                    finding.severity,
                    finding.count,
                    if finding.count == 1 { "" } else { "s" }
                );
            }
            anyhow::bail!("build terminated with {}", reason)
        }
    }
}

fn run_gate(args: GateArgs) -> anyhow::Result<()> {
    let guard = PromptGuard::new();
    let assessment = guard.analyze(&args.text);

    println!("decision: {}", assessment.decision);
    println!("score:    {}", assessment.score);
    for finding in &assessment.findings {
        println!(
            "  {} ({}, {} hit{}): {}",
            finding.rule,
            finding.severity,
            finding.count,
            if finding.count == 1 { "" } else { "s" },
            finding.description
        );
    }
    if args.strict {
        println!(
            "allowlist: {}",
            if guard.allowlist_only(&assessment.cleaned) {
                "pass"
            } else {
                "fail"
            }
        );
    }
    Ok(())
}
