use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use jobint_pipeline::{report_markdown, Pipeline, PipelineConfig, SkillScope, UnknownMemberPolicy};
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "jobint-cli")]
#[command(about = "Job offer warehouse batch pipeline")]
struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest the snapshot and rebuild every layer (default).
    Run(RunArgs),
    /// Summarize the most recent runs as Markdown.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
        /// Data directory to read reports from (defaults to JOBINT_DATA_DIR).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

/// Overrides for the `JOBINT_*` environment settings.
#[derive(Debug, Default, Args)]
struct RunArgs {
    #[arg(long)]
    source: Option<PathBuf>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Directory holding categories/contract_types/work_types/skills YAML.
    #[arg(long)]
    rules_dir: Option<PathBuf>,
    /// `description` or `description-and-title`.
    #[arg(long)]
    skill_scope: Option<SkillScope>,
    /// Drop facts with null dimensions instead of using Unknown members.
    #[arg(long)]
    exclude_unknown: bool,
    #[arg(long)]
    no_parquet: bool,
}

impl RunArgs {
    fn apply(self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(source) = self.source {
            config.source_path = source;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if self.rules_dir.is_some() {
            config.rules_dir = self.rules_dir;
        }
        if let Some(scope) = self.skill_scope {
            config.skill_scope = scope;
        }
        if self.exclude_unknown {
            config.unknown_members = UnknownMemberPolicy::Exclude;
        }
        if self.no_parquet {
            config.write_parquet = false;
        }
        config
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = match cli.verbose {
        0 => "jobint=info",
        1 => "jobint=debug",
        _ => "jobint=trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            let config = args.apply(PipelineConfig::from_env());
            let pipeline = Pipeline::new(config)?;
            let summary = match pipeline.run_once().await {
                Ok(summary) => summary,
                Err(err) => {
                    let stage = err.halted_stage().map(|s| s.name()).unwrap_or("setup");
                    error!(stage, error = %err, "run failed");
                    return Err(err.into());
                }
            };
            println!(
                "run complete: run_id={} facts={} skills={} data_dir={}",
                summary.run_id,
                summary.table_row_counts.get("fact_job_offers").copied().unwrap_or(0),
                summary.table_row_counts.get("fact_job_skills").copied().unwrap_or(0),
                summary.data_dir
            );
        }
        Commands::Report { runs, data_dir } => {
            let data_dir = data_dir.unwrap_or_else(|| PipelineConfig::from_env().data_dir);
            println!("{}", report_markdown(&data_dir, runs)?);
        }
    }

    Ok(())
}
