mod app;
mod keys;

use anyhow::{Context, Result, anyhow};
use app::{App, WindowMode};
use clap::Parser;
use cogtask_experiment::{OutputFormat, Participant, RunConfig, RunPlan};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cogtask")]
#[command(about = "Reaction-time experiments: flanker, Stroop and self-paced reading")]
struct Cli {
    /// TOML run configuration; the built-in arrow flanker run when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Participant id; a millisecond timestamp when omitted.
    #[arg(long, short)]
    participant: Option<String>,
    /// Extra participant metadata written to every row.
    #[arg(long = "property", value_name = "KEY=VALUE", value_parser = parse_property)]
    properties: Vec<(String, String)>,
    /// Seed for the key mapping, sequences and completion code.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long = "output-dir")]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    format: Option<String>,
    #[arg(long = "data-endpoint")]
    data_endpoint: Option<String>,
    #[arg(long = "code-endpoint")]
    code_endpoint: Option<String>,
    /// TrueType/OpenType font for text screens.
    #[arg(long)]
    font: Option<PathBuf>,
    /// Run in a window instead of borderless fullscreen.
    #[arg(long)]
    windowed: bool,
    #[arg(long = "log-json")]
    log_json: bool,
}

fn parse_property(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(cli: &Cli) -> Result<RunConfig> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("loading run configuration {}", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(dir) = &cli.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(format) = &cli.format {
        config.output.format = match format.as_str() {
            "csv" => OutputFormat::Csv,
            "json" => OutputFormat::Json,
            other => return Err(anyhow!("unknown output format `{other}`")),
        };
    }
    if cli.data_endpoint.is_some() {
        config.output.data_endpoint = cli.data_endpoint.clone();
    }
    if cli.code_endpoint.is_some() {
        config.output.code_endpoint = cli.code_endpoint.clone();
    }
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli)?;
    let mut participant = match &cli.participant {
        Some(id) => Participant::new(id.as_str()),
        None => Participant::default(),
    };
    for (key, value) in &cli.properties {
        participant = participant.with_property(key.as_str(), value.as_str());
    }

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let plan = RunPlan::prepare(config, participant, &mut rng).context("preparing the run")?;
    info!(seed = ?cli.seed, "starting");

    let mode = if cli.windowed {
        WindowMode::Windowed
    } else {
        WindowMode::Fullscreen
    };
    let app = App::new(plan, rng, cli.font.as_deref(), mode)?;
    app.run()?;

    Ok(())
}
