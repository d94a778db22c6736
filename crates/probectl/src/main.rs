//! probectl: drive a transform-probe controller from the command line.
//!
//! Builds a controller from a TOML settings file (plus the usual environment
//! overrides), wires a shell command as the transformer, and fires a sequence
//! of live/ready probes at it.
//!
//! # Usage
//!
//! ```text
//! probectl init --source quick.png --target quick.jpg --expected 1200 > probe.toml
//! probectl run --settings probe.toml --probes ready,live,live -- convert {source} {target}
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use transform_probe::{
    CommandTransformer, FixtureProvider, ProbeConfig, ProbeController, ProbeKind, ProbeResponse,
    ProbeSettings,
};

#[derive(Parser)]
#[command(
    name = "probectl",
    about = "Self-tuning liveness/readiness probes for transform services",
    version
)]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fire a sequence of probes at a freshly built controller.
    Run {
        /// Probe settings file (TOML).
        #[arg(short, long)]
        settings: PathBuf,

        /// Directory holding the canary source fixture. Defaults to the
        /// settings' `fixtures_dir`, then to the settings file's directory.
        #[arg(long)]
        fixtures: Option<PathBuf>,

        /// Probes to fire, in order.
        #[arg(short, long, value_delimiter = ',', default_value = "ready,live")]
        probes: Vec<ProbeArg>,

        /// Pause between probes, in milliseconds.
        #[arg(long, default_value = "0")]
        interval_ms: u64,

        /// Output format: text or json.
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,

        /// Transform command. `{source}` and `{target}` are replaced with
        /// the canary file paths.
        #[arg(last = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },
    /// Print a settings scaffold with the default tunables.
    Init {
        #[arg(long)]
        source: String,
        #[arg(long)]
        target: String,
        /// Expected canary output size in bytes.
        #[arg(long)]
        expected: u64,
        /// Allowed deviation from the expected size in bytes.
        #[arg(long, default_value = "0")]
        tolerance: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProbeArg {
    Live,
    Ready,
}

impl From<ProbeArg> for ProbeKind {
    fn from(arg: ProbeArg) -> Self {
        match arg {
            ProbeArg::Live => ProbeKind::Live,
            ProbeArg::Ready => ProbeKind::Ready,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Serialize)]
struct ProbeLine<'a> {
    kind: ProbeKind,
    #[serde(flatten)]
    response: &'a ProbeResponse,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            settings,
            fixtures,
            probes,
            interval_ms,
            format,
            command,
        } => run(&settings, fixtures, &probes, interval_ms, format, command).await,
        Command::Init {
            source,
            target,
            expected,
            tolerance,
        } => {
            let settings = ProbeSettings::new(source, target, expected, tolerance);
            print!("{}", settings.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,transform_probe=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(
    settings_path: &Path,
    fixtures: Option<PathBuf>,
    probes: &[ProbeArg],
    interval_ms: u64,
    format: Format,
    command: Vec<String>,
) -> anyhow::Result<()> {
    let settings = ProbeSettings::from_file(settings_path)
        .with_context(|| format!("loading probe settings from {}", settings_path.display()))?;
    let fixtures_dir = fixtures
        .or_else(|| settings.fixtures_dir.clone())
        .or_else(|| settings_path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let config = ProbeConfig::from_env(&settings);
    let mut command = command.into_iter();
    let Some(program) = command.next() else {
        bail!("no transform command given");
    };
    let transformer = CommandTransformer::new(program, command.collect());
    let artifacts = FixtureProvider::in_temp_dir(&fixtures_dir);

    info!(
        source = config.source_artifact(),
        target = config.target_artifact(),
        fixtures = %fixtures_dir.display(),
        scratch = %artifacts.scratch_dir().display(),
        program = transformer.program(),
        "probe controller ready"
    );
    let controller = ProbeController::new(config, transformer, artifacts);

    let mut last = None;
    for (i, probe) in probes.iter().enumerate() {
        if i > 0 && interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
        let kind = ProbeKind::from(*probe);
        let response = controller.probe(kind).await;
        match format {
            Format::Json => println!(
                "{}",
                serde_json::to_string(&ProbeLine {
                    kind,
                    response: &response,
                })?
            ),
            Format::Text => println!("{} {}", response.status.as_u16(), response.message),
        }
        last = Some(response);
    }

    let snapshot = controller.snapshot();
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        Format::Text => println!(
            "phase={:?} probes={} canaries={} transforms={} normal={}ms threshold={}",
            snapshot.phase,
            snapshot.probe_count,
            snapshot.canary_count,
            snapshot.transforms_executed,
            snapshot.learned_normal_millis,
            snapshot
                .failure_threshold_millis
                .map_or_else(|| "none".to_string(), |t| format!("{t}ms")),
        ),
    }

    if let Some(response) = last.filter(|r| !r.is_success()) {
        bail!("last probe failed with {}", response.status);
    }
    Ok(())
}
