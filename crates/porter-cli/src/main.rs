//! porter CLI - forum data migration between community platforms.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use porter::{Config, Orchestrator, OutputMode, PlatformRegistry, PorterError, RunRequest, Side};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "porter")]
#[command(about = "Migrate forum data between community platforms")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, env = "PORTER_CONFIG", default_value = "porter.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SideArg {
    Source,
    Target,
}

impl From<SideArg> for Side {
    fn from(side: SideArg) -> Self {
        match side {
            SideArg::Source => Side::Source,
            SideArg::Target => Side::Target,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Export a source forum and optionally import it into a target platform
    Run {
        /// Connection alias of the source forum
        #[arg(long)]
        source: String,

        /// Connection alias to write to
        #[arg(long)]
        target: String,

        /// Source platform, e.g. codoforum
        #[arg(long)]
        package: String,

        /// Target platform to import into, e.g. flarum
        #[arg(long)]
        platform: Option<String>,

        /// Output mode: file or database
        #[arg(long, default_value = "database")]
        output: String,
    },

    /// Show a platform's capabilities and feature support
    Show {
        #[arg(value_enum)]
        side: SideArg,

        /// Platform name
        name: String,
    },

    /// List registered platforms
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), PorterError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    match cli.command {
        Commands::List => {
            let registry = PlatformRegistry::builtin();
            for side in [Side::Source, Side::Target] {
                println!("{}s:", side.as_str());
                for platform in registry.list(side) {
                    println!("  {:<12} {} (prefix {})", platform.id(), platform.name(), platform.prefix());
                }
            }
        }
        Commands::Show { side, name } => {
            let registry = PlatformRegistry::builtin();
            let platform = registry.get(side.into(), &name)?;
            let features = platform.features();

            if cli.output_json {
                let matrix: Vec<_> = features
                    .matrix()
                    .into_iter()
                    .map(|(feature, support)| {
                        serde_json::json!({"feature": feature.label(), "support": support.level()})
                    })
                    .collect();
                let flags = platform.flags();
                let shown = serde_json::json!({
                    "id": platform.id(),
                    "name": platform.name(),
                    "prefix": platform.prefix(),
                    "flags": porter::Flag::ALL
                        .iter()
                        .map(|flag| (flag.as_str(), flags.get(*flag)))
                        .collect::<std::collections::BTreeMap<_, _>>(),
                    "features": matrix,
                });
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                println!("{} ({})", platform.name(), platform.id());
                println!("  Prefix: {}", platform.prefix());
                let flags = platform.flags();
                for flag in porter::Flag::ALL {
                    println!("  {}: {}", flag, flags.get(flag));
                }
                println!("\nFeature support:");
                for (feature, support) in features.matrix() {
                    println!("  {:<18} {}", feature.label(), support);
                }
            }
        }
        Commands::Run {
            source,
            target,
            package,
            platform,
            output,
        } => {
            let config = Config::load(&cli.config)?;
            info!("Loaded configuration from {:?}", cli.config);

            let mut request =
                RunRequest::new(source, target, package).with_output_mode(output.parse::<OutputMode>()?);
            if let Some(platform) = platform {
                request = request.with_target_platform(platform);
            }

            let report = Orchestrator::new(config).run(&request).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for comment in &report.comments {
                    println!("{}", comment);
                }
                println!("\nRun {}", report.phase);
                println!("  Duration: {:.2}s", report.elapsed.as_secs_f64());
                println!(
                    "  Rows: {}",
                    report.entities.iter().map(|e| e.rows).sum::<u64>()
                );
            }

            report.into_result()?;
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
