//! Mirage CLI entry point.

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mirage::application::Orchestrator;
use mirage::domain::models::{ObjectiveDraft, SimulationSpeed};
use mirage::infrastructure::config::ConfigLoader;
use mirage::services::TemplateDecomposer;
use mirage::DomainError;

#[derive(Parser)]
#[command(name = "mirage", version, about = "Simulated-agent execution core")]
struct Cli {
    /// Emit events as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Path to a configuration file (defaults to mirage.yaml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one objective through the simulation loop
    Run {
        /// Objective title
        title: String,

        /// Objective description
        #[arg(long, default_value = "")]
        description: String,

        /// Objective complexity (1-10)
        #[arg(long, default_value_t = 5)]
        complexity: u8,

        /// Simulation speed override
        #[arg(long, value_parser = parse_speed)]
        speed: Option<SimulationSpeed>,

        /// Random seed override for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print the template decomposition for an objective without running
    Plan {
        /// Objective title
        title: String,

        /// Objective complexity (1-10)
        #[arg(long, default_value_t = 5)]
        complexity: u8,
    },
}

fn parse_speed(s: &str) -> Result<SimulationSpeed, String> {
    SimulationSpeed::from_str(s).ok_or_else(|| format!("unknown speed '{s}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    match cli.command {
        Commands::Run {
            title,
            description,
            complexity,
            speed,
            seed,
        } => {
            let mut config = config;
            if let Some(speed) = speed {
                config.speed = speed;
            }
            if seed.is_some() {
                config.seed = seed;
            }

            let orchestrator = std::sync::Arc::new(Orchestrator::new(config));
            let mut events = orchestrator.subscribe();
            let json = cli.json;
            let printer = tokio::spawn(async move {
                while let Ok(envelope) = events.recv().await {
                    if json {
                        match serde_json::to_string(&envelope) {
                            Ok(line) => println!("{line}"),
                            Err(error) => tracing::error!(%error, "event serialization failed"),
                        }
                    } else {
                        println!(
                            "[{}] {} {:?}",
                            envelope.sequence, envelope.severity, envelope.event
                        );
                    }
                }
            });

            {
                let orchestrator = std::sync::Arc::clone(&orchestrator);
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        orchestrator.stop().await;
                    }
                });
            }

            let objective_id = orchestrator
                .add_objective(ObjectiveDraft::new(title, description, complexity))
                .await?;
            let status = match orchestrator.start(objective_id).await {
                Ok(status) => status,
                Err(DomainError::IterationsExhausted { .. }) => {
                    mirage::ObjectiveStatus::Failed
                }
                Err(error) => return Err(error.into()),
            };
            printer.abort();

            let objective = orchestrator.objective(objective_id).await;
            println!(
                "Objective finished: {} ({})",
                status.as_str(),
                objective
                    .and_then(|o| o.result)
                    .unwrap_or_else(|| "no result recorded".to_string())
            );
        }
        Commands::Plan { title, complexity } => {
            let objective = mirage::Objective::new(title, "", complexity);
            let batch = TemplateDecomposer::new().plan(&objective, &[]);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&batch)?);
            } else {
                for (index, blueprint) in batch.iter().enumerate() {
                    println!(
                        "{index}: {} (priority {}, complexity {}, est {} ms, deps {:?})",
                        blueprint.title,
                        blueprint.priority,
                        blueprint.complexity,
                        blueprint.estimated_duration_ms,
                        blueprint.depends_on
                    );
                }
            }
        }
    }

    Ok(())
}
