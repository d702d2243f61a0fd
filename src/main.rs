//! CLI for the cache comparison traffic generator.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cache-bench")]
#[command(about = "Deterministic traffic generator comparing two cache backends", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a comparison from a scenario file
    Run {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override total iteration count
        #[arg(short, long)]
        iterations: Option<u64>,

        /// Override concurrency level
        #[arg(short, long)]
        concurrency: Option<u32>,

        /// Output format: table (default), json, csv
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Run a quick smoke comparison without a scenario file
    Quick {
        /// Base URL of the first backend
        #[arg(long, env = "CACHE_URL")]
        cache_url: String,

        /// Base URL of the second backend
        #[arg(long, env = "ISR_URL")]
        isr_url: String,

        /// Number of iterations (one request per backend each)
        #[arg(short, long, default_value = "1000")]
        requests: u64,

        /// Concurrency level
        #[arg(short, long, default_value = "10")]
        concurrency: u32,
    },

    /// List available scenarios
    List {
        /// Scenarios directory
        #[arg(short, long, default_value = "scenarios")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            iterations,
            concurrency,
            output,
        } => {
            println!("Loading scenario: {}", scenario.display());

            let mut config = cache_bench::RunConfig::from_file(&scenario)?;

            // Apply overrides
            if let Some(n) = iterations {
                config.iterations = Some(n);
            }
            if let Some(c) = concurrency {
                config.concurrency = c;
            }

            config.validate()?;

            println!("✓ Configuration loaded successfully");
            println!("  Name: {}", config.name);
            println!("  Description: {}", config.description);
            println!("  Iterations: {}", config.total_iterations()?);
            println!("  Concurrency: {}", config.concurrency);
            println!();

            run_and_report(config, &output).await
        }
        Commands::Quick {
            cache_url,
            isr_url,
            requests,
            concurrency,
        } => {
            println!("Running quick comparison:");
            println!("  Backend A: {}", cache_url);
            println!("  Backend B: {}", isr_url);
            println!("  Iterations: {}", requests);
            println!();

            let config = cache_bench::RunConfig {
                name: "quick".to_string(),
                description: "Quick smoke comparison".to_string(),
                backend_a: cache_bench::BackendEndpoint {
                    name: "cache-components".to_string(),
                    base_url: Some(cache_url),
                    env: None,
                },
                backend_b: cache_bench::BackendEndpoint {
                    name: "isr".to_string(),
                    base_url: Some(isr_url),
                    env: None,
                },
                iterations: Some(requests),
                concurrency,
                route_plan: cache_bench::RoutePlan::Weighted {
                    weights: cache_bench::CategoryWeights::default(),
                    route_space: None,
                    target_miss_rate: Some(0.67),
                },
                delay: None,
                request_timeout_secs: 30,
                max_duration_secs: 600,
                drain_timeout_secs: 30,
                inter_iteration_pause_ms: 10,
                thresholds: cache_bench::Thresholds::default(),
            };

            run_and_report(config, "table").await
        }
        Commands::List { dir } => {
            println!("Available scenarios in {}:", dir.display());
            println!();

            match std::fs::read_dir(&dir) {
                Ok(entries) => {
                    let mut scenarios = Vec::new();

                    for entry in entries.flatten() {
                        let path = entry.path();
                        if path.extension().and_then(|s| s.to_str()) == Some("yaml") {
                            if let Ok(config) = cache_bench::RunConfig::from_file(&path) {
                                scenarios.push((
                                    path.file_name()
                                        .map(|n| n.to_string_lossy().to_string())
                                        .unwrap_or_default(),
                                    config.name,
                                    config.description,
                                ));
                            }
                        }
                    }

                    scenarios.sort_by(|a, b| a.0.cmp(&b.0));

                    if scenarios.is_empty() {
                        println!("No scenario files found");
                    } else {
                        for (filename, name, description) in scenarios {
                            println!("  {} - {}", filename, name);
                            println!("    {}", description);
                            println!();
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Error reading directory: {}", e);
                    eprintln!("Make sure the directory exists and is readable");
                }
            }

            Ok(())
        }
    }
}

async fn run_and_report(config: cache_bench::RunConfig, output: &str) -> anyhow::Result<()> {
    let thresholds = config.thresholds;
    let runner = cache_bench::ScenarioRunner::new(config);
    let summary = runner.run().await?;

    match output {
        "json" => {
            println!("{}", cache_bench::RunReport::format_json(&summary)?);
        }
        "csv" => {
            println!("{}", cache_bench::RunReport::csv_header());
            println!("{}", cache_bench::RunReport::format_csv(&summary));
        }
        _ => {
            println!("{}", cache_bench::RunReport::format_table(&summary));
        }
    }

    let violations = summary.threshold_violations(&thresholds);
    if !violations.is_empty() {
        for violation in &violations {
            eprintln!("✗ {}", violation);
        }
        anyhow::bail!("{} threshold violation(s)", violations.len());
    }

    Ok(())
}
