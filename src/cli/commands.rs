use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;

use crate::cli::args::{Cli, Commands};
use crate::config::PipelineConfig;
use crate::pipeline::Pipeline;
use crate::processors::IntegrityChecker;

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli.command);
    config.check()?;

    let pipeline = Pipeline::from_config(config).with_progress(true);

    match cli.command {
        Commands::InitBuckets => {
            for (bucket, status) in pipeline.init_buckets().await? {
                println!("Bucket '{}' {}", bucket, status);
            }
        }

        Commands::Ingest { .. } => {
            let report = pipeline.ingest(Utc::now()).await?;
            println!("{}", report.summary.summary());
            println!(
                "Raw batch: {} ({} rows, {} failures)",
                report.batch.key, report.batch.rows, report.batch.failures
            );
        }

        Commands::Observe { lat, lon } => {
            let (observation, batch) = pipeline.observe(lat, lon, Utc::now()).await?;
            println!(
                "{} ({:.4}, {:.4}): {} {}, {:.2} {}, humidity {:.0}%, pressure {:.0} hPa, wind {:.1} m/s",
                observation.capital_key,
                observation.latitude,
                observation.longitude,
                observation.weather_condition,
                observation.weather_description,
                observation.temperature,
                observation.temperature_unit,
                observation.humidity,
                observation.pressure,
                observation.wind_speed
            );
            println!("Raw batch: {}", batch.key);
        }

        Commands::Stage => {
            let output = pipeline.stage().await?;
            let checker = IntegrityChecker::new();
            println!("\n{}", checker.generate_summary(&output.report));
        }

        Commands::Curate { .. } => {
            let dataset = pipeline.curate().await?;
            println!("\n{}", dataset.summary.summary());
        }

        Commands::Run { .. } => {
            let report = pipeline.run_all(Utc::now()).await?;
            let checker = IntegrityChecker::new();
            println!("{}", report.ingest.summary.summary());
            println!("\n{}", checker.generate_summary(&report.staging.report));
            println!("{}", report.curated.summary.summary());
            println!("Pipeline run complete!");
        }

        Commands::Capitals => {
            let capitals = pipeline.capitals().await?;
            for capital in &capitals {
                println!(
                    "{}\t{}\t{}\t{:.4}\t{:.4}",
                    capital.country_code,
                    capital.country_name,
                    capital.capital_name,
                    capital.latitude,
                    capital.longitude
                );
            }
            println!("{} capitals", capitals.len());
        }

        Commands::Buckets => {
            for bucket in pipeline.store().list_buckets().await? {
                println!("{}", bucket);
            }
        }

        Commands::Objects { bucket } => {
            let objects = pipeline.store().list(&bucket).await?;
            for object in &objects {
                println!(
                    "{:>12}  {}  {}",
                    object.size,
                    object.last_modified.format("%Y-%m-%d %H:%M:%S"),
                    object.key
                );
            }
            println!("{} objects in '{}'", objects.len(), bucket);
        }

        Commands::Fetch {
            bucket,
            key,
            output,
        } => {
            let bytes = pipeline.store().get(&bucket, &key).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &bytes)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Wrote {} bytes to {}", bytes.len(), path.display());
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&bytes)?;
                    stdout.flush()?;
                }
            }
        }

        Commands::Upload { bucket, file, key } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let key = match key {
                Some(key) => key,
                None => file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .with_context(|| format!("{} has no file name", file.display()))?,
            };
            let info = pipeline.store().put(&bucket, &key, bytes).await?;
            println!("Uploaded {}/{} ({} bytes)", bucket, info.key, info.size);
        }

        Commands::Delete { bucket, key } => {
            if pipeline.store().delete(&bucket, &key).await? {
                println!("Deleted {}/{}", bucket, key);
            } else {
                println!("{}/{} did not exist", bucket, key);
            }
        }

        Commands::Health => {
            pipeline.store().health().await?;
            println!("Store is healthy: {}", pipeline.config().storage.root.display());
        }
    }

    Ok(())
}

/// Command-line flags take precedence over file and environment settings
fn apply_overrides(config: &mut PipelineConfig, command: &Commands) {
    let (workers, clusters, seed) = match command {
        Commands::Ingest { workers } => (*workers, None, None),
        Commands::Curate { clusters, seed } => (None, *clusters, *seed),
        Commands::Run {
            workers,
            clusters,
            seed,
        } => (*workers, *clusters, *seed),
        _ => (None, None, None),
    };

    if let Some(workers) = workers {
        config.ingest.workers = workers;
    }
    if let Some(clusters) = clusters {
        config.clustering.k = clusters;
    }
    if let Some(seed) = seed {
        config.clustering.seed = seed;
    }
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = tracing_subscriber::fmt().with_max_level(level).with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to initialise logging: {}", e))
}
