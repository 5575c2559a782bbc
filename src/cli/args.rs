use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "weather-lake")]
#[command(about = "Capital-city weather data lake: raw, staging and curated tiers")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(
        short,
        long,
        global = true,
        help = "Config file path [default: weather-lake.toml if present]"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the raw, staging and curated buckets if missing
    InitBuckets,

    /// Fetch current weather for every capital into a new raw batch
    Ingest {
        #[arg(long, help = "Concurrent fetch workers")]
        workers: Option<usize>,
    },

    /// Fetch current weather at a coordinate into a user-input raw batch
    Observe {
        #[arg(long, allow_negative_numbers = true, help = "Latitude in degrees")]
        lat: f64,

        #[arg(long, allow_negative_numbers = true, help = "Longitude in degrees")]
        lon: f64,
    },

    /// Rebuild the staging dataset from all raw batches
    Stage,

    /// Cluster the staging dataset into the curated tier
    Curate {
        #[arg(short = 'k', long, help = "Number of clusters")]
        clusters: Option<usize>,

        #[arg(long, help = "Random seed for k-means")]
        seed: Option<u64>,
    },

    /// Run init-buckets, ingest, stage and curate in order
    Run {
        #[arg(long, help = "Concurrent fetch workers")]
        workers: Option<usize>,

        #[arg(short = 'k', long, help = "Number of clusters")]
        clusters: Option<usize>,

        #[arg(long, help = "Random seed for k-means")]
        seed: Option<u64>,
    },

    /// List the capitals the directory resolves to
    Capitals,

    /// List buckets
    Buckets,

    /// List the objects in a bucket
    Objects { bucket: String },

    /// Download an object
    Fetch {
        bucket: String,
        key: String,

        #[arg(short, long, help = "Output file [default: stdout]")]
        output: Option<PathBuf>,
    },

    /// Upload a local file as an object
    Upload {
        bucket: String,
        file: PathBuf,

        #[arg(long, help = "Object key [default: the file name]")]
        key: Option<String>,
    },

    /// Delete an object
    Delete { bucket: String, key: String },

    /// Check that the store is reachable
    Health,
}
