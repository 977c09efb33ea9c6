//! digestkit CLI - digest command

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use digestkit_core::{Base, HashAlgorithm, HashOptions};
use std::path::PathBuf;
use tracing::Level;

mod cmd;
mod settings;
mod util;

use settings::Settings;

/// digestkit - Deterministic content hashes for data and files
#[derive(Parser)]
#[command(name = "digest")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Digest back end (sha1, sha256, sha512, blake3, xxhash64)
    #[arg(long, global = true)]
    hasher: Option<HashAlgorithm>,

    /// Output alphabet (hex, base32, abc)
    #[arg(long, global = true)]
    base: Option<Base>,

    /// Truncate the digest to this many characters
    #[arg(long, global = true)]
    length: Option<usize>,

    /// Mix concrete type names into the digest
    #[arg(long, global = true)]
    types: bool,

    /// Hash integral floats as integers
    #[arg(long, global = true)]
    convert: bool,

    /// Settings file (default: <config dir>/digestkit/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

impl Cli {
    /// Settings-file defaults overridden by command-line flags
    fn hash_options(&self, base: HashOptions) -> HashOptions {
        let mut options = base;
        if let Some(hasher) = self.hasher {
            options.hasher = hasher;
        }
        if let Some(base) = self.base {
            options.base = base;
        }
        if let Some(length) = self.length {
            options.length = Some(length);
        }
        options.include_types |= self.types;
        options.convert |= self.convert;
        options
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Hash a JSON document (from FILE, or stdin when omitted or "-")
    Data {
        file: Option<PathBuf>,
    },
    /// Hash file contents
    File {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Descend into directories
        #[arg(short, long)]
        recursive: bool,
    },
    /// Manage freshness stamps for build products
    #[command(subcommand)]
    Stamp(StampCommands),
    /// List digest back ends and whether they are compiled in
    Algorithms,
}

#[derive(Subcommand)]
enum StampCommands {
    /// Exit 0 if the stamp is fresh, 1 otherwise
    Check(StampArgs),
    /// Record current products as fresh
    Renew(StampArgs),
    /// Delete the stamp certificate
    Clear(StampArgs),
}

#[derive(Args)]
struct StampArgs {
    /// Stamp name
    #[arg(long)]
    name: String,

    /// Directory holding certificates (default: [cache] dir from settings)
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Dependencies as a JSON document
    #[arg(long, default_value = "null")]
    depends: String,

    /// Product file; repeat for several
    #[arg(long = "product")]
    products: Vec<PathBuf>,

    /// Certificate lifetime in seconds
    #[arg(long)]
    expires: Option<u64>,

    /// Compare product sizes only, skipping content hashes
    #[arg(long)]
    size_only: bool,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose);

    let settings = Settings::load(cli.config.as_deref())?;
    let options = cli.hash_options(settings.hash.clone());

    match cli.command {
        Commands::Data { file } => cmd::data::run(file.as_deref(), &options),
        Commands::File { paths, recursive } => cmd::file::run(&paths, recursive, &options),
        Commands::Algorithms => cmd::algorithms::run(),
        Commands::Stamp(stamp_cmd) => {
            let fresh = match stamp_cmd {
                StampCommands::Check(args) => cmd::stamp::check(&args, &options, &settings)?,
                StampCommands::Renew(args) => cmd::stamp::renew(&args, &options, &settings)?,
                StampCommands::Clear(args) => cmd::stamp::clear(&args, &options, &settings)?,
            };
            if !fresh {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
