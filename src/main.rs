use anyhow::{Context, Result};
use bashfs::{encode, FsConfig, MountManager};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, alias = "debug")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the command filesystem
    Mount {
        /// Where to mount the file system
        mount_point: PathBuf,
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The argv array that precedes the command text; repeat for each
        /// element (`--argv-prefix bash --argv-prefix -c` is the default)
        #[arg(long = "argv-prefix", allow_hyphen_values = true)]
        argv_prefix: Vec<String>,
        /// The string to insert between path elements
        #[arg(long)]
        separator: Option<String>,
        /// Name of the file that runs the command
        #[arg(long = "terminal-name")]
        terminal_name: Option<String>,
        /// Enable FUSE protocol tracing
        #[arg(long = "debug-fuse")]
        debug_fuse: bool,
    },
    /// Escape text so it can be used as a path segment
    Encode {
        /// File to encode (standard input if omitted)
        input: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger based on verbose flag
    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = env_logger::Builder::new();
    logger.filter_level(log_level);
    if let Commands::Mount { debug_fuse: true, .. } = &cli.command {
        logger.filter_module("fuser", LevelFilter::Trace);
    }
    logger.init();

    match cli.command {
        Commands::Mount {
            mount_point,
            config,
            argv_prefix,
            separator,
            terminal_name,
            debug_fuse: _,
        } => {
            let mut fs_config = match config {
                Some(path) => FsConfig::from_file(&path)?,
                None => FsConfig::default(),
            };
            if !argv_prefix.is_empty() {
                fs_config.argv_prefix = argv_prefix;
            }
            if let Some(separator) = separator {
                fs_config.separator = separator;
            }
            if let Some(terminal_name) = terminal_name {
                fs_config.terminal_name = terminal_name;
            }

            info!("Starting bashfs with {:?}", fs_config);
            MountManager::new(fs_config)?.mount(&mount_point)?;
        }
        Commands::Encode { input } => {
            let data = match input {
                Some(path) => fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut buf = Vec::new();
                    io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            let mut stdout = io::stdout().lock();
            stdout.write_all(&encode(&data))?;
            stdout.write_all(b"\n")?;
        }
    }

    Ok(())
}
