use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use blj_web::settings::ServerSettings;

mod cmd;

#[derive(Parser)]
#[command(name = "blj-web")]
#[command(version, about = "Browser back end for building and launching BioLockJ pipelines")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (defaults to ./blj-web.toml when present)
    #[arg(long, global = true, env = "BLJ_WEB_SETTINGS")]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        #[arg(long)]
        host: Option<String>,
        /// Open the browser once the server is up
        #[arg(long)]
        open: bool,
        /// Permissive CORS and listen on all interfaces
        #[arg(long)]
        dev: bool,
    },
    /// Validate a config file and print its launch command
    Check {
        config_file: PathBuf,
    },
    /// List known pipeline modules
    Catalog {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let settings = ServerSettings::load(cli.settings.as_deref())?;

    let log_dir = match &cli.command {
        Commands::Serve { .. } => settings.log_dir.clone(),
        _ => None,
    };
    let _guard = blj_web::logging::setup_logging(log_dir.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            open,
            dev,
        } => {
            cmd::cmd_serve(
                settings,
                cmd::ServeArgs {
                    port,
                    host,
                    open,
                    dev,
                },
            )
            .await?;
        }
        Commands::Check { config_file } => cmd::cmd_check(&settings, &config_file)?,
        Commands::Catalog { json } => cmd::cmd_catalog(json)?,
    }

    Ok(())
}
