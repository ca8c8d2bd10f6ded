//! panel: schedule containers on a Docker host.
//!
//! # Usage
//!
//! ```text
//! panel --config panel.toml schedule --file web.toml
//! panel schedule --name web --module shop --image nginx --env PORT=8080
//! panel list
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use panel_core::Selector;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::ConfigOverrides;

#[derive(Parser)]
#[command(
    name = "panel",
    about = "controlpanel container deployment scheduler",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to panel.toml (default: ./panel.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the scheduler name.
    #[arg(long, global = true)]
    scheduler_name: Option<String>,

    /// Override the runtime endpoint (unix:///path, tcp://host:port).
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule a deployment, replacing any existing one.
    ///
    /// Read from a TOML file with --file, or built from --name, --module
    /// and --image.
    Schedule {
        /// Deployment TOML file.
        #[arg(short, long, conflicts_with_all = ["name", "module", "image", "env"])]
        file: Option<PathBuf>,
        #[arg(long, required_unless_present = "file")]
        name: Option<String>,
        #[arg(long, required_unless_present = "file")]
        module: Option<String>,
        #[arg(long, required_unless_present = "file")]
        image: Option<String>,
        /// Environment variable as KEY=VALUE. Repeatable.
        #[arg(long = "env", value_parser = commands::schedule::parse_env_pair)]
        env: Vec<(String, String)>,
    },
    /// Remove a deployment.
    Unschedule {
        #[arg(long)]
        name: String,
        #[arg(long)]
        module: String,
    },
    /// Print one deployment as JSON.
    Get {
        #[arg(long)]
        name: String,
        #[arg(long)]
        module: String,
    },
    /// Print every deployment owned by this scheduler as JSON.
    List,
    /// Schedule the nginx smoke deployment and list the result.
    Demo,
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,panel=debug"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    let overrides = ConfigOverrides {
        scheduler_name: cli.scheduler_name,
        endpoint: cli.endpoint,
    };
    let config = commands::load_config(cli.config.as_deref(), &overrides)?;
    let scheduler = commands::connect(&config).await?;

    match cli.command {
        Commands::Schedule {
            file,
            name,
            module,
            image,
            env,
        } => {
            let deployment = match file {
                Some(path) => commands::schedule::deployment_from_file(&path)?,
                None => commands::schedule::deployment_from_args(
                    name.unwrap_or_default(),
                    module.unwrap_or_default(),
                    image.unwrap_or_default(),
                    env,
                )?,
            };
            commands::schedule::schedule(&scheduler, &deployment).await
        }
        Commands::Unschedule { name, module } => {
            commands::schedule::unschedule(&scheduler, &Selector::new(name, module)).await
        }
        Commands::Get { name, module } => {
            let out = commands::query::get(&scheduler, &Selector::new(name, module)).await?;
            println!("{out}");
            Ok(())
        }
        Commands::List => {
            println!("{}", commands::query::list(&scheduler).await?);
            Ok(())
        }
        Commands::Demo => {
            println!("{}", commands::demo::run(&scheduler).await?);
            Ok(())
        }
    }
}
