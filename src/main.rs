use anyhow::Context;
use avp::cli::{Cli, Commands, ConfigAction};
use avp::config::{validate_config_object, Config};
use avp::generate::Generator;
use avp::logging;
use clap::Parser;
use std::io::Write;
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load(cli.config_path.as_deref())?;
    logging::init(config.logging.level);
    for warning in &config.load_warnings {
        warn!("{}", warning);
    }

    match &config.source {
        Some(path) => debug!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    match cli.command {
        Commands::Generate(opts) => {
            let generator = Generator::from_config(&config)?.with_format(opts.output);
            let output = generator.generate(&opts.path).await?;

            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(output.as_bytes())
                .context("Failed to write rendered manifests")?;
            stdout.flush()?;
        }
        Commands::Config(opts) => match opts.action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigAction::Validate => {
                validate_config_object(&config)?;
                info!("Configuration is valid");
                println!("Configuration is valid");
            }
        },
        Commands::Version => {
            println!("avp {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
