use crate::kube::OutputFormat;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "avp",
    version,
    about = "Replace <placeholders> in Kubernetes manifests with values from a secret store"
)]
pub struct Cli {
    /// Configuration file (default: avp.yaml / avp.json / avp.toml, then ~/.avp/config.yaml)
    #[arg(short, long, global = true)]
    pub config_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render manifests with placeholders substituted
    Generate(GenerateOpts),
    /// Inspect the effective configuration
    Config(ConfigOpts),
    Version,
}

#[derive(clap::Args)]
pub struct GenerateOpts {
    /// Manifest file, directory of manifests, or `-` for stdin
    pub path: String,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub output: OutputFormat,
}

#[derive(clap::Args)]
pub struct ConfigOpts {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    Show,
    Validate,
}
