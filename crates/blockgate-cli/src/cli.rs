use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "blockgate",
    about = "Block upload gateway for a time-series compactor",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the block upload server
    Serve(ServeArgs),
    /// Verify a block directory on local disk
    Verify(VerifyArgs),
    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Override the listen address
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Args)]
pub struct VerifyArgs {
    /// Block directory containing meta.json, index and chunks/
    pub dir: PathBuf,
    /// Also check every chunk segment
    #[arg(long)]
    pub verify_chunks: bool,
}

#[derive(Args)]
pub struct ConfigArgs {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["blockgate", "serve", "--config", "gate.toml"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.config, Some(PathBuf::from("gate.toml")));
            assert!(args.bind.is_none());
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_serve_bind() {
        let cli = Cli::try_parse_from(["blockgate", "serve", "--bind", "0.0.0.0:9000"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind.as_deref(), Some("0.0.0.0:9000"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_verify() {
        let cli = Cli::try_parse_from(["blockgate", "verify", "/tmp/01ABC", "--verify-chunks"]).unwrap();
        if let Command::Verify(args) = cli.command {
            assert_eq!(args.dir, PathBuf::from("/tmp/01ABC"));
            assert!(args.verify_chunks);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn verify_requires_dir() {
        assert!(Cli::try_parse_from(["blockgate", "verify"]).is_err());
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["blockgate", "--verbose", "config"]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["blockgate", "--format", "json", "verify", "."]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
