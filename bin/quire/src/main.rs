//! Quire CLI
//!
//! Template-driven static site compositor.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use quire::cmd::{self, build::BuildOptions};

/// Command-line interface for Quire.
#[derive(Parser)]
#[command(
    name = "quire",
    version,
    about = "A template-driven static site compositor"
)]
struct Cli {
    /// Site root directory
    #[arg(short = 'C', long, default_value = ".")]
    root: PathBuf,

    /// Path to configuration file, relative to the site root
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Build the site and publish it to the output directory
    Build {
        /// Output directory (defaults to build.output_dir in the site root)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Include draft units
        #[arg(long)]
        drafts: bool,
        /// Override site base URL (e.g., https://example.com/docs)
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Resolve and render the whole site without writing anything
    Check,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    quire::init_tracing(cli.verbose);

    let config = cmd::config_path(&cli.root, cli.config.as_deref());

    match cli.command {
        Commands::Build {
            output,
            drafts,
            base_url,
        } => {
            let options = BuildOptions {
                output,
                drafts,
                base_url,
            };
            cmd::build::run(&cli.root, &config, &options)?;
        }
        Commands::Check => {
            cmd::check::run(&cli.root, &config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_cli_build_command_parsing() {
        let args = ["quire", "build", "--output", "dist"];
        let cli = Cli::parse_from(args);

        assert_eq!(cli.root, PathBuf::from("."));
        assert!(cli.config.is_none());
        assert_eq!(cli.verbose, 0);

        match cli.command {
            Commands::Build {
                output,
                drafts,
                base_url,
            } => {
                assert_eq!(output, Some(PathBuf::from("dist")));
                assert!(!drafts);
                assert!(base_url.is_none());
            }
            Commands::Check => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_cli_build_with_drafts_and_base_url() {
        let args = [
            "quire",
            "build",
            "--drafts",
            "--base-url",
            "https://example.com/docs",
        ];
        let cli = Cli::parse_from(args);

        match cli.command {
            Commands::Build {
                drafts, base_url, ..
            } => {
                assert!(drafts);
                assert_eq!(base_url.as_deref(), Some("https://example.com/docs"));
            }
            Commands::Check => panic!("Expected Build command"),
        }
    }

    #[test]
    fn test_cli_check_command_parsing() {
        let cli = Cli::parse_from(["quire", "check"]);
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_cli_verbosity_flags() {
        let cli = Cli::parse_from(["quire", "-vvv", "build"]);
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn test_cli_root_and_config() {
        let args = ["quire", "-C", "site", "--config", "staging.toml", "check"];
        let cli = Cli::parse_from(args);
        assert_eq!(cli.root, PathBuf::from("site"));
        assert_eq!(cli.config, Some(PathBuf::from("staging.toml")));
    }
}
