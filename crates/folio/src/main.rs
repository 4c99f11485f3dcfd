//! folio CLI - static site generator for a Markdown blog.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

use config::Overrides;

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Static site generator for a Markdown blog")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to folio.toml config file
    #[arg(short, long, default_value = "folio.toml")]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter site in the current directory
    Init {
        /// Overwrite existing starter files
        #[arg(short, long)]
        yes: bool,
    },

    /// Build the site once
    Build {
        /// Content directory (defaults to config or "content")
        content: Option<PathBuf>,

        /// Output directory (defaults to config or "public")
        output: Option<PathBuf>,

        /// Template directory
        #[arg(long)]
        templates: Option<PathBuf>,

        /// Include drafts
        #[arg(long)]
        drafts: bool,

        /// Render documents one at a time
        #[arg(long)]
        sequential: bool,
    },

    /// Rebuild whenever content, templates or static files change
    Watch {
        /// Content directory (defaults to config or "content")
        content: Option<PathBuf>,

        /// Output directory (defaults to config or "public")
        output: Option<PathBuf>,

        /// Include drafts
        #[arg(long)]
        drafts: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Init { yes } => {
            commands::init::run(yes).await?;
        }
        Commands::Build {
            content,
            output,
            templates,
            drafts,
            sequential,
        } => {
            let overrides = Overrides {
                content,
                output,
                templates,
                drafts,
                sequential,
            };
            commands::build::run(&cli.config, overrides).await?;
        }
        Commands::Watch {
            content,
            output,
            drafts,
        } => {
            let overrides = Overrides {
                content,
                output,
                drafts,
                ..Default::default()
            };
            commands::watch::run(&cli.config, overrides).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_build_with_positional_paths() {
        let cli = Cli::parse_from(["folio", "-v", "build", "posts", "site", "--drafts"]);

        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("folio.toml"));
        match cli.command {
            Commands::Build {
                content,
                output,
                drafts,
                sequential,
                ..
            } => {
                assert_eq!(content, Some(PathBuf::from("posts")));
                assert_eq!(output, Some(PathBuf::from("site")));
                assert!(drafts);
                assert!(!sequential);
            }
            _ => panic!("expected build"),
        }
    }
}
