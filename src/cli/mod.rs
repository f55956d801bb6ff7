//! CLI command implementations

use anyhow::Result;
use clap::{ArgMatches, Command};

pub mod commands;

/// Main CLI application
pub struct CliApp;

impl CliApp {
    /// Create the CLI application
    pub fn app() -> Command {
        Command::new("xslt-bridge")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Bridge custom extension elements in XSLT stylesheets to registered handlers")
            .subcommand_negates_reqs(true)
            .subcommand(commands::inspect::command())
            .subcommand(commands::plugins::command())
    }

    /// Run the CLI application
    pub async fn run(matches: &ArgMatches) -> Result<()> {
        match matches.subcommand() {
            Some(("inspect", sub_matches)) => commands::inspect::run(sub_matches).await,
            Some(("plugins", sub_matches)) => commands::plugins::run(sub_matches).await,
            _ => {
                // No subcommand provided, show help
                let _ = Self::app().print_help();
                Ok(())
            }
        }
    }
}

/// Common CLI utilities
pub mod utils {
    use anyhow::Result;
    use std::path::PathBuf;

    use crate::config::BridgeConfig;
    use crate::XsltBridge;

    /// Resolve configuration from arguments, config file and environment
    pub fn load_config(matches: &clap::ArgMatches) -> Result<BridgeConfig> {
        let mut config = if let Some(path) = matches.get_one::<String>("config") {
            BridgeConfig::from_file(&PathBuf::from(path))?
        } else {
            BridgeConfig::resolve()?
        };
        if let Some(manifest) = matches.get_one::<String>("manifest") {
            config.manifest_path = PathBuf::from(manifest);
        }
        config.apply_env_overrides();
        Ok(config)
    }

    /// Create an XsltBridge instance from resolved configuration
    pub fn create_app(config: BridgeConfig) -> XsltBridge {
        XsltBridge::new(config)
    }
}
