//! Stylesheet inspection CLI command

use anyhow::Result;
use std::fs;
use std::path::PathBuf;

use crate::bridge;
use crate::resolver;

/// Create the inspect command
pub fn command() -> clap::Command {
    clap::Command::new("inspect")
        .about("Inspect a stylesheet for extension elements and foreign references")
        .arg(clap::arg!(<STYLESHEET> "Stylesheet file to inspect"))
        .arg(clap::arg!(-c --config <FILE> "Configuration file path"))
        .arg(clap::arg!(-m --manifest <FILE> "Plugin manifest path"))
}

/// Run the inspect command
pub async fn run(matches: &clap::ArgMatches) -> Result<()> {
    let stylesheet = PathBuf::from(matches.get_one::<String>("STYLESHEET").unwrap());
    let config = crate::cli::utils::load_config(matches)?;
    let app = crate::cli::utils::create_app(config);
    app.ensure_plugins_loaded().await;

    let source = fs::read_to_string(&stylesheet)?;

    println!("Stylesheet: {}", stylesheet.display());

    match bridge::find_extension_prefix(&source)? {
        Some(prefix) => {
            println!("Extension namespace prefix: {}", prefix);
            let elements = bridge::collect_extension_elements(&source, &prefix)?;
            if elements.is_empty() {
                println!("Extension elements: none (prefix declared but unused)");
            } else {
                println!("Extension elements:");
                for name in &elements {
                    let status = if app.registry().contains(name) {
                        "registered"
                    } else {
                        "MISSING"
                    };
                    println!("  {} [{}]", name, status);
                }
            }
        }
        None => {
            println!("Extension namespace prefix: none");
        }
    }

    let references = resolver::collect_foreign_references(&source)?;
    if references.is_empty() {
        println!("Foreign implementation references: none");
    } else {
        println!("Foreign implementation references:");
        for name in &references {
            let status = if app.ambient_scope().contains(name) {
                "resolvable"
            } else {
                "UNRESOLVABLE"
            };
            println!("  {} [{}]", name, status);
        }
    }

    Ok(())
}
