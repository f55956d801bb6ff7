//! Plugin management CLI commands

use anyhow::Result;

/// Create the plugins command
pub fn command() -> clap::Command {
    clap::Command::new("plugins")
        .about("Manage extension plugins")
        .subcommand_negates_reqs(true)
        .subcommand(
            clap::Command::new("load")
                .about("Load the plugin manifest and report the outcome")
                .arg(clap::arg!(-c --config <FILE> "Configuration file path"))
                .arg(clap::arg!(-m --manifest <FILE> "Plugin manifest path"))
                .arg(
                    clap::Arg::new("strict")
                        .long("strict")
                        .help("Fail on the first manifest problem instead of reporting it")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
        .subcommand(
            clap::Command::new("list")
                .about("List registered extension handlers")
                .arg(clap::arg!(-c --config <FILE> "Configuration file path"))
                .arg(clap::arg!(-m --manifest <FILE> "Plugin manifest path")),
        )
}

/// Run plugin command
pub async fn run(matches: &clap::ArgMatches) -> Result<()> {
    match matches.subcommand() {
        Some(("load", sub_matches)) => run_load(sub_matches).await,
        Some(("list", sub_matches)) => run_list(sub_matches).await,
        _ => {
            let _ = command().print_help();
            Ok(())
        }
    }
}

async fn run_load(matches: &clap::ArgMatches) -> Result<()> {
    let config = crate::cli::utils::load_config(matches)?;
    let app = crate::cli::utils::create_app(config);

    let report = if matches.get_flag("strict") {
        app.load_plugins_strict().await?
    } else {
        app.load_plugins().await
    };

    println!("{}", report.summary());
    for entry in &report.registered {
        println!("  {}", entry);
    }
    Ok(())
}

async fn run_list(matches: &clap::ArgMatches) -> Result<()> {
    let config = crate::cli::utils::load_config(matches)?;
    let app = crate::cli::utils::create_app(config);
    app.ensure_plugins_loaded().await;

    println!("Manifest: {}", app.config().manifest_path.display());

    let names = app.registry().names();
    if names.is_empty() {
        println!("No extension handlers registered.");
        return Ok(());
    }

    println!("Registered extension handlers:");
    for name in names {
        println!("  {}", name);
    }
    Ok(())
}
