// src/bin/herald.rs

use anyhow::Result;
use clap::Parser;
use colored::*;
use herald::{
    cli::Cli,
    console::{self, ConsoleInterpreter},
    core::{engine::Engine, optimizer::Optimizer},
    settings::Settings,
    t,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

/// The main entry point of the `herald` console.
/// It sets up logging, parses arguments, and reports any fatal error.
#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()).await {
        eprintln!("\n{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Loads settings and commands, then dispatches every stdin line until EOF or Ctrl+C.
async fn run(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let settings = Settings::load_or_create(&cli.settings_path()?)?;
    let commands_dir = match &cli.commands {
        Some(raw) => Some(Settings::expand_path(raw)?),
        None => settings.commands_path()?,
    };

    let registry = console::bootstrap(commands_dir.as_deref())?;
    println!(
        "{}",
        format!(t!("console.loaded"), count = registry.names().len()).dimmed()
    );

    let optimizer = settings.optimizer.enabled.then(|| {
        Optimizer::new(
            Arc::clone(&registry),
            Duration::from_secs(settings.optimizer.window_secs),
        )
        .spawn(Duration::from_secs(settings.optimizer.interval_secs.max(1)))
    });

    let prefixes = settings.prefixes.join(", ");
    let engine = Arc::new(Engine::new(
        registry,
        Arc::new(ConsoleInterpreter),
        Arc::new(settings),
    ));
    println!("{}", format!(t!("console.ready"), prefixes = prefixes).bold());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();
    let interrupted = loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break false;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let message = Arc::new(console::message_from_line(&cli, &line));
                let engine = Arc::clone(&engine);
                in_flight.spawn(async move {
                    let dispatch = engine.handle(message).await;
                    log::debug!("Dispatch: {:?}", dispatch);
                });
                while in_flight.try_join_next().is_some() {}
            }
            _ = tokio::signal::ctrl_c() => {
                break true;
            }
        }
    };

    if interrupted {
        println!("\n{}", t!("console.shutdown"));
        in_flight.abort_all();
    } else {
        // Let pending invocations finish when stdin was simply exhausted.
        while in_flight.join_next().await.is_some() {}
    }

    if let Some(handle) = optimizer {
        handle.abort();
    }
    Ok(())
}
