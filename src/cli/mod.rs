//! CLI command handling
//!
//! Dispatches CLI commands and formats output.

mod run;

pub use run::RunOptions;

use std::path::Path;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::{config::Config, logging, paths, Error, Result};
use crate::extract::{self, StepDescriptor, TestCase, TriggerSet};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            file,
            tests,
            port,
            no_pause,
            pause_at,
            app_host,
            triggers,
            no_watch,
            delay_ms,
        } => {
            let options = RunOptions {
                file,
                tests,
                port,
                no_pause,
                pause_at,
                app_host,
                triggers,
                no_watch,
                delay_ms,
            };
            run::run(options).await
        }

        Commands::Steps {
            file,
            test,
            triggers,
            json,
        } => {
            let config = Config::load()?;
            let mut trigger_set = TriggerSet::from_config(&config.steps);
            trigger_set.extend(triggers);

            let source = read_source(&file)?;
            let located = extract::locate(&source, &file.display().to_string(), &test)?;
            let steps = extract::steps_in(&source, &located.body, &trigger_set);

            if json {
                println!("{}", serde_json::to_string_pretty(&steps)?);
            } else if steps.is_empty() {
                println!("No steps in '{}'", located.case.id);
            } else {
                println!("{} {}", "Steps of".cyan(), located.case.id.white().bold());
                for (index, step) in steps.iter().enumerate() {
                    print_step(index, step);
                }
            }
            Ok(())
        }

        Commands::List { file, json } => {
            let source = read_source(&file)?;
            let tests = extract::list_tests(&source)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&tests)?);
            } else if tests.is_empty() {
                println!("No tests found in {}", file.display());
            } else {
                for test in &tests {
                    print_test(test);
                }
            }
            Ok(())
        }

        Commands::Config => {
            match paths::config_path() {
                Some(path) if path.exists() => println!("Config file: {}", path.display()),
                Some(path) => println!("Config file: {} (not found, using defaults)", path.display()),
                None => println!("Config file: unavailable on this platform"),
            }
            let config = Config::load()?;
            let text = toml::to_string_pretty(&config)
                .map_err(|e| Error::Config(e.to_string()))?;
            println!("\n{}", text);
            Ok(())
        }

        Commands::Logs { lines, clear } => {
            let Some(path) = logging::session_log_path() else {
                return Err(Error::Config("no log directory on this platform".to_string()));
            };

            if clear {
                if path.exists() {
                    std::fs::write(&path, "")?;
                }
                println!("Cleared {}", path.display());
                return Ok(());
            }

            if !path.exists() {
                println!("No session log yet ({})", path.display());
                return Ok(());
            }

            let content =
                std::fs::read_to_string(&path).map_err(|e| Error::file_read(&path, &e))?;
            let all: Vec<&str> = content.lines().collect();
            let start = all.len().saturating_sub(lines);
            for line in &all[start..] {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

fn read_source(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).map_err(|e| Error::file_read(file, &e))
}

fn print_test(test: &TestCase) {
    let suite = test
        .suite
        .as_deref()
        .map(|s| format!(" ({})", s))
        .unwrap_or_default();
    println!(
        "  {:>4}  {}{}  {}",
        test.line.to_string().dimmed(),
        test.id,
        suite.dimmed(),
        test.style.to_string().dimmed()
    );
}

fn print_step(index: usize, step: &StepDescriptor) {
    let indent = "  ".repeat(step.block_depth as usize);
    println!(
        "  {:>2}. {}{} {}",
        index,
        indent,
        step.as_string,
        format!("{}:{}", step.line, step.column).dimmed()
    );
}
