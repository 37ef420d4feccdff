use std::path::Path;

use {
    anyhow::Result,
    clap::Subcommand,
    rally_config::{RealtimeConfig, Severity, validate},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration with secrets masked (default).
    Show,
    /// Validate the configuration and report errors/warnings.
    Check,
    /// Print the user-global config directory.
    Path,
}

pub fn handle_config(action: Option<ConfigAction>, config_path: Option<&Path>) -> Result<()> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => show(&crate::load_effective_config(config_path)?),
        ConfigAction::Check => check(&crate::load_effective_config(config_path)?),
        ConfigAction::Path => {
            match rally_config::config_dir() {
                Some(dir) => println!("{}", dir.display()),
                None => eprintln!("no home directory found"),
            }
            Ok(())
        },
    }
}

fn show(config: &RealtimeConfig) -> Result<()> {
    print!("{}", render(config)?);
    Ok(())
}

fn render(config: &RealtimeConfig) -> Result<String> {
    Ok(toml::to_string_pretty(&config.redacted())?)
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config: &RealtimeConfig) -> Result<()> {
    let diagnostics = validate(config);

    for d in &diagnostics {
        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
        };
        eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
    }

    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    let warnings = diagnostics.len() - errors;

    if diagnostics.is_empty() {
        eprintln!("No issues found.");
    } else {
        eprintln!("\n{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}
