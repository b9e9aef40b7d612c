//! `tutorbot check-config`: validate a configuration file.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Result, bail};
use serde::Serialize;

use tutorbot::config::Config;

use super::records::Format;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warn,
    Error,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    status: CheckStatus,
    message: String,
}

impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Ok,
            message: message.into(),
        }
    }

    fn warn(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warn,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    checks: Vec<CheckResult>,
    errors: usize,
    warnings: usize,
}

impl Report {
    fn new(checks: Vec<CheckResult>) -> Self {
        let count = |status| checks.iter().filter(|c| c.status == status).count();
        let errors = count(CheckStatus::Error);
        let warnings = count(CheckStatus::Warn);
        Self {
            checks,
            errors,
            warnings,
        }
    }

    fn render(&self, format: Format) -> Result<()> {
        match format {
            Format::Json => println!("{}", serde_json::to_string_pretty(self)?),
            Format::Text => {
                for check in &self.checks {
                    let label = match check.status {
                        CheckStatus::Ok => "  OK   ",
                        CheckStatus::Warn => "  WARN ",
                        CheckStatus::Error => "  ERROR",
                    };
                    println!("{label} {}", check.message);
                }
                println!();
                println!("{} warning(s), {} error(s)", self.warnings, self.errors);
            }
        }
        Ok(())
    }
}

pub async fn run(config_path: &str, format: Format) -> Result<()> {
    let mut checks = Vec::new();
    let path = Path::new(config_path);

    if path.exists() {
        checks.push(CheckResult::ok(format!("Config file '{config_path}' found")));
    } else {
        checks.push(CheckResult::warn(format!(
            "Config file '{config_path}' not found, using defaults"
        )));
    }

    match Config::load(path).await {
        Ok(config) => {
            checks.push(CheckResult::ok("Config parsed"));
            checks.extend(check_config(&config, path));
        }
        Err(e) => checks.push(CheckResult::error(format!("Config is invalid: {e}"))),
    }

    let report = Report::new(checks);
    report.render(format)?;

    if report.errors > 0 {
        bail!("{} error(s) found", report.errors);
    }
    Ok(())
}

fn check_config(config: &Config, config_path: &Path) -> Vec<CheckResult> {
    let mut checks = Vec::new();

    let mode = if config.bot.development_mode {
        "development"
    } else {
        "production"
    };
    match config.bot.active_token() {
        Ok(_) => checks.push(CheckResult::ok(format!("Bot token set for {mode} mode"))),
        Err(e) => checks.push(CheckResult::error(e.to_string())),
    }

    if config.groups.is_empty() {
        checks.push(CheckResult::warn("No groups configured, attendance is unavailable"));
    } else {
        let mut seen = HashSet::new();
        let duplicates: Vec<&str> = config
            .groups
            .iter()
            .filter(|g| !seen.insert(g.to_lowercase()))
            .map(String::as_str)
            .collect();
        if duplicates.is_empty() {
            checks.push(CheckResult::ok(format!(
                "{} group(s): {}",
                config.groups.len(),
                config.groups.join(", ")
            )));
        } else {
            checks.push(CheckResult::warn(format!(
                "Groups differ only by case: {}",
                duplicates.join(", ")
            )));
        }
    }

    let admin = &config.access.admin_role;
    if config
        .access
        .roles
        .iter()
        .any(|r| r.name.eq_ignore_ascii_case(admin))
    {
        checks.push(CheckResult::ok(format!("Controller acts with the '{admin}' role")));
    } else {
        checks.push(CheckResult::warn(format!(
            "access.roles does not include '{admin}', controller commands are disabled"
        )));
    }

    let data_dir = config.data_dir(config_path);
    if data_dir.is_dir() {
        checks.push(CheckResult::ok(format!("Data directory {}", data_dir.display())));
    } else {
        checks.push(CheckResult::warn(format!(
            "Data directory {} does not exist yet, it is created on first save",
            data_dir.display()
        )));
    }

    checks
}
