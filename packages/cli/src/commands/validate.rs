use super::read_snapshot;
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use trellis_editor::{validate_snapshot, IntegrityIssue, IssueLevel};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Project snapshot (defaults to the configured one)
    pub snapshot: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    pub format: String,
}

pub fn validate(args: ValidateArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let path = config.resolve_snapshot(cwd, args.snapshot.as_ref());
    let snapshot = read_snapshot(&path)?;
    let issues = validate_snapshot(&snapshot);

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&issues)?);
    } else {
        print_issues(&path, &issues);
    }

    let errors = count(&issues, IssueLevel::Error);
    if errors > 0 {
        anyhow::bail!("{} integrity error(s) in {}", errors, path.display());
    }
    Ok(())
}

fn count(issues: &[IntegrityIssue], level: IssueLevel) -> usize {
    issues.iter().filter(|issue| issue.level() == level).count()
}

fn print_issues(path: &std::path::Path, issues: &[IntegrityIssue]) {
    println!("🔍 {} {}", "Validating".green().bold(), path.display());
    println!();

    for issue in issues {
        match issue.level() {
            IssueLevel::Error => println!("  {} {}", "error:".red().bold(), issue),
            IssueLevel::Warning => println!("  {} {}", "warning:".yellow().bold(), issue),
        }
    }

    if issues.is_empty() {
        println!("  {} No issues found!", "✓".green());
        return;
    }
    println!();
    println!(
        "  {} {}, {} {}",
        "Errors:".red(),
        count(issues, IssueLevel::Error),
        "Warnings:".yellow(),
        count(issues, IssueLevel::Warning)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use trellis_data::{Instance, InstanceChild, Page, ProjectSnapshot};

    fn write(dir: &TempDir, snapshot: &ProjectSnapshot) -> PathBuf {
        let path = dir.path().join("project.json");
        std::fs::write(&path, serde_json::to_string(snapshot).unwrap()).unwrap();
        path
    }

    fn site(children: Vec<InstanceChild>) -> ProjectSnapshot {
        let mut body = Instance::new("body", "Body");
        body.children = children;
        ProjectSnapshot {
            instances: vec![
                ("body".into(), body),
                ("box".into(), Instance::new("box", "Box")),
            ],
            pages: vec![("home".into(), Page::new("home", "Home", "/", "body"))],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_snapshot_passes() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, &site(vec![InstanceChild::id("box")]));
        let cwd = dir.path().to_string_lossy().to_string();
        validate(
            ValidateArgs {
                snapshot: Some(path),
                format: "json".into(),
            },
            &cwd,
        )
        .unwrap();
    }

    #[test]
    fn test_dangling_child_fails() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            &site(vec![InstanceChild::id("box"), InstanceChild::id("ghost")]),
        );
        let cwd = dir.path().to_string_lossy().to_string();
        let result = validate(
            ValidateArgs {
                snapshot: Some(path),
                format: "text".into(),
            },
            &cwd,
        );
        assert!(result.is_err());
    }
}
