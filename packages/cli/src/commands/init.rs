use crate::config::{Config, DEFAULT_CONFIG_NAME};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Project snapshot path
    #[arg(short, long, default_value = "project.json")]
    pub snapshot: String,

    /// Resource loader endpoint
    #[arg(short, long)]
    pub loader_url: Option<String>,

    /// Force overwrite existing config
    #[arg(short, long)]
    pub force: bool,
}

pub fn init(args: InitArgs, cwd: &str) -> Result<()> {
    let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    let config = Config {
        snapshot_path: args.snapshot,
        loader_url: args.loader_url,
        ..Config::default()
    };
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;
    println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);

    let snapshot_path = PathBuf::from(cwd).join(&config.snapshot_path);
    if !snapshot_path.exists() {
        let empty = trellis_data::ProjectSnapshot::default();
        fs::write(&snapshot_path, serde_json::to_string_pretty(&empty)?)?;
        println!("  {} Created {}", "✓".green(), config.snapshot_path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_config_and_snapshot() {
        let dir = TempDir::new().unwrap();
        let cwd = dir.path().to_string_lossy().to_string();
        init(
            InitArgs {
                snapshot: "site.json".into(),
                loader_url: None,
                force: false,
            },
            &cwd,
        )
        .unwrap();

        let config = Config::load(&cwd).unwrap();
        assert_eq!(config.snapshot_path, "site.json");
        assert!(dir.path().join("site.json").exists());
    }
}
