use super::read_project;
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;
use trellis_editor::{
    compute_variable_values, find_available_variables, find_shadowed_variables,
    find_unset_variable_names,
};

#[derive(Args, Debug)]
pub struct VariablesArgs {
    /// Project snapshot
    pub snapshot: PathBuf,

    /// Instance to inspect
    pub instance: String,
}

pub fn variables(args: VariablesArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let data = read_project(&config.resolve_snapshot(cwd, Some(&args.snapshot)))?;
    if data.instance(&args.instance).is_none() {
        anyhow::bail!("Instance not found: {}", args.instance);
    }

    let values = compute_variable_values(&data, &args.instance, &HashMap::new());

    println!("{}", "Available".green().bold());
    let available = find_available_variables(&data, &args.instance);
    if available.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for data_source in &available {
        let value = values
            .get(&data_source.id)
            .map(|value| value.to_display_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} {} = {}",
            data_source.name.bright_white(),
            format!("({})", data_source.id).dimmed(),
            value
        );
    }

    let shadowed = find_shadowed_variables(&data, &args.instance);
    if !shadowed.is_empty() {
        println!();
        println!("{}", "Masked".yellow().bold());
        for data_source in &shadowed {
            println!(
                "  {} {}",
                data_source.name,
                format!("({})", data_source.id).dimmed()
            );
        }
    }

    let unset = find_unset_variable_names(&data, &args.instance);
    if !unset.is_empty() {
        println!();
        println!("{}", "Unset".red().bold());
        for name in &unset {
            println!("  {}", name);
        }
    }

    Ok(())
}
