pub mod eval;
pub mod init;
pub mod resources;
pub mod validate;
pub mod variables;

pub use eval::{eval, EvalArgs};
pub use init::{init, InitArgs};
pub use resources::{resources, ResourcesArgs};
pub use validate::{validate, ValidateArgs};
pub use variables::{variables, VariablesArgs};

use anyhow::{Context, Result};
use std::path::Path;
use trellis_data::{ProjectData, ProjectSnapshot};

pub(crate) fn read_snapshot(path: &Path) -> Result<ProjectSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read snapshot {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid snapshot {}", path.display()))
}

pub(crate) fn read_project(path: &Path) -> Result<ProjectData> {
    Ok(ProjectData::from_snapshot(read_snapshot(path)?))
}
