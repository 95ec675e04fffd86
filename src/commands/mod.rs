pub mod apply;
pub mod check;

use anyhow::{Context as AnyhowContext, Result};
use declarative::ResourceDeclaration;
use std::path::{Path, PathBuf};

use crate::config::NodeConfig;
use crate::recipe::{self, RecipeError};
use crate::ui;

/// Recipe from the command line, else from the node config
fn recipe_path(arg: Option<&Path>, config: &NodeConfig) -> Result<PathBuf> {
    arg.map(Path::to_path_buf)
        .or_else(|| config.recipe_path())
        .context("No recipe given and none set in the node config")
}

/// Load a recipe, printing every invalid declaration before failing
fn load_recipe(path: &Path) -> Result<Vec<ResourceDeclaration>> {
    match recipe::load(path) {
        Ok(declarations) => Ok(declarations),
        Err(RecipeError::Invalid(problems)) => {
            for (index, err) in &problems {
                ui::error(&format!("resource #{}: {err}", index + 1));
            }
            anyhow::bail!(
                "{} has {} invalid declaration(s)",
                path.display(),
                problems.len()
            )
        }
        Err(e) => Err(e).with_context(|| format!("Could not load recipe {}", path.display())),
    }
}
