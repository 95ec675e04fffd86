//! `provision check` - validate a recipe without touching the host

use anyhow::Result;
use colored::Colorize;
use declarative::ResourceDeclaration;

use crate::Context;
use crate::cli::CheckArgs;
use crate::config::NodeConfig;
use crate::ui;

pub fn run(ctx: &Context, args: &CheckArgs) -> Result<()> {
    let node = NodeConfig::load(ctx.config.as_deref())?;
    let recipe = super::recipe_path(args.recipe.as_deref(), &node)?;
    let declarations = super::load_recipe(&recipe)?;

    ui::header(&format!("Recipe {}", recipe.display()));
    for declaration in &declarations {
        print_declaration(declaration, ctx.verbose > 0);
    }

    let disabled = declarations.iter().filter(|d| !d.is_enabled()).count();
    println!();
    if disabled > 0 {
        ui::success(&format!(
            "{} declaration(s) valid ({disabled} disabled)",
            declarations.len()
        ));
    } else {
        ui::success(&format!("{} declaration(s) valid", declarations.len()));
    }
    Ok(())
}

fn print_declaration(declaration: &ResourceDeclaration, show_attributes: bool) {
    let actions: Vec<_> = declaration.actions().iter().map(ToString::to_string).collect();
    let symbol = if declaration.is_enabled() {
        "✓".green()
    } else {
        "⊘".dimmed()
    };
    println!("  {symbol} {declaration} {}", actions.join(", ").dimmed());

    if show_attributes {
        for (key, value) in declaration.attributes() {
            ui::kv(&format!("    {key}"), &value.to_string());
        }
    }
}
