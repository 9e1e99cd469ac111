use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;

use crate::engine::{categorizer::Categorizer, CATEGORIES_FILE};

#[derive(Debug, Parser)]
pub struct CategoriesCommand {
    #[arg(long, help = "Category rules file. Defaults to categories.json in the application directory")]
    categories: Option<PathBuf>,
    #[arg(long, help = "Print as json")]
    json: bool,
}

/// Prints the rules in the order they are matched.
pub fn process_categories_command(
    dir: &Path,
    CategoriesCommand { categories, json }: CategoriesCommand,
) -> Result<()> {
    let path = categories.unwrap_or_else(|| dir.join(CATEGORIES_FILE));
    let categorizer = Categorizer::load(&path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(categorizer.rules())?);
        return Ok(());
    }

    for rule in categorizer.rules() {
        println!("{}\t{}", rule.name, rule.patterns.join(", "));
    }
    Ok(())
}
