use std::{io::ErrorKind, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Category returned when no rule matches a window title.
pub const OTHER_CATEGORY: &str = "Other";

/// A named category with the title fragments that identify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub patterns: Vec<String>,
}

impl CategoryRule {
    pub fn new(name: impl Into<String>, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Case-insensitive substring match of any pattern against `lowercase_title`.
    fn matches(&self, lowercase_title: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| lowercase_title.contains(&pattern.to_lowercase()))
    }
}

/// Ordered list of [CategoryRule]s. The first rule matching a title decides its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categorizer {
    rules: Vec<CategoryRule>,
}

impl Default for Categorizer {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl Categorizer {
    /// Builds a categorizer keeping rule order. Later rules reusing an earlier name are dropped.
    pub fn new(rules: impl IntoIterator<Item = CategoryRule>) -> Self {
        let mut categorizer = Self { rules: Vec::new() };
        for rule in rules {
            categorizer.add_category(rule.name, rule.patterns);
        }
        categorizer
    }

    /// Reads rules from a JSON file. A missing file falls back to [default_rules].
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No category rules at {path:?}, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {path:?}")),
        };
        let rules: Vec<CategoryRule> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse category rules in {path:?}"))?;
        debug!("Loaded {} category rules from {path:?}", rules.len());
        Ok(Self::new(rules))
    }

    pub fn categorize(&self, window_title: &str) -> &str {
        let title = window_title.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&title))
            .map_or(OTHER_CATEGORY, |rule| rule.name.as_str())
    }

    /// Appends a rule. Returns `false` and leaves the rules untouched if `name` is already taken.
    pub fn add_category(
        &mut self,
        name: impl Into<String>,
        patterns: impl IntoIterator<Item = impl Into<String>>,
    ) -> bool {
        let name = name.into();
        if self.rules.iter().any(|rule| rule.name == name) {
            debug!("Category {name} already exists");
            return false;
        }
        self.rules.push(CategoryRule::new(name, patterns));
        true
    }

    /// Removes every rule called `name`. Returns whether anything was removed.
    pub fn remove_category(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.name != name);
        before != self.rules.len()
    }

    /// Category names in priority order.
    pub fn categories(&self) -> Vec<String> {
        self.rules.iter().map(|rule| rule.name.clone()).collect()
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }
}

pub fn default_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "Development",
            ["VS Code", "Visual Studio", "IntelliJ", "GitHub", ".ts", ".js", ".py", "Terminal"],
        ),
        CategoryRule::new(
            "Communication",
            ["Slack", "Microsoft Teams", "Zoom", "Discord", "Outlook", "Gmail", "Mail"],
        ),
        CategoryRule::new(
            "Productivity",
            ["Word", "Excel", "PowerPoint", "Google Docs", "Notion", "Trello", "Jira"],
        ),
        CategoryRule::new("Browsing", ["Chrome", "Firefox", "Safari", "Edge", "Opera"]),
        CategoryRule::new(
            "Entertainment",
            ["YouTube", "Netflix", "Spotify", "VLC", "Media Player"],
        ),
    ]
}
