//! Plugin manifest parsing.
//!
//! One entry per line, `name` or `name:version`. Blank lines and `#`
//! comments are ignored; malformed lines are skipped with a warning. When a
//! name appears more than once, the last occurrence wins.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::CacheError;
use crate::mirror::{PluginRef, PluginVersion};

/// Parse the manifest file at `path`.
pub fn parse_plugin_list(path: &Path) -> Result<Vec<PluginRef>, CacheError> {
    let content = fs::read_to_string(path).map_err(|e| CacheError::Manifest {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(parse_plugin_lines(&content))
}

/// Parse manifest content. Kept separate from the file read so it is pure
/// over the input text.
pub fn parse_plugin_lines(content: &str) -> Vec<PluginRef> {
    let mut plugins: Vec<PluginRef> = Vec::new();
    let mut index_by_name: HashMap<String, usize> = HashMap::new();

    for (lineno, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (name, version) = match line.split_once(':') {
            Some((name, version)) => (name.trim(), Some(version.trim())),
            None => (line, None),
        };

        if !is_valid_name(name) || version.is_some_and(str::is_empty) {
            warn!(line = lineno + 1, entry = raw, "skipping malformed manifest entry");
            continue;
        }

        let plugin = PluginRef::new(
            name,
            version.map_or(PluginVersion::Latest, PluginVersion::parse),
        );

        match index_by_name.get(name) {
            Some(&i) => {
                warn!(plugin = name, "duplicate manifest entry, last occurrence wins");
                plugins[i] = plugin;
            }
            None => {
                index_by_name.insert(name.to_string(), plugins.len());
                plugins.push(plugin);
            }
        }
    }

    plugins
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
