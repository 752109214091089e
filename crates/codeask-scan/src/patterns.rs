//! Glob pattern parsing and compilation.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use codeask_core::SourceError;

/// Split a comma-separated pattern list, dropping empty entries.
pub fn split_pattern_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Compile patterns into a single matcher.
///
/// Every pattern is anchored both at the root and at any depth below it.
pub fn build_glob_set(patterns: &[String]) -> Result<GlobSet, SourceError> {
    let mut builder = GlobSetBuilder::new();

    for pattern in patterns {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            continue;
        }
        for variant in expand(pattern) {
            let glob = GlobBuilder::new(&variant)
                .literal_separator(true)
                .build()
                .map_err(|e| SourceError::InvalidPattern {
                    pattern: pattern.to_string(),
                    message: e.kind().to_string(),
                })?;
            builder.add(glob);
        }
    }

    builder.build().map_err(|e| SourceError::InvalidPattern {
        pattern: patterns.join(","),
        message: e.to_string(),
    })
}

/// Normalize a user pattern and add the any-depth variant.
fn expand(pattern: &str) -> Vec<String> {
    let normalized = normalize(pattern.trim_start_matches("./"));
    if let Some(anchored) = normalized.strip_prefix('/') {
        return vec![anchored.to_string()];
    }
    if normalized.starts_with("**/") || normalized == "**" {
        return vec![normalized];
    }
    vec![normalized.clone(), format!("**/{normalized}")]
}

/// Rewrite `**` glued to other characters (`src/**.py`) into a proper
/// recursive component (`src/**/*.py`).
fn normalize(pattern: &str) -> String {
    pattern
        .split('/')
        .map(|component| {
            if component == "**" || !component.contains("**") {
                component.to_string()
            } else if let Some(tail) = component.strip_prefix("**") {
                format!("**/*{}", tail.replace("**", "*"))
            } else {
                component.replace("**", "*")
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
