//! Pre-commit hook selection and keyed merge
//!
//! Hook repositories are picked from the template's suffix table and merged
//! into the existing configuration by repository URL. A repository already
//! present keeps its `rev` and hooks; only hook ids it lacks are appended.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use super::template::Template;

/// Suffix key whose repositories apply to every project
pub const ANY_SUFFIX: &str = "*";

fn repo_url(repo: &Value) -> Option<&str> {
    repo.get("repo").and_then(Value::as_str)
}

fn hook_ids(repo: &Value) -> BTreeSet<String> {
    repo.get("hooks")
        .and_then(Value::as_array)
        .map(|hooks| {
            hooks
                .iter()
                .filter_map(|h| h.get("id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Add `incoming` to `repos`, merging hooks into an entry with the same URL
fn merge_repo(repos: &mut Vec<Value>, incoming: &Value) {
    let Some(url) = repo_url(incoming) else {
        return;
    };
    let Some(position) = repos.iter().position(|r| repo_url(r) == Some(url)) else {
        repos.push(incoming.clone());
        return;
    };
    let existing = &mut repos[position];

    let mut known = hook_ids(existing);
    let new_hooks: Vec<Value> = incoming
        .get("hooks")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|h| {
            h.get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| known.insert(id.to_string()))
        })
        .cloned()
        .collect();
    if new_hooks.is_empty() {
        return;
    }
    if let Some(map) = existing.as_object_mut() {
        match map.get_mut("hooks") {
            Some(Value::Array(hooks)) => hooks.extend(new_hooks),
            _ => {
                map.insert("hooks".to_string(), Value::Array(new_hooks));
            }
        }
    }
}

/// Repositories for the given content suffixes, one entry per URL
pub fn select_repos(template: &Template, suffixes: &BTreeSet<String>) -> Vec<Value> {
    let Some(Value::Object(table)) = &template.hooks else {
        return Vec::new();
    };
    let mut repos = Vec::new();
    for (suffix, entries) in table {
        if suffix != ANY_SUFFIX && !suffixes.contains(suffix) {
            continue;
        }
        for entry in entries.as_array().into_iter().flatten() {
            merge_repo(&mut repos, entry);
        }
    }
    repos
}

/// Merge selected repositories into an existing configuration
pub fn merge_config(existing: Value, incoming: &[Value]) -> Value {
    let mut config = match existing {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let repos = config
        .entry("repos")
        .or_insert_with(|| Value::Array(Vec::new()));
    if !repos.is_array() {
        *repos = Value::Array(Vec::new());
    }
    if let Value::Array(repos) = repos {
        for repo in incoming {
            merge_repo(repos, repo);
        }
    }
    Value::Object(config)
}
