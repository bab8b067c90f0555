//! Conda environment requirements
//!
//! Pip requirements are translated to conda package names, then probed with
//! a dry-run install. Packages the solver reports as missing are listed
//! under the nested `pip:` entry with their pip names.

use std::collections::BTreeSet;

use serde_json::Value;

use crate::config::Settings;
use crate::shell::{CommandSpec, Shell};

/// Solver rounds before giving up on a conda solution
const MAX_PROBES: usize = 3;

/// Requirements split between conda and pip
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CondaSplit {
    pub conda: Vec<String>,
    pub pip: Vec<String>,
}

/// Bare package name of a match spec such as `foo[version='>=1']` or `foo==1.0`
fn spec_name(spec: &str) -> String {
    let spec = spec.rsplit("::").next().unwrap_or(spec);
    spec.split(|c: char| matches!(c, '=' | '<' | '>' | '!' | '[' | ' ' | '~'))
        .next()
        .unwrap_or(spec)
        .trim()
        .to_lowercase()
}

/// Packages named by a `PackagesNotFoundError` in a dry-run report
pub fn packages_not_found(report: &Value) -> BTreeSet<String> {
    let is_not_found = report
        .get("exception_name")
        .and_then(Value::as_str)
        .is_some_and(|name| name.contains("PackagesNotFound"));
    if !is_not_found {
        return BTreeSet::new();
    }
    report
        .get("packages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .map(spec_name)
        .collect()
}

/// Split `(pip, conda)` name pairs by probing the conda solver
///
/// Without a solver, or with pip forced, nothing is probed: the first keeps
/// every package on conda, the second moves every package to pip.
pub fn split_requirements(
    shell: &dyn Shell,
    settings: &Settings,
    pairs: &[(String, String)],
) -> CondaSplit {
    if settings.pip_only {
        return CondaSplit {
            conda: Vec::new(),
            pip: pairs.iter().map(|(pip, _)| pip.clone()).collect(),
        };
    }

    let exe = settings.conda_exe();
    let mut missing: BTreeSet<String> = BTreeSet::new();
    if pairs.is_empty() || shell.which(exe).is_none() {
        if !pairs.is_empty() {
            tracing::debug!("{} not found; skipping the solver probe", exe);
        }
    } else {
        for _ in 0..MAX_PROBES {
            let candidates: Vec<&String> = pairs
                .iter()
                .map(|(_, conda)| conda)
                .filter(|c| !missing.contains(c.as_str()))
                .collect();
            if candidates.is_empty() {
                break;
            }
            let spec = CommandSpec::new(exe)
                .args(["install", "--dry-run", "--json", "-c", "conda-forge"])
                .args(candidates.iter().map(|c| c.as_str()))
                .capture();
            let report = match shell.run(&spec) {
                Ok(output) if output.success() => break,
                Ok(output) => serde_json::from_str::<Value>(&output.stdout).unwrap_or_default(),
                Err(e) => {
                    tracing::warn!("{} probe failed: {}", exe, e);
                    break;
                }
            };
            let found = packages_not_found(&report);
            if found.is_empty() {
                tracing::warn!("{} could not solve the environment", exe);
                break;
            }
            tracing::info!("not on conda: {}", found.iter().cloned().collect::<Vec<_>>().join(", "));
            missing.extend(found);
        }
    }

    let mut split = CondaSplit::default();
    for (pip, conda) in pairs {
        if missing.contains(&conda.to_lowercase()) {
            split.pip.push(pip.clone());
        } else {
            split.conda.push(conda.clone());
        }
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::{Output, RecordingShell};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn test_packages_not_found() {
        let report = json!({
            "exception_name": "PackagesNotFoundError",
            "packages": ["my-private-lib", "conda-forge::other[version='>=1']"]
        });
        assert_eq!(
            packages_not_found(&report),
            ["my-private-lib", "other"].iter().map(|s| s.to_string()).collect()
        );
        assert!(packages_not_found(&json!({"success": true})).is_empty());
    }

    #[test]
    fn test_missing_packages_move_to_pip() {
        let shell = RecordingShell::new().with_programs(["conda"]);
        shell.respond(
            "conda",
            Output {
                code: 1,
                stdout: json!({"exception_name": "PackagesNotFoundError", "packages": ["private"]}).to_string(),
                stderr: String::new(),
            },
        );
        let split = split_requirements(
            &shell,
            &Settings::default(),
            &pairs(&[("pandas", "pandas"), ("private", "private")]),
        );
        assert_eq!(split.conda, vec!["pandas"]);
        assert_eq!(split.pip, vec!["private"]);
        let lines = shell.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("pandas private"));
        assert!(lines[1].ends_with("conda-forge pandas"));
    }

    #[test]
    fn test_without_solver() {
        let shell = RecordingShell::new();
        let input = pairs(&[("pyyaml", "yaml")]);
        let split = split_requirements(&shell, &Settings::default(), &input);
        assert_eq!(split.conda, vec!["yaml"]);
        assert!(shell.calls().is_empty());

        let settings = Settings {
            pip_only: true,
            ..Default::default()
        };
        let split = split_requirements(&shell, &settings, &input);
        assert_eq!(split.pip, vec!["pyyaml"]);
        assert!(split.conda.is_empty());
    }
}
