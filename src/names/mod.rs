//! Name mapping between import names, pip distributions and conda packages
//!
//! The bundled dataset (`data/names.json`) carries the standard library
//! module list and two tables keyed by import name: the pip distribution and
//! the conda package providing it. Names absent from a table pass through
//! unchanged.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::Result;

const DATASET: &str = include_str!("../../data/names.json");

/// File name of the lookup cache inside the cache directory
pub const LOOKUP_CACHE_FILE: &str = "lookups.json";

#[derive(Debug, Deserialize)]
struct Dataset {
    stdlib: Vec<String>,
    pip: HashMap<String, String>,
    conda: HashMap<String, String>,
}

/// Immutable mapping tables
#[derive(Debug, Default)]
pub struct Tables {
    stdlib: HashSet<String>,
    import_to_pip: HashMap<String, String>,
    import_to_conda: HashMap<String, String>,
    pip_to_conda: HashMap<String, String>,
}

impl Tables {
    fn from_dataset(dataset: Dataset) -> Self {
        let mut pip_to_conda = HashMap::new();
        for (import, conda) in &dataset.conda {
            let pip = dataset.pip.get(import).unwrap_or(import);
            pip_to_conda.insert(pip.clone(), conda.clone());
        }
        Self {
            stdlib: dataset.stdlib.into_iter().collect(),
            import_to_pip: dataset.pip,
            import_to_conda: dataset.conda,
            pip_to_conda,
        }
    }

    pub fn is_stdlib(&self, import: &str) -> bool {
        let top = import.split('.').next().unwrap_or(import);
        self.stdlib.contains(top)
    }

    pub fn pip_name(&self, import: &str) -> Option<&str> {
        self.import_to_pip.get(import).map(String::as_str)
    }

    pub fn conda_name(&self, import: &str) -> Option<&str> {
        self.import_to_conda.get(import).map(String::as_str)
    }

    pub fn conda_for_pip(&self, pip: &str) -> Option<&str> {
        self.pip_to_conda.get(pip).map(String::as_str)
    }

    /// Whether either table knows the import
    pub fn knows(&self, import: &str) -> bool {
        self.import_to_pip.contains_key(import) || self.import_to_conda.contains_key(import)
    }
}

/// The process-wide tables, parsed on first use
pub fn get_tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| match serde_json::from_str::<Dataset>(DATASET) {
        Ok(dataset) => Tables::from_dataset(dataset),
        Err(e) => {
            tracing::warn!("bundled name dataset is unreadable: {}", e);
            Tables::default()
        }
    })
}

/// Map each name in order, dropping later duplicates
fn map_ordered<'a, F>(names: &'a [String], mut f: F) -> Vec<String>
where
    F: FnMut(&'a str) -> String,
{
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| f(n.as_str()))
        .filter(|n| seen.insert(n.clone()))
        .collect()
}

/// Import names to pip distribution names, input order preserved
pub fn import_to_primary(names: &[String]) -> Vec<String> {
    let tables = get_tables();
    map_ordered(names, |n| tables.pip_name(n).unwrap_or(n).to_string())
}

/// Pip distribution names to conda package names, input order preserved
pub fn primary_to_alternate(names: &[String]) -> Vec<String> {
    let tables = get_tables();
    map_ordered(names, |n| tables.conda_for_pip(n).unwrap_or(n).to_string())
}

/// User-editable overrides and the names that went unmapped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupEntries {
    #[serde(default)]
    pub pip: BTreeMap<String, String>,
    #[serde(default)]
    pub conda: BTreeMap<String, String>,
    #[serde(default)]
    pub unmapped: BTreeSet<String>,
}

/// Lookup cache installed for one harvest
///
/// Loads `<cache>/lookups.json` on install, consults its overrides before the
/// bundled tables, records names neither knows, and writes itself back when
/// dropped.
#[derive(Debug)]
pub struct LookupCache {
    path: PathBuf,
    entries: LookupEntries,
    dirty: bool,
}

impl LookupCache {
    pub fn install(cache_dir: &Path) -> Result<Self> {
        let path = cache_dir.join(LOOKUP_CACHE_FILE);
        let entries = if path.exists() {
            serde_json::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            LookupEntries::default()
        };
        tracing::debug!("lookup cache installed at {}", path.display());
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    pub fn entries(&self) -> &LookupEntries {
        &self.entries
    }

    /// Pip names for imports, overrides first
    pub fn import_to_primary(&mut self, names: &[String]) -> Vec<String> {
        let tables = get_tables();
        let mut unmapped = Vec::new();
        let mapped = map_ordered(names, |n| {
            if let Some(pip) = self.entries.pip.get(n) {
                return pip.clone();
            }
            if !tables.knows(n) {
                unmapped.push(n.to_string());
            }
            tables.pip_name(n).unwrap_or(n).to_string()
        });
        for name in unmapped {
            self.dirty |= self.entries.unmapped.insert(name);
        }
        mapped
    }

    /// Conda names for pip names, overrides first
    pub fn primary_to_alternate(&self, names: &[String]) -> Vec<String> {
        let tables = get_tables();
        map_ordered(names, |n| {
            self.entries
                .conda
                .get(n)
                .cloned()
                .unwrap_or_else(|| tables.conda_for_pip(n).unwrap_or(n).to_string())
        })
    }

    fn flush(&self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.entries)?;
        crate::files::write_atomic(&self.path, &(text + "\n"))
    }
}

impl Drop for LookupCache {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!("could not write {}: {}", self.path.display(), e);
        }
        tracing::debug!("lookup cache uninstalled");
    }
}
