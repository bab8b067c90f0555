//! End-to-end configuration of small Python projects

use std::path::Path;

use pretty_assertions::assert_eq;
use qpub::chapter::Repository;
use qpub::config::{Backend, Settings};
use qpub::project::{Artifact, Projector};
use qpub::session::{compose, Verb};
use qpub::shell::RecordingShell;
use qpub::tasks::{Catalog, Runner, TaskDb, TaskParams};
use qpub::MetadataExtractor;
use serde_yaml::Value as Yaml;
use tempfile::TempDir;
use toml_edit::DocumentMut;

const MY_IDEA: &str = "'''doc'''\n__version__ = \"0.0.1\"\nimport pandas\n";

fn project(files: &[(&str, &str)]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for (name, text) in files {
        let path = temp.path().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }
    temp
}

fn read(root: &Path, name: &str) -> String {
    std::fs::read_to_string(root.join(name)).unwrap()
}

fn strings(item: &toml_edit::Item) -> Vec<String> {
    item.as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str()).map(str::to_string).collect())
        .unwrap_or_default()
}

/// Run the given tasks the way `qpub run` does, without a git repository
fn run_tasks(root: &Path, settings: &Settings, params: &TaskParams, tasks: Vec<String>) -> qpub::Report {
    let repo = Repository::scan(root, None, settings).unwrap();
    let shell = RecordingShell::new();
    let catalog = Catalog::build(&repo, settings, params);
    let projector = Projector::new(&repo, settings, &shell).with_python_version(Some("3.11".into()));
    let db = TaskDb::open(&settings.task_db_path(root));
    let mut runner = Runner::new(root, &shell, &projector, db);
    runner.run(&catalog, &tasks).unwrap()
}

fn configure(root: &Path, settings: &Settings, params: &TaskParams) -> qpub::Report {
    let repo = Repository::scan(root, None, settings).unwrap();
    let catalog = Catalog::build(&repo, settings, params);
    let tasks = compose(&[Verb::Configure], &catalog, settings);
    run_tasks(root, settings, params, tasks)
}

#[test]
fn single_file_flit_project() {
    let temp = project(&[("my_idea.py", MY_IDEA)]);
    let report = configure(temp.path(), &Settings::default(), &TaskParams::default());
    assert!(report.success(), "{:?}", report);

    let doc: DocumentMut = read(temp.path(), "pyproject.toml").parse().unwrap();
    let metadata = &doc["tool"]["flit"]["metadata"];
    assert_eq!(metadata["module"].as_str(), Some("my_idea"));
    let requires = strings(&metadata["requires"]);
    assert!(requires.contains(&"pandas".to_string()));
    assert!(!requires.contains(&"my_idea".to_string()));
    assert!(strings(&metadata["requires-extra"]["test"]).contains(&"pytest".to_string()));
    assert!(!temp.path().join("setup.cfg").exists());
}

#[test]
fn switching_to_setuptools() {
    let temp = project(&[("my_idea.py", MY_IDEA)]);
    configure(temp.path(), &Settings::default(), &TaskParams::default());

    let params = TaskParams {
        backend: Some(Backend::Setuptools),
        ..Default::default()
    };
    let report = run_tasks(temp.path(), &Settings::default(), &params, vec!["pyproject".into()]);
    assert!(report.success(), "{:?}", report);

    let pyproject = read(temp.path(), "pyproject.toml");
    let doc: DocumentMut = pyproject.parse().unwrap();
    let backend = doc["build-system"]["build-backend"].as_str().unwrap();
    assert!(backend.starts_with("setuptools"));
    assert!(!pyproject.contains("flit_core"));

    let setup_cfg = read(temp.path(), "setup.cfg");
    assert!(setup_cfg.contains("[metadata]\nname = my_idea\n"));
    assert!(setup_cfg.contains("[options]"));
    assert!(setup_cfg.contains("install_requires =\n    pandas\n"));
}

#[test]
fn notebook_only_project() {
    let temp = project(&[(
        "my_idea.ipynb",
        r#"{"cells": [{"cell_type": "code", "metadata": {}, "source": ["import pandas"]}], "metadata": {}, "nbformat": 4, "nbformat_minor": 4}"#,
    )]);
    let settings = Settings::default();
    let repo = Repository::scan(temp.path(), None, &settings).unwrap();
    let metadata = MetadataExtractor::new(&repo, &settings).extract().unwrap();
    assert!(metadata.test_requires.contains(&"nbval".to_string()));
    assert!(metadata.test_requires.contains(&"importnb".to_string()));

    let shell = RecordingShell::new();
    let projector = Projector::new(&repo, &settings, &shell).with_metadata(metadata);
    projector.write(Artifact::Requirements).unwrap();
    projector.write(Artifact::Pyproject(Backend::Flit)).unwrap();

    assert!(read(temp.path(), "requirements.txt").lines().any(|l| l == "pandas"));
    let doc: DocumentMut = read(temp.path(), "pyproject.toml").parse().unwrap();
    assert_eq!(doc["tool"]["flit"]["metadata"]["module"].as_str(), Some("my_idea"));
}

#[test]
fn dated_post_project() {
    let temp = project(&[(
        "1969-12-9-my-idea.ipynb",
        r#"{"cells": [{"cell_type": "code", "metadata": {}, "source": ["import pandas"]}], "metadata": {}, "nbformat": 4, "nbformat_minor": 4}"#,
    )]);
    let settings = Settings::default();
    let repo = Repository::scan(temp.path(), None, &settings).unwrap();
    assert_eq!(
        repo.chapter().posts,
        vec![std::path::PathBuf::from("1969-12-9-my-idea.ipynb")]
    );
    assert_eq!(MetadataExtractor::new(&repo, &settings).name().unwrap().name, "my_idea");

    let shell = RecordingShell::new();
    let projector = Projector::new(&repo, &settings, &shell);
    projector.write(Artifact::Toc).unwrap();
    assert!(read(temp.path(), "docs/_toc.yml").contains("file: 1969-12-9-my-idea"));
}

#[test]
fn docs_table_of_contents() {
    let temp = project(&[("readme.md", "# hello\n"), ("a.md", "a\n"), ("b/c.md", "c\n")]);
    let report = run_tasks(
        temp.path(),
        &Settings::default(),
        &TaskParams::default(),
        vec!["toc".into()],
    );
    assert!(report.success(), "{:?}", report);
    assert_eq!(
        read(temp.path(), "docs/_toc.yml"),
        "file: readme\nsections:\n- file: a\n- file: b/c\n"
    );
}

fn hook_count(config: &Yaml, id: &str) -> usize {
    config["repos"]
        .as_sequence()
        .unwrap()
        .iter()
        .flat_map(|repo| repo["hooks"].as_sequence().cloned().unwrap_or_default())
        .filter(|hook| hook["id"].as_str() == Some(id))
        .count()
}

#[test]
fn precommit_merge_is_idempotent() {
    let temp = project(&[
        ("my_idea.py", MY_IDEA),
        (
            ".pre-commit-config.yaml",
            "repos:\n- repo: https://github.com/psf/black\n  rev: 19.3b0\n  hooks:\n  - id: black\n",
        ),
    ]);
    let settings = Settings::default();
    for _ in 0..2 {
        let repo = Repository::scan(temp.path(), None, &settings).unwrap();
        let shell = RecordingShell::new();
        Projector::new(&repo, &settings, &shell)
            .write(Artifact::Precommit)
            .unwrap();
    }

    let config: Yaml = serde_yaml::from_str(&read(temp.path(), ".pre-commit-config.yaml")).unwrap();
    let black = &config["repos"][0];
    assert_eq!(black["repo"].as_str(), Some("https://github.com/psf/black"));
    assert_eq!(black["rev"].as_str(), Some("19.3b0"));
    assert_eq!(hook_count(&config, "black"), 1);
    assert_eq!(hook_count(&config, "end-of-file-fixer"), 1);
    assert_eq!(hook_count(&config, "check-yaml"), 1);
}

#[test]
fn second_configure_is_up_to_date() {
    let temp = project(&[("my_idea.py", MY_IDEA), ("readme.md", "# my idea\n")]);
    let settings = Settings::default();
    let params = TaskParams::default();
    let first = configure(temp.path(), &settings, &params);
    assert!(!first.executed().is_empty());

    let pyproject = read(temp.path(), "pyproject.toml");
    let second = configure(temp.path(), &settings, &params);
    assert!(second.success());
    assert!(second.executed().is_empty(), "{:?}", second);
    assert_eq!(read(temp.path(), "pyproject.toml"), pyproject);
}
