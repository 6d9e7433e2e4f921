//! Dataset/config loading and the CLI surface (§6, SPEC_FULL [AMBIENT]
//! Configuration).
//!
//! Input layout: `../datasets/<dataset>/<repo>/config.json` declaring file
//! paths of `PRD`, `UML` (or `UML_class`+`UML_sequence`), and
//! `architecture_design`. Output: `../<dataset>_outputs/<repo>/`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

/// CLI surface (§6): a single required argument plus ambient flags the
/// teacher's own CLIs carry (verbosity, a log file, a partial-run cap) that
/// do not change pipeline semantics.
#[derive(Debug, Parser)]
#[command(
    name = "orchestrator-pipeline",
    about = "Drives the architect/skeleton/code loops over a repository dataset"
)]
pub struct CliArgs {
    /// Dataset tag under `../datasets/<dataset>/`.
    #[arg(long, default_value = "CodeProjectEval")]
    pub dataset: String,

    /// Append a single shared log under `../<dataset>_outputs/test_log.log`
    /// unless overridden.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Process at most this many repositories (default: all).
    #[arg(long)]
    pub max_repos: Option<usize>,

    /// Raise the tracing filter (repeatable: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// One `UML` list entry, tagged by the generator that produced it
/// (`CodeProjectEval`'s dataset-conditional selection picks the
/// `pyreverse`-tagged entry).
#[derive(Debug, Clone, Deserialize)]
pub struct UmlEntry {
    pub generator: String,
    pub path: PathBuf,
}

/// Per-repository `config.json` shape.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoConfig {
    #[serde(rename = "PRD")]
    pub prd: PathBuf,
    #[serde(rename = "UML", default)]
    pub uml: Option<Vec<UmlEntry>>,
    #[serde(rename = "UML_class", default)]
    pub uml_class: Option<PathBuf>,
    #[serde(rename = "UML_sequence", default)]
    pub uml_sequence: Option<PathBuf>,
    pub architecture_design: PathBuf,
    #[serde(default)]
    pub required_files: Vec<PathBuf>,
    #[serde(default)]
    pub usage_examples: Vec<PathBuf>,
    #[serde(default)]
    pub check_tests: Option<PathBuf>,
    #[serde(default)]
    pub setup_script: Option<PathBuf>,
}

impl RepoConfig {
    /// Dataset-conditional UML field selection: `DevBench` carries separate
    /// class/sequence files; `CodeProjectEval` carries a tagged `UML` list
    /// and leaves sequence empty (SPEC_FULL [SUPPLEMENT]).
    pub fn class_and_sequence_uml(&self, dataset: &str) -> (Option<PathBuf>, Option<PathBuf>) {
        if dataset == "DevBench" {
            (self.uml_class.clone(), self.uml_sequence.clone())
        } else {
            let class = self
                .uml
                .as_ref()
                .and_then(|entries| entries.iter().find(|e| e.generator == "pyreverse"))
                .map(|e| e.path.clone());
            (class, None)
        }
    }
}

/// One discovered repository entry: its name and parsed config, rooted at
/// `dataset_dir`.
pub struct RepoEntry {
    pub name: String,
    pub dir: PathBuf,
    pub config: RepoConfig,
}

/// Enumerate `../datasets/<dataset>/*/config.json`, sorted by repo name for
/// reproducible run order.
pub fn load_dataset(dataset: &str) -> Result<Vec<RepoEntry>> {
    let dataset_dir = PathBuf::from("..").join("datasets").join(dataset);
    let mut entries = Vec::new();
    let read_dir = fs::read_dir(&dataset_dir)
        .with_context(|| format!("reading dataset directory {}", dataset_dir.display()))?;
    for entry in read_dir {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let repo_dir = entry.path();
        let config_path = repo_dir.join("config.json");
        if !config_path.exists() {
            continue;
        }
        let raw = fs::read_to_string(&config_path)
            .with_context(|| format!("reading {}", config_path.display()))?;
        let config: RepoConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", config_path.display()))?;
        entries.push(RepoEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            dir: repo_dir,
            config,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Read the PRD/UML-class/UML-sequence/architecture-design text for one
/// repository, following the `(path relative to the repo's own directory)`
/// convention used by `config.json`.
pub fn load_repo_docs(repo: &RepoEntry, dataset: &str) -> Result<(String, String, String, String)> {
    let prd = read_relative(&repo.dir, &repo.config.prd)?;
    let (class_path, sequence_path) = repo.config.class_and_sequence_uml(dataset);
    let uml_class = class_path
        .map(|p| read_relative(&repo.dir, &p))
        .transpose()?
        .unwrap_or_default();
    let uml_sequence = sequence_path
        .map(|p| read_relative(&repo.dir, &p))
        .transpose()?
        .unwrap_or_default();
    let arch_design = read_relative(&repo.dir, &repo.config.architecture_design)?;
    Ok((prd, uml_class, uml_sequence, arch_design))
}

fn read_relative(base: &Path, relative: &Path) -> Result<String> {
    let path = base.join(relative);
    fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))
}

/// Output directory root for one dataset: `../<dataset>_outputs/`.
pub fn output_root(dataset: &str) -> PathBuf {
    PathBuf::from("..").join(format!("{dataset}_outputs"))
}

/// Output directory for one repository: `../<dataset>_outputs/<repo>/`.
pub fn repo_output_dir(dataset: &str, repo_name: &str) -> PathBuf {
    output_root(dataset).join(repo_name)
}
