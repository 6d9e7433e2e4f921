use std::fs;

use anyhow::{Context, Result};
use clap::Parser;
use engine::{Controller, FsError, PipelineState, RealWorkspace, Workspace};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use pipeline::config::{self, CliArgs};
use pipeline::llm_client::RigLlmClient;
use pipeline::test_runner::CargoTestRunner;

fn init_tracing(args: &CliArgs) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    let log_path = args
        .log_file
        .clone()
        .unwrap_or_else(|| config::output_root(&args.dataset).join("test_log.log"));
    if let Some(parent) = log_path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    match fs::OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let stdout_layer = tracing_subscriber::fmt::layer();
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            warn!(path = %log_path.display(), error = %e, "could not open shared log file, logging to stdout only");
            None
        }
    }
}

fn main() -> Result<()> {
    let args = CliArgs::parse();
    let _log_guard = init_tracing(&args);

    info!(dataset = %args.dataset, "orchestration pipeline starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let _enter = runtime.enter();

    let base_url = std::env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let api_key = std::env::var("LLM_API_KEY").context("LLM_API_KEY must be set")?;
    let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let llm = RigLlmClient::new(&base_url, &api_key, &model)?;
    let test_runner = CargoTestRunner::new();

    let repos = config::load_dataset(&args.dataset)
        .with_context(|| format!("loading dataset {}", args.dataset))?;
    let repos = match args.max_repos {
        Some(n) => repos.into_iter().take(n).collect(),
        None => repos,
    };
    info!(count = repos.len(), "discovered repositories");

    for repo in repos {
        let span = tracing::info_span!("repository", repo = %repo.name);
        let _enter = span.enter();

        let (prd, uml_class, uml_sequence, arch_design) =
            match config::load_repo_docs(&repo, &args.dataset) {
                Ok(docs) => docs,
                Err(e) => {
                    error!("failed to load repository documents: {e:?}");
                    continue;
                }
            };

        let output_dir = config::repo_output_dir(&args.dataset, &repo.name);
        if let Err(e) = fs::create_dir_all(&output_dir) {
            error!("failed to create output directory {}: {e}", output_dir.display());
            continue;
        }
        let workspace = RealWorkspace::new(&output_dir);
        if let Err(e) = seed_reference_files(&workspace, &repo) {
            warn!("failed to seed reference files: {e:?}");
        }

        let state = PipelineState::new(
            repo.name.clone(),
            output_dir.to_string_lossy(),
            args.dataset.clone(),
            prd,
            uml_class,
            uml_sequence,
            arch_design,
        );

        let mut controller = Controller::new(&llm, &workspace, &test_runner);
        match controller.run(state) {
            Ok(result) => {
                info!(
                    arch_steps = result.arch_steps,
                    skeleton_steps = result.skeleton_steps,
                    code_steps = result.code_steps,
                    code_feedback = %result.code_feedback,
                    "repository finished"
                );
            }
            Err(e) => {
                error!("repository aborted: {e}. Proceeding to next repository.");
            }
        }
    }

    info!("orchestration pipeline finished");
    Ok(())
}

/// Copy a repo's declared `required_files`/`usage_examples`/`check_tests`
/// into the output directory before the controller runs (§6 test-runner
/// contract point (a)).
fn seed_reference_files(
    workspace: &RealWorkspace,
    repo: &config::RepoEntry,
) -> std::result::Result<(), FsError> {
    for rel in repo
        .config
        .required_files
        .iter()
        .chain(repo.config.usage_examples.iter())
    {
        let source = repo.dir.join(rel);
        if let Ok(contents) = fs::read_to_string(&source) {
            workspace.write(&rel.to_string_lossy(), &contents)?;
        }
    }

    if let Some(check_tests) = &repo.config.check_tests {
        let source_dir = repo.dir.join(check_tests);
        copy_dir_into(&source_dir, check_tests, workspace)?;
    }

    Ok(())
}

/// Recursively copy every file under `source_dir` into `workspace`, keying
/// each write by `prefix`-joined relative path.
fn copy_dir_into(
    source_dir: &std::path::Path,
    prefix: &std::path::Path,
    workspace: &RealWorkspace,
) -> std::result::Result<(), FsError> {
    let Ok(entries) = fs::read_dir(source_dir) else {
        return Ok(());
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let rel = prefix.join(entry.file_name());
        if path.is_dir() {
            copy_dir_into(&path, &rel, workspace)?;
        } else if let Ok(contents) = fs::read_to_string(&path) {
            workspace.write(&rel.to_string_lossy(), &contents)?;
        }
    }
    Ok(())
}
