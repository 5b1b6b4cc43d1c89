//! Corpus conversion: every annotation file under a directory, in parallel.
//!
//! Files are discovered sequentially, then handed out to scoped worker
//! threads. Each worker owns the transcription it converts; the only shared
//! state is the `&Dispatcher` and an atomic work index.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use serde::Serialize;
use walkdir::WalkDir;

use crate::adapter::Dispatcher;
use crate::error::PantierError;

/// Options for a batch conversion.
#[derive(Clone, Debug)]
pub struct BatchOptions {
    /// Worker threads; 0 picks the available parallelism.
    pub jobs: usize,
    /// Extension of the output files, e.g. `eaf`.
    pub target_extension: String,
    /// Also convert files whose extension no adapter claims.
    pub heuristic: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            jobs: 0,
            target_extension: "xra".into(),
            heuristic: false,
        }
    }
}

/// Outcome of a batch conversion.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchReport {
    /// `(input, output)` pairs, in discovery order.
    pub converted: Vec<(PathBuf, PathBuf)>,
    /// Inputs that failed, with the error message.
    pub failed: Vec<BatchFailure>,
    /// Files skipped because no adapter claims their extension.
    pub skipped: usize,
}

impl BatchReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Converts every supported file under `input` into `output`, keeping the
/// relative layout and swapping the extension.
///
/// Per-file failures are collected in the report; only a bad target
/// extension or an unreadable root fails the whole batch.
pub fn convert_tree(
    dispatcher: &Dispatcher,
    input: &Path,
    output: &Path,
    opts: &BatchOptions,
) -> Result<BatchReport, PantierError> {
    let target = opts.target_extension.trim_start_matches('.').to_ascii_lowercase();
    if dispatcher.registry().by_extension(&target).is_none() {
        return Err(PantierError::UnsupportedFormat(format!(
            "'{}' (supported: {})",
            target,
            dispatcher.registry().extensions().join(", ")
        )));
    }
    if !input.is_dir() {
        return Err(PantierError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", input.display()),
        )));
    }

    let mut report = BatchReport::default();
    let tasks = discover(dispatcher, input, output, &target, opts.heuristic, &mut report);
    tracing::debug!(files = tasks.len(), skipped = report.skipped, "batch discovered");

    let jobs = match opts.jobs {
        0 => thread::available_parallelism().map_or(1, |n| n.get()),
        n => n,
    }
    .min(tasks.len().max(1));

    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<(usize, Result<(), String>)>> = Mutex::new(Vec::new());
    thread::scope(|scope| {
        for _ in 0..jobs {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some((src, dst)) = tasks.get(index) else {
                    break;
                };
                let outcome = convert_one(dispatcher, src, dst, opts.heuristic)
                    .map_err(|e| e.to_string());
                if let Err(message) = &outcome {
                    tracing::warn!(path = %src.display(), "batch conversion failed: {message}");
                }
                if let Ok(mut results) = results.lock() {
                    results.push((index, outcome));
                }
            });
        }
    });

    let mut results = results.into_inner().unwrap_or_else(|p| p.into_inner());
    results.sort_by_key(|(index, _)| *index);
    for (index, outcome) in results {
        let (src, dst) = &tasks[index];
        match outcome {
            Ok(()) => report.converted.push((src.clone(), dst.clone())),
            Err(message) => report.failed.push(BatchFailure {
                path: src.clone(),
                message,
            }),
        }
    }
    Ok(report)
}

/// Walks `input` and pairs every convertible file with its output path.
/// Inputs whose output path is already taken are recorded as failures.
fn discover(
    dispatcher: &Dispatcher,
    input: &Path,
    output: &Path,
    target: &str,
    heuristic: bool,
    report: &mut BatchReport,
) -> Vec<(PathBuf, PathBuf)> {
    let mut tasks = Vec::new();
    let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();

    let walker = WalkDir::new(input)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let src = entry.path();
        if dispatcher.adapter_for(src).is_none() && !heuristic {
            report.skipped += 1;
            continue;
        }

        let relative = src.strip_prefix(input).unwrap_or(src);
        let dst = output.join(relative).with_extension(target);
        if let Some(first) = claimed.get(&dst) {
            report.failed.push(BatchFailure {
                path: src.to_path_buf(),
                message: format!(
                    "output {} is already produced from {}",
                    dst.display(),
                    first.display()
                ),
            });
            continue;
        }
        claimed.insert(dst.clone(), src.to_path_buf());
        tasks.push((src.to_path_buf(), dst));
    }
    tasks
}

fn convert_one(
    dispatcher: &Dispatcher,
    src: &Path,
    dst: &Path,
    heuristic: bool,
) -> Result<(), PantierError> {
    let mut trs = dispatcher.read(src, heuristic)?;
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    dispatcher.write(&mut trs, dst)
}
