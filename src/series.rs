//! Ordered application of several patches to one source tree.
//!
//! Each patch runs against the result of the one before it. Application stops
//! at the first patch that does not take effect; later patches are reported as
//! not attempted so the caller can see exactly where the series broke.

use crate::patch::PatchSpec;
use crate::writer::{self, ApplyError, ApplyResult};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use tracing::{error, info};

/// Per-patch result within a series.
#[derive(Debug)]
pub enum PatchOutcome {
    Applied(ApplyResult),
    /// The patch ran but did not change its target
    NotApplied(ApplyResult),
    Failed(ApplyError),
    /// An earlier patch in the series failed
    NotAttempted,
}

impl PatchOutcome {
    fn from_result(result: Result<ApplyResult, ApplyError>) -> Self {
        match result {
            Ok(result) if result.matched => PatchOutcome::Applied(result),
            Ok(result) => PatchOutcome::NotApplied(result),
            Err(err) => PatchOutcome::Failed(err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PatchOutcome::Applied(_))
    }
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOutcome::Applied(result) => write!(f, "applied ({} bytes)", result.bytes_written),
            PatchOutcome::NotApplied(result) => write!(
                f,
                "not applied: {}",
                result.error_detail.as_deref().unwrap_or("no change")
            ),
            PatchOutcome::Failed(err) => write!(f, "error: {}", err),
            PatchOutcome::NotAttempted => write!(f, "not attempted"),
        }
    }
}

/// Outcomes in series order, keyed by patch id.
#[derive(Debug, Default)]
pub struct SeriesReport {
    pub outcomes: Vec<(String, PatchOutcome)>,
}

impl SeriesReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_success())
    }

    /// The first patch that did not apply, if any.
    pub fn first_failure(&self) -> Option<(&str, &PatchOutcome)> {
        self.outcomes
            .iter()
            .find(|(_, outcome)| !outcome.is_success())
            .map(|(id, outcome)| (id.as_str(), outcome))
    }
}

/// A target file as it would look after a simulated series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedFile {
    pub path: PathBuf,
    pub original: String,
    pub patched: String,
}

#[derive(Debug, Default)]
pub struct SeriesCheck {
    pub report: SeriesReport,
    /// Files the series would change, in first-touched order
    pub files: Vec<SimulatedFile>,
}

/// Apply `specs` in order, stopping at the first patch that does not apply.
pub fn apply_series(specs: &[PatchSpec]) -> SeriesReport {
    let mut report = SeriesReport::default();
    let mut halted = false;

    for spec in specs {
        if halted {
            report
                .outcomes
                .push((spec.id().to_string(), PatchOutcome::NotAttempted));
            continue;
        }

        let outcome = PatchOutcome::from_result(writer::apply(spec));
        if !outcome.is_success() {
            error!(patch = %spec, outcome = %outcome, "patch series halted");
            halted = true;
        }
        report.outcomes.push((spec.id().to_string(), outcome));
    }

    if !halted {
        info!(patches = specs.len(), "patch series applied");
    }
    report
}

/// Evaluate `specs` in order without writing anything.
///
/// Results are threaded in memory, so a later patch sees the simulated output
/// of earlier patches to the same file. Unlike [`apply_series`] every patch is
/// evaluated, giving a full picture of which patches have drifted.
pub fn check_series(specs: &[PatchSpec]) -> SeriesCheck {
    simulate(specs, false)
}

/// Dry run of [`apply_series`]: simulated in memory, and halted at the first
/// patch that would not apply, with later patches reported as not attempted.
pub fn preview_series(specs: &[PatchSpec]) -> SeriesCheck {
    simulate(specs, true)
}

fn simulate(specs: &[PatchSpec], halt_on_failure: bool) -> SeriesCheck {
    let mut check = SeriesCheck::default();
    let mut current: HashMap<PathBuf, String> = HashMap::new();
    let mut halted = false;

    for spec in specs {
        if halted {
            check
                .report
                .outcomes
                .push((spec.id().to_string(), PatchOutcome::NotAttempted));
            continue;
        }

        let outcome = simulate_one(spec, &mut current, &mut check.files);
        halted = halt_on_failure && !outcome.is_success();
        check.report.outcomes.push((spec.id().to_string(), outcome));
    }

    check
}

fn simulate_one(
    spec: &PatchSpec,
    current: &mut HashMap<PathBuf, String>,
    files: &mut Vec<SimulatedFile>,
) -> PatchOutcome {
    let path = spec.target_path().to_path_buf();

    let text = match current.get(&path) {
        Some(text) => text.clone(),
        None => match fs::read_to_string(&path) {
            Ok(text) => {
                current.insert(path.clone(), text.clone());
                text
            }
            Err(source) => return PatchOutcome::Failed(ApplyError::Read { path, source }),
        },
    };

    let preview = writer::preview_text(spec, text);
    if let Some(patched) = preview.patched {
        match files.iter_mut().find(|file| file.path == path) {
            Some(file) => file.patched = patched.clone(),
            None => files.push(SimulatedFile {
                path: path.clone(),
                original: preview.original,
                patched: patched.clone(),
            }),
        }
        current.insert(path, patched);
    }

    PatchOutcome::from_result(Ok(preview.result))
}
