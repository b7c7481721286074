use std::fs;
use std::path::Path;
use std::process::ExitCode;

use tracing::{error, info};
use typing_engine::run_scene;

use super::bootstrap::{AppError, AppWiring};
use crate::arena::{ArenaOutcome, ArenaSummary};

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        loop_config,
        mut scene,
        summary_path,
    } = app;

    let loop_summary = run_scene(&loop_config, &mut scene);
    let summary = scene.summary(&loop_summary);
    info!(
        outcome = ?summary.outcome,
        ticks = summary.ticks,
        targets_resolved = summary.targets_resolved,
        targets_total = summary.targets_total,
        sessions_lost = summary.sessions_lost,
        average_wpm = summary.average_wpm,
        seeds = summary.seeds,
        slowest_update_us = loop_summary.metrics.slowest_update_us,
        "arena_summary"
    );

    if let Some(path) = summary_path {
        if let Err(err) = write_summary(&path, &summary) {
            error!(error = %err, "summary_write_failed");
            return ExitCode::FAILURE;
        }
        info!(path = %path.display(), "summary_written");
    }

    match summary.outcome {
        ArenaOutcome::Cleared => ExitCode::SUCCESS,
        ArenaOutcome::Exhausted | ArenaOutcome::TickLimit => ExitCode::FAILURE,
    }
}

fn write_summary(path: &Path, summary: &ArenaSummary) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(summary)?;
    fs::write(path, json).map_err(|source| AppError::WriteSummary {
        path: path.to_path_buf(),
        source,
    })
}
