use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use storybench_common::{ExperimentParams, RunResults};

use crate::game::{GameAborted, GameOutcome};
use crate::metrics::summarize;

/// Assemble the results document for a finished game.
pub fn build_results(outcome: GameOutcome, params: ExperimentParams) -> RunResults {
    RunResults {
        total_turns: outcome.records.len() as u32,
        total_time: outcome.elapsed.as_secs_f64(),
        full_story: outcome.full_story,
        final_context_length: outcome.context.chars().count(),
        metrics: summarize(outcome.records, params.warmup_turns),
        experiment_params: params,
        error: None,
    }
}

/// Results document for a game that stopped early: the turns played so far
/// plus the error that ended it.
pub fn build_aborted_results(aborted: GameAborted, params: ExperimentParams) -> RunResults {
    let mut results = build_results(aborted.partial, params);
    results.error = Some(format!("turn {}: {}", aborted.turn, aborted.error));
    results
}

/// Write `results` to `path` as pretty-printed JSON, replacing any existing file.
pub fn write_results(path: &Path, results: &RunResults) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, results)?;
    writer.write_all(b"\n")?;
    writer.flush()
}
