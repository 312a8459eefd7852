/*!
 * Checkpoint saver
 *
 * Optimizer-loop callback that rewrites the current result to one file
 * after every iteration, so a long run can be inspected or resumed after a
 * crash.
 */

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::result::OptimizeResult;
use crate::storage::encoder::ResultEncoder;
use crate::storage::error::EncodeResult;
use crate::storage::options::PersistenceOptions;

#[derive(Debug, Clone)]
pub struct CheckpointSaver {
    path: PathBuf,
    encoder: ResultEncoder,
    saves: u64,
}

impl CheckpointSaver {
    pub fn new(path: impl Into<PathBuf>, options: PersistenceOptions) -> EncodeResult<Self> {
        Ok(Self {
            path: path.into(),
            encoder: ResultEncoder::new(options)?,
            saves: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of checkpoints written so far
    pub fn saves(&self) -> u64 {
        self.saves
    }

    /// Called by the optimizer after each evaluation.
    pub fn on_step(&mut self, result: &OptimizeResult) -> EncodeResult<()> {
        self.encoder.encode_to_path(result, &self.path)?;
        self.saves += 1;

        debug!(
            "checkpoint #{} written to {} ({} evaluations)",
            self.saves,
            self.path.display(),
            result.n_evaluations()
        );
        Ok(())
    }
}
