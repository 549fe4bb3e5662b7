use std::{fs::File, io, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    polynomial::{EvalPointScheme, EvalPoints, EvalPointsError},
    MpcField,
};

/// Error while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{n} parties cannot tolerate {t} faults, n >= 3t+1 required")]
    TooManyFaults { n: usize, t: usize },
    #[error(transparent)]
    EvalPoints(#[from] EvalPointsError),
    #[error("cannot read configuration: {0}")]
    Io(#[from] io::Error),
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parameters of a multi-party computation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MpcConfig {
    pub num_parties: usize,
    pub threshold: usize,
    #[serde(default)]
    pub eval_points: EvalPointScheme,
}

impl MpcConfig {
    /// Create configuration with sequential evaluation points.
    pub fn new(num_parties: usize, threshold: usize) -> Self {
        Self {
            num_parties,
            threshold,
            eval_points: EvalPointScheme::default(),
        }
    }

    /// Largest threshold usable with given number of parties.
    pub fn max_threshold(num_parties: usize) -> usize {
        num_parties.saturating_sub(1) / 3
    }

    pub fn with_eval_points(mut self, eval_points: EvalPointScheme) -> Self {
        self.eval_points = eval_points;
        self
    }

    /// Load configuration from JSON file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that n >= 3t+1.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_parties < 3 * self.threshold + 1 {
            return Err(ConfigError::TooManyFaults {
                n: self.num_parties,
                t: self.threshold,
            });
        }
        Ok(())
    }

    /// Evaluation points of all parties in given field.
    pub fn points<F: MpcField>(&self) -> Result<EvalPoints<F>, ConfigError> {
        Ok(EvalPoints::new(self.eval_points, self.num_parties)?)
    }
}
