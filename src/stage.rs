//! Defines the Stage trait, implemented by each Impulcifer processing step.
//! This enforces a common interface between steps, so that each step can
//! consume the data of the preceding one, process it, and hand new data to
//! the next step of the pipeline.

use crate::error::Result;

use log::{info, warn};
use std::fmt;

///
/// A step of the Impulcifer pipeline, which splits, deconvolves, aligns,
/// truncates, normalizes or equalizes a set of tracks. A stage owns its
/// parameters, takes its input by value and returns a new output; it never
/// mutates shared state.
///
pub trait Stage: fmt::Display {
    /// What the stage consumes
    type InData;
    /// What the stage produces
    type OutData;

    /// Converts an input of type InData into an output of type OutData
    fn convert(&self, input: Self::InData) -> Result<Self::OutData>;
}

/// Runs a stage on an input, logging when it finishes or fails.
pub fn run_stage<S: Stage>(stage: &S, input: S::InData) -> Result<S::OutData> {
    info!("{} : started.", stage);
    match stage.convert(input) {
        Ok(out_data) => {
            info!("{} : finished.", stage);
            Ok(out_data)
        }
        Err(error) => {
            warn!("{} : failed : {}.", stage, error);
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImpulciferError;

    /// Adds one, and refuses negative numbers
    struct MockStage {}

    impl Stage for MockStage {
        type InData = i32;
        type OutData = i32;

        fn convert(&self, input: i32) -> Result<i32> {
            if input < 0 {
                return Err(ImpulciferError::Configuration("negative".to_string()));
            }
            Ok(input + 1)
        }
    }

    impl fmt::Display for MockStage {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "MockStage")
        }
    }

    #[test]
    fn test_mock_stage() {
        let mock_stage = MockStage {};
        assert_eq!(run_stage(&mock_stage, 0).unwrap(), 1);
    }

    #[test]
    fn test_chained_stage() {
        let mock_stage_a = MockStage {};
        let mock_stage_b = MockStage {};
        let out = run_stage(&mock_stage_a, 0).and_then(|x| run_stage(&mock_stage_b, x));
        assert_eq!(out.unwrap(), 2);
    }

    #[test]
    fn test_failing_stage() {
        let mock_stage = MockStage {};
        assert!(matches!(
            run_stage(&mock_stage, -1),
            Err(ImpulciferError::Configuration(_))
        ));
    }
}
