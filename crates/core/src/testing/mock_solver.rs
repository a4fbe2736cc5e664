//! Mock challenge solver for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::upscale::{ChallengeSolver, SolvedChallenge, UpscaleError};

/// Mock implementation of the [`ChallengeSolver`] trait.
#[derive(Debug)]
pub struct MockChallengeSolver {
    /// `None` makes every solve fail.
    solution: Option<String>,
    solves: Arc<RwLock<u32>>,
}

impl Default for MockChallengeSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChallengeSolver {
    pub fn new() -> Self {
        Self::with_solution("mock-solution")
    }

    /// Solver answering with `solution`.
    pub fn with_solution(solution: impl Into<String>) -> Self {
        Self {
            solution: Some(solution.into()),
            solves: Arc::new(RwLock::new(0)),
        }
    }

    /// Solver that never produces a solution.
    pub fn failing() -> Self {
        Self {
            solution: None,
            solves: Arc::new(RwLock::new(0)),
        }
    }

    pub async fn solve_count(&self) -> u32 {
        *self.solves.read().await
    }
}

#[async_trait]
impl ChallengeSolver for MockChallengeSolver {
    fn name(&self) -> &str {
        "mock"
    }

    async fn solve(&self) -> Result<SolvedChallenge, UpscaleError> {
        *self.solves.write().await += 1;
        match &self.solution {
            Some(solution) => Ok(SolvedChallenge(solution.clone())),
            None => Err(UpscaleError::ChallengeSolve(
                "solver response contained no result".to_string(),
            )),
        }
    }
}
