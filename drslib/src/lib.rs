//! # Distribution Restoration Simulator Library
//!
//! Time-stepped simulation of an electrical distribution network with
//! automatic service restoration. After every topology change the library
//! determines which buses are still energized from the source and, when some
//! are not, searches the space of switch operations for a configuration that
//! restores service within voltage and thermal limits.

use serde::{Deserialize, Serialize};

pub mod feeders;
pub mod io;
pub mod restoration;
pub mod sim;
pub mod solver;
pub mod support;
pub mod topology;
pub mod types;
pub mod utils;

#[global_allocator]
static ALLOCATOR: cap::Cap<std::alloc::System> = cap::Cap::new(std::alloc::System, usize::MAX);

/// Returns the number of bytes currently allocated by the process.
pub fn allocated_memory() -> usize {
    ALLOCATOR.allocated()
}

/// Represents the unrecoverable ways a restoration run can end.
///
/// Per-trial rejections (a candidate plan failing validation) are handled
/// internally by the engine and never surface here; these variants stop the
/// simulation for the current run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "content")]
pub enum RestoreFailure {
    /// Invalid model or configuration, detected at initialization.
    BadInput(String),
    /// No tie switch reaches the de-energized region; restoration is
    /// impossible without repair. Detected before any attempt is spent.
    Unrestorable,
    /// The per-timestep attempt budget was spent, or the candidate queue ran
    /// dry, without an acceptable plan.
    Exhausted { attempts: usize },
    /// Candidate plan storage outgrew its worst-case bound. The bound is a
    /// model-size invariant; exceeding it indicates a defect, so it is a hard
    /// error rather than a silent truncation.
    CandidateOverflow { needed: usize, bound: usize },
}

impl std::error::Error for RestoreFailure {}

impl std::fmt::Display for RestoreFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RestoreFailure::BadInput(reason) => write!(f, "Bad input: {}", reason),
            RestoreFailure::Unrestorable => {
                write!(f, "No tie switch reaches the de-energized region")
            }
            RestoreFailure::Exhausted { attempts } => {
                write!(f, "Attempt budget exhausted after {} trials", attempts)
            }
            RestoreFailure::CandidateOverflow { needed, bound } => {
                write!(
                    f,
                    "Candidate storage overflow: needed {} of {}",
                    needed, bound
                )
            }
        }
    }
}
