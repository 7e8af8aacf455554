//! The network solver boundary.
//!
//! The restoration engine treats the numerical solver as a black box behind
//! [`NetworkSolver`]: topology and injections in, bus voltages and branch
//! currents out, with the possibility of non-convergence. One bundled
//! implementation lives in [`sweep`]; tests substitute scripted doubles.

use ndarray::Array2;
use serde::Serialize;

use crate::topology::Topology;
use crate::types::*;

pub mod sweep;

/// A converged solution: voltage magnitudes per bus and phase (volts) and
/// current magnitudes per branch and phase (amperes). De-energized buses and
/// branches read zero.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverOutput {
    /// Iterations the solver actually used.
    pub iterations: usize,
    /// Bus voltage magnitudes, bus x phase, in volts.
    pub bus_voltages: Array2<f64>,
    /// Branch current magnitudes, branch x phase, in amperes.
    pub branch_currents: Array2<f64>,
}

impl SolverOutput {
    /// Voltage of a bus phase in per-unit of that bus's nominal voltage.
    pub fn per_unit(&self, top: &Topology, bus: BusIndex, phase: usize) -> f64 {
        self.bus_voltages[(bus, phase)] / top.buses[bus].nominal_voltage
    }
}

/// Reasons a solve can fail to produce a usable solution.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "content")]
pub enum SolverError {
    /// The iteration ceiling was reached without meeting tolerance.
    DidNotConverge { iterations: usize },
    /// The energized topology contains a loop the method cannot solve.
    NonRadial,
    /// The system matrix was singular or otherwise numerically unusable.
    Singular(String),
}

impl std::error::Error for SolverError {}

impl std::fmt::Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SolverError::DidNotConverge { iterations } => {
                write!(f, "No convergence after {} iterations", iterations)
            }
            SolverError::NonRadial => write!(f, "Energized topology is not radial"),
            SolverError::Singular(reason) => write!(f, "Singular system: {}", reason),
        }
    }
}

/// The narrow interface to the external network solver. Synchronous; may be
/// called repeatedly per restoration attempt. `iteration_limit` caps the
/// solver's internal iterations; zero defers to the implementation default.
pub trait NetworkSolver {
    fn solve(
        &mut self,
        top: &Topology,
        iteration_limit: usize,
    ) -> Result<SolverOutput, SolverError>;
}
