//! # Overshadowing Experiment Layer
//!
//! Builds and drives complete overshadowing simulations on top of
//! `overshadow-core`: one [`params::OvershadowParams`] describes a run,
//! [`run::run`] executes it (or [`run::start`] for a stoppable
//! background run), and [`sweep::SweepController`] iterates whole
//! parameter grids — resumable, failure-isolated, optionally across a
//! worker pool.
//!
//! ## Example
//!
//! ```rust,no_run
//! use overshadow_sim::params::OvershadowParams;
//! use overshadow_sim::sweep::{ParameterAxis, SweepController, SweepPolicy};
//!
//! let base = OvershadowParams {
//!     num_packets: 16,
//!     ..Default::default()
//! };
//! let sweep = SweepController::new(
//!     vec![
//!         ParameterAxis::new("noise_voltage", vec![0.0, 0.0001, 0.1, 0.5, 1.0]),
//!         ParameterAxis::new("attacker_gain_db", (0..=20).map(f64::from).collect()),
//!     ],
//!     SweepPolicy::Cartesian,
//!     base,
//!     "results/",
//! );
//! for record in sweep.run() {
//!     println!("{}: {:?}", record.index, record.status);
//! }
//! ```

pub mod params;
pub mod run;
pub mod sweep;

pub use params::{AgcMode, OvershadowParams};
pub use run::{run, start, RunStatus, RunningSimulation, SimulationRun};
pub use sweep::{ParameterAxis, RunRecord, SweepController, SweepPolicy};
