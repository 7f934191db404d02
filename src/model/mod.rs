//! Probability side of the engine: stat taxonomy, distribution math,
//! contextual adjustments, calibration, and the per-prop / per-day drivers.

pub mod adjustments;
pub mod batch;
pub mod calibration;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod predictor;
pub mod stat_types;

pub use batch::BatchRunner;
pub use calibration::CalibrationMode;
pub use config::ModelConfig;
