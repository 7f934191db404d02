use chrono::NaiveDate;
use thiserror::Error;

/// Domain failures raised by the extraction / probability core.
///
/// Recoverable conditions (insufficient history, unmatched players,
/// duplicate rows) are not errors; they surface as `None`, report counters
/// or `bool` insert results instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A history row dated on or after the prediction date reached the
    /// extractor. Always fatal: the batch must abort.
    #[error(
        "temporal safety violation for {player}: game dated {offending} used for prediction as of {as_of}"
    )]
    TemporalViolation {
        player: String,
        as_of: NaiveDate,
        offending: NaiveDate,
    },

    #[error("unknown stat type '{0}'")]
    UnknownStatType(String),

    #[error("invalid context factor '{name}': {value}")]
    InvalidContext { name: &'static str, value: f64 },

    #[error("distribution rejected parameters: {0}")]
    Distribution(String),
}
