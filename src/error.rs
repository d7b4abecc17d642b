use thiserror::Error;

/// Failures surfaced to callers of the query facade.
///
/// Data-quality problems (degenerate polygons, failed differences) are
/// recovered inside the resolver and never appear here.
#[derive(Error, Debug)]
pub enum TerritoryError {
    #[error("Data source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Malformed payload from data source: {0}")]
    MalformedPayload(String),

    #[error("Invalid period key: {0}")]
    InvalidPeriod(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
