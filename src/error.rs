use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("failed to open database")]
    Connection,
    #[display("database migration failed")]
    Migration,
    #[display("failed to insert data")]
    Insert,
    #[display("failed to query data")]
    Query,
    #[display("failed to delete data")]
    Delete,
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum IngestError {
    #[display("invalid payload: {reason}")]
    InvalidPayload { reason: String },
    #[display("storage unavailable during ingestion")]
    Storage,
}

#[derive(Debug, Display, Error)]
pub enum QueryError {
    #[display("missing query parameter: {name}")]
    MissingParameter { name: String },
    #[display("query parameter out of range: {name}")]
    InvalidParameter { name: String },
    #[display("storage unavailable during query")]
    Storage,
}
