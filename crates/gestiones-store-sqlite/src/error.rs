//! Error type for `gestiones-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("decimal parse error: {0}")]
  Decimal(#[from] rust_decimal::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enumerated column holds a value this build does not know.
  #[error("unknown {column} value: {value:?}")]
  UnknownValue { column: &'static str, value: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
