//! Error types for `gestiones-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::actor::{Operacion, Rol};

#[derive(Debug, Error)]
pub enum Error {
  /// Bad or missing input, unresolvable location, missing mandatory comment.
  #[error("{0}")]
  Validation(String),

  /// The case does not exist or has been soft-deleted.
  #[error("gestión no encontrada: {0}")]
  NotFound(Uuid),

  #[error("el rol {rol} no puede realizar {operacion}")]
  Forbidden { rol: Rol, operacion: Operacion },

  /// The case changed between the read and the conditional write.
  #[error("la gestión {0} fue modificada concurrentemente")]
  Conflict(Uuid),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self { Self::Validation(msg.into()) }

  /// Wrap a backend error.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  /// Stable machine-readable category, surfaced to API clients.
  pub fn category(&self) -> &'static str {
    match self {
      Self::Validation(_) => "validation_error",
      Self::NotFound(_) => "not_found",
      Self::Forbidden { .. } => "forbidden",
      Self::Conflict(_) => "conflict",
      Self::Store(_) | Self::Serialization(_) => "store_error",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
