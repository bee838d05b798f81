//! The `GestionStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `gestiones-store-sqlite`). The [`crate::service::Gestiones`] service
//! depends on this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  evento::Evento,
  geo::GeoLocalidad,
  gestion::{EstadoWrite, Gestion, GestionChanges, Tombstone},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// Filters shared by [`GestionStore::list_gestiones`] and
/// [`GestionStore::count_gestiones`]. Values arrive already normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GestionFilter {
  /// Canonical state, see [`crate::gestion::estado::normalize`].
  pub estado:       Option<String>,
  pub ministerio:   Option<String>,
  pub categoria:    Option<String>,
  /// Geo lookup form, see [`crate::geo::normalize`].
  pub departamento: Option<String>,
  pub localidad:    Option<String>,
  /// Free-text token; matching is backend-defined.
  pub q:            Option<String>,
}

/// A page request over [`GestionFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GestionQuery {
  pub filter: GestionFilter,
  pub limit:  usize,
  pub offset: usize,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the backing store for cases and their audit events.
///
/// Every mutation takes the audit event describing it. Implementations must
/// persist the case write and the event atomically, case row first, and must
/// write nothing when the target row is missing or soft-deleted.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait GestionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Geo reference ─────────────────────────────────────────────────────

  /// Active reference entries whose normalized department and locality
  /// equal the given (already normalized) values.
  fn find_geo<'a>(
    &'a self,
    departamento: &'a str,
    localidad: &'a str,
  ) -> impl Future<Output = Result<Vec<GeoLocalidad>, Self::Error>> + Send + 'a;

  /// Department names that have at least one active entry, one per
  /// normalized name, sorted.
  fn list_departamentos(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// Locality names of the active entries in one (already normalized)
  /// department, one per normalized name, sorted.
  fn list_localidades<'a>(
    &'a self,
    departamento: &'a str,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + 'a;

  // ── Case writes ────────────────────────────────────────────────────

  /// Insert a new case together with its `CREACION` event.
  fn insert_gestion(
    &self,
    gestion: Gestion,
    evento: Evento,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Apply a merge-patch. Returns `false` (and records nothing) when the case
  /// is missing or deleted.
  fn update_gestion(
    &self,
    id: Uuid,
    changes: GestionChanges,
    evento: Evento,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Conditionally write a new state. Returns `false` (and records nothing)
  /// when the case is missing, deleted, or no longer in
  /// `write.estado_anterior`.
  fn update_estado(
    &self,
    id: Uuid,
    write: EstadoWrite,
    evento: Evento,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Set the tombstone flag. Returns `false` (and records nothing) when the
  /// case is missing or already deleted.
  fn soft_delete(
    &self,
    id: Uuid,
    tombstone: Tombstone,
    evento: Evento,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Case reads ──────────────────────────────────────────────────────

  /// Retrieve a non-deleted case. Returns `None` if missing or deleted.
  fn get_gestion(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Gestion>, Self::Error>> + Send + '_;

  /// One page of non-deleted cases matching `query.filter`, newest intake
  /// first.
  fn list_gestiones<'a>(
    &'a self,
    query: &'a GestionQuery,
  ) -> impl Future<Output = Result<Vec<Gestion>, Self::Error>> + Send + 'a;

  /// Number of non-deleted cases matching `filter`, evaluated with the same
  /// predicate as [`GestionStore::list_gestiones`].
  fn count_gestiones<'a>(
    &'a self,
    filter: &'a GestionFilter,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + 'a;

  // ── Events ────────────────────────────────────────────────────────────

  /// Events for one case, newest first, at most `limit`. Deleted cases keep
  /// their history.
  fn list_eventos(
    &self,
    id_gestion: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Evento>, Self::Error>> + Send + '_;
}
