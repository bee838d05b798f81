//! Handlers for `/catalogos`, the choice lists a client form is built from.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/catalogos/estados` | `[{"nombre"}]` |
//! | `GET`  | `/catalogos/urgencias` | `[{"nombre"}]` |
//! | `GET`  | `/catalogos/departamentos` | Names with an active geo entry |
//! | `GET`  | `/catalogos/localidades` | Required `departamento` |
//! | `GET`  | `/catalogos/geo` | Required `departamento`, `localidad`; the resolved location |

use axum::{
  Json,
  extract::{Query, State, rejection::QueryRejection},
};
use gestiones_core::{gestion::Ubicacion, service::Nombre, store::GestionStore};
use serde::Deserialize;

use crate::{AppState, auth::Authenticated, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct LocalidadesParams {
  pub departamento: String,
}

#[derive(Debug, Deserialize)]
pub struct GeoParams {
  pub departamento: String,
  pub localidad:    String,
}

/// `GET /catalogos/estados`
pub async fn estados<S>(
  State(state): State<AppState<S>>,
  Authenticated(actor): Authenticated,
) -> Result<Json<Vec<Nombre>>, ApiError>
where
  S: GestionStore + 'static,
{
  Ok(Json(state.gestiones.estados(&actor)?))
}

/// `GET /catalogos/urgencias`
pub async fn urgencias<S>(
  State(state): State<AppState<S>>,
  Authenticated(actor): Authenticated,
) -> Result<Json<Vec<Nombre>>, ApiError>
where
  S: GestionStore + 'static,
{
  Ok(Json(state.gestiones.urgencias(&actor)?))
}

/// `GET /catalogos/departamentos`
pub async fn departamentos<S>(
  State(state): State<AppState<S>>,
  Authenticated(actor): Authenticated,
) -> Result<Json<Vec<String>>, ApiError>
where
  S: GestionStore + 'static,
{
  Ok(Json(state.gestiones.departamentos(&actor).await?))
}

/// `GET /catalogos/localidades?departamento=`
pub async fn localidades<S>(
  State(state): State<AppState<S>>,
  Authenticated(actor): Authenticated,
  params: Result<Query<LocalidadesParams>, QueryRejection>,
) -> Result<Json<Vec<String>>, ApiError>
where
  S: GestionStore + 'static,
{
  let Query(params) = params?;
  Ok(Json(state.gestiones.localidades(&actor, &params.departamento).await?))
}

/// `GET /catalogos/geo?departamento=&localidad=`: 400 unless exactly one
/// active entry matches.
pub async fn geo<S>(
  State(state): State<AppState<S>>,
  Authenticated(actor): Authenticated,
  params: Result<Query<GeoParams>, QueryRejection>,
) -> Result<Json<Ubicacion>, ApiError>
where
  S: GestionStore + 'static,
{
  let Query(params) = params?;
  let ubicacion = state
    .gestiones
    .geo(&actor, &params.departamento, &params.localidad)
    .await?;
  Ok(Json(ubicacion))
}
