//! Handlers for `/gestiones` and `/me`.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/gestiones` | Filters `estado`, `ministerio`, `categoria`, `departamento`, `localidad`, `q`; paging `limit`, `offset`; rows carry `dias_transcurridos` |
//! | `POST`   | `/gestiones` | Body: [`NewGestion`]; returns 201 + `{"id_gestion"}` |
//! | `GET`    | `/gestiones/{id}` | Single case |
//! | `PATCH`  | `/gestiones/{id}` | Body: [`GestionPatch`] |
//! | `POST`   | `/gestiones/{id}/cambiar-estado` | Body: [`CambioEstado`] |
//! | `DELETE` | `/gestiones/{id}` | Soft delete |
//! | `GET`    | `/gestiones/{id}/eventos` | Newest first; optional `limit` |
//! | `GET`    | `/me` | The authenticated actor |

use axum::{
  Json,
  extract::{
    Path, Query, State,
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
  http::StatusCode,
  response::IntoResponse,
};
use gestiones_core::{
  evento::Evento,
  gestion::{CambioEstado, Gestion, GestionPatch, NewGestion},
  service::{GestionResumen, ListParams, Page},
  store::GestionStore,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{AppState, auth::Authenticated, error::ApiError};

type PathId = Result<Path<Uuid>, PathRejection>;

// ─── Reads ───────────────────────────────────────────────────────────────────

/// `GET /gestiones`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Authenticated(actor): Authenticated,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Page<GestionResumen>>, ApiError>
where
  S: GestionStore + 'static,
{
  let Query(params) = params?;
  Ok(Json(state.gestiones.list(&actor, params).await?))
}

/// `GET /gestiones/{id}`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Authenticated(actor): Authenticated,
  id: PathId,
) -> Result<Json<Gestion>, ApiError>
where
  S: GestionStore + 'static,
{
  let Path(id) = id?;
  Ok(Json(state.gestiones.get(&actor, id).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct EventosParams {
  pub limit: Option<usize>,
}

/// `GET /gestiones/{id}/eventos`
pub async fn eventos<S>(
  State(state): State<AppState<S>>,
  Authenticated(actor): Authenticated,
  id: PathId,
  params: Result<Query<EventosParams>, QueryRejection>,
) -> Result<Json<Vec<Evento>>, ApiError>
where
  S: GestionStore + 'static,
{
  let Path(id) = id?;
  let Query(params) = params?;
  Ok(Json(state.gestiones.list_eventos(&actor, id, params.limit).await?))
}

/// `GET /me`
pub async fn me<S>(Authenticated(actor): Authenticated) -> Json<Value>
where
  S: GestionStore + 'static,
{
  Json(json!({
    "usuario":   actor.usuario,
    "email":     actor.email,
    "rol":       actor.rol,
    "identidad": actor.identidad(),
  }))
}

// ─── Mutations ───────────────────────────────────────────────────────────────

/// `POST /gestiones`: returns 201 + the new case id.
pub async fn create<S>(
  State(state): State<AppState<S>>,
  Authenticated(actor): Authenticated,
  body: Result<Json<NewGestion>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: GestionStore + 'static,
{
  let Json(body) = body?;
  let id = state.gestiones.create(&actor, body).await?;
  Ok((StatusCode::CREATED, Json(json!({ "id_gestion": id }))))
}

/// `PATCH /gestiones/{id}`
pub async fn update<S>(
  State(state): State<AppState<S>>,
  Authenticated(actor): Authenticated,
  id: PathId,
  body: Result<Json<GestionPatch>, JsonRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: GestionStore + 'static,
{
  let Path(id) = id?;
  let Json(patch) = body?;
  state.gestiones.update(&actor, id, patch).await?;
  Ok(Json(json!({ "ok": true })))
}

/// `POST /gestiones/{id}/cambiar-estado`
pub async fn change_state<S>(
  State(state): State<AppState<S>>,
  Authenticated(actor): Authenticated,
  id: PathId,
  body: Result<Json<CambioEstado>, JsonRejection>,
) -> Result<Json<Value>, ApiError>
where
  S: GestionStore + 'static,
{
  let Path(id) = id?;
  let Json(cambio) = body?;
  let estado = state.gestiones.change_state(&actor, id, cambio).await?;
  Ok(Json(json!({ "ok": true, "id_gestion": id, "estado": estado })))
}

/// `DELETE /gestiones/{id}`
pub async fn delete_one<S>(
  State(state): State<AppState<S>>,
  Authenticated(actor): Authenticated,
  id: PathId,
) -> Result<Json<Value>, ApiError>
where
  S: GestionStore + 'static,
{
  let Path(id) = id?;
  state.gestiones.soft_delete(&actor, id).await?;
  Ok(Json(json!({ "ok": true })))
}
