//! JSON REST API for the gestiones case service.
//!
//! Exposes an axum [`Router`] backed by any [`GestionStore`]. Every route
//! requires HTTP Basic credentials; the authenticated user's role drives the
//! authorization checks in [`gestiones_core::service::Gestiones`].

pub mod auth;
pub mod catalogos;
pub mod error;
pub mod gestiones;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use gestiones_core::{service::Gestiones, store::GestionStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, UserConfig};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `GESTIONES_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:          String,
  #[serde(default = "default_port")]
  pub port:          u16,
  pub store_path:    PathBuf,
  /// JSON array of geo-reference entries imported at startup.
  #[serde(default)]
  pub geo_seed_path: Option<PathBuf>,
  #[serde(default)]
  pub users:         Vec<UserConfig>,
}

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub gestiones: Gestiones<S>,
  pub auth:      Arc<AuthConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      gestiones: self.gestiones.clone(),
      auth:      Arc::clone(&self.auth),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: GestionStore + 'static,
{
  Router::new()
    .route("/me", get(gestiones::me::<S>))
    .route("/gestiones", get(gestiones::list::<S>).post(gestiones::create::<S>))
    .route(
      "/gestiones/{id}",
      get(gestiones::get_one::<S>)
        .patch(gestiones::update::<S>)
        .delete(gestiones::delete_one::<S>),
    )
    .route("/gestiones/{id}/cambiar-estado", post(gestiones::change_state::<S>))
    .route("/gestiones/{id}/eventos", get(gestiones::eventos::<S>))
    .route("/catalogos/estados", get(catalogos::estados::<S>))
    .route("/catalogos/urgencias", get(catalogos::urgencias::<S>))
    .route("/catalogos/departamentos", get(catalogos::departamentos::<S>))
    .route("/catalogos/localidades", get(catalogos::localidades::<S>))
    .route("/catalogos/geo", get(catalogos::geo::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests {
  use super::*;

  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use gestiones_core::{
    actor::Rol,
    evento::Evento,
    geo::GeoLocalidad,
    gestion::{EstadoWrite, Gestion, GestionChanges, Tombstone},
    store::{GestionFilter, GestionQuery},
  };
  use gestiones_store_sqlite::SqliteStore;
  use rand_core::OsRng;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  const PASSWORD: &str = "secret";

  async fn seeded_store() -> SqliteStore {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store
      .import_geo(vec![GeoLocalidad {
        id_geo:       "G1".to_string(),
        departamento: "Capital".to_string(),
        localidad:    "Centro".to_string(),
        lat:          "-31.4".parse().unwrap(),
        lon:          "-64.2".parse().unwrap(),
        activo:       true,
      }])
      .await
      .unwrap();
    store
  }

  async fn make_state() -> AppState<SqliteStore> { state_over(seeded_store().await) }

  fn state_over<S: GestionStore>(store: S) -> AppState<S> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(PASSWORD.as_bytes(), &salt)
      .unwrap()
      .to_string();
    let user = |username: &str, rol: Rol| UserConfig {
      username:      username.to_string(),
      email:         None,
      rol,
      password_hash: hash.clone(),
    };

    AppState {
      gestiones: Gestiones::new(Arc::new(store)),
      auth:      Arc::new(AuthConfig::new(vec![
        user("admin", Rol::Admin),
        user("op", Rol::Operador),
        user("lector", Rol::Consulta),
      ])),
    }
  }

  fn auth_header(user: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{PASSWORD}")))
  }

  async fn send<S: GestionStore + 'static>(
    state:  &AppState<S>,
    method: &str,
    uri:    &str,
    user:   Option<&str>,
    body:   Option<Value>,
  ) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
      builder = builder.header(header::AUTHORIZATION, auth_header(user));
    }
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    router(state.clone()).oneshot(builder.body(body).unwrap()).await.unwrap()
  }

  async fn json_body(resp: Response) -> Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  fn nueva() -> Value {
    json!({
      "departamento": "Capital",
      "localidad": "Centro",
      "ministerio_agencia_id": "MIN_SALUD",
      "categoria_general_id": "INFRA",
      "detalle": "Bache en calle",
    })
  }

  async fn create<S: GestionStore + 'static>(state: &AppState<S>) -> String {
    let resp = send(state, "POST", "/gestiones", Some("op"), Some(nueva())).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    json_body(resp).await["id_gestion"].as_str().unwrap().to_string()
  }

  // ── Auth ──────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn missing_credentials_returns_401() {
    let state = make_state().await;
    let resp = send(&state, "GET", "/gestiones", None, None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
    assert_eq!(json_body(resp).await["error"], "unauthorized");
  }

  #[tokio::test]
  async fn me_returns_actor() {
    let state = make_state().await;
    let resp = send(&state, "GET", "/me", Some("lector"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["usuario"], "lector");
    assert_eq!(body["rol"], "Consulta");
  }

  // ── Cases ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn create_then_get() {
    let state = make_state().await;
    let id = create(&state).await;

    let resp = send(&state, "GET", &format!("/gestiones/{id}"), Some("lector"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["estado"], "INGRESADO");
    assert_eq!(body["geo_id"], "G1");
    assert_eq!(body["lat"], "-31.4");
    assert_eq!(body["created_by"], "op");
  }

  #[tokio::test]
  async fn consulta_cannot_create() {
    let state = make_state().await;
    let resp = send(&state, "POST", "/gestiones", Some("lector"), Some(nueva())).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(resp).await["error"], "forbidden");
  }

  #[tokio::test]
  async fn cost_round_trips_as_exact_text() {
    let state = make_state().await;

    let mut body = nueva();
    body["costo_estimado"] = json!("12345678901234567.89");
    let resp = send(&state, "POST", "/gestiones", Some("op"), Some(body)).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let id = json_body(resp).await["id_gestion"].as_str().unwrap().to_string();

    let body = json_body(send(&state, "GET", &format!("/gestiones/{id}"), Some("op"), None).await).await;
    assert_eq!(body["costo_estimado"], "12345678901234567.89");
  }

  #[tokio::test]
  async fn numeric_cost_is_rejected() {
    let state = make_state().await;
    let raw = nueva().to_string().replacen('{', r#"{"costo_estimado":12345678901234567.89,"#, 1);
    let req = Request::builder()
      .method("POST")
      .uri("/gestiones")
      .header(header::AUTHORIZATION, auth_header("op"))
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(raw))
      .unwrap();
    let resp = router(state.clone()).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error"], "validation_error");

    let resp = send(&state, "GET", "/gestiones", Some("op"), None).await;
    assert_eq!(json_body(resp).await["total"], 0);
  }

  #[tokio::test]
  async fn unknown_location_returns_400() {
    let state = make_state().await;
    let mut body = nueva();
    body["localidad"] = json!("Inexistente");
    let resp = send(&state, "POST", "/gestiones", Some("op"), Some(body)).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error"], "validation_error");
  }

  #[tokio::test]
  async fn malformed_body_returns_400() {
    let state = make_state().await;
    let resp = send(&state, "POST", "/gestiones", Some("op"), Some(json!({ "detalle": 3 }))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error"], "validation_error");
  }

  #[tokio::test]
  async fn unknown_case_returns_404() {
    let state = make_state().await;
    let uri = format!("/gestiones/{}", uuid::Uuid::new_v4());
    let resp = send(&state, "GET", &uri, Some("op"), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(resp).await["error"], "not_found");
  }

  #[tokio::test]
  async fn list_pages_and_validates_limit() {
    let state = make_state().await;
    create(&state).await;
    create(&state).await;

    let resp = send(&state, "GET", "/gestiones?limit=1", Some("lector"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["limit"], 1);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert!(body["items"][0]["dias_transcurridos"].is_i64());
    assert_eq!(body["items"][0]["estado"], "INGRESADO");

    let resp = send(&state, "GET", "/gestiones?limit=500", Some("lector"), None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn patch_updates_fields() {
    let state = make_state().await;
    let id = create(&state).await;
    let uri = format!("/gestiones/{id}");

    let resp = send(&state, "PATCH", &uri, Some("op"), Some(json!({ "detalle": "Corregido" }))).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await["ok"], true);

    let body = json_body(send(&state, "GET", &uri, Some("op"), None).await).await;
    assert_eq!(body["detalle"], "Corregido");

    let resp = send(&state, "PATCH", &uri, Some("op"), Some(json!({}))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn change_state_requires_comment_for_archivado() {
    let state = make_state().await;
    let id = create(&state).await;
    let uri = format!("/gestiones/{id}/cambiar-estado");

    let resp = send(&state, "POST", &uri, Some("admin"), Some(json!({ "nuevo_estado": "ARCHIVADO" }))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(
      &state,
      "POST",
      &uri,
      Some("admin"),
      Some(json!({ "nuevo_estado": "archivado", "comentario": "duplicado" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["id_gestion"], id.as_str());
    assert_eq!(body["estado"], "ARCHIVADO");
  }

  #[tokio::test]
  async fn delete_hides_case_but_keeps_events() {
    let state = make_state().await;
    let id = create(&state).await;
    let uri = format!("/gestiones/{id}");

    let resp = send(&state, "DELETE", &uri, Some("op"), None).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let resp = send(&state, "DELETE", &uri, Some("admin"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = send(&state, "GET", &uri, Some("admin"), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = send(&state, "GET", &format!("{uri}/eventos"), Some("lector"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let eventos = json_body(resp).await;
    let eventos = eventos.as_array().unwrap();
    assert_eq!(eventos.len(), 2);
    assert_eq!(eventos[0]["tipo_evento"], "ARCHIVO");
    assert_eq!(eventos[1]["tipo_evento"], "CREACION");
  }

  // ── Concurrency ───────────────────────────────────────────────────────────

  /// Reports every case in a state it has already left.
  struct StaleReads(SqliteStore);

  impl GestionStore for StaleReads {
    type Error = gestiones_store_sqlite::Error;

    async fn find_geo(
      &self,
      departamento: &str,
      localidad: &str,
    ) -> gestiones_store_sqlite::Result<Vec<GeoLocalidad>> {
      self.0.find_geo(departamento, localidad).await
    }

    async fn list_departamentos(&self) -> gestiones_store_sqlite::Result<Vec<String>> {
      self.0.list_departamentos().await
    }

    async fn list_localidades(
      &self,
      departamento: &str,
    ) -> gestiones_store_sqlite::Result<Vec<String>> {
      self.0.list_localidades(departamento).await
    }

    async fn insert_gestion(
      &self,
      gestion: Gestion,
      evento: Evento,
    ) -> gestiones_store_sqlite::Result<()> {
      self.0.insert_gestion(gestion, evento).await
    }

    async fn update_gestion(
      &self,
      id: uuid::Uuid,
      changes: GestionChanges,
      evento: Evento,
    ) -> gestiones_store_sqlite::Result<bool> {
      self.0.update_gestion(id, changes, evento).await
    }

    async fn update_estado(
      &self,
      id: uuid::Uuid,
      write: EstadoWrite,
      evento: Evento,
    ) -> gestiones_store_sqlite::Result<bool> {
      self.0.update_estado(id, write, evento).await
    }

    async fn soft_delete(
      &self,
      id: uuid::Uuid,
      tombstone: Tombstone,
      evento: Evento,
    ) -> gestiones_store_sqlite::Result<bool> {
      self.0.soft_delete(id, tombstone, evento).await
    }

    async fn get_gestion(&self, id: uuid::Uuid) -> gestiones_store_sqlite::Result<Option<Gestion>> {
      let mut gestion = self.0.get_gestion(id).await?;
      if let Some(g) = gestion.as_mut() {
        g.estado = "PENDIENTE".into();
      }
      Ok(gestion)
    }

    async fn list_gestiones(
      &self,
      query: &GestionQuery,
    ) -> gestiones_store_sqlite::Result<Vec<Gestion>> {
      self.0.list_gestiones(query).await
    }

    async fn count_gestiones(&self, filter: &GestionFilter) -> gestiones_store_sqlite::Result<u64> {
      self.0.count_gestiones(filter).await
    }

    async fn list_eventos(
      &self,
      id_gestion: uuid::Uuid,
      limit: usize,
    ) -> gestiones_store_sqlite::Result<Vec<Evento>> {
      self.0.list_eventos(id_gestion, limit).await
    }
  }

  #[tokio::test]
  async fn lost_state_race_returns_409() {
    let state = state_over(StaleReads(seeded_store().await));
    let id = create(&state).await;

    let resp = send(
      &state,
      "POST",
      &format!("/gestiones/{id}/cambiar-estado"),
      Some("op"),
      Some(json!({ "nuevo_estado": "EN PROCESO" })),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(resp).await["error"], "conflict");
  }

  // ── Catalogs ──────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn catalogs_list_choices() {
    let state = make_state().await;

    let estados = json_body(send(&state, "GET", "/catalogos/estados", Some("lector"), None).await).await;
    assert_eq!(estados[0], json!({ "nombre": "INGRESADO" }));

    let urgencias = json_body(send(&state, "GET", "/catalogos/urgencias", Some("lector"), None).await).await;
    assert_eq!(urgencias, json!([{ "nombre": "Baja" }, { "nombre": "Media" }, { "nombre": "Alta" }]));

    let resp = send(&state, "GET", "/catalogos/departamentos", Some("lector"), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await, json!(["Capital"]));

    let resp = send(&state, "GET", "/catalogos/localidades?departamento=capital", Some("lector"), None).await;
    assert_eq!(json_body(resp).await, json!(["Centro"]));

    let resp = send(&state, "GET", "/catalogos/localidades", Some("lector"), None).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = send(&state, "GET", "/catalogos/estados", None, None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn geo_catalog_resolves_or_rejects() {
    let state = make_state().await;

    let resp = send(
      &state,
      "GET",
      "/catalogos/geo?departamento=CAPITAL&localidad=centro",
      Some("lector"),
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["departamento"], "Capital");
    assert_eq!(body["localidad"], "Centro");
    assert_eq!(body["geo_id"], "G1");
    assert_eq!(body["lat"], "-31.4");

    let resp = send(
      &state,
      "GET",
      "/catalogos/geo?departamento=Capital&localidad=Inexistente",
      Some("lector"),
      None,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(resp).await["error"], "validation_error");
  }
}
