//! HTTP Basic-auth extractor resolving credentials to an [`Actor`].

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use gestiones_core::{
  actor::{Actor, Rol},
  store::GestionStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError};

/// One account allowed to use the API, as listed in `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
  pub username:      String,
  #[serde(default)]
  pub email:         Option<String>,
  pub rol:           Rol,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
}

/// Credentials accepted as valid for this server instance.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
  users: Vec<UserConfig>,
}

impl AuthConfig {
  pub fn new(users: Vec<UserConfig>) -> Self { Self { users } }

  pub fn is_empty(&self) -> bool { self.users.is_empty() }

  fn find(&self, username: &str) -> Option<&UserConfig> {
    self.users.iter().find(|u| u.username == username)
  }
}

/// The authenticated caller, resolved from the `Authorization` header.
pub struct Authenticated(pub Actor);

/// Verify Basic credentials against `config` and return the caller's actor.
pub fn verify_auth(headers: &HeaderMap, config: &AuthConfig) -> Result<Actor, ApiError> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;
  let user = config.find(username).ok_or(ApiError::Unauthorized)?;

  let parsed_hash = PasswordHash::new(&user.password_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Ok(Actor::new(user.username.clone(), user.email.clone(), user.rol))
}

impl<S> FromRequestParts<AppState<S>> for Authenticated
where
  S: GestionStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let actor = verify_auth(&parts.headers, &state.auth)?;
    tracing::debug!(usuario = %actor.usuario, rol = %actor.rol, "authenticated");
    Ok(Authenticated(actor))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use argon2::{PasswordHasher, password_hash::SaltString};
  use axum::http::{HeaderValue, header};
  use rand_core::OsRng;

  fn config(password: &str) -> AuthConfig {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();

    AuthConfig::new(vec![
      UserConfig {
        username:      "ana".to_string(),
        email:         Some("Ana@Municipio.gob".to_string()),
        rol:           Rol::Supervisor,
        password_hash: hash.clone(),
      },
      UserConfig {
        username:      "beto".to_string(),
        email:         None,
        rol:           Rol::Consulta,
        password_hash: hash,
      },
    ])
  }

  fn headers(value: &str) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
    h
  }

  fn basic(user: &str, pass: &str) -> String {
    let encoded = B64.encode(format!("{user}:{pass}"));
    format!("Basic {encoded}")
  }

  #[test]
  fn correct_credentials_resolve_actor() {
    let cfg = config("secret");

    let ana = verify_auth(&headers(&basic("ana", "secret")), &cfg).unwrap();
    assert_eq!(ana.rol, Rol::Supervisor);
    assert_eq!(ana.identidad(), "ana@municipio.gob");

    let beto = verify_auth(&headers(&basic("beto", "secret")), &cfg).unwrap();
    assert_eq!(beto.rol, Rol::Consulta);
    assert_eq!(beto.identidad(), "beto");
  }

  #[test]
  fn wrong_password() {
    let cfg = config("secret");
    let res = verify_auth(&headers(&basic("ana", "wrong")), &cfg);
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }

  #[test]
  fn unknown_user() {
    let cfg = config("secret");
    let res = verify_auth(&headers(&basic("carla", "secret")), &cfg);
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }

  #[test]
  fn missing_header() {
    let cfg = config("secret");
    let res = verify_auth(&HeaderMap::new(), &cfg);
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }

  #[test]
  fn invalid_base64() {
    let cfg = config("secret");
    let res = verify_auth(&headers("Basic !!!not-base64!!!"), &cfg);
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }

  #[test]
  fn role_names_are_case_insensitive_in_config() {
    let user: UserConfig = serde_json::from_value(serde_json::json!({
      "username": "ana",
      "rol": "supervisor",
      "password_hash": "x",
    }))
    .unwrap();
    assert_eq!(user.rol, Rol::Supervisor);
    assert_eq!(user.email, None);
  }
}
