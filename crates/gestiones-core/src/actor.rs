//! Actors, roles and the authorization gate.
//!
//! The role set is closed and flat. Every operation maps to the list of roles
//! allowed to perform it; [`authorize`] is called by the service before any
//! validation or I/O.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result, gestion::estado};

// ─── Roles ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  AsRefStr,
  EnumString,
)]
#[serde(try_from = "String")]
#[strum(ascii_case_insensitive)]
pub enum Rol {
  Admin,
  Supervisor,
  Operador,
  /// Read-only.
  Consulta,
}

impl TryFrom<String> for Rol {
  type Error = strum::ParseError;

  fn try_from(s: String) -> Result<Self, Self::Error> { s.trim().parse() }
}

// ─── Operations ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Operacion {
  Leer,
  Crear,
  Editar,
  CambiarEstado,
  /// A state change into `FINALIZADA` or `ARCHIVADO`.
  CambiarEstadoRestringido,
  Archivar,
}

impl Operacion {
  /// The operation a state change into `nuevo_estado` counts as.
  pub fn cambio_estado(nuevo_estado: &str) -> Self {
    if estado::requiere_supervision(nuevo_estado) {
      Self::CambiarEstadoRestringido
    } else {
      Self::CambiarEstado
    }
  }

  pub fn roles_permitidos(self) -> &'static [Rol] {
    use Rol::*;
    match self {
      Self::Leer => &[Admin, Supervisor, Operador, Consulta],
      Self::Crear | Self::Editar | Self::CambiarEstado => {
        &[Admin, Supervisor, Operador]
      }
      Self::CambiarEstadoRestringido | Self::Archivar => &[Admin, Supervisor],
    }
  }
}

// ─── Actor ───────────────────────────────────────────────────────────────────

/// The authenticated user performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
  pub usuario: String,
  pub email:   Option<String>,
  pub rol:     Rol,
}

impl Actor {
  pub fn new(usuario: impl Into<String>, email: Option<String>, rol: Rol) -> Self {
    Self { usuario: usuario.into(), email, rol }
  }

  /// Identity recorded on cases and events: the email when present, the
  /// username otherwise, lower-cased.
  pub fn identidad(&self) -> String {
    self
      .email
      .as_deref()
      .map(str::trim)
      .filter(|e| !e.is_empty())
      .unwrap_or(self.usuario.trim())
      .to_lowercase()
  }

  pub fn puede(&self, op: Operacion) -> bool {
    op.roles_permitidos().contains(&self.rol)
  }
}

/// Fail with [`Error::Forbidden`] unless `actor`'s role may perform `op`.
pub fn authorize(actor: &Actor, op: Operacion) -> Result<()> {
  if actor.puede(op) {
    Ok(())
  } else {
    Err(Error::Forbidden { rol: actor.rol, operacion: op })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn actor(rol: Rol) -> Actor { Actor::new("ana", None, rol) }

  #[test]
  fn everyone_can_read() {
    for rol in [Rol::Admin, Rol::Supervisor, Rol::Operador, Rol::Consulta] {
      assert!(authorize(&actor(rol), Operacion::Leer).is_ok());
    }
  }

  #[test]
  fn consulta_cannot_write() {
    let consulta = actor(Rol::Consulta);
    for op in [
      Operacion::Crear,
      Operacion::Editar,
      Operacion::CambiarEstado,
      Operacion::Archivar,
    ] {
      assert!(matches!(
        authorize(&consulta, op),
        Err(Error::Forbidden { rol: Rol::Consulta, .. })
      ));
    }
  }

  #[test]
  fn operador_cannot_archive_or_finalize() {
    let operador = actor(Rol::Operador);
    assert!(authorize(&operador, Operacion::Crear).is_ok());
    assert!(authorize(&operador, Operacion::cambio_estado("EN PROCESO")).is_ok());
    assert!(authorize(&operador, Operacion::cambio_estado("finalizada")).is_err());
    assert!(authorize(&operador, Operacion::cambio_estado("ARCHIVADO")).is_err());
    assert!(authorize(&operador, Operacion::Archivar).is_err());
  }

  #[test]
  fn supervisor_can_do_everything() {
    let supervisor = actor(Rol::Supervisor);
    assert!(authorize(&supervisor, Operacion::cambio_estado("ARCHIVADO")).is_ok());
    assert!(authorize(&supervisor, Operacion::Archivar).is_ok());
  }

  #[test]
  fn identidad_prefers_email() {
    let a = Actor::new("ana", Some("Ana@Example.org".into()), Rol::Admin);
    assert_eq!(a.identidad(), "ana@example.org");

    let b = Actor::new("Beto", Some("  ".into()), Rol::Admin);
    assert_eq!(b.identidad(), "beto");
  }

  #[test]
  fn rol_parses_case_insensitively() {
    let rol: Rol = serde_json::from_str("\"supervisor\"").unwrap();
    assert_eq!(rol, Rol::Supervisor);
    assert_eq!(serde_json::to_string(&rol).unwrap(), "\"Supervisor\"");
    assert!(serde_json::from_str::<Rol>("\"root\"").is_err());
  }
}
