//! Audit events: the append-only ledger of case mutations.
//!
//! Events reference a case by id only. They are written in the same
//! transaction as the mutation they describe and are never updated or
//! deleted, not even when the case is soft-deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::actor::{Actor, Rol};

/// Default page size when listing a case's events.
pub const EVENTOS_LIMIT_DEFAULT: usize = 200;
/// Hard cap on a page of events.
pub const EVENTOS_LIMIT_MAX: usize = 500;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  AsRefStr,
  EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TipoEvento {
  Creacion,
  Edicion,
  CambioEstado,
  /// Soft delete.
  Archivo,
}

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evento {
  pub id_evento:        Uuid,
  pub id_gestion:       Uuid,
  pub fecha_evento:     DateTime<Utc>,
  /// Actor identity, see [`Actor::identidad`].
  pub usuario:          String,
  pub rol_usuario:      Rol,
  pub tipo_evento:      TipoEvento,
  pub estado_anterior:  Option<String>,
  pub estado_nuevo:     Option<String>,
  pub campo_modificado: Option<String>,
  pub valor_anterior:   Option<String>,
  pub valor_nuevo:      Option<String>,
  pub comentario:       Option<String>,
  /// Arbitrary JSON document. Decimals are carried as strings and dates as
  /// ISO-8601 strings so they read back unchanged.
  pub metadata:         serde_json::Value,
}

impl Evento {
  /// An event of `tipo` with every optional column empty.
  pub fn new(
    id_evento: Uuid,
    id_gestion: Uuid,
    tipo_evento: TipoEvento,
    actor: &Actor,
    fecha_evento: DateTime<Utc>,
  ) -> Self {
    Self {
      id_evento,
      id_gestion,
      fecha_evento,
      usuario: actor.identidad(),
      rol_usuario: actor.rol,
      tipo_evento,
      estado_anterior: None,
      estado_nuevo: None,
      campo_modificado: None,
      valor_anterior: None,
      valor_nuevo: None,
      comentario: None,
      metadata: serde_json::Value::Object(Default::default()),
    }
  }
}

/// Clamp a requested event page size to `[1, EVENTOS_LIMIT_MAX]`.
pub fn eventos_limit(requested: Option<usize>) -> usize {
  requested
    .unwrap_or(EVENTOS_LIMIT_DEFAULT)
    .clamp(1, EVENTOS_LIMIT_MAX)
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;
  use rust_decimal::Decimal;
  use serde_json::json;

  use super::*;

  #[test]
  fn tipo_evento_wire_names() {
    assert_eq!(TipoEvento::CambioEstado.to_string(), "CAMBIO_ESTADO");
    assert_eq!(
      serde_json::to_string(&TipoEvento::Creacion).unwrap(),
      "\"CREACION\""
    );
    assert_eq!("ARCHIVO".parse::<TipoEvento>().unwrap(), TipoEvento::Archivo);
  }

  #[test]
  fn metadata_keeps_decimals_and_dates_exact() {
    let costo: Decimal = "12345678901234567.8901".parse().unwrap();
    let fecha = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    let metadata = json!({
      "costo_estimado": costo,
      "fecha": fecha,
      "nested": { "lat": Decimal::new(-314, 1) },
    });

    let text = serde_json::to_string(&metadata).unwrap();
    assert!(text.contains("\"12345678901234567.8901\""), "{text}");

    let back: serde_json::Value = serde_json::from_str(&text).unwrap();
    let costo_back: Decimal =
      serde_json::from_value(back["costo_estimado"].clone()).unwrap();
    let fecha_back: NaiveDate = serde_json::from_value(back["fecha"].clone()).unwrap();
    assert_eq!(costo_back, costo);
    assert_eq!(fecha_back, fecha);
    assert_eq!(back["nested"]["lat"], "-31.4");
  }

  #[test]
  fn new_event_records_actor_identity() {
    let actor = Actor::new("op1", Some("Op1@Gob.example".into()), Rol::Operador);
    let ev = Evento::new(
      Uuid::new_v4(),
      Uuid::new_v4(),
      TipoEvento::Edicion,
      &actor,
      Utc::now(),
    );
    assert_eq!(ev.usuario, "op1@gob.example");
    assert_eq!(ev.rol_usuario, Rol::Operador);
    assert_eq!(ev.metadata, json!({}));
  }

  #[test]
  fn eventos_limit_is_bounded() {
    assert_eq!(eventos_limit(None), 200);
    assert_eq!(eventos_limit(Some(0)), 1);
    assert_eq!(eventos_limit(Some(10_000)), 500);
  }
}
