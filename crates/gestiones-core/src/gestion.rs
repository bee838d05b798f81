//! The case ("gestión") record and its write inputs.
//!
//! A case row is mutable, unlike its audit events. Deletion is logical: the
//! `is_deleted` flag hides the row from every read and mutation.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── States ──────────────────────────────────────────────────────────────────

/// Well-known values of the open `estado` string.
///
/// Any state may follow any other; only the rules below are enforced.
pub mod estado {
  pub const INGRESADO: &str = "INGRESADO";
  pub const EN_PROCESO: &str = "EN PROCESO";
  pub const FINALIZADA: &str = "FINALIZADA";
  pub const ARCHIVADO: &str = "ARCHIVADO";
  pub const NO_REMITE_SUAC: &str = "NO REMITE SUAC";

  /// States offered to clients as choices. Other values are still accepted.
  pub const CATALOGO: &[&str] = &[INGRESADO, EN_PROCESO, FINALIZADA, ARCHIVADO, NO_REMITE_SUAC];

  /// Canonical stored form: trimmed and upper-cased.
  pub fn normalize(estado: &str) -> String { estado.trim().to_uppercase() }

  /// Entering one of these states requires a non-blank comment.
  pub fn requiere_comentario(estado: &str) -> bool {
    matches!(normalize(estado).as_str(), ARCHIVADO | NO_REMITE_SUAC)
  }

  /// Entering one of these states requires a supervising role.
  pub fn requiere_supervision(estado: &str) -> bool {
    matches!(normalize(estado).as_str(), FINALIZADA | ARCHIVADO)
  }

  /// Entering a finalized state stamps the completion date once.
  pub fn es_finalizado(estado: &str) -> bool { normalize(estado) == FINALIZADA }
}

pub const ORIGEN_APP: &str = "APP";
pub const URGENCIA_DEFAULT: &str = "Media";
pub const URGENCIAS: &[&str] = &["Baja", URGENCIA_DEFAULT, "Alta"];

// ─── Location ────────────────────────────────────────────────────────────────

/// Denormalized location of a case, consistent with one geo-reference entry
/// at the time it was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ubicacion {
  pub departamento: String,
  pub localidad:    String,
  pub geo_id:       String,
  pub lat:          Decimal,
  pub lon:          Decimal,
}

// ─── Gestion ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gestion {
  pub id_gestion:                Uuid,
  pub nro_expediente:            Option<String>,
  pub origen:                    String,
  pub estado:                    String,
  pub urgencia:                  String,
  pub fecha_ingreso:             NaiveDate,
  pub fecha_estado:              DateTime<Utc>,
  pub fecha_finalizacion:        Option<NaiveDate>,
  pub ministerio_agencia_id:     String,
  pub organismo_id:              Option<String>,
  pub derivado_a_id:             Option<String>,
  pub categoria_general_id:      String,
  pub subcategoria_id:           Option<String>,
  pub tipo_demanda_principal_id: Option<String>,
  pub subtipo_detalle:           Option<String>,
  pub detalle:                   String,
  pub observaciones:             Option<String>,
  pub direccion:                 Option<String>,
  /// Flattened into `departamento`, `localidad`, `geo_id`, `lat`, `lon`.
  #[serde(flatten)]
  pub ubicacion:                 Option<Ubicacion>,
  pub costo_estimado:            Option<Decimal>,
  pub costo_moneda:              Option<String>,
  pub created_at:                DateTime<Utc>,
  pub created_by:                String,
  pub updated_at:                DateTime<Utc>,
  pub updated_by:                String,
  pub is_deleted:                bool,
}

impl Gestion {
  /// Whole days elapsed since intake, as of `today`.
  pub fn dias_transcurridos(&self, today: NaiveDate) -> i64 {
    (today - self.fecha_ingreso).num_days()
  }
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// Fields accepted when creating a case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewGestion {
  pub departamento:          String,
  pub localidad:             String,
  pub ministerio_agencia_id: String,
  pub categoria_general_id:  String,
  pub detalle:               String,
  #[serde(default)]
  pub observaciones:         Option<String>,
  #[serde(default)]
  pub urgencia:              Option<String>,
  #[serde(default)]
  pub direccion:             Option<String>,
  #[serde(default)]
  pub nro_expediente:        Option<String>,
  #[serde(default)]
  pub organismo_id:          Option<String>,
  #[serde(default)]
  pub subcategoria_id:       Option<String>,
  #[serde(default)]
  pub tipo_demanda_principal_id: Option<String>,
  #[serde(default)]
  pub subtipo_detalle:       Option<String>,
  /// Decimal text; JSON numbers are rejected so no digits are lost.
  #[serde(default, with = "rust_decimal::serde::str_option")]
  pub costo_estimado:        Option<Decimal>,
  #[serde(default)]
  pub costo_moneda:          Option<String>,
}

impl NewGestion {
  /// Check required fields before anything is read or written.
  pub fn validate(&self) -> Result<()> {
    let required = [
      ("departamento", &self.departamento),
      ("localidad", &self.localidad),
      ("ministerio_agencia_id", &self.ministerio_agencia_id),
      ("categoria_general_id", &self.categoria_general_id),
      ("detalle", &self.detalle),
    ];
    let missing: Vec<&str> = required
      .iter()
      .filter(|(_, v)| v.trim().is_empty())
      .map(|(name, _)| *name)
      .collect();

    if !missing.is_empty() {
      return Err(Error::validation(format!(
        "campos obligatorios vacíos: {}",
        missing.join(", ")
      )));
    }
    Ok(())
  }
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// Merge-patch input for an update. `None` leaves the stored value unchanged;
/// a blank optional field clears it, matching how creation stores blanks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GestionPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ministerio_agencia_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub categoria_general_id:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subcategoria_id:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub tipo_demanda_principal_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub subtipo_detalle:       Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub organismo_id:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub nro_expediente:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detalle:               Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub observaciones:         Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub urgencia:              Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub direccion:             Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub departamento:          Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub localidad:             Option<String>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    with = "rust_decimal::serde::str_option"
  )]
  pub costo_estimado:        Option<Decimal>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub costo_moneda:          Option<String>,
}

impl GestionPatch {
  pub fn is_empty(&self) -> bool { *self == Self::default() }

  /// The requested location, if any. Department and locality must come
  /// together and both be non-blank.
  pub fn location(&self) -> Result<Option<(&str, &str)>> {
    match (self.departamento.as_deref(), self.localidad.as_deref()) {
      (None, None) => Ok(None),
      (Some(d), Some(l)) if !d.trim().is_empty() && !l.trim().is_empty() => {
        Ok(Some((d, l)))
      }
      _ => Err(Error::validation(
        "departamento y localidad deben venir juntos y no vacíos",
      )),
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.is_empty() {
      return Err(Error::validation("no hay campos para actualizar"));
    }
    let required = [
      ("ministerio_agencia_id", &self.ministerio_agencia_id),
      ("categoria_general_id", &self.categoria_general_id),
      ("detalle", &self.detalle),
      ("urgencia", &self.urgencia),
    ];
    if let Some((name, _)) = required
      .iter()
      .find(|(_, v)| v.as_deref().is_some_and(|v| v.trim().is_empty()))
    {
      return Err(Error::validation(format!("{name} no puede quedar vacío")));
    }
    self.location()?;
    Ok(())
  }
}

/// Column values an update writes. Built by the service after validation and
/// geo resolution; `None` keeps the stored value.
#[derive(Debug, Clone)]
pub struct GestionChanges {
  pub patch:      GestionPatch,
  /// Replaces every location column at once when set.
  pub ubicacion:  Option<Ubicacion>,
  pub updated_at: DateTime<Utc>,
  pub updated_by: String,
}

// ─── State change ────────────────────────────────────────────────────────────

/// Input to a state change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CambioEstado {
  pub nuevo_estado:           String,
  #[serde(default)]
  pub comentario:             Option<String>,
  /// Absent leaves the derivation target unchanged; an empty string clears it.
  #[serde(default)]
  pub derivado_a:             Option<String>,
  #[serde(default)]
  pub acciones_implementadas: Option<String>,
}

impl CambioEstado {
  pub fn validate(&self) -> Result<()> {
    if self.nuevo_estado.trim().is_empty() {
      return Err(Error::validation("nuevo_estado es obligatorio"));
    }
    let sin_comentario = self
      .comentario
      .as_deref()
      .is_none_or(|c| c.trim().is_empty());
    if estado::requiere_comentario(&self.nuevo_estado) && sin_comentario {
      return Err(Error::validation(format!(
        "comentario obligatorio para estado {} / {}",
        estado::ARCHIVADO,
        estado::NO_REMITE_SUAC
      )));
    }
    Ok(())
  }
}

/// The conditional write performed by a state change.
#[derive(Debug, Clone)]
pub struct EstadoWrite {
  /// The write only applies while the stored state still equals this value.
  pub estado_anterior:    String,
  pub estado_nuevo:       String,
  pub fecha_estado:       DateTime<Utc>,
  /// Stamped only when the stored completion date is still unset.
  pub fecha_finalizacion: Option<NaiveDate>,
  /// `Some(None)` clears the target, `None` leaves it.
  pub derivado_a_id:      Option<Option<String>>,
  pub updated_by:         String,
}

/// The write performed by a soft delete.
#[derive(Debug, Clone)]
pub struct Tombstone {
  pub deleted_at: DateTime<Utc>,
  pub deleted_by: String,
}
