//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so lexical order is chronological order. Dates are `YYYY-MM-DD`. Decimals
//! are stored as their exact text. UUIDs are hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use gestiones_core::{
  actor::Rol,
  evento::{Evento, TipoEvento},
  geo::GeoLocalidad,
  gestion::{Gestion, Ubicacion},
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Decimal ─────────────────────────────────────────────────────────────────

pub fn encode_decimal(d: Decimal) -> String { d.to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(s.parse()?) }

// ─── Enumerations ────────────────────────────────────────────────────────────

pub fn decode_rol(s: &str) -> Result<Rol> {
  s.parse().map_err(|_| Error::UnknownValue {
    column: "rol_usuario",
    value:  s.to_owned(),
  })
}

pub fn decode_tipo_evento(s: &str) -> Result<TipoEvento> {
  s.parse().map_err(|_| Error::UnknownValue {
    column: "tipo_evento",
    value:  s.to_owned(),
  })
}

// ─── Free-text search ────────────────────────────────────────────────────────

/// Build a `LIKE ... ESCAPE '\'` pattern matching `token` as a substring.
pub fn like_pattern(token: &str) -> String {
  let mut escaped = String::with_capacity(token.len() + 2);
  escaped.push('%');
  for c in token.chars() {
    if matches!(c, '%' | '_' | '\\') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped.push('%');
  escaped
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `gestiones` row, in
/// [`crate::schema::GESTION_COLUMNS`] order.
pub struct RawGestion {
  pub id_gestion:                String,
  pub nro_expediente:            Option<String>,
  pub origen:                    String,
  pub estado:                    String,
  pub urgencia:                  String,
  pub fecha_ingreso:             String,
  pub fecha_estado:              String,
  pub fecha_finalizacion:        Option<String>,
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
  pub departamento:              Option<String>,
  pub localidad:                 Option<String>,
  pub geo_id:                    Option<String>,
  pub lat:                       Option<String>,
  pub lon:                       Option<String>,
  pub costo_estimado:            Option<String>,
  pub costo_moneda:              Option<String>,
  pub created_at:                String,
  pub created_by:                String,
  pub updated_at:                String,
  pub updated_by:                String,
  pub is_deleted:                bool,
}

impl RawGestion {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id_gestion:                row.get(0)?,
      nro_expediente:            row.get(1)?,
      origen:                    row.get(2)?,
      estado:                    row.get(3)?,
      urgencia:                  row.get(4)?,
      fecha_ingreso:             row.get(5)?,
      fecha_estado:              row.get(6)?,
      fecha_finalizacion:        row.get(7)?,
      ministerio_agencia_id:     row.get(8)?,
      organismo_id:              row.get(9)?,
      derivado_a_id:             row.get(10)?,
      categoria_general_id:      row.get(11)?,
      subcategoria_id:           row.get(12)?,
      tipo_demanda_principal_id: row.get(13)?,
      subtipo_detalle:           row.get(14)?,
      detalle:                   row.get(15)?,
      observaciones:             row.get(16)?,
      direccion:                 row.get(17)?,
      departamento:              row.get(18)?,
      localidad:                 row.get(19)?,
      geo_id:                    row.get(20)?,
      lat:                       row.get(21)?,
      lon:                       row.get(22)?,
      costo_estimado:            row.get(23)?,
      costo_moneda:              row.get(24)?,
      created_at:                row.get(25)?,
      created_by:                row.get(26)?,
      updated_at:                row.get(27)?,
      updated_by:                row.get(28)?,
      is_deleted:                row.get(29)?,
    })
  }

  pub fn into_gestion(self) -> Result<Gestion> {
    // Location columns are written together; a partial set reads as unset.
    let ubicacion = match (self.departamento, self.localidad, self.geo_id, self.lat, self.lon) {
      (Some(departamento), Some(localidad), Some(geo_id), Some(lat), Some(lon)) => {
        Some(Ubicacion {
          departamento,
          localidad,
          geo_id,
          lat: decode_decimal(&lat)?,
          lon: decode_decimal(&lon)?,
        })
      }
      _ => None,
    };

    Ok(Gestion {
      id_gestion: decode_uuid(&self.id_gestion)?,
      nro_expediente: self.nro_expediente,
      origen: self.origen,
      estado: self.estado,
      urgencia: self.urgencia,
      fecha_ingreso: decode_date(&self.fecha_ingreso)?,
      fecha_estado: decode_dt(&self.fecha_estado)?,
      fecha_finalizacion: self.fecha_finalizacion.as_deref().map(decode_date).transpose()?,
      ministerio_agencia_id: self.ministerio_agencia_id,
      organismo_id: self.organismo_id,
      derivado_a_id: self.derivado_a_id,
      categoria_general_id: self.categoria_general_id,
      subcategoria_id: self.subcategoria_id,
      tipo_demanda_principal_id: self.tipo_demanda_principal_id,
      subtipo_detalle: self.subtipo_detalle,
      detalle: self.detalle,
      observaciones: self.observaciones,
      direccion: self.direccion,
      ubicacion,
      costo_estimado: self.costo_estimado.as_deref().map(decode_decimal).transpose()?,
      costo_moneda: self.costo_moneda,
      created_at: decode_dt(&self.created_at)?,
      created_by: self.created_by,
      updated_at: decode_dt(&self.updated_at)?,
      updated_by: self.updated_by,
      is_deleted: self.is_deleted,
    })
  }
}

/// Raw values read directly from a `gestiones_eventos` row, in
/// [`crate::schema::EVENTO_COLUMNS`] order.
pub struct RawEvento {
  pub id_evento:        String,
  pub id_gestion:       String,
  pub fecha_evento:     String,
  pub usuario:          String,
  pub rol_usuario:      String,
  pub tipo_evento:      String,
  pub estado_anterior:  Option<String>,
  pub estado_nuevo:     Option<String>,
  pub campo_modificado: Option<String>,
  pub valor_anterior:   Option<String>,
  pub valor_nuevo:      Option<String>,
  pub comentario:       Option<String>,
  pub metadata_json:    String,
}

impl RawEvento {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id_evento:        row.get(0)?,
      id_gestion:       row.get(1)?,
      fecha_evento:     row.get(2)?,
      usuario:          row.get(3)?,
      rol_usuario:      row.get(4)?,
      tipo_evento:      row.get(5)?,
      estado_anterior:  row.get(6)?,
      estado_nuevo:     row.get(7)?,
      campo_modificado: row.get(8)?,
      valor_anterior:   row.get(9)?,
      valor_nuevo:      row.get(10)?,
      comentario:       row.get(11)?,
      metadata_json:    row.get(12)?,
    })
  }

  pub fn into_evento(self) -> Result<Evento> {
    Ok(Evento {
      id_evento:        decode_uuid(&self.id_evento)?,
      id_gestion:       decode_uuid(&self.id_gestion)?,
      fecha_evento:     decode_dt(&self.fecha_evento)?,
      usuario:          self.usuario,
      rol_usuario:      decode_rol(&self.rol_usuario)?,
      tipo_evento:      decode_tipo_evento(&self.tipo_evento)?,
      estado_anterior:  self.estado_anterior,
      estado_nuevo:     self.estado_nuevo,
      campo_modificado: self.campo_modificado,
      valor_anterior:   self.valor_anterior,
      valor_nuevo:      self.valor_nuevo,
      comentario:       self.comentario,
      metadata:         serde_json::from_str(&self.metadata_json)?,
    })
  }
}

/// Raw values read directly from a `geo_localidades` row.
pub struct RawGeo {
  pub id_geo:       String,
  pub departamento: String,
  pub localidad:    String,
  pub lat:          String,
  pub lon:          String,
  pub activo:       bool,
}

impl RawGeo {
  pub fn into_geo(self) -> Result<GeoLocalidad> {
    Ok(GeoLocalidad {
      id_geo:       self.id_geo,
      departamento: self.departamento,
      localidad:    self.localidad,
      lat:          decode_decimal(&self.lat)?,
      lon:          decode_decimal(&self.lon)?,
      activo:       self.activo,
    })
  }
}
