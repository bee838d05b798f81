//! Geo-reference entries and the location resolver.
//!
//! The reference table is owned externally; this module only reads it. A
//! case's location is always copied from exactly one active entry.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, gestion::Ubicacion, store::GestionStore};

/// One recognised (department, locality) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocalidad {
  pub id_geo:       String,
  pub departamento: String,
  pub localidad:    String,
  #[serde(with = "rust_decimal::serde::str")]
  pub lat:          Decimal,
  #[serde(with = "rust_decimal::serde::str")]
  pub lon:          Decimal,
  #[serde(default = "default_activo")]
  pub activo:       bool,
}

fn default_activo() -> bool { true }

/// Lookup key form: trimmed, lower-cased.
pub fn normalize(s: &str) -> String { s.trim().to_lowercase() }

/// Resolve a (department, locality) pair against the active reference
/// entries.
///
/// The returned [`Ubicacion`] copies the entry's names, identifier and
/// centroid, whatever spelling the caller used.
pub async fn resolve<S>(store: &S, departamento: &str, localidad: &str) -> Result<Ubicacion>
where
  S: GestionStore,
{
  let (departamento, localidad) = (departamento.trim(), localidad.trim());
  if departamento.is_empty() || localidad.is_empty() {
    return Err(Error::validation(
      "departamento y localidad deben venir juntos y no vacíos",
    ));
  }

  let matches = store
    .find_geo(&normalize(departamento), &normalize(localidad))
    .await
    .map_err(Error::store)?;

  let entry = match matches.as_slice() {
    [entry] => entry,
    [] => {
      return Err(Error::validation(format!(
        "departamento/localidad inválidos o inactivos: {departamento} / {localidad}"
      )));
    }
    _ => {
      return Err(Error::validation(format!(
        "referencia geográfica ambigua: {departamento} / {localidad}"
      )));
    }
  };

  Ok(Ubicacion {
    departamento: entry.departamento.clone(),
    localidad:    entry.localidad.clone(),
    geo_id:       entry.id_geo.clone(),
    lat:          entry.lat,
    lon:          entry.lon,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalize_trims_and_folds_case() {
    assert_eq!(normalize("  Capital "), "capital");
    assert_eq!(normalize("RÍO CUARTO"), "río cuarto");
  }

  #[test]
  fn activo_defaults_to_true() {
    let entry: GeoLocalidad = serde_json::from_str(
      r#"{"id_geo":"G1","departamento":"Capital","localidad":"Centro","lat":"-31.4","lon":"-64.2"}"#,
    )
    .unwrap();
    assert!(entry.activo);
    assert_eq!(entry.lat.to_string(), "-31.4");
  }

  #[test]
  fn centroid_must_be_decimal_text() {
    let numeric = serde_json::from_str::<GeoLocalidad>(
      r#"{"id_geo":"G1","departamento":"Capital","localidad":"Centro","lat":-31.4,"lon":-64.2}"#,
    );
    assert!(numeric.is_err());
  }
}
