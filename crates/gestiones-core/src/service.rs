//! The [`Gestiones`] case service.
//!
//! Every operation runs the same pipeline: authorization gate, input
//! validation, geo resolution (when a location is set), then a single store
//! call that persists the case write and its audit event together. Nothing
//! is written before all checks have passed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
  Error, Result,
  actor::{Actor, Operacion, authorize},
  evento::{Evento, TipoEvento, eventos_limit},
  geo,
  gestion::{
    CambioEstado, EstadoWrite, Gestion, GestionChanges, GestionPatch, NewGestion,
    ORIGEN_APP, Tombstone, URGENCIA_DEFAULT, URGENCIAS, Ubicacion, estado,
  },
  store::{GestionFilter, GestionQuery, GestionStore},
};

pub const LIMIT_DEFAULT: usize = 50;
pub const LIMIT_MAX: usize = 200;

// ─── Collaborators ───────────────────────────────────────────────────────────

/// Source of "now" timestamps.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// Source of globally unique identifiers for cases and events.
pub trait IdGenerator: Send + Sync {
  fn next_id(&self) -> Uuid;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
  fn next_id(&self) -> Uuid { Uuid::new_v4() }
}

// ─── Request / response types ────────────────────────────────────────────────

/// Raw list filters as received from a caller. Blank values are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListParams {
  pub estado:       Option<String>,
  pub ministerio:   Option<String>,
  pub categoria:    Option<String>,
  pub departamento: Option<String>,
  pub localidad:    Option<String>,
  pub q:            Option<String>,
  pub limit:        Option<usize>,
  pub offset:       Option<usize>,
}

impl ListParams {
  /// Validate paging bounds and normalize filter values.
  pub fn into_query(self) -> Result<GestionQuery> {
    let limit = self.limit.unwrap_or(LIMIT_DEFAULT);
    if !(1..=LIMIT_MAX).contains(&limit) {
      return Err(Error::validation(format!(
        "limit debe estar entre 1 y {LIMIT_MAX}"
      )));
    }

    let filter = GestionFilter {
      estado:       clean(self.estado).map(|e| estado::normalize(&e)),
      ministerio:   clean(self.ministerio),
      categoria:    clean(self.categoria),
      departamento: clean(self.departamento).map(|d| geo::normalize(&d)),
      localidad:    clean(self.localidad).map(|l| geo::normalize(&l)),
      q:            clean(self.q),
    };

    Ok(GestionQuery { filter, limit, offset: self.offset.unwrap_or(0) })
  }
}

/// A list row: the case plus its age in whole days as of the service clock.
#[derive(Debug, Clone, Serialize)]
pub struct GestionResumen {
  #[serde(flatten)]
  pub gestion:            Gestion,
  pub dias_transcurridos: i64,
}

/// One entry of a fixed catalog, shaped `{"nombre": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Nombre {
  pub nombre: &'static str,
}

/// One page of results plus the total over the same filters.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
  pub items:  Vec<T>,
  pub total:  u64,
  pub limit:  usize,
  pub offset: usize,
}

// ─── Service ─────────────────────────────────────────────────────────────────

/// Case repository, audit log and authorization gate over a
/// [`GestionStore`].
pub struct Gestiones<S> {
  store: Arc<S>,
  clock: Arc<dyn Clock>,
  ids:   Arc<dyn IdGenerator>,
}

impl<S> Clone for Gestiones<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      clock: Arc::clone(&self.clock),
      ids:   Arc::clone(&self.ids),
    }
  }
}

impl<S: GestionStore> Gestiones<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, clock: Arc::new(SystemClock), ids: Arc::new(RandomIds) }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
    self.ids = ids;
    self
  }

  fn evento(&self, actor: &Actor, id_gestion: Uuid, tipo: TipoEvento, at: DateTime<Utc>) -> Evento {
    Evento::new(self.ids.next_id(), id_gestion, tipo, actor, at)
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn get(&self, actor: &Actor, id: Uuid) -> Result<Gestion> {
    authorize(actor, Operacion::Leer)?;
    self
      .store
      .get_gestion(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NotFound(id))
  }

  pub async fn list(&self, actor: &Actor, params: ListParams) -> Result<Page<GestionResumen>> {
    authorize(actor, Operacion::Leer)?;
    let query = params.into_query()?;

    let total = self
      .store
      .count_gestiones(&query.filter)
      .await
      .map_err(Error::store)?;
    let today = self.clock.now().date_naive();
    let items: Vec<GestionResumen> = self
      .store
      .list_gestiones(&query)
      .await
      .map_err(Error::store)?
      .into_iter()
      .map(|gestion| GestionResumen {
        dias_transcurridos: gestion.dias_transcurridos(today),
        gestion,
      })
      .collect();

    tracing::debug!(total, returned = items.len(), "listed gestiones");
    Ok(Page { items, total, limit: query.limit, offset: query.offset })
  }

  pub async fn list_eventos(
    &self,
    actor: &Actor,
    id: Uuid,
    limit: Option<usize>,
  ) -> Result<Vec<Evento>> {
    authorize(actor, Operacion::Leer)?;
    self
      .store
      .list_eventos(id, eventos_limit(limit))
      .await
      .map_err(Error::store)
  }

  // ── Catalogs ──────────────────────────────────────────────────────────

  pub fn estados(&self, actor: &Actor) -> Result<Vec<Nombre>> {
    authorize(actor, Operacion::Leer)?;
    Ok(estado::CATALOGO.iter().map(|&nombre| Nombre { nombre }).collect())
  }

  pub fn urgencias(&self, actor: &Actor) -> Result<Vec<Nombre>> {
    authorize(actor, Operacion::Leer)?;
    Ok(URGENCIAS.iter().map(|&nombre| Nombre { nombre }).collect())
  }

  /// Departments with at least one active geo-reference entry.
  pub async fn departamentos(&self, actor: &Actor) -> Result<Vec<String>> {
    authorize(actor, Operacion::Leer)?;
    self.store.list_departamentos().await.map_err(Error::store)
  }

  /// Active localities of one department, matched the way locations are.
  pub async fn localidades(&self, actor: &Actor, departamento: &str) -> Result<Vec<String>> {
    authorize(actor, Operacion::Leer)?;
    let departamento = geo::normalize(departamento);
    if departamento.is_empty() {
      return Err(Error::validation("departamento es obligatorio"));
    }
    self
      .store
      .list_localidades(&departamento)
      .await
      .map_err(Error::store)
  }

  /// Resolve a location exactly as create and update would.
  pub async fn geo(
    &self,
    actor: &Actor,
    departamento: &str,
    localidad: &str,
  ) -> Result<Ubicacion> {
    authorize(actor, Operacion::Leer)?;
    geo::resolve(&*self.store, departamento, localidad).await
  }

  // ── Mutations ─────────────────────────────────────────────────────────

  /// Create a case in state `INGRESADO` and record its `CREACION` event.
  pub async fn create(&self, actor: &Actor, input: NewGestion) -> Result<Uuid> {
    authorize(actor, Operacion::Crear)?;
    input.validate()?;
    let ubicacion =
      geo::resolve(&*self.store, &input.departamento, &input.localidad).await?;

    let now = self.clock.now();
    let id = self.ids.next_id();
    let identidad = actor.identidad();

    let mut evento = self.evento(actor, id, TipoEvento::Creacion, now);
    evento.metadata = json!({
      "ministerio_agencia_id": input.ministerio_agencia_id.trim(),
      "categoria_general_id":  input.categoria_general_id.trim(),
      "organismo_id":          input.organismo_id,
      "subcategoria_id":       input.subcategoria_id,
      "tipo_demanda_principal_id": input.tipo_demanda_principal_id,
      "subtipo_detalle":       input.subtipo_detalle,
      "costo_estimado":        input.costo_estimado,
      "costo_moneda":          input.costo_moneda,
      "nro_expediente":        input.nro_expediente,
      "departamento":          ubicacion.departamento,
      "localidad":             ubicacion.localidad,
      "geo_id":                ubicacion.geo_id,
      "lat":                   ubicacion.lat,
      "lon":                   ubicacion.lon,
    });

    let gestion = Gestion {
      id_gestion:                id,
      nro_expediente:            clean(input.nro_expediente),
      origen:                    ORIGEN_APP.to_owned(),
      estado:                    estado::INGRESADO.to_owned(),
      urgencia:                  clean(input.urgencia)
        .unwrap_or_else(|| URGENCIA_DEFAULT.to_owned()),
      fecha_ingreso:             now.date_naive(),
      fecha_estado:              now,
      fecha_finalizacion:        None,
      ministerio_agencia_id:     input.ministerio_agencia_id.trim().to_owned(),
      organismo_id:              clean(input.organismo_id),
      derivado_a_id:             None,
      categoria_general_id:      input.categoria_general_id.trim().to_owned(),
      subcategoria_id:           clean(input.subcategoria_id),
      tipo_demanda_principal_id: clean(input.tipo_demanda_principal_id),
      subtipo_detalle:           clean(input.subtipo_detalle),
      detalle:                   input.detalle.trim().to_owned(),
      observaciones:             clean(input.observaciones),
      direccion:                 clean(input.direccion),
      ubicacion:                 Some(ubicacion),
      costo_estimado:            input.costo_estimado,
      costo_moneda:              clean(input.costo_moneda),
      created_at:                now,
      created_by:                identidad.clone(),
      updated_at:                now,
      updated_by:                identidad.clone(),
      is_deleted:                false,
    };

    self
      .store
      .insert_gestion(gestion, evento)
      .await
      .map_err(Error::store)?;

    tracing::info!(id_gestion = %id, actor = %identidad, rol = %actor.rol, "gestión creada");
    Ok(id)
  }

  /// Merge `patch` into a case and record an `EDICION` event.
  pub async fn update(&self, actor: &Actor, id: Uuid, patch: GestionPatch) -> Result<()> {
    authorize(actor, Operacion::Editar)?;
    patch.validate()?;

    let ubicacion = match patch.location()? {
      Some((departamento, localidad)) => {
        Some(geo::resolve(&*self.store, departamento, localidad).await?)
      }
      None => None,
    };

    let now = self.clock.now();
    let mut evento = self.evento(actor, id, TipoEvento::Edicion, now);
    let mut metadata = serde_json::to_value(&patch)?;
    if let (Some(u), Some(obj)) = (&ubicacion, metadata.as_object_mut()) {
      obj.insert("geo_id".into(), json!(u.geo_id));
      obj.insert("lat".into(), json!(u.lat));
      obj.insert("lon".into(), json!(u.lon));
    }
    evento.metadata = metadata;

    let changes = GestionChanges {
      patch,
      ubicacion,
      updated_at: now,
      updated_by: actor.identidad(),
    };

    let applied = self
      .store
      .update_gestion(id, changes, evento)
      .await
      .map_err(Error::store)?;
    if !applied {
      return Err(Error::NotFound(id));
    }

    tracing::info!(id_gestion = %id, actor = %actor.identidad(), "gestión editada");
    Ok(())
  }

  /// Move a case to a new state and record a `CAMBIO_ESTADO` event.
  ///
  /// Returns the stored (canonical) state. The write is conditioned on the
  /// state read beforehand; losing that race yields [`Error::Conflict`].
  pub async fn change_state(
    &self,
    actor: &Actor,
    id: Uuid,
    cambio: CambioEstado,
  ) -> Result<String> {
    authorize(actor, Operacion::cambio_estado(&cambio.nuevo_estado))?;
    cambio.validate()?;

    let actual = self
      .store
      .get_gestion(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::NotFound(id))?;

    let nuevo = estado::normalize(&cambio.nuevo_estado);
    let now = self.clock.now();
    let fecha_finalizacion = (estado::es_finalizado(&nuevo)
      && actual.fecha_finalizacion.is_none())
    .then(|| now.date_naive());
    let derivado_a_id = cambio
      .derivado_a
      .as_deref()
      .map(|d| Some(d.trim().to_owned()).filter(|d| !d.is_empty()));

    let mut evento = self.evento(actor, id, TipoEvento::CambioEstado, now);
    evento.estado_anterior = Some(actual.estado.clone());
    evento.estado_nuevo = Some(nuevo.clone());
    evento.comentario = clean(cambio.comentario);
    evento.metadata = json!({
      "derivado_a":             cambio.derivado_a,
      "acciones_implementadas": cambio.acciones_implementadas,
    });

    let write = EstadoWrite {
      estado_anterior: actual.estado,
      estado_nuevo: nuevo.clone(),
      fecha_estado: now,
      fecha_finalizacion,
      derivado_a_id,
      updated_by: actor.identidad(),
    };

    let applied = self
      .store
      .update_estado(id, write, evento)
      .await
      .map_err(Error::store)?;

    if !applied {
      let still_there = self
        .store
        .get_gestion(id)
        .await
        .map_err(Error::store)?;
      return Err(match still_there {
        None => Error::NotFound(id),
        Some(_) => {
          tracing::warn!(id_gestion = %id, "concurrent state change detected");
          Error::Conflict(id)
        }
      });
    }

    tracing::info!(
      id_gestion = %id,
      actor = %actor.identidad(),
      estado = %nuevo,
      "estado actualizado"
    );
    Ok(nuevo)
  }

  /// Tombstone a case and record an `ARCHIVO` event.
  pub async fn soft_delete(&self, actor: &Actor, id: Uuid) -> Result<()> {
    authorize(actor, Operacion::Archivar)?;

    let now = self.clock.now();
    let mut evento = self.evento(actor, id, TipoEvento::Archivo, now);
    evento.campo_modificado = Some("is_deleted".into());
    evento.valor_anterior = Some("FALSE".into());
    evento.valor_nuevo = Some("TRUE".into());
    evento.comentario = Some("Borrado lógico".into());

    let tombstone = Tombstone { deleted_at: now, deleted_by: actor.identidad() };
    let applied = self
      .store
      .soft_delete(id, tombstone, evento)
      .await
      .map_err(Error::store)?;
    if !applied {
      return Err(Error::NotFound(id));
    }

    tracing::info!(id_gestion = %id, actor = %actor.identidad(), "gestión archivada");
    Ok(())
  }
}

/// Trim an optional value, treating blank as absent.
fn clean(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}
