//! [`SqliteStore`], the SQLite implementation of [`GestionStore`].

use std::path::Path;

use rusqlite::{OptionalExtension as _, ToSql, named_params};
use uuid::Uuid;

use gestiones_core::{
  evento::Evento,
  geo::{self, GeoLocalidad},
  gestion::{EstadoWrite, Gestion, GestionChanges, Tombstone},
  store::{GestionFilter, GestionQuery, GestionStore},
};

use crate::{
  Error, Result,
  encode::{
    RawEvento, RawGeo, RawGestion, encode_date, encode_decimal, encode_dt, encode_uuid,
    like_pattern,
  },
  schema::{
    EVENTO_COLUMNS, GESTION_COLUMNS, GESTION_FILTER, MIGRATE_V1, SCHEMA, SCHEMA_VERSION,
    SEARCH_COLUMNS,
  },
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A case store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let migrated = self
      .conn
      .call(|conn| {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        let migrate = version == 1;
        if migrate {
          conn.execute_batch(MIGRATE_V1)?;
        }
        conn.execute_batch(SCHEMA)?;
        if !migrate {
          return Ok(0);
        }

        let tx = conn.transaction()?;
        let ids = tx
          .prepare("SELECT id_gestion FROM gestiones")?
          .query_map([], |row| row.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        for id in &ids {
          refresh_busqueda(&tx, id)?;
        }
        tx.commit()?;
        Ok(ids.len())
      })
      .await?;

    if migrated > 0 {
      tracing::info!(rows = migrated, version = SCHEMA_VERSION, "schema migrated");
    }
    Ok(())
  }

  /// Insert or replace geo-reference entries in one transaction.
  ///
  /// The reference table is maintained outside the case service; this is
  /// the seeding hook used at server start and in tests.
  pub async fn import_geo(&self, entries: Vec<GeoLocalidad>) -> Result<usize> {
    let count = entries.len();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for e in &entries {
          tx.execute(
            "INSERT INTO geo_localidades (
               id_geo, departamento, localidad, departamento_norm, localidad_norm,
               lat, lon, activo
             ) VALUES (
               :id_geo, :departamento, :localidad, :departamento_norm, :localidad_norm,
               :lat, :lon, :activo
             )
             ON CONFLICT(id_geo) DO UPDATE SET
               departamento      = excluded.departamento,
               localidad         = excluded.localidad,
               departamento_norm = excluded.departamento_norm,
               localidad_norm    = excluded.localidad_norm,
               lat               = excluded.lat,
               lon               = excluded.lon,
               activo            = excluded.activo",
            named_params! {
              ":id_geo":            e.id_geo,
              ":departamento":      e.departamento,
              ":localidad":         e.localidad,
              ":departamento_norm": geo::normalize(&e.departamento),
              ":localidad_norm":    geo::normalize(&e.localidad),
              ":lat":               encode_decimal(e.lat),
              ":lon":               encode_decimal(e.lon),
              ":activo":            e.activo,
            },
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::info!(count, "geo reference entries imported");
    Ok(count)
  }
}

/// Append one audit event. Runs inside the caller's transaction.
fn insert_evento(
  conn: &rusqlite::Connection,
  evento: &Evento,
  metadata_json: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO gestiones_eventos (
       id_evento, id_gestion, fecha_evento, usuario, rol_usuario, tipo_evento,
       estado_anterior, estado_nuevo, campo_modificado, valor_anterior,
       valor_nuevo, comentario, metadata_json
     ) VALUES (
       :id_evento, :id_gestion, :fecha_evento, :usuario, :rol_usuario, :tipo_evento,
       :estado_anterior, :estado_nuevo, :campo_modificado, :valor_anterior,
       :valor_nuevo, :comentario, :metadata_json
     )",
    named_params! {
      ":id_evento":        encode_uuid(evento.id_evento),
      ":id_gestion":       encode_uuid(evento.id_gestion),
      ":fecha_evento":     encode_dt(evento.fecha_evento),
      ":usuario":          evento.usuario,
      ":rol_usuario":      evento.rol_usuario.as_ref(),
      ":tipo_evento":      evento.tipo_evento.as_ref(),
      ":estado_anterior":  evento.estado_anterior,
      ":estado_nuevo":     evento.estado_nuevo,
      ":campo_modificado": evento.campo_modificado,
      ":valor_anterior":   evento.valor_anterior,
      ":valor_nuevo":      evento.valor_nuevo,
      ":comentario":       evento.comentario,
      ":metadata_json":    metadata_json,
    },
  )?;
  Ok(())
}

/// Recompute the folded search text of one case from its stored columns.
/// Runs inside the caller's transaction, after the row is written.
fn refresh_busqueda(conn: &rusqlite::Connection, id_gestion: &str) -> rusqlite::Result<()> {
  let fields: Vec<Option<String>> = conn.query_row(
    &format!("SELECT {SEARCH_COLUMNS} FROM gestiones WHERE id_gestion = ?1"),
    [id_gestion],
    |row| (0..row.as_ref().column_count()).map(|i| row.get(i)).collect(),
  )?;
  let busqueda = fields
    .iter()
    .flatten()
    .map(|f| geo::normalize(f))
    .collect::<Vec<_>>()
    .join("\u{1f}");
  conn.execute(
    "UPDATE gestiones SET busqueda = ?1 WHERE id_gestion = ?2",
    rusqlite::params![busqueda, id_gestion],
  )?;
  Ok(())
}

/// Owned, encoded values for [`GESTION_FILTER`].
struct FilterParams {
  estado:       Option<String>,
  ministerio:   Option<String>,
  categoria:    Option<String>,
  departamento: Option<String>,
  localidad:    Option<String>,
  q:            Option<String>,
}

impl FilterParams {
  fn new(filter: &GestionFilter) -> Self {
    Self {
      estado:       filter.estado.clone(),
      ministerio:   filter.ministerio.clone(),
      categoria:    filter.categoria.clone(),
      departamento: filter.departamento.clone(),
      localidad:    filter.localidad.clone(),
      q:            filter.q.as_deref().map(|q| like_pattern(&geo::normalize(q))),
    }
  }

  fn bind(&self) -> Vec<(&'static str, &dyn ToSql)> {
    vec![
      (":estado", &self.estado as &dyn ToSql),
      (":ministerio", &self.ministerio),
      (":categoria", &self.categoria),
      (":departamento", &self.departamento),
      (":localidad", &self.localidad),
      (":q", &self.q),
    ]
  }
}

/// Trimmed patch value. `Some("")` reaches SQL as a blank, which the
/// update turns into NULL for nullable columns.
fn trimmed(value: &Option<String>) -> Option<String> {
  value.as_deref().map(|v| v.trim().to_owned())
}

// ─── GestionStore impl ───────────────────────────────────────────────────────

impl GestionStore for SqliteStore {
  type Error = Error;

  // ── Geo reference ─────────────────────────────────────────────────────────

  async fn find_geo(&self, departamento: &str, localidad: &str) -> Result<Vec<GeoLocalidad>> {
    let departamento = departamento.to_owned();
    let localidad    = localidad.to_owned();

    let raws: Vec<RawGeo> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT id_geo, departamento, localidad, lat, lon, activo
           FROM geo_localidades
           WHERE activo = 1
             AND departamento_norm = ?1
             AND localidad_norm    = ?2
           ORDER BY id_geo
           LIMIT 2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![departamento, localidad], |row| {
            Ok(RawGeo {
              id_geo:       row.get(0)?,
              departamento: row.get(1)?,
              localidad:    row.get(2)?,
              lat:          row.get(3)?,
              lon:          row.get(4)?,
              activo:       row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawGeo::into_geo).collect()
  }

  async fn list_departamentos(&self) -> Result<Vec<String>> {
    let names = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT MIN(departamento)
           FROM geo_localidades
           WHERE activo = 1
           GROUP BY departamento_norm
           ORDER BY departamento_norm",
        )?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(names)
  }

  async fn list_localidades(&self, departamento: &str) -> Result<Vec<String>> {
    let departamento = departamento.to_owned();

    let names = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT MIN(localidad)
           FROM geo_localidades
           WHERE activo = 1 AND departamento_norm = ?1
           GROUP BY localidad_norm
           ORDER BY localidad_norm",
        )?;
        let rows = stmt
          .query_map([departamento], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(names)
  }

  // ── Case writes ────────────────────────────────────────────────────────

  async fn insert_gestion(&self, gestion: Gestion, evento: Evento) -> Result<()> {
    let metadata_json = serde_json::to_string(&evento.metadata)?;

    self
      .conn
      .call(move |conn| {
        let g  = &gestion;
        let ub = g.ubicacion.as_ref();
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO gestiones (
             id_gestion, nro_expediente, origen, estado, urgencia,
             fecha_ingreso, fecha_estado, fecha_finalizacion,
             ministerio_agencia_id, organismo_id, derivado_a_id,
             categoria_general_id, subcategoria_id, tipo_demanda_principal_id,
             subtipo_detalle, detalle, observaciones, direccion,
             departamento, localidad, departamento_norm, localidad_norm,
             geo_id, lat, lon, costo_estimado, costo_moneda,
             created_at, created_by, updated_at, updated_by, is_deleted
           ) VALUES (
             :id_gestion, :nro_expediente, :origen, :estado, :urgencia,
             :fecha_ingreso, :fecha_estado, :fecha_finalizacion,
             :ministerio_agencia_id, :organismo_id, :derivado_a_id,
             :categoria_general_id, :subcategoria_id, :tipo_demanda_principal_id,
             :subtipo_detalle, :detalle, :observaciones, :direccion,
             :departamento, :localidad, :departamento_norm, :localidad_norm,
             :geo_id, :lat, :lon, :costo_estimado, :costo_moneda,
             :created_at, :created_by, :updated_at, :updated_by, 0
           )",
          named_params! {
            ":id_gestion":                encode_uuid(g.id_gestion),
            ":nro_expediente":            g.nro_expediente,
            ":origen":                    g.origen,
            ":estado":                    g.estado,
            ":urgencia":                  g.urgencia,
            ":fecha_ingreso":             encode_date(g.fecha_ingreso),
            ":fecha_estado":              encode_dt(g.fecha_estado),
            ":fecha_finalizacion":        g.fecha_finalizacion.map(encode_date),
            ":ministerio_agencia_id":     g.ministerio_agencia_id,
            ":organismo_id":              g.organismo_id,
            ":derivado_a_id":             g.derivado_a_id,
            ":categoria_general_id":      g.categoria_general_id,
            ":subcategoria_id":           g.subcategoria_id,
            ":tipo_demanda_principal_id": g.tipo_demanda_principal_id,
            ":subtipo_detalle":           g.subtipo_detalle,
            ":detalle":                   g.detalle,
            ":observaciones":             g.observaciones,
            ":direccion":                 g.direccion,
            ":departamento":              ub.map(|u| u.departamento.as_str()),
            ":localidad":                 ub.map(|u| u.localidad.as_str()),
            ":departamento_norm":         ub.map(|u| geo::normalize(&u.departamento)),
            ":localidad_norm":            ub.map(|u| geo::normalize(&u.localidad)),
            ":geo_id":                    ub.map(|u| u.geo_id.as_str()),
            ":lat":                       ub.map(|u| encode_decimal(u.lat)),
            ":lon":                       ub.map(|u| encode_decimal(u.lon)),
            ":costo_estimado":            g.costo_estimado.map(encode_decimal),
            ":costo_moneda":              g.costo_moneda,
            ":created_at":                encode_dt(g.created_at),
            ":created_by":                g.created_by,
            ":updated_at":                encode_dt(g.updated_at),
            ":updated_by":                g.updated_by,
          },
        )?;
        refresh_busqueda(&tx, &encode_uuid(g.id_gestion))?;
        insert_evento(&tx, &evento, &metadata_json)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn update_gestion(
    &self,
    id:      Uuid,
    changes: GestionChanges,
    evento:  Evento,
  ) -> Result<bool> {
    let metadata_json = serde_json::to_string(&evento.metadata)?;
    let id_str        = encode_uuid(id);

    let applied = self
      .conn
      .call(move |conn| {
        let p  = &changes.patch;
        let ub = changes.ubicacion.as_ref();
        let tx = conn.transaction()?;
        let updated = tx.execute(
          "UPDATE gestiones SET
             ministerio_agencia_id = COALESCE(:ministerio_agencia_id, ministerio_agencia_id),
             categoria_general_id  = COALESCE(:categoria_general_id, categoria_general_id),
             subcategoria_id       = CASE WHEN :subcategoria_id IS NULL THEN subcategoria_id
                                          ELSE NULLIF(:subcategoria_id, '') END,
             tipo_demanda_principal_id =
               CASE WHEN :tipo_demanda_principal_id IS NULL THEN tipo_demanda_principal_id
                    ELSE NULLIF(:tipo_demanda_principal_id, '') END,
             subtipo_detalle       = CASE WHEN :subtipo_detalle IS NULL THEN subtipo_detalle
                                          ELSE NULLIF(:subtipo_detalle, '') END,
             organismo_id          = CASE WHEN :organismo_id IS NULL THEN organismo_id
                                          ELSE NULLIF(:organismo_id, '') END,
             nro_expediente        = CASE WHEN :nro_expediente IS NULL THEN nro_expediente
                                          ELSE NULLIF(:nro_expediente, '') END,
             detalle               = COALESCE(:detalle, detalle),
             observaciones         = CASE WHEN :observaciones IS NULL THEN observaciones
                                          ELSE NULLIF(:observaciones, '') END,
             urgencia              = COALESCE(:urgencia, urgencia),
             direccion             = CASE WHEN :direccion IS NULL THEN direccion
                                          ELSE NULLIF(:direccion, '') END,
             departamento          = COALESCE(:departamento, departamento),
             localidad             = COALESCE(:localidad, localidad),
             departamento_norm     = COALESCE(:departamento_norm, departamento_norm),
             localidad_norm        = COALESCE(:localidad_norm, localidad_norm),
             geo_id                = COALESCE(:geo_id, geo_id),
             lat                   = COALESCE(:lat, lat),
             lon                   = COALESCE(:lon, lon),
             costo_estimado        = COALESCE(:costo_estimado, costo_estimado),
             costo_moneda          = CASE WHEN :costo_moneda IS NULL THEN costo_moneda
                                          ELSE NULLIF(:costo_moneda, '') END,
             updated_at            = :updated_at,
             updated_by            = :updated_by
           WHERE id_gestion = :id_gestion AND is_deleted = 0",
          named_params! {
            ":ministerio_agencia_id": trimmed(&p.ministerio_agencia_id),
            ":categoria_general_id":  trimmed(&p.categoria_general_id),
            ":subcategoria_id":       trimmed(&p.subcategoria_id),
            ":tipo_demanda_principal_id": trimmed(&p.tipo_demanda_principal_id),
            ":subtipo_detalle":       trimmed(&p.subtipo_detalle),
            ":organismo_id":          trimmed(&p.organismo_id),
            ":nro_expediente":        trimmed(&p.nro_expediente),
            ":detalle":               trimmed(&p.detalle),
            ":observaciones":         trimmed(&p.observaciones),
            ":urgencia":              trimmed(&p.urgencia),
            ":direccion":             trimmed(&p.direccion),
            ":departamento":          ub.map(|u| u.departamento.as_str()),
            ":localidad":             ub.map(|u| u.localidad.as_str()),
            ":departamento_norm":     ub.map(|u| geo::normalize(&u.departamento)),
            ":localidad_norm":        ub.map(|u| geo::normalize(&u.localidad)),
            ":geo_id":                ub.map(|u| u.geo_id.as_str()),
            ":lat":                   ub.map(|u| encode_decimal(u.lat)),
            ":lon":                   ub.map(|u| encode_decimal(u.lon)),
            ":costo_estimado":        p.costo_estimado.map(encode_decimal),
            ":costo_moneda":          trimmed(&p.costo_moneda),
            ":updated_at":            encode_dt(changes.updated_at),
            ":updated_by":            changes.updated_by,
            ":id_gestion":            id_str,
          },
        )?;
        if updated == 0 {
          return Ok(false);
        }
        refresh_busqueda(&tx, &id_str)?;
        insert_evento(&tx, &evento, &metadata_json)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;
    Ok(applied)
  }

  async fn update_estado(&self, id: Uuid, write: EstadoWrite, evento: Evento) -> Result<bool> {
    let metadata_json = serde_json::to_string(&evento.metadata)?;
    let id_str        = encode_uuid(id);

    let applied = self
      .conn
      .call(move |conn| {
        let (set_derivado, derivado) = match &write.derivado_a_id {
          Some(target) => (true, target.clone()),
          None         => (false, None),
        };
        let tx = conn.transaction()?;
        let updated = tx.execute(
          "UPDATE gestiones SET
             estado             = :estado_nuevo,
             fecha_estado       = :fecha_estado,
             fecha_finalizacion = COALESCE(fecha_finalizacion, :fecha_finalizacion),
             derivado_a_id      = CASE WHEN :set_derivado THEN :derivado_a_id
                                       ELSE derivado_a_id END,
             updated_at         = :fecha_estado,
             updated_by         = :updated_by
           WHERE id_gestion = :id_gestion
             AND is_deleted = 0
             AND estado     = :estado_anterior",
          named_params! {
            ":estado_nuevo":       write.estado_nuevo,
            ":fecha_estado":       encode_dt(write.fecha_estado),
            ":fecha_finalizacion": write.fecha_finalizacion.map(encode_date),
            ":set_derivado":       set_derivado,
            ":derivado_a_id":      derivado,
            ":updated_by":         write.updated_by,
            ":id_gestion":         id_str,
            ":estado_anterior":    write.estado_anterior,
          },
        )?;
        if updated == 0 {
          return Ok(false);
        }
        insert_evento(&tx, &evento, &metadata_json)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;
    Ok(applied)
  }

  async fn soft_delete(&self, id: Uuid, tombstone: Tombstone, evento: Evento) -> Result<bool> {
    let metadata_json = serde_json::to_string(&evento.metadata)?;
    let id_str        = encode_uuid(id);
    let at_str        = encode_dt(tombstone.deleted_at);

    let applied = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let updated = tx.execute(
          "UPDATE gestiones
           SET is_deleted = 1, updated_at = ?1, updated_by = ?2
           WHERE id_gestion = ?3 AND is_deleted = 0",
          rusqlite::params![at_str, tombstone.deleted_by, id_str],
        )?;
        if updated == 0 {
          return Ok(false);
        }
        insert_evento(&tx, &evento, &metadata_json)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;
    Ok(applied)
  }

  // ── Case reads ──────────────────────────────────────────────────────────

  async fn get_gestion(&self, id: Uuid) -> Result<Option<Gestion>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawGestion> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {GESTION_COLUMNS} FROM gestiones
               WHERE id_gestion = ?1 AND is_deleted = 0"
            ),
            rusqlite::params![id_str],
            RawGestion::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawGestion::into_gestion).transpose()
  }

  async fn list_gestiones(&self, query: &GestionQuery) -> Result<Vec<Gestion>> {
    let params = FilterParams::new(&query.filter);
    let limit  = i64::try_from(query.limit).unwrap_or(i64::MAX);
    let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);

    let raws: Vec<RawGestion> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {GESTION_COLUMNS} FROM gestiones
           {GESTION_FILTER}
           ORDER BY fecha_ingreso DESC, created_at DESC, id_gestion DESC
           LIMIT :limit OFFSET :offset"
        );
        let mut bound = params.bind();
        bound.push((":limit", &limit as &dyn ToSql));
        bound.push((":offset", &offset as &dyn ToSql));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(bound.as_slice(), RawGestion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawGestion::into_gestion).collect()
  }

  async fn count_gestiones(&self, filter: &GestionFilter) -> Result<u64> {
    let params = FilterParams::new(filter);

    let total: i64 = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT COUNT(1) FROM gestiones {GESTION_FILTER}");
        Ok(conn.query_row(&sql, params.bind().as_slice(), |row| row.get(0))?)
      })
      .await?;

    Ok(u64::try_from(total).unwrap_or_default())
  }

  // ── Events ────────────────────────────────────────────────────────────────

  async fn list_eventos(&self, id_gestion: Uuid, limit: usize) -> Result<Vec<Evento>> {
    let id_str = encode_uuid(id_gestion);
    let limit  = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawEvento> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {EVENTO_COLUMNS} FROM gestiones_eventos
           WHERE id_gestion = ?1
           ORDER BY fecha_evento DESC, rowid DESC
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str, limit], RawEvento::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvento::into_evento).collect()
  }
}
