//! SQL schema for the gestiones SQLite store.
//!
//! Executed once at connection startup. `PRAGMA user_version` records the
//! schema revision for future migrations.

/// Schema revision written by [`SCHEMA`].
pub const SCHEMA_VERSION: i64 = 2;

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Externally owned reference table; read-only for the case service.
CREATE TABLE IF NOT EXISTS geo_localidades (
    id_geo            TEXT PRIMARY KEY,
    departamento      TEXT NOT NULL,
    localidad         TEXT NOT NULL,
    departamento_norm TEXT NOT NULL,   -- trimmed, lower-cased
    localidad_norm    TEXT NOT NULL,
    lat               TEXT NOT NULL,   -- exact decimal text
    lon               TEXT NOT NULL,
    activo            INTEGER NOT NULL DEFAULT 1
);

-- Cases are never physically deleted; is_deleted is a tombstone.
CREATE TABLE IF NOT EXISTS gestiones (
    id_gestion                TEXT PRIMARY KEY,
    nro_expediente            TEXT,
    origen                    TEXT NOT NULL,
    estado                    TEXT NOT NULL,   -- trimmed, upper-cased
    urgencia                  TEXT NOT NULL,
    fecha_ingreso             TEXT NOT NULL,   -- YYYY-MM-DD
    fecha_estado              TEXT NOT NULL,   -- RFC 3339 UTC, microseconds
    fecha_finalizacion        TEXT,
    ministerio_agencia_id     TEXT NOT NULL,
    organismo_id              TEXT,
    derivado_a_id             TEXT,
    categoria_general_id      TEXT NOT NULL,
    subcategoria_id           TEXT,
    tipo_demanda_principal_id TEXT,
    subtipo_detalle           TEXT,
    detalle                   TEXT NOT NULL,
    observaciones             TEXT,
    direccion                 TEXT,
    departamento              TEXT,
    localidad                 TEXT,
    departamento_norm         TEXT,
    localidad_norm            TEXT,
    geo_id                    TEXT,
    lat                       TEXT,
    lon                       TEXT,
    costo_estimado            TEXT,
    costo_moneda              TEXT,
    busqueda                  TEXT NOT NULL DEFAULT '',  -- folded text for `q`
    created_at                TEXT NOT NULL,
    created_by                TEXT NOT NULL,
    updated_at                TEXT NOT NULL,
    updated_by                TEXT NOT NULL,
    is_deleted                INTEGER NOT NULL DEFAULT 0
);

-- Audit events are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS gestiones_eventos (
    id_evento        TEXT PRIMARY KEY,
    id_gestion       TEXT NOT NULL,
    fecha_evento     TEXT NOT NULL,
    usuario          TEXT NOT NULL,
    rol_usuario      TEXT NOT NULL,
    tipo_evento      TEXT NOT NULL,
    estado_anterior  TEXT,
    estado_nuevo     TEXT,
    campo_modificado TEXT,
    valor_anterior   TEXT,
    valor_nuevo      TEXT,
    comentario       TEXT,
    metadata_json    TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS geo_lookup_idx      ON geo_localidades(departamento_norm, localidad_norm);
CREATE INDEX IF NOT EXISTS gestiones_order_idx ON gestiones(fecha_ingreso, created_at);
CREATE INDEX IF NOT EXISTS gestiones_estado_idx ON gestiones(estado);
CREATE INDEX IF NOT EXISTS eventos_gestion_idx ON gestiones_eventos(id_gestion, fecha_evento);

PRAGMA user_version = 2;
";

/// Columns selected for a [`crate::encode::RawGestion`], in field order.
pub const GESTION_COLUMNS: &str = "
    id_gestion, nro_expediente, origen, estado, urgencia,
    fecha_ingreso, fecha_estado, fecha_finalizacion,
    ministerio_agencia_id, organismo_id, derivado_a_id,
    categoria_general_id, subcategoria_id, tipo_demanda_principal_id,
    subtipo_detalle, detalle, observaciones, direccion,
    departamento, localidad, geo_id, lat, lon,
    costo_estimado, costo_moneda,
    created_at, created_by, updated_at, updated_by, is_deleted";

/// Brings a revision 1 file up to [`SCHEMA_VERSION`]. The search column is
/// filled afterwards by the store.
pub const MIGRATE_V1: &str = "
ALTER TABLE gestiones ADD COLUMN busqueda TEXT NOT NULL DEFAULT '';
";

/// Columns folded into `busqueda`, see [`crate::store`].
pub const SEARCH_COLUMNS: &str =
  "id_gestion, nro_expediente, detalle, observaciones, direccion, departamento, localidad";

/// Predicate shared by the list and count queries, so a reported total always
/// agrees with the pages. `:q` is matched against the folded `busqueda`
/// column, so it must already be lower-cased.
pub const GESTION_FILTER: &str = "
    WHERE is_deleted = 0
      AND (:estado       IS NULL OR estado                = :estado)
      AND (:ministerio   IS NULL OR ministerio_agencia_id = :ministerio)
      AND (:categoria    IS NULL OR categoria_general_id  = :categoria)
      AND (:departamento IS NULL OR departamento_norm     = :departamento)
      AND (:localidad    IS NULL OR localidad_norm        = :localidad)
      AND (:q IS NULL OR busqueda LIKE :q ESCAPE '\\')";

/// Columns selected for a [`crate::encode::RawEvento`], in field order.
pub const EVENTO_COLUMNS: &str = "
    id_evento, id_gestion, fecha_evento, usuario, rol_usuario, tipo_evento,
    estado_anterior, estado_nuevo, campo_modificado, valor_anterior,
    valor_nuevo, comentario, metadata_json";
