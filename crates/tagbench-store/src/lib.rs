//! tagbench entity store
//!
//! A thin, instrumented layer over an embedded SQLite database holding the
//! benchmark tables:
//!
//! ```text
//! kinds ◄──────────── tag_generic (kind_id, entity_id)      no FK on entity_id
//!
//! profile_a ◄──┐
//! profile_b ◄──┼───── tag_explicit (profile_{a,b,c,d}_id)   FK, ON DELETE CASCADE
//! profile_c ◄──┤
//! profile_d ◄──┘
//!     ▲
//!     └────────────── profile_b_extra (profile_b_id UNIQUE)  one-to-one satellite
//! ```
//!
//! ## Key Features
//!
//! - **Bulk insert**: multi-row `INSERT ... RETURNING id`, one round trip per chunk
//! - **Point and grouped lookups** generic over [`EntityRecord`]
//! - **Joined tag reads** for single-round-trip loading
//! - **Round-trip capture**: every statement goes through an [`ActivityLog`];
//!   [`Store::capture`] scopes a count

pub mod activity;
pub mod records;


pub use activity::{ActivityLog, CapturedQueries, QueryCapture};
pub use records::*;

use rusqlite::{params_from_iter, Connection, OptionalExtension, Params, Row};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bulk insert into {table} returned {actual} ids for {expected} rows")]
    IdMismatch {
        table: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a [`Store`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file to open. `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// Reject explicit tags with more than one populated link.
    pub enforce_single_link: bool,
    /// Rows per multi-row INSERT statement.
    pub insert_chunk_rows: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            enforce_single_link: true,
            insert_chunk_rows: 500,
        }
    }
}

/// Upper bound on bound parameters per grouped lookup.
const MAX_IN_PARAMS: usize = 30_000;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kinds (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    app_label TEXT    NOT NULL,
    model     TEXT    NOT NULL,
    UNIQUE (app_label, model)
);
CREATE TABLE IF NOT EXISTS profile_a (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT    NOT NULL,
    age  INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS profile_b (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  TEXT    NOT NULL,
    email TEXT    NOT NULL
);
CREATE TABLE IF NOT EXISTS profile_b_extra (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    info         TEXT    NOT NULL,
    profile_b_id INTEGER NOT NULL UNIQUE REFERENCES profile_b(id) ON DELETE CASCADE
);
CREATE TABLE IF NOT EXISTS profile_c (
    id      INTEGER PRIMARY KEY AUTOINCREMENT,
    name    TEXT    NOT NULL,
    address TEXT    NOT NULL
);
CREATE TABLE IF NOT EXISTS profile_d (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  TEXT    NOT NULL,
    phone TEXT    NOT NULL
);
CREATE TABLE IF NOT EXISTS tag_generic (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    kind_id   INTEGER NOT NULL REFERENCES kinds(id) ON DELETE CASCADE,
    entity_id INTEGER NOT NULL CHECK (entity_id >= 0)
);
CREATE INDEX IF NOT EXISTS tag_generic_kind_entity ON tag_generic (kind_id, entity_id);
";

fn explicit_tag_ddl(enforce_single_link: bool) -> String {
    let single_link = if enforce_single_link {
        ",
    CHECK ((profile_a_id IS NOT NULL) + (profile_b_id IS NOT NULL)
         + (profile_c_id IS NOT NULL) + (profile_d_id IS NOT NULL) <= 1)"
    } else {
        ""
    };
    format!(
        "CREATE TABLE IF NOT EXISTS tag_explicit (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    profile_a_id INTEGER REFERENCES profile_a(id) ON DELETE CASCADE,
    profile_b_id INTEGER REFERENCES profile_b(id) ON DELETE CASCADE,
    profile_c_id INTEGER REFERENCES profile_c(id) ON DELETE CASCADE,
    profile_d_id INTEGER REFERENCES profile_d(id) ON DELETE CASCADE{single_link}
);
CREATE INDEX IF NOT EXISTS tag_explicit_profile_a ON tag_explicit (profile_a_id);
CREATE INDEX IF NOT EXISTS tag_explicit_profile_b ON tag_explicit (profile_b_id);
CREATE INDEX IF NOT EXISTS tag_explicit_profile_c ON tag_explicit (profile_c_id);
CREATE INDEX IF NOT EXISTS tag_explicit_profile_d ON tag_explicit (profile_d_id);"
    )
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

// ============================================================================
// Store
// ============================================================================

/// The entity store. Single-connection and synchronous.
pub struct Store {
    conn: Connection,
    config: StoreConfig,
    activity: ActivityLog,
}

impl Store {
    /// Open the store described by `config` and create the schema.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let conn = match &config.path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Connection::open(path)?
            }
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch(&explicit_tag_ddl(config.enforce_single_link))?;

        tracing::debug!(
            path = ?config.path,
            enforce_single_link = config.enforce_single_link,
            "opened store"
        );

        Ok(Self {
            conn,
            config,
            activity: ActivityLog::new(),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(StoreConfig::default())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    /// Start a round-trip capture scope.
    pub fn capture(&self) -> QueryCapture<'_> {
        self.activity.capture()
    }

    // ------------------------------------------------------------------------
    // Statement plumbing (each call is one round trip)
    // ------------------------------------------------------------------------

    fn query_all<T, P, F>(&self, sql: &str, params: P, f: F) -> StoreResult<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.activity.record(sql);
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt
            .query_map(params, f)?
            .collect::<rusqlite::Result<Vec<T>>>()?;
        Ok(rows)
    }

    fn query_opt<T, P, F>(&self, sql: &str, params: P, f: F) -> StoreResult<Option<T>>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        self.activity.record(sql);
        let mut stmt = self.conn.prepare_cached(sql)?;
        Ok(stmt.query_row(params, f).optional()?)
    }

    fn execute<P: Params>(&self, sql: &str, params: P) -> StoreResult<usize> {
        self.activity.record(sql);
        let mut stmt = self.conn.prepare_cached(sql)?;
        Ok(stmt.execute(params)?)
    }

    fn select_in<R: Record>(&self, column: &str, ids: &[i64]) -> StoreResult<Vec<R>> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IN_PARAMS) {
            let sql = format!(
                "SELECT {} FROM {} WHERE {column} IN ({}) ORDER BY id",
                R::FIELDS.join(", "),
                R::TABLE,
                placeholders(chunk.len())
            );
            out.extend(self.query_all(&sql, params_from_iter(chunk.iter()), |row| {
                R::decode(row, 0)
            })?);
        }
        Ok(out)
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Insert all `rows` and return their assigned ids, in input order.
    pub fn bulk_insert<R: NewRecord>(&self, rows: &[R]) -> StoreResult<Vec<i64>> {
        // keep each statement under the bound-parameter ceiling
        let chunk_rows = self
            .config
            .insert_chunk_rows
            .min(MAX_IN_PARAMS / R::FIELDS.len().max(1))
            .max(1);
        let row_sql = format!("({})", placeholders(R::FIELDS.len()));
        let mut ids = Vec::with_capacity(rows.len());

        for chunk in rows.chunks(chunk_rows) {
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {} RETURNING id",
                R::TABLE,
                R::FIELDS.join(", "),
                vec![row_sql.as_str(); chunk.len()].join(", ")
            );
            let values: Vec<_> = chunk.iter().flat_map(|row| row.values()).collect();
            // AUTOINCREMENT ids grow in VALUES order; RETURNING order is not guaranteed.
            let mut chunk_ids: Vec<i64> =
                self.query_all(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
            chunk_ids.sort_unstable();
            ids.extend(chunk_ids);
        }

        if ids.len() != rows.len() {
            return Err(StoreError::IdMismatch {
                table: R::TABLE,
                expected: rows.len(),
                actual: ids.len(),
            });
        }
        tracing::debug!(table = R::TABLE, rows = rows.len(), "bulk insert");
        Ok(ids)
    }

    /// Get or create the kind metadata row for `(app_label, model)`.
    pub fn register_kind(&self, app_label: &str, model: &str) -> StoreResult<KindRow> {
        let sql = "INSERT INTO kinds (app_label, model) VALUES (?1, ?2)
                   ON CONFLICT (app_label, model) DO UPDATE SET model = excluded.model
                   RETURNING id, app_label, model";
        let row = self.query_opt(sql, [app_label, model], |row| KindRow::decode(row, 0))?;
        row.ok_or(StoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Delete one profile; cascades to its explicit tags and extension.
    pub fn delete<R: EntityRecord>(&self, id: EntityId) -> StoreResult<usize> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", R::TABLE);
        self.execute(&sql, [id])
    }

    // ------------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------------

    /// Point lookup by identity. Absent rows are `None`.
    pub fn get<R: EntityRecord>(&self, id: EntityId) -> StoreResult<Option<R>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            R::FIELDS.join(", "),
            R::TABLE
        );
        self.query_opt(&sql, [id], |row| R::decode(row, 0))
    }

    /// Grouped lookup: every row of `R` whose id is in `ids`, ordered by id.
    /// An empty `ids` issues no round trip.
    pub fn get_many<R: EntityRecord>(&self, ids: &[EntityId]) -> StoreResult<Vec<R>> {
        self.select_in::<R>("id", ids)
    }

    /// The extension of one `profile_b`, if it has one.
    pub fn extra_for(&self, profile_b_id: EntityId) -> StoreResult<Option<ProfileBExtra>> {
        let sql = "SELECT id, info, profile_b_id FROM profile_b_extra WHERE profile_b_id = ?1";
        self.query_opt(sql, [profile_b_id], |row| ProfileBExtra::decode(row, 0))
    }

    /// Extensions of every listed `profile_b`, in one round trip.
    pub fn extras_for(&self, profile_b_ids: &[EntityId]) -> StoreResult<Vec<ProfileBExtra>> {
        self.select_in::<ProfileBExtra>("profile_b_id", profile_b_ids)
    }

    /// A `profile_b` with its extension left-joined, in one round trip.
    pub fn profile_b_with_extra(
        &self,
        id: EntityId,
    ) -> StoreResult<Option<(ProfileB, Option<ProfileBExtra>)>> {
        let sql = format!(
            "SELECT {}, {} FROM profile_b b
             LEFT JOIN profile_b_extra x ON x.profile_b_id = b.id
             WHERE b.id = ?1",
            ProfileB::qualified_fields("b"),
            ProfileBExtra::qualified_fields("x"),
        );
        let width = ProfileB::FIELDS.len();
        self.query_opt(&sql, [id], |row| {
            Ok((ProfileB::decode(row, 0)?, ProfileBExtra::decode_joined(row, width)?))
        })
    }

    pub fn kind(&self, id: KindId) -> StoreResult<Option<KindRow>> {
        let sql = "SELECT id, app_label, model FROM kinds WHERE id = ?1";
        self.query_opt(sql, [id], |row| KindRow::decode(row, 0))
    }

    pub fn kinds_by_ids(&self, ids: &[KindId]) -> StoreResult<Vec<KindRow>> {
        self.select_in::<KindRow>("id", ids)
    }

    /// Number of rows in `R`'s table.
    pub fn count<R: Record>(&self) -> StoreResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", R::TABLE);
        Ok(self.query_opt(&sql, [], |row| row.get(0))?.unwrap_or(0))
    }

    // ------------------------------------------------------------------------
    // Tag batches
    // ------------------------------------------------------------------------

    pub fn generic_tags(&self) -> StoreResult<Vec<GenericTag>> {
        let sql = "SELECT id, kind_id, entity_id FROM tag_generic ORDER BY id";
        self.query_all(sql, [], |row| GenericTag::decode(row, 0))
    }

    /// Generic tags joined with their kind metadata, in one round trip.
    pub fn generic_tags_with_kinds(&self) -> StoreResult<Vec<(GenericTag, KindRow)>> {
        let sql = format!(
            "SELECT {}, {} FROM tag_generic t
             INNER JOIN kinds k ON k.id = t.kind_id
             ORDER BY t.id",
            GenericTag::qualified_fields("t"),
            KindRow::qualified_fields("k"),
        );
        let width = GenericTag::FIELDS.len();
        self.query_all(&sql, [], |row| {
            Ok((GenericTag::decode(row, 0)?, KindRow::decode(row, width)?))
        })
    }

    pub fn explicit_tags(&self) -> StoreResult<Vec<ExplicitTag>> {
        let sql = "SELECT id, profile_a_id, profile_b_id, profile_c_id, profile_d_id
                   FROM tag_explicit ORDER BY id";
        self.query_all(sql, [], |row| ExplicitTag::decode(row, 0))
    }

    /// Explicit tags left-joined with every kind table (and the `profile_b`
    /// extension when `with_extra`), in one round trip.
    pub fn explicit_tags_joined(&self, with_extra: bool) -> StoreResult<Vec<JoinedExplicitTag>> {
        let mut columns = vec![
            ExplicitTag::qualified_fields("t"),
            ProfileA::qualified_fields("a"),
            ProfileB::qualified_fields("b"),
            ProfileC::qualified_fields("c"),
            ProfileD::qualified_fields("d"),
        ];
        let mut joins = String::from(
            "LEFT JOIN profile_a a ON a.id = t.profile_a_id
             LEFT JOIN profile_b b ON b.id = t.profile_b_id
             LEFT JOIN profile_c c ON c.id = t.profile_c_id
             LEFT JOIN profile_d d ON d.id = t.profile_d_id",
        );
        if with_extra {
            columns.push(ProfileBExtra::qualified_fields("x"));
            joins.push_str("\n             LEFT JOIN profile_b_extra x ON x.profile_b_id = b.id");
        }
        let sql = format!(
            "SELECT {} FROM tag_explicit t
             {joins}
             ORDER BY t.id",
            columns.join(", ")
        );

        let a_at = ExplicitTag::FIELDS.len();
        let b_at = a_at + ProfileA::FIELDS.len();
        let c_at = b_at + ProfileB::FIELDS.len();
        let d_at = c_at + ProfileC::FIELDS.len();
        let x_at = d_at + ProfileD::FIELDS.len();

        self.query_all(&sql, [], |row| {
            let entities = [
                ProfileA::decode_joined(row, a_at)?.map(Entity::from),
                ProfileB::decode_joined(row, b_at)?.map(Entity::from),
                ProfileC::decode_joined(row, c_at)?.map(Entity::from),
                ProfileD::decode_joined(row, d_at)?.map(Entity::from),
            ];
            let extra = if with_extra {
                Some(ProfileBExtra::decode_joined(row, x_at)?)
            } else {
                None
            };
            Ok(JoinedExplicitTag {
                tag: ExplicitTag::decode(row, 0)?,
                entities: entities.into_iter().flatten().collect(),
                extra,
            })
        })
    }
}
