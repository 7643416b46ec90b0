//! SQL schema for the durable subtitle index (§4.5).

/// The `index_entries` table: one row per indexed episode subtitle.
///
/// `embedding` is the raw little-endian float32 blob (`4 * 384` bytes,
/// §3/§4.5); it is `NULL` until migration backfills it.
pub const CREATE_INDEX_ENTRIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS index_entries (
    id TEXT PRIMARY KEY NOT NULL,
    series TEXT NOT NULL,
    season INTEGER NOT NULL,
    episode INTEGER NOT NULL,
    episode_name TEXT,
    clean_text TEXT NOT NULL,
    source_format TEXT NOT NULL,
    ctph_hash TEXT NOT NULL,
    embedding BLOB,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
)
"#;

pub const CREATE_SERIES_SEASON_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_index_entries_series_season
ON index_entries(series, season)
"#;

pub const CREATE_MIGRATION_CURSOR_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_index_entries_id_pending_embedding
ON index_entries(id)
WHERE embedding IS NULL
"#;

/// Statements run once, in order, against a freshly opened database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_INDEX_ENTRIES_TABLE,
    CREATE_SERIES_SEASON_INDEX,
    CREATE_MIGRATION_CURSOR_INDEX,
];
