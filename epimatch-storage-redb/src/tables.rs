//! redb table definitions for the cache layer.

use redb::TableDefinition;

/// Cached, postcard-encoded `IndexEntry` rows, keyed by entry id (as its
/// string `Uuid` form).
pub const CACHE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("cached_entries");

/// Insertion sequence number per key, used to implement LRU eviction
/// without an in-memory index surviving process restarts.
pub const CACHE_SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("cache_sequence");
