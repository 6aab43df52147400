//! Shared collection aliases.

// ═══════════════════════════════════════════════════════════════════════════════
// Hash maps keyed with FxHasher
// ═══════════════════════════════════════════════════════════════════════════════

pub use rustc_hash::FxHashMap;

// ═══════════════════════════════════════════════════════════════════════════════
// IndexMap - insertion ordered, used for property tables and exports
// ═══════════════════════════════════════════════════════════════════════════════

pub type IndexMap<K, V> = indexmap::IndexMap<K, V, core::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

/// Create an empty IndexMap
#[inline]
pub fn index_map_new<K, V>() -> IndexMap<K, V>
where
    K: core::hash::Hash + Eq,
{
    indexmap::IndexMap::with_hasher(Default::default())
}
