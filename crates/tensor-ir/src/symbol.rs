use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(0);

/// Interning table for symbols derived from a parent symbol by a
/// statically-known op configuration. Keyed by (parent id, config
/// fingerprint) so structurally identical derivations share one token.
static DERIVED_SYMBOLS: Lazy<Mutex<HashMap<(u64, u64), DimSymbol>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Opaque token naming a symbolic dimension (e.g. `s3`).
///
/// Tokens compare equal only to themselves; ids come from a process-wide
/// monotonic counter, so two independently created symbols never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimSymbol {
    id: u64,
}

impl DimSymbol {
    /// Allocates a symbol with a fresh, globally unique identity.
    pub fn fresh() -> Self {
        Self {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Returns the interned symbol derived from `parent` by an operation
    /// whose configuration hashes to `fingerprint`.
    ///
    /// Repeated calls with the same arguments return the same token, which
    /// is how shape inference recognizes that two structurally identical
    /// upstream ops produce equal (if unknown) extents.
    pub fn derived(parent: DimSymbol, fingerprint: u64) -> Self {
        let mut table = DERIVED_SYMBOLS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *table
            .entry((parent.id, fingerprint))
            .or_insert_with(DimSymbol::fresh)
    }

    pub fn id(self) -> u64 {
        self.id
    }
}

impl fmt::Display for DimSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.id)
    }
}

pub(crate) fn fnv1a_init() -> u64 {
    0xcbf29ce484222325
}

pub(crate) fn fnv1a_bytes(mut hash: u64, bytes: &[u8]) -> u64 {
    const PRIME: u64 = 0x100000001b3;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

pub(crate) fn fnv1a_u64(hash: u64, value: u64) -> u64 {
    fnv1a_bytes(hash, &value.to_le_bytes())
}
