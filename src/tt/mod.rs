//! Transposition-table types shared between the search and the cluster layer.
//!
//! The table itself belongs to the search subsystem. The cluster layer only
//! hands it candidate entries through [`TranspositionTable::save`]; whether an
//! entry is kept is decided by the table's own replacement rule.

pub mod table;

pub use table::SharedTable;

/// Full position identity key.
pub type Key = u64;
/// Encoded action identifier. `MOVE_NONE` means "no move".
pub type Move = u16;
/// Search score in engine units.
pub type Value = i32;
/// Search depth in plies.
pub type Depth = i32;

pub const MOVE_NONE: Move = 0;

/// Bound classification of a stored score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Bound {
    #[default]
    None,
    /// Score is an upper bound (fail low).
    Upper,
    /// Score is a lower bound (fail high).
    Lower,
    /// Score is exact.
    Exact,
}

/// Payload of one transposition-table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TtEntry {
    pub bound: Bound,
    pub depth: Depth,
    pub value: Value,
    /// Whether the position was on a principal variation when stored.
    pub is_pv: bool,
    pub mv: Move,
    /// Static evaluation of the position.
    pub eval: Value,
}

impl TtEntry {
    pub fn new(bound: Bound, depth: Depth, value: Value, is_pv: bool, mv: Move, eval: Value) -> Self {
        Self {
            bound,
            depth,
            value,
            is_pv,
            mv,
            eval,
        }
    }
}

/// A table entry together with its full key, so the receiving rank can store it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyedEntry {
    pub key: Key,
    pub entry: TtEntry,
}

impl KeyedEntry {
    pub fn new(key: Key, entry: TtEntry) -> Self {
        Self { key, entry }
    }

    #[inline]
    pub fn depth(&self) -> Depth {
        self.entry.depth
    }
}

/// The local key -> result cache consulted by the search.
///
/// Implementations must already be safe under many concurrent local writers;
/// gossip merges arrive as just another writer.
pub trait TranspositionTable: Send + Sync {
    /// Offer an entry. Returns `true` if the table kept it.
    fn save(&self, key: Key, entry: TtEntry) -> bool;

    fn probe(&self, key: Key) -> Option<TtEntry>;

    /// Number of occupied slots.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
