//! Search and evaluation for Citadel.
//!
//! Iterative-deepening PVS alpha-beta over `citadel_core`, with a
//! direct-mapped transposition table, quiescence over noisy moves, the
//! usual pruning family (null move, razoring, reverse futility, LMR/LMP,
//! futility), killer/history ordering and aspiration windows. Leaves are
//! scored by either the hand-crafted evaluator or a small quantized
//! network with an incrementally updated accumulator.

pub mod eval;
pub mod nnue;
pub mod search;
pub mod tt;
pub mod zobrist;

/// Sentinel infinity for alpha-beta windows.
pub const INF: i32 = 1_000_000_000;
/// Won-game sentinel; mate-in-n scores count down from here per ply.
pub const MATE: i32 = 100_000_000;
/// Hard ply ceiling for the search stack and per-ply buffers.
pub const MAX_PLY: usize = 256;

pub use eval::{evaluate_position_stm, hce_eval_stm};
pub use nnue::{Accumulator, Nnue, NnueError};
pub use search::{
    EvalBackend, SearchInfo, SearchLimits, SearchOptions, SearchResult, Searcher,
};
pub use tt::{TranspositionTable, TtEntry, TtFlag};
pub use zobrist::{hash_after_make, hash_position};
