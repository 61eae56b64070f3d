//! Rules core for Citadel, a 9x9 board game of walls and sieges.
//!
//! The crate owns the exact game state ([`Position`]), move generation for
//! all six turn-action kinds, make/undo with full reversibility, attack
//! computation over incrementally maintained bitboards, FEN I/O and perft.
//! Search and evaluation live in the `citadel_engine` crate on top of this
//! one.

pub mod bitboard;
pub mod board;
pub mod fen;
pub mod movegen;
pub mod perft;
pub mod tables;
pub mod types;

pub use bitboard::Bitboard81;
pub use board::{king_ring, NullUndo, Position, Undo};
pub use fen::FenError;
pub use perft::{perft, perft_divide, perft_timed, PerftStats};
pub use types::*;
