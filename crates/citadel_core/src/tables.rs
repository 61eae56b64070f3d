//! Pre-computed per-square tables: neighbor lists, rays and Zobrist keys.
//!
//! Everything here is built in const context with a fixed seed, so the
//! tables (and all position hashes) are identical across builds.

use crate::types::{in_bounds, sq, N, SQ_N};

/// The eight ordered directions. Index order: N, S, W, E, NW, NE, SW, SE;
/// the first four are the orthogonals.
pub const DIRS8: [(i32, i32); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (-1, 1),
    (1, -1),
    (1, 1),
];

/// Orthogonal directions only.
pub const DIRS4: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];

pub const KNIGHT_JUMPS: [(i32, i32); 8] = [
    (-2, -1),
    (-2, 1),
    (-1, -2),
    (-1, 2),
    (1, -2),
    (1, 2),
    (2, -1),
    (2, 1),
];

pub struct Tables {
    pub is_keep: [bool; SQ_N],

    pub knight_count: [u8; SQ_N],
    pub knight_targets: [[u8; 8]; SQ_N],

    pub king_count: [u8; SQ_N],
    pub king_targets: [[u8; 8]; SQ_N],

    /// Rays for sliding pieces: up to 8 squares per direction, nearest first.
    pub ray_len: [[u8; 8]; SQ_N],
    pub ray: [[[u8; 8]; 8]; SQ_N],

    // Zobrist keys for Position's own hash (repetition detection lane).
    pub piece_keys: [[[u64; SQ_N]; 6]; 2],
    pub wall_keys: [[[u64; SQ_N]; 2]; 2],
    pub turn_key: u64,
    pub bastion_keys: [u64; 2],
    pub wall_built_keys: [u64; 2],
}

/// splitmix64 step: returns `(output, next_state)`.
pub(crate) const fn splitmix64(state: u64) -> (u64, u64) {
    let s = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = s;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    (z ^ (z >> 31), s)
}

const fn build_tables() -> Tables {
    let mut t = Tables {
        is_keep: [false; SQ_N],
        knight_count: [0; SQ_N],
        knight_targets: [[0; 8]; SQ_N],
        king_count: [0; SQ_N],
        king_targets: [[0; 8]; SQ_N],
        ray_len: [[0; 8]; SQ_N],
        ray: [[[0; 8]; 8]; SQ_N],
        piece_keys: [[[0; SQ_N]; 6]; 2],
        wall_keys: [[[0; SQ_N]; 2]; 2],
        turn_key: 0,
        bastion_keys: [0; 2],
        wall_built_keys: [0; 2],
    };

    let mut r = 0;
    while r < N {
        let mut c = 0;
        while c < N {
            let s = sq(r, c) as usize;
            t.is_keep[s] = crate::types::is_keep(r, c);

            let mut n = 0u8;
            let mut i = 0;
            while i < 8 {
                let (dr, dc) = KNIGHT_JUMPS[i];
                if in_bounds(r + dr, c + dc) {
                    t.knight_targets[s][n as usize] = sq(r + dr, c + dc);
                    n += 1;
                }
                i += 1;
            }
            t.knight_count[s] = n;

            let mut n = 0u8;
            let mut i = 0;
            while i < 8 {
                let (dr, dc) = DIRS8[i];
                if in_bounds(r + dr, c + dc) {
                    t.king_targets[s][n as usize] = sq(r + dr, c + dc);
                    n += 1;
                }
                i += 1;
            }
            t.king_count[s] = n;

            let mut dir = 0;
            while dir < 8 {
                let (dr, dc) = DIRS8[dir];
                let mut len = 0u8;
                let mut rr = r + dr;
                let mut cc = c + dc;
                while in_bounds(rr, cc) {
                    t.ray[s][dir][len as usize] = sq(rr, cc);
                    len += 1;
                    rr += dr;
                    cc += dc;
                }
                t.ray_len[s][dir] = len;
                dir += 1;
            }

            c += 1;
        }
        r += 1;
    }

    // Fixed seed keeps hashes stable across builds.
    let mut state = 0xC17A_DE10_A5F0_0D42u64;
    let mut color = 0;
    while color < 2 {
        let mut pt = 0;
        while pt < 6 {
            let mut s = 0;
            while s < SQ_N {
                let (k, ns) = splitmix64(state);
                state = ns;
                t.piece_keys[color][pt][s] = k;
                s += 1;
            }
            pt += 1;
        }
        let mut hp_idx = 0;
        while hp_idx < 2 {
            let mut s = 0;
            while s < SQ_N {
                let (k, ns) = splitmix64(state);
                state = ns;
                t.wall_keys[color][hp_idx][s] = k;
                s += 1;
            }
            hp_idx += 1;
        }
        color += 1;
    }
    let (k, ns) = splitmix64(state);
    state = ns;
    t.turn_key = k;
    let (k, ns) = splitmix64(state);
    state = ns;
    t.bastion_keys[0] = k;
    let (k, ns) = splitmix64(state);
    state = ns;
    t.bastion_keys[1] = k;
    let (k, ns) = splitmix64(state);
    state = ns;
    t.wall_built_keys[0] = k;
    let (k, _) = splitmix64(state);
    t.wall_built_keys[1] = k;

    t
}

/// Global static tables, computed at compile time.
pub static TABLES: Tables = build_tables();

#[cfg(test)]
#[path = "tables_tests.rs"]
mod tables_tests;
