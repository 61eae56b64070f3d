use super::*;
use crate::types::{col, row, sq};

#[test]
fn test_corner_neighbor_counts() {
    // A9 (row 0, col 0) has 3 king neighbors and 2 knight targets.
    let corner = sq(0, 0) as usize;
    assert_eq!(TABLES.king_count[corner], 3);
    assert_eq!(TABLES.knight_count[corner], 2);

    // Center square has the full 8 of each.
    let center = sq(4, 4) as usize;
    assert_eq!(TABLES.king_count[center], 8);
    assert_eq!(TABLES.knight_count[center], 8);
}

#[test]
fn test_ray_lengths_sum_per_square() {
    // From any square the 8 rays together cover every other square of the
    // row, column and both diagonals exactly once.
    for s in 0..SQ_N {
        let (r, c) = (row(s as u8), col(s as u8));
        let ortho = (N - 1) * 2;
        let diag = {
            let nw_se = (r.min(c)) + ((N - 1 - r).min(N - 1 - c));
            let ne_sw = (r.min(N - 1 - c)) + ((N - 1 - r).min(c));
            nw_se + ne_sw
        };
        let total: i32 = TABLES.ray_len[s].iter().map(|&l| l as i32).sum();
        assert_eq!(total, ortho + diag, "square {s}");
    }
}

#[test]
fn test_rays_are_ordered_nearest_first() {
    // Ray direction 3 is East: from A9 (square 0) it must list B9..I9.
    let s = sq(0, 0) as usize;
    assert_eq!(TABLES.ray_len[s][3], 8);
    for step in 0..8 {
        assert_eq!(TABLES.ray[s][3][step], sq(0, 1 + step as i32));
    }
}

#[test]
fn test_keep_membership() {
    let mut count = 0;
    for s in 0..SQ_N {
        if TABLES.is_keep[s] {
            count += 1;
            assert!((3..=5).contains(&row(s as u8)));
            assert!((3..=5).contains(&col(s as u8)));
        }
    }
    assert_eq!(count, 9);
}

#[test]
fn test_zobrist_keys_are_distinct() {
    // Collect every key; a collision would break incremental hashing.
    let mut keys = Vec::new();
    for color in 0..2 {
        for pt in 0..6 {
            keys.extend_from_slice(&TABLES.piece_keys[color][pt]);
        }
        for hp in 0..2 {
            keys.extend_from_slice(&TABLES.wall_keys[color][hp]);
        }
    }
    keys.push(TABLES.turn_key);
    keys.extend_from_slice(&TABLES.bastion_keys);
    keys.extend_from_slice(&TABLES.wall_built_keys);

    let len = keys.len();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), len);
    assert!(!keys.contains(&0));
}
