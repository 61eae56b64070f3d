//! Perft seeds and deep make/undo invariants, parallelized over root moves.

use rayon::prelude::*;

use citadel_core::*;

/// Depth-1 count from the initial position, derived by hand: 9 mason
/// pushes, 7 constructs, 10 commands (5 per minister-adjacent mason),
/// 4 pegasus jumps and 12 lancer slides.
const INITIAL_PERFT_1: u64 = 42;

#[test]
fn test_initial_perft_depth_1() {
    let mut pos = Position::initial();
    assert_eq!(perft(&mut pos, 1), INITIAL_PERFT_1);
}

#[test]
fn test_perft_divide_sums_to_perft() {
    let mut pos = Position::initial();
    let total = perft(&mut pos, 2);
    let divide = perft_divide(&mut pos, 2);
    assert_eq!(divide.len() as u64, INITIAL_PERFT_1);
    let sum: u64 = divide.iter().map(|(_, n)| n).sum();
    assert_eq!(sum, total);
}

#[test]
fn test_perft_is_deterministic() {
    let mut a = Position::initial();
    let mut b = Position::initial();
    assert_eq!(perft(&mut a, 3), perft(&mut b, 3));
}

#[test]
fn test_perft_leaves_position_unchanged() {
    let mut pos = Position::initial();
    let fen = pos.to_fen();
    let hash = pos.hash();
    perft(&mut pos, 3);
    assert_eq!(pos.to_fen(), fen);
    assert_eq!(pos.hash(), hash);
}

#[test]
fn test_perft_from_scattered_positions() {
    // Mid-game flavored positions touching every action kind. Values are
    // pinned by self-consistency (divide sums + clone-vs-undo agreement),
    // not external references.
    let fens: &[&str] = &[
        "clpisiplc/mmmmmmmmm/9/9/9/9/9/MMMMMMMMM/CLPISIPLC w Bb - 0 1",
        "s8/9/9/9/9/3IS4/9/9/9 w Bb - 0 1",
        "4s4/9/9/3w5/9/9/9/4C4/4S4 w Bb - 0 1",
        "4s4/9/9/9/RRRRRRRW1/9/9/9/3IS4 w Bb - 0 1",
        "sw7/ww7/9/9/9/9/9/9/4S4 w Bb - 0 1",
    ];

    fens.par_iter().for_each(|fen| {
        let mut pos = Position::from_fen(fen).unwrap();
        let via_undo = perft(&mut pos, 2);
        assert_eq!(pos.to_fen(), *fen, "perft must restore {fen}");

        // Recompute by cloning at each node instead of undoing.
        fn perft_clone(pos: &Position, depth: u32) -> u64 {
            if depth == 0 {
                return 1;
            }
            let moves = pos.generate_moves();
            if moves.is_empty() {
                return 0;
            }
            if depth == 1 {
                return moves.len() as u64;
            }
            let mut nodes = 0;
            for m in moves {
                let mut child = pos.clone();
                child.make_move(m);
                nodes += perft_clone(&child, depth - 1);
            }
            nodes
        }

        let via_clone = perft_clone(&Position::from_fen(fen).unwrap(), 2);
        assert_eq!(via_undo, via_clone, "undo and clone disagree on {fen}");
    });
}

#[test]
fn test_hash_equals_rebuild_along_random_walk() {
    // Walk a few plies along the first legal move each time and verify the
    // incremental hash always matches a from-FEN recomputation.
    let mut pos = Position::initial();
    for _ in 0..24 {
        let moves = pos.generate_moves();
        if moves.is_empty() {
            break;
        }
        // Vary the pick a little without pulling in an RNG.
        let pick = (pos.hash() as usize) % moves.len();
        pos.make_move(moves[pick]);

        let rebuilt = Position::from_fen(&pos.to_fen()).unwrap();
        assert_eq!(rebuilt.hash(), pos.hash());
        if pos.game_over() {
            break;
        }
    }
}
