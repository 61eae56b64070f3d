//! Hand-crafted static evaluation.
//!
//! Returns a centipawn-like score, computed White-minus-Black and flipped
//! for the side to move. The terms: dynamic material that drifts toward
//! late-game values for Mason/Pegasus/Catapult, centrality piece-square
//! tables with a strongly amplified Sovereign table, Minister-Mason
//! synergy, wall values and Keep-ring walls, sovereign pressure divided by
//! a safety denominator, king-safety penalties, mobility, entombment
//! pressure, tempo, and an endgame layer that dampens scores in locked
//! no-catapult positions and rewards a catapult monopoly.

use citadel_core::tables::{DIRS8, TABLES};
use citadel_core::{
    col, color_of, in_bounds, is_keep, is_keep_sq, is_piece_val, is_wall_val, piece_of, row, sq,
    wall_hp, Bitboard81, Color, PieceType, Position, N, SQ_N, SQ_NONE,
};

use crate::nnue::Nnue;
use crate::search::EvalBackend;

/// Material values in cell-encoding order; the Sovereign is priceless and
/// carried as 0 here.
pub(crate) const PIECE_VALUE_MAT: [i32; 6] = [100, 550, 350, 400, 450, 0];
/// Ordering values for captures; a Sovereign capture must dominate.
pub(crate) const PIECE_VALUE_ORDER: [i32; 6] = [100, 550, 350, 400, 450, 100_000];

const DOMINANCE_BONUS: i32 = 25;
const WALL_BASE_VALUE_PER_HP: i32 = 2;
const WALL_ADJ_SOV_BONUS: i32 = 15;
const WALL_CHOKE_BONUS: i32 = 6;
const MASON_MINISTER_SYNERGY: i32 = 20;
const ENTOMB_PRESSURE_WEIGHT: i32 = 18;
const SIEGE_ATTRITION_PENALTY: i32 = 200;

// Wall-locked endgame shape.
const WALLS_MANY_START: i32 = 12;
const WALLS_MANY_FULL: i32 = 25;
const NO_CAT_DRAWISH_SCALE_MAX: i32 = 256;
const CATAPULT_EDGE_BONUS_MAX: i32 = 150;
const CATAPULT_MONOPOLY_BONUS: i32 = 200;

// Opening/midgame shape.
const MAX_NON_SOV_PIECES: i32 = 34;
const BASTION_RIGHT_OPENING_BONUS: i32 = 80;
const KING_WANDER_PEN: i32 = 45;
const KING_KEEP_EARLY_PEN: i32 = 140;
const KING_ATTACKED_PEN: i32 = 700;
const KING_RING_ATTACK_PEN: i32 = 55;
const WALL_TOKEN_OPENING_PEN_PER_HP: i32 = 3;
const MOBILITY_ATK_WEIGHT: i32 = 2;

const TEMPO_BONUS: i32 = 20;

const fn pst_centrality(r: i32, c: i32) -> i32 {
    // Chebyshev distance from the center square: 4 at center, 0 on the edge.
    let dr = if r >= 4 { r - 4 } else { 4 - r };
    let dc = if c >= 4 { c - 4 } else { 4 - c };
    let cheb = if dr > dc { dr } else { dc };
    4 - cheb
}

const fn build_pst() -> [[i32; SQ_N]; 6] {
    let mut pst = [[0; SQ_N]; 6];
    let mut s = 0;
    while s < SQ_N {
        let r = s as i32 / N;
        let c = s as i32 % N;
        let cent = pst_centrality(r, c);
        let keep = if is_keep(r, c) { 1 } else { 0 };

        pst[PieceType::Mason.idx()][s] = cent * 4 + keep * 6;
        pst[PieceType::Catapult.idx()][s] = cent * 3 + keep * 4;
        pst[PieceType::Lancer.idx()][s] = cent * 4 + keep * 6;
        pst[PieceType::Pegasus.idx()][s] = cent * 4 + keep * 6;
        pst[PieceType::Minister.idx()][s] = cent * 5 + keep * 8;
        // The Sovereign table is much larger on purpose: it provides the
        // "gravity" toward the Keep as pieces come off.
        pst[PieceType::Sovereign.idx()][s] = cent * 20 + keep * 40;

        s += 1;
    }
    pst
}

static PST: [[i32; SQ_N]; 6] = build_pst();

const fn is_keep_boundary_ring(r: i32, c: i32) -> bool {
    // The 5x5 boundary around the Keep: typical entry chokepoints.
    if r < 2 || r > 6 || c < 2 || c > 6 {
        return false;
    }
    if is_keep(r, c) {
        return false;
    }
    r == 2 || r == 6 || c == 2 || c == 6
}

#[inline(always)]
fn clamp256(x: i32) -> i32 {
    x.clamp(0, 256)
}

fn sovereign_safety(pos: &Position, c: Color) -> i32 {
    let ks = pos.sovereign_sq(c);
    if ks == SQ_NONE {
        // No sovereign means the game is over; avoid a zero denominator.
        return 100;
    }

    let mut safety = 1;
    let mut wall_safety = 0;
    let t = &TABLES;
    for i in 0..t.king_count[ks as usize] {
        let adj = t.king_targets[ks as usize][i as usize];
        let v = pos.raw_at(adj);
        if v == 0 {
            continue;
        }
        if is_piece_val(v) && color_of(v) == c {
            safety += 2;
        } else if is_wall_val(v) && color_of(v) == c && wall_safety < 3 {
            // Wall contribution is capped: walls past three are an
            // entombment liability, not shelter.
            safety += 1;
            wall_safety += 1;
        }
    }
    safety
}

/// Static evaluation, positive = good for White.
pub fn eval_static(pos: &Position) -> i32 {
    let mut score_w = 0;
    let mut score_b = 0;

    let t = &TABLES;

    // Game phase: 0 = opening, 256 = endgame.
    let mut non_sov_pieces = 0;
    for s in 0..SQ_N as u8 {
        let v = pos.raw_at(s);
        if is_piece_val(v) && piece_of(v) != PieceType::Sovereign {
            non_sov_pieces += 1;
        }
    }
    let missing = (MAX_NON_SOV_PIECES - non_sov_pieces).max(0);
    let phase = (missing * 256 + MAX_NON_SOV_PIECES / 2) / MAX_NON_SOV_PIECES;
    let opening = 256 - phase;

    let walls_w = pos.wall_tokens(Color::White);
    let walls_b = pos.wall_tokens(Color::Black);
    let total_walls = walls_w + walls_b;

    let wall_many = clamp256((total_walls - WALLS_MANY_START) * 256 / (WALLS_MANY_FULL - WALLS_MANY_START));
    let wall_endgame = wall_many * phase / 256;

    let safety_w = sovereign_safety(pos, Color::White);
    let safety_b = sovereign_safety(pos, Color::Black);
    let mut pressure_on_w = 0;
    let mut pressure_on_b = 0;

    let sov_sq_w = pos.sovereign_sq(Color::White);
    let sov_sq_b = pos.sovereign_sq(Color::Black);

    let dyn_piece_value = |pt: PieceType| -> i32 {
        let base = PIECE_VALUE_MAT[pt.idx()];
        let target = match pt {
            PieceType::Mason => 225,
            PieceType::Pegasus => 500,
            PieceType::Catapult => 600,
            _ => base,
        };
        base + (target - base) * wall_endgame / 256
    };

    for s in 0..SQ_N as u8 {
        let v = pos.raw_at(s);
        if v == 0 {
            continue;
        }

        let is_white = v > 0;
        let score = if is_white { &mut score_w } else { &mut score_b };

        if is_piece_val(v) {
            let pt = piece_of(v);

            // Material and PST; the Sovereign table only matters as the
            // board empties.
            *score += dyn_piece_value(pt);
            if pt == PieceType::Sovereign {
                *score += PST[pt.idx()][s as usize] * phase / 256;
            } else {
                *score += PST[pt.idx()][s as usize];
            }

            // Pressure toward the enemy sovereign, Chebyshev distance <= 4.
            let target_sov = if is_white { sov_sq_b } else { sov_sq_w };
            if target_sov != SQ_NONE {
                let dr = (row(s) - row(target_sov)).abs();
                let dc = (col(s) - col(target_sov)).abs();
                let dist = dr.max(dc);
                if dist <= 4 {
                    let base_weight = match pt {
                        PieceType::Mason | PieceType::Pegasus => 10,
                        PieceType::Catapult | PieceType::Lancer => 6,
                        PieceType::Minister => 3,
                        PieceType::Sovereign => 0,
                    };
                    let p_val = base_weight * (5 - dist);
                    if is_white {
                        pressure_on_b += p_val;
                    } else {
                        pressure_on_w += p_val;
                    }
                }
            }

            // A mason next to a friendly minister can be commanded.
            if pt == PieceType::Mason {
                for i in 0..t.king_count[s as usize] {
                    let adj = t.king_targets[s as usize][i as usize];
                    let v2 = pos.raw_at(adj);
                    if is_piece_val(v2)
                        && piece_of(v2) == PieceType::Minister
                        && (v2 > 0) == is_white
                    {
                        *score += MASON_MINISTER_SYNERGY;
                        break;
                    }
                }
            }
        } else {
            let hp = wall_hp(v);
            *score += WALL_BASE_VALUE_PER_HP * hp;
            if is_keep_boundary_ring(row(s), col(s)) {
                *score += WALL_CHOKE_BONUS * phase / 256;
            }
        }
    }

    // Pressure scaled into centipawn range and divided by the defender's
    // safety denominator.
    score_w += pressure_on_b * 4 / safety_b;
    score_b += pressure_on_w * 4 / safety_w;

    if pos.has_dominance(Color::White) {
        score_w += DOMINANCE_BONUS * phase / 256;
    }
    if pos.has_dominance(Color::Black) {
        score_b += DOMINANCE_BONUS * phase / 256;
    }

    if pos.bastion_right(Color::White) {
        score_w += BASTION_RIGHT_OPENING_BONUS * opening / 256;
    }
    if pos.bastion_right(Color::Black) {
        score_b += BASTION_RIGHT_OPENING_BONUS * opening / 256;
    }

    // Friendly walls adjacent to the own sovereign.
    for (c, score) in [(Color::White, &mut score_w), (Color::Black, &mut score_b)] {
        let ks = pos.sovereign_sq(c);
        if ks == SQ_NONE {
            continue;
        }
        for i in 0..t.king_count[ks as usize] {
            let adj = t.king_targets[ks as usize][i as usize];
            let v = pos.raw_at(adj);
            if is_wall_val(v) && (color_of(v) == c) {
                *score += WALL_ADJ_SOV_BONUS;
            }
        }
    }

    if pos.wall_tokens(Color::White) > 15 {
        score_w -= SIEGE_ATTRITION_PENALTY;
    }
    if pos.wall_tokens(Color::Black) > 15 {
        score_b -= SIEGE_ATTRITION_PENALTY;
    }

    score_w -= walls_w * WALL_TOKEN_OPENING_PEN_PER_HP * opening / 256;
    score_b -= walls_b * WALL_TOKEN_OPENING_PEN_PER_HP * opening / 256;

    // Attacked-square counts double as a mobility/development proxy.
    let att_w = pos.compute_attacks(Color::White);
    let att_b = pos.compute_attacks(Color::Black);
    let mob_w = att_w.popcount() as i32;
    let mob_b = att_b.popcount() as i32;
    score_w += MOBILITY_ATK_WEIGHT * mob_w;
    score_b += MOBILITY_ATK_WEIGHT * mob_b;

    let king_safety_pen = |c: Color, enemy_attacks: &Bitboard81| -> i32 {
        let ks = pos.sovereign_sq(c);
        if ks == SQ_NONE {
            return 0;
        }
        let mut pen = 0;
        let home = if c == Color::White { sq(8, 4) } else { sq(0, 4) };
        let cheb = (row(ks) - row(home)).abs().max((col(ks) - col(home)).abs());
        pen += KING_WANDER_PEN * cheb * opening / 256;
        if is_keep_sq(ks) {
            pen += KING_KEEP_EARLY_PEN * opening / 256;
        }
        if enemy_attacks.test(ks) {
            pen += KING_ATTACKED_PEN;
        }
        let mut ring_att = 0;
        for (dr, dc) in DIRS8 {
            let rr = row(ks) + dr;
            let cc = col(ks) + dc;
            if !in_bounds(rr, cc) {
                continue;
            }
            if enemy_attacks.test(sq(rr, cc)) {
                ring_att += 1;
            }
        }
        pen + KING_RING_ATTACK_PEN * ring_att
    };
    score_w -= king_safety_pen(Color::White, &att_b);
    score_b -= king_safety_pen(Color::Black, &att_w);

    // Entombment pressure: blocked neighbors around the enemy sovereign,
    // counting board edges as blocked.
    let entomb_pressure = |attacker: Color| -> i32 {
        let vk = pos.sovereign_sq(attacker.other());
        if vk == SQ_NONE {
            return 0;
        }
        let mut blocked = 0;
        for (dr, dc) in DIRS8 {
            let rr = row(vk) + dr;
            let cc = col(vk) + dc;
            if !in_bounds(rr, cc) {
                blocked += 1;
                continue;
            }
            if is_wall_val(pos.raw_at(sq(rr, cc))) {
                blocked += 1;
            }
        }
        blocked
    };
    score_w += ENTOMB_PRESSURE_WEIGHT * entomb_pressure(Color::White);
    score_b += ENTOMB_PRESSURE_WEIGHT * entomb_pressure(Color::Black);

    // Tempo goes in before the drawishness scaling so dead positions do not
    // oscillate by +-20 with the side to move.
    if pos.turn() == Color::White {
        score_w += TEMPO_BONUS;
    } else {
        score_b += TEMPO_BONUS;
    }

    let mut diff = score_w - score_b;

    // Catapult/wall endgame layer.
    let cat_w = pos.piece_count(Color::White, PieceType::Catapult) as i32;
    let cat_b = pos.piece_count(Color::Black, PieceType::Catapult) as i32;

    if cat_w == 0 && cat_b == 0 {
        // Walls are permanent without catapults; locked boards head to draws.
        let mob_total = mob_w + mob_b;
        let mut drawish = clamp256((60 - mob_total) * 256 / 40);

        let masons = (pos.piece_count(Color::White, PieceType::Mason)
            + pos.piece_count(Color::Black, PieceType::Mason)) as i32;
        if masons > 0 {
            // Masons but no catapults: unbounded wall supply, heavy damping.
            let mason_factor = if total_walls >= 4 { 245 } else { 200 };
            drawish = drawish.max(mason_factor);
        } else {
            drawish = drawish.max((total_walls * 20).min(256));
        }

        let scale = 256 - drawish * NO_CAT_DRAWISH_SCALE_MAX / 256;
        diff = diff * scale / 256;
    } else {
        // Having the only catapults on the board is conversion potential
        // regardless of phase.
        if cat_w > 0 && cat_b == 0 {
            diff += CATAPULT_MONOPOLY_BONUS;
        } else if cat_b > 0 && cat_w == 0 {
            diff -= CATAPULT_MONOPOLY_BONUS;
        }

        if cat_w != cat_b {
            let edge = if cat_w > cat_b { 1 } else { -1 };
            diff += edge * CATAPULT_EDGE_BONUS_MAX * wall_endgame / 256;
        }
    }

    diff
}

/// HCE score from the side-to-move's perspective.
#[inline]
pub fn hce_eval_stm(pos: &Position) -> i32 {
    let diff = eval_static(pos);
    if pos.turn() == Color::White {
        diff
    } else {
        -diff
    }
}

/// Evaluate without searching, honoring the backend selection. A NNUE
/// backend with no loaded model silently falls back to HCE.
pub fn evaluate_position_stm(pos: &Position, backend: EvalBackend, nnue: Option<&Nnue>) -> i32 {
    if backend == EvalBackend::Nnue {
        if let Some(net) = nnue {
            if net.loaded() {
                let mut acc = crate::nnue::Accumulator::default();
                net.init_accumulator(pos, &mut acc);
                return net.evaluate_stm(pos, &acc);
            }
        }
    }
    hce_eval_stm(pos)
}

#[cfg(test)]
#[path = "eval_tests.rs"]
mod eval_tests;
