//! Move generation for every turn-action kind.
//!
//! `generate_moves_into` produces the full action set (normal moves,
//! constructs, commands, catapult actions, Bastion). The Mason Command
//! generator temporarily plays the one-step move on the board to evaluate
//! threat and build squares, then restores it; that is why it needs
//! `&mut self` even though the position is unchanged on return.
//!
//! `generate_noisy_moves_into` produces the quiescence subset: captures,
//! every ranged demolish, catapult moves that demolish, Sovereign moves
//! touching the Keep, and constructs adjacent to the enemy Sovereign.

use crate::bitboard::Bitboard81;
use crate::board::Position;
use crate::tables::{DIRS4, TABLES};
use crate::types::*;

impl Position {
    /// Generate all legal turn-actions, returning a fresh vector.
    pub fn generate_moves(&self) -> Vec<Move> {
        let mut tmp = self.clone();
        let mut out = Vec::with_capacity(128);
        tmp.generate_moves_into(&mut out);
        out
    }

    /// Generate all legal turn-actions into the provided buffer, reusing it
    /// across calls. Produces nothing once the game is over.
    pub fn generate_moves_into(&mut self, out: &mut Vec<Move>) {
        out.clear();
        if self.game_over() {
            return;
        }

        let us = self.turn();
        let them = us.other();
        let enemy_attacks = self.compute_attacks(them);

        // Masons (+ construct + command)
        let mut bb = self.piece_bb(us, PieceType::Mason);
        while let Some(s) = bb.pop_lsb() {
            self.gen_normal_moves(out, s, PieceType::Mason, us);
            self.gen_mason_extras(out, s, us, enemy_attacks);
        }

        let mut bb = self.piece_bb(us, PieceType::Pegasus);
        while let Some(s) = bb.pop_lsb() {
            self.gen_normal_moves(out, s, PieceType::Pegasus, us);
        }

        let mut bb = self.piece_bb(us, PieceType::Lancer);
        while let Some(s) = bb.pop_lsb() {
            self.gen_normal_moves(out, s, PieceType::Lancer, us);
        }

        // Catapults have no plain moves; everything is in the extras.
        let mut bb = self.piece_bb(us, PieceType::Catapult);
        while let Some(s) = bb.pop_lsb() {
            self.gen_catapult_actions(out, s, us);
        }

        let mut bb = self.piece_bb(us, PieceType::Minister);
        while let Some(s) = bb.pop_lsb() {
            self.gen_normal_moves(out, s, PieceType::Minister, us);
        }

        let mut bb = self.piece_bb(us, PieceType::Sovereign);
        while let Some(s) = bb.pop_lsb() {
            self.gen_normal_moves(out, s, PieceType::Sovereign, us);
            self.gen_bastion(out, s, us);
        }
    }

    fn gen_normal_moves(&self, out: &mut Vec<Move>, from: u8, pt: PieceType, us: Color) {
        let t = &TABLES;
        let them = us.other();

        match pt {
            PieceType::Mason => {
                let f = if us == Color::White { -1 } else { 1 };
                let max = self.mason_move_range(from, us);
                let r = row(from);
                let c = col(from);

                // Forward and sideways steps onto empty squares only.
                for (dr, dc) in [(f, 0), (0, -1), (0, 1)] {
                    for step in 1..=max {
                        let rr = r + dr * step;
                        let cc = c + dc * step;
                        if !in_bounds(rr, cc) {
                            break;
                        }
                        let tsq = sq(rr, cc);
                        if self.raw_at(tsq) != 0 {
                            break;
                        }
                        out.push(Move::normal(from, tsq));
                    }
                }

                // Diagonal captures, always one step, never onto walls.
                for dc in [-1, 1] {
                    let rr = r + f;
                    let cc = c + dc;
                    if !in_bounds(rr, cc) {
                        continue;
                    }
                    let tsq = sq(rr, cc);
                    let v = self.raw_at(tsq);
                    if is_wall_val(v) {
                        continue;
                    }
                    if is_piece_val(v) && color_of(v) == them {
                        out.push(Move::normal(from, tsq));
                    }
                }
            }

            PieceType::Pegasus => {
                for i in 0..t.knight_count[from as usize] {
                    let tsq = t.knight_targets[from as usize][i as usize];
                    let v = self.raw_at(tsq);
                    if is_wall_val(v) {
                        continue;
                    }
                    if is_piece_val(v) && color_of(v) == us {
                        continue;
                    }
                    out.push(Move::normal(from, tsq));
                }
            }

            PieceType::Lancer => {
                for dir in 4..8 {
                    let len = t.ray_len[from as usize][dir];
                    for step in 0..len {
                        let tsq = t.ray[from as usize][dir][step as usize];
                        let v = self.raw_at(tsq);
                        if is_wall_val(v) {
                            break;
                        }
                        if is_piece_val(v) {
                            if color_of(v) == us && piece_of(v) == PieceType::Mason {
                                continue; // pass through friendly masons
                            }
                            if color_of(v) == them {
                                out.push(Move::normal(from, tsq));
                            }
                            break;
                        }
                        out.push(Move::normal(from, tsq));
                    }
                }
            }

            PieceType::Minister | PieceType::Sovereign => {
                let max = if pt == PieceType::Minister {
                    self.minister_move_range(from, us)
                } else {
                    self.sovereign_move_range(from, us)
                };
                if max <= 0 {
                    return;
                }
                for dir in 0..8 {
                    let len = t.ray_len[from as usize][dir] as i32;
                    for step in 0..max.min(len) {
                        let tsq = t.ray[from as usize][dir][step as usize];
                        let v = self.raw_at(tsq);
                        if is_wall_val(v) {
                            break;
                        }
                        if is_piece_val(v) {
                            if color_of(v) == them {
                                out.push(Move::normal(from, tsq));
                            }
                            break;
                        }
                        out.push(Move::normal(from, tsq));
                    }
                }
            }

            PieceType::Catapult => {}
        }
    }

    fn gen_mason_extras(
        &mut self,
        out: &mut Vec<Move>,
        mason_sq: u8,
        us: Color,
        enemy_attacks: Bitboard81,
    ) {
        let them = us.other();
        let r = row(mason_sq);
        let c = col(mason_sq);
        let can_build = !self.wall_built_last(us);

        // Construct: the mason must not be under attack.
        if can_build && !enemy_attacks.test(mason_sq) {
            for (dr, dc) in DIRS4 {
                let rr = r + dr;
                let cc = c + dc;
                if !in_bounds(rr, cc) {
                    continue;
                }
                let tsq = sq(rr, cc);
                if self.raw_at(tsq) != 0 {
                    continue;
                }
                out.push(Move::new(
                    MoveType::MasonConstruct,
                    mason_sq,
                    tsq,
                    SQ_NONE,
                    SQ_NONE,
                ));
            }
        }

        // Command: requires an orthogonally-adjacent friendly Minister.
        let mut eligible = false;
        for (dr, dc) in DIRS4 {
            let rr = r + dr;
            let cc = c + dc;
            if !in_bounds(rr, cc) {
                continue;
            }
            let v = self.raw_at(sq(rr, cc));
            if is_piece_val(v) && color_of(v) == us && piece_of(v) == PieceType::Minister {
                eligible = true;
                break;
            }
        }
        if !eligible {
            return;
        }

        let f = if us == Color::White { -1 } else { 1 };

        // Step targets: the mason's three orthogonal directions onto empty
        // squares, plus forward-diagonal captures.
        let mut dests = [SQ_NONE; 5];
        let mut dest_count = 0;
        for (dr, dc) in [(f, 0), (0, -1), (0, 1)] {
            let rr = r + dr;
            let cc = c + dc;
            if !in_bounds(rr, cc) {
                continue;
            }
            let tsq = sq(rr, cc);
            if self.raw_at(tsq) == 0 {
                dests[dest_count] = tsq;
                dest_count += 1;
            }
        }
        for dc in [-1, 1] {
            let rr = r + f;
            let cc = c + dc;
            if !in_bounds(rr, cc) {
                continue;
            }
            let tsq = sq(rr, cc);
            let v = self.raw_at(tsq);
            if is_wall_val(v) {
                continue;
            }
            if is_piece_val(v) && color_of(v) == them {
                dests[dest_count] = tsq;
                dest_count += 1;
            }
        }

        for &dest in &dests[..dest_count] {
            let dst_v = self.raw_at(dest);

            // Capturing the Sovereign ends the game first; the build half
            // never happens.
            if is_piece_val(dst_v) && color_of(dst_v) == them && piece_of(dst_v) == PieceType::Sovereign
            {
                out.push(Move::new(
                    MoveType::MasonCommand,
                    mason_sq,
                    dest,
                    SQ_NONE,
                    SQ_NONE,
                ));
                continue;
            }

            let from_v = self.raw_at(mason_sq);

            // Play the one-step move temporarily to judge the destination.
            self.set_square_raw(dest, from_v);
            self.set_square_raw(mason_sq, 0);

            // Skipping the build is always allowed.
            out.push(Move::new(
                MoveType::MasonCommand,
                mason_sq,
                dest,
                SQ_NONE,
                SQ_NONE,
            ));

            if can_build && !self.is_square_attacked_by(them, dest) {
                let nr = row(dest);
                let nc = col(dest);
                for (dr, dc) in DIRS4 {
                    let rr = nr + dr;
                    let cc = nc + dc;
                    if !in_bounds(rr, cc) {
                        continue;
                    }
                    let wsq = sq(rr, cc);
                    if self.raw_at(wsq) == 0 {
                        out.push(Move::new(MoveType::MasonCommand, mason_sq, dest, wsq, SQ_NONE));
                    }
                }
            }

            self.set_square_raw(mason_sq, from_v);
            self.set_square_raw(dest, dst_v);
        }
    }

    fn gen_catapult_actions(&self, out: &mut Vec<Move>, cat_sq: u8, us: Color) {
        let t = &TABLES;

        // Ranged demolish: the first non-empty square on each orthogonal ray,
        // if it is a wall of either color. Pieces block.
        for dir in 0..4 {
            let len = t.ray_len[cat_sq as usize][dir];
            for step in 0..len {
                let tsq = t.ray[cat_sq as usize][dir][step as usize];
                let v = self.raw_at(tsq);
                if is_piece_val(v) {
                    break;
                }
                if is_wall_val(v) {
                    out.push(Move::new(
                        MoveType::CatapultRangedDemolish,
                        cat_sq,
                        tsq,
                        SQ_NONE,
                        SQ_NONE,
                    ));
                    break;
                }
            }
        }

        // Rook-like moves, then an optional demolish of one wall adjacent to
        // the destination.
        for dir in 0..4 {
            let len = t.ray_len[cat_sq as usize][dir];
            for step in 0..len {
                let to_sq = t.ray[cat_sq as usize][dir][step as usize];
                let dst_v = self.raw_at(to_sq);
                if is_wall_val(dst_v) {
                    break;
                }

                if is_piece_val(dst_v) {
                    if color_of(dst_v) != us {
                        if piece_of(dst_v) == PieceType::Sovereign {
                            // Regicide; no demolish follows.
                            out.push(Move::new(
                                MoveType::CatapultMove,
                                cat_sq,
                                to_sq,
                                SQ_NONE,
                                SQ_NONE,
                            ));
                        } else {
                            out.push(Move::new(
                                MoveType::CatapultMove,
                                cat_sq,
                                to_sq,
                                SQ_NONE,
                                SQ_NONE,
                            ));
                            self.push_adjacent_demolishes(out, cat_sq, to_sq);
                        }
                    }
                    break;
                }

                out.push(Move::new(MoveType::CatapultMove, cat_sq, to_sq, SQ_NONE, SQ_NONE));
                self.push_adjacent_demolishes(out, cat_sq, to_sq);
            }
        }
    }

    fn push_adjacent_demolishes(&self, out: &mut Vec<Move>, cat_sq: u8, to_sq: u8) {
        let t = &TABLES;
        for i in 0..t.king_count[to_sq as usize] {
            let adj = t.king_targets[to_sq as usize][i as usize];
            if is_wall_val(self.raw_at(adj)) {
                out.push(Move::new(MoveType::CatapultMove, cat_sq, to_sq, adj, SQ_NONE));
            }
        }
    }

    fn gen_bastion(&self, out: &mut Vec<Move>, sov_sq: u8, us: Color) {
        if self.wall_built_last(us) {
            return;
        }
        if !self.bastion_right(us) {
            return;
        }
        if self.wall_tokens(us) > 15 {
            return; // Siege Attrition counts as sovereign movement
        }

        let t = &TABLES;
        for i in 0..t.king_count[sov_sq as usize] {
            let minister_sq = t.king_targets[sov_sq as usize][i as usize];
            let v = self.raw_at(minister_sq);
            if !is_piece_val(v) || color_of(v) != us || piece_of(v) != PieceType::Minister {
                continue;
            }

            // After the swap the Sovereign stands on minister_sq; both walls
            // go on empty squares around it, excluding the Minister's new
            // square (the old Sovereign square).
            let mut empties = [0u8; 8];
            let mut ecount = 0;
            for j in 0..t.king_count[minister_sq as usize] {
                let adj = t.king_targets[minister_sq as usize][j as usize];
                if adj == sov_sq {
                    continue;
                }
                if self.raw_at(adj) == 0 {
                    empties[ecount] = adj;
                    ecount += 1;
                }
            }
            if ecount < 2 {
                continue;
            }

            for a in 0..ecount {
                for b in (a + 1)..ecount {
                    out.push(Move::new(
                        MoveType::Bastion,
                        sov_sq,
                        minister_sq,
                        empties[a],
                        empties[b],
                    ));
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Noisy subset for quiescence
    // -------------------------------------------------------------------------

    /// Generate only "noisy" actions: captures (Sovereign included), all
    /// ranged demolishes, catapult moves that demolish a wall, Sovereign
    /// moves that touch Keep geometry, and constructs adjacent to the enemy
    /// Sovereign.
    pub fn generate_noisy_moves_into(&self, out: &mut Vec<Move>) {
        out.clear();
        if self.game_over() {
            return;
        }

        let t = &TABLES;
        let us = self.turn();
        let them = us.other();
        let dom = self.has_dominance(us);

        let mut adj_enemy = Bitboard81::EMPTY;
        let enemy_sov = self.sovereign_sq(them);
        if enemy_sov != SQ_NONE {
            for i in 0..t.king_count[enemy_sov as usize] {
                adj_enemy.set(t.king_targets[enemy_sov as usize][i as usize]);
            }
        }

        // Computed lazily; only mason constructs need it.
        let mut enemy_attacks: Option<Bitboard81> = None;

        let mut friendly = self.pieces_bb(us);
        while let Some(from) = friendly.pop_lsb() {
            let src_v = self.raw_at(from);
            let pt = piece_of(src_v);
            let r = row(from);
            let c = col(from);

            match pt {
                PieceType::Mason => {
                    let f = if us == Color::White { -1 } else { 1 };
                    for dc in [-1, 1] {
                        let rr = r + f;
                        let cc = c + dc;
                        if !in_bounds(rr, cc) {
                            continue;
                        }
                        let to = sq(rr, cc);
                        let v = self.raw_at(to);
                        if is_wall_val(v) {
                            continue;
                        }
                        if is_piece_val(v) && color_of(v) == them {
                            out.push(Move::normal(from, to));
                        }
                    }

                    // Entombment-threatening constructs only.
                    if enemy_sov != SQ_NONE && !self.wall_built_last(us) {
                        for (dr, dc) in DIRS4 {
                            let rr = r + dr;
                            let cc = c + dc;
                            if !in_bounds(rr, cc) {
                                continue;
                            }
                            let to = sq(rr, cc);
                            if !adj_enemy.test(to) {
                                continue;
                            }
                            if self.raw_at(to) != 0 {
                                continue;
                            }
                            let attacks =
                                *enemy_attacks.get_or_insert_with(|| self.compute_attacks(them));
                            if !attacks.test(from) {
                                out.push(Move::new(
                                    MoveType::MasonConstruct,
                                    from,
                                    to,
                                    SQ_NONE,
                                    SQ_NONE,
                                ));
                            }
                        }
                    }
                }

                PieceType::Pegasus => {
                    for i in 0..t.knight_count[from as usize] {
                        let to = t.knight_targets[from as usize][i as usize];
                        let v = self.raw_at(to);
                        if is_wall_val(v) {
                            continue;
                        }
                        if is_piece_val(v) && color_of(v) == them {
                            out.push(Move::normal(from, to));
                        }
                    }
                }

                PieceType::Lancer => {
                    for dir in 4..8 {
                        let len = t.ray_len[from as usize][dir];
                        for step in 0..len {
                            let to = t.ray[from as usize][dir][step as usize];
                            let v = self.raw_at(to);
                            if is_wall_val(v) {
                                break;
                            }
                            if is_piece_val(v) {
                                if color_of(v) == us && piece_of(v) == PieceType::Mason {
                                    continue;
                                }
                                if color_of(v) == them {
                                    out.push(Move::normal(from, to));
                                }
                                break;
                            }
                        }
                    }
                }

                PieceType::Minister => {
                    let max = if dom && is_keep_sq(from) { 3 } else { 2 };
                    for dir in 0..8 {
                        let len = t.ray_len[from as usize][dir] as i32;
                        for step in 0..max.min(len) {
                            let to = t.ray[from as usize][dir][step as usize];
                            let v = self.raw_at(to);
                            if is_wall_val(v) {
                                break;
                            }
                            if is_piece_val(v) {
                                if color_of(v) == them {
                                    out.push(Move::normal(from, to));
                                }
                                break;
                            }
                        }
                    }
                }

                PieceType::Sovereign => {
                    let max = if self.wall_tokens(us) > 15 {
                        0
                    } else if dom && is_keep_sq(from) {
                        2
                    } else {
                        1
                    };
                    for dir in 0..8 {
                        let len = t.ray_len[from as usize][dir] as i32;
                        for step in 0..max.min(len) {
                            let to = t.ray[from as usize][dir][step as usize];
                            let v = self.raw_at(to);
                            if is_wall_val(v) {
                                break;
                            }
                            if is_piece_val(v) {
                                if color_of(v) == them {
                                    out.push(Move::normal(from, to));
                                }
                                break;
                            }
                            // Quiet sovereign steps are noisy only when they
                            // interact with the Keep.
                            if is_keep_sq(from) || is_keep_sq(to) {
                                out.push(Move::normal(from, to));
                            }
                        }
                    }
                }

                PieceType::Catapult => {
                    for dir in 0..4 {
                        let len = t.ray_len[from as usize][dir];
                        for step in 0..len {
                            let to = t.ray[from as usize][dir][step as usize];
                            let v = self.raw_at(to);
                            if is_piece_val(v) {
                                break;
                            }
                            if is_wall_val(v) {
                                out.push(Move::new(
                                    MoveType::CatapultRangedDemolish,
                                    from,
                                    to,
                                    SQ_NONE,
                                    SQ_NONE,
                                ));
                                break;
                            }
                        }
                    }

                    for dir in 0..4 {
                        let len = t.ray_len[from as usize][dir];
                        for step in 0..len {
                            let to = t.ray[from as usize][dir][step as usize];
                            let dst_v = self.raw_at(to);
                            if is_wall_val(dst_v) {
                                break;
                            }

                            if is_piece_val(dst_v) {
                                if color_of(dst_v) == them {
                                    out.push(Move::new(
                                        MoveType::CatapultMove,
                                        from,
                                        to,
                                        SQ_NONE,
                                        SQ_NONE,
                                    ));
                                    self.push_adjacent_demolishes(out, from, to);
                                }
                                break;
                            }

                            // Quiet slides count only when paired with a
                            // demolish at the destination.
                            self.push_adjacent_demolishes(out, from, to);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_move_count() {
        // 9 mason pushes, 7 constructs (the A2/I2 masons are skewered by the
        // enemy lancers through their own mason screens), 10 commands from
        // the two masons orthogonally adjacent to a minister, 4 pegasus
        // jumps and 12 lancer slides.
        let pos = Position::initial();
        let moves = pos.generate_moves();
        assert_eq!(moves.len(), 42);
    }

    #[test]
    fn test_initial_has_no_sovereign_or_catapult_moves() {
        let pos = Position::initial();
        for m in pos.generate_moves() {
            assert_ne!(m.kind, MoveType::Bastion);
            assert_ne!(m.kind, MoveType::CatapultMove);
            assert_ne!(m.kind, MoveType::CatapultRangedDemolish);
            if m.kind == MoveType::Normal {
                let v = pos.raw_at(m.from);
                assert_ne!(piece_of(v), PieceType::Sovereign);
            }
        }
    }

    #[test]
    fn test_generate_moves_leaves_position_untouched() {
        // The command generator mutates and restores; hash and grid must be
        // byte-identical afterwards.
        let mut pos = Position::initial();
        let before_hash = pos.hash();
        let before: Vec<i8> = (0..SQ_N as u8).map(|s| pos.raw_at(s)).collect();

        let mut out = Vec::new();
        pos.generate_moves_into(&mut out);

        assert_eq!(pos.hash(), before_hash);
        let after: Vec<i8> = (0..SQ_N as u8).map(|s| pos.raw_at(s)).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_noisy_moves_are_subset_of_legal_moves() {
        let mut pos = Position::initial();
        // Stir the position a little so captures exist.
        for _ in 0..6 {
            let moves = pos.generate_moves();
            let m = moves
                .iter()
                .find(|m| m.kind == MoveType::Normal)
                .copied()
                .unwrap_or(moves[0]);
            pos.make_move(m);
            if pos.game_over() {
                return;
            }
        }

        let legal = pos.generate_moves();
        let mut noisy = Vec::new();
        pos.generate_noisy_moves_into(&mut noisy);
        for m in &noisy {
            assert!(legal.contains(m), "noisy move {m} not in legal set");
        }
    }
}
