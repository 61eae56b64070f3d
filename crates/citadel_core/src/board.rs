//! The authoritative game state and its transitions.
//!
//! `Position` owns the signed cell grid plus derived state (per-type
//! bitboards, sovereign squares, wall-token counters, incremental Zobrist
//! hash, repetition history). Every mutation goes through `set_square_raw`,
//! which keeps the derived state and the hash in lock-step with the grid.
//! `make_move`/`undo_move` are exact inverses; a search descent is a stack
//! of `Undo` records that can always be unwound back to the root.

use std::fmt;

use crate::bitboard::Bitboard81;
use crate::tables::TABLES;
use crate::types::*;

/// Everything `undo_move` needs, saved wholesale rather than derived from
/// the move's opcode path. At most 6 squares change in one action (Bastion:
/// two swapped pieces plus two walls; Mason Command and Catapult Move: three).
#[derive(Clone, Copy, Debug)]
pub struct Undo {
    pub prev_turn: Color,
    pub prev_bastion_right: [bool; 2],
    pub prev_wall_built_last: [bool; 2],
    pub prev_sovereign_sq: [u8; 2],
    pub prev_wall_tokens: [i32; 2],
    pub prev_halfmove: u32,
    pub prev_fullmove: u32,
    pub prev_winner: Option<Color>,
    pub prev_win_reason: Option<WinReason>,

    squares: [(u8, i8); 6],
    square_count: u8,
}

impl Undo {
    /// The mutated squares with their pre-move cell values.
    #[inline(always)]
    pub fn changed(&self) -> &[(u8, i8)] {
        &self.squares[..self.square_count as usize]
    }
}

/// Search-only helper record for the null ("pass") move.
#[derive(Clone, Copy, Debug)]
pub struct NullUndo {
    pub prev_turn: Color,
    pub prev_fullmove: u32,
}

#[derive(Clone)]
pub struct Position {
    board: [i8; SQ_N],

    turn: Color,
    bastion_right: [bool; 2],
    wall_built_last: [bool; 2],
    sovereign_sq: [u8; 2],
    /// Sum of wall hit points per color (a reinforced wall counts as 2).
    wall_tokens: [i32; 2],
    halfmove: u32,
    fullmove: u32,
    winner: Option<Color>,
    win_reason: Option<WinReason>,

    piece_bb: [[Bitboard81; PieceType::COUNT]; 2],
    pieces_bb: [Bitboard81; 2],
    walls_bb: [Bitboard81; 2],
    walls_reinf_bb: [Bitboard81; 2],

    hash: u64,
    history: Vec<u64>,
}

impl Position {
    pub(crate) fn empty() -> Self {
        let mut p = Position {
            board: [0; SQ_N],
            turn: Color::White,
            bastion_right: [true, true],
            wall_built_last: [false, false],
            sovereign_sq: [SQ_NONE, SQ_NONE],
            wall_tokens: [0, 0],
            halfmove: 0,
            fullmove: 1,
            winner: None,
            win_reason: None,
            piece_bb: [[Bitboard81::EMPTY; PieceType::COUNT]; 2],
            pieces_bb: [Bitboard81::EMPTY; 2],
            walls_bb: [Bitboard81::EMPTY; 2],
            walls_reinf_bb: [Bitboard81::EMPTY; 2],
            hash: 0,
            history: Vec::new(),
        };
        p.rebuild_derived();
        p
    }

    /// The standard initial setup: back rank Catapult, Lancer, Pegasus,
    /// Minister, Sovereign, Minister, Pegasus, Lancer, Catapult; nine
    /// Masons in front.
    pub fn initial() -> Self {
        const BACK: [PieceType; 9] = [
            PieceType::Catapult,
            PieceType::Lancer,
            PieceType::Pegasus,
            PieceType::Minister,
            PieceType::Sovereign,
            PieceType::Minister,
            PieceType::Pegasus,
            PieceType::Lancer,
            PieceType::Catapult,
        ];

        let mut p = Position::empty();
        for c in 0..N {
            p.board[sq(8, c) as usize] = make_piece(Color::White, BACK[c as usize]);
            p.board[sq(7, c) as usize] = make_piece(Color::White, PieceType::Mason);
            p.board[sq(0, c) as usize] = make_piece(Color::Black, BACK[c as usize]);
            p.board[sq(1, c) as usize] = make_piece(Color::Black, PieceType::Mason);
        }
        p.rebuild_derived();
        p
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[inline(always)]
    pub fn turn(&self) -> Color {
        self.turn
    }

    #[inline(always)]
    pub fn bastion_right(&self, c: Color) -> bool {
        self.bastion_right[c.idx()]
    }

    /// True if `c` placed at least one wall on their previous turn, which
    /// forbids building again this turn.
    #[inline(always)]
    pub fn wall_built_last(&self, c: Color) -> bool {
        self.wall_built_last[c.idx()]
    }

    #[inline(always)]
    pub fn wall_tokens(&self, c: Color) -> i32 {
        self.wall_tokens[c.idx()]
    }

    #[inline(always)]
    pub fn sovereign_sq(&self, c: Color) -> u8 {
        self.sovereign_sq[c.idx()]
    }

    #[inline(always)]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    #[inline(always)]
    pub fn halfmove(&self) -> u32 {
        self.halfmove
    }

    #[inline(always)]
    pub fn fullmove(&self) -> u32 {
        self.fullmove
    }

    #[inline(always)]
    pub fn game_over(&self) -> bool {
        self.winner.is_some()
    }

    #[inline(always)]
    pub fn winner(&self) -> Option<Color> {
        self.winner
    }

    #[inline(always)]
    pub fn win_reason(&self) -> Option<WinReason> {
        self.win_reason
    }

    /// Raw cell value at a square.
    #[inline(always)]
    pub fn raw_at(&self, s: u8) -> i8 {
        self.board[s as usize]
    }

    #[inline(always)]
    pub fn piece_count(&self, c: Color, pt: PieceType) -> u32 {
        self.piece_bb[c.idx()][pt.idx()].popcount()
    }

    #[inline(always)]
    pub fn piece_bb(&self, c: Color, pt: PieceType) -> Bitboard81 {
        self.piece_bb[c.idx()][pt.idx()]
    }

    #[inline(always)]
    pub fn pieces_bb(&self, c: Color) -> Bitboard81 {
        self.pieces_bb[c.idx()]
    }

    #[inline(always)]
    pub fn walls_bb(&self, c: Color) -> Bitboard81 {
        self.walls_bb[c.idx()]
    }

    #[inline(always)]
    pub fn reinforced_walls_bb(&self, c: Color) -> Bitboard81 {
        self.walls_reinf_bb[c.idx()]
    }

    /// True when the current hash has already occurred at least twice in the
    /// game history, i.e. this is the third occurrence of the position. A
    /// threefold repetition is a claimable draw, not an automatic end.
    pub fn is_repetition(&self) -> bool {
        let mut count = 0;
        for &h in &self.history {
            if h == self.hash {
                count += 1;
                if count >= 2 {
                    return true;
                }
            }
        }
        false
    }

    // -------------------------------------------------------------------------
    // Dominance and movement ranges
    // -------------------------------------------------------------------------

    /// A side has Dominance while its Sovereign stands on a Keep square.
    #[inline(always)]
    pub fn has_dominance(&self, c: Color) -> bool {
        is_keep_sq(self.sovereign_sq[c.idx()])
    }

    /// Masons step 2 instead of 1 only when the side has Dominance *and*
    /// the mason itself is on a Keep square.
    pub(crate) fn mason_move_range(&self, mason_sq: u8, c: Color) -> i32 {
        if self.has_dominance(c) && is_keep_sq(mason_sq) {
            2
        } else {
            1
        }
    }

    pub(crate) fn minister_move_range(&self, minister_sq: u8, c: Color) -> i32 {
        if self.has_dominance(c) && is_keep_sq(minister_sq) {
            3
        } else {
            2
        }
    }

    /// Zero while the side suffers Siege Attrition (more than 15 wall
    /// tokens): the Sovereign can neither move nor attack.
    pub(crate) fn sovereign_move_range(&self, sov_sq: u8, c: Color) -> i32 {
        if self.wall_tokens(c) > 15 {
            return 0;
        }
        if self.has_dominance(c) && is_keep_sq(sov_sq) {
            2
        } else {
            1
        }
    }

    // -------------------------------------------------------------------------
    // Attacks
    // -------------------------------------------------------------------------

    /// Is `square` attacked by any piece of `attacker`? Walls are never
    /// attack targets, and the same walls-block rules apply as in movement.
    pub fn is_square_attacked_by(&self, attacker: Color, square: u8) -> bool {
        if square == SQ_NONE {
            return false;
        }
        if is_wall_val(self.raw_at(square)) {
            return false;
        }

        let t = &TABLES;
        let r = row(square);
        let c = col(square);

        // Masons attack their two forward diagonals.
        {
            let f = if attacker == Color::White { -1 } else { 1 };
            let mr = r - f;
            if (0..N).contains(&mr) {
                for dc in [-1, 1] {
                    let mc = c + dc;
                    if !(0..N).contains(&mc) {
                        continue;
                    }
                    let v = self.raw_at(sq(mr, mc));
                    if is_piece_val(v)
                        && color_of(v) == attacker
                        && piece_of(v) == PieceType::Mason
                    {
                        return true;
                    }
                }
            }
        }

        // Pegasus (knight jumps).
        for i in 0..t.knight_count[square as usize] {
            let from = t.knight_targets[square as usize][i as usize];
            let v = self.raw_at(from);
            if is_piece_val(v) && color_of(v) == attacker && piece_of(v) == PieceType::Pegasus {
                return true;
            }
        }

        // Catapult (orthogonal rays, walls block).
        for dir in 0..4 {
            let len = t.ray_len[square as usize][dir];
            for step in 0..len {
                let tsq = t.ray[square as usize][dir][step as usize];
                let v = self.raw_at(tsq);
                if is_wall_val(v) {
                    break;
                }
                if is_piece_val(v) {
                    if color_of(v) == attacker && piece_of(v) == PieceType::Catapult {
                        return true;
                    }
                    break;
                }
            }
        }

        // Lancer (diagonal rays, passes through friendly Masons, walls block).
        for dir in 4..8 {
            let len = t.ray_len[square as usize][dir];
            for step in 0..len {
                let tsq = t.ray[square as usize][dir][step as usize];
                let v = self.raw_at(tsq);
                if is_wall_val(v) {
                    break;
                }
                if is_piece_val(v) {
                    if color_of(v) == attacker {
                        let pt = piece_of(v);
                        if pt == PieceType::Lancer {
                            return true;
                        }
                        if pt == PieceType::Mason {
                            continue;
                        }
                    }
                    break;
                }
            }
        }

        // Minister (range <=3) and Sovereign (range <=2) share the ray scan.
        for dir in 0..8 {
            let len = t.ray_len[square as usize][dir] as i32;
            let max_steps = len.min(3);
            for step in 0..max_steps {
                let tsq = t.ray[square as usize][dir][step as usize];
                let v = self.raw_at(tsq);
                if is_wall_val(v) {
                    break;
                }
                if is_piece_val(v) {
                    if color_of(v) == attacker {
                        let pt = piece_of(v);
                        let dist = step + 1;
                        if pt == PieceType::Minister
                            && dist <= self.minister_move_range(tsq, attacker)
                        {
                            return true;
                        }
                        if pt == PieceType::Sovereign
                            && dist <= self.sovereign_move_range(tsq, attacker)
                        {
                            return true;
                        }
                    }
                    break;
                }
            }
        }

        false
    }

    /// The union of squares `attacker`'s pieces could capture on.
    pub fn compute_attacks(&self, attacker: Color) -> Bitboard81 {
        let mut attacked = Bitboard81::EMPTY;
        let us = attacker;
        let dom = self.has_dominance(us);
        let t = &TABLES;

        // Mason forward diagonals (walls excluded as targets).
        {
            let mut bb = self.piece_bb[us.idx()][PieceType::Mason.idx()];
            let f = if us == Color::White { -1 } else { 1 };
            while let Some(s) = bb.pop_lsb() {
                let r = row(s);
                let c = col(s);
                for dc in [-1, 1] {
                    let rr = r + f;
                    let cc = c + dc;
                    if !in_bounds(rr, cc) {
                        continue;
                    }
                    let tsq = sq(rr, cc);
                    if is_wall_val(self.raw_at(tsq)) {
                        continue;
                    }
                    attacked.set(tsq);
                }
            }
        }

        // Pegasus (cannot land on walls).
        {
            let mut bb = self.piece_bb[us.idx()][PieceType::Pegasus.idx()];
            while let Some(s) = bb.pop_lsb() {
                for i in 0..t.knight_count[s as usize] {
                    let tsq = t.knight_targets[s as usize][i as usize];
                    if is_wall_val(self.raw_at(tsq)) {
                        continue;
                    }
                    attacked.set(tsq);
                }
            }
        }

        // Catapult rook rays, walls block.
        {
            let mut bb = self.piece_bb[us.idx()][PieceType::Catapult.idx()];
            while let Some(s) = bb.pop_lsb() {
                for dir in 0..4 {
                    let len = t.ray_len[s as usize][dir];
                    for step in 0..len {
                        let tsq = t.ray[s as usize][dir][step as usize];
                        let v = self.raw_at(tsq);
                        if is_wall_val(v) {
                            break;
                        }
                        attacked.set(tsq);
                        if is_piece_val(v) {
                            break;
                        }
                    }
                }
            }
        }

        // Lancer bishop rays, passing through friendly Masons.
        {
            let mut bb = self.piece_bb[us.idx()][PieceType::Lancer.idx()];
            while let Some(s) = bb.pop_lsb() {
                for dir in 4..8 {
                    let len = t.ray_len[s as usize][dir];
                    for step in 0..len {
                        let tsq = t.ray[s as usize][dir][step as usize];
                        let v = self.raw_at(tsq);
                        if is_wall_val(v) {
                            break;
                        }
                        attacked.set(tsq);
                        if is_piece_val(v) {
                            if color_of(v) == us && piece_of(v) == PieceType::Mason {
                                continue;
                            }
                            break;
                        }
                    }
                }
            }
        }

        // Minister, range 2 (3 with Dominance on a Keep square).
        {
            let mut bb = self.piece_bb[us.idx()][PieceType::Minister.idx()];
            while let Some(s) = bb.pop_lsb() {
                let max = if dom && is_keep_sq(s) { 3 } else { 2 };
                for dir in 0..8 {
                    let len = t.ray_len[s as usize][dir] as i32;
                    for step in 0..max.min(len) {
                        let tsq = t.ray[s as usize][dir][step as usize];
                        let v = self.raw_at(tsq);
                        if is_wall_val(v) {
                            break;
                        }
                        attacked.set(tsq);
                        if is_piece_val(v) {
                            break;
                        }
                    }
                }
            }
        }

        // Sovereign, range 1 (2 with Dominance on a Keep square); contributes
        // nothing under Siege Attrition.
        if self.wall_tokens(us) <= 15 {
            let mut bb = self.piece_bb[us.idx()][PieceType::Sovereign.idx()];
            while let Some(s) = bb.pop_lsb() {
                let max = if dom && is_keep_sq(s) { 2 } else { 1 };
                for dir in 0..8 {
                    let len = t.ray_len[s as usize][dir] as i32;
                    for step in 0..max.min(len) {
                        let tsq = t.ray[s as usize][dir][step as usize];
                        let v = self.raw_at(tsq);
                        if is_wall_val(v) {
                            break;
                        }
                        attacked.set(tsq);
                        if is_piece_val(v) {
                            break;
                        }
                    }
                }
            }
        }

        attacked
    }

    /// Entombed: every in-bounds neighbor of the victim's Sovereign is a
    /// wall of either color. Board edges count as blocked.
    pub fn is_entombed(&self, victim: Color) -> bool {
        let k = self.sovereign_sq(victim);
        if k == SQ_NONE {
            return false;
        }
        let t = &TABLES;
        for i in 0..t.king_count[k as usize] {
            let adj = t.king_targets[k as usize][i as usize];
            if !is_wall_val(self.raw_at(adj)) {
                return false;
            }
        }
        true
    }

    // -------------------------------------------------------------------------
    // Low-level mutation
    // -------------------------------------------------------------------------

    /// Rebuild every derived field (bitboards, sovereign squares, wall
    /// tokens, hash) from the grid and the global flags.
    pub(crate) fn rebuild_derived(&mut self) {
        for c in 0..2 {
            self.pieces_bb[c] = Bitboard81::EMPTY;
            self.walls_bb[c] = Bitboard81::EMPTY;
            self.walls_reinf_bb[c] = Bitboard81::EMPTY;
            for p in 0..PieceType::COUNT {
                self.piece_bb[c][p] = Bitboard81::EMPTY;
            }
        }
        self.wall_tokens = [0, 0];
        self.sovereign_sq = [SQ_NONE, SQ_NONE];

        let t = &TABLES;
        self.hash = 0;
        if self.turn == Color::Black {
            self.hash ^= t.turn_key;
        }
        for c in 0..2 {
            if self.bastion_right[c] {
                self.hash ^= t.bastion_keys[c];
            }
            if self.wall_built_last[c] {
                self.hash ^= t.wall_built_keys[c];
            }
        }

        for s in 0..SQ_N as u8 {
            let v = self.board[s as usize];
            if v == 0 {
                continue;
            }
            if is_piece_val(v) {
                let c = color_of(v);
                let pt = piece_of(v);
                self.piece_bb[c.idx()][pt.idx()].set(s);
                self.pieces_bb[c.idx()].set(s);
                if pt == PieceType::Sovereign {
                    self.sovereign_sq[c.idx()] = s;
                }
                self.hash ^= t.piece_keys[c.idx()][pt.idx()][s as usize];
            } else {
                let c = color_of(v);
                let hp = wall_hp(v);
                self.walls_bb[c.idx()].set(s);
                self.wall_tokens[c.idx()] += hp;
                if hp == 2 {
                    self.walls_reinf_bb[c.idx()].set(s);
                }
                self.hash ^= t.wall_keys[c.idx()][(hp - 1) as usize][s as usize];
            }
        }
    }

    /// Write one cell, keeping the bitboards and the hash in lock-step.
    /// Does not touch sovereign squares or wall-token counters; callers
    /// maintain those.
    pub(crate) fn set_square_raw(&mut self, s: u8, v: i8) {
        let old = self.board[s as usize];
        if old == v {
            return;
        }

        let t = &TABLES;

        if old != 0 {
            if is_piece_val(old) {
                let c = color_of(old);
                let pt = piece_of(old);
                self.piece_bb[c.idx()][pt.idx()].reset(s);
                self.pieces_bb[c.idx()].reset(s);
                self.hash ^= t.piece_keys[c.idx()][pt.idx()][s as usize];
            } else {
                let c = color_of(old);
                let hp = wall_hp(old);
                self.walls_bb[c.idx()].reset(s);
                if hp == 2 {
                    self.walls_reinf_bb[c.idx()].reset(s);
                }
                self.hash ^= t.wall_keys[c.idx()][(hp - 1) as usize][s as usize];
            }
        }

        self.board[s as usize] = v;

        if v != 0 {
            if is_piece_val(v) {
                let c = color_of(v);
                let pt = piece_of(v);
                self.piece_bb[c.idx()][pt.idx()].set(s);
                self.pieces_bb[c.idx()].set(s);
                self.hash ^= t.piece_keys[c.idx()][pt.idx()][s as usize];
            } else {
                let c = color_of(v);
                let hp = wall_hp(v);
                self.walls_bb[c.idx()].set(s);
                if hp == 2 {
                    self.walls_reinf_bb[c.idx()].set(s);
                }
                self.hash ^= t.wall_keys[c.idx()][(hp - 1) as usize][s as usize];
            }
        }
    }

    fn save_square(u: &mut Undo, s: u8, v: i8) {
        for i in 0..u.square_count {
            if u.squares[i as usize].0 == s {
                return;
            }
        }
        u.squares[u.square_count as usize] = (s, v);
        u.square_count += 1;
    }

    /// Demolish one wall hit point: hp 2 becomes hp 1, hp 1 removes the
    /// wall. The owner's token counter drops by 1 in both cases.
    pub(crate) fn hit_wall(&mut self, wall_sq: u8) {
        let v = self.raw_at(wall_sq);
        if !is_wall_val(v) {
            return;
        }
        let owner = color_of(v);
        if wall_hp(v) == 2 {
            self.set_square_raw(wall_sq, make_wall(owner, 1));
        } else {
            self.set_square_raw(wall_sq, 0);
        }
        self.wall_tokens[owner.idx()] -= 1;
    }

    fn set_wall_built_last(&mut self, c: Color, v: bool) {
        if self.wall_built_last[c.idx()] == v {
            return;
        }
        self.hash ^= TABLES.wall_built_keys[c.idx()];
        self.wall_built_last[c.idx()] = v;
    }

    fn consume_bastion_right(&mut self, c: Color) {
        if self.bastion_right[c.idx()] {
            self.hash ^= TABLES.bastion_keys[c.idx()];
            self.bastion_right[c.idx()] = false;
        }
    }

    /// After the action is applied: check Entombment of the enemy first
    /// (the turn does not flip on a win), otherwise flip side-to-move and
    /// bump the fullmove counter after Black's move.
    fn finalize_turn(&mut self) {
        if self.winner.is_some() {
            return;
        }

        let enemy = self.turn.other();
        if self.is_entombed(enemy) {
            self.winner = Some(self.turn);
            self.win_reason = Some(WinReason::Entombment);
            self.halfmove = 0;
            return;
        }

        self.hash ^= TABLES.turn_key;
        let prev = self.turn;
        self.turn = enemy;
        if prev == Color::Black {
            self.fullmove += 1;
        }
    }

    /// Regicide: the game ends immediately, the second half of any composite
    /// action is skipped and the turn does not flip.
    fn capture_sovereign(&mut self, u: &mut Undo, from: u8, to: u8, src_v: i8) {
        let us = self.turn;
        let them = us.other();

        Self::save_square(u, to, self.raw_at(to));
        Self::save_square(u, from, self.raw_at(from));
        self.set_square_raw(to, src_v);
        self.set_square_raw(from, 0);

        if is_piece_val(src_v) && piece_of(src_v) == PieceType::Sovereign {
            self.sovereign_sq[us.idx()] = to;
            self.consume_bastion_right(us);
        }

        self.sovereign_sq[them.idx()] = SQ_NONE;
        self.winner = Some(us);
        self.win_reason = Some(WinReason::Regicide);
        self.halfmove = 0;
        self.set_wall_built_last(us, false);
    }

    // -------------------------------------------------------------------------
    // Make / undo
    // -------------------------------------------------------------------------

    pub fn make_move(&mut self, m: Move) -> Undo {
        self.history.push(self.hash);

        let mut u = Undo {
            prev_turn: self.turn,
            prev_bastion_right: self.bastion_right,
            prev_wall_built_last: self.wall_built_last,
            prev_sovereign_sq: self.sovereign_sq,
            prev_wall_tokens: self.wall_tokens,
            prev_halfmove: self.halfmove,
            prev_fullmove: self.fullmove,
            prev_winner: self.winner,
            prev_win_reason: self.win_reason,
            squares: [(0, 0); 6],
            square_count: 0,
        };

        if self.game_over() {
            return u;
        }

        let us = self.turn;
        let them = us.other();

        match m.kind {
            MoveType::Normal => {
                let src_v = self.raw_at(m.from);
                let dst_v = self.raw_at(m.to);
                let is_cap = is_piece_val(dst_v) && color_of(dst_v) == them;
                if is_cap && piece_of(dst_v) == PieceType::Sovereign {
                    self.capture_sovereign(&mut u, m.from, m.to, src_v);
                    return u;
                }

                Self::save_square(&mut u, m.from, src_v);
                Self::save_square(&mut u, m.to, dst_v);
                self.set_square_raw(m.to, src_v);
                self.set_square_raw(m.from, 0);

                if is_piece_val(src_v) && piece_of(src_v) == PieceType::Sovereign {
                    self.sovereign_sq[us.idx()] = m.to;
                    self.consume_bastion_right(us);
                }

                self.halfmove = if is_cap { 0 } else { self.halfmove + 1 };
                self.set_wall_built_last(us, false);
                self.finalize_turn();
            }

            MoveType::MasonConstruct => {
                // The mason does not move; the wall is reinforced only when
                // the placing mason stands on a Keep square.
                let hp = if is_keep_sq(m.from) { 2 } else { 1 };

                Self::save_square(&mut u, m.to, self.raw_at(m.to));
                self.set_square_raw(m.to, make_wall(us, hp));
                self.wall_tokens[us.idx()] += hp;

                self.halfmove = 0;
                self.set_wall_built_last(us, true);
                self.finalize_turn();
            }

            MoveType::MasonCommand => {
                let src_v = self.raw_at(m.from);
                let dst_v = self.raw_at(m.to);
                let is_cap = is_piece_val(dst_v) && color_of(dst_v) == them;
                if is_cap && piece_of(dst_v) == PieceType::Sovereign {
                    // Capturing the Sovereign ends the game first; the build
                    // half of the command collapses into a no-op.
                    self.capture_sovereign(&mut u, m.from, m.to, src_v);
                    return u;
                }

                Self::save_square(&mut u, m.from, src_v);
                Self::save_square(&mut u, m.to, dst_v);
                self.set_square_raw(m.to, src_v);
                self.set_square_raw(m.from, 0);

                let mut did_wall = false;
                if m.aux1 != SQ_NONE {
                    let hp = if is_keep_sq(m.to) { 2 } else { 1 };
                    Self::save_square(&mut u, m.aux1, self.raw_at(m.aux1));
                    self.set_square_raw(m.aux1, make_wall(us, hp));
                    self.wall_tokens[us.idx()] += hp;
                    did_wall = true;
                }

                self.halfmove = if is_cap || did_wall {
                    0
                } else {
                    self.halfmove + 1
                };
                self.set_wall_built_last(us, did_wall);
                self.finalize_turn();
            }

            MoveType::CatapultRangedDemolish => {
                Self::save_square(&mut u, m.to, self.raw_at(m.to));
                self.hit_wall(m.to);
                self.halfmove = 0;
                self.set_wall_built_last(us, false);
                self.finalize_turn();
            }

            MoveType::CatapultMove => {
                let src_v = self.raw_at(m.from);
                let dst_v = self.raw_at(m.to);
                let is_cap = is_piece_val(dst_v) && color_of(dst_v) == them;
                if is_cap && piece_of(dst_v) == PieceType::Sovereign {
                    self.capture_sovereign(&mut u, m.from, m.to, src_v);
                    return u;
                }

                Self::save_square(&mut u, m.from, src_v);
                Self::save_square(&mut u, m.to, dst_v);
                self.set_square_raw(m.to, src_v);
                self.set_square_raw(m.from, 0);

                let mut did_demolish = false;
                if m.aux1 != SQ_NONE {
                    Self::save_square(&mut u, m.aux1, self.raw_at(m.aux1));
                    self.hit_wall(m.aux1);
                    did_demolish = true;
                }

                self.halfmove = if is_cap || did_demolish {
                    0
                } else {
                    self.halfmove + 1
                };
                self.set_wall_built_last(us, false);
                self.finalize_turn();
            }

            MoveType::Bastion => {
                // Swap Sovereign and Minister, then place two hp-1 walls.
                let sov_v = self.raw_at(m.from);
                let min_v = self.raw_at(m.to);

                Self::save_square(&mut u, m.from, sov_v);
                Self::save_square(&mut u, m.to, min_v);
                self.set_square_raw(m.to, sov_v);
                self.set_square_raw(m.from, min_v);

                self.sovereign_sq[us.idx()] = m.to;
                self.consume_bastion_right(us);

                Self::save_square(&mut u, m.aux1, self.raw_at(m.aux1));
                self.set_square_raw(m.aux1, make_wall(us, 1));
                self.wall_tokens[us.idx()] += 1;

                Self::save_square(&mut u, m.aux2, self.raw_at(m.aux2));
                self.set_square_raw(m.aux2, make_wall(us, 1));
                self.wall_tokens[us.idx()] += 1;

                self.halfmove = 0;
                self.set_wall_built_last(us, true);
                self.finalize_turn();
            }
        }

        u
    }

    pub fn undo_move(&mut self, u: &Undo) {
        for &(s, v) in u.changed() {
            self.set_square_raw(s, v);
        }

        self.turn = u.prev_turn;
        self.bastion_right = u.prev_bastion_right;
        self.wall_built_last = u.prev_wall_built_last;
        self.sovereign_sq = u.prev_sovereign_sq;
        self.wall_tokens = u.prev_wall_tokens;
        self.halfmove = u.prev_halfmove;
        self.fullmove = u.prev_fullmove;
        self.winner = u.prev_winner;
        self.win_reason = u.prev_win_reason;

        // make_move pushed the pre-move hash; restore it wholesale rather
        // than trusting the XOR trail.
        if let Some(h) = self.history.pop() {
            self.hash = h;
        }
    }

    /// Flip side-to-move without doing anything else (search-only).
    pub fn make_null(&mut self) -> NullUndo {
        let u = NullUndo {
            prev_turn: self.turn,
            prev_fullmove: self.fullmove,
        };
        if self.game_over() {
            return u;
        }

        let prev = self.turn;
        self.hash ^= TABLES.turn_key;
        self.turn = self.turn.other();
        if prev == Color::Black {
            self.fullmove += 1;
        }
        u
    }

    pub fn undo_null(&mut self, u: &NullUndo) {
        if u.prev_turn != self.turn {
            self.hash ^= TABLES.turn_key;
        }
        self.turn = u.prev_turn;
        self.fullmove = u.prev_fullmove;
    }

    // FEN support lives in fen.rs; these are the pieces it needs.
    pub(crate) fn set_turn_raw(&mut self, c: Color) {
        self.turn = c;
    }

    pub(crate) fn set_rights_raw(
        &mut self,
        bastion: [bool; 2],
        wall_built: [bool; 2],
        halfmove: u32,
        fullmove: u32,
    ) {
        self.bastion_right = bastion;
        self.wall_built_last = wall_built;
        self.halfmove = halfmove;
        self.fullmove = fullmove;
    }

    pub(crate) fn place_raw(&mut self, s: u8, v: i8) {
        self.board[s as usize] = v;
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Turn: {:?}  Bastion rights: {}{}  Walls: W={} B={}",
            self.turn,
            if self.bastion_right(Color::White) { "W" } else { "-" },
            if self.bastion_right(Color::Black) { "b" } else { "-" },
            self.wall_tokens(Color::White),
            self.wall_tokens(Color::Black),
        )?;
        if let (Some(winner), Some(reason)) = (self.winner, self.win_reason) {
            writeln!(f, "Winner: {winner:?} ({reason:?})")?;
        }

        writeln!(f, "   A B C D E F G H I")?;
        for r in 0..N {
            write!(f, "{}  ", N - r)?;
            for c in 0..N {
                let v = self.raw_at(sq(r, c));
                let mut ch = '.';
                if v != 0 {
                    ch = if is_piece_val(v) {
                        match piece_of(v) {
                            PieceType::Mason => 'M',
                            PieceType::Catapult => 'C',
                            PieceType::Lancer => 'L',
                            PieceType::Pegasus => 'P',
                            PieceType::Minister => 'I',
                            PieceType::Sovereign => 'S',
                        }
                    } else if wall_hp(v) == 2 {
                        'R'
                    } else {
                        'W'
                    };
                    if v < 0 {
                        ch = ch.to_ascii_lowercase();
                    }
                }
                write!(f, "{ch}")?;
                if c != N - 1 {
                    write!(f, " ")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// The in-bounds 8-neighborhood of a square.
pub fn king_ring(s: u8) -> &'static [u8] {
    let count = TABLES.king_count[s as usize] as usize;
    &TABLES.king_targets[s as usize][..count]
}

#[cfg(test)]
#[path = "board_tests.rs"]
mod board_tests;
