//! Iterative-deepening principal-variation search.
//!
//! The driver deepens from 1 to the requested depth with aspiration
//! windows, running a PVS alpha-beta underneath: PV nodes get the full
//! window, everything else a null window plus the pruning family
//! (razoring, reverse futility, null move, futility, late-move
//! pruning/reduction). Quiescence extends over noisy moves only. The
//! repetition rule is a *claimable* draw: when the position has occurred
//! twice before, the side to move can always secure 0 but is never forced
//! to take it. Stop-flag, node and time limits are polled every 2048
//! nodes; an aborted search returns the last fully completed depth.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use citadel_core::{
    is_piece_val, piece_of, Move, MoveType, PieceType, Position, SQ_N, SQ_NONE,
};

use crate::eval::{hce_eval_stm, PIECE_VALUE_ORDER};
use crate::nnue::{Accumulator, Nnue};
use crate::tt::{score_from_tt, score_to_tt, TranspositionTable, TtFlag};
use crate::zobrist::{hash_after_make, hash_after_null, hash_position};
use crate::{INF, MATE, MAX_PLY};

/// Quiescence extension cap.
const QS_MAX_DEPTH: i32 = 4;

const HISTORY_SIZE: usize = MoveType::COUNT * SQ_N * SQ_N;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalBackend {
    Hce,
    Nnue,
}

#[derive(Clone, Copy, Debug)]
pub struct SearchLimits {
    /// Maximum depth in plies; values below 1 are treated as 1.
    pub depth: i32,
    /// 0 = unlimited.
    pub node_limit: u64,
    /// 0 = unlimited.
    pub time_limit_ms: u64,
}

impl Default for SearchLimits {
    fn default() -> Self {
        SearchLimits {
            depth: 4,
            node_limit: 0,
            time_limit_ms: 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct SearchInfo {
    pub depth: i32,
    pub seldepth: i32,
    /// Centipawn-like, from the side to move.
    pub score: i32,
    pub nodes: u64,
    pub time_ms: u64,
    pub best: Move,
    pub pv: Vec<Move>,
}

pub struct SearchOptions<'a> {
    pub limits: SearchLimits,
    /// External stop signal, polled every 2048 nodes.
    pub stop: Option<&'a AtomicBool>,
    pub eval_backend: EvalBackend,
    /// Required for the NNUE backend; an unloaded model falls back to HCE.
    pub nnue: Option<&'a Nnue>,
    /// Disable when several threads search concurrently; the table is not
    /// shareable.
    pub use_tt: bool,
    /// Called after each completed depth.
    pub on_info: Option<&'a mut dyn FnMut(&SearchInfo)>,
}

impl Default for SearchOptions<'_> {
    fn default() -> Self {
        SearchOptions {
            limits: SearchLimits::default(),
            stop: None,
            eval_backend: EvalBackend::Hce,
            nnue: None,
            use_tt: true,
            on_info: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SearchResult {
    pub best: Move,
    /// Centipawn-like, from the side to move.
    pub score: i32,
    pub nodes: u64,
    pub seconds: f64,
}

#[inline(always)]
fn mate_score(ply: usize) -> i32 {
    MATE - ply as i32
}

#[inline(always)]
fn is_quiet_move(pos: &Position, m: Move) -> bool {
    m.kind == MoveType::Normal && m.to != SQ_NONE && pos.raw_at(m.to) == 0
}

#[inline(always)]
fn history_index(m: Move) -> usize {
    (m.kind.idx() * SQ_N + m.from as usize) * SQ_N + m.to as usize
}

/// Cheap static ordering: captures over wall actions over quiet moves.
fn move_heuristic(pos: &Position, m: Move) -> i32 {
    let mut sc = 0;

    match m.kind {
        MoveType::Normal | MoveType::CatapultMove | MoveType::MasonCommand => {
            let dst = pos.raw_at(m.to);
            if is_piece_val(dst) {
                sc += 10_000 + PIECE_VALUE_ORDER[piece_of(dst).idx()];
            }
        }
        MoveType::CatapultRangedDemolish => sc += 8_000,
        MoveType::MasonConstruct => sc += 6_000,
        _ => {}
    }

    let has_aux = (m.kind == MoveType::CatapultMove || m.kind == MoveType::MasonCommand)
        && m.aux1 != SQ_NONE;
    if has_aux {
        sc += 1_000;
    }

    sc
}

fn non_sovereign_pieces(pos: &Position, c: citadel_core::Color) -> i32 {
    (pos.piece_count(c, PieceType::Mason)
        + pos.piece_count(c, PieceType::Catapult)
        + pos.piece_count(c, PieceType::Lancer)
        + pos.piece_count(c, PieceType::Pegasus)
        + pos.piece_count(c, PieceType::Minister)) as i32
}

/// Per-search bookkeeping: limits, counters, abort state.
struct Ctx<'a> {
    stop: Option<&'a AtomicBool>,
    nnue: Option<&'a Nnue>,
    use_nnue: bool,
    use_tt: bool,

    start: Instant,
    deadline: Option<Instant>,
    node_limit: u64,

    nodes: u64,
    seldepth: i32,
    aborted: bool,
}

impl Ctx<'_> {
    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn signal_stop(&self) {
        if let Some(stop) = self.stop {
            stop.store(true, Ordering::Relaxed);
        }
    }

    /// Cheap mask test; the real checks run every 2048 nodes.
    fn should_stop(&mut self) -> bool {
        if self.aborted {
            return true;
        }
        if self.nodes & 2047 != 0 {
            return false;
        }
        if let Some(stop) = self.stop {
            if stop.load(Ordering::Relaxed) {
                self.aborted = true;
                return true;
            }
        }
        if self.node_limit != 0 && self.nodes >= self.node_limit {
            self.aborted = true;
            self.signal_stop();
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.aborted = true;
                self.signal_stop();
                return true;
            }
        }
        false
    }
}

struct RootOut {
    score: i32,
    best: Move,
}

/// One search instance: owns the transposition table, the killer/history
/// heuristics and the per-ply buffers (move lists and NNUE accumulators
/// are too big for the recursion stack, so they live here indexed by ply).
pub struct Searcher {
    tt: TranspositionTable,
    killers: Vec<[Move; 2]>,
    history: Vec<i32>,
    moves: Vec<Vec<Move>>,
    scores: Vec<Vec<i32>>,
    accs: Vec<Accumulator>,
}

impl Default for Searcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Searcher {
    /// Default 16 MiB table.
    pub fn new() -> Self {
        Self::with_tt_mb(16)
    }

    pub fn with_tt_mb(mb: usize) -> Self {
        Searcher {
            tt: TranspositionTable::new(mb),
            killers: vec![[Move::NULL; 2]; MAX_PLY],
            history: vec![0; HISTORY_SIZE],
            moves: (0..MAX_PLY).map(|_| Vec::with_capacity(128)).collect(),
            scores: (0..MAX_PLY).map(|_| Vec::with_capacity(128)).collect(),
            accs: vec![Accumulator::default(); MAX_PLY],
        }
    }

    pub fn set_tt_size_mb(&mut self, mb: usize) {
        self.tt.resize(mb);
    }

    pub fn tt_size_mb(&self) -> usize {
        self.tt.size_mb()
    }

    pub fn clear_tt(&mut self) {
        self.tt.clear();
    }

    fn reset_heuristics(&mut self) {
        for k in &mut self.killers {
            *k = [Move::NULL; 2];
        }
        self.history.fill(0);
    }

    // -------------------------------------------------------------------------
    // Ordering heuristics
    // -------------------------------------------------------------------------

    fn history_score(&self, m: Move) -> i32 {
        if m.from as usize >= SQ_N || m.to as usize >= SQ_N {
            return 0;
        }
        self.history[history_index(m)]
    }

    fn record_quiet_cutoff(&mut self, m: Move, ply: usize, depth: i32) {
        if ply >= MAX_PLY {
            return;
        }

        if self.killers[ply][0] != m {
            self.killers[ply][1] = self.killers[ply][0];
            self.killers[ply][0] = m;
        }

        if (m.from as usize) < SQ_N && (m.to as usize) < SQ_N {
            let idx = history_index(m);
            let bonus = depth * depth;
            self.history[idx] = (self.history[idx] + bonus).min(1_000_000);
        }
    }

    fn order_score(&self, pos: &Position, m: Move, tt_best: Move, ply: usize) -> i32 {
        if tt_best.to != SQ_NONE && m == tt_best {
            return 1_000_000_000;
        }

        let mut sc = move_heuristic(pos, m);
        if is_quiet_move(pos, m) {
            if m == self.killers[ply][0] {
                sc += 900_000;
            } else if m == self.killers[ply][1] {
                sc += 800_000;
            }
            sc += self.history_score(m);
        }
        sc
    }

    // -------------------------------------------------------------------------
    // Evaluation plumbing
    // -------------------------------------------------------------------------

    fn eval_stm(&self, pos: &Position, ctx: &Ctx, ply: usize) -> i32 {
        if ctx.use_nnue && ply < MAX_PLY {
            if let Some(nnue) = ctx.nnue {
                return nnue.evaluate_stm(pos, &self.accs[ply]);
            }
        }
        hce_eval_stm(pos)
    }

    fn cached_eval(&self, pos: &Position, ctx: &Ctx, ply: usize, cache: &mut Option<i32>) -> i32 {
        match *cache {
            Some(v) => v,
            None => {
                let v = self.eval_stm(pos, ctx, ply);
                *cache = Some(v);
                v
            }
        }
    }

    /// Copy the parent ply's accumulator into the child slot.
    fn copy_acc(&mut self, ply: usize) {
        let (head, tail) = self.accs.split_at_mut(ply + 1);
        tail[0] = head[ply];
    }

    // -------------------------------------------------------------------------
    // Quiescence
    // -------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn quiescence(
        &mut self,
        pos: &mut Position,
        mut alpha: i32,
        beta: i32,
        ctx: &mut Ctx,
        ply: usize,
        key: u64,
        q_depth: i32,
    ) -> i32 {
        ctx.nodes += 1;
        if ply as i32 > ctx.seldepth {
            ctx.seldepth = ply as i32;
        }
        if ctx.should_stop() {
            return 0;
        }

        // In this state model the side to move is the winner.
        if pos.game_over() {
            return mate_score(ply);
        }
        if ply >= MAX_PLY {
            return self.eval_stm(pos, ctx, ply);
        }

        // A claimable threefold draw is an available action here too.
        if ply > 0 && pos.is_repetition() {
            if alpha < 0 {
                alpha = 0;
            }
            if alpha >= beta {
                return alpha;
            }
        }

        let stand = self.eval_stm(pos, ctx, ply);
        if stand >= beta {
            return beta;
        }
        if stand > alpha {
            alpha = stand;
        }
        if q_depth <= 0 {
            return alpha;
        }

        let mut moves = std::mem::take(&mut self.moves[ply]);
        pos.generate_noisy_moves_into(&mut moves);
        if moves.is_empty() {
            self.moves[ply] = moves;
            return alpha;
        }

        let mut scores = std::mem::take(&mut self.scores[ply]);
        scores.clear();
        scores.extend(moves.iter().map(|&m| move_heuristic(pos, m)));

        let mut result = None;
        for i in 0..moves.len() {
            // Selection-order the best remaining move to the front.
            let mut best_idx = i;
            for j in (i + 1)..moves.len() {
                if scores[j] > scores[best_idx] {
                    best_idx = j;
                }
            }
            moves.swap(i, best_idx);
            scores.swap(i, best_idx);

            let m = moves[i];
            if ctx.use_nnue && ply + 1 < MAX_PLY {
                self.copy_acc(ply);
            }
            let u = pos.make_move(m);
            if ctx.use_nnue && ply + 1 < MAX_PLY {
                if let Some(nnue) = ctx.nnue {
                    nnue.apply_delta_after_move(&mut self.accs[ply + 1], pos, &u);
                }
            }
            let child_key = hash_after_make(key, pos, &u);

            let score = if pos.game_over() {
                mate_score(ply + 1)
            } else {
                -self.quiescence(pos, -beta, -alpha, ctx, ply + 1, child_key, q_depth - 1)
            };

            pos.undo_move(&u);

            if ctx.aborted {
                result = Some(0);
                break;
            }
            if score >= beta {
                result = Some(beta);
                break;
            }
            if score > alpha {
                alpha = score;
            }
        }

        self.moves[ply] = moves;
        self.scores[ply] = scores;
        result.unwrap_or(alpha)
    }

    // -------------------------------------------------------------------------
    // PVS negamax
    // -------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn negamax(
        &mut self,
        pos: &mut Position,
        depth: i32,
        mut alpha: i32,
        mut beta: i32,
        ctx: &mut Ctx,
        ply: usize,
        key: u64,
        pv_node: bool,
    ) -> i32 {
        // The draw claim is an option for the side to move, never forced:
        // a losing side takes the 0, a winning side plays on.
        let can_claim_draw = ply > 0 && pos.is_repetition();
        if depth <= 0 {
            let q = self.quiescence(pos, alpha, beta, ctx, ply, key, QS_MAX_DEPTH);
            return if can_claim_draw { q.max(0) } else { q };
        }

        ctx.nodes += 1;
        if ply as i32 > ctx.seldepth {
            ctx.seldepth = ply as i32;
        }
        if ctx.should_stop() {
            return 0;
        }

        if pos.game_over() {
            return mate_score(ply);
        }
        if ply >= MAX_PLY {
            return self.eval_stm(pos, ctx, ply);
        }

        let alpha_orig = alpha;

        let mut best = -INF;
        if can_claim_draw {
            best = 0;
            if best > alpha {
                alpha = best;
            }
            if alpha >= beta {
                return best;
            }
        }

        // Mate-distance pruning.
        alpha = alpha.max(-MATE + ply as i32);
        beta = beta.min(MATE - ply as i32 - 1);
        if alpha >= beta {
            return alpha;
        }

        // Transposition probe.
        let mut tt_best = Move::NULL;
        if ctx.use_tt {
            if let Some(e) = self.tt.probe(key) {
                tt_best = e.best;
                if e.depth >= depth {
                    let mut tt_score = score_from_tt(e.score, ply as i32);
                    // With a draw claim in hand the node is worth at least 0.
                    if can_claim_draw && tt_score < 0 {
                        tt_score = 0;
                    }
                    match e.flag {
                        TtFlag::Exact => {
                            // An Exact 0 can be history-dependent when a
                            // claim is available; don't short-circuit a
                            // potentially winning continuation.
                            if !can_claim_draw || tt_score != 0 {
                                return tt_score;
                            }
                        }
                        TtFlag::Lower => {
                            if tt_score >= beta {
                                return tt_score;
                            }
                        }
                        TtFlag::Upper => {
                            if tt_score <= alpha {
                                return tt_score;
                            }
                        }
                    }
                }
            }
        }

        let mut static_eval = None;

        // Freshly trained nets mis-score odd positions more often than the
        // HCE does; keep eval-based pruning conservative under NNUE.
        let conservative = ctx.use_nnue;

        // Razoring at shallow depth: hopeless nodes drop to quiescence.
        if !pv_node && depth <= 2 && !conservative {
            let ev = self.cached_eval(pos, ctx, ply, &mut static_eval);
            let razor_margin = 220 + (depth - 1) * 180;
            if ev + razor_margin <= alpha {
                return self.quiescence(pos, alpha, beta, ctx, ply, key, QS_MAX_DEPTH);
            }
        }

        // Reverse futility (fail-high) at shallow depth.
        if !pv_node && depth <= 2 && !conservative {
            let ev = self.cached_eval(pos, ctx, ply, &mut static_eval);
            if ev - (160 + depth * 120) >= beta {
                return ev;
            }
        }

        // Null move, guarded by material to limit zugzwang damage.
        let null_min_depth = if ctx.use_nnue { 4 } else { 3 };
        let null_min_pieces = if ctx.use_nnue { 4 } else { 3 };
        if !pv_node
            && depth >= null_min_depth
            && ply > 0
            && non_sovereign_pieces(pos, pos.turn()) >= null_min_pieces
        {
            let r = if ctx.use_nnue {
                1 + i32::from(depth >= 7)
            } else {
                2 + i32::from(depth >= 6)
            };
            if ctx.use_nnue && ply + 1 < MAX_PLY {
                self.copy_acc(ply);
            }
            let nu = pos.make_null();
            if ctx.use_nnue && ply + 1 < MAX_PLY {
                if let Some(nnue) = ctx.nnue {
                    nnue.apply_delta_after_null(&mut self.accs[ply + 1], pos, &nu);
                }
            }
            let null_key = hash_after_null(key, pos, &nu);
            let score = -self.negamax(
                pos,
                depth - 1 - r,
                -beta,
                -(beta - 1),
                ctx,
                ply + 1,
                null_key,
                false,
            );
            pos.undo_null(&nu);
            if ctx.aborted {
                return 0;
            }
            if score >= beta {
                return beta;
            }
        }

        let mut moves = std::mem::take(&mut self.moves[ply]);
        pos.generate_moves_into(&mut moves);
        if moves.is_empty() {
            self.moves[ply] = moves;
            return self.cached_eval(pos, ctx, ply, &mut static_eval);
        }

        let mut scores = std::mem::take(&mut self.scores[ply]);
        scores.clear();
        scores.extend(moves.iter().map(|&m| self.order_score(pos, m, tt_best, ply)));

        let mut best_move = moves[0];
        let mut result = None;

        for i in 0..moves.len() {
            let mut best_idx = i;
            for j in (i + 1)..moves.len() {
                if scores[j] > scores[best_idx] {
                    best_idx = j;
                }
            }
            moves.swap(i, best_idx);
            scores.swap(i, best_idx);

            let m = moves[i];
            let quiet = is_quiet_move(pos, m);

            // Futility at the frontier: skip quiet moves that cannot raise
            // alpha.
            if !pv_node && depth == 1 && quiet {
                let ev = self.cached_eval(pos, ctx, ply, &mut static_eval);
                let margin = if ctx.use_nnue { 340 } else { 220 };
                if ev + margin <= alpha {
                    continue;
                }
            }

            // Late-move pruning at depth 2; matters most in locked wall
            // endgames with huge move lists.
            if !pv_node && depth == 2 && quiet {
                let ev = self.cached_eval(pos, ctx, ply, &mut static_eval);
                let move_count = if ctx.use_nnue { 32 } else { 20 };
                let margin = if ctx.use_nnue { 200 } else { 140 };
                if i >= move_count && ev + margin <= alpha {
                    continue;
                }
            }

            if ctx.use_nnue && ply + 1 < MAX_PLY {
                self.copy_acc(ply);
            }
            let u = pos.make_move(m);
            if ctx.use_nnue && ply + 1 < MAX_PLY {
                if let Some(nnue) = ctx.nnue {
                    nnue.apply_delta_after_move(&mut self.accs[ply + 1], pos, &u);
                }
            }
            let child_key = hash_after_make(key, pos, &u);

            let mut score;
            if pos.game_over() {
                score = mate_score(ply + 1);
            } else {
                let new_depth = depth - 1;
                if pv_node && i == 0 {
                    score =
                        -self.negamax(pos, new_depth, -beta, -alpha, ctx, ply + 1, child_key, true);
                } else {
                    // Null-window probe, reduced for late quiet moves. PV
                    // nodes reduce too; the re-search below undoes a wrong
                    // guess at full depth and window.
                    let do_lmr = quiet && depth >= 3 && i >= 4;
                    let mut search_depth = new_depth;
                    if do_lmr {
                        let r = 1 + i32::from(i >= 8) + i32::from(depth >= 6);
                        search_depth = (new_depth - r).max(1);
                    }

                    score = -self.negamax(
                        pos,
                        search_depth,
                        -(alpha + 1),
                        -alpha,
                        ctx,
                        ply + 1,
                        child_key,
                        false,
                    );
                    if !ctx.aborted && score > alpha {
                        if do_lmr && search_depth != new_depth {
                            score = -self.negamax(
                                pos,
                                new_depth,
                                -(alpha + 1),
                                -alpha,
                                ctx,
                                ply + 1,
                                child_key,
                                false,
                            );
                        }
                        if score > alpha && score < beta {
                            score = -self.negamax(
                                pos, new_depth, -beta, -alpha, ctx, ply + 1, child_key, true,
                            );
                        }
                    }
                }
            }

            pos.undo_move(&u);

            if ctx.aborted {
                result = Some(0);
                break;
            }

            if score > best {
                best = score;
                best_move = m;
            }
            if best > alpha {
                alpha = best;
            }
            if alpha >= beta {
                if quiet {
                    self.record_quiet_cutoff(m, ply, depth);
                }
                break;
            }
        }

        self.moves[ply] = moves;
        self.scores[ply] = scores;

        if let Some(r) = result {
            return r;
        }

        if ctx.use_tt {
            let flag = if best <= alpha_orig {
                TtFlag::Upper
            } else if best >= beta {
                TtFlag::Lower
            } else {
                TtFlag::Exact
            };
            self.tt
                .store(key, depth, flag, score_to_tt(best, ply as i32), best_move);
        }

        best
    }

    // -------------------------------------------------------------------------
    // Root
    // -------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn search_root(
        &mut self,
        pos: &mut Position,
        root_key: u64,
        root_moves: &mut [Move],
        depth: i32,
        mut alpha: i32,
        beta: i32,
        ctx: &mut Ctx,
    ) -> RootOut {
        let mut out = RootOut {
            score: -INF,
            best: Move::NULL,
        };
        if root_moves.is_empty() {
            return out;
        }

        let mut tt_best = Move::NULL;
        if ctx.use_tt {
            if let Some(e) = self.tt.probe(root_key) {
                tt_best = e.best;
            }
        }

        let mut scores: Vec<i32> = root_moves
            .iter()
            .map(|&m| self.order_score(pos, m, tt_best, 0))
            .collect();

        let alpha0 = alpha;
        let mut best_score = -INF;
        let mut best_move = root_moves[0];

        for i in 0..root_moves.len() {
            let mut best_idx = i;
            for j in (i + 1)..root_moves.len() {
                if scores[j] > scores[best_idx] {
                    best_idx = j;
                }
            }
            root_moves.swap(i, best_idx);
            scores.swap(i, best_idx);

            let m = root_moves[i];
            if ctx.use_nnue {
                self.copy_acc(0);
            }
            let u = pos.make_move(m);
            if ctx.use_nnue {
                if let Some(nnue) = ctx.nnue {
                    nnue.apply_delta_after_move(&mut self.accs[1], pos, &u);
                }
            }
            let child_key = hash_after_make(root_key, pos, &u);

            let score;
            if pos.game_over() {
                score = mate_score(1);
            } else if i == 0 {
                score = -self.negamax(pos, depth - 1, -beta, -alpha, ctx, 1, child_key, true);
            } else {
                let probe =
                    -self.negamax(pos, depth - 1, -(alpha + 1), -alpha, ctx, 1, child_key, false);
                score = if !ctx.aborted && probe > alpha && probe < beta {
                    -self.negamax(pos, depth - 1, -beta, -alpha, ctx, 1, child_key, true)
                } else {
                    probe
                };
            }

            pos.undo_move(&u);
            if ctx.aborted {
                break;
            }

            if score > best_score {
                best_score = score;
                best_move = m;
            }
            if score > alpha {
                alpha = score;
            }
            if alpha >= beta {
                // An aspiration fail-high can cut at the root too.
                if is_quiet_move(pos, m) {
                    self.record_quiet_cutoff(m, 0, depth);
                }
                break;
            }
        }

        // The root entry anchors next iteration's ordering and the PV walk.
        if ctx.use_tt {
            let flag = if best_score <= alpha0 {
                TtFlag::Upper
            } else if best_score >= beta {
                TtFlag::Lower
            } else {
                TtFlag::Exact
            };
            self.tt
                .store_root(root_key, depth, flag, score_to_tt(best_score, 0), best_move);
        }

        out.score = best_score;
        out.best = best_move;
        out
    }

    /// Walk the table from the root key, following stored best moves.
    fn extract_pv(&self, root: &Position, mut key: u64, max_len: usize) -> Vec<Move> {
        let mut pv = Vec::new();
        if max_len == 0 {
            return pv;
        }

        let mut pos = root.clone();
        let mut seen = Vec::with_capacity(max_len);

        for _ in 0..max_len {
            if pos.game_over() {
                break;
            }
            // Stop on the first repeated key: a PV that cycles is done.
            if seen.contains(&key) {
                break;
            }
            seen.push(key);

            let best = match self.tt.probe(key) {
                Some(e) if e.best.to != SQ_NONE => e.best,
                _ => break,
            };

            let moves = pos.generate_moves();
            if !moves.contains(&best) {
                break;
            }

            pv.push(best);
            let u = pos.make_move(best);
            key = hash_after_make(key, &pos, &u);
        }

        pv
    }

    // -------------------------------------------------------------------------
    // Driver
    // -------------------------------------------------------------------------

    pub fn search(&mut self, pos: &mut Position, mut opt: SearchOptions) -> SearchResult {
        let t0 = Instant::now();

        let use_nnue = opt.eval_backend == EvalBackend::Nnue
            && opt.nnue.is_some_and(|n| n.loaded());

        let mut ctx = Ctx {
            stop: opt.stop,
            nnue: opt.nnue,
            use_nnue,
            use_tt: opt.use_tt,
            start: t0,
            deadline: (opt.limits.time_limit_ms != 0)
                .then(|| t0 + Duration::from_millis(opt.limits.time_limit_ms)),
            node_limit: opt.limits.node_limit,
            nodes: 0,
            seldepth: 0,
            aborted: false,
        };

        self.reset_heuristics();

        let max_depth = opt.limits.depth.clamp(1, MAX_PLY as i32 - 1);

        let mut root_moves = pos.generate_moves();
        if root_moves.is_empty() {
            return SearchResult {
                best: Move::NULL,
                score: 0,
                nodes: 0,
                seconds: t0.elapsed().as_secs_f64(),
            };
        }

        if ctx.use_nnue {
            if let Some(nnue) = ctx.nnue {
                nnue.init_accumulator(pos, &mut self.accs[0]);
            }
        }

        let root_key = hash_position(pos);

        let mut best_move = root_moves[0];
        let mut best_score = -INF;
        let mut prev_score = 0;
        let mut last_completed_depth = 0;

        for cur_depth in 1..=max_depth {
            if ctx.should_stop() {
                break;
            }
            ctx.seldepth = 0;

            let mut alpha = -INF;
            let mut beta = INF;
            let mut window = if cur_depth <= 2 { 140 } else { 90 };
            if cur_depth > 1 {
                alpha = prev_score - window;
                beta = prev_score + window;
            }

            let mut iter;
            loop {
                iter = self.search_root(pos, root_key, &mut root_moves, cur_depth, alpha, beta, &mut ctx);
                if ctx.aborted || cur_depth == 1 {
                    break;
                }
                if iter.score <= alpha {
                    // Fail-low: open the bottom of the window.
                    alpha = -INF;
                    window *= 2;
                    beta = iter.score + window;
                    continue;
                }
                if iter.score >= beta {
                    // Fail-high: open the top.
                    beta = INF;
                    window *= 2;
                    alpha = iter.score - window;
                    continue;
                }
                break;
            }

            if ctx.aborted {
                break;
            }

            best_move = iter.best;
            best_score = iter.score;
            prev_score = best_score;
            last_completed_depth = cur_depth;

            if let Some(cb) = opt.on_info.as_mut() {
                let pv = if ctx.use_tt {
                    self.extract_pv(pos, root_key, (MAX_PLY - 1).min(cur_depth as usize + 16))
                } else {
                    Vec::new()
                };
                let info = SearchInfo {
                    depth: cur_depth,
                    seldepth: ctx.seldepth,
                    score: best_score,
                    nodes: ctx.nodes,
                    time_ms: ctx.elapsed_ms(),
                    best: best_move,
                    pv,
                };
                cb(&info);
            }
        }

        // Nothing completed (very short limits): fall back to the table or
        // a raw static eval.
        if last_completed_depth == 0 {
            best_move = root_moves[0];
            best_score = self.eval_stm(pos, &ctx, 0);
            if ctx.use_tt {
                if let Some(e) = self.tt.probe(root_key) {
                    // Validate the stored move at the root; collisions would
                    // otherwise hand back an illegal move.
                    if e.best.to != SQ_NONE && root_moves.contains(&e.best) {
                        best_move = e.best;
                    }
                    best_score = score_from_tt(e.score, 0);
                }
            }
        }

        SearchResult {
            best: best_move,
            score: best_score,
            nodes: ctx.nodes,
            seconds: t0.elapsed().as_secs_f64(),
        }
    }

    /// Depth-limited convenience wrapper.
    pub fn search_depth(&mut self, pos: &mut Position, depth: i32) -> SearchResult {
        self.search(
            pos,
            SearchOptions {
                limits: SearchLimits {
                    depth,
                    ..SearchLimits::default()
                },
                ..SearchOptions::default()
            },
        )
    }
}

#[cfg(test)]
#[path = "search_tests.rs"]
mod search_tests;
