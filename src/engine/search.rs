/*
  Corvid, a UCI-compatible chess engine.

  This program is free software: you can redistribute it and/or modify
  it under the terms of the GNU General Public License as published by
  the Free Software Foundation, either version 3 of the License, or
  (at your option) any later version.

  This program is distributed in the hope that it will be useful,
  but WITHOUT ANY WARRANTY; without even the implied warranty of
  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
  GNU General Public License for more details.
*/
//! Iterative-deepening negamax with alpha-beta pruning and a quiescence
//! extension.
//!
//! The search has no transposition table (that machinery is reserved for
//! perft alone) and uses copy/make: every recursive call snapshots `Position`
//! by value rather than undoing moves.

use crate::base::movegen::{gen_all, gen_attacks_and_queen_promos};
use crate::base::{Move, Piece, Position};
use super::time::{Timer, NODES_PER_TIME_POLL};

/// Search to at most this many plies of iterative deepening.
pub const MAX_DEPTH: u8 = 60;
/// Hard ceiling on recursion depth (iterative deepening + quiescence +
/// check-extension), sizing the PV/repetition stacks.
pub const MAX_PLY: usize = 80;
/// Capacity of the repetition-history ring.
pub const MAX_GAME_LENGTH: usize = 1024;

/// A centipawn evaluation so extreme it must represent an unreachable
/// alpha-beta window bound rather than a real position.
pub const INFINITY_CP: i32 = 30_000;
/// Score returned for a drawn position (repetition or fifty-move).
pub const DRAW_CP: i32 = 0;
/// Scores at or beyond this magnitude (in absolute value) are mate scores;
/// see `mate_distance`.
pub const LONGEST_CHECKMATE: i32 = 9000;
/// Ordering score given to the previous iteration's PV move: higher than any
/// MVV-LVA entry, so it is always searched first.
const BEST_MOVE_SCORE: u16 = 8000;

/// MVV-LVA table, `[victim_kind][attacker_kind]`, Pawn..King. A "None"
/// victim (quiet move) is handled separately and scores 0; King can never be
/// captured and is included only to keep the table square.
const MVV_LVA: [[u16; 6]; 6] = {
    let mut table = [[0u16; 6]; 6];
    let mut victim = 0;
    while victim < 5 {
        // victims Pawn..Queen; each victim owns six consecutive scores
        // (10*victim + 10 .. 10*victim + 15), ordered by decreasing
        // attacker value so the cheapest attacker sorts first.
        let base = 10 * (victim as u16 + 1);
        let mut attacker = 0;
        while attacker < 6 {
            table[victim][attacker] = base + attacker as u16;
            attacker += 1;
        }
        victim += 1;
    }
    table
};

/// A fixed-capacity best-line buffer for one ply.
#[derive(Clone)]
pub struct PVLine {
    moves: Vec<Move>,
}

impl PVLine {
    fn empty() -> PVLine {
        PVLine { moves: Vec::new() }
    }

    fn clear(&mut self) {
        self.moves.clear();
    }

    /// Replace this line with `m` followed by `child`'s moves.
    fn set(&mut self, m: Move, child: &PVLine) {
        self.moves.clear();
        self.moves.push(m);
        self.moves.extend_from_slice(&child.moves);
    }

    #[must_use]
    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    #[must_use]
    pub fn best_move(&self) -> Option<Move> {
        self.moves.first().copied()
    }
}

/// The search workspace: current position, PV lines per ply, repetition
/// history, and bookkeeping. The copy/make snapshot stack is realized as
/// Rust's own call stack: each recursive `negamax`/`qsearch` frame owns its
/// own `Position` copy (`after`) rather than a separately maintained
/// `Vec<Position>`.
pub struct SearchData {
    root: Position,
    pv: Vec<PVLine>,
    repetition: Vec<u64>,
    prev_pv: PVLine,
    nodes: u64,
    timer: Timer,
}

impl SearchData {
    #[must_use]
    pub fn new(root: Position, timer: Timer) -> SearchData {
        SearchData {
            root,
            pv: vec![PVLine::empty(); MAX_PLY],
            repetition: Vec::with_capacity(MAX_GAME_LENGTH),
            prev_pv: PVLine::empty(),
            nodes: 0,
            timer,
        }
    }

    /// Reset game-lifetime state (repetition history, previous PV) between
    /// games, keeping the allocated buffers.
    pub fn new_game(&mut self) {
        self.repetition.clear();
        self.prev_pv.clear();
    }

    #[must_use]
    pub fn nodes(&self) -> u64 {
        self.nodes
    }

    #[must_use]
    pub fn timer_mut(&mut self) -> &mut Timer {
        &mut self.timer
    }

    /// Record a position's hash as having been reached along the game (not
    /// search) history, so in-search repetition detection can see past
    /// moves actually played.
    pub fn push_game_history(&mut self, hash: u64) {
        self.repetition.push(hash);
    }

    /// Quiescence-search `pos` to a quiet descendant and return its FEN and
    /// score, for sampling labeled training positions: `pos` itself may sit
    /// mid-capture-sequence, so the position actually worth labeling is the
    /// one at the end of qsearch's principal variation, not `pos` as given.
    pub fn quiescence_fen(&mut self, pos: &Position) -> (String, i32) {
        self.nodes = 0;
        self.pv = vec![PVLine::empty(); MAX_PLY];
        let score = self.qsearch(pos, -INFINITY_CP, INFINITY_CP, 0);

        let mut quiet = *pos;
        for m in self.pv[0].moves() {
            quiet.do_move(*m);
        }
        (quiet.to_fen(), score)
    }

    /// `pos` is assumed to already be the most recently pushed entry of
    /// `self.repetition` (its hash was recorded on the way into this node),
    /// so only strictly earlier entries count toward repetition.
    fn is_draw(&self, pos: &Position) -> bool {
        if pos.half_move() >= 100 {
            return true;
        }
        match self.repetition.len() {
            0 => false,
            n => self.repetition[..n - 1].iter().any(|&h| h == pos.hash()),
        }
    }

    /// Run iterative deepening from depth 1 to `MAX_DEPTH`, calling
    /// `on_iteration(depth, score, nodes, elapsed_ms, pv)` after every
    /// completed iteration (the UCI `info` line is built from this
    /// callback).
    pub fn iterative_deepening(
        &mut self,
        mut on_iteration: impl FnMut(u8, i32, u64, u128, &[Move]),
    ) -> Move {
        self.timer.start();
        let mut best_move = Move::NULL;

        for depth in 1..=MAX_DEPTH {
            self.nodes = 0;
            self.pv = vec![PVLine::empty(); MAX_PLY];
            let root = self.root;
            let score = self.negamax(&root, -INFINITY_CP, INFINITY_CP, depth, 0, true);

            if self.timer.is_stopped() && depth > 1 {
                break;
            }

            if let Some(m) = self.pv[0].best_move() {
                best_move = m;
                self.prev_pv = self.pv[0].clone();
                on_iteration(
                    depth,
                    score,
                    self.nodes,
                    self.timer.elapsed().as_millis(),
                    self.pv[0].moves(),
                );
            }

            if self.timer.is_stopped() {
                break;
            }
        }

        best_move
    }

    #[allow(clippy::too_many_arguments)]
    fn negamax(&mut self, pos: &Position, mut alpha: i32, beta: i32, mut depth: u8, ply: usize, is_root: bool) -> i32 {
        if self.nodes % NODES_PER_TIME_POLL == 0 {
            self.timer.update();
        }
        if self.timer.is_stopped() {
            return 0;
        }

        self.pv[ply].clear();

        let in_check = pos.is_side_in_check(pos.side());
        if !is_root && self.is_draw(pos) {
            return DRAW_CP;
        }
        if in_check && depth <= 2 {
            depth += 1;
        }
        if depth == 0 {
            return self.qsearch(pos, alpha, beta, ply);
        }

        self.nodes += 1;

        let mut moves = gen_all(pos);
        score_moves(pos, &mut moves, self.prev_pv.moves().get(ply).copied());

        let mut any_legal = false;
        let mut best_score = -INFINITY_CP;

        for i in 0..moves.len() {
            select_best(&mut moves, i);
            let m = moves[i];

            let mut after = *pos;
            after.do_move(m);
            if after.is_side_in_check(pos.side()) {
                continue;
            }
            any_legal = true;

            self.repetition.push(after.hash());

            let s = -self.negamax(&after, -beta, -alpha, depth - 1, ply + 1, false);

            self.repetition.pop();

            if s >= beta {
                return beta;
            }
            if s > best_score {
                best_score = s;
            }
            if s > alpha {
                alpha = s;
                let (head, tail) = self.pv.split_at_mut(ply + 1);
                head[ply].set(m, &tail[0]);
            }
        }

        if !any_legal {
            return if in_check {
                #[allow(clippy::cast_possible_wrap)]
                let ply_i32 = ply as i32;
                -INFINITY_CP + ply_i32
            } else {
                DRAW_CP
            };
        }

        alpha
    }

    fn qsearch(&mut self, pos: &Position, mut alpha: i32, beta: i32, ply: usize) -> i32 {
        if self.nodes % NODES_PER_TIME_POLL == 0 {
            self.timer.update();
        }
        if self.timer.is_stopped() {
            return 0;
        }

        self.nodes += 1;
        self.pv[ply].clear();

        if ply >= MAX_PLY - 1 {
            return pos.static_eval();
        }

        let eval = pos.static_eval();
        if eval >= beta {
            return beta;
        }
        if eval > alpha {
            alpha = eval;
        }

        let mut moves = gen_attacks_and_queen_promos(pos);
        score_moves(pos, &mut moves, self.prev_pv.moves().get(ply).copied());

        for i in 0..moves.len() {
            select_best(&mut moves, i);
            let m = moves[i];

            let mut after = *pos;
            after.do_move(m);
            if after.is_side_in_check(pos.side()) {
                continue;
            }

            let s = -self.qsearch(&after, -beta, -alpha, ply + 1);

            if s >= beta {
                return beta;
            }
            if s > alpha {
                alpha = s;
                let (head, tail) = self.pv.split_at_mut(ply + 1);
                head[ply].set(m, &tail[0]);
            }
        }

        alpha
    }
}

/// Assign each move's 13-bit ordering score: `BEST_MOVE_SCORE` for the
/// previous iteration's PV move, else MVV-LVA, else 0 for quiet moves.
fn score_moves(pos: &Position, moves: &mut [Move], pv_move: Option<Move>) {
    for m in moves.iter_mut() {
        let score = if pv_move.is_some_and(|pv| pv.same_move(*m)) {
            BEST_MOVE_SCORE
        } else if m.kind().is_capture() {
            MVV_LVA[victim_kind(pos, *m) as usize][m.from_piece() as usize]
        } else {
            0
        };
        *m = m.with_score(score);
    }
}

/// The piece kind captured by `m`: an en-passant victim is always a pawn on
/// `to±8`; every other capture's victim stands on the destination square
/// itself, before the move is applied.
fn victim_kind(pos: &Position, m: Move) -> Piece {
    use crate::base::MoveKind::{BlackAttackEp, WhiteAttackEp};
    match m.kind() {
        WhiteAttackEp | BlackAttackEp => Piece::Pawn,
        _ => pos
            .piece_on(m.to_square())
            .map_or(Piece::Pawn, |(kind, _)| kind),
    }
}

/// Lazy selection sort: find the highest-scoring move at or after `from` and
/// swap it into place. Cheaper than a full sort when most nodes cut off
/// before examining every move.
fn select_best(moves: &mut [Move], from: usize) {
    let mut best = from;
    for i in (from + 1)..moves.len() {
        if moves[i].score() > moves[best].score() {
            best = i;
        }
    }
    moves.swap(from, best);
}

/// Render a centipawn score as a UCI `score` token: `cp N` or `mate N`.
/// `n` is derived from the distance to `±INFINITY_CP`.
#[must_use]
pub fn format_score(score: i32) -> String {
    if score.abs() >= LONGEST_CHECKMATE {
        let dist = INFINITY_CP - score.abs();
        let mut n = dist / 2;
        if dist % 2 != 0 {
            n += 1;
        }
        let signed = if score < 0 { -n } else { n };
        format!("mate {signed}")
    } else {
        format!("cp {score}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::time::Timer;

    fn search_to_depth(fen: &str, depth: u8) -> (Move, i32) {
        let pos = Position::from_fen(fen).unwrap();
        let mut data = SearchData::new(pos, Timer::infinite());
        let mut best = (Move::NULL, 0);
        for d in 1..=depth {
            data.nodes = 0;
            data.pv = vec![PVLine::empty(); MAX_PLY];
            let score = data.negamax(&pos, -INFINITY_CP, INFINITY_CP, d, 0, true);
            if let Some(m) = data.pv[0].best_move() {
                data.prev_pv = data.pv[0].clone();
                best = (m, score);
            }
        }
        best
    }

    #[test]
    fn startpos_depth_one_score_is_symmetric() {
        let (_, score) = search_to_depth("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 1);
        assert_eq!(score, 0);
    }

    #[test]
    fn mate_in_two_is_found() {
        let (_, score) = search_to_depth("4k3/R7/5K2/8/8/8/8/8 w - - 0 1", 4);
        assert!(score >= LONGEST_CHECKMATE, "score {score} should read as a mate score");
    }

    #[test]
    fn finds_the_only_winning_move_in_fried_liver() {
        let (m, _) = search_to_depth(
            "r1bq1b1r/ppp2kpp/2n5/3np3/2B5/8/PPPP1PPP/RNBQK2R w KQ - 0 7",
            6,
        );
        assert_eq!(m.to_uci(), "d1f3");
    }

    #[test]
    fn format_score_reports_cp_for_ordinary_evaluations() {
        assert_eq!(format_score(37), "cp 37");
        assert_eq!(format_score(-12), "cp -12");
    }

    #[test]
    fn format_score_reports_mate_for_extreme_evaluations() {
        let mated_next_move = -INFINITY_CP + 1;
        assert_eq!(format_score(mated_next_move), "mate -1");
    }
}
