//! Board state, move application, and attack queries.

use super::magic::TABLES;
use super::zobrist::KEYS;
use super::{pst, Bitboard, CastleRights, Color, Move, MoveKind, Piece, Square};
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Why a FEN string failed to parse. Loading is not defensive about
/// castling/en-passant consistency — only the six-field shape is checked
/// here.
pub enum FenError {
    /// The FEN did not have all six whitespace-separated fields.
    MissingField(&'static str),
    /// The piece-placement field did not describe exactly 64 squares.
    BadPlacement,
    /// The side-to-move field was neither `w` nor `b`.
    BadSide,
    /// The en-passant field was not `-` or a valid square.
    BadEpSquare,
    /// The halfmove-clock field did not parse as an integer.
    BadHalfMove,
}

impl Display for FenError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FenError::MissingField(name) => write!(f, "FEN missing {name} field"),
            FenError::BadPlacement => write!(f, "FEN piece placement does not cover 64 squares"),
            FenError::BadSide => write!(f, "FEN side to move must be 'w' or 'b'"),
            FenError::BadEpSquare => write!(f, "FEN en passant square is invalid"),
            FenError::BadHalfMove => write!(f, "FEN halfmove clock is not an integer"),
        }
    }
}

impl std::error::Error for FenError {}

const STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Clone, Copy, PartialEq, Eq)]
/// The sole mutable game-state entity: board, rights, and incrementally
/// maintained hash and material/PSQT scores. Deliberately POD: search uses
/// copy/make, snapshotting this struct by value rather than unmaking moves.
pub struct Position {
    pieces: [Bitboard; Piece::NUM],
    colors: [Bitboard; Color::NUM],
    side: Color,
    castling: CastleRights,
    ep_sq: Option<Square>,
    half_move: u32,
    hash: u64,
    scores: [i32; Color::NUM],
}

impl Position {
    #[must_use]
    /// The standard chess starting position.
    pub fn startpos() -> Position {
        // SAFETY net: the startpos FEN is fixed and known-valid.
        Position::from_fen(STARTPOS_FEN).expect("startpos FEN is well-formed")
    }

    /// Load a position from a FEN string.
    ///
    /// # Errors
    ///
    /// Returns [`FenError`] if the string does not have all six fields in
    /// the expected shape. Internal consistency of castling rights and the
    /// en-passant square with the board itself is not checked.
    pub fn from_fen(fen: &str) -> Result<Position, FenError> {
        let mut fields = fen.split_whitespace();
        let placement = fields.next().ok_or(FenError::MissingField("placement"))?;
        let side = fields.next().ok_or(FenError::MissingField("side"))?;
        let castling = fields.next().ok_or(FenError::MissingField("castling"))?;
        let ep = fields.next().ok_or(FenError::MissingField("en passant"))?;
        let half_move = fields.next().ok_or(FenError::MissingField("halfmove"))?;
        // the fullmove field is parsed-for but ignored
        let _fullmove = fields.next();

        let mut pos = Position {
            pieces: [Bitboard::EMPTY; Piece::NUM],
            colors: [Bitboard::EMPTY; Color::NUM],
            side: Color::White,
            castling: CastleRights::NONE,
            ep_sq: None,
            half_move: 0,
            hash: 0,
            scores: [0; Color::NUM],
        };

        let mut rank = 7i8;
        let mut file = 0i8;
        for c in placement.chars() {
            match c {
                '/' => {
                    if file != 8 {
                        return Err(FenError::BadPlacement);
                    }
                    rank -= 1;
                    file = 0;
                }
                '1'..='8' => file += c as i8 - '0' as i8,
                _ => {
                    let color = if c.is_ascii_uppercase() {
                        Color::White
                    } else {
                        Color::Black
                    };
                    let kind = Piece::from_code(c.to_ascii_uppercase())
                        .ok_or(FenError::BadPlacement)?;
                    if !(0..8).contains(&rank) || !(0..8).contains(&file) {
                        return Err(FenError::BadPlacement);
                    }
                    let sq = Square::from_file_rank(file as u8, rank as u8);
                    pos.put(color, kind, sq);
                    file += 1;
                }
            }
        }
        if rank != 0 || file != 8 {
            return Err(FenError::BadPlacement);
        }

        pos.side = match side {
            "w" => Color::White,
            "b" => Color::Black,
            _ => return Err(FenError::BadSide),
        };

        if castling != "-" {
            for c in castling.chars() {
                pos.castling = pos.castling
                    | match c {
                        'K' => CastleRights::WHITE_KINGSIDE,
                        'Q' => CastleRights::WHITE_QUEENSIDE,
                        'k' => CastleRights::BLACK_KINGSIDE,
                        'q' => CastleRights::BLACK_QUEENSIDE,
                        _ => CastleRights::NONE,
                    };
            }
        }

        pos.ep_sq = if ep == "-" {
            None
        } else {
            Some(Square::from_algebraic(ep).map_err(|_| FenError::BadEpSquare)?)
        };

        pos.half_move = half_move.parse().map_err(|_| FenError::BadHalfMove)?;

        pos.hash = pos.recompute_hash();
        pos.scores = pos.recompute_scores();

        Ok(pos)
    }

    #[must_use]
    /// Emit this position as a FEN string. The fullmove counter is always
    /// emitted as `0`, since this engine never tracks it.
    pub fn to_fen(&self) -> String {
        let mut placement = String::new();
        for rank in (0..8).rev() {
            let mut empty_run = 0;
            for file in 0..8 {
                let sq = Square::from_file_rank(file, rank);
                match self.piece_on(sq) {
                    None => empty_run += 1,
                    Some((kind, color)) => {
                        if empty_run > 0 {
                            placement.push_str(&empty_run.to_string());
                            empty_run = 0;
                        }
                        let c = kind.code();
                        placement.push(if color == Color::White {
                            c
                        } else {
                            c.to_ascii_lowercase()
                        });
                    }
                }
            }
            if empty_run > 0 {
                placement.push_str(&empty_run.to_string());
            }
            if rank != 0 {
                placement.push('/');
            }
        }

        let side = if self.side == Color::White { "w" } else { "b" };

        let mut castling = String::new();
        if self.castling.contains(CastleRights::WHITE_KINGSIDE) {
            castling.push('K');
        }
        if self.castling.contains(CastleRights::WHITE_QUEENSIDE) {
            castling.push('Q');
        }
        if self.castling.contains(CastleRights::BLACK_KINGSIDE) {
            castling.push('k');
        }
        if self.castling.contains(CastleRights::BLACK_QUEENSIDE) {
            castling.push('q');
        }
        if castling.is_empty() {
            castling.push('-');
        }

        let ep = self.ep_sq.map_or_else(|| "-".to_string(), |sq| sq.to_string());

        format!("{placement} {side} {castling} {ep} {} 0", self.half_move)
    }

    #[must_use]
    pub const fn side(&self) -> Color {
        self.side
    }

    #[must_use]
    pub const fn castling(&self) -> CastleRights {
        self.castling
    }

    #[must_use]
    pub const fn ep_square(&self) -> Option<Square> {
        self.ep_sq
    }

    #[must_use]
    pub const fn half_move(&self) -> u32 {
        self.half_move
    }

    #[must_use]
    pub const fn hash(&self) -> u64 {
        self.hash
    }

    #[must_use]
    /// The running material+PSQT score from `color`'s perspective.
    pub const fn score(&self, color: Color) -> i32 {
        self.scores[color as usize]
    }

    #[must_use]
    /// The side-relative static evaluation: `scores[side] - scores[!side]`.
    pub const fn static_eval(&self) -> i32 {
        self.scores[self.side as usize] - self.scores[1 - self.side as usize]
    }

    #[must_use]
    /// All pieces of `kind`, any color.
    pub const fn pieces_of_kind(&self, kind: Piece) -> Bitboard {
        self.pieces[kind as usize]
    }

    #[must_use]
    /// All pieces belonging to `color`.
    pub const fn pieces_of_color(&self, color: Color) -> Bitboard {
        self.colors[color as usize]
    }

    #[must_use]
    /// Every occupied square.
    pub fn occupied(&self) -> Bitboard {
        self.colors[0] | self.colors[1]
    }

    #[must_use]
    /// The kind and color of the piece on `sq`, if any.
    pub fn piece_on(&self, sq: Square) -> Option<(Piece, Color)> {
        let kind = Piece::ALL.into_iter().find(|&k| self.pieces[k as usize].contains(sq))?;
        let color = if self.colors[Color::White as usize].contains(sq) {
            Color::White
        } else {
            Color::Black
        };
        Some((kind, color))
    }

    #[must_use]
    /// The square `color`'s king stands on.
    pub fn king_square(&self, color: Color) -> Square {
        (self.pieces[Piece::King as usize] & self.colors[color as usize])
            .lowest_square()
            .expect("every legal position has exactly one king per side")
    }

    fn recompute_hash(&self) -> u64 {
        let mut hash = 0u64;
        for &color in &Color::ALL {
            for &kind in &Piece::ALL {
                for sq in self.pieces[kind as usize] & self.colors[color as usize] {
                    hash ^= KEYS.piece(color, kind, sq);
                }
            }
        }
        hash ^= KEYS.ep(self.ep_sq);
        hash ^= KEYS.castling(self.castling);
        hash ^= KEYS.side(self.side);
        hash
    }

    fn recompute_scores(&self) -> [i32; Color::NUM] {
        let mut scores = [0i32; Color::NUM];
        for &color in &Color::ALL {
            for &kind in &Piece::ALL {
                for sq in self.pieces[kind as usize] & self.colors[color as usize] {
                    scores[color as usize] += i32::from(pst::value(kind, color, sq));
                }
            }
        }
        scores
    }

    /// Place a piece of `kind` and `color` on `sq`, updating bitboards, hash
    /// and scores incrementally. `sq` must be empty.
    fn put(&mut self, color: Color, kind: Piece, sq: Square) {
        self.pieces[kind as usize] = self.pieces[kind as usize].with_square(sq);
        self.colors[color as usize] = self.colors[color as usize].with_square(sq);
        self.hash ^= KEYS.piece(color, kind, sq);
        self.scores[color as usize] += i32::from(pst::value(kind, color, sq));
    }

    /// Remove a piece of `kind` and `color` from `sq`, updating bitboards,
    /// hash and scores incrementally. `sq` must hold that exact piece.
    fn remove(&mut self, color: Color, kind: Piece, sq: Square) {
        self.pieces[kind as usize] = self.pieces[kind as usize].without_square(sq);
        self.colors[color as usize] = self.colors[color as usize].without_square(sq);
        self.hash ^= KEYS.piece(color, kind, sq);
        self.scores[color as usize] -= i32::from(pst::value(kind, color, sq));
    }

    #[must_use]
    /// Whether any piece of the side opposite `us` attacks `sq`, given the
    /// current board occupancy.
    pub fn sq_is_attacked(&self, us: Color, sq: Square) -> bool {
        let enemy = self.colors[!us as usize];
        let occ = self.occupied();

        if (TABLES.knight_attacks(sq) & self.pieces[Piece::Knight as usize] & enemy).len() > 0 {
            return true;
        }
        if (TABLES.king_attacks(sq) & self.pieces[Piece::King as usize] & enemy).len() > 0 {
            return true;
        }
        if (TABLES.pawn_attacks(us, sq) & self.pieces[Piece::Pawn as usize] & enemy).len() > 0 {
            return true;
        }
        let diag_enemies =
            (self.pieces[Piece::Bishop as usize] | self.pieces[Piece::Queen as usize]) & enemy;
        if (TABLES.bishop_attacks(sq, occ) & diag_enemies).len() > 0 {
            return true;
        }
        let line_enemies =
            (self.pieces[Piece::Rook as usize] | self.pieces[Piece::Queen as usize]) & enemy;
        if (TABLES.rook_attacks(sq, occ) & line_enemies).len() > 0 {
            return true;
        }
        false
    }

    #[must_use]
    /// Whether `color`'s king is currently attacked.
    pub fn is_side_in_check(&self, color: Color) -> bool {
        self.sq_is_attacked(color, self.king_square(color))
    }

    /// Apply `m` to this position in place. `m` is trusted to be at least
    /// pseudo-legal; no validation is performed.
    pub fn do_move(&mut self, m: Move) {
        self.hash ^= KEYS.ep(self.ep_sq);
        self.hash ^= KEYS.castling(self.castling);
        self.hash ^= KEYS.side(self.side);

        let from = m.from_square();
        let to = m.to_square();
        let piece = m.from_piece();
        let us = self.side;

        self.remove(us, piece, from);

        self.half_move += 1;
        self.ep_sq = None;

        match m.kind() {
            MoveKind::Quiet => self.put(us, piece, to),
            MoveKind::Attack => self.do_attack(piece, us, to, to),
            MoveKind::WhiteAttackEp => {
                self.do_attack(piece, us, to, Square::from_index(to as u8 - 8));
            }
            MoveKind::BlackAttackEp => {
                self.do_attack(piece, us, to, Square::from_index(to as u8 + 8));
            }
            MoveKind::PromoQ => self.put(us, Piece::Queen, to),
            MoveKind::PromoR => self.put(us, Piece::Rook, to),
            MoveKind::PromoB => self.put(us, Piece::Bishop, to),
            MoveKind::PromoN => self.put(us, Piece::Knight, to),
            MoveKind::PromoAttkQ => self.do_promo_attack(Piece::Queen, us, to),
            MoveKind::PromoAttkR => self.do_promo_attack(Piece::Rook, us, to),
            MoveKind::PromoAttkB => self.do_promo_attack(Piece::Bishop, us, to),
            MoveKind::PromoAttkN => self.do_promo_attack(Piece::Knight, us, to),
            MoveKind::WhiteCastleK => self.do_castle(Square::G1, Square::H1, Square::F1, us),
            MoveKind::WhiteCastleQ => self.do_castle(Square::C1, Square::A1, Square::D1, us),
            MoveKind::BlackCastleK => self.do_castle(Square::G8, Square::H8, Square::F8, us),
            MoveKind::BlackCastleQ => self.do_castle(Square::C8, Square::A8, Square::D8, us),
        }

        if piece == Piece::Pawn {
            self.half_move = 0;
            let delta = i16::from(to as u8) - i16::from(from as u8);
            if us == Color::White && delta == 16 {
                self.ep_sq = Some(Square::from_index(to as u8 - 8));
            } else if us == Color::Black && delta == -16 {
                self.ep_sq = Some(Square::from_index(to as u8 + 8));
            }
        }

        self.castling = self.castling.after_move(from, to);
        self.side = !self.side;

        self.hash ^= KEYS.ep(self.ep_sq);
        self.hash ^= KEYS.castling(self.castling);
        self.hash ^= KEYS.side(self.side);
    }

    fn do_attack(&mut self, attacker_kind: Piece, attacker_color: Color, to: Square, captured_sq: Square) {
        let (captured_kind, captured_color) = self
            .piece_on(captured_sq)
            .expect("attack move must capture a piece");
        self.remove(captured_color, captured_kind, captured_sq);
        self.put(attacker_color, attacker_kind, to);
        self.half_move = 0;
    }

    fn do_promo_attack(&mut self, promo_kind: Piece, color: Color, to: Square) {
        let (captured_kind, captured_color) =
            self.piece_on(to).expect("promoting attack move must capture a piece");
        self.remove(captured_color, captured_kind, to);
        self.put(color, promo_kind, to);
        self.half_move = 0;
    }

    /// Finish a castle: the king was already removed from its home square by
    /// the `do_move` dispatch above (it is the move's "moving piece").
    fn do_castle(&mut self, king_to: Square, rook_from: Square, rook_to: Square, color: Color) {
        self.put(color, Piece::King, king_to);
        self.remove(color, Piece::Rook, rook_from);
        self.put(color, Piece::Rook, rook_to);
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        for rank in (0..8).rev() {
            write!(f, "{} | ", rank + 1)?;
            for file in 0..8 {
                let sq = Square::from_file_rank(file, rank);
                let c = match self.piece_on(sq) {
                    None => '.',
                    Some((kind, Color::White)) => kind.code(),
                    Some((kind, Color::Black)) => kind.code().to_ascii_lowercase(),
                };
                write!(f, "{c} ")?;
            }
            writeln!(f)?;
        }
        writeln!(f, "    ----------------")?;
        writeln!(f, "    a b c d e f g h")?;
        writeln!(f)?;
        writeln!(
            f,
            "turn: {}",
            if self.side == Color::White { "white" } else { "black" }
        )?;
        write!(f, "castling rights: ")?;
        if self.castling.contains(CastleRights::WHITE_KINGSIDE) {
            write!(f, "K")?;
        }
        if self.castling.contains(CastleRights::WHITE_QUEENSIDE) {
            write!(f, "Q")?;
        }
        if self.castling.contains(CastleRights::BLACK_KINGSIDE) {
            write!(f, "k")?;
        }
        if self.castling.contains(CastleRights::BLACK_QUEENSIDE) {
            write!(f, "q")?;
        }
        writeln!(f)?;
        write!(f, "en passant: ")?;
        match self.ep_sq {
            None => writeln!(f, "none")?,
            Some(sq) => writeln!(f, "{sq}")?,
        }
        writeln!(f, "half-move clock: {}", self.half_move)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startpos_roundtrips_through_fen() {
        let pos = Position::startpos();
        assert_eq!(
            pos.to_fen(),
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 0"
        );
    }

    #[test]
    fn startpos_has_no_one_in_check() {
        let pos = Position::startpos();
        assert!(!pos.is_side_in_check(Color::White));
        assert!(!pos.is_side_in_check(Color::Black));
    }

    #[test]
    fn startpos_score_is_symmetric() {
        let pos = Position::startpos();
        assert_eq!(pos.score(Color::White), pos.score(Color::Black));
        assert_eq!(pos.static_eval(), 0);
    }

    #[test]
    fn missing_field_is_an_error() {
        assert_eq!(
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -"),
            Err(FenError::MissingField("halfmove"))
        );
    }

    #[test]
    fn e4_opening_move_flips_hash_and_negates_static_eval() {
        let mut pos = Position::startpos();
        let before = pos.static_eval();
        let m = Move::new(Square::E2, Square::E4, Piece::Pawn, MoveKind::Quiet);
        pos.do_move(m);
        assert_eq!(pos.ep_square(), Some(Square::E3));
        assert_eq!(pos.side(), Color::Black);
        assert_eq!(pos.half_move(), 0);
        assert_eq!(pos.static_eval(), -before);
        assert_eq!(pos.hash(), pos.recompute_hash());
    }

    #[test]
    fn castling_rights_are_cleared_when_king_moves() {
        let mut pos = Position::from_fen(
            "r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let m = Move::new(Square::E1, Square::G1, Piece::King, MoveKind::WhiteCastleK);
        pos.do_move(m);
        assert!(!pos.castling().contains(CastleRights::WHITE_KINGSIDE));
        assert!(!pos.castling().contains(CastleRights::WHITE_QUEENSIDE));
        assert!(pos.castling().contains(CastleRights::BLACK_KINGSIDE));
        assert_eq!(pos.piece_on(Square::G1), Some((Piece::King, Color::White)));
        assert_eq!(pos.piece_on(Square::F1), Some((Piece::Rook, Color::White)));
    }

    #[test]
    fn hash_matches_from_scratch_recomputation_after_several_moves() {
        let mut pos = Position::startpos();
        for (from, to, piece, kind) in [
            (Square::E2, Square::E4, Piece::Pawn, MoveKind::Quiet),
            (Square::B8, Square::C6, Piece::Knight, MoveKind::Quiet),
            (Square::F1, Square::C4, Piece::Bishop, MoveKind::Quiet),
        ] {
            pos.do_move(Move::new(from, to, piece, kind));
        }
        assert_eq!(pos.hash(), pos.recompute_hash());
        assert_eq!(pos.score(Color::White), pos.recompute_scores()[Color::White as usize]);
    }
}
