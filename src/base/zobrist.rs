//! Zobrist hash key tables.

use super::prng::Xorshift64Star;
use super::{CastleRights, Color, Piece, Square};
use once_cell::sync::Lazy;

/// Seed for the Zobrist key generator. Fixed so that `hash` is reproducible
/// across runs and platforms, which repetition detection and the perft
/// cache both depend on.
const ZOBRIST_SEED: u64 = 0x9E37_79B9_7F4A_7C15;

/// The full set of random keys used to incrementally hash a `Position`.
pub struct Zobrist {
    piece: [[[u64; 64]; Piece::NUM]; Color::NUM],
    ep: [u64; 64],
    castling: [u64; 16],
    side: [u64; Color::NUM],
}

/// The process-wide Zobrist key table, generated once on first use.
pub static KEYS: Lazy<Zobrist> = Lazy::new(Zobrist::generate);

impl Zobrist {
    fn generate() -> Zobrist {
        let mut rng = Xorshift64Star::new(ZOBRIST_SEED);

        let mut piece = [[[0u64; 64]; Piece::NUM]; Color::NUM];
        for color_keys in &mut piece {
            for kind_keys in color_keys.iter_mut() {
                for key in kind_keys.iter_mut() {
                    *key = rng.next_u64();
                }
            }
        }

        let mut ep = [0u64; 64];
        for key in &mut ep {
            *key = rng.next_u64();
        }

        let mut castling = [0u64; 16];
        for key in &mut castling {
            *key = rng.next_u64();
        }

        // side[White] is pinned to 0 so that hashing in the side-to-move key
        // only changes the hash when it's Black's turn.
        let side = [0u64, rng.next_u64()];

        Zobrist {
            piece,
            ep,
            castling,
            side,
        }
    }

    #[must_use]
    /// The key for a piece of `color` and `kind` standing on `sq`.
    pub fn piece(&self, color: Color, kind: Piece, sq: Square) -> u64 {
        self.piece[color as usize][kind as usize][sq as usize]
    }

    #[must_use]
    /// The key for the en passant target square, or 0 if there is none.
    pub fn ep(&self, sq: Option<Square>) -> u64 {
        match sq {
            Some(sq) => self.ep[sq as usize],
            None => 0,
        }
    }

    #[must_use]
    /// The key for a given castling-rights mask.
    pub fn castling(&self, rights: CastleRights) -> u64 {
        self.castling[rights.index()]
    }

    #[must_use]
    /// The key contributed by the side to move (0 for White).
    pub fn side(&self, color: Color) -> u64 {
        self.side[color as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_side_key_is_zero() {
        assert_eq!(KEYS.side(Color::White), 0);
        assert_ne!(KEYS.side(Color::Black), 0);
    }

    #[test]
    fn no_ep_key_is_zero() {
        assert_eq!(KEYS.ep(None), 0);
    }

    #[test]
    fn distinct_squares_get_distinct_piece_keys() {
        assert_ne!(
            KEYS.piece(Color::White, Piece::Pawn, Square::E2),
            KEYS.piece(Color::White, Piece::Pawn, Square::E4)
        );
    }
}
