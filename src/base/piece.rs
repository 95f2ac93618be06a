//! Piece kinds, independent of color or location.

use std::fmt::{self, Display, Formatter};

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
/// The kind of a piece, with no information about its color or square.
///
/// The ordering (`Pawn` first, `King` last) matches the data model used
/// throughout the engine: PSQT and material tables are indexed directly by
/// `Piece as usize`.
pub enum Piece {
    /// A pawn.
    Pawn = 0,
    /// A knight.
    Knight,
    /// A bishop.
    Bishop,
    /// A rook.
    Rook,
    /// A queen.
    Queen,
    /// A king.
    King,
}

impl Piece {
    /// The number of piece kinds.
    pub const NUM: usize = 6;

    /// All piece kinds, in `Pawn..King` order.
    pub const ALL: [Piece; Piece::NUM] = [
        Piece::Pawn,
        Piece::Knight,
        Piece::Bishop,
        Piece::Rook,
        Piece::Queen,
        Piece::King,
    ];

    /// The kinds a pawn may promote to.
    pub const PROMOTING: [Piece; 4] = [Piece::Queen, Piece::Rook, Piece::Bishop, Piece::Knight];

    #[must_use]
    /// The FEN code of this piece, uppercase.
    pub const fn code(self) -> char {
        match self {
            Piece::Pawn => 'P',
            Piece::Knight => 'N',
            Piece::Bishop => 'B',
            Piece::Rook => 'R',
            Piece::Queen => 'Q',
            Piece::King => 'K',
        }
    }

    #[must_use]
    /// Parse a piece kind from its uppercase FEN letter.
    pub const fn from_code(c: char) -> Option<Piece> {
        match c {
            'P' => Some(Piece::Pawn),
            'N' => Some(Piece::Knight),
            'B' => Some(Piece::Bishop),
            'R' => Some(Piece::Rook),
            'Q' => Some(Piece::Queen),
            'K' => Some(Piece::King),
            _ => None,
        }
    }

    #[must_use]
    /// The conventional base material value of this piece, in centipawns.
    /// Used to initialize untrained PSQT weights.
    pub const fn base_value(self) -> i16 {
        match self {
            Piece::Pawn => 100,
            Piece::Knight | Piece::Bishop => 300,
            Piece::Rook => 500,
            Piece::Queen => 850,
            Piece::King => 0,
        }
    }
}

impl Display for Piece {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip() {
        for p in Piece::ALL {
            assert_eq!(Piece::from_code(p.code()), Some(p));
        }
    }

    #[test]
    fn bad_code_is_none() {
        assert_eq!(Piece::from_code('x'), None);
    }
}
