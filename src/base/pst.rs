//! Piece-square tables: the positional component of static evaluation.
//! Unlike a tapered midgame/endgame evaluator, this engine keeps
//! exactly one table per piece kind — `Position::scores` is a flat sum of
//! these entries, nothing more.

use super::{Color, Piece, Square};

/// A 6x64 table of signed centipawn values, one entry per (piece kind, square).
pub type Table = [[i16; 64]; Piece::NUM];

/// Piece values in millipawns, authored in the conventional orientation
/// (rank 1 listed first, rank 8 last, as seen from White's side of the
/// board), collapsed from a tapered midgame/endgame pair down to this
/// engine's single-phase table by averaging the two. [`build_table`]
/// reverses the rank order and rescales to centipawns, producing the
/// Black-to-move-oriented table `PSQT[kind][flip(c, s)]` actually indexes.
const RAW_MILLIPAWN: [[i32; 64]; Piece::NUM] = [
    [
        // pawns. ranks 1 and 8 are inconsequential
        0, 0, 0, 0, 0, 0, 0, 0, // rank 1
        -40, 40, -80, -40, 40, 70, 120, -80, // rank 2
        -80, -20, -60, -30, 0, -40, 20, -90, // rank 3
        -20, 40, 0, 20, 20, -40, -10, -120, // rank 4
        100, 160, 60, 100, 50, 60, 100, -10, // rank 5
        400, 520, 420, 450, 380, 400, 440, 300, // rank 6
        680, 700, 750, 950, 1040, 570, 520, 550, // rank 7
        0, 0, 0, 0, 0, 0, 0, 0, // rank 8
    ],
    [
        // knights
        -780, -70, -230, -50, 0, -140, -40, -440, // rank 1
        -530, -360, -130, 40, 60, -220, -300, -320, // rank 2
        -130, -120, 0, 80, 40, 40, -20, -180, // rank 3
        -90, -120, 40, 60, 70, 40, 80, -60, // rank 4
        0, 60, 120, 200, 120, 230, 40, 40, // rank 5
        -220, 80, 100, 140, 180, 160, 100, -140, // rank 6
        -190, -50, 60, -10, -60, -60, -80, -260, // rank 7
        -630, -430, -170, -170, 0, -440, -380, -660, // rank 8
    ],
    [
        // bishops
        -220, -60, -10, -60, -70, -70, -170, -180, // rank 1
        -380, -60, -80, -10, 40, -60, -10, -260, // rank 2
        -120, -50, 40, 50, 30, 50, -40, -160, // rank 3
        -90, -100, 20, 60, -10, -20, -100, -20, // rank 4
        -60, 20, 10, 100, 80, 80, -30, -20, // rank 5
        -110, -20, 40, 0, 20, 90, 20, -60, // rank 6
        -100, -40, -60, -270, -90, 40, -40, -310, // rank 7
        -210, -180, -360, -160, -180, -340, -210, -220, // rank 8
    ],
    [
        // rooks
        -40, -30, 0, 0, -10, -10, -100, -120, // rank 1
        -230, -140, -80, -10, -20, -90, -130, -280, // rank 2
        -180, -160, -100, -60, -80, -80, -110, -260, // rank 3
        -160, -120, -50, -40, -50, -120, -80, -150, // rank 4
        -100, -170, 0, -70, -100, -40, -160, -140, // rank 5
        -60, 0, -20, 20, -20, 50, 30, -60, // rank 6
        40, 70, 180, 160, 80, 200, 100, -20, // rank 7
        20, 80, 80, 120, 140, 0, -60, -10, // rank 8
    ],
    [
        // queens
        -180, -90, -60, -20, -60, -120, -60, -180, // rank 1
        -230, -190, 20, -20, 40, -40, -80, -100, // rank 2
        -160, -40, -40, 20, 30, 40, 0, 0, // rank 3
        -90, -80, -20, 40, 100, 40, 10, -20, // rank 4
        -150, -100, -20, 60, 90, 80, 30, -40, // rank 5
        -180, -120, -40, 100, 160, 160, 180, 10, // rank 6
        -250, -160, 30, 120, 40, 130, 80, -40, // rank 7
        -220, 20, 60, 30, 180, 10, 40, 0, // rank 8
    ],
    [
        // kings
        -360, -80, -50, -200, -120, -140, 20, -200, // rank 1
        -130, -60, -40, -140, -40, -40, 30, -60, // rank 2
        -130, -20, 10, -20, -30, -10, -20, -100, // rank 3
        -220, -50, 40, 0, -20, 0, -130, -220, // rank 4
        -120, 120, 120, 40, 20, 120, 100, -20, // rank 5
        40, 150, 220, 40, 60, 300, 230, 130, // rank 6
        -40, 140, 80, 80, 100, 180, 150, 140, // rank 7
        -340, -180, -120, -160, -100, -20, 180, -50, // rank 8
    ],
];

const fn build_table(raw: &[[i32; 64]; Piece::NUM]) -> Table {
    let mut table = [[0i16; 64]; Piece::NUM];
    let mut kind = 0;
    while kind < Piece::NUM {
        let mut rank = 0;
        while rank < 8 {
            let src_rank = 7 - rank;
            let mut file = 0;
            while file < 8 {
                table[kind][rank * 8 + file] = (raw[kind][src_rank * 8 + file] / 10) as i16;
                file += 1;
            }
            rank += 1;
        }
        kind += 1;
    }
    table
}

/// The live piece-square table. `PSQT[kind][flip(color, sq)]` is the value
/// attributed to a piece of `kind` and `color` standing on `sq`.
pub const PSQT: Table = build_table(&RAW_MILLIPAWN);

#[must_use]
/// Orient `sq` into the Black-to-move perspective the PSQT is authored in:
/// White's squares are mirrored across the horizontal axis, Black's are not.
pub const fn flip(color: Color, sq: Square) -> Square {
    match color {
        Color::White => sq.flip(),
        Color::Black => sq,
    }
}

#[must_use]
/// The PSQT contribution of a piece of `kind` and `color` standing on `sq`.
pub const fn value(kind: Piece, color: Color, sq: Square) -> i16 {
    PSQT[kind as usize][flip(color, sq) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pawn_value_is_zero_on_back_ranks() {
        assert_eq!(value(Piece::Pawn, Color::White, Square::A1), 0);
        assert_eq!(value(Piece::Pawn, Color::Black, Square::A8), 0);
    }

    #[test]
    fn white_and_black_are_mirrored() {
        // A knight on its home square is equally (un)comfortable either color.
        assert_eq!(
            value(Piece::Knight, Color::White, Square::B1),
            value(Piece::Knight, Color::Black, Square::B8)
        );
    }

    #[test]
    fn king_prefers_the_castled_square_over_the_center() {
        assert!(value(Piece::King, Color::White, Square::G1) > value(Piece::King, Color::White, Square::E4));
    }
}
