//! Precomputed attack tables: step attacks for knights, kings and pawns, and
//! magic-bitboard lookup tables for sliding pieces.

use super::prng::Xorshift64Star;
use super::{Bitboard, Color, Square};
use once_cell::sync::Lazy;

/// Per-rank seeds for the magic-number search, lifted from Stockfish. Seeding
/// the xorshift generator per rank (rather than globally) is what makes the
/// search converge quickly: ranks near the board center need denser
/// candidates than the corners.
const MAGIC_SEEDS: [u64; 8] = [728, 10316, 55013, 32803, 12281, 15100, 16645, 255];

const KNIGHT_DELTAS: [(i8, i8); 8] = [
    (1, 2), (2, 1), (2, -1), (1, -2), (-1, -2), (-2, -1), (-2, 1), (-1, 2),
];
const KING_DELTAS: [(i8, i8); 8] = [
    (1, 0), (1, 1), (0, 1), (-1, 1), (-1, 0), (-1, -1), (0, -1), (1, -1),
];
const ROOK_DELTAS: [(i8, i8); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
const BISHOP_DELTAS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

fn step_attacks(sq: Square, deltas: &[(i8, i8)]) -> Bitboard {
    let (file, rank) = (i8::try_from(sq.file()).unwrap(), i8::try_from(sq.rank()).unwrap());
    let mut bb = Bitboard::EMPTY;
    for &(df, dr) in deltas {
        let (f, r) = (file + df, rank + dr);
        if (0..8).contains(&f) && (0..8).contains(&r) {
            bb = bb.with_square(Square::from_file_rank(f as u8, r as u8));
        }
    }
    bb
}

/// Walk every ray direction one step at a time, stopping at the edge of the
/// board or the first occupied square (inclusive, since that square is
/// either capturable or blocking). This is the reference implementation used
/// only to *validate* the magic tables in tests; production lookups never
/// call it.
fn ray_attacks_on_the_fly(sq: Square, occ: Bitboard, deltas: &[(i8, i8)]) -> Bitboard {
    let mut bb = Bitboard::EMPTY;
    for &(df, dr) in deltas {
        let (mut f, mut r) = (i8::try_from(sq.file()).unwrap(), i8::try_from(sq.rank()).unwrap());
        loop {
            f += df;
            r += dr;
            if !(0..8).contains(&f) || !(0..8).contains(&r) {
                break;
            }
            let dest = Square::from_file_rank(f as u8, r as u8);
            bb = bb.with_square(dest);
            if occ.contains(dest) {
                break;
            }
        }
    }
    bb
}

/// The bitboard of the entire line (both directions) passing through `sq`,
/// including `sq` itself, for one of the four ray families. Used by the
/// hyperbola-quintessence computation.
fn line_mask(sq: Square, deltas: [(i8, i8); 2]) -> Bitboard {
    let mut bb = Bitboard::from_square(sq);
    for &(df, dr) in &deltas {
        let (mut f, mut r) = (i8::try_from(sq.file()).unwrap(), i8::try_from(sq.rank()).unwrap());
        loop {
            f += df;
            r += dr;
            if !(0..8).contains(&f) || !(0..8).contains(&r) {
                break;
            }
            bb = bb.with_square(Square::from_file_rank(f as u8, r as u8));
        }
    }
    bb
}

/// Compute attacks along one ray-line (e.g. the file through `sq`, or a
/// diagonal) given the full board occupancy, via the hyperbola-quintessence
/// subtract-and-reverse trick.
fn hyperbola_quintessence(sq: Square, occ: Bitboard, mask: Bitboard) -> Bitboard {
    let slider = Bitboard::from_square(sq);
    let o = occ & mask;
    let forward = o - (slider << 1);
    let reverse = (o.reverse() - (slider.reverse() << 1)).reverse();
    (forward ^ reverse) & mask
}

fn rook_true_attacks(sq: Square, occ: Bitboard) -> Bitboard {
    let file_line = line_mask(sq, [(0, 1), (0, -1)]);
    let rank_line = line_mask(sq, [(1, 0), (-1, 0)]);
    hyperbola_quintessence(sq, occ, file_line) | hyperbola_quintessence(sq, occ, rank_line)
}

fn bishop_true_attacks(sq: Square, occ: Bitboard) -> Bitboard {
    let diag_line = line_mask(sq, [(1, 1), (-1, -1)]);
    let anti_line = line_mask(sq, [(1, -1), (-1, 1)]);
    hyperbola_quintessence(sq, occ, diag_line) | hyperbola_quintessence(sq, occ, anti_line)
}

const EDGES: Bitboard = Bitboard::new(
    Bitboard::RANKS[0].as_u64() | Bitboard::RANKS[7].as_u64() |
    Bitboard::FILES[0].as_u64() | Bitboard::FILES[7].as_u64(),
);

fn blocker_mask(true_attacks_on_empty: Bitboard) -> Bitboard {
    true_attacks_on_empty & !EDGES
}

/// One square's entry in a slider's magic lookup table.
struct Magic {
    mask: Bitboard,
    magic: u64,
    shift: u8,
    offset: usize,
}

impl Magic {
    fn index(&self, occ: Bitboard) -> usize {
        let relevant = (occ & self.mask).as_u64();
        self.offset + ((relevant.wrapping_mul(self.magic)) >> self.shift) as usize
    }
}

/// Enumerate every subset of `mask` via the Carry-Rippler trick, including
/// the empty subset.
fn subsets(mask: Bitboard) -> Vec<Bitboard> {
    let mut out = Vec::with_capacity(1 << mask.len());
    let mut subset = 0u64;
    let bits = mask.as_u64();
    loop {
        out.push(Bitboard::new(subset));
        subset = subset.wrapping_sub(bits) & bits;
        if subset == 0 {
            break;
        }
    }
    out
}

/// Search for a collision-free magic multiplier for one square of one
/// slider kind, filling `table[offset..offset+table_len]` with the correct
/// attack bitboard for every occupancy subset.
fn find_magic(
    sq: Square,
    true_attacks: impl Fn(Square, Bitboard) -> Bitboard,
    mask: Bitboard,
    offset: usize,
    table: &mut [Bitboard],
    rng: &mut Xorshift64Star,
) -> Magic {
    let shift = 64 - mask.len() as u8;
    let all_subsets = subsets(mask);
    let reference: Vec<Bitboard> = all_subsets.iter().map(|&s| true_attacks(sq, s)).collect();

    loop {
        let candidate = rng.next_sparse_u64();
        let scratch = &mut table[offset..offset + all_subsets.len()];
        scratch.fill(Bitboard::EMPTY);
        let mut filled = vec![false; all_subsets.len()];
        let mut ok = true;

        for (subset, &attack) in all_subsets.iter().zip(reference.iter()) {
            let idx = ((subset.as_u64().wrapping_mul(candidate)) >> shift) as usize;
            if filled[idx] {
                if scratch[idx] != attack {
                    ok = false;
                    break;
                }
            } else {
                filled[idx] = true;
                scratch[idx] = attack;
            }
        }

        if ok {
            return Magic {
                mask,
                magic: candidate,
                shift,
                offset,
            };
        }
    }
}

/// All precomputed attack tables.
pub struct AttackTables {
    knight: [Bitboard; 64],
    king: [Bitboard; 64],
    pawn: [[Bitboard; 64]; Color::NUM],
    rook_magics: [Magic; 64],
    rook_table: Vec<Bitboard>,
    bishop_magics: [Magic; 64],
    bishop_table: Vec<Bitboard>,
}

/// The process-wide attack tables, built once on first access. Construction
/// performs a randomized magic-number search; this typically completes in
/// low single-digit milliseconds thanks to the per-rank Stockfish seeds,
/// which were chosen over a from-scratch search for reproducibility.
pub static TABLES: Lazy<AttackTables> = Lazy::new(AttackTables::build);

impl AttackTables {
    fn build() -> AttackTables {
        let mut knight = [Bitboard::EMPTY; 64];
        let mut king = [Bitboard::EMPTY; 64];
        let mut pawn = [[Bitboard::EMPTY; 64]; Color::NUM];
        for sq in Square::ALL {
            knight[sq as usize] = step_attacks(sq, &KNIGHT_DELTAS);
            king[sq as usize] = step_attacks(sq, &KING_DELTAS);
            pawn[Color::White as usize][sq as usize] = step_attacks(sq, &[(1, 1), (-1, 1)]);
            pawn[Color::Black as usize][sq as usize] = step_attacks(sq, &[(1, -1), (-1, -1)]);
        }

        let (rook_magics, rook_table) =
            Self::build_slider(ROOK_DELTAS, rook_true_attacks);
        let (bishop_magics, bishop_table) =
            Self::build_slider(BISHOP_DELTAS, bishop_true_attacks);

        AttackTables {
            knight,
            king,
            pawn,
            rook_magics,
            rook_table,
            bishop_magics,
            bishop_table,
        }
    }

    fn build_slider(
        deltas: [(i8, i8); 4],
        true_attacks: impl Fn(Square, Bitboard) -> Bitboard + Copy,
    ) -> ([Magic; 64], Vec<Bitboard>) {
        // Total table size is the sum of 2^popcount(mask) over all squares;
        // at most 64 * 4096 for rooks, 64 * 512 for bishops.
        let on_empty: Vec<Bitboard> = Square::ALL
            .iter()
            .map(|&sq| ray_attacks_on_the_fly(sq, Bitboard::EMPTY, &deltas))
            .collect();
        let masks: Vec<Bitboard> = on_empty.iter().map(|&oe| blocker_mask(oe)).collect();
        let sizes: Vec<usize> = masks.iter().map(|m| 1usize << m.len()).collect();
        let total: usize = sizes.iter().sum();
        let mut table = vec![Bitboard::EMPTY; total];

        let mut magics: Vec<Magic> = Vec::with_capacity(64);
        let mut offset = 0;
        for &sq in &Square::ALL {
            let mut rng = Xorshift64Star::new(MAGIC_SEEDS[sq.rank() as usize]);
            let m = find_magic(sq, true_attacks, masks[sq as usize], offset, &mut table, &mut rng);
            offset += sizes[sq as usize];
            magics.push(m);
        }

        (magics.try_into().unwrap_or_else(|_| unreachable!()), table)
    }

    #[must_use]
    /// Knight attacks from `sq`.
    pub fn knight_attacks(&self, sq: Square) -> Bitboard {
        self.knight[sq as usize]
    }

    #[must_use]
    /// King step attacks (non-castling) from `sq`.
    pub fn king_attacks(&self, sq: Square) -> Bitboard {
        self.king[sq as usize]
    }

    #[must_use]
    /// Pawn attack squares for a pawn of `color` standing on `sq`.
    pub fn pawn_attacks(&self, color: Color, sq: Square) -> Bitboard {
        self.pawn[color as usize][sq as usize]
    }

    #[must_use]
    /// Rook (and queen, horizontal/vertical component) attacks from `sq`
    /// given board occupancy `occ`.
    pub fn rook_attacks(&self, sq: Square, occ: Bitboard) -> Bitboard {
        let magic = &self.rook_magics[sq as usize];
        self.rook_table[magic.index(occ)]
    }

    #[must_use]
    /// Bishop (and queen, diagonal component) attacks from `sq` given board
    /// occupancy `occ`.
    pub fn bishop_attacks(&self, sq: Square, occ: Bitboard) -> Bitboard {
        let magic = &self.bishop_magics[sq as usize];
        self.bishop_table[magic.index(occ)]
    }

    #[must_use]
    /// Queen attacks: the union of rook and bishop attacks from `sq`.
    pub fn queen_attacks(&self, sq: Square, occ: Bitboard) -> Bitboard {
        self.rook_attacks(sq, occ) | self.bishop_attacks(sq, occ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rook_magic_matches_reference_on_empty_board() {
        for sq in Square::ALL {
            let fast = TABLES.rook_attacks(sq, Bitboard::EMPTY);
            let reference = ray_attacks_on_the_fly(sq, Bitboard::EMPTY, &ROOK_DELTAS);
            assert_eq!(fast, reference, "square {sq}");
        }
    }

    #[test]
    fn bishop_magic_matches_reference_with_blockers() {
        let occ = Bitboard::from_square(Square::D4)
            .with_square(Square::F6)
            .with_square(Square::B2);
        for sq in Square::ALL {
            let fast = TABLES.bishop_attacks(sq, occ);
            let reference = ray_attacks_on_the_fly(sq, occ, &BISHOP_DELTAS);
            assert_eq!(fast, reference, "square {sq}");
        }
    }

    #[test]
    fn rook_magic_matches_reference_with_blockers_every_square() {
        let occ = Bitboard::from_square(Square::A4)
            .with_square(Square::D4)
            .with_square(Square::D1)
            .with_square(Square::H4);
        for sq in Square::ALL {
            let fast = TABLES.rook_attacks(sq, occ);
            let reference = ray_attacks_on_the_fly(sq, occ, &ROOK_DELTAS);
            assert_eq!(fast, reference, "square {sq}");
        }
    }

    #[test]
    fn knight_attacks_from_corner() {
        let attacks = TABLES.knight_attacks(Square::A1);
        assert_eq!(attacks.len(), 2);
        assert!(attacks.contains(Square::B3));
        assert!(attacks.contains(Square::C2));
    }

    #[test]
    fn king_attacks_from_corner() {
        assert_eq!(TABLES.king_attacks(Square::A1).len(), 3);
    }

    #[test]
    fn pawn_attacks_are_color_asymmetric() {
        let white = TABLES.pawn_attacks(Color::White, Square::E4);
        let black = TABLES.pawn_attacks(Color::Black, Square::E4);
        assert!(white.contains(Square::D5) && white.contains(Square::F5));
        assert!(black.contains(Square::D3) && black.contains(Square::F3));
    }
}
