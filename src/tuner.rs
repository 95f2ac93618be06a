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
//! Offline AdaGrad fitting of the piece-square tables against a labeled
//! corpus of (FEN, outcome) pairs.

use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread::scope;

use crate::base::pst::flip;
use crate::base::{FenError, Piece, Position};

/// `sigmoid(K * evaluation)`'s scaling constant.
const SIGMOID_SCALE: f64 = 0.01;
const ADAGRAD_EPSILON: f64 = 1e-8;
/// One weight per (piece kind, oriented square): a flat restatement of
/// [`crate::base::pst::Table`] as a dense vector for gradient descent.
const NUM_WEIGHTS: usize = Piece::NUM * 64;

#[derive(Debug)]
pub enum TunerError {
    Io(std::io::Error),
    Fen(FenError),
    /// A CSV row did not have exactly two comma-separated fields.
    BadRow(String),
    /// The outcome field of a row was not `0.0`, `0.5`, or `1.0`.
    BadOutcome(String),
}

impl Display for TunerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TunerError::Io(e) => write!(f, "{e}"),
            TunerError::Fen(e) => write!(f, "{e}"),
            TunerError::BadRow(row) => write!(f, "CSV row does not have exactly two fields: {row}"),
            TunerError::BadOutcome(s) => write!(f, "outcome field is not 0.0, 0.5, or 1.0: {s}"),
        }
    }
}

impl std::error::Error for TunerError {}

impl From<std::io::Error> for TunerError {
    fn from(e: std::io::Error) -> TunerError {
        TunerError::Io(e)
    }
}

impl From<FenError> for TunerError {
    fn from(e: FenError) -> TunerError {
        TunerError::Fen(e)
    }
}

/// One training example: a position's sparse feature decomposition (a list of
/// (weight-index, sign) pairs) and its labeled outcome. Opaque to callers
/// outside this module; built only by [`load_corpus`].
pub struct Sample {
    features: Vec<(usize, f64)>,
    outcome: f64,
}

fn extract_features(pos: &Position) -> Vec<(usize, f64)> {
    let mut features = Vec::new();
    for sq in pos.occupied() {
        let (kind, color) = pos.piece_on(sq).expect("square reported by occupied() is occupied");
        let idx = kind as usize * 64 + flip(color, sq) as usize;
        let sign = if color == crate::base::Color::White { 1.0 } else { -1.0 };
        features.push((idx, sign));
    }
    features
}

/// Load a tuner corpus from a CSV file with header `fen,outcome`.
pub fn load_corpus(path: &Path) -> Result<Vec<Sample>, TunerError> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();
    lines.next(); // header row

    let mut samples = Vec::new();
    for line in lines {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.splitn(2, ',');
        let fen = fields.next().ok_or_else(|| TunerError::BadRow(line.to_string()))?.trim();
        let outcome_str = fields.next().ok_or_else(|| TunerError::BadRow(line.to_string()))?.trim();
        let outcome = match outcome_str {
            "0.0" | "0" => 0.0,
            "0.5" => 0.5,
            "1.0" | "1" => 1.0,
            _ => return Err(TunerError::BadOutcome(outcome_str.to_string())),
        };
        let pos = Position::from_fen(fen)?;
        samples.push(Sample { features: extract_features(&pos), outcome });
    }
    Ok(samples)
}

/// Initialize the dense weight vector from each kind's base material value:
/// every square of a kind starts at the same value.
#[must_use]
pub fn initial_weights() -> Vec<f64> {
    let mut weights = vec![0.0; NUM_WEIGHTS];
    for kind in Piece::ALL {
        let value = f64::from(kind.base_value());
        for sq in 0..64 {
            weights[kind as usize * 64 + sq] = value;
        }
    }
    weights
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn evaluate(weights: &[f64], features: &[(usize, f64)]) -> f64 {
    features.iter().map(|&(idx, sign)| sign * weights[idx]).sum()
}

/// Sum of squared error and the per-weight gradient contribution for one
/// partition of the corpus, used by [`gradient_step`] as a parallel-reduction
/// unit.
fn partial_gradient(weights: &[f64], samples: &[Sample]) -> (Vec<f64>, f64) {
    let mut grad = vec![0.0; weights.len()];
    let mut sse = 0.0;
    let n = samples.len() as f64;
    for sample in samples {
        let eval = evaluate(weights, &sample.features);
        let prediction = sigmoid(SIGMOID_SCALE * eval);
        let error = sample.outcome - prediction;
        sse += error * error;

        let coeff = (-2.0 * SIGMOID_SCALE / n) * error * prediction * (1.0 - prediction);
        for &(idx, sign) in &sample.features {
            grad[idx] += coeff * sign;
        }
    }
    (grad, sse)
}

/// One AdaGrad epoch: accumulate the batch gradient over the whole corpus
/// (optionally split across `num_threads` partitions, reduced after joining)
/// and take one descent step, updating `g_sum` in place.
///
/// Returns the corpus's mean squared error *before* this step's update.
pub fn gradient_step(weights: &mut [f64], g_sum: &mut [f64], samples: &[Sample], lr: f64, num_threads: usize) -> f64 {
    let (grad, sse) = if num_threads <= 1 || samples.len() < num_threads {
        partial_gradient(weights, samples)
    } else {
        let chunk_size = samples.len().div_ceil(num_threads);
        let weights_ref: &[f64] = weights;
        scope(|s| {
            let handles: Vec<_> = samples
                .chunks(chunk_size)
                .map(|chunk| s.spawn(move || partial_gradient(weights_ref, chunk)))
                .collect();

            let mut total_grad = vec![0.0; weights.len()];
            let mut total_sse = 0.0;
            for h in handles {
                let (chunk_grad, chunk_sse) = h.join().unwrap();
                for (t, c) in total_grad.iter_mut().zip(chunk_grad) {
                    *t += c;
                }
                total_sse += chunk_sse;
            }
            (total_grad, total_sse)
        })
    };

    for i in 0..weights.len() {
        g_sum[i] += grad[i] * grad[i];
        weights[i] -= lr * grad[i] / (g_sum[i] + ADAGRAD_EPSILON).sqrt();
    }

    sse / samples.len() as f64
}

/// Render the dense weight vector as six 8x8 PSQT tables, in the orientation
/// `crate::base::pst::RAW_MILLIPAWN` is authored in (rank 1 first), for
/// pasting back into source.
#[must_use]
pub fn format_tables(weights: &[f64]) -> String {
    let mut out = String::new();
    for kind in Piece::ALL {
        out.push_str(&format!("// {kind:?}\n"));
        for rank in (0..8).rev() {
            out.push_str("    ");
            for file in 0..8 {
                let sq = rank * 8 + file;
                out.push_str(&format!("{:>6} ", weights[kind as usize * 64 + sq].round() as i32));
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic_sample(fen: &str, outcome: f64) -> Sample {
        let pos = Position::from_fen(fen).unwrap();
        Sample { features: extract_features(&pos), outcome }
    }

    #[test]
    fn initial_weights_match_base_material_values() {
        let w = initial_weights();
        assert_eq!(w[Piece::Pawn as usize * 64], 100.0);
        assert_eq!(w[Piece::Queen as usize * 64], 850.0);
        assert_eq!(w[Piece::King as usize * 64], 0.0);
    }

    #[test]
    fn evaluation_is_zero_for_symmetric_position() {
        let pos = Position::startpos();
        let features = extract_features(&pos);
        let weights = initial_weights();
        assert_eq!(evaluate(&weights, &features), 0.0);
    }

    #[test]
    fn gradient_step_reduces_error_toward_a_winning_label() {
        // White is up a whole queen; training toward outcome=1.0 should not
        // increase the squared error.
        let samples = vec![synthetic_sample(
            "4k3/8/8/8/8/8/8/4KQ2 w - - 0 1",
            1.0,
        )];
        let mut weights = initial_weights();
        let mut g_sum = vec![0.0; weights.len()];

        let mse_before = gradient_step(&mut weights, &mut g_sum, &samples, 0.8, 1);
        let (_, sse_after) = partial_gradient(&weights, &samples);
        assert!(sse_after <= mse_before + 1e-6);
    }

    #[test]
    fn gradient_step_matches_across_thread_counts() {
        let samples = vec![
            synthetic_sample("4k3/8/8/8/8/8/8/4KQ2 w - - 0 1", 1.0),
            synthetic_sample("4kq2/8/8/8/8/8/8/4K3 w - - 0 1", 0.0),
            synthetic_sample("4k3/8/8/8/8/8/8/4K3 w - - 0 1", 0.5),
            synthetic_sample("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 0.5),
        ];
        let mut w1 = initial_weights();
        let mut g1 = vec![0.0; w1.len()];
        let mse1 = gradient_step(&mut w1, &mut g1, &samples, 0.5, 1);

        let mut w2 = initial_weights();
        let mut g2 = vec![0.0; w2.len()];
        let mse2 = gradient_step(&mut w2, &mut g2, &samples, 0.5, 4);

        assert!((mse1 - mse2).abs() < 1e-9);
        for (a, b) in w1.iter().zip(&w2) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
