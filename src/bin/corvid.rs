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
//! Entry point dispatching the engine's CLI sub-commands: bare `uci`
//! (or no arguments) runs the UCI loop; `perft`, `tune`, and `extract` are
//! offline utilities driven by `-flag value` arguments.

use std::collections::HashSet;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use corvid::base::perft::{perft, perft_divide, perft_with_table, PerftTable};
use corvid::base::Position;
use corvid::engine::time::Timer;
use corvid::engine::uci::{self, move_from_uci};
use corvid::engine::SearchData;
use corvid::tuner;

fn main() {
    let args: Vec<String> = env::args().collect();
    let result = match args.get(1).map(String::as_str) {
        None | Some("uci") => {
            uci::run();
            Ok(())
        }
        Some("perft") => run_perft(&args[2..]),
        Some("tune") => run_tune(&args[2..]),
        Some("extract") => run_extract(&args[2..]),
        Some(other) => Err(format!("unknown sub-command `{other}`")),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// Find `-name value` in a flag-value argument list and return `value`.
fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    let needle = format!("-{name}");
    args.iter().position(|a| a == &needle).and_then(|i| args.get(i + 1)).map(String::as_str)
}

fn has_flag(args: &[String], name: &str) -> bool {
    let needle = format!("-{name}");
    args.iter().any(|a| a == &needle)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], name: &str, default: T) -> Result<T, String>
where
    T::Err: std::fmt::Display,
{
    match flag_value(args, name) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e| format!("bad -{name} value `{v}`: {e}")),
    }
}

/// `perft -fen <FEN> -depth <D> [-tt_size <MB>] [-verbose]`.
fn run_perft(args: &[String]) -> Result<(), String> {
    let fen = flag_value(args, "fen").ok_or("perft: -fen is required")?;
    let depth: u32 = flag_value(args, "depth")
        .ok_or("perft: -depth is required")?
        .parse()
        .map_err(|e| format!("perft: bad -depth: {e}"))?;
    let tt_size_mb: Option<u64> = match flag_value(args, "tt_size") {
        None => None,
        Some(v) => Some(v.parse().map_err(|e| format!("perft: bad -tt_size: {e}"))?),
    };
    let verbose = has_flag(args, "verbose");

    let pos = Position::from_fen(fen).map_err(|e| format!("perft: {e}"))?;

    if verbose {
        for (m, count) in perft_divide(&pos, depth) {
            println!("{}: {count}", m.to_uci());
        }
        println!();
    }

    let start = Instant::now();
    let nodes = match tt_size_mb {
        Some(mb) => perft_with_table(&pos, depth, &mut PerftTable::with_size_mb(mb)),
        None => perft(&pos, depth),
    };
    let elapsed_ms = start.elapsed().as_millis();
    let nps = if elapsed_ms == 0 { 0 } else { u128::from(nodes) * 1000 / elapsed_ms };

    println!("nodes {nodes} time {elapsed_ms} nps {nps}");
    Ok(())
}

/// `tune -infile <CSV> [-learning_rate <f>] [-iterations <N>] [-record_err_every_nth <N>] [-num_threads <N>]`.
fn run_tune(args: &[String]) -> Result<(), String> {
    let infile = flag_value(args, "infile").ok_or("tune: -infile is required")?;
    let learning_rate: f64 = parse_flag(args, "learning_rate", 0.8)?;
    let iterations: usize = parse_flag(args, "iterations", 2000)?;
    let record_every: usize = parse_flag(args, "record_err_every_nth", 50)?;
    let num_threads: usize = parse_flag(args, "num_threads", 1)?;

    let corpus = tuner::load_corpus(Path::new(infile)).map_err(|e| format!("tune: {e}"))?;
    let mut weights = tuner::initial_weights();
    let mut g_sum = vec![0.0; weights.len()];

    let mut log = BufWriter::new(File::create("errors.txt").map_err(|e| format!("tune: {e}"))?);
    writeln!(log, "iteration,mse").map_err(|e| format!("tune: {e}"))?;

    for iteration in 1..=iterations {
        let mse = tuner::gradient_step(&mut weights, &mut g_sum, &corpus, learning_rate, num_threads);
        println!("iteration {iteration}: mse {mse}");
        if iteration % record_every == 0 {
            writeln!(log, "{iteration},{mse}").map_err(|e| format!("tune: {e}"))?;
            log.flush().map_err(|e| format!("tune: {e}"))?;
        }
    }

    println!("{}", tuner::format_tables(&weights));
    Ok(())
}

/// How early into a game a sampled ply is discarded as too opening-booky.
const MIN_SAMPLE_PLY: usize = 10;
/// How late into a game a sampled ply is discarded as too close to a forced
/// mate/draw sequence to be a representative middlegame/endgame position.
const MAX_SAMPLE_PLY: usize = 200;
/// Plies this close to the end of a game are never sampled.
const SKIP_LAST_PLIES: usize = 10;

/// `extract -infile <GAMES> [-outfile <CSV>]`: sample quiet positions out of
/// a corpus of played games and label them with the game's outcome, for
/// consumption by `tune`.
///
/// Grounded on `original_source/datagen/fen_extractor.go`'s sampling rules
/// (skip the opening and the last few plies, skip in-check positions,
/// quiescence-search each sample to a quiet FEN) but reads a simpler
/// line-oriented game record rather than full PGN: each line is
/// `<result> <move1> <move2> …`, where `<result>` is `1-0`, `0-1`, or
/// `1/2-1/2` and the moves are UCI long algebraic, played from the standard
/// starting position. Full PGN/SAN parsing was judged out of proportion to
/// this utility's role (see DESIGN.md).
fn run_extract(args: &[String]) -> Result<(), String> {
    let infile = flag_value(args, "infile").ok_or("extract: -infile is required")?;
    let outfile = flag_value(args, "outfile").unwrap_or("output.csv");

    let file = File::open(infile).map_err(|e| format!("extract: {e}"))?;
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| format!("extract: {e}"))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        extract_game(line, &mut seen, &mut rows)?;
    }

    fastrand::shuffle(&mut rows);

    let mut out = BufWriter::new(File::create(outfile).map_err(|e| format!("extract: {e}"))?);
    writeln!(out, "fen,outcome").map_err(|e| format!("extract: {e}"))?;
    for (fen, outcome) in &rows {
        writeln!(out, "{fen},{outcome}").map_err(|e| format!("extract: {e}"))?;
    }

    println!("wrote {} samples to {outfile}", rows.len());
    Ok(())
}

fn extract_game(line: &str, seen: &mut HashSet<String>, rows: &mut Vec<(String, f64)>) -> Result<(), String> {
    let mut tokens = line.split_ascii_whitespace();
    let result_tok = tokens.next().ok_or("extract: empty game record")?;
    let outcome = match result_tok {
        "1-0" => 1.0,
        "0-1" => 0.0,
        "1/2-1/2" => 0.5,
        other => return Err(format!("extract: unrecognized game result `{other}`")),
    };

    let uci_moves: Vec<&str> = tokens.collect();
    let total_plies = uci_moves.len();
    let last_sampleable_ply = total_plies.saturating_sub(SKIP_LAST_PLIES);

    let mut pos = Position::startpos();
    let mut searcher = SearchData::new(pos, Timer::infinite());

    for (i, tok) in uci_moves.iter().enumerate() {
        let m = move_from_uci(&pos, tok).ok_or_else(|| format!("extract: bad move `{tok}`"))?;
        pos.do_move(m);
        let ply = i + 1;

        if ply < MIN_SAMPLE_PLY || ply > MAX_SAMPLE_PLY || ply > last_sampleable_ply {
            continue;
        }
        if pos.is_side_in_check(pos.side()) {
            continue;
        }

        let (fen, _score) = searcher.quiescence_fen(&pos);
        if seen.insert(fen.clone()) {
            rows.push((fen, outcome));
        }
    }

    Ok(())
}
