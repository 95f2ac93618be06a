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
//! Parsing and running this engine's Universal Chess Interface subset:
//! `uci`, `isready`, `ucinewgame`, `position`, `go`, `stop`, `quit`.

use std::io::stdin;
use std::sync::RwLock;
use std::thread::{scope, Scope, ScopedJoinHandle};

use crate::base::{Move, MoveKind, Piece, Position, Square};
use crate::engine::search::{format_score, SearchData};
use crate::engine::time::{calculate_search_time, StopHandle, TimeControl, Timer};

const ENGINE_NAME: &str = "Corvid 0.1.0";
const ENGINE_AUTHOR: &str = "the Corvid project";
const STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Debug, Clone, PartialEq, Eq)]
/// A command sent from the GUI to the engine over UCI.
pub enum Command {
    Uci,
    IsReady,
    NewGame,
    /// The FEN to set up (`None` means the standard start position) plus the
    /// moves already played from it.
    Position { fen: Option<String>, moves: Vec<Move> },
    Go(Vec<GoOption>),
    Stop,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One token of a `go` command's option list (the restricted subset this
/// engine understands).
pub enum GoOption {
    WhiteTime(u64),
    BlackTime(u64),
    WhiteInc(u64),
    BlackInc(u64),
    MovesToGo(u32),
    Infinite,
}

pub type ParseResult = Result<Command, String>;

impl Command {
    /// Parse a single UCI line. Unrecognized tokens are an `Err`; the
    /// caller's read loop should log and ignore them, not terminate.
    pub fn parse_line(line: &str) -> ParseResult {
        let mut tokens = line.split_ascii_whitespace();
        let first = tokens.next().ok_or("empty line")?;
        match first {
            "uci" => Ok(Command::Uci),
            "isready" => Ok(Command::IsReady),
            "ucinewgame" => Ok(Command::NewGame),
            "position" => Command::parse_position(&mut tokens),
            "go" => Command::parse_go(&mut tokens),
            "stop" => Ok(Command::Stop),
            "quit" => Ok(Command::Quit),
            _ => Err(format!("unrecognized UCI command `{first}`")),
        }
    }

    fn parse_position(tokens: &mut dyn Iterator<Item = &str>) -> ParseResult {
        let (fen, mut next_tok) = match tokens.next().ok_or("position: reached EOL")? {
            "startpos" => (None, tokens.next()),
            "fen" => {
                let mut fen = String::new();
                let mut tok = tokens.next();
                while let Some(t) = tok {
                    if t == "moves" {
                        break;
                    }
                    if !fen.is_empty() {
                        fen.push(' ');
                    }
                    fen.push_str(t);
                    tok = tokens.next();
                }
                (Some(fen), tok)
            }
            other => return Err(format!("position: unexpected token `{other}`")),
        };

        if next_tok == Some("moves") {
            next_tok = tokens.next();
        }

        let mut pos = Position::from_fen(fen.as_deref().unwrap_or(STARTPOS_FEN))
            .map_err(|e| format!("position: {e}"))?;
        let mut moves = Vec::new();
        while let Some(tok) = next_tok {
            let m = move_from_uci(&pos, tok).ok_or_else(|| format!("position: bad move `{tok}`"))?;
            pos.do_move(m);
            moves.push(m);
            next_tok = tokens.next();
        }

        Ok(Command::Position { fen, moves })
    }

    fn parse_go(tokens: &mut dyn Iterator<Item = &str>) -> ParseResult {
        fn parse_u64(tokens: &mut dyn Iterator<Item = &str>) -> Result<u64, String> {
            tokens
                .next()
                .ok_or("go: reached EOL while parsing int")?
                .parse::<i64>()
                .map(|v| v.max(0) as u64)
                .map_err(|e| format!("go: {e}"))
        }
        fn parse_u32(tokens: &mut dyn Iterator<Item = &str>) -> Result<u32, String> {
            tokens
                .next()
                .ok_or("go: reached EOL while parsing int")?
                .parse()
                .map_err(|e| format!("go: {e}"))
        }

        let mut opts = Vec::new();
        while let Some(tok) = tokens.next() {
            opts.push(match tok {
                "wtime" => GoOption::WhiteTime(parse_u64(tokens)?),
                "btime" => GoOption::BlackTime(parse_u64(tokens)?),
                "winc" => GoOption::WhiteInc(parse_u64(tokens)?),
                "binc" => GoOption::BlackInc(parse_u64(tokens)?),
                "movestogo" => GoOption::MovesToGo(parse_u32(tokens)?),
                "infinite" => GoOption::Infinite,
                other => return Err(format!("go: unrecognized option `{other}`")),
            });
        }
        Ok(Command::Go(opts))
    }
}

/// Parse a UCI long-algebraic move (`<from><to>[<promo>]`) against `pos`,
/// disambiguating move-kind from occupancy and en-passant state. The move
/// is not checked for legality; an illegal-but-well-formed move parses fine
/// and is applied unconditionally downstream.
#[must_use]
pub fn move_from_uci(pos: &Position, tok: &str) -> Option<Move> {
    if tok.len() < 4 {
        return None;
    }
    let from = Square::from_algebraic(&tok[0..2]).ok()?;
    let to = Square::from_algebraic(&tok[2..4]).ok()?;
    let (piece, color) = pos.piece_on(from)?;
    let is_capture_dest = pos.piece_on(to).is_some();

    let kind = if piece == Piece::Pawn && Some(to) == pos.ep_square() && from.file() != to.file() {
        if color == crate::base::Color::White {
            MoveKind::WhiteAttackEp
        } else {
            MoveKind::BlackAttackEp
        }
    } else if let Some(promo_char) = tok.chars().nth(4) {
        let promo_piece = Piece::from_code(promo_char.to_ascii_uppercase())?;
        MoveKind::promotion(promo_piece, is_capture_dest)
    } else if piece == Piece::King && from == Square::E1 && to == Square::G1 {
        MoveKind::WhiteCastleK
    } else if piece == Piece::King && from == Square::E1 && to == Square::C1 {
        MoveKind::WhiteCastleQ
    } else if piece == Piece::King && from == Square::E8 && to == Square::G8 {
        MoveKind::BlackCastleK
    } else if piece == Piece::King && from == Square::E8 && to == Square::C8 {
        MoveKind::BlackCastleQ
    } else if is_capture_dest {
        MoveKind::Attack
    } else {
        MoveKind::Quiet
    };

    Some(Move::new(from, to, piece, kind))
}

/// Run the UCI loop on stdin/stdout until `quit` or end-of-input.
///
/// Each `go` is executed on its own scoped thread so `stop` (read on the
/// main thread while the search thread blocks on `iterative_deepening`) can
/// cancel it promptly: the main thread interrupts by setting
/// `timer.stopped`.
pub fn run() {
    let position = RwLock::new(Position::startpos());
    let game_history = RwLock::new(Vec::<u64>::new());

    scope(|s| {
        let mut handle: Option<ScopedJoinHandle<'_, ()>> = None;
        let mut stop_handle: Option<StopHandle> = None;

        let mut buf = String::new();
        loop {
            buf.clear();
            if stdin().read_line(&mut buf).unwrap_or(0) == 0 {
                break;
            }
            let command = match Command::parse_line(&buf) {
                Ok(c) => c,
                Err(e) => {
                    println!("info string {e}");
                    continue;
                }
            };

            match command {
                Command::Uci => {
                    println!("id name {ENGINE_NAME}");
                    println!("id author {ENGINE_AUTHOR}");
                    println!("uciok");
                }
                Command::IsReady => println!("readyok"),
                Command::NewGame => {
                    join_search(&mut handle, &mut stop_handle);
                    *position.write().unwrap() = Position::startpos();
                    game_history.write().unwrap().clear();
                }
                Command::Position { fen, moves } => {
                    join_search(&mut handle, &mut stop_handle);
                    let mut pos = match &fen {
                        Some(f) => match Position::from_fen(f) {
                            Ok(p) => p,
                            Err(e) => {
                                println!("info string invalid fen: {e}");
                                continue;
                            }
                        },
                        None => Position::startpos(),
                    };
                    let mut history = vec![pos.hash()];
                    for m in moves {
                        pos.do_move(m);
                        history.push(pos.hash());
                    }
                    *position.write().unwrap() = pos;
                    *game_history.write().unwrap() = history;
                }
                Command::Go(opts) => {
                    join_search(&mut handle, &mut stop_handle);
                    let root = *position.read().unwrap();
                    let history = game_history.read().unwrap().clone();
                    let ply_count = history.len().max(1) - 1;
                    let timer = build_timer(&opts, &root, ply_count);
                    stop_handle = Some(timer.stop_handle());
                    let mut data = SearchData::new(root, timer);
                    for h in history {
                        data.push_game_history(h);
                    }
                    handle = Some(s.spawn(move || run_search(data)));
                }
                Command::Stop => {
                    if let Some(sh) = &stop_handle {
                        sh.stop();
                    }
                    join_search(&mut handle, &mut stop_handle);
                }
                Command::Quit => {
                    if let Some(sh) = &stop_handle {
                        sh.stop();
                    }
                    join_search(&mut handle, &mut stop_handle);
                    break;
                }
            }
        }
        if let Some(sh) = &stop_handle {
            sh.stop();
        }
        join_search(&mut handle, &mut stop_handle);
    });
}

fn join_search(handle: &mut Option<ScopedJoinHandle<'_, ()>>, stop_handle: &mut Option<StopHandle>) {
    if let Some(h) = handle.take() {
        let _ = h.join();
    }
    *stop_handle = None;
}

fn build_timer(opts: &[GoOption], root: &Position, ply_count: usize) -> Timer {
    let mut wtime = None;
    let mut btime = None;
    let mut winc = 0;
    let mut binc = 0;
    let mut moves_to_go = None;
    let mut infinite = false;

    for opt in opts {
        match *opt {
            GoOption::WhiteTime(t) => wtime = Some(t),
            GoOption::BlackTime(t) => btime = Some(t),
            GoOption::WhiteInc(i) => winc = i,
            GoOption::BlackInc(i) => binc = i,
            GoOption::MovesToGo(n) => moves_to_go = Some(n),
            GoOption::Infinite => infinite = true,
        }
    }

    if infinite {
        return Timer::infinite();
    }

    let (time_left_ms, increment_ms) = match root.side() {
        crate::base::Color::White => (wtime, winc),
        crate::base::Color::Black => (btime, binc),
    };

    match time_left_ms {
        None => Timer::infinite(),
        Some(time_left_ms) => {
            #[allow(clippy::cast_possible_truncation)]
            let move_number = (ply_count / 2 + 1) as u32;
            let ms = calculate_search_time(TimeControl {
                moves_to_go,
                time_left_ms,
                increment_ms,
                move_number,
            });
            Timer::bounded(ms)
        }
    }
}

/// Drive one `go`: iterative deepening, emitting `info` lines and a final
/// `bestmove`.
fn run_search(mut data: SearchData) {
    let best = data.iterative_deepening(|depth, score, nodes, elapsed_ms, pv| {
        let nps = if elapsed_ms == 0 { 0 } else { u128::from(nodes) * 1000 / elapsed_ms };
        let pv_str = pv.iter().map(Move::to_uci).collect::<Vec<_>>().join(" ");
        println!(
            "info depth {depth} time {elapsed_ms} score {} nodes {nodes} pv {pv_str} nps {nps}",
            format_score(score)
        );
    });
    println!("bestmove {}", best.to_uci());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_startpos_with_moves() {
        let cmd = Command::parse_line("position startpos moves e2e4 e7e5\n").unwrap();
        match cmd {
            Command::Position { fen, moves } => {
                assert_eq!(fen, None);
                assert_eq!(moves.len(), 2);
                assert_eq!(moves[0].to_uci(), "e2e4");
                assert_eq!(moves[1].to_uci(), "e7e5");
            }
            _ => panic!("expected Position"),
        }
    }

    #[test]
    fn parses_fen_position() {
        let cmd = Command::parse_line(
            "position fen rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1\n",
        )
        .unwrap();
        match cmd {
            Command::Position { fen, moves } => {
                assert_eq!(
                    fen.as_deref(),
                    Some("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1")
                );
                assert!(moves.is_empty());
            }
            _ => panic!("expected Position"),
        }
    }

    #[test]
    fn parses_castling_move_as_king_two_square_move() {
        let cmd = Command::parse_line(
            "position fen r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1 moves e1g1\n",
        )
        .unwrap();
        let Command::Position { moves, .. } = cmd else { panic!("expected Position") };
        assert_eq!(moves[0].kind(), MoveKind::WhiteCastleK);
    }

    #[test]
    fn parses_en_passant_capture() {
        let cmd = Command::parse_line(
            "position fen rnbqkbnr/ppp1pppp/8/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3 moves e5d6\n",
        )
        .unwrap();
        let Command::Position { moves, .. } = cmd else { panic!("expected Position") };
        assert_eq!(moves[0].kind(), MoveKind::WhiteAttackEp);
    }

    #[test]
    fn parses_go_time_control() {
        let cmd = Command::parse_line("go wtime 10000 btime 9000 winc 100 binc 100 movestogo 30\n")
            .unwrap();
        assert_eq!(
            cmd,
            Command::Go(vec![
                GoOption::WhiteTime(10000),
                GoOption::BlackTime(9000),
                GoOption::WhiteInc(100),
                GoOption::BlackInc(100),
                GoOption::MovesToGo(30),
            ])
        );
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(Command::parse_line("wobble\n").is_err());
    }
}
