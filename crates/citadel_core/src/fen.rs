//! FEN-style text I/O for positions.
//!
//! `<board> <turn: w|b> <bastion-rights> [<wall-built-last>] <halfmove>
//! <fullmove>` with glyphs M/C/L/P/I/S for White pieces (lowercase for
//! Black), W/w for hp-1 walls and R/r for reinforced walls, and run-length
//! digits 1-9 for empties. The wall-built-last token is optional for
//! backward compatibility.

use thiserror::Error;

use crate::board::Position;
use crate::types::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FenError {
    #[error("missing FEN field: {0}")]
    MissingField(&'static str),
    #[error("turn must be 'w' or 'b', got '{0}'")]
    BadTurn(String),
    #[error("board must have 9 ranks of 9 files")]
    BadShape,
    #[error("too many files in a rank")]
    FileOverflow,
    #[error("unknown piece glyph '{0}'")]
    UnknownGlyph(char),
    #[error("invalid counter '{0}'")]
    BadCounter(String),
}

impl Position {
    pub fn to_fen(&self) -> String {
        let mut out = String::new();

        for r in 0..N {
            let mut empty = 0u8;
            for c in 0..N {
                let v = self.raw_at(sq(r, c));
                if v == 0 {
                    empty += 1;
                    continue;
                }
                if empty > 0 {
                    out.push((b'0' + empty) as char);
                    empty = 0;
                }
                let mut ch = if is_piece_val(v) {
                    match piece_of(v) {
                        PieceType::Mason => 'M',
                        PieceType::Catapult => 'C',
                        PieceType::Lancer => 'L',
                        PieceType::Pegasus => 'P',
                        PieceType::Minister => 'I',
                        PieceType::Sovereign => 'S',
                    }
                } else if wall_hp(v) == 2 {
                    'R'
                } else {
                    'W'
                };
                if v < 0 {
                    ch = ch.to_ascii_lowercase();
                }
                out.push(ch);
            }
            if empty > 0 {
                out.push((b'0' + empty) as char);
            }
            if r != N - 1 {
                out.push('/');
            }
        }

        out.push(' ');
        out.push(if self.turn() == Color::White { 'w' } else { 'b' });
        out.push(' ');

        let mut rights = String::new();
        if self.bastion_right(Color::White) {
            rights.push('B');
        }
        if self.bastion_right(Color::Black) {
            rights.push('b');
        }
        if rights.is_empty() {
            rights.push('-');
        }
        out.push_str(&rights);
        out.push(' ');

        let mut built = String::new();
        if self.wall_built_last(Color::White) {
            built.push('w');
        }
        if self.wall_built_last(Color::Black) {
            built.push('b');
        }
        if built.is_empty() {
            built.push('-');
        }
        out.push_str(&built);

        out.push_str(&format!(" {} {}", self.halfmove(), self.fullmove()));
        out
    }

    pub fn from_fen(fen: &str) -> Result<Position, FenError> {
        let mut fields = fen.split_whitespace();
        let board_str = fields.next().ok_or(FenError::MissingField("board"))?;
        let turn_str = fields.next().ok_or(FenError::MissingField("turn"))?;

        // Rights default to both sides when absent; the wall-built-last
        // token is optional, so a digit in its slot is the halfmove counter.
        let mut rights_str = "Bb";
        let mut built_str = "-";
        let mut halfmove = 0u32;
        let mut fullmove = 1u32;

        let parse_counter = |tok: &str| -> Result<u32, FenError> {
            tok.parse::<u32>()
                .map_err(|_| FenError::BadCounter(tok.to_string()))
        };
        let all_digits = |tok: &str| !tok.is_empty() && tok.bytes().all(|b| b.is_ascii_digit());

        if let Some(tok) = fields.next() {
            rights_str = tok;
            if let Some(tok2) = fields.next() {
                if all_digits(tok2) {
                    halfmove = parse_counter(tok2)?;
                } else {
                    built_str = tok2;
                    if let Some(tok3) = fields.next() {
                        halfmove = parse_counter(tok3)?;
                    }
                }
                if let Some(tok4) = fields.next() {
                    fullmove = parse_counter(tok4)?;
                }
            }
        }

        let turn = match turn_str {
            "w" | "W" => Color::White,
            "b" | "B" => Color::Black,
            other => return Err(FenError::BadTurn(other.to_string())),
        };

        let mut bastion = [false, false];
        if rights_str != "-" {
            for ch in rights_str.chars() {
                match ch {
                    'B' => bastion[Color::White.idx()] = true,
                    'b' => bastion[Color::Black.idx()] = true,
                    _ => {}
                }
            }
        }

        let mut wall_built = [false, false];
        if built_str != "-" {
            for ch in built_str.chars() {
                match ch.to_ascii_lowercase() {
                    'w' => wall_built[Color::White.idx()] = true,
                    'b' => wall_built[Color::Black.idx()] = true,
                    _ => {}
                }
            }
        }

        let mut p = Position::empty();
        p.set_turn_raw(turn);
        p.set_rights_raw(bastion, wall_built, halfmove, fullmove);

        let mut r = 0;
        let mut c = 0;
        for raw in board_str.chars() {
            if raw == '/' {
                if c != N {
                    return Err(FenError::BadShape);
                }
                r += 1;
                c = 0;
                continue;
            }
            if r >= N {
                return Err(FenError::BadShape);
            }

            if let Some(d) = raw.to_digit(10) {
                if d == 0 {
                    return Err(FenError::UnknownGlyph(raw));
                }
                c += d as i32;
                if c > N {
                    return Err(FenError::FileOverflow);
                }
                continue;
            }

            if c >= N {
                return Err(FenError::FileOverflow);
            }

            let color = if raw.is_ascii_uppercase() {
                Color::White
            } else {
                Color::Black
            };
            let v = match raw.to_ascii_uppercase() {
                'M' => make_piece(color, PieceType::Mason),
                'C' => make_piece(color, PieceType::Catapult),
                'L' => make_piece(color, PieceType::Lancer),
                'P' => make_piece(color, PieceType::Pegasus),
                'I' => make_piece(color, PieceType::Minister),
                'S' => make_piece(color, PieceType::Sovereign),
                'W' => make_wall(color, 1),
                'R' => make_wall(color, 2),
                _ => return Err(FenError::UnknownGlyph(raw)),
            };

            p.place_raw(sq(r, c), v);
            c += 1;
        }

        if r != N - 1 || c != N {
            return Err(FenError::BadShape);
        }

        p.rebuild_derived();
        Ok(p)
    }
}
