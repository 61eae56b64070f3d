//! Quantized NNUE-style evaluator.
//!
//! A sparse feature transform (one binary feature per piece/wall-on-square
//! plus three global bits) feeds a 256-unit accumulator; a 256->32
//! clipped-ReLU layer and a 32->1 output head finish the job in integer
//! arithmetic. The accumulator supports both from-scratch initialization
//! and incremental updates off the `Undo` record; search copies the parent
//! ply's accumulator and patches it forward on each descent.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use thiserror::Error;

use citadel_core::{Color, NullUndo, Position, Undo, SQ_N};

pub const VERSION: u32 = 1;

/// 16 channels per square: White pieces 0..6, White walls hp1/hp2 at 6..8,
/// then the Black mirror at 8..16.
pub const BOARD_CHANNELS: usize = 16;
pub const GLOBAL_FEATURES: usize = 3;
pub const INPUT_DIM: usize = BOARD_CHANNELS * SQ_N + GLOBAL_FEATURES;

pub const HIDDEN1: usize = 256;
pub const HIDDEN2: usize = 32;

/// Clipped-ReLU ceiling.
pub const ACT_MAX: i32 = 127;

const FEAT_STM_WHITE: usize = BOARD_CHANNELS * SQ_N;
const FEAT_BASTION_WHITE: usize = BOARD_CHANNELS * SQ_N + 1;
const FEAT_BASTION_BLACK: usize = BOARD_CHANNELS * SQ_N + 2;

#[derive(Debug, Error)]
pub enum NnueError {
    #[error("failed to read model: {0}")]
    Io(#[from] io::Error),
    #[error("bad magic (expected CNUE)")]
    BadMagic,
    #[error("unsupported model version {0}")]
    BadVersion(u32),
    #[error("shape mismatch (model vs engine)")]
    ShapeMismatch,
    #[error("activation clamp mismatch")]
    ClampMismatch,
    #[error("invalid shift values")]
    BadShift,
}

/// Running sum of feature-transform rows; copied per ply during search.
#[derive(Clone, Copy)]
pub struct Accumulator {
    pub v: [i32; HIDDEN1],
}

impl Default for Accumulator {
    fn default() -> Self {
        Accumulator { v: [0; HIDDEN1] }
    }
}

pub struct Nnue {
    // Feature-transform weights are feature-major: row `f` starts at
    // `f * HIDDEN1`, so an incremental update touches one contiguous row.
    ft_w: Vec<i16>,
    ft_b: [i32; HIDDEN1],
    l2_w: Vec<i8>,
    l2_b: [i32; HIDDEN2],
    out_w: [i8; HIDDEN2],
    out_b: i32,

    shift2: u32,
    shift3: u32,

    loaded: bool,
    last_error: Option<String>,
}

impl Default for Nnue {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32(r: &mut impl Read) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_i16_vec(r: &mut impl Read, n: usize) -> io::Result<Vec<i16>> {
    let mut bytes = vec![0u8; n * 2];
    r.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

fn read_i8_vec(r: &mut impl Read, n: usize) -> io::Result<Vec<i8>> {
    let mut bytes = vec![0u8; n];
    r.read_exact(&mut bytes)?;
    Ok(bytes.into_iter().map(|b| b as i8).collect())
}

/// Arithmetic right shift with floor semantics. Rust's `>>` on signed
/// integers already sign-extends, which is exactly floor division by a
/// power of two: `-5 >> 1 == -3`.
#[inline(always)]
pub(crate) fn arshift(x: i32, s: u32) -> i32 {
    x >> s
}

impl Nnue {
    pub fn new() -> Self {
        Nnue {
            ft_w: Vec::new(),
            ft_b: [0; HIDDEN1],
            l2_w: Vec::new(),
            l2_b: [0; HIDDEN2],
            out_w: [0; HIDDEN2],
            out_b: 0,
            shift2: 12,
            shift3: 8,
            loaded: false,
            last_error: None,
        }
    }

    pub fn loaded(&self) -> bool {
        self.loaded
    }

    /// The message of the last failed load, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn load_from_file(&mut self, path: &Path) -> Result<(), NnueError> {
        let file = File::open(path).map_err(NnueError::Io);
        match file {
            Ok(f) => self.load_from_reader(BufReader::new(f)),
            Err(e) => {
                self.loaded = false;
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Parse a model. On any failure the evaluator stays not-loaded and the
    /// error is also remembered for `last_error`.
    pub fn load_from_reader(&mut self, mut r: impl Read) -> Result<(), NnueError> {
        self.loaded = false;
        match self.parse(&mut r) {
            Ok(()) => {
                self.last_error = None;
                self.loaded = true;
                Ok(())
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn parse(&mut self, r: &mut impl Read) -> Result<(), NnueError> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if &magic != b"CNUE" {
            return Err(NnueError::BadMagic);
        }

        let version = read_u32(r)?;
        let input_dim = read_u32(r)?;
        let h1 = read_u32(r)?;
        let h2 = read_u32(r)?;
        let act_max = read_u32(r)?;
        let shift2 = read_u32(r)?;
        let shift3 = read_u32(r)?;

        if version != VERSION {
            return Err(NnueError::BadVersion(version));
        }
        if input_dim as usize != INPUT_DIM || h1 as usize != HIDDEN1 || h2 as usize != HIDDEN2 {
            return Err(NnueError::ShapeMismatch);
        }
        if act_max != ACT_MAX as u32 {
            return Err(NnueError::ClampMismatch);
        }
        if shift2 > 31 || shift3 > 31 {
            return Err(NnueError::BadShift);
        }

        self.shift2 = shift2;
        self.shift3 = shift3;

        self.ft_w = read_i16_vec(r, INPUT_DIM * HIDDEN1)?;
        for j in 0..HIDDEN1 {
            self.ft_b[j] = read_i32(r)?;
        }

        self.l2_w = read_i8_vec(r, HIDDEN2 * HIDDEN1)?;
        for k in 0..HIDDEN2 {
            self.l2_b[k] = read_i32(r)?;
        }

        let out_w = read_i8_vec(r, HIDDEN2)?;
        self.out_w.copy_from_slice(&out_w);
        self.out_b = read_i32(r)?;

        Ok(())
    }

    /// Feature index for a non-empty cell value on a square.
    pub fn feature_index(s: u8, raw: i8) -> Option<usize> {
        if s as usize >= SQ_N || raw == 0 {
            return None;
        }
        let base = if raw > 0 { 0 } else { 8 };
        let a = raw.unsigned_abs() as usize;
        let ch = match a {
            1..=6 => base + (a - 1),
            7 => base + 6,
            8 => base + 7,
            _ => return None,
        };
        Some(s as usize * BOARD_CHANNELS + ch)
    }

    #[inline(always)]
    fn add_row(&self, acc: &mut Accumulator, feature: usize) {
        let row = &self.ft_w[feature * HIDDEN1..(feature + 1) * HIDDEN1];
        for (a, &w) in acc.v.iter_mut().zip(row) {
            *a += i32::from(w);
        }
    }

    #[inline(always)]
    fn sub_row(&self, acc: &mut Accumulator, feature: usize) {
        let row = &self.ft_w[feature * HIDDEN1..(feature + 1) * HIDDEN1];
        for (a, &w) in acc.v.iter_mut().zip(row) {
            *a -= i32::from(w);
        }
    }

    #[inline(always)]
    fn toggle_row(&self, acc: &mut Accumulator, feature: usize, on: bool) {
        if on {
            self.add_row(acc, feature);
        } else {
            self.sub_row(acc, feature);
        }
    }

    /// Build an accumulator from scratch: bias plus the row of every "on"
    /// feature.
    pub fn init_accumulator(&self, pos: &Position, out: &mut Accumulator) {
        out.v = self.ft_b;

        for s in 0..SQ_N as u8 {
            if let Some(f) = Self::feature_index(s, pos.raw_at(s)) {
                self.add_row(out, f);
            }
        }

        if pos.turn() == Color::White {
            self.add_row(out, FEAT_STM_WHITE);
        }
        if pos.bastion_right(Color::White) {
            self.add_row(out, FEAT_BASTION_WHITE);
        }
        if pos.bastion_right(Color::Black) {
            self.add_row(out, FEAT_BASTION_BLACK);
        }
    }

    /// Patch an accumulator across a move. `pos_after` must be the position
    /// after `make_move` produced `u`.
    pub fn apply_delta_after_move(&self, acc: &mut Accumulator, pos_after: &Position, u: &Undo) {
        for &(s, old_raw) in u.changed() {
            if let Some(f) = Self::feature_index(s, old_raw) {
                self.sub_row(acc, f);
            }
            if let Some(f) = Self::feature_index(s, pos_after.raw_at(s)) {
                self.add_row(acc, f);
            }
        }

        let new_stm_white = pos_after.turn() == Color::White;
        if (u.prev_turn == Color::White) != new_stm_white {
            self.toggle_row(acc, FEAT_STM_WHITE, new_stm_white);
        }

        let new_bw = pos_after.bastion_right(Color::White);
        if u.prev_bastion_right[Color::White.idx()] != new_bw {
            self.toggle_row(acc, FEAT_BASTION_WHITE, new_bw);
        }
        let new_bb = pos_after.bastion_right(Color::Black);
        if u.prev_bastion_right[Color::Black.idx()] != new_bb {
            self.toggle_row(acc, FEAT_BASTION_BLACK, new_bb);
        }
    }

    /// Null move only flips the side-to-move feature.
    pub fn apply_delta_after_null(&self, acc: &mut Accumulator, pos_after: &Position, u: &NullUndo) {
        let new_stm_white = pos_after.turn() == Color::White;
        if (u.prev_turn == Color::White) != new_stm_white {
            self.toggle_row(acc, FEAT_STM_WHITE, new_stm_white);
        }
    }

    fn evaluate_white(&self, acc: &Accumulator) -> i32 {
        let mut h1 = [0i32; HIDDEN1];
        for (out, &x) in h1.iter_mut().zip(&acc.v) {
            *out = x.clamp(0, ACT_MAX);
        }

        let mut h2 = [0i32; HIDDEN2];
        for k in 0..HIDDEN2 {
            let mut sum = self.l2_b[k];
            let w = &self.l2_w[k * HIDDEN1..(k + 1) * HIDDEN1];
            for (&wj, &xj) in w.iter().zip(&h1) {
                sum += i32::from(wj) * xj;
            }
            h2[k] = arshift(sum, self.shift2).clamp(0, ACT_MAX);
        }

        let mut out = self.out_b;
        for (&wk, &xk) in self.out_w.iter().zip(&h2) {
            out += i32::from(wk) * xk;
        }
        arshift(out, self.shift3)
    }

    /// Evaluation from the side-to-move's perspective.
    pub fn evaluate_stm(&self, pos: &Position, acc: &Accumulator) -> i32 {
        let white = self.evaluate_white(acc);
        if pos.turn() == Color::White {
            white
        } else {
            -white
        }
    }
}

#[cfg(test)]
#[path = "nnue_tests.rs"]
pub(crate) mod nnue_tests;
