//! Mirror layout: bass in the middle of the surface, highs at both edges.
//!
//! An amplitude frame holds `bar_count` values per channel, lowest band first.
//! The first channel fills the left half right-to-left, the second channel the
//! right half left-to-right, so band 0 of each channel meets at the center.
//! Mono frames mirror their single channel onto both halves.

/// Direction a bar grows from its center-side edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flip {
    /// Left half: the bar extends towards x = 0.
    Left,
    /// Right half: the bar extends towards x = width.
    Right,
}

impl Flip {
    pub fn sign(self) -> f32 {
        match self {
            Flip::Left => -1.0,
            Flip::Right => 1.0,
        }
    }
}

/// Display slot (0..2 * bar_count, left to right) and growth direction for
/// amplitude index `i`.
pub fn mirror_index(i: usize, bar_count: usize) -> (usize, Flip) {
    if i < bar_count {
        (bar_count - 1 - i, Flip::Left)
    } else {
        (i, Flip::Right)
    }
}

/// Amplitude index order that visits display slots left to right: the first
/// half reversed, then the second half in order.
pub fn walk_order(bar_count: usize) -> impl Iterator<Item = usize> {
    (0..bar_count).rev().chain(bar_count..bar_count * 2)
}

/// Value for amplitude index `i` (0..2 * bar_count). Missing values in a mono
/// frame mirror the first channel; anything else missing reads as silence.
pub fn value_at(values: &[f64], i: usize, bar_count: usize) -> f32 {
    match values.get(i) {
        Some(&v) => v as f32,
        None if values.len() == bar_count && i >= bar_count => values[i - bar_count] as f32,
        None => 0.0,
    }
}

/// Horizontal span `(left, right)` of a bar in pixels for a given bar pitch.
pub fn bar_span(slot: usize, flip: Flip, pitch: f32) -> (f32, f32) {
    let inner = match flip {
        Flip::Left => (slot + 1) as f32 * pitch,
        Flip::Right => slot as f32 * pitch,
    };
    let outer = inner + flip.sign() * pitch;
    (inner.min(outer), inner.max(outer))
}

/// Pixel x of line point `slot` when `2 * bar_count` points span the width.
pub fn line_x(slot: usize, bar_count: usize, width: f32) -> f32 {
    let points = bar_count * 2;
    if points < 2 {
        return 0.0;
    }
    slot as f32 / (points - 1) as f32 * width
}

/// Per-slot heights for the whole surface, left to right.
pub fn slot_heights(values: &[f64], bar_count: usize) -> Vec<f32> {
    let mut heights = vec![0.0; bar_count * 2];
    for i in walk_order(bar_count) {
        let (slot, _) = mirror_index(i, bar_count);
        heights[slot] = value_at(values, i, bar_count);
    }
    heights
}
