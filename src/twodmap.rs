// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use crate::error::{CarverError, Result};
use std::ops::{Index, IndexMut};

/// Allocate a vector of `len` copies of `value`, reporting allocation
/// failure instead of aborting.  Every map and buffer in the carver is
/// built through here.
pub(crate) fn try_vec<T: Clone>(len: usize, value: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| CarverError::OutOfMemory)?;
    v.resize(len, value);
    Ok(v)
}

/// Where a cell of a rebuilt grid comes from.  Flattening, transposing,
/// inflating and growing all rebuild a grid out of the old one; they
/// differ only in the plan they hand to `gather`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) enum Source {
    /// Copy the old cell at this linear index.
    Copy(usize),
    /// Blend two old cells (an inserted seam pixel and its neighbour).
    Blend(usize, usize),
    /// A fresh cell holding the default value.
    Blank,
}

/// An addressable two-dimensional field.  It holds the visibility
/// levels, the rigidity mask and the scratch maps of the seam solver.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TwoDimensionalMap<P: Default + Copy> {
    pub width: u32,
    pub height: u32,
    data: Vec<P>,
}

impl<P: Default + Copy> TwoDimensionalMap<P> {
    /// Define a new map filled with the default value.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(TwoDimensionalMap {
            width,
            height,
            data: try_vec(width as usize * height as usize, P::default())?,
        })
    }

    /// Wrap existing row-major data.  The length has to match.
    pub fn from_vec(width: u32, height: u32, data: Vec<P>) -> Result<Self> {
        if data.len() != width as usize * height as usize {
            return Err(CarverError::InvalidDimension(format!(
                "{} cells cannot fill a {}x{} map",
                data.len(),
                width,
                height
            )));
        }
        Ok(TwoDimensionalMap {
            width,
            height,
            data,
        })
    }

    // The number one rule of this game: keep the index math in a
    // single location and never, ever mess with it.
    #[inline]
    pub fn get_index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        (y as usize) * (self.width as usize) + (x as usize)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[P] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [P] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<P> {
        self.data
    }

    /// Reset every cell to the default value.
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|c| *c = P::default());
    }

    /// Build a `width` x `height` map whose cells come from this one
    /// according to `plan`.
    pub(crate) fn gather<F>(&self, width: u32, height: u32, plan: &[Source], blend: F) -> Result<Self>
    where
        F: Fn(P, P) -> P,
    {
        debug_assert_eq!(plan.len(), width as usize * height as usize);
        let mut data = Vec::new();
        data.try_reserve_exact(plan.len())
            .map_err(|_| CarverError::OutOfMemory)?;
        data.extend(plan.iter().map(|s| match *s {
            Source::Copy(i) => self.data[i],
            Source::Blend(a, b) => blend(self.data[a], self.data[b]),
            Source::Blank => P::default(),
        }));
        Ok(TwoDimensionalMap {
            width,
            height,
            data,
        })
    }
}

impl<P: Default + Copy> Index<(u32, u32)> for TwoDimensionalMap<P> {
    type Output = P;

    fn index(&self, (x, y): (u32, u32)) -> &P {
        let index = self.get_index(x, y);
        &self.data[index]
    }
}

impl<P: Default + Copy> IndexMut<(u32, u32)> for TwoDimensionalMap<P> {
    fn index_mut(&mut self, (x, y): (u32, u32)) -> &mut P {
        let index = self.get_index(x, y);
        &mut self.data[index]
    }
}

impl<P: Default + Copy> Index<usize> for TwoDimensionalMap<P> {
    type Output = P;

    /// Linear addressing, for code that walks buffer indices.
    #[inline]
    fn index(&self, index: usize) -> &P {
        &self.data[index]
    }
}

impl<P: Default + Copy> IndexMut<usize> for TwoDimensionalMap<P> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut P {
        &mut self.data[index]
    }
}

/// The plan that transposes a `width` x `height` grid.
pub(crate) fn transpose_plan(width: u32, height: u32) -> Vec<Source> {
    use itertools::iproduct;
    iproduct!(0..width as usize, 0..height as usize)
        .map(|(x, y)| Source::Copy(y * width as usize + x))
        .collect()
}
