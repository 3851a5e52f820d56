// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The visibility map
//!
//! One counter per buffer pixel.  Zero means the pixel has never been
//! carved away.  A positive value `v` means the pixel disappears once
//! the image has lost `v` columns relative to the buffer width, so the
//! pixels visible at shrink depth `d` are exactly those with `v == 0`
//! or `v > d`.  Because visibility is monotonic in depth, any width
//! inside the computed range is reached by moving a threshold.

use crate::error::{CarverError, Result};
use crate::orientation::Orientation;
use crate::twodmap::{Source, TwoDimensionalMap};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct VisibilityMap {
    map: TwoDimensionalMap<u32>,
}

impl VisibilityMap {
    /// A map in which everything is visible.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(VisibilityMap {
            map: TwoDimensionalMap::new(width, height)?,
        })
    }

    pub fn width(&self) -> u32 {
        self.map.width
    }

    pub fn height(&self) -> u32 {
        self.map.height
    }

    #[inline]
    pub fn value(&self, index: usize) -> u32 {
        self.map[index]
    }

    /// Record that `index` disappears at `depth`.  A pixel can only be
    /// removed once.
    #[inline]
    pub fn mark_removed(&mut self, index: usize, depth: u32) {
        debug_assert!(depth > 0);
        debug_assert_eq!(self.map[index], 0, "pixel {} removed twice", index);
        if self.map[index] == 0 {
            self.map[index] = depth;
        }
    }

    #[inline]
    pub fn is_visible(&self, index: usize, at_depth: u32) -> bool {
        let v = self.map[index];
        v == 0 || v > at_depth
    }

    pub fn visible_count(&self, at_depth: u32) -> usize {
        self.map
            .as_slice()
            .iter()
            .filter(|v| **v == 0 || **v > at_depth)
            .count()
    }

    /// The deepest level recorded.
    pub fn levels(&self) -> u32 {
        self.map.as_slice().iter().copied().max().unwrap_or(0)
    }

    /// Forget every removal.
    pub fn reset(&mut self) {
        self.map.clear();
    }

    pub(crate) fn from_map(map: TwoDimensionalMap<u32>) -> Self {
        VisibilityMap { map }
    }

    /// The buffer indices of the pixels visible at `depth`, packed into
    /// a `width` x `height` grid.  Every row must hold exactly `width`
    /// visible pixels.
    pub fn visible_grid(&self, width: u32, depth: u32) -> Result<TwoDimensionalMap<usize>> {
        let stride = self.width() as usize;
        let mut grid = TwoDimensionalMap::new(width, self.height())?;
        let cells = grid.as_mut_slice();
        let mut z = 0;
        for (i, v) in self.map.as_slice().iter().enumerate() {
            if *v == 0 || *v > depth {
                debug_assert!(z / width as usize == i / stride, "row {} is too wide", i / stride);
                cells[z] = i;
                z += 1;
            }
        }
        debug_assert_eq!(z, cells.len());
        Ok(grid)
    }

    pub(crate) fn gather(&self, width: u32, height: u32, plan: &[Source]) -> Result<Self> {
        Ok(VisibilityMap {
            map: self.map.gather(width, height, plan, |a, _| a)?,
        })
    }

    /// Extract a standalone snapshot of the whole grid, in the caller's
    /// (x, y) layout.  Levels are reported relative to `offset` and
    /// clipped at zero; `depth` is the shrink depth the snapshot is
    /// meant to be shown at.
    pub fn dump(&self, orientation: Orientation, offset: u32, depth: u32) -> VMapSnapshot {
        let (width, height) = orientation.to_public((self.width(), self.height()));
        let mut values = vec![0; width as usize * height as usize];
        for y in 0..self.height() {
            for x in 0..self.width() {
                let v = self.map[(x, y)];
                let (px, py) = orientation.to_public((x, y));
                values[py as usize * width as usize + px as usize] = v.saturating_sub(offset);
            }
        }
        VMapSnapshot {
            width,
            height,
            depth,
            orientation,
            values,
        }
    }

    /// Overwrite this map with a snapshot.  The snapshot's storage
    /// shape has to match this map exactly; nothing is modified when it
    /// does not.  Returns the deepest level installed.
    pub fn load(&mut self, snapshot: &VMapSnapshot) -> Result<u32> {
        let o = snapshot.orientation;
        let storage = o.to_storage((snapshot.width, snapshot.height));
        if storage != (self.width(), self.height()) {
            return Err(CarverError::mismatch(
                o.to_public((self.width(), self.height())),
                (snapshot.width, snapshot.height),
            ));
        }
        snapshot.validate()?;
        for y in 0..self.height() {
            for x in 0..self.width() {
                let (px, py) = o.to_public((x, y));
                self.map[(x, y)] = snapshot.values[py as usize * snapshot.width as usize + px as usize];
            }
        }
        Ok(snapshot.levels())
    }
}

/// A visibility map detached from any carver, suitable for storing
/// and for reloading into a fresh carver over the same picture.
///
/// `values` is row-major over `width` x `height` in the caller's
/// layout.  `orientation` says which way the seams run: `Normal` for
/// vertical seams (width carving), `Transposed` for horizontal ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VMapSnapshot {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub orientation: Orientation,
    pub values: Vec<u32>,
}

impl VMapSnapshot {
    /// The length of the carved axis.
    fn span(&self) -> u32 {
        self.orientation.to_storage((self.width, self.height)).0
    }

    pub fn levels(&self) -> u32 {
        self.values.iter().copied().max().unwrap_or(0)
    }

    pub fn value(&self, x: u32, y: u32) -> u32 {
        self.values[y as usize * self.width as usize + x as usize]
    }

    pub fn is_visible(&self, x: u32, y: u32, at_depth: u32) -> bool {
        let v = self.value(x, y);
        v == 0 || v > at_depth
    }

    pub fn visible_count(&self, at_depth: u32) -> usize {
        self.values
            .iter()
            .filter(|v| **v == 0 || **v > at_depth)
            .count()
    }

    /// Check the snapshot is internally consistent: the grid is full,
    /// and neither the levels nor the depth would carve the axis away
    /// entirely.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CarverError::InvalidDimension("empty snapshot".to_string()));
        }
        if self.values.len() != self.width as usize * self.height as usize {
            return Err(CarverError::InvalidDimension(format!(
                "snapshot holds {} values for {}x{}",
                self.values.len(),
                self.width,
                self.height
            )));
        }
        let span = self.span();
        if self.levels() >= span || self.depth > self.levels() {
            return Err(CarverError::InvalidDimension(format!(
                "snapshot depth {} / levels {} do not fit an axis of {}",
                self.depth,
                self.levels(),
                span
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CarverError::Unsupported(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let snapshot: VMapSnapshot =
            serde_json::from_str(text).map_err(|e| CarverError::InvalidConfig(e.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}
