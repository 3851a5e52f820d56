// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Walking the visible pixels
//!
//! A carver's buffer holds every pixel it has ever had.  The cursor
//! walks only the ones visible at the current depth, in storage row
//! order, and knows where it is in the current (shrunk or grown) grid
//! as well as in the buffer.

use crate::vmap::VisibilityMap;

/// A saved cursor position, so that a walk can be suspended and
/// picked up again without holding a borrow of the map.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Position {
    x: u32,
    y: u32,
    now: usize,
    started: bool,
    eoc: bool,
}

#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    vmap: &'a VisibilityMap,
    width: u32,
    depth: u32,
    pos: Position,
}

impl<'a> Cursor<'a> {
    /// A cursor over a grid `width` pixels wide, which is what remains
    /// of every buffer row at `depth`.
    pub fn new(vmap: &'a VisibilityMap, width: u32, depth: u32) -> Self {
        debug_assert!(width >= 1 && width <= vmap.width());
        Cursor {
            vmap,
            width,
            depth,
            pos: Position::default(),
        }
    }

    pub fn resume(vmap: &'a VisibilityMap, width: u32, depth: u32, pos: Position) -> Self {
        Cursor {
            vmap,
            width,
            depth,
            pos,
        }
    }

    pub fn position(&self) -> Position {
        self.pos
    }

    /// Back to one step before the first visible pixel.
    pub fn reset(&mut self) {
        self.pos = Position::default();
    }

    /// Column in the current grid.
    pub fn x(&self) -> u32 {
        self.pos.x
    }

    /// Row in the current grid.
    pub fn y(&self) -> u32 {
        self.pos.y
    }

    /// Buffer index of the pixel under the cursor.
    pub fn now(&self) -> usize {
        self.pos.now
    }

    /// End of carver: the last `next` ran off the end of the grid.
    pub fn eoc(&self) -> bool {
        self.pos.eoc
    }

    pub fn is_started(&self) -> bool {
        self.pos.started
    }

    #[inline]
    fn visible(&self, index: usize) -> bool {
        self.vmap.is_visible(index, self.depth)
    }

    fn forward_from(&self, mut index: usize) -> usize {
        while !self.visible(index) {
            index += 1;
        }
        index
    }

    fn backward_from(&self, mut index: usize) -> usize {
        while !self.visible(index) {
            index -= 1;
        }
        index
    }

    /// Step to the next visible pixel.  Returns false, and raises the
    /// end-of-carver flag, when there is none.
    pub fn next(&mut self) -> bool {
        if self.pos.eoc {
            return false;
        }
        if !self.pos.started {
            self.pos.started = true;
            self.pos.now = self.forward_from(0);
            return true;
        }
        if self.pos.x + 1 < self.width {
            self.pos.x += 1;
        } else if self.pos.y + 1 < self.vmap.height() {
            self.pos.x = 0;
            self.pos.y += 1;
        } else {
            self.pos.eoc = true;
            return false;
        }
        self.pos.now = self.forward_from(self.pos.now + 1);
        true
    }

    /// Step back to the previous visible pixel.  Does nothing at the
    /// first pixel.
    pub fn previous(&mut self) -> bool {
        if !self.pos.started || (self.pos.x == 0 && self.pos.y == 0) {
            return false;
        }
        self.pos.eoc = false;
        if self.pos.x > 0 {
            self.pos.x -= 1;
        } else {
            self.pos.y -= 1;
            self.pos.x = self.width - 1;
        }
        self.pos.now = self.backward_from(self.pos.now - 1);
        true
    }

    /// The visible pixel to the left.  Not valid in the first column.
    pub fn left_neighbor_index(&self) -> usize {
        debug_assert!(self.pos.x > 0, "no left neighbour in column 0");
        self.backward_from(self.pos.now - 1)
    }

    /// The visible pixel to the right.  Not valid in the last column.
    pub fn right_neighbor_index(&self) -> usize {
        debug_assert!(self.pos.x + 1 < self.width, "no right neighbour in the last column");
        self.forward_from(self.pos.now + 1)
    }

    /// The visible pixel in the same column one row up.  Not valid in
    /// the first row.
    pub fn up_neighbor_index(&self) -> usize {
        debug_assert!(self.pos.y > 0, "no upper neighbour in row 0");
        self.nth_in_row(self.pos.y - 1, self.pos.x)
    }

    /// The visible pixel in the same column one row down.  Not valid in
    /// the last row.
    pub fn down_neighbor_index(&self) -> usize {
        debug_assert!(self.pos.y + 1 < self.vmap.height(), "no lower neighbour in the last row");
        self.nth_in_row(self.pos.y + 1, self.pos.x)
    }

    fn nth_in_row(&self, y: u32, x: u32) -> usize {
        let stride = self.vmap.width() as usize;
        let start = y as usize * stride;
        (start..start + stride)
            .filter(|i| self.visible(*i))
            .nth(x as usize)
            .unwrap_or(start)
    }
}
