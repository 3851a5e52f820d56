// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Image dimensional flipper
//!
//! The carver only ever removes vertical seams.  To carve rows it
//! physically transposes its buffers, so that each column of the
//! picture becomes a contiguous row in memory, and remembers that it
//! did so.  `Orientation` is that memory: every conversion between
//! the caller's (x, y) and the storage (x, y) goes through here, and
//! the caller's width and height are always a pure function of the
//! stored width, the stored height and the orientation.

use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    Normal,
    Transposed,
}

impl Default for Orientation {
    fn default() -> Self {
        Orientation::Normal
    }
}

impl Orientation {
    pub fn flip(self) -> Self {
        match self {
            Orientation::Normal => Orientation::Transposed,
            Orientation::Transposed => Orientation::Normal,
        }
    }

    pub fn is_transposed(self) -> bool {
        self == Orientation::Transposed
    }

    /// Map a pair from one frame to the other.  The map is its own
    /// inverse, so it serves for points and for sizes in both
    /// directions.
    #[inline]
    pub fn apply<T>(self, (a, b): (T, T)) -> (T, T) {
        match self {
            Orientation::Normal => (a, b),
            Orientation::Transposed => (b, a),
        }
    }

    /// Caller's point to storage point.
    #[inline]
    pub fn to_storage<T>(self, xy: (T, T)) -> (T, T) {
        self.apply(xy)
    }

    /// Storage point to caller's point.
    #[inline]
    pub fn to_public<T>(self, xy: (T, T)) -> (T, T) {
        self.apply(xy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flipping_twice_is_identity() {
        assert_eq!(Orientation::Normal.flip().flip(), Orientation::Normal);
        assert!(Orientation::Normal.flip().is_transposed());
    }

    #[test]
    fn transposed_swaps_pairs() {
        let t = Orientation::Transposed;
        assert_eq!(t.to_storage((3u32, 8u32)), (8, 3));
        assert_eq!(t.to_public(t.to_storage((3u32, 8u32))), (3, 8));
        assert_eq!(Orientation::Normal.to_public((3, 8)), (3, 8));
    }
}
