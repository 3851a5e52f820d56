// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Carver errors
//!
//! Every failure is local and synchronous: the carver that reports one
//! is left in the last consistent state it reached.  Cancellation is
//! not an error; it comes back as a `ResizeStatus`.

use failure::Fail;

/// Everything that can go wrong when building or driving a carver.
#[derive(Debug, Fail, Clone, PartialEq)]
pub enum CarverError {
    /// Non-positive or inconsistent sizes, channel counts or indices.
    #[fail(display = "invalid dimension: {}", _0)]
    InvalidDimension(String),

    /// `init` was called on a carver that is already active, or an
    /// active carver was offered as an attachment.
    #[fail(display = "carver is already active")]
    AlreadyActive,

    /// An operation that needs the seam machinery ran before `init`.
    #[fail(display = "carver is not active")]
    NotActive,

    /// Two grids that have to line up pixel for pixel do not.
    #[fail(
        display = "dimension mismatch: expected {}x{}, found {}x{}",
        expected_width, expected_height, found_width, found_height
    )]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        found_width: u32,
        found_height: u32,
    },

    /// An allocation for a buffer or map could not be satisfied.
    #[fail(display = "out of memory")]
    OutOfMemory,

    /// A configuration value is out of range or unreadable.
    #[fail(display = "invalid configuration: {}", _0)]
    InvalidConfig(String),

    /// The request is well formed but outside what this carver handles.
    #[fail(display = "unsupported: {}", _0)]
    Unsupported(String),
}

impl CarverError {
    pub(crate) fn mismatch((expected_width, expected_height): (u32, u32), (found_width, found_height): (u32, u32)) -> Self {
        CarverError::DimensionMismatch {
            expected_width,
            expected_height,
            found_width,
            found_height,
        }
    }
}

/// How a resize ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResizeStatus {
    /// The target size was reached.
    Complete,
    /// A cancellation request was observed between two seams.  The
    /// carver is consistent at the size reported here and may be
    /// resized again or flattened.
    Cancelled { width: u32, height: u32 },
}

impl ResizeStatus {
    pub fn is_complete(&self) -> bool {
        *self == ResizeStatus::Complete
    }
}

pub type Result<T> = std::result::Result<T, CarverError>;
