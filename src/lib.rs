// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Liquid rescaling
//!
//! Multi-size seam carving: a `Carver` computes, once, the order in
//! which the pixels of a picture should disappear, and can then show
//! the picture at any width or height in the computed range by moving
//! a threshold.  Enlargement doubles the cheapest seams.

#[macro_use]
mod ternary;

pub mod config;
pub mod cursor;
pub mod energy;
pub mod error;
pub mod imageio;
pub mod logging;
pub mod orientation;
pub mod pixelbuffer;
pub mod progress;
pub mod rigidity;
pub mod seamcarver;
pub mod seamfinder;
pub mod twodmap;
pub mod vmap;

pub use config::CarverConfig;
pub use cursor::Cursor;
pub use energy::{EnergyFunction, EnergyProvider, ReadKind, ReadWindow, StructureTensor};
pub use error::{CarverError, ResizeStatus, Result};
pub use orientation::Orientation;
pub use pixelbuffer::{ColorDepth, ImageType, PixelBuffer, PixelData, Sample};
pub use progress::CarverHandle;
pub use rigidity::{RigidityMask, StepMask};
pub use seamcarver::{Carver, CarverState, Interpolation, Pixels, ResizeOrder};
pub use vmap::{VMapSnapshot, VisibilityMap};
