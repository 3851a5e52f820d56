// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Calculate the energy of an image
//!
//! The energy of a pixel says how much the picture would suffer if
//! that pixel went away.  An `EnergyProvider` computes it from a small
//! window of brightness values centred on the pixel.  The window is
//! laid over the *visible* grid, not the buffer: once a seam is gone,
//! the pixels on either side of it are neighbours.
//!
//! The builtin providers are the gradient family of [Avidan & Shamir
//! (2007)], plus an optional smoothed structure-tensor term for
//! pictures where plain gradients are too noisy.

use crate::error::CarverError;
use crate::pixelbuffer::{ImageType, PixelBuffer};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;

/// What the window holds for each pixel.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadKind {
    Brightness,
    Luma,
}

/// The value a pixel contributes to the read window.
pub fn read_value(buffer: &PixelBuffer, index: usize, kind: ReadKind) -> f32 {
    match (kind, buffer.image_type()) {
        (ReadKind::Luma, ImageType::Rgb) | (ReadKind::Luma, ImageType::Rgba) => {
            let luma = 0.2126 * buffer.channel(index, 0)
                + 0.7152 * buffer.channel(index, 1)
                + 0.0722 * buffer.channel(index, 2);
            let alpha = buffer
                .alpha_channel()
                .map_or(1.0, |a| buffer.channel(index, a));
            (luma * alpha) as f32
        }
        _ => buffer.brightness(index),
    }
}

/// One read value per buffer pixel.
pub(crate) fn read_cache(buffer: &PixelBuffer, kind: ReadKind) -> crate::error::Result<Vec<f32>> {
    let mut cache = Vec::new();
    cache
        .try_reserve_exact(buffer.pixel_count())
        .map_err(|_| CarverError::OutOfMemory)?;
    cache.extend((0..buffer.pixel_count()).map(|i| read_value(buffer, i, kind)));
    Ok(cache)
}

/// A square of read values around the pixel being evaluated.  Cells
/// that fall outside the visible grid read as zero.
#[derive(Debug, Clone)]
pub struct ReadWindow {
    radius: i32,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    cells: Vec<f32>,
}

impl ReadWindow {
    pub fn new(radius: u32) -> Self {
        let side = 2 * radius as usize + 1;
        ReadWindow {
            radius: radius as i32,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            cells: vec![0.0; side * side],
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius as u32
    }

    /// Column of the centre pixel in the visible grid.
    pub fn x(&self) -> u32 {
        self.x
    }

    pub fn y(&self) -> u32 {
        self.y
    }

    /// Size of the visible grid.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// True when the offset lands inside the visible grid.
    pub fn contains(&self, dx: i32, dy: i32) -> bool {
        let (x, y) = (self.x as i64 + dx as i64, self.y as i64 + dy as i64);
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    #[inline]
    pub fn read(&self, dx: i32, dy: i32) -> f32 {
        debug_assert!(dx.abs() <= self.radius && dy.abs() <= self.radius);
        let side = 2 * self.radius + 1;
        self.cells[((dy + self.radius) * side + dx + self.radius) as usize]
    }

    /// Load the window centred on (`x`, `y`) of a `width` x `height`
    /// grid whose values come from `sample`.
    pub fn fill<F>(&mut self, x: u32, y: u32, width: u32, height: u32, sample: F)
    where
        F: Fn(u32, u32) -> f32,
    {
        self.x = x;
        self.y = y;
        self.width = width;
        self.height = height;
        let r = self.radius;
        let side = 2 * r + 1;
        for dy in -r..=r {
            for dx in -r..=r {
                let cell = ((dy + r) * side + dx + r) as usize;
                self.cells[cell] = if self.contains(dx, dy) {
                    sample((x as i64 + dx as i64) as u32, (y as i64 + dy as i64) as u32)
                } else {
                    0.0
                };
            }
        }
    }
}

/// Anything that can rate a pixel from its read window.
pub trait EnergyProvider: Send + Sync + Debug {
    /// How far the window has to reach.  Changing a pixel changes the
    /// energy of everything within this radius.
    fn radius(&self) -> u32 {
        1
    }

    fn read_kind(&self) -> ReadKind {
        ReadKind::Brightness
    }

    fn energy(&self, window: &ReadWindow) -> f32;
}

impl<P: EnergyProvider + ?Sized> EnergyProvider for Box<P> {
    fn radius(&self) -> u32 {
        (**self).radius()
    }

    fn read_kind(&self) -> ReadKind {
        (**self).read_kind()
    }

    fn energy(&self, window: &ReadWindow) -> f32 {
        (**self).energy(window)
    }
}

/// The gradient at offset (`i`, `j`) from the centre: central
/// differences inside the grid, one-sided ones on its edges.
fn gradient_at(w: &ReadWindow, i: i32, j: i32) -> (f32, f32) {
    let along = |pos: i64, len: u32, lo: f32, mid: f32, hi: f32| {
        if len < 2 {
            0.0
        } else if pos == 0 {
            hi - mid
        } else if pos < len as i64 - 1 {
            (hi - lo) / 2.0
        } else {
            mid - lo
        }
    };
    let (x, y) = (w.x as i64 + i as i64, w.y as i64 + j as i64);
    let mid = w.read(i, j);
    let gx = along(x, w.width, w.read(i - 1, j), mid, w.read(i + 1, j));
    let gy = along(y, w.height, w.read(i, j - 1), mid, w.read(i, j + 1));
    (gx, gy)
}

/// The builtin energy functions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyFunction {
    /// Euclidean norm of the brightness gradient.
    GradientNorm,
    /// Mean of the absolute gradient components.
    GradientSumAbs,
    /// Absolute horizontal gradient only.
    GradientXAbs,
    /// Gradient norm computed on luma instead of brightness.
    LumaGradientNorm,
    /// Zero everywhere; seams are then chosen by rigidity alone.
    Null,
}

impl Default for EnergyFunction {
    fn default() -> Self {
        EnergyFunction::GradientNorm
    }
}

impl FromStr for EnergyFunction {
    type Err = CarverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gradient_norm" | "norm" => Ok(EnergyFunction::GradientNorm),
            "gradient_sum_abs" | "sumabs" => Ok(EnergyFunction::GradientSumAbs),
            "gradient_x_abs" | "xabs" => Ok(EnergyFunction::GradientXAbs),
            "luma_gradient_norm" | "luma" => Ok(EnergyFunction::LumaGradientNorm),
            "null" => Ok(EnergyFunction::Null),
            other => Err(CarverError::InvalidConfig(format!(
                "unknown energy function '{}'",
                other
            ))),
        }
    }
}

impl EnergyProvider for EnergyFunction {
    fn radius(&self) -> u32 {
        match self {
            EnergyFunction::Null => 0,
            _ => 1,
        }
    }

    fn read_kind(&self) -> ReadKind {
        match self {
            EnergyFunction::LumaGradientNorm => ReadKind::Luma,
            _ => ReadKind::Brightness,
        }
    }

    fn energy(&self, window: &ReadWindow) -> f32 {
        if *self == EnergyFunction::Null {
            return 0.0;
        }
        let (gx, gy) = gradient_at(window, 0, 0);
        match self {
            EnergyFunction::GradientNorm | EnergyFunction::LumaGradientNorm => {
                (gx * gx + gy * gy).sqrt()
            }
            EnergyFunction::GradientSumAbs => (gx.abs() + gy.abs()) / 2.0,
            EnergyFunction::GradientXAbs => gx.abs(),
            EnergyFunction::Null => 0.0,
        }
    }
}

/// Adds to another provider the square root of the largest eigenvalue
/// of the Gaussian-smoothed structure tensor.  Edges score high, flat
/// noisy areas much lower than with a bare gradient.
#[derive(Debug, Clone)]
pub struct StructureTensor<P> {
    inner: P,
    sigma: f32,
    reach: i32,
    kernel: Vec<f32>,
}

impl<P: EnergyProvider> StructureTensor<P> {
    pub fn new(inner: P, sigma: f32) -> Self {
        let reach = (2.0 * sigma).ceil().max(1.0) as i32;
        let kernel = (-reach..=reach)
            .map(|d| (-(d * d) as f32 / (2.0 * sigma * sigma)).exp())
            .collect();
        StructureTensor {
            inner,
            sigma,
            reach,
            kernel,
        }
    }

    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    fn weight(&self, d: i32) -> f32 {
        self.kernel[(d + self.reach) as usize]
    }
}

impl<P: EnergyProvider> EnergyProvider for StructureTensor<P> {
    fn radius(&self) -> u32 {
        self.inner.radius().max(self.reach as u32 + 1)
    }

    fn read_kind(&self) -> ReadKind {
        self.inner.read_kind()
    }

    fn energy(&self, window: &ReadWindow) -> f32 {
        let (mut a, mut b, mut c, mut total) = (0.0, 0.0, 0.0, 0.0);
        for j in -self.reach..=self.reach {
            for i in -self.reach..=self.reach {
                if !window.contains(i, j) {
                    continue;
                }
                let w = self.weight(i) * self.weight(j);
                let (gx, gy) = gradient_at(window, i, j);
                a += w * gx * gx;
                b += w * gx * gy;
                c += w * gy * gy;
                total += w;
            }
        }
        let tensor = if total > 0.0 {
            let (a, b, c) = (a / total, b / total, c / total);
            let half = (a - c) / 2.0;
            ((a + c) / 2.0 + (half * half + b * b).sqrt()).max(0.0).sqrt()
        } else {
            0.0
        };
        self.inner.energy(window) + tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A 5x4 grey picture, values already in [0, 1].
    const GRID: [f32; 20] = [
        0.0, 0.0, 1.0, 0.0, 0.0, //
        0.0, 0.5, 1.0, 0.5, 0.0, //
        0.0, 0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 0.0, 0.0,
    ];

    fn window_at(radius: u32, x: u32, y: u32) -> ReadWindow {
        let mut w = ReadWindow::new(radius);
        w.fill(x, y, 5, 4, |x, y| GRID[(y * 5 + x) as usize]);
        w
    }

    #[test]
    fn window_reads_zero_outside() {
        let w = window_at(1, 0, 0);
        assert_eq!(w.read(0, 0), 0.0);
        assert_eq!(w.read(-1, 0), 0.0);
        assert_eq!(w.read(1, 1), 0.5);
        assert!(!w.contains(-1, -1));
    }

    #[test]
    fn gradient_family() {
        // Centre (1, 1): gx = (1.0 - 0.0) / 2, gy = (0.0 - 0.0) / 2.
        let w = window_at(1, 1, 1);
        assert!((EnergyFunction::GradientNorm.energy(&w) - 0.5).abs() < 1e-6);
        assert!((EnergyFunction::GradientSumAbs.energy(&w) - 0.25).abs() < 1e-6);
        assert!((EnergyFunction::GradientXAbs.energy(&w) - 0.5).abs() < 1e-6);
        assert_eq!(EnergyFunction::Null.energy(&w), 0.0);
    }

    #[test]
    fn edges_use_one_sided_differences() {
        // Bottom-right corner: gx = 0 - 0, gy = 0 - 0.
        let w = window_at(1, 4, 3);
        assert_eq!(EnergyFunction::GradientNorm.energy(&w), 0.0);
        // Top edge, x = 2: gx = (0 - 0) / 2, gy = 1.0 - 1.0.
        let w = window_at(1, 2, 0);
        assert_eq!(EnergyFunction::GradientNorm.energy(&w), 0.0);
        // Row 2, x = 2: gy = (0.0 - 1.0) / 2.
        let w = window_at(1, 2, 2);
        assert!((EnergyFunction::GradientNorm.energy(&w) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn structure_tensor_adds_to_inner() {
        let st = StructureTensor::new(EnergyFunction::Null, 0.5);
        assert_eq!(st.radius(), 2);
        let flat = {
            let mut w = ReadWindow::new(st.radius());
            w.fill(1, 1, 4, 4, |_, _| 0.3);
            w
        };
        assert_eq!(st.energy(&flat), 0.0);
        let edge = window_at(st.radius(), 1, 1);
        assert!(st.energy(&edge) > 0.0);
    }

    #[test]
    fn names_parse() {
        assert_eq!("xabs".parse::<EnergyFunction>().unwrap(), EnergyFunction::GradientXAbs);
        assert_eq!(
            "luma_gradient_norm".parse::<EnergyFunction>().unwrap(),
            EnergyFunction::LumaGradientNorm
        );
        assert!("sobel".parse::<EnergyFunction>().is_err());
    }

    #[test]
    fn luma_weights_rgb() {
        let buf = PixelBuffer::new(vec![0u8, 255, 0], 1, 1, 3).unwrap();
        assert!((read_value(&buf, 0, ReadKind::Luma) - 0.7152).abs() < 1e-4);
        assert!((read_value(&buf, 0, ReadKind::Brightness) - 1.0 / 3.0).abs() < 1e-6);
    }
}
