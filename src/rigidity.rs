// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Rigidity
//!
//! Several things bias where seams go.  The `RigidityMask` is a
//! per-pixel weight added to the energy, used to protect (positive) or
//! sacrifice (negative) regions of the picture.  The `StepRigidity`
//! table is global: it charges a seam for every column it moves
//! sideways between two rows, which keeps seams straight.  A
//! `StepMask` scales that charge pixel by pixel, so seams can be kept
//! straight in one region and left free elsewhere.

use crate::error::{CarverError, Result};
use crate::orientation::Orientation;
use crate::twodmap::{try_vec, Source, TwoDimensionalMap};

/// Additive energy bias, stored in the carver's storage layout and
/// addressed in the caller's.
#[derive(Debug, Clone, PartialEq)]
pub struct RigidityMask {
    map: TwoDimensionalMap<f32>,
}

/// The part of a `w` x `h` area placed at (`x_off`, `y_off`) that falls
/// inside a `width` x `height` image, as ranges over the area.
fn overlap(width: u32, height: u32, w: u32, h: u32, x_off: i64, y_off: i64) -> (std::ops::Range<u32>, std::ops::Range<u32>) {
    let clip = |off: i64, len: u32, limit: u32| {
        let start = (-off).max(0).min(len as i64) as u32;
        let end = (limit as i64 - off).max(0).min(len as i64) as u32;
        start..end.max(start)
    };
    (clip(x_off, w, width), clip(y_off, h, height))
}

/// Check a `w` x `h` area of weights against its length.
fn check_area(weights: &[f32], w: u32, h: u32) -> Result<()> {
    if weights.len() != w as usize * h as usize {
        return Err(CarverError::InvalidDimension(format!(
            "{} weights for a {}x{} area",
            weights.len(),
            w,
            h
        )));
    }
    Ok(())
}

/// Read weights out of an 8-bit picture: each pixel's mean colour, in
/// [0, 1], scaled by its alpha when the picture has one (two or four
/// channels).
fn rgb_weights(rgb: &[u8], channels: u8, w: u32, h: u32) -> Result<impl Fn(u32, u32) -> f32 + '_> {
    if channels == 0 || channels > 4 {
        return Err(CarverError::InvalidDimension(format!(
            "{} channels in a mask picture",
            channels
        )));
    }
    let c = channels as usize;
    if rgb.len() != w as usize * h as usize * c {
        return Err(CarverError::InvalidDimension(format!(
            "{} bytes for a {}x{}x{} mask picture",
            rgb.len(),
            w,
            h,
            channels
        )));
    }
    let has_alpha = channels == 2 || channels == 4;
    let colours = cq!(has_alpha, c - 1, c);
    Ok(move |ax: u32, ay: u32| {
        let p = &rgb[(ay as usize * w as usize + ax as usize) * c..][..c];
        let sum: f32 = p[..colours].iter().map(|v| *v as f32).sum();
        let weight = sum / (colours as f32 * 255.0);
        cq!(has_alpha, weight * p[c - 1] as f32 / 255.0, weight)
    })
}

/// Visit the cells of `map` covered by a `w` x `h` area placed at
/// (`x_off`, `y_off`) in the caller's layout, with the area coordinates
/// of each.
#[allow(clippy::too_many_arguments)]
fn paint<F>(map: &mut TwoDimensionalMap<f32>, orientation: Orientation, w: u32, h: u32, x_off: i64, y_off: i64, mut apply: F)
where
    F: FnMut(&mut f32, u32, u32),
{
    let (width, height) = orientation.to_public((map.width, map.height));
    let (xs, ys) = overlap(width, height, w, h, x_off, y_off);
    for ay in ys {
        for ax in xs.clone() {
            let x = (ax as i64 + x_off) as u32;
            let y = (ay as i64 + y_off) as u32;
            apply(&mut map[orientation.to_storage((x, y))], ax, ay);
        }
    }
}

fn check_point(map: &TwoDimensionalMap<f32>, orientation: Orientation, x: u32, y: u32) -> Result<()> {
    let (width, height) = orientation.to_public((map.width, map.height));
    if x >= width || y >= height {
        return Err(CarverError::InvalidDimension(format!(
            "point ({}, {}) outside a {}x{} mask",
            x, y, width, height
        )));
    }
    Ok(())
}

impl RigidityMask {
    /// A zero mask over a storage grid of `width` x `height`.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        Ok(RigidityMask {
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
    pub fn value(&self, index: usize) -> f32 {
        self.map[index]
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Weight at a caller's point.
    pub fn get(&self, orientation: Orientation, x: u32, y: u32) -> f32 {
        self.map[orientation.to_storage((x, y))]
    }

    pub fn add_point(&mut self, orientation: Orientation, x: u32, y: u32, weight: f32) -> Result<()> {
        check_point(&self.map, orientation, x, y)?;
        self.map[orientation.to_storage((x, y))] += weight;
        Ok(())
    }

    /// Add a `w` x `h` block of weights whose top-left corner lands on
    /// (`x_off`, `y_off`).  Whatever falls outside the mask is ignored.
    pub fn add_area(&mut self, orientation: Orientation, weights: &[f32], w: u32, h: u32, x_off: i64, y_off: i64) -> Result<()> {
        check_area(weights, w, h)?;
        self.add_with(orientation, w, h, x_off, y_off, |ax, ay| {
            weights[ay as usize * w as usize + ax as usize]
        });
        Ok(())
    }

    /// Add weights derived from an 8-bit picture: each pixel's mean
    /// colour, in [0, 1], scaled by its alpha when the picture has one
    /// (two or four channels), then multiplied by `factor`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_rgb_area(
        &mut self,
        orientation: Orientation,
        rgb: &[u8],
        channels: u8,
        w: u32,
        h: u32,
        x_off: i64,
        y_off: i64,
        factor: f32,
    ) -> Result<()> {
        let weight = rgb_weights(rgb, channels, w, h)?;
        self.add_with(orientation, w, h, x_off, y_off, |ax, ay| weight(ax, ay) * factor);
        Ok(())
    }

    fn add_with<F>(&mut self, orientation: Orientation, w: u32, h: u32, x_off: i64, y_off: i64, weight: F)
    where
        F: Fn(u32, u32) -> f32,
    {
        paint(&mut self.map, orientation, w, h, x_off, y_off, |cell, ax, ay| {
            *cell += weight(ax, ay)
        });
    }

    pub(crate) fn gather(&self, width: u32, height: u32, plan: &[Source]) -> Result<Self> {
        Ok(RigidityMask {
            map: self.map.gather(width, height, plan, |a, b| (a + b) / 2.0)?,
        })
    }
}

/// Per-pixel factor on the step rigidity, 1 where nothing was set.
/// Values are set, not accumulated.
#[derive(Debug, Clone, PartialEq)]
pub struct StepMask {
    map: TwoDimensionalMap<f32>,
}

impl StepMask {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let size = width as usize * height as usize;
        Ok(StepMask {
            map: TwoDimensionalMap::from_vec(width, height, try_vec(size, 1.0)?)?,
        })
    }

    #[inline]
    pub fn factor(&self, index: usize) -> f32 {
        self.map[index]
    }

    pub fn get(&self, orientation: Orientation, x: u32, y: u32) -> f32 {
        self.map[orientation.to_storage((x, y))]
    }

    /// Back to 1 everywhere.
    pub fn reset(&mut self) {
        self.map.as_mut_slice().iter_mut().for_each(|c| *c = 1.0);
    }

    pub fn set_point(&mut self, orientation: Orientation, x: u32, y: u32, factor: f32) -> Result<()> {
        check_point(&self.map, orientation, x, y)?;
        self.map[orientation.to_storage((x, y))] = factor;
        Ok(())
    }

    pub fn set_area(&mut self, orientation: Orientation, factors: &[f32], w: u32, h: u32, x_off: i64, y_off: i64) -> Result<()> {
        check_area(factors, w, h)?;
        paint(&mut self.map, orientation, w, h, x_off, y_off, |cell, ax, ay| {
            *cell = factors[ay as usize * w as usize + ax as usize]
        });
        Ok(())
    }

    /// Set factors read from an 8-bit picture, scaled by `scale`.
    #[allow(clippy::too_many_arguments)]
    pub fn set_rgb_area(
        &mut self,
        orientation: Orientation,
        rgb: &[u8],
        channels: u8,
        w: u32,
        h: u32,
        x_off: i64,
        y_off: i64,
        scale: f32,
    ) -> Result<()> {
        let factor = rgb_weights(rgb, channels, w, h)?;
        paint(&mut self.map, orientation, w, h, x_off, y_off, |cell, ax, ay| {
            *cell = factor(ax, ay) * scale
        });
        Ok(())
    }

    pub(crate) fn gather(&self, width: u32, height: u32, plan: &[Source]) -> Result<Self> {
        Ok(StepMask {
            map: self.map.gather(width, height, plan, |a, b| (a + b) / 2.0)?,
        })
    }
}

/// The cost of moving a seam `k` columns sideways between two rows:
/// `rigidity * |k|^1.5 / height`, for `|k|` up to the transversal step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRigidity {
    delta_x: u32,
    rigidity: f32,
    table: Vec<f32>,
}

impl StepRigidity {
    pub fn new(delta_x: u32, rigidity: f32, height: u32) -> Self {
        let mut step = StepRigidity {
            delta_x,
            rigidity,
            table: Vec::new(),
        };
        step.rescale(height);
        step
    }

    /// Recompute the table for a new seam length.
    pub fn rescale(&mut self, height: u32) {
        let (dx, r, h) = (self.delta_x as i64, self.rigidity, height.max(1) as f32);
        self.table = (-dx..=dx)
            .map(|k| r * (k.abs() as f32).powf(1.5) / h)
            .collect();
    }

    pub fn delta_x(&self) -> u32 {
        self.delta_x
    }

    pub fn rigidity(&self) -> f32 {
        self.rigidity
    }

    #[inline]
    pub fn cost(&self, k: i64) -> f32 {
        self.table[(k + self.delta_x as i64) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_land_in_storage_layout() {
        let mut mask = RigidityMask::new(4, 2).unwrap();
        mask.add_point(Orientation::Transposed, 1, 3, 2.0).unwrap();
        assert_eq!(mask.map[(3, 1)], 2.0);
        assert_eq!(mask.get(Orientation::Transposed, 1, 3), 2.0);
        assert!(mask.add_point(Orientation::Transposed, 2, 0, 1.0).is_err());
    }

    #[test]
    fn areas_are_clipped_to_the_mask() {
        let mut mask = RigidityMask::new(3, 3).unwrap();
        let block = [1.0f32; 4];
        mask.add_area(Orientation::Normal, &block, 2, 2, -1, 2).unwrap();
        let sum: f32 = mask.map.as_slice().iter().sum();
        assert_eq!(sum, 1.0);
        assert_eq!(mask.get(Orientation::Normal, 0, 2), 1.0);

        mask.add_area(Orientation::Normal, &block, 2, 2, 5, 5).unwrap();
        let sum: f32 = mask.map.as_slice().iter().sum();
        assert_eq!(sum, 1.0);
    }

    #[test]
    fn rgb_weights_follow_alpha() {
        let mut mask = RigidityMask::new(2, 1).unwrap();
        let rgba = [255u8, 255, 255, 255, 255, 255, 255, 0];
        mask.add_rgb_area(Orientation::Normal, &rgba, 4, 2, 1, 0, 0, 3.0)
            .unwrap();
        assert!((mask.value(0) - 3.0).abs() < 1e-6);
        assert_eq!(mask.value(1), 0.0);
        assert!(mask
            .add_rgb_area(Orientation::Normal, &rgba, 4, 1, 1, 0, 0, 1.0)
            .is_err());
    }

    #[test]
    fn step_costs_grow_with_distance() {
        let step = StepRigidity::new(2, 4.0, 4);
        assert_eq!(step.cost(0), 0.0);
        assert_eq!(step.cost(-1), 1.0);
        assert_eq!(step.cost(1), 1.0);
        assert!((step.cost(2) - 8f32.sqrt()).abs() < 1e-5);
        let flat = StepRigidity::new(1, 0.0, 10);
        assert_eq!(flat.cost(-1), 0.0);
    }

    #[test]
    fn step_factors_are_set_not_added() {
        let mut factors = StepMask::new(3, 2).unwrap();
        assert_eq!(factors.get(Orientation::Normal, 2, 1), 1.0);
        factors.set_point(Orientation::Normal, 2, 1, 5.0).unwrap();
        factors.set_point(Orientation::Normal, 2, 1, 4.0).unwrap();
        assert_eq!(factors.get(Orientation::Normal, 2, 1), 4.0);
        assert!(factors.set_point(Orientation::Normal, 3, 0, 1.0).is_err());

        factors.set_area(Orientation::Transposed, &[0.0, 2.0], 1, 2, 1, 0).unwrap();
        assert_eq!(factors.get(Orientation::Transposed, 1, 0), 0.0);
        assert_eq!(factors.get(Orientation::Transposed, 1, 1), 2.0);

        let grey = [255u8, 0];
        factors.set_rgb_area(Orientation::Normal, &grey, 1, 2, 1, 0, 0, 10.0).unwrap();
        assert!((factors.factor(0) - 10.0).abs() < 1e-6);
        assert_eq!(factors.factor(1), 0.0);

        factors.reset();
        assert!(factors.map.as_slice().iter().all(|f| *f == 1.0));
    }
}
