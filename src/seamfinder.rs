// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Finding seams
//!
//! The solver works over the *raw* grid: for every row, the buffer
//! indices of the pixels still visible, packed to the left.  Removing
//! a seam shifts the tail of each row one place left, so neither the
//! buffer nor the maps ever move.  Energies (`en`), accumulated path
//! costs (`m`) and back pointers (`least`) are all addressed by buffer
//! index.
//!
//! The path cost of a pixel is its energy plus the cheapest of the
//! path costs reachable in the row above, where a move of `k` columns
//! is allowed for `|k| <= delta_x` and is charged by the step rigidity
//! table, scaled by the step mask of the pixel moved into when there
//! is one.  Ties go left, unless the side has been switched.
//!
//! After each seam only the energies within the provider's radius of
//! the seam are recomputed, and the path costs are redone in a band
//! that starts at the changed energies and widens by `delta_x` per row,
//! narrowing again wherever a row turns out unchanged.

use crate::energy::{read_cache, read_value, EnergyProvider, ReadWindow};
use crate::error::Result;
use crate::pixelbuffer::PixelBuffer;
use crate::rigidity::{RigidityMask, StepMask, StepRigidity};
use crate::twodmap::{try_vec, TwoDimensionalMap};
use crate::vmap::VisibilityMap;
use log::trace;

/// Everything the energy of a pixel depends on.
#[derive(Clone, Copy)]
pub(crate) struct Scene<'a> {
    pub buffer: &'a PixelBuffer,
    pub mask: Option<&'a RigidityMask>,
    pub steps: Option<&'a StepMask>,
    pub provider: &'a dyn EnergyProvider,
    pub use_cache: bool,
}

/// The energy of the pixel at (`x`, `y`) of the raw grid.
#[allow(clippy::too_many_arguments)]
fn energy_of(
    scene: &Scene,
    cache: Option<&[f32]>,
    raw: &TwoDimensionalMap<usize>,
    window: &mut ReadWindow,
    x: u32,
    y: u32,
    width: u32,
    bias_scale: f32,
) -> f32 {
    let kind = scene.provider.read_kind();
    let buffer = scene.buffer;
    window.fill(x, y, width, raw.height, |sx, sy| {
        let i = raw[(sx, sy)];
        match cache {
            Some(c) => c[i],
            None => read_value(buffer, i, kind),
        }
    });
    let data = raw[(x, y)];
    let bias = scene.mask.map_or(0.0, |m| m.value(data) / bias_scale);
    scene.provider.energy(window) + bias
}

/// Energies of every cell of `grid`, in grid order.
pub(crate) fn energy_grid(scene: &Scene, grid: &TwoDimensionalMap<usize>, bias_scale: f32) -> Result<Vec<f32>> {
    let cache = if scene.use_cache {
        Some(read_cache(scene.buffer, scene.provider.read_kind())?)
    } else {
        None
    };
    let mut window = ReadWindow::new(scene.provider.radius());
    let mut out = try_vec(grid.len(), 0.0)?;
    for y in 0..grid.height {
        for x in 0..grid.width {
            out[grid.get_index(x, y)] = energy_of(
                scene,
                cache.as_deref(),
                grid,
                &mut window,
                x,
                y,
                grid.width,
                bias_scale,
            );
        }
    }
    Ok(out)
}

/// How often, in seams, the tie-break side flips while `seams` seams
/// are built with `frequency` switches.
pub(crate) fn switch_interval(seams: u32, frequency: u32) -> Option<u32> {
    if frequency == 0 || seams == 0 {
        None
    } else {
        Some((seams - 1) / frequency + 1)
    }
}

#[derive(Debug)]
pub struct SeamSolver {
    step: StepRigidity,
    leftright: bool,
    raw: TwoDimensionalMap<usize>,
    w: u32,
    h: u32,
    stride: u32,
    en: Vec<f32>,
    m: Vec<f32>,
    least: Vec<usize>,
    vpath: Vec<usize>,
    vpath_x: Vec<u32>,
    nrg_xmin: Vec<i64>,
    nrg_xmax: Vec<i64>,
    cache: Option<Vec<f32>>,
    window: ReadWindow,
}

impl SeamSolver {
    pub fn new(step: StepRigidity) -> Self {
        SeamSolver {
            step,
            leftright: false,
            raw: TwoDimensionalMap::default(),
            w: 0,
            h: 0,
            stride: 0,
            en: Vec::new(),
            m: Vec::new(),
            least: Vec::new(),
            vpath: Vec::new(),
            vpath_x: Vec::new(),
            nrg_xmin: Vec::new(),
            nrg_xmax: Vec::new(),
            cache: None,
            window: ReadWindow::new(1),
        }
    }

    /// Width of the raw grid right now.
    pub fn width(&self) -> u32 {
        self.w
    }

    /// Tie-break side: false for leftmost, true for rightmost.
    pub fn leftright(&self) -> bool {
        self.leftright
    }

    #[cfg(test)]
    fn energy(&self, index: usize) -> f32 {
        self.en[index]
    }

    #[cfg(test)]
    fn path_cost(&self, index: usize) -> f32 {
        self.m[index]
    }

    /// Get ready to compute seams beyond level `levels`: lay out the raw
    /// grid of the pixels still visible there and build the energy and
    /// path-cost maps from scratch.  The buffer must not carry inserted
    /// seams.
    pub(crate) fn prepare(&mut self, scene: &Scene, vmap: &VisibilityMap, levels: u32) -> Result<()> {
        let (w0, h0) = (vmap.width(), vmap.height());
        debug_assert!(levels < w0);
        let size = w0 as usize * h0 as usize;
        if self.en.len() != size {
            self.en = try_vec(size, 0.0)?;
            self.m = try_vec(size, 0.0)?;
            self.least = try_vec(size, 0)?;
        }
        if self.vpath.len() != h0 as usize {
            self.vpath = try_vec(h0 as usize, 0)?;
            self.vpath_x = try_vec(h0 as usize, 0)?;
            self.nrg_xmin = try_vec(h0 as usize, 0)?;
            self.nrg_xmax = try_vec(h0 as usize, 0)?;
        }
        self.w = w0 - levels;
        self.h = h0;
        self.stride = w0;
        self.raw = vmap.visible_grid(self.w, levels)?;
        self.step.rescale(h0);
        self.cache = if scene.use_cache {
            Some(read_cache(scene.buffer, scene.provider.read_kind())?)
        } else {
            None
        };
        self.window = ReadWindow::new(scene.provider.radius());
        self.build_emap(scene);
        self.build_mmap(scene.steps);
        Ok(())
    }

    fn compute_e(&mut self, scene: &Scene, x: u32, y: u32) {
        let data = self.raw[(x, y)];
        self.en[data] = energy_of(
            scene,
            self.cache.as_deref(),
            &self.raw,
            &mut self.window,
            x,
            y,
            self.w,
            self.stride as f32,
        );
    }

    #[cfg(not(feature = "threaded"))]
    fn build_emap(&mut self, scene: &Scene) {
        for y in 0..self.h {
            for x in 0..self.w {
                self.compute_e(scene, x, y);
            }
        }
    }

    // Every raw row lives inside one buffer row, so bands of rows write
    // to disjoint slices of the energy map.
    #[cfg(feature = "threaded")]
    fn build_emap(&mut self, scene: &Scene) {
        let (w, h, stride) = (self.w, self.h as usize, self.stride as usize);
        let bands = num_cpus::get().max(1).min(h);
        let rows = (h + bands - 1) / bands;
        let (raw, cache, radius) = (&self.raw, self.cache.as_deref(), self.window.radius());
        let en = &mut self.en;
        let result = crossbeam::scope(|s| {
            for (band, chunk) in en.chunks_mut(rows * stride).enumerate() {
                s.spawn(move |_| {
                    let mut window = ReadWindow::new(radius);
                    let base = band * rows * stride;
                    for y in band * rows..((band + 1) * rows).min(h) {
                        for x in 0..w {
                            let data = raw[(x, y as u32)];
                            chunk[data - base] =
                                energy_of(scene, cache, raw, &mut window, x, y as u32, w, stride as f32);
                        }
                    }
                });
            }
        });
        if let Err(panic) = result {
            std::panic::resume_unwind(panic);
        }
    }

    /// The cheapest way into (`x`, `y`) from the row above, as the
    /// buffer index of the parent and the path cost through it.
    #[inline]
    fn best_parent(&self, steps: Option<&StepMask>, x: u32, y: u32) -> (usize, f32) {
        let r_fact = steps.map_or(1.0, |s| s.factor(self.raw[(x, y)]));
        let (x, dx, w) = (x as i64, self.step.delta_x() as i64, self.w as i64);
        let x1_min = (-x).max(-dx);
        let x1_max = (w - 1 - x).min(dx);
        let mut least = self.raw[((x + x1_min) as u32, y - 1)];
        let mut m = self.m[least] + r_fact * self.step.cost(x1_min);
        for x1 in x1_min + 1..=x1_max {
            let down = self.raw[((x + x1) as u32, y - 1)];
            let m1 = self.m[down] + r_fact * self.step.cost(x1);
            if m1 < m || (m1 == m && self.leftright) {
                m = m1;
                least = down;
            }
        }
        (least, m)
    }

    fn build_mmap(&mut self, steps: Option<&StepMask>) {
        for x in 0..self.w {
            let data = self.raw[(x, 0)];
            self.m[data] = self.en[data];
        }
        for y in 1..self.h {
            for x in 0..self.w {
                let data = self.raw[(x, y)];
                let (least, m) = self.best_parent(steps, x, y);
                self.least[data] = least;
                self.m[data] = self.en[data] + m;
            }
        }
    }

    /// Trace the cheapest seam from the bottom row up.  Returns the
    /// buffer indices of its pixels, one per row, top first.
    pub(crate) fn find_seam(&mut self) -> &[usize] {
        let bottom = self.h - 1;
        let mut best: Option<(u32, f32)> = None;
        for x in 0..self.w {
            let m1 = self.m[self.raw[(x, bottom)]];
            best = match best {
                Some((_, m)) if m1 < m || (m1 == m && self.leftright) => Some((x, m1)),
                None => Some((x, m1)),
                keep => keep,
            };
        }
        let mut last_x = best.map_or(0, |(x, _)| x);
        let mut last = self.raw[(last_x, bottom)];
        let dx = self.step.delta_x();
        for y in (0..self.h).rev() {
            self.vpath[y as usize] = last;
            self.vpath_x[y as usize] = last_x;
            if y > 0 {
                last = self.least[self.raw[(last_x, y)]];
                let lo = last_x.saturating_sub(dx);
                let hi = (last_x + dx).min(self.w - 1);
                let found = (lo..=hi).find(|x| self.raw[(*x, y - 1)] == last);
                debug_assert!(found.is_some(), "seam broken at row {}", y);
                last_x = found.unwrap_or(last_x);
            }
        }
        trace!("seam at bottom column {} of {}", last_x, self.w);
        &self.vpath
    }

    /// Column of the last seam in each row of the raw grid.
    #[cfg(test)]
    pub(crate) fn seam_columns(&self) -> &[u32] {
        &self.vpath_x
    }

    /// Drop the last seam found from the raw grid.
    pub(crate) fn carve(&mut self) {
        debug_assert!(self.w > 1);
        for y in 0..self.h {
            for x in self.vpath_x[y as usize]..self.w - 1 {
                self.raw[(x, y)] = self.raw[(x + 1, y)];
            }
        }
        self.w -= 1;
    }

    /// Bring the maps up to date after a `carve`.  With `switch` the
    /// tie-break side flips and the path costs are rebuilt in full.
    pub(crate) fn refresh(&mut self, scene: &Scene, switch: bool) {
        self.update_emap(scene);
        if switch {
            self.leftright = !self.leftright;
            self.build_mmap(scene.steps);
        } else {
            self.update_mmap(scene.steps);
        }
    }

    fn update_emap(&mut self, scene: &Scene) {
        let (h, w, r) = (self.h as i64, self.w as i64, scene.provider.radius() as i64);
        for y in 0..self.h as usize {
            let x = self.vpath_x[y] as i64;
            self.nrg_xmin[y] = x;
            self.nrg_xmax[y] = x - 1;
        }
        for y in 0..h {
            let x = self.vpath_x[y as usize] as i64;
            for y1 in (y - r).max(0)..=(y + r).min(h - 1) {
                let y1 = y1 as usize;
                self.nrg_xmin[y1] = self.nrg_xmin[y1].min(x - r).max(0);
                // The seam is gone, so the band right of it is one shorter.
                self.nrg_xmax[y1] = self.nrg_xmax[y1].max(x + r - 1).min(w - 1);
            }
        }
        for y in 0..self.h {
            let (lo, hi) = (self.nrg_xmin[y as usize], self.nrg_xmax[y as usize]);
            for x in lo..=hi {
                self.compute_e(scene, x as u32, y);
            }
        }
    }

    fn update_mmap(&mut self, steps: Option<&StepMask>) {
        let (w, dx) = (self.w as i64, self.step.delta_x() as i64);
        let mut x_min = self.nrg_xmin[0].max(0);
        let mut x_max = self.nrg_xmax[0].min(w - 1);
        for x in x_min..=x_max {
            let data = self.raw[(x as u32, 0)];
            self.m[data] = self.en[data];
        }
        for y in 1..self.h {
            let yu = y as usize;
            x_min = x_min.min(self.nrg_xmin[yu]);
            x_max = x_max.max(self.nrg_xmax[yu]);
            x_min = (x_min - dx).max(0);
            x_max = (x_max + dx).min(w - 1);

            let mut stop = false;
            let mut x_stop = 0;
            let mut x = x_min;
            while x <= x_max {
                let data = self.raw[(x as u32, y)];
                let (least, m) = self.best_parent(steps, x as u32, y);
                let m_new = self.en[data] + m;
                let unchanged = self.least[data] == least && self.m[data] == m_new;
                if unchanged {
                    // Shrink the band from the left while nothing moves.
                    if x == x_min && x < self.nrg_xmin[yu] {
                        x_min += 1;
                    }
                }
                if unchanged && x > self.nrg_xmax[yu] {
                    if !stop {
                        x_stop = x;
                    }
                    stop = true;
                } else {
                    stop = false;
                }
                self.m[data] = m_new;
                self.least[data] = least;
                if x == x_max && stop {
                    x_max = x_stop;
                }
                x += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::EnergyFunction;

    const PICTURE: [u8; 30] = [
        10, 200, 30, 40, 220, 60, //
        90, 10, 250, 0, 20, 80, //
        35, 180, 60, 10, 90, 100, //
        240, 20, 70, 30, 0, 10, //
        5, 15, 25, 35, 45, 55,
    ];

    fn buffer() -> PixelBuffer {
        PixelBuffer::new(PICTURE.to_vec(), 6, 5, 1).unwrap()
    }

    fn scene<'a>(buffer: &'a PixelBuffer, provider: &'a EnergyFunction) -> Scene<'a> {
        Scene {
            buffer,
            mask: None,
            steps: None,
            provider,
            use_cache: true,
        }
    }

    fn is_valid_seam(seam: &[u32], width: u32, step: u32) -> bool {
        seam.iter().all(|x| *x < width)
            && seam
                .windows(2)
                .all(|p| (p[0] as i64 - p[1] as i64).abs() <= step as i64)
    }

    #[test]
    fn seams_are_connected_and_one_per_row() {
        let buf = buffer();
        let provider = EnergyFunction::GradientNorm;
        let scene = scene(&buf, &provider);
        let mut vmap = VisibilityMap::new(6, 5).unwrap();
        let mut solver = SeamSolver::new(StepRigidity::new(1, 0.0, 5));
        solver.prepare(&scene, &vmap, 0).unwrap();
        for level in 1..6 {
            let seam = solver.find_seam().to_vec();
            assert_eq!(seam.len(), 5);
            for (y, i) in seam.iter().enumerate() {
                assert_eq!(*i / 6, y);
                vmap.mark_removed(*i, level);
            }
            assert!(is_valid_seam(solver.seam_columns(), solver.width(), 1));
            if solver.width() > 1 {
                solver.carve();
                if solver.width() > 1 {
                    solver.refresh(&scene, false);
                }
            }
        }
        assert_eq!(vmap.visible_count(5), 5);
        assert_eq!(vmap.visible_count(4), 10);
    }

    #[test]
    fn incremental_maps_match_a_rebuild() {
        let buf = buffer();
        let provider = EnergyFunction::GradientNorm;
        let scene = scene(&buf, &provider);
        let mut vmap = VisibilityMap::new(6, 5).unwrap();
        let mut solver = SeamSolver::new(StepRigidity::new(2, 0.5, 5));
        solver.prepare(&scene, &vmap, 0).unwrap();
        for level in 1..=3 {
            for i in solver.find_seam().to_vec() {
                vmap.mark_removed(i, level);
            }
            solver.carve();
            solver.refresh(&scene, false);

            let mut fresh = SeamSolver::new(StepRigidity::new(2, 0.5, 5));
            fresh.prepare(&scene, &vmap, level).unwrap();
            for i in vmap.visible_grid(6 - level, level).unwrap().as_slice() {
                assert!((solver.energy(*i) - fresh.energy(*i)).abs() < 1e-5);
                assert!((solver.path_cost(*i) - fresh.path_cost(*i)).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn flat_picture_ties_break_left_then_right() {
        let buf = PixelBuffer::new(vec![7u8; 16], 4, 4, 1).unwrap();
        let provider = EnergyFunction::GradientNorm;
        let scene = scene(&buf, &provider);
        let vmap = VisibilityMap::new(4, 4).unwrap();
        let mut solver = SeamSolver::new(StepRigidity::new(1, 0.0, 4));
        solver.prepare(&scene, &vmap, 0).unwrap();
        assert_eq!(solver.find_seam(), &[0, 4, 8, 12]);
        solver.carve();
        solver.refresh(&scene, true);
        assert!(solver.leftright());
        assert_eq!(solver.find_seam(), &[3, 7, 11, 15]);
    }

    #[test]
    fn switch_interval_spreads_flips() {
        assert_eq!(switch_interval(10, 0), None);
        assert_eq!(switch_interval(10, 2), Some(5));
        assert_eq!(switch_interval(1, 3), Some(1));
    }
}
