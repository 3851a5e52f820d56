// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Seamcarve - The carver
//!
//! A `Carver` owns one picture and everything needed to show it at any
//! size: the pixel buffer, the visibility map that says at which depth
//! each pixel disappears, an optional rigidity mask, and the seam
//! solver that extends the map when a resize needs more seams than
//! have been computed so far.
//!
//! The carver only ever carves along storage rows, that is, it removes
//! vertical seams.  Height is handled by transposing the storage, and
//! the `orientation` flag translates between the caller's (x, y) and
//! the storage grid.  Moving between widths that have already been
//! computed is a threshold change; nothing is recomputed.
//!
//! Enlargement works on the same map: `n` removal seams are computed
//! and then each of them is doubled, the new pixel being made visible
//! before any original.  Growing by more than one `enl_step` at a time
//! flattens the picture and starts again from the larger one.

use crate::config::CarverConfig;
use crate::cursor::{Cursor, Position};
use crate::energy::{EnergyFunction, EnergyProvider, StructureTensor};
use crate::error::{CarverError, ResizeStatus, Result};
use crate::orientation::Orientation;
use crate::pixelbuffer::{ColorDepth, ImageType, PixelBuffer, PixelData, Sample};
use crate::progress::CarverHandle;
use crate::rigidity::{RigidityMask, StepMask, StepRigidity};
use crate::seamfinder::{energy_grid, switch_interval, Scene, SeamSolver};
use crate::twodmap::{transpose_plan, Source, TwoDimensionalMap};
use crate::vmap::{VMapSnapshot, VisibilityMap};
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Which dimension is carved first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeOrder {
    /// All of the width, then all of the height.
    Horizontal,
    /// All of the height, then all of the width.
    Vertical,
    /// Take turns, at most `switch_every` seams at a time.
    Alternate { switch_every: u32 },
}

impl Default for ResizeOrder {
    fn default() -> Self {
        ResizeOrder::Horizontal
    }
}

impl ResizeOrder {
    pub fn validate(&self) -> Result<()> {
        match self {
            ResizeOrder::Alternate { switch_every: 0 } => Err(CarverError::InvalidConfig(
                "alternate order needs switch_every >= 1".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Accepts `horizontal`, `vertical`, `alternate` (one seam at a time)
/// and `alternate:N`.
impl FromStr for ResizeOrder {
    type Err = CarverError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bad = || CarverError::InvalidConfig(format!("unknown resize order '{}'", s));
        let mut parts = s.splitn(2, ':');
        let order = match (parts.next(), parts.next()) {
            (Some("horizontal"), None) => ResizeOrder::Horizontal,
            (Some("vertical"), None) => ResizeOrder::Vertical,
            (Some("alternate"), None) => ResizeOrder::Alternate { switch_every: 1 },
            (Some("alternate"), Some(n)) => ResizeOrder::Alternate {
                switch_every: n.parse().map_err(|_| bad())?,
            },
            _ => return Err(bad()),
        };
        order.validate()?;
        Ok(order)
    }
}

/// How the pixels of an inserted seam are made.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Mean of the seam pixel and its left neighbour.
    Average,
    /// A copy of the seam pixel.
    Duplicate,
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation::Average
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CarverState {
    /// Constructed, `init` not yet called.
    Inactive,
    /// Ready to resize.
    Active,
    /// Active, and the buffer is exactly the picture shown: no history.
    Flattened,
}

#[derive(PartialEq, Copy, Clone, Debug)]
enum Carve {
    Width,
    Height,
}

impl Carve {
    fn turn(self) -> Self {
        if self == Carve::Width {
            Carve::Height
        } else {
            Carve::Width
        }
    }

    // The storage orientation in which this dimension runs along rows.
    fn orientation(self) -> Orientation {
        match self {
            Carve::Width => Orientation::Normal,
            Carve::Height => Orientation::Transposed,
        }
    }
}

#[derive(Debug)]
pub struct Carver {
    buffer: PixelBuffer,
    vmap: VisibilityMap,
    mask: Option<RigidityMask>,
    steps: Option<StepMask>,
    orientation: Orientation,
    // Storage width that the removal seams are counted from.
    w_start: u32,
    // Storage width currently shown.
    width: u32,
    // Removal seams computed from `w_start`.
    levels: u32,
    // Columns inserted into the buffer by the last enlargement.
    offset: u32,
    solver: Option<SeamSolver>,
    attached: Vec<Carver>,
    resize_order: ResizeOrder,
    side_switch_frequency: u32,
    enl_step: f32,
    use_cache: bool,
    interpolation: Interpolation,
    dump_vmaps: bool,
    energy: Box<dyn EnergyProvider>,
    dumps: Vec<VMapSnapshot>,
    scan: Position,
    scan_row: u32,
    handle: CarverHandle,
}

impl Carver {
    /// Wrap a picture.  Nothing is computed until `init` and `resize`.
    pub fn new(buffer: PixelBuffer) -> Result<Carver> {
        let vmap = VisibilityMap::new(buffer.width(), buffer.height())?;
        let width = buffer.width();
        Ok(Carver {
            buffer,
            vmap,
            mask: None,
            steps: None,
            orientation: Orientation::Normal,
            w_start: width,
            width,
            levels: 0,
            offset: 0,
            solver: None,
            attached: Vec::new(),
            resize_order: ResizeOrder::default(),
            side_switch_frequency: 0,
            enl_step: 2.0,
            use_cache: true,
            interpolation: Interpolation::default(),
            dump_vmaps: false,
            energy: Box::new(EnergyFunction::default()),
            dumps: Vec::new(),
            scan: Position::default(),
            scan_row: 0,
            handle: CarverHandle::new(),
        })
    }

    /// Take ownership of interleaved samples.
    pub fn from_raw<S: Sample>(data: Vec<S>, width: u32, height: u32, channels: u8) -> Result<Carver> {
        Carver::new(PixelBuffer::new(data, width, height, channels)?)
    }

    /// Copy interleaved samples, leaving the caller's slice alone.
    pub fn from_slice<S: Sample>(data: &[S], width: u32, height: u32, channels: u8) -> Result<Carver> {
        Carver::new(PixelBuffer::from_slice(data, width, height, channels)?)
    }

    /// Make the carver ready to resize.  `max_step` is the largest
    /// sideways move of a seam between two rows; `rigidity` the cost of
    /// such moves.  Whatever the carver shows now becomes its
    /// reference picture.
    pub fn init(&mut self, max_step: u32, rigidity: f32) -> Result<()> {
        if self.solver.is_some() {
            return Err(CarverError::AlreadyActive);
        }
        if max_step == 0 {
            return Err(CarverError::InvalidConfig("max_step must be at least 1".to_string()));
        }
        if !rigidity.is_finite() || rigidity < 0.0 {
            return Err(CarverError::InvalidConfig(format!(
                "rigidity {} is not a non-negative number",
                rigidity
            )));
        }
        self.flatten_storage()?;
        self.solver = Some(SeamSolver::new(StepRigidity::new(max_step, rigidity, self.h0())));
        debug!(
            "carver initialised at {}x{}, step {}, rigidity {}",
            self.width(),
            self.height(),
            max_step,
            rigidity
        );
        Ok(())
    }

    /// Apply a whole configuration, except the step and rigidity, which
    /// belong to `init`.
    pub fn configure(&mut self, config: &CarverConfig) -> Result<()> {
        config.validate()?;
        self.resize_order = config.resize_order;
        self.side_switch_frequency = config.side_switch_frequency;
        self.enl_step = config.enl_step;
        self.use_cache = config.use_cache;
        self.interpolation = config.interpolation;
        self.dump_vmaps = config.dump_vmaps;
        self.energy = match config.blur_sigma {
            Some(sigma) => Box::new(StructureTensor::new(config.energy, sigma)),
            None => Box::new(config.energy),
        };
        Ok(())
    }

    pub fn set_resize_order(&mut self, order: ResizeOrder) -> Result<()> {
        order.validate()?;
        self.resize_order = order;
        Ok(())
    }

    pub fn set_side_switch_frequency(&mut self, frequency: u32) {
        self.side_switch_frequency = frequency;
    }

    pub fn set_enl_step(&mut self, enl_step: f32) -> Result<()> {
        if !(enl_step > 1.0 && enl_step <= 2.0) {
            return Err(CarverError::InvalidConfig(format!(
                "enl_step {} is outside (1, 2]",
                enl_step
            )));
        }
        self.enl_step = enl_step;
        Ok(())
    }

    pub fn set_use_cache(&mut self, use_cache: bool) {
        self.use_cache = use_cache;
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
    }

    pub fn set_dump_vmaps(&mut self, dump: bool) {
        self.dump_vmaps = dump;
    }

    pub fn set_energy_function(&mut self, function: EnergyFunction) {
        self.energy = Box::new(function);
    }

    /// Replace the energy with any provider.
    pub fn set_energy_provider(&mut self, provider: Box<dyn EnergyProvider>) {
        self.energy = provider;
    }

    pub fn set_image_type(&mut self, image_type: ImageType) -> Result<()> {
        self.buffer.set_image_type(image_type)
    }

    pub fn set_alpha_channel(&mut self, channel: Option<u8>) -> Result<()> {
        self.buffer.set_alpha_channel(channel)
    }

    pub fn set_black_channel(&mut self, channel: Option<u8>) -> Result<()> {
        self.buffer.set_black_channel(channel)
    }

    // Accessors

    fn w0(&self) -> u32 {
        self.buffer.width()
    }

    fn h0(&self) -> u32 {
        self.buffer.height()
    }

    /// Current width, in the caller's layout.
    pub fn width(&self) -> u32 {
        self.orientation.to_public((self.width, self.h0())).0
    }

    /// Current height, in the caller's layout.
    pub fn height(&self) -> u32 {
        self.orientation.to_public((self.width, self.h0())).1
    }

    /// Size of the reference picture the seams are counted from.
    pub fn ref_width(&self) -> u32 {
        self.orientation.to_public((self.w_start, self.h0())).0
    }

    pub fn ref_height(&self) -> u32 {
        self.orientation.to_public((self.w_start, self.h0())).1
    }

    pub fn channels(&self) -> u8 {
        self.buffer.channels()
    }

    pub fn color_depth(&self) -> ColorDepth {
        self.buffer.color_depth()
    }

    pub fn image_type(&self) -> ImageType {
        self.buffer.image_type()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Columns hidden from the buffer at the current width.
    pub fn depth(&self) -> u32 {
        self.w0() - self.width
    }

    /// Removal seams computed so far.
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Columns inserted by the current enlargement.
    pub fn enlargement(&self) -> u32 {
        self.offset
    }

    pub fn enl_step(&self) -> f32 {
        self.enl_step
    }

    pub fn resize_order(&self) -> ResizeOrder {
        self.resize_order
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn is_active(&self) -> bool {
        self.solver.is_some()
    }

    pub fn state(&self) -> CarverState {
        match self.solver {
            None => CarverState::Inactive,
            Some(_) if self.is_flat() => CarverState::Flattened,
            Some(_) => CarverState::Active,
        }
    }

    /// The storage buffer, inserted and hidden pixels included.
    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// The visibility map over the storage buffer.
    pub fn vmap(&self) -> &VisibilityMap {
        &self.vmap
    }

    pub fn rigidity_mask(&self) -> Option<&RigidityMask> {
        self.mask.as_ref()
    }

    pub fn step_mask(&self) -> Option<&StepMask> {
        self.steps.as_ref()
    }

    /// A handle another thread can use to cancel or watch a resize.
    pub fn handle(&self) -> CarverHandle {
        self.handle.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    fn is_flat(&self) -> bool {
        self.levels == 0 && self.offset == 0 && self.width == self.w0()
    }

    // Auxiliary carvers

    /// Check that `aux` could follow this carver.  Nothing is changed.
    pub fn can_attach(&self, aux: &Carver) -> Result<()> {
        if aux.is_active() {
            return Err(CarverError::AlreadyActive);
        }
        let ours = self.orientation.to_public((self.w0(), self.h0()));
        let theirs = (aux.width(), aux.height());
        if ours != theirs {
            return Err(CarverError::mismatch(ours, theirs));
        }
        Ok(())
    }

    /// Make `aux` follow every seam this carver applies from now on.
    /// `aux` must be inactive and show a picture the size of this
    /// carver's buffer.  It is dropped if it does not qualify.
    pub fn attach(&mut self, mut aux: Carver) -> Result<()> {
        self.can_attach(&aux)?;
        aux.flatten_storage()?;
        if aux.orientation != self.orientation {
            aux.transpose_storage()?;
        }
        aux.follow(&self.vmap, self.w_start, self.width, self.levels, self.offset);
        debug!("attached a {}-channel carver", aux.channels());
        self.attached.push(aux);
        Ok(())
    }

    pub fn attached(&self) -> &[Carver] {
        &self.attached
    }

    pub fn attached_mut(&mut self) -> &mut [Carver] {
        &mut self.attached
    }

    /// Release one auxiliary carver, with the history it has followed.
    pub fn detach(&mut self, index: usize) -> Option<Carver> {
        if index < self.attached.len() {
            Some(self.attached.remove(index))
        } else {
            None
        }
    }

    pub fn detach_all(&mut self) -> Vec<Carver> {
        std::mem::take(&mut self.attached)
    }

    fn follow(&mut self, vmap: &VisibilityMap, w_start: u32, width: u32, levels: u32, offset: u32) {
        self.vmap = vmap.clone();
        self.w_start = w_start;
        self.width = width;
        self.levels = levels;
        self.offset = offset;
        self.scan_reset();
        for aux in self.attached.iter_mut() {
            aux.follow(vmap, w_start, width, levels, offset);
        }
    }

    /// Record a seam found by another carver: `seam` holds buffer
    /// indices, one per row, and `level` the depth it disappears at.
    pub(crate) fn apply_external_seam(&mut self, seam: &[usize], level: u32) {
        for &i in seam {
            self.vmap.mark_removed(i, level);
        }
        self.levels = self.levels.max(level);
        for aux in self.attached.iter_mut() {
            aux.apply_external_seam(seam, level);
        }
    }

    // Structural operations.  Each one is applied to the attached
    // carvers too, so that they stay index for index in step.

    fn set_width(&mut self, width: u32) {
        debug_assert!(width >= 1 && width <= self.w0());
        self.width = width;
        for aux in self.attached.iter_mut() {
            aux.set_width(width);
        }
    }

    /// Bake the picture currently shown into the buffer and forget all
    /// history.  Doing it twice changes nothing.
    pub fn flatten(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(CarverError::NotActive);
        }
        self.flatten_storage()
    }

    fn flatten_storage(&mut self) -> Result<()> {
        if self.is_flat() {
            return Ok(());
        }
        let (w, h) = (self.width, self.h0());
        debug!("flattening to {}x{}", self.width(), self.height());
        let grid = self.vmap.visible_grid(w, self.depth())?;
        let plan: Vec<Source> = grid.as_slice().iter().map(|i| Source::Copy(*i)).collect();
        let buffer = self.buffer.gather(w, h, &plan)?;
        let mask = self.mask.as_ref().map(|m| m.gather(w, h, &plan)).transpose()?;
        let steps = self.steps.as_ref().map(|m| m.gather(w, h, &plan)).transpose()?;
        let vmap = VisibilityMap::new(w, h)?;
        for aux in self.attached.iter_mut() {
            aux.flatten_storage()?;
        }
        self.buffer = buffer;
        self.mask = mask;
        self.steps = steps;
        self.vmap = vmap;
        self.w_start = w;
        self.levels = 0;
        self.offset = 0;
        self.scan_reset();
        Ok(())
    }

    /// Swap the storage axes.  The picture is flattened first; the
    /// caller's width and height do not change.
    pub fn transpose(&mut self) -> Result<()> {
        if !self.is_active() {
            return Err(CarverError::NotActive);
        }
        self.transpose_storage()
    }

    fn transpose_storage(&mut self) -> Result<()> {
        self.flatten_storage()?;
        let (w, h) = (self.w0(), self.h0());
        debug!("transposing {}x{} storage", w, h);
        let plan = transpose_plan(w, h);
        let buffer = self.buffer.gather(h, w, &plan)?;
        let mask = self.mask.as_ref().map(|m| m.gather(h, w, &plan)).transpose()?;
        let steps = self.steps.as_ref().map(|m| m.gather(h, w, &plan)).transpose()?;
        let vmap = VisibilityMap::new(h, w)?;
        for aux in self.attached.iter_mut() {
            aux.transpose_storage()?;
        }
        self.buffer = buffer;
        self.mask = mask;
        self.steps = steps;
        self.vmap = vmap;
        self.orientation = self.orientation.flip();
        self.w_start = h;
        self.width = h;
        self.scan_reset();
        Ok(())
    }

    /// Double the first `n` removal seams.  The buffer must not carry
    /// inserted seams yet and `n` seams must have been computed.
    fn inflate(&mut self, n: u32) -> Result<()> {
        debug_assert_eq!(self.offset, 0);
        debug_assert!(n >= 1 && n <= self.levels);
        let (w0, h0) = (self.w0(), self.h0());
        let (w1, size) = (w0 + n, (w0 + n) as usize * h0 as usize);
        debug!("inflating {} seams, {} -> {} columns", n, w0, w1);
        let mut plan = Vec::new();
        let mut values = Vec::new();
        plan.try_reserve_exact(size).map_err(|_| CarverError::OutOfMemory)?;
        values.try_reserve_exact(size).map_err(|_| CarverError::OutOfMemory)?;
        for y in 0..h0 {
            for x in 0..w0 {
                let i = self.buffer.index(x, y);
                let v = self.vmap.value(i);
                if v >= 1 && v <= n {
                    plan.push(match self.interpolation {
                        Interpolation::Average if x > 0 => Source::Blend(i - 1, i),
                        _ => Source::Copy(i),
                    });
                    values.push(n + 1 - v);
                }
                plan.push(Source::Copy(i));
                values.push(cq!(v == 0, 0, v + n));
            }
        }
        debug_assert_eq!(plan.len(), size);
        let buffer = self.buffer.gather(w1, h0, &plan)?;
        let mask = self.mask.as_ref().map(|m| m.gather(w1, h0, &plan)).transpose()?;
        let steps = self.steps.as_ref().map(|m| m.gather(w1, h0, &plan)).transpose()?;
        let vmap = VisibilityMap::from_map(TwoDimensionalMap::from_vec(w1, h0, values)?);
        for aux in self.attached.iter_mut() {
            aux.inflate(n)?;
        }
        self.buffer = buffer;
        self.mask = mask;
        self.steps = steps;
        self.vmap = vmap;
        self.offset = n;
        self.scan_reset();
        Ok(())
    }

    /// Take the inserted seams out again, keeping the removal history.
    fn deflate(&mut self) -> Result<()> {
        if self.offset == 0 {
            return Ok(());
        }
        let (offset, w, h) = (self.offset, self.w_start, self.h0());
        debug!("deflating {} inserted seams", offset);
        let mut plan = Vec::new();
        let mut values = Vec::new();
        let size = w as usize * h as usize;
        plan.try_reserve_exact(size).map_err(|_| CarverError::OutOfMemory)?;
        values.try_reserve_exact(size).map_err(|_| CarverError::OutOfMemory)?;
        for i in 0..self.buffer.pixel_count() {
            let v = self.vmap.value(i);
            if v == 0 || v > offset {
                plan.push(Source::Copy(i));
                values.push(v.saturating_sub(offset));
            }
        }
        debug_assert_eq!(plan.len(), size);
        let buffer = self.buffer.gather(w, h, &plan)?;
        let mask = self.mask.as_ref().map(|m| m.gather(w, h, &plan)).transpose()?;
        let steps = self.steps.as_ref().map(|m| m.gather(w, h, &plan)).transpose()?;
        let vmap = VisibilityMap::from_map(TwoDimensionalMap::from_vec(w, h, values)?);
        for aux in self.attached.iter_mut() {
            aux.deflate()?;
        }
        self.buffer = buffer;
        self.mask = mask;
        self.steps = steps;
        self.vmap = vmap;
        self.offset = 0;
        self.width = self.width.min(w);
        self.scan_reset();
        Ok(())
    }

    /// Back to the reference picture with no seams computed.
    fn discard_history(&mut self) -> Result<()> {
        self.deflate()?;
        self.reset_history();
        Ok(())
    }

    fn reset_history(&mut self) {
        self.vmap.reset();
        self.levels = 0;
        self.width = self.w_start;
        self.scan_reset();
        for aux in self.attached.iter_mut() {
            aux.reset_history();
        }
    }

    // Resizing

    /// Show the picture at `width` x `height`.  Removal seams already
    /// computed are reused; new ones are computed only when the target
    /// goes deeper.  A cancellation request stops the work between two
    /// seams and leaves the carver at the size reported.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<ResizeStatus> {
        if !self.is_active() {
            return Err(CarverError::NotActive);
        }
        if width == 0 || height == 0 {
            return Err(CarverError::InvalidDimension(format!(
                "cannot resize to {}x{}",
                width, height
            )));
        }
        self.check_enlargement(Carve::Width, width)?;
        self.check_enlargement(Carve::Height, height)?;
        info!(
            "resizing {}x{} to {}x{}",
            self.width(),
            self.height(),
            width,
            height
        );
        self.handle.begin();
        let status = self.resize_in_order(width, height);
        self.handle.end();
        self.scan_reset();
        status
    }

    fn length(&self, direction: Carve) -> u32 {
        match direction {
            Carve::Width => self.width(),
            Carve::Height => self.height(),
        }
    }

    fn cancelled(&self) -> ResizeStatus {
        ResizeStatus::Cancelled {
            width: self.width(),
            height: self.height(),
        }
    }

    fn check_enlargement(&self, direction: Carve, target: u32) -> Result<()> {
        let current = self.length(direction);
        if target <= current {
            return Ok(());
        }
        let (reach, reference) = if self.orientation == direction.orientation() {
            (self.w0(), self.w_start)
        } else {
            (current, current)
        };
        if target > reach && reference < 2 {
            return Err(CarverError::InvalidDimension(format!(
                "cannot enlarge a {} of 1 pixel",
                cq!(direction == Carve::Width, "width", "height")
            )));
        }
        Ok(())
    }

    fn resize_in_order(&mut self, width: u32, height: u32) -> Result<ResizeStatus> {
        let target = |d: Carve| cq!(d == Carve::Width, width, height);
        match self.resize_order {
            ResizeOrder::Horizontal | ResizeOrder::Vertical => {
                let first = cq!(self.resize_order == ResizeOrder::Horizontal, Carve::Width, Carve::Height);
                for direction in [first, first.turn()].iter().copied() {
                    if let ResizeStatus::Cancelled { .. } = self.resize_along(direction, target(direction))? {
                        return Ok(self.cancelled());
                    }
                }
            }
            ResizeOrder::Alternate { switch_every } => {
                let mut direction = Carve::Width;
                while self.width() != width || self.height() != height {
                    let (current, goal) = (self.length(direction), target(direction));
                    let step = if goal > current {
                        goal.min(current.saturating_add(switch_every))
                    } else {
                        goal.max(current.saturating_sub(switch_every))
                    };
                    if let ResizeStatus::Cancelled { .. } = self.resize_along(direction, step)? {
                        return Ok(self.cancelled());
                    }
                    direction = direction.turn();
                }
            }
        }
        Ok(ResizeStatus::Complete)
    }

    fn resize_along(&mut self, direction: Carve, target: u32) -> Result<ResizeStatus> {
        if self.length(direction) == target {
            return Ok(ResizeStatus::Complete);
        }
        if self.orientation != direction.orientation() {
            self.transpose_storage()?;
        }
        trace!("{:?} pass to {}", direction, target);
        loop {
            if target <= self.w_start {
                let needed = self.w_start - target;
                if needed > self.levels {
                    self.deflate()?;
                    if !self.build(needed)? {
                        self.set_width(self.w_start - self.levels);
                        return Ok(self.cancelled());
                    }
                }
                self.set_width(target);
                break;
            }
            if target <= self.w0() {
                self.set_width(target);
                break;
            }
            if self.w_start < 2 {
                return Err(CarverError::InvalidDimension(format!(
                    "cannot enlarge a {} of 1 pixel",
                    cq!(direction == Carve::Width, "width", "height")
                )));
            }
            let by_step = ((self.enl_step - 1.0) * self.w_start as f32) as u32;
            let delta_max = by_step.saturating_sub(1).max(1).min(self.w_start - 1);
            let n = (target - self.w_start).min(delta_max);
            self.deflate()?;
            if n > self.levels && !self.build(n)? {
                self.set_width(self.w_start);
                return Ok(self.cancelled());
            }
            self.inflate(n)?;
            if self.w0() >= target {
                self.set_width(target);
                break;
            }
            self.set_width(self.w0());
            self.flatten_storage()?;
        }
        if self.dump_vmaps {
            let snapshot = self.dump_vmap()?;
            self.dumps.push(snapshot);
        }
        Ok(ResizeStatus::Complete)
    }

    /// Extend the map to `levels` removal seams.  Returns false when a
    /// cancellation request stopped it early; everything computed up
    /// to then is kept.
    fn build(&mut self, levels: u32) -> Result<bool> {
        debug_assert_eq!(self.offset, 0);
        debug_assert!(levels < self.w_start);
        if levels <= self.levels {
            return Ok(true);
        }
        let start = self.levels;
        let seams = levels - start;
        debug!("building visibility map from level {} to {}", start, levels);
        self.handle.expect(seams);
        let switch = switch_interval(seams, self.side_switch_frequency);
        let Carver {
            buffer,
            vmap,
            mask,
            steps,
            solver,
            attached,
            energy,
            handle,
            use_cache,
            levels: reached,
            ..
        } = self;
        let solver = solver.as_mut().ok_or(CarverError::NotActive)?;
        let scene = Scene {
            buffer,
            mask: mask.as_ref(),
            steps: steps.as_ref(),
            provider: &**energy,
            use_cache: *use_cache,
        };
        solver.prepare(&scene, vmap, start)?;
        for l in start..levels {
            if handle.take_cancel() {
                debug!("cancelled at level {}", l);
                return Ok(false);
            }
            let seam = solver.find_seam();
            trace!("seam {} starts at buffer index {}", l + 1, seam[0]);
            for &i in seam {
                vmap.mark_removed(i, l + 1);
            }
            for aux in attached.iter_mut() {
                aux.apply_external_seam(seam, l + 1);
            }
            *reached = l + 1;
            handle.advance();
            if l + 1 < levels {
                solver.carve();
                let flip = switch.map_or(false, |n| (l - start + n / 2) % n == 0);
                solver.refresh(&scene, flip);
            }
        }
        Ok(true)
    }

    // Snapshots

    /// The visibility map over the reference picture, in the caller's
    /// layout, with the depth currently shown.
    pub fn dump_vmap(&self) -> Result<VMapSnapshot> {
        let depth = self.w_start.saturating_sub(self.width);
        if self.offset == 0 {
            return Ok(self.vmap.dump(self.orientation, 0, depth));
        }
        let offset = self.offset;
        let plan: Vec<Source> = (0..self.buffer.pixel_count())
            .filter(|i| {
                let v = self.vmap.value(*i);
                v == 0 || v > offset
            })
            .map(Source::Copy)
            .collect();
        let reference = self.vmap.gather(self.w_start, self.h0(), &plan)?;
        Ok(reference.dump(self.orientation, offset, depth))
    }

    /// Snapshots stored after each pass while `dump_vmaps` is on.
    pub fn vmap_dumps(&self) -> &[VMapSnapshot] {
        &self.dumps
    }

    pub fn take_vmap_dumps(&mut self) -> Vec<VMapSnapshot> {
        std::mem::take(&mut self.dumps)
    }

    /// Install a snapshot taken from a carver over the same reference
    /// picture, and show it at the snapshot's depth.  Nothing changes
    /// when the sizes disagree.
    pub fn load_vmap(&mut self, snapshot: &VMapSnapshot) -> Result<()> {
        snapshot.validate()?;
        let reference = (self.ref_width(), self.ref_height());
        let found = (snapshot.width, snapshot.height);
        if reference != found {
            return Err(CarverError::mismatch(reference, found));
        }
        debug!(
            "loading a {}x{} snapshot with {} levels",
            snapshot.width,
            snapshot.height,
            snapshot.levels()
        );
        self.discard_history()?;
        if snapshot.orientation != self.orientation {
            self.transpose_storage()?;
        }
        let levels = self.vmap.load(snapshot)?;
        let vmap = self.vmap.clone();
        self.follow(&vmap, self.w_start, self.w_start - snapshot.depth, levels, 0);
        Ok(())
    }

    // Readout

    /// True when `scan` walks the caller's rows, false when it walks
    /// columns.
    pub fn scan_by_row(&self) -> bool {
        !self.orientation.is_transposed()
    }

    pub fn scan_reset(&mut self) {
        self.scan = Position::default();
        self.scan_row = 0;
    }

    /// The next visible pixel and its (x, y) in the caller's layout.
    /// Returns `None` once at the end, then starts over.
    pub fn scan(&mut self) -> Option<(u32, u32, PixelData<'_>)> {
        let mut cursor = Cursor::resume(&self.vmap, self.width, self.depth(), self.scan);
        if !cursor.next() {
            self.scan = Position::default();
            return None;
        }
        self.scan = cursor.position();
        let (x, y) = self.orientation.to_public((cursor.x(), cursor.y()));
        Some((x, y, self.buffer.pixel(cursor.now())))
    }

    /// The next storage row of visible pixels, with its index.  Rows
    /// are the caller's columns when `scan_by_row` is false.
    pub fn scan_line(&mut self) -> Result<Option<(u32, PixelBuffer)>> {
        if self.scan_row >= self.h0() {
            self.scan_row = 0;
            return Ok(None);
        }
        let y = self.scan_row;
        let depth = self.depth();
        let start = self.buffer.index(0, y);
        let plan: Vec<Source> = (start..start + self.w0() as usize)
            .filter(|i| self.vmap.is_visible(*i, depth))
            .map(Source::Copy)
            .collect();
        let line = self.buffer.gather(self.width, 1, &plan)?;
        self.scan_row += 1;
        Ok(Some((y, line)))
    }

    /// Every visible pixel, in storage order, without touching the scan
    /// position.
    pub fn pixels(&self) -> Pixels<'_> {
        Pixels {
            cursor: Cursor::new(&self.vmap, self.width, self.depth()),
            buffer: &self.buffer,
            orientation: self.orientation,
        }
    }

    fn public_plan(&self) -> Result<(u32, u32, Vec<Source>)> {
        let grid = self.vmap.visible_grid(self.width, self.depth())?;
        let (pw, ph) = (self.width(), self.height());
        let orientation = self.orientation;
        let plan = itertools::iproduct!(0..ph, 0..pw)
            .map(|(y, x)| Source::Copy(grid[orientation.to_storage((x, y))]))
            .collect();
        Ok((pw, ph, plan))
    }

    /// The picture as shown, as a standalone buffer in the caller's
    /// layout.
    pub fn render(&self) -> Result<PixelBuffer> {
        let (pw, ph, plan) = self.public_plan()?;
        self.buffer.gather(pw, ph, &plan)
    }

    /// The energy of every shown pixel, row-major in the caller's
    /// layout, scaled into [0, 1].
    pub fn energy_map(&self) -> Result<Vec<f32>> {
        let grid = self.vmap.visible_grid(self.width, self.depth())?;
        let scene = Scene {
            buffer: &self.buffer,
            mask: self.mask.as_ref(),
            steps: None,
            provider: &*self.energy,
            use_cache: self.use_cache,
        };
        let energies = energy_grid(&scene, &grid, self.w_start as f32)?;
        let top = energies.iter().copied().fold(0.0f32, f32::max);
        let (pw, ph) = (self.width(), self.height());
        let orientation = self.orientation;
        Ok(itertools::iproduct!(0..ph, 0..pw)
            .map(|(y, x)| {
                let (sx, sy) = orientation.to_storage((x, y));
                let e = energies[grid.get_index(sx, sy)];
                cq!(top > 0.0, e / top, 0.0)
            })
            .collect())
    }

    // Rigidity

    fn mask_mut(&mut self) -> Result<&mut RigidityMask> {
        let mask = match self.mask.take() {
            Some(mask) => mask,
            None => RigidityMask::new(self.w0(), self.h0())?,
        };
        Ok(self.mask.get_or_insert(mask))
    }

    pub fn rigidity_clear(&mut self) {
        if let Some(mask) = self.mask.as_mut() {
            mask.clear();
        }
    }

    /// Add `weight` to the bias of buffer pixel (`x`, `y`), in the
    /// caller's layout.
    pub fn rigidity_add_point(&mut self, x: u32, y: u32, weight: f32) -> Result<()> {
        let orientation = self.orientation;
        self.mask_mut()?.add_point(orientation, x, y, weight)
    }

    /// Add a block of weights over the picture as shown.  The carver is
    /// flattened first so that the block lands on what the caller sees.
    pub fn rigidity_add_area(&mut self, weights: &[f32], w: u32, h: u32, x_off: i64, y_off: i64) -> Result<()> {
        self.flatten_storage()?;
        let orientation = self.orientation;
        self.mask_mut()?.add_area(orientation, weights, w, h, x_off, y_off)
    }

    /// Add weights read from an 8-bit picture; see
    /// `RigidityMask::add_rgb_area`.
    #[allow(clippy::too_many_arguments)]
    pub fn rigidity_add_rgb_area(
        &mut self,
        rgb: &[u8],
        channels: u8,
        w: u32,
        h: u32,
        x_off: i64,
        y_off: i64,
        factor: f32,
    ) -> Result<()> {
        self.flatten_storage()?;
        let orientation = self.orientation;
        self.mask_mut()?
            .add_rgb_area(orientation, rgb, channels, w, h, x_off, y_off, factor)
    }

    fn steps_mut(&mut self) -> Result<&mut StepMask> {
        let steps = match self.steps.take() {
            Some(steps) => steps,
            None => StepMask::new(self.w0(), self.h0())?,
        };
        Ok(self.steps.get_or_insert(steps))
    }

    /// Drop every step factor, back to a uniform 1.
    pub fn step_rigidity_clear(&mut self) {
        self.steps = None;
    }

    /// Scale the cost of sideways seam moves into buffer pixel
    /// (`x`, `y`) by `factor`.
    pub fn step_rigidity_set_point(&mut self, x: u32, y: u32, factor: f32) -> Result<()> {
        let orientation = self.orientation;
        self.steps_mut()?.set_point(orientation, x, y, factor)
    }

    /// Set a block of step factors over the picture as shown, after
    /// flattening like `rigidity_add_area`.
    pub fn step_rigidity_set_area(&mut self, factors: &[f32], w: u32, h: u32, x_off: i64, y_off: i64) -> Result<()> {
        self.flatten_storage()?;
        let orientation = self.orientation;
        self.steps_mut()?.set_area(orientation, factors, w, h, x_off, y_off)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn step_rigidity_set_rgb_area(
        &mut self,
        rgb: &[u8],
        channels: u8,
        w: u32,
        h: u32,
        x_off: i64,
        y_off: i64,
        scale: f32,
    ) -> Result<()> {
        self.flatten_storage()?;
        let orientation = self.orientation;
        self.steps_mut()?
            .set_rgb_area(orientation, rgb, channels, w, h, x_off, y_off, scale)
    }
}

/// Borrowing iterator over the visible pixels of a carver, yielding
/// (x, y) in the caller's layout.
pub struct Pixels<'a> {
    cursor: Cursor<'a>,
    buffer: &'a PixelBuffer,
    orientation: Orientation,
}

impl<'a> Iterator for Pixels<'a> {
    type Item = (u32, u32, PixelData<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.cursor.next() {
            return None;
        }
        let (x, y) = self.orientation.to_public((self.cursor.x(), self.cursor.y()));
        Some((x, y, self.buffer.pixel(self.cursor.now())))
    }
}
