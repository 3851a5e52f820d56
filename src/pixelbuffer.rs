// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The raster the carver works on
//!
//! A `PixelBuffer` owns interleaved samples in one of four colour
//! depths.  Everything above this module talks to it through linear
//! pixel indices (`y * width + x`) and normalised channel values, so
//! that the seam machinery never has to care whether the caller handed
//! over bytes or doubles.

use crate::error::{CarverError, Result};
use crate::twodmap::Source;
use num_traits::NumCast;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Storage type of a single channel.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorDepth {
    U8,
    U16,
    F32,
    F64,
}

/// How the channels of a pixel are to be read when computing its
/// brightness.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageType {
    Grey,
    GreyA,
    Rgb,
    Rgba,
    Cmy,
    Cmyk,
    Cmyka,
    /// Set by the explicit alpha/black channel setters.
    Custom,
}

impl ImageType {
    /// The default reading for a channel count.
    pub fn for_channels(channels: u8) -> Option<ImageType> {
        match channels {
            1 => Some(ImageType::Grey),
            2 => Some(ImageType::GreyA),
            3 => Some(ImageType::Rgb),
            4 => Some(ImageType::Rgba),
            5 => Some(ImageType::Cmyka),
            _ => None,
        }
    }

    /// Channel count this type requires; `None` for `Custom`.
    pub fn channels(self) -> Option<u8> {
        match self {
            ImageType::Grey => Some(1),
            ImageType::GreyA => Some(2),
            ImageType::Rgb | ImageType::Cmy => Some(3),
            ImageType::Rgba | ImageType::Cmyk => Some(4),
            ImageType::Cmyka => Some(5),
            ImageType::Custom => None,
        }
    }

    fn alpha_channel(self) -> Option<u8> {
        match self {
            ImageType::GreyA => Some(1),
            ImageType::Rgba => Some(3),
            ImageType::Cmyka => Some(4),
            _ => None,
        }
    }

    fn black_channel(self) -> Option<u8> {
        match self {
            ImageType::Cmyk | ImageType::Cmyka => Some(3),
            _ => None,
        }
    }

    fn subtractive(self) -> bool {
        match self {
            ImageType::Cmy | ImageType::Cmyk | ImageType::Cmyka => true,
            _ => false,
        }
    }
}

/// A channel storage type.
pub trait Sample: Copy + Default + NumCast + PartialOrd + Debug + Send + Sync + 'static {
    const DEPTH: ColorDepth;
    /// The value that normalises to 1.0.
    const MAX: f64;
    const INTEGRAL: bool;

    fn wrap(v: Vec<Self>) -> Samples;

    #[inline]
    fn to_raw(self) -> f64 {
        <f64 as NumCast>::from(self).unwrap_or(0.0)
    }

    #[inline]
    fn from_raw(v: f64) -> Self {
        let v = if Self::INTEGRAL {
            v.round().max(0.0).min(Self::MAX)
        } else {
            v
        };
        NumCast::from(v).unwrap_or_default()
    }

    #[inline]
    fn norm(self) -> f64 {
        self.to_raw() / Self::MAX
    }

    #[inline]
    fn from_norm(v: f64) -> Self {
        Self::from_raw(v * Self::MAX)
    }
}

macro_rules! sample_impl {
    ($t:ty, $variant:ident, $max:expr, $integral:expr) => {
        impl Sample for $t {
            const DEPTH: ColorDepth = ColorDepth::$variant;
            const MAX: f64 = $max;
            const INTEGRAL: bool = $integral;

            fn wrap(v: Vec<Self>) -> Samples {
                Samples::$variant(v)
            }
        }
    };
}

sample_impl!(u8, U8, 255.0, true);
sample_impl!(u16, U16, 65535.0, true);
sample_impl!(f32, F32, 1.0, false);
sample_impl!(f64, F64, 1.0, false);

/// The owned samples, one vector per supported depth.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    U16(Vec<u16>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

// Run the same generic expression against whichever vector is inside.
macro_rules! dispatch {
    ($samples:expr, $v:ident => $body:expr) => {
        match $samples {
            Samples::U8($v) => $body,
            Samples::U16($v) => $body,
            Samples::F32($v) => $body,
            Samples::F64($v) => $body,
        }
    };
}

impl Samples {
    fn len(&self) -> usize {
        dispatch!(self, v => v.len())
    }

    fn depth(&self) -> ColorDepth {
        match self {
            Samples::U8(_) => ColorDepth::U8,
            Samples::U16(_) => ColorDepth::U16,
            Samples::F32(_) => ColorDepth::F32,
            Samples::F64(_) => ColorDepth::F64,
        }
    }
}

/// A borrowed run of samples: one pixel, one row, or a whole buffer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PixelData<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
    F32(&'a [f32]),
    F64(&'a [f64]),
}

impl<'a> PixelData<'a> {
    fn of(samples: &'a Samples, range: std::ops::Range<usize>) -> PixelData<'a> {
        match samples {
            Samples::U8(v) => PixelData::U8(&v[range]),
            Samples::U16(v) => PixelData::U16(&v[range]),
            Samples::F32(v) => PixelData::F32(&v[range]),
            Samples::F64(v) => PixelData::F64(&v[range]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PixelData::U8(s) => s.len(),
            PixelData::U16(s) => s.len(),
            PixelData::F32(s) => s.len(),
            PixelData::F64(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample `i`, normalised to [0, 1] for integral depths.
    pub fn normalized(&self, i: usize) -> f64 {
        match self {
            PixelData::U8(s) => s[i].norm(),
            PixelData::U16(s) => s[i].norm(),
            PixelData::F32(s) => s[i].norm(),
            PixelData::F64(s) => s[i].norm(),
        }
    }

    pub fn to_normalized(&self) -> Vec<f64> {
        (0..self.len()).map(|i| self.normalized(i)).collect()
    }

    pub fn as_u8(&self) -> Option<&'a [u8]> {
        match *self {
            PixelData::U8(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&'a [u16]> {
        match *self {
            PixelData::U16(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&'a [f32]> {
        match *self {
            PixelData::F32(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&'a [f64]> {
        match *self {
            PixelData::F64(s) => Some(s),
            _ => None,
        }
    }
}

/// An interleaved raster.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    samples: Samples,
    width: u32,
    height: u32,
    channels: u8,
    image_type: ImageType,
    alpha_channel: Option<u8>,
    black_channel: Option<u8>,
}

fn check_geometry(width: u32, height: u32, channels: u8, len: usize) -> Result<ImageType> {
    if width == 0 || height == 0 {
        return Err(CarverError::InvalidDimension(format!(
            "image size {}x{} is empty",
            width, height
        )));
    }
    let image_type = ImageType::for_channels(channels).ok_or_else(|| {
        CarverError::InvalidDimension(format!("{} channels are not supported", channels))
    })?;
    let expected = width as usize * height as usize * channels as usize;
    if len != expected {
        return Err(CarverError::InvalidDimension(format!(
            "{} samples supplied for a {}x{}x{} image",
            len, width, height, channels
        )));
    }
    Ok(image_type)
}

impl PixelBuffer {
    /// Take ownership of `data`, a row-major interleaved raster.
    pub fn new<S: Sample>(data: Vec<S>, width: u32, height: u32, channels: u8) -> Result<Self> {
        let image_type = check_geometry(width, height, channels, data.len())?;
        Ok(PixelBuffer {
            samples: S::wrap(data),
            width,
            height,
            channels,
            image_type,
            alpha_channel: image_type.alpha_channel(),
            black_channel: image_type.black_channel(),
        })
    }

    /// Copy `data`, leaving the caller's raster untouched.
    pub fn from_slice<S: Sample>(data: &[S], width: u32, height: u32, channels: u8) -> Result<Self> {
        check_geometry(width, height, channels, data.len())?;
        let mut owned = Vec::new();
        owned
            .try_reserve_exact(data.len())
            .map_err(|_| CarverError::OutOfMemory)?;
        owned.extend_from_slice(data);
        PixelBuffer::new(owned, width, height, channels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn color_depth(&self) -> ColorDepth {
        self.samples.depth()
    }

    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    pub fn alpha_channel(&self) -> Option<u8> {
        self.alpha_channel
    }

    pub fn black_channel(&self) -> Option<u8> {
        self.black_channel
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Reinterpret the channels.  The type has to agree with the
    /// channel count.
    pub fn set_image_type(&mut self, image_type: ImageType) -> Result<()> {
        match image_type.channels() {
            Some(c) if c == self.channels => {
                self.image_type = image_type;
                self.alpha_channel = image_type.alpha_channel();
                self.black_channel = image_type.black_channel();
                Ok(())
            }
            Some(c) => Err(CarverError::InvalidDimension(format!(
                "{:?} needs {} channels, buffer has {}",
                image_type, c, self.channels
            ))),
            None => {
                self.image_type = ImageType::Custom;
                Ok(())
            }
        }
    }

    fn check_channel(&self, channel: Option<u8>) -> Result<()> {
        match channel {
            Some(c) if c >= self.channels => Err(CarverError::InvalidDimension(format!(
                "channel {} out of range for {} channels",
                c, self.channels
            ))),
            _ => Ok(()),
        }
    }

    /// Mark a channel as alpha (or none).  Turns the type custom.
    pub fn set_alpha_channel(&mut self, channel: Option<u8>) -> Result<()> {
        self.check_channel(channel)?;
        self.alpha_channel = channel;
        self.image_type = ImageType::Custom;
        Ok(())
    }

    /// Mark a channel as black (or none).  Turns the type custom.
    pub fn set_black_channel(&mut self, channel: Option<u8>) -> Result<()> {
        self.check_channel(channel)?;
        self.black_channel = channel;
        self.image_type = ImageType::Custom;
        Ok(())
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height, "({}, {}) out of range", x, y);
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    fn span(&self, index: usize) -> std::ops::Range<usize> {
        let c = self.channels as usize;
        index * c..(index + 1) * c
    }

    /// The channels of the pixel at a linear index.
    pub fn pixel(&self, index: usize) -> PixelData<'_> {
        debug_assert!(index < self.pixel_count());
        PixelData::of(&self.samples, self.span(index))
    }

    /// The whole raster.
    pub fn data(&self) -> PixelData<'_> {
        PixelData::of(&self.samples, 0..self.samples.len())
    }

    /// Normalised channel values at (x, y).
    pub fn read_pixel(&self, x: u32, y: u32) -> Vec<f64> {
        self.pixel(self.index(x, y)).to_normalized()
    }

    /// Store normalised channel values at (x, y).  Missing trailing
    /// channels are left alone.
    pub fn write_pixel(&mut self, x: u32, y: u32, values: &[f64]) {
        let span = self.span(self.index(x, y));
        dispatch!(&mut self.samples, v => {
            v[span]
                .iter_mut()
                .zip(values)
                .for_each(|(s, n)| *s = Sample::from_norm(*n));
        })
    }

    #[inline]
    pub(crate) fn channel(&self, index: usize, channel: u8) -> f64 {
        let i = index * self.channels as usize + channel as usize;
        dispatch!(&self.samples, v => v[i].norm())
    }

    /// Perceived brightness in [0, 1]: the mean of the colour channels,
    /// inverted for subtractive inks, darkened by the black channel and
    /// weighted by alpha.
    pub fn brightness(&self, index: usize) -> f32 {
        let (alpha, black) = (self.alpha_channel, self.black_channel);
        let (sum, count) = (0..self.channels)
            .filter(|k| Some(*k) != alpha && Some(*k) != black)
            .fold((0.0, 0u32), |(s, n), k| (s + self.channel(index, k), n + 1));
        let mean = if count == 0 { 1.0 } else { sum / count as f64 };
        let subtractive = self.image_type.subtractive() || black.is_some();
        let mut bright = if subtractive { 1.0 - mean } else { mean };
        if let Some(k) = black {
            bright *= 1.0 - self.channel(index, k);
        }
        if let Some(a) = alpha {
            bright *= self.channel(index, a);
        }
        bright as f32
    }

    /// Rebuild the raster following `plan`; `Blend` cells average their
    /// two sources channel by channel.
    pub(crate) fn gather(&self, width: u32, height: u32, plan: &[Source]) -> Result<PixelBuffer> {
        debug_assert_eq!(plan.len(), width as usize * height as usize);
        let c = self.channels as usize;
        let samples = dispatch!(&self.samples, v => assemble(v, c, plan)?);
        Ok(PixelBuffer {
            samples,
            width,
            height,
            channels: self.channels,
            image_type: self.image_type,
            alpha_channel: self.alpha_channel,
            black_channel: self.black_channel,
        })
    }

    /// Grow (or shrink) the raster to `new_width` x `new_height`,
    /// keeping the existing content in the top-left corner and zeroing
    /// the rest.
    pub fn resize_capacity(&mut self, new_width: u32, new_height: u32) -> Result<()> {
        if new_width == 0 || new_height == 0 {
            return Err(CarverError::InvalidDimension(format!(
                "cannot resize to {}x{}",
                new_width, new_height
            )));
        }
        let plan: Vec<Source> = itertools::iproduct!(0..new_height, 0..new_width)
            .map(|(y, x)| {
                if x < self.width && y < self.height {
                    Source::Copy(self.index(x, y))
                } else {
                    Source::Blank
                }
            })
            .collect();
        *self = self.gather(new_width, new_height, &plan)?;
        Ok(())
    }
}

fn assemble<S: Sample>(src: &[S], channels: usize, plan: &[Source]) -> Result<Samples> {
    let mut out: Vec<S> = Vec::new();
    out.try_reserve_exact(plan.len() * channels)
        .map_err(|_| CarverError::OutOfMemory)?;
    for source in plan {
        match *source {
            Source::Copy(i) => out.extend_from_slice(&src[i * channels..(i + 1) * channels]),
            Source::Blend(a, b) => out.extend((0..channels).map(|k| {
                let (l, r) = (src[a * channels + k], src[b * channels + k]);
                S::from_raw((l.to_raw() + r.to_raw()) / 2.0)
            })),
            Source::Blank => out.extend((0..channels).map(|_| S::default())),
        }
    }
    Ok(S::wrap(out))
}
