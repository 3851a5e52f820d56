// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Moving pictures between the `image` crate and `PixelBuffer`.

use crate::error::{CarverError, Result};
use crate::pixelbuffer::{PixelBuffer, PixelData};
use image::{DynamicImage, GenericImageView, GrayImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};

/// Copy a decoded picture into a buffer with the same depth and
/// channels.  Layouts the carver has no depth for are widened to 8-bit
/// RGBA.
pub fn from_dynamic(image: &DynamicImage) -> Result<PixelBuffer> {
    let (w, h) = image.dimensions();
    match image {
        DynamicImage::ImageLuma8(b) => PixelBuffer::from_slice(b.as_raw(), w, h, 1),
        DynamicImage::ImageLumaA8(b) => PixelBuffer::from_slice(b.as_raw(), w, h, 2),
        DynamicImage::ImageRgb8(b) => PixelBuffer::from_slice(b.as_raw(), w, h, 3),
        DynamicImage::ImageRgba8(b) => PixelBuffer::from_slice(b.as_raw(), w, h, 4),
        DynamicImage::ImageLuma16(b) => PixelBuffer::from_slice(b.as_raw(), w, h, 1),
        DynamicImage::ImageLumaA16(b) => PixelBuffer::from_slice(b.as_raw(), w, h, 2),
        DynamicImage::ImageRgb16(b) => PixelBuffer::from_slice(b.as_raw(), w, h, 3),
        DynamicImage::ImageRgba16(b) => PixelBuffer::from_slice(b.as_raw(), w, h, 4),
        DynamicImage::ImageRgb32F(b) => PixelBuffer::from_slice(b.as_raw(), w, h, 3),
        DynamicImage::ImageRgba32F(b) => PixelBuffer::from_slice(b.as_raw(), w, h, 4),
        other => PixelBuffer::new(other.to_rgba8().into_raw(), w, h, 4),
    }
}

fn wrap<P>(width: u32, height: u32, data: Vec<P::Subpixel>) -> Result<ImageBuffer<P, Vec<P::Subpixel>>>
where
    P: image::Pixel + 'static,
{
    ImageBuffer::from_raw(width, height, data).ok_or_else(|| {
        CarverError::InvalidDimension(format!("sample count does not fit {}x{}", width, height))
    })
}

/// Build a picture for the encoders.  Float buffers come out as 32-bit
/// float RGB(A) when they have colour and as 16-bit grey otherwise.
pub fn to_dynamic(buffer: &PixelBuffer) -> Result<DynamicImage> {
    let (w, h) = (buffer.width(), buffer.height());
    let unsupported = || {
        CarverError::Unsupported(format!(
            "{} channels of {:?} cannot be encoded",
            buffer.channels(),
            buffer.color_depth()
        ))
    };
    let image = match (buffer.data(), buffer.channels()) {
        (PixelData::U8(v), 1) => DynamicImage::ImageLuma8(wrap::<Luma<u8>>(w, h, v.to_vec())?),
        (PixelData::U8(v), 2) => DynamicImage::ImageLumaA8(wrap::<LumaA<u8>>(w, h, v.to_vec())?),
        (PixelData::U8(v), 3) => DynamicImage::ImageRgb8(wrap::<Rgb<u8>>(w, h, v.to_vec())?),
        (PixelData::U8(v), 4) => DynamicImage::ImageRgba8(wrap::<Rgba<u8>>(w, h, v.to_vec())?),
        (PixelData::U16(v), 1) => DynamicImage::ImageLuma16(wrap::<Luma<u16>>(w, h, v.to_vec())?),
        (PixelData::U16(v), 2) => DynamicImage::ImageLumaA16(wrap::<LumaA<u16>>(w, h, v.to_vec())?),
        (PixelData::U16(v), 3) => DynamicImage::ImageRgb16(wrap::<Rgb<u16>>(w, h, v.to_vec())?),
        (PixelData::U16(v), 4) => DynamicImage::ImageRgba16(wrap::<Rgba<u16>>(w, h, v.to_vec())?),
        (data, c @ 3..=4) => {
            let v: Vec<f32> = data.to_normalized().into_iter().map(|s| s as f32).collect();
            cq!(
                c == 3,
                DynamicImage::ImageRgb32F(wrap::<Rgb<f32>>(w, h, v)?),
                DynamicImage::ImageRgba32F(wrap::<Rgba<f32>>(w, h, v)?)
            )
        }
        (data, c @ 1..=2) => {
            let v: Vec<u16> = data
                .to_normalized()
                .into_iter()
                .map(|s| (s.max(0.0).min(1.0) * 65535.0).round() as u16)
                .collect();
            cq!(
                c == 1,
                DynamicImage::ImageLuma16(wrap::<Luma<u16>>(w, h, v)?),
                DynamicImage::ImageLumaA16(wrap::<LumaA<u16>>(w, h, v)?)
            )
        }
        _ => return Err(unsupported()),
    };
    Ok(image)
}

/// A grey picture of energies in [0, 1], row-major.
pub fn energy_image(width: u32, height: u32, energies: &[f32]) -> Result<DynamicImage> {
    let grey = energies
        .iter()
        .map(|e| (e.max(0.0).min(1.0) * 255.0).round() as u8)
        .collect();
    let image: GrayImage = wrap::<Luma<u8>>(width, height, grey)?;
    Ok(DynamicImage::ImageLuma8(image))
}
