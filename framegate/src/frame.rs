use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat};

use crate::{FrameError, Result};

/// Order of the color samples inside a 3 or 4 channel pixel.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

/// Owned 8 bit image of shape `(height, width, channels)`, stored row major.
///
/// It never shares memory with the stream buffer it was copied from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: usize,
}

impl MaterializedImage {
    /// Fails if `data` is not exactly `width * height * channels` bytes.
    pub fn from_vec(data: Vec<u8>, width: u32, height: u32, channels: usize) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(channels));
        if channels == 0 || expected != Some(data.len()) || data.is_empty() {
            return Err(FrameError::MalformedBuffer {
                byte_length: data.len(),
                width,
                height,
            }
            .into());
        }
        Ok(Self::from_parts(data, width, height, channels))
    }

    pub(crate) fn from_parts(data: Vec<u8>, width: u32, height: u32, channels: usize) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * channels);
        Self {
            data,
            width,
            height,
            channels,
        }
    }

    /// `(height, width, channels)`
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height as usize, self.width as usize, self.channels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Samples of the pixel at column `x`, row `y`
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * self.channels;
        self.data.get(start..start + self.channels)
    }

    /// Extracts one channel as a grayscale image.
    pub fn channel(&self, index: usize) -> Option<GrayImage> {
        if index >= self.channels {
            return None;
        }
        let samples = self
            .data
            .iter()
            .skip(index)
            .step_by(self.channels)
            .copied()
            .collect();
        GrayImage::from_raw(self.width, self.height, samples)
    }

    /// One grayscale image per channel, in storage order.
    pub fn split_channels(&self) -> Vec<GrayImage> {
        (0..self.channels).filter_map(|index| self.channel(index)).collect()
    }

    /// Converts to an `image` buffer, swapping blue and red first when `order` is
    /// [`ChannelOrder::Bgr`] so the result is always RGB.
    pub fn to_dynamic_image(&self, order: ChannelOrder) -> Result<DynamicImage> {
        let mut data = self.data.clone();
        if order == ChannelOrder::Bgr && self.channels >= 3 {
            for pixel in data.chunks_exact_mut(self.channels) {
                pixel.swap(0, 2);
            }
        }

        let (w, h) = (self.width, self.height);
        let image = match self.channels {
            1 => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageLuma8),
            2 => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageLumaA8),
            3 => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageRgb8),
            4 => ImageBuffer::from_raw(w, h, data).map(DynamicImage::ImageRgba8),
            channels => return Err(FrameError::UnsupportedChannels { channels }.into()),
        };
        // from_raw only fails on a length mismatch, which the constructors rule out
        image.ok_or_else(|| {
            FrameError::MalformedBuffer {
                byte_length: self.data.len(),
                width: w,
                height: h,
            }
            .into()
        })
    }

    /// Writes a lossless PNG.
    pub fn save_png(&self, path: impl AsRef<Path>, order: ChannelOrder) -> Result<()> {
        self.to_dynamic_image(order)?
            .save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }

    /// Reads an image file back. Color images come back in `order`.
    pub fn open(path: impl AsRef<Path>, order: ChannelOrder) -> Result<Self> {
        let image = image::open(path)?;
        let (width, height) = (image.width(), image.height());
        let (mut data, channels) = match image {
            DynamicImage::ImageLuma8(buffer) => (buffer.into_raw(), 1),
            DynamicImage::ImageLumaA8(buffer) => (buffer.into_raw(), 2),
            DynamicImage::ImageRgba8(buffer) => (buffer.into_raw(), 4),
            other => (other.into_rgb8().into_raw(), 3),
        };
        if order == ChannelOrder::Bgr && channels >= 3 {
            for pixel in data.chunks_exact_mut(channels) {
                pixel.swap(0, 2);
            }
        }
        Self::from_vec(data, width, height, channels)
    }
}
