//! The one place raw stream memory is read.
//!
//! A [`RawBufferDescriptor`] borrows the buffer it describes, so it cannot outlive the window
//! between "buffer acquired" and "buffer requeued". [`materialize`] copies the bytes out, and
//! only the copy survives the requeue.

use std::marker::PhantomData;

use crate::{FrameError, MaterializedImage};

/// Transient description of one captured frame: address, byte length and pixel size.
#[derive(Debug, Clone, Copy)]
pub struct RawBufferDescriptor<'buf> {
    address: *const u8,
    byte_length: usize,
    width: u32,
    height: u32,
    _buffer: PhantomData<&'buf [u8]>,
}

impl<'buf> RawBufferDescriptor<'buf> {
    pub fn from_slice(data: &'buf [u8], width: u32, height: u32) -> Self {
        Self {
            address: data.as_ptr(),
            byte_length: data.len(),
            width,
            height,
            _buffer: PhantomData,
        }
    }

    /// Describes memory handed out by a foreign streaming session.
    ///
    /// # Safety
    ///
    /// `address` is either null or points to `byte_length` initialized bytes that stay valid
    /// and are not written to for the whole of `'buf`.
    pub unsafe fn from_raw_parts(
        address: *const u8,
        byte_length: usize,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            address,
            byte_length,
            width,
            height,
            _buffer: PhantomData,
        }
    }

    pub fn address(&self) -> *const u8 {
        self.address
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Samples per pixel, `byte_length / (width * height)`.
    ///
    /// Fails when any dimension is zero or the byte length is not a multiple of the pixel
    /// count, which means the buffer does not match the configured format or size.
    pub fn channels(&self) -> Result<usize, FrameError> {
        let malformed = FrameError::MalformedBuffer {
            byte_length: self.byte_length,
            width: self.width,
            height: self.height,
        };
        let pixels = (self.width as usize)
            .checked_mul(self.height as usize)
            .filter(|&pixels| pixels > 0)
            .ok_or_else(|| malformed.clone())?;

        if self.byte_length == 0 || self.byte_length % pixels != 0 {
            return Err(malformed);
        }
        Ok(self.byte_length / pixels)
    }
}

/// Copies the described buffer into an owned `(height, width, channels)` image.
///
/// Validation happens before any byte is read. The result never aliases the buffer, so the
/// buffer may be requeued as soon as this returns.
pub fn materialize(descriptor: &RawBufferDescriptor<'_>) -> Result<MaterializedImage, FrameError> {
    let empty = descriptor.width == 0 || descriptor.height == 0 || descriptor.byte_length == 0;
    if !empty && descriptor.address.is_null() {
        return Err(FrameError::NullAddress);
    }
    let channels = descriptor.channels()?;

    let data = copy_out(descriptor);
    Ok(MaterializedImage::from_parts(
        data,
        descriptor.width,
        descriptor.height,
        channels,
    ))
}

fn copy_out(descriptor: &RawBufferDescriptor<'_>) -> Vec<u8> {
    // SAFETY: the address is non-null (checked by the caller) and both constructors guarantee
    // `byte_length` readable bytes for the descriptor's lifetime.
    let bytes = unsafe { std::slice::from_raw_parts(descriptor.address, descriptor.byte_length) };
    bytes.to_vec()
}
