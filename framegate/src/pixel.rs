use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::frame::ChannelOrder;

/// 8 bit pixel formats a stream can be configured with.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 8bit monochrome data, 1 pixel 1 byte
    Mono8,
    /// RGB888 color data, 1 pixel 3 bytes
    Rgb8,
    /// BGR888 color data, 1 pixel 3 bytes, blue first
    Bgr8,
    /// RGB888 color data with alpha, 1 pixel 4 bytes
    Rgba8,
    /// BGR888 color data with alpha, 1 pixel 4 bytes, blue first
    Bgra8,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 5] = [
        PixelFormat::Mono8,
        PixelFormat::Rgb8,
        PixelFormat::Bgr8,
        PixelFormat::Rgba8,
        PixelFormat::Bgra8,
    ];

    /// Number of 8 bit samples per pixel
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Mono8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }

    pub fn channel_order(self) -> ChannelOrder {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Bgra8 => ChannelOrder::Bgr,
            _ => ChannelOrder::Rgb,
        }
    }

    /// Entry name of the `PixelFormat` enumeration node
    pub fn node_name(self) -> &'static str {
        match self {
            PixelFormat::Mono8 => "Mono8",
            PixelFormat::Rgb8 => "RGB8",
            PixelFormat::Bgr8 => "BGR8",
            PixelFormat::Rgba8 => "RGBa8",
            PixelFormat::Bgra8 => "BGRa8",
        }
    }

    pub fn from_node_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.node_name() == name)
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.node_name())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.node_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|format| format.node_name()).collect();
                format!("unknown pixel format {s:?}, expected one of {}", names.join(", "))
            })
    }
}
