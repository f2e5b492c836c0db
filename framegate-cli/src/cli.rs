use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use framegate::{Exposure, PixelFormat};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Wait for a camera, configure it and save every streamed frame as PNG"
)]
pub struct Args {
    /// TOML file with [capture], [stream], [acquire] and [output] tables. Flags override it.
    #[arg(long, env = "FRAMEGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Sensor readout mode.
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Crop width in pixels.
    #[arg(long)]
    pub width: Option<u32>,

    /// Crop height in pixels.
    #[arg(long)]
    pub height: Option<u32>,

    /// Binning factor.
    #[arg(long)]
    pub binning: Option<u32>,

    /// Pixel format: mono8, rgb8, bgr8, rgba8 or bgra8.
    #[arg(long)]
    pub pixel_format: Option<PixelFormat>,

    /// Frame rate limit in frames per second.
    #[arg(long)]
    pub fps: Option<f64>,

    /// Exposure: auto, max, or a time in microseconds.
    #[arg(long)]
    pub exposure: Option<Exposure>,

    /// Frames to grab, 0 to stream until Ctrl-C.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Number of buffers in the stream pool.
    #[arg(long)]
    pub buffers: Option<usize>,

    /// Milliseconds to wait for each buffer.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Directory the frames are saved to.
    #[arg(long, env = "FRAMEGATE_OUTPUT")]
    pub output: Option<PathBuf>,

    /// File name prefix of saved frames.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Also save every channel as its own grayscale image.
    #[arg(long)]
    pub split_channels: bool,

    /// Device discovery attempts before giving up.
    #[arg(long)]
    pub tries: Option<u32>,

    /// Seconds to wait between discovery attempts.
    #[arg(long)]
    pub wait_secs: Option<u64>,

    /// Give up after this many failed frames in a row.
    #[arg(long)]
    pub max_consecutive_failures: Option<u32>,

    /// Discovery attempts the virtual camera stays disconnected for.
    #[arg(long, default_value = "0")]
    pub virtual_appear_after: u32,

    /// Make every n-th virtual frame malformed.
    #[arg(long)]
    pub virtual_corrupt_every: Option<u32>,

    /// Pace virtual frames at the configured frame rate.
    #[arg(long)]
    pub virtual_realtime: bool,
}

#[derive(ValueEnum, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModeArg {
    Crop,
    Binning,
    Original,
}
