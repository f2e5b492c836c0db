use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::{ChannelOrder, Error, MaterializedImage, Result};

/// Whether the stream should keep going after a frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Per-frame information handed to sinks along with the image.
#[derive(Debug, Clone)]
pub struct FrameStats {
    /// index among the delivered frames, starting at 0
    pub index: u64,
    /// instantaneous frame rate, from the previous delivered frame
    pub fps: f64,
    pub captured_at: DateTime<Local>,
}

impl FrameStats {
    /// Frame rate annotation, e.g. `FPS: 1.20`
    pub fn fps_label(&self) -> String {
        format!("FPS: {:.2}", self.fps)
    }
}

/// Receives every materialized frame.
pub trait FrameSink {
    fn consume(&mut self, image: &MaterializedImage, stats: &FrameStats) -> Result<Flow>;
}

/// Sink calling a closure, see [`from_fn`].
pub struct FnSink<F>(F);

/// Turns a closure into a [`FrameSink`].
pub fn from_fn<F>(f: F) -> FnSink<F>
where
    F: FnMut(&MaterializedImage, &FrameStats) -> Result<Flow>,
{
    FnSink(f)
}

impl<F> FrameSink for FnSink<F>
where
    F: FnMut(&MaterializedImage, &FrameStats) -> Result<Flow>,
{
    fn consume(&mut self, image: &MaterializedImage, stats: &FrameStats) -> Result<Flow> {
        (self.0)(image, stats)
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn consume(&mut self, image: &MaterializedImage, stats: &FrameStats) -> Result<Flow> {
        (**self).consume(image, stats)
    }
}

impl<S: FrameSink> FrameSink for Option<S> {
    fn consume(&mut self, image: &MaterializedImage, stats: &FrameStats) -> Result<Flow> {
        match self {
            Some(sink) => sink.consume(image, stats),
            None => Ok(Flow::Continue),
        }
    }
}

/// Feeds both sinks, stops if either asks to.
impl<A: FrameSink, B: FrameSink> FrameSink for (A, B) {
    fn consume(&mut self, image: &MaterializedImage, stats: &FrameStats) -> Result<Flow> {
        let first = self.0.consume(image, stats)?;
        let second = self.1.consume(image, stats)?;
        if first == Flow::Stop || second == Flow::Stop {
            Ok(Flow::Stop)
        } else {
            Ok(Flow::Continue)
        }
    }
}

fn file_stem(prefix: &str, stats: &FrameStats) -> String {
    format!(
        "{prefix}_{}_{:05}",
        stats.captured_at.format("%Y%m%d_%H%M%S"),
        stats.index
    )
}

/// Saves every frame as `<prefix>_<YYYYmmdd_HHMMSS>_<index>.png` in a directory.
#[derive(Debug)]
pub struct PngSink {
    dir: PathBuf,
    prefix: String,
    order: ChannelOrder,
    written: u64,
}

impl PngSink {
    /// Creates `dir` if it does not exist yet.
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            order: ChannelOrder::Rgb,
            written: 0,
        })
    }

    /// Channel order of the incoming frames, BGR frames are swapped to RGB on write.
    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.order = order;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stats: &FrameStats) -> PathBuf {
        self.dir.join(format!("{}.png", file_stem(&self.prefix, stats)))
    }

    /// Number of files written so far
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FrameSink for PngSink {
    fn consume(&mut self, image: &MaterializedImage, stats: &FrameStats) -> Result<Flow> {
        let path = self.path_for(stats);
        image
            .save_png(&path, self.order)
            .map_err(|err| write_failed(&path, err))?;
        self.written += 1;
        log::debug!("saved {} ({})", path.display(), stats.fps_label());
        Ok(Flow::Continue)
    }
}

/// Saves each channel of every frame as its own grayscale PNG, suffixed with the channel
/// name (`R`, `G`, `B`, `A`, or `L` for monochrome).
#[derive(Debug)]
pub struct SplitChannelSink {
    dir: PathBuf,
    prefix: String,
    order: ChannelOrder,
}

impl SplitChannelSink {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            order: ChannelOrder::Rgb,
        })
    }

    pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
        self.order = order;
        self
    }

    fn channel_names(&self, channels: usize) -> &'static [&'static str] {
        match (channels, self.order) {
            (1, _) => &["L"],
            (2, _) => &["L", "A"],
            (3, ChannelOrder::Rgb) => &["R", "G", "B"],
            (3, ChannelOrder::Bgr) => &["B", "G", "R"],
            (_, ChannelOrder::Rgb) => &["R", "G", "B", "A"],
            (_, ChannelOrder::Bgr) => &["B", "G", "R", "A"],
        }
    }
}

impl FrameSink for SplitChannelSink {
    fn consume(&mut self, image: &MaterializedImage, stats: &FrameStats) -> Result<Flow> {
        let stem = file_stem(&self.prefix, stats);
        let names = self.channel_names(image.channels());
        for (channel, name) in image.split_channels().into_iter().zip(names) {
            let path = self.dir.join(format!("{stem}_{name}.png"));
            channel
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(|err| write_failed(&path, err.into()))?;
        }
        Ok(Flow::Continue)
    }
}

/// Encoding and file errors become [`Error::Sink`] naming the file, frame errors pass through.
fn write_failed(path: &Path, err: Error) -> Error {
    match err {
        Error::Image(_) | Error::Io(_) => {
            Error::Sink(format!("failed to write {}: {err}", path.display()))
        }
        other => other,
    }
}

/// Logs the shape and frame rate of every frame.
#[derive(Debug, Default)]
pub struct LogSink;

impl FrameSink for LogSink {
    fn consume(&mut self, image: &MaterializedImage, stats: &FrameStats) -> Result<Flow> {
        let (height, width, channels) = image.shape();
        log::info!(
            "frame {}: {width}x{height}x{channels} {}",
            stats.index,
            stats.fps_label()
        );
        Ok(Flow::Continue)
    }
}
