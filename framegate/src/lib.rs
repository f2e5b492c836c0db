//! Camera acquisition plumbing.
//!
//! - [`acquire_device`] waits for a device provider to report a camera, with a bounded number
//!   of attempts.
//! - [`CaptureSettings`] configures the camera through typed nodes, checked against the
//!   bounds the device reports.
//! - [`Stream`] owns a streaming session and turns every raw buffer into an owned
//!   [`MaterializedImage`] before the buffer goes back to the pool.
//!
//! The [`virtual_camera`] module provides an in-process device implementing every trait, so
//! the whole pipeline can run without hardware.

pub use acquire::{acquire_device, acquire_devices, AcquireEvent, RetryBudget};
pub use device::{Device, DeviceInfo, DeviceProvider};
pub use frame::{ChannelOrder, MaterializedImage};
pub use nodes::{Node, NodeAttribute, NodeKind, NodeMap, NodeSnapshot, NodeValue};
pub use pixel::PixelFormat;
pub use raw::{materialize, RawBufferDescriptor};
pub use settings::{AppliedSettings, BufferHandling, CaptureSettings, Exposure, PacketSize, SensorMode};
pub use sink::{from_fn, FnSink, Flow, FrameSink, FrameStats, LogSink, PngSink, SplitChannelSink};
pub use stream::{open_stream, run_stream, Stream, StreamOptions, StreamSession, StreamSummary};

mod acquire;
mod device;
mod frame;
mod nodes;
mod pixel;
mod raw;
mod settings;
mod sink;
mod stream;
pub mod virtual_camera;

pub type Result<T> = std::result::Result<T, Error>;

/// Problems with a single frame. The stream itself is still usable, the caller decides
/// whether to skip the frame or give up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("malformed buffer: {byte_length} bytes cannot be shaped into {width}x{height} pixels")]
    MalformedBuffer {
        byte_length: usize,
        width: u32,
        height: u32,
    },
    #[error("buffer address is null")]
    NullAddress,
    #[error("frame has {actual} channels but pixel format {format} has {expected}")]
    ChannelMismatch {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },
    #[error("images with {channels} channels cannot be encoded")]
    UnsupportedChannels { channels: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no device found after {attempts} attempts, connect a device and try again")]
    DeviceNotFound { attempts: u32 },
    #[error("cannot configure {node}: {reason}")]
    Configuration { node: Node, reason: String },
    #[error("{value} is out of bounds for {node} (min {min}, max {max})")]
    OutOfBounds {
        node: Node,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("{count} consecutive frames failed, last error: {last}")]
    TooManyFrameFailures { count: u32, last: FrameError },
    #[error("all {pool_size} stream buffers are in use")]
    BufferPoolExhausted { pool_size: usize },
    #[error("timed out waiting for a buffer")]
    Timeout,
    #[error("stream error: {0}")]
    Stream(String),
    /// Returned by [`FrameSink`] implementations, including user sinks, when a frame cannot
    /// be written out.
    #[error("sink error: {0}")]
    Sink(String),
    #[error("could not restore {} ({restored} node(s) restored)", node_list(.failed))]
    RestoreIncomplete { restored: usize, failed: Vec<Node> },
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn node_list(nodes: &[Node]) -> String {
    nodes
        .iter()
        .map(Node::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    pub(crate) fn configuration(node: Node, reason: impl Into<String>) -> Self {
        Error::Configuration {
            node,
            reason: reason.into(),
        }
    }

    /// Only per-frame errors are recoverable, everything else should end the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Frame(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_frame_errors_are_recoverable() {
        assert!(Error::from(FrameError::NullAddress).is_recoverable());
        assert!(!Error::DeviceNotFound { attempts: 6 }.is_recoverable());
        assert!(!Error::Timeout.is_recoverable());
        assert!(!Error::TooManyFrameFailures {
            count: 3,
            last: FrameError::NullAddress
        }
        .is_recoverable());
    }

    #[test]
    fn device_not_found_mentions_attempts() {
        let message = Error::DeviceNotFound { attempts: 6 }.to_string();
        assert!(message.contains("6 attempts"), "{message}");
    }

    #[test]
    fn restore_error_lists_failed_nodes() {
        let message = Error::RestoreIncomplete {
            restored: 4,
            failed: vec![Node::Width, Node::Height],
        }
        .to_string();
        assert_eq!(message, "could not restore Width, Height (4 node(s) restored)");
    }
}
