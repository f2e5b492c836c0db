use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Local;
use serde::Deserialize;

use crate::{
    materialize, Device, Error, Flow, FrameError, FrameSink, FrameStats, MaterializedImage,
    PixelFormat, RawBufferDescriptor, Result,
};

/// A running stream on a device, handing out buffers from a fixed pool.
pub trait StreamSession {
    type Buffer;

    /// Waits for the next filled buffer. `None` blocks until one is available.
    fn get_buffer(&mut self, timeout: Option<Duration>) -> Result<Self::Buffer>;

    /// Describes the memory of a buffer obtained from [`get_buffer`](Self::get_buffer).
    fn describe<'b>(&'b self, buffer: &'b Self::Buffer) -> RawBufferDescriptor<'b>;

    /// Gives the buffer back to the pool. Its memory may be reused right away.
    fn requeue_buffer(&mut self, buffer: Self::Buffer) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
}

/// Owns a [`StreamSession`] and stops it when dropped, unless [`stop`](Self::stop) was called.
pub struct Stream<S: StreamSession> {
    session: S,
    stopped: bool,
}

/// Starts streaming on `device` with `buffer_pool` buffers.
pub fn open_stream<D: Device>(device: &mut D, buffer_pool: usize) -> Result<Stream<D::Session<'_>>> {
    if buffer_pool == 0 {
        return Err(Error::InvalidArgument(
            "the buffer pool needs at least one buffer".to_string(),
        ));
    }
    let session = device.start_stream(buffer_pool)?;
    Ok(Stream::new(session))
}

impl<S: StreamSession> Stream<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            stopped: false,
        }
    }

    /// Gets one buffer, copies it into an owned image and requeues it.
    ///
    /// The buffer is requeued exactly once, after the copy, whether or not the copy
    /// succeeded. A [`FrameError`] comes back as [`Error::Frame`] and leaves the stream
    /// usable.
    pub fn grab(&mut self, timeout: Option<Duration>) -> Result<MaterializedImage> {
        let buffer = self.session.get_buffer(timeout)?;
        let materialized = materialize(&self.session.describe(&buffer));
        self.session.requeue_buffer(buffer)?;
        Ok(materialized?)
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    /// Stops the stream and reports any error. Dropping the stream also stops it, but
    /// ignores errors.
    pub fn stop(mut self) -> Result<()> {
        self.stopped = true;
        self.session.stop()
    }
}

impl<S: StreamSession> Drop for Stream<S> {
    fn drop(&mut self) {
        if !self.stopped {
            // error can be handled by calling stop() manually
            if let Err(err) = self.session.stop() {
                log::warn!("failed to stop stream: {err}");
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// number of buffers in the stream's pool
    pub buffer_pool: usize,
    /// frames to grab before stopping, `None` to run until stopped
    pub max_frames: Option<u64>,
    /// how long to wait for a buffer, `None` blocks
    pub timeout_ms: Option<u64>,
    /// give up after this many failed frames in a row, `None` never gives up
    pub max_consecutive_failures: Option<u32>,
    /// reject frames whose channel count does not match this format
    pub expected_format: Option<PixelFormat>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffer_pool: 100,
            max_frames: Some(2000),
            timeout_ms: None,
            max_consecutive_failures: Some(10),
            expected_format: None,
        }
    }
}

impl StreamOptions {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSummary {
    /// frames handed to the sink
    pub delivered: u64,
    /// frames dropped because of a [`FrameError`]
    pub skipped: u64,
    pub elapsed: Duration,
}

impl StreamSummary {
    pub fn mean_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.delivered as f64 / secs
        } else {
            0.0
        }
    }
}

/// Streams frames from `device` into `sink`.
///
/// Runs until `options.max_frames` frames were grabbed, the sink returns [`Flow::Stop`] or
/// `stop` is raised. Frame errors are logged and skipped, and become fatal after
/// `options.max_consecutive_failures` in a row. The stream is stopped on every exit path.
pub fn run_stream<D, S>(
    device: &mut D,
    options: &StreamOptions,
    sink: &mut S,
    stop: &AtomicBool,
) -> Result<StreamSummary>
where
    D: Device,
    S: FrameSink + ?Sized,
{
    let mut stream = open_stream(device, options.buffer_pool)?;
    let started = Instant::now();
    let mut last_frame = started;
    let mut grabbed = 0u64;
    let mut delivered = 0u64;
    let mut skipped = 0u64;
    let mut consecutive_failures = 0u32;

    while options.max_frames.map_or(true, |max| grabbed < max) {
        if stop.load(Ordering::Relaxed) {
            log::info!("stop requested, ending stream");
            break;
        }

        let result = stream
            .grab(options.timeout())
            .and_then(|image| check_format(image, options.expected_format));
        grabbed += 1;

        match result {
            Ok(image) => {
                consecutive_failures = 0;
                let now = Instant::now();
                let stats = FrameStats {
                    index: delivered,
                    fps: fps_since(last_frame, now),
                    captured_at: Local::now(),
                };
                last_frame = now;
                delivered += 1;

                log::debug!("frame {} {:?} {}", stats.index, image.shape(), stats.fps_label());
                if sink.consume(&image, &stats)? == Flow::Stop {
                    log::info!("sink asked to stop");
                    break;
                }
            }
            Err(Error::Frame(err)) => {
                skipped += 1;
                consecutive_failures += 1;
                log::warn!("skipping frame: {err}");
                if let Some(limit) = options.max_consecutive_failures {
                    if consecutive_failures >= limit {
                        return Err(Error::TooManyFrameFailures {
                            count: consecutive_failures,
                            last: err,
                        });
                    }
                }
            }
            Err(err) => return Err(err),
        }
    }

    stream.stop()?;
    let summary = StreamSummary {
        delivered,
        skipped,
        elapsed: started.elapsed(),
    };
    log::info!(
        "stream finished: {} frames delivered, {} skipped, {:.2} fps",
        summary.delivered,
        summary.skipped,
        summary.mean_fps()
    );
    Ok(summary)
}

fn check_format(image: MaterializedImage, expected: Option<PixelFormat>) -> Result<MaterializedImage> {
    match expected {
        Some(format) if format.channels() != image.channels() => Err(FrameError::ChannelMismatch {
            format,
            expected: format.channels(),
            actual: image.channels(),
        }
        .into()),
        _ => Ok(image),
    }
}

fn fps_since(previous: Instant, now: Instant) -> f64 {
    let secs = now.duration_since(previous).as_secs_f64();
    if secs > 0.0 {
        1.0 / secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_camera::{test_pattern, VirtualCamera, VirtualCameraConfig};
    use crate::{from_fn, Node, NodeMap, NodeValue};

    fn small_camera(config: VirtualCameraConfig) -> VirtualCamera {
        let mut camera = VirtualCamera::new(config, 0);
        let nodes = camera.node_map();
        nodes.write_checked(Node::Width, NodeValue::Integer(8)).unwrap();
        nodes.write_checked(Node::Height, NodeValue::Integer(6)).unwrap();
        nodes.write_checked(Node::PixelFormat, "RGB8".into()).unwrap();
        camera
    }

    #[test]
    fn grab_copies_before_requeue() {
        let mut camera = small_camera(VirtualCameraConfig::default());
        {
            let mut stream = open_stream(&mut camera, 2).unwrap();
            let first = stream.grab(None).unwrap();
            let second = stream.grab(None).unwrap();

            assert_eq!(first.shape(), (6, 8, 3));
            assert_eq!(first.as_bytes(), &test_pattern(8, 6, 3, 0)[..]);
            assert_eq!(second.as_bytes(), &test_pattern(8, 6, 3, 1)[..]);
            stream.stop().unwrap();
        }

        let counters = camera.counters();
        assert_eq!(counters.buffers_delivered, 2);
        assert_eq!(counters.buffers_requeued, 2);
        assert_eq!(counters.streams_stopped, 1);
    }

    #[test]
    fn malformed_buffer_is_still_requeued() {
        let mut camera = small_camera(VirtualCameraConfig {
            corrupt_every: Some(1),
            ..VirtualCameraConfig::default()
        });
        {
            let mut stream = open_stream(&mut camera, 1).unwrap();
            for _ in 0..3 {
                let err = stream.grab(None).unwrap_err();
                assert!(matches!(err, Error::Frame(FrameError::MalformedBuffer { .. })));
            }
        }

        let counters = camera.counters();
        assert_eq!(counters.buffers_delivered, 3);
        assert_eq!(counters.buffers_requeued, 3);
    }

    #[test]
    fn dropping_the_stream_stops_it() {
        let mut camera = small_camera(VirtualCameraConfig::default());
        {
            let mut stream = open_stream(&mut camera, 4).unwrap();
            stream.grab(None).unwrap();
        }
        assert_eq!(camera.counters().streams_started, 1);
        assert_eq!(camera.counters().streams_stopped, 1);
    }

    #[test]
    fn empty_pool_is_rejected() {
        let mut camera = small_camera(VirtualCameraConfig::default());
        assert!(matches!(open_stream(&mut camera, 0), Err(Error::InvalidArgument(_))));
        assert_eq!(camera.counters().streams_started, 0);
    }

    #[test]
    fn runs_until_max_frames() {
        let mut camera = small_camera(VirtualCameraConfig::default());
        let options = StreamOptions {
            buffer_pool: 3,
            max_frames: Some(5),
            ..StreamOptions::default()
        };
        let mut indices = Vec::new();
        let mut sink = from_fn(|image: &MaterializedImage, stats: &FrameStats| {
            assert_eq!(image.shape(), (6, 8, 3));
            indices.push(stats.index);
            Ok(Flow::Continue)
        });

        let summary = run_stream(&mut camera, &options, &mut sink, &AtomicBool::new(false)).unwrap();

        assert_eq!(summary.delivered, 5);
        assert_eq!(summary.skipped, 0);
        assert_eq!(indices, [0, 1, 2, 3, 4]);
        assert_eq!(camera.counters().buffers_requeued, 5);
        assert_eq!(camera.counters().streams_stopped, 1);
    }

    #[test]
    fn sink_can_stop_the_stream() {
        let mut camera = small_camera(VirtualCameraConfig::default());
        let options = StreamOptions {
            max_frames: None,
            ..StreamOptions::default()
        };
        let mut sink = from_fn(|_: &MaterializedImage, stats: &FrameStats| {
            Ok(if stats.index == 2 { Flow::Stop } else { Flow::Continue })
        });

        let summary = run_stream(&mut camera, &options, &mut sink, &AtomicBool::new(false)).unwrap();
        assert_eq!(summary.delivered, 3);
    }

    #[test]
    fn raised_stop_flag_ends_before_grabbing() {
        let mut camera = small_camera(VirtualCameraConfig::default());
        let mut sink = from_fn(|_: &MaterializedImage, _: &FrameStats| Ok(Flow::Continue));

        let summary =
            run_stream(&mut camera, &StreamOptions::default(), &mut sink, &AtomicBool::new(true)).unwrap();

        assert_eq!(summary.delivered, 0);
        assert_eq!(camera.counters().buffers_delivered, 0);
        assert_eq!(camera.counters().streams_stopped, 1);
    }

    #[test]
    fn skips_bad_frames_and_keeps_going() {
        let mut camera = small_camera(VirtualCameraConfig {
            corrupt_every: Some(3),
            ..VirtualCameraConfig::default()
        });
        let options = StreamOptions {
            max_frames: Some(9),
            ..StreamOptions::default()
        };
        let mut sink = from_fn(|_: &MaterializedImage, _: &FrameStats| Ok(Flow::Continue));

        let summary = run_stream(&mut camera, &options, &mut sink, &AtomicBool::new(false)).unwrap();

        assert_eq!(summary.delivered, 6);
        assert_eq!(summary.skipped, 3);
        assert_eq!(camera.counters().buffers_requeued, 9);
    }

    #[test]
    fn consecutive_failures_become_fatal() {
        let mut camera = small_camera(VirtualCameraConfig {
            corrupt_every: Some(1),
            ..VirtualCameraConfig::default()
        });
        let options = StreamOptions {
            max_consecutive_failures: Some(4),
            ..StreamOptions::default()
        };
        let mut sink = from_fn(|_: &MaterializedImage, _: &FrameStats| Ok(Flow::Continue));

        let err = run_stream(&mut camera, &options, &mut sink, &AtomicBool::new(false)).unwrap_err();

        assert!(matches!(
            err,
            Error::TooManyFrameFailures {
                count: 4,
                last: FrameError::MalformedBuffer { .. }
            }
        ));
        assert_eq!(camera.counters().buffers_requeued, 4);
        assert_eq!(camera.counters().streams_stopped, 1);
    }

    #[test]
    fn channel_mismatch_is_flagged() {
        let mut camera = small_camera(VirtualCameraConfig::default());
        let options = StreamOptions {
            max_frames: Some(2),
            expected_format: Some(PixelFormat::Mono8),
            max_consecutive_failures: None,
            ..StreamOptions::default()
        };
        let mut sink = from_fn(|_: &MaterializedImage, _: &FrameStats| Ok(Flow::Continue));

        let summary = run_stream(&mut camera, &options, &mut sink, &AtomicBool::new(false)).unwrap();
        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.skipped, 2);
    }

    #[test]
    fn sink_errors_stop_the_stream() {
        let mut camera = small_camera(VirtualCameraConfig::default());
        let mut sink = from_fn(|_: &MaterializedImage, _: &FrameStats| {
            Err(Error::Sink("disk full".to_string()))
        });

        let err = run_stream(&mut camera, &StreamOptions::default(), &mut sink, &AtomicBool::new(false))
            .unwrap_err();

        assert!(matches!(err, Error::Sink(_)));
        assert_eq!(camera.counters().streams_stopped, 1);
    }
}
