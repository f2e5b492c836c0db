//! An in-process camera implementing [`DeviceProvider`], [`Device`] and [`StreamSession`].
//!
//! Frames carry a deterministic [`test_pattern`], so what comes out of a stream can be compared
//! byte for byte. The camera can be told to show up late, to hand out malformed buffers, and
//! to pace frames at its configured frame rate.

use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};

use crate::{
    Device, DeviceInfo, DeviceProvider, Error, Node, NodeAttribute, NodeMap, NodeValue,
    PixelFormat, RawBufferDescriptor, Result, StreamSession,
};

const MIN_EXPOSURE_US: f64 = 20.0;
const MAX_EXPOSURE_US: f64 = 10_000_000.0;
/// written over a buffer when it goes back to the pool
const POISON: u8 = 0xEE;

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualCameraConfig {
    pub sensor_width: u32,
    pub sensor_height: u32,
    /// number of discovery attempts that report no device
    pub appear_after: u32,
    /// devices reported once they appear
    pub device_count: usize,
    /// every n-th frame gets a trailing byte, making it malformed
    pub corrupt_every: Option<u32>,
    /// sleep between frames according to the frame rate nodes
    pub realtime: bool,
    /// nodes reported as not writable
    pub read_only: Vec<Node>,
    /// nodes the device does not have
    pub missing: Vec<Node>,
}

impl Default for VirtualCameraConfig {
    fn default() -> Self {
        Self {
            sensor_width: 1280,
            sensor_height: 1024,
            appear_after: 0,
            device_count: 1,
            corrupt_every: None,
            realtime: false,
            read_only: Vec::new(),
            missing: Vec::new(),
        }
    }
}

/// Device provider creating [`VirtualCamera`]s.
#[derive(Debug)]
pub struct VirtualSystem {
    config: VirtualCameraConfig,
    attempts: u32,
    created: usize,
}

impl VirtualSystem {
    pub fn new(config: VirtualCameraConfig) -> Self {
        Self {
            config,
            attempts: 0,
            created: 0,
        }
    }

    /// Number of times devices were requested so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl DeviceProvider for VirtualSystem {
    type Device = VirtualCamera;

    fn try_create_devices(&mut self) -> Result<Vec<VirtualCamera>> {
        self.attempts += 1;
        if self.attempts <= self.config.appear_after {
            log::debug!("virtual device not connected yet (attempt {})", self.attempts);
            return Ok(Vec::new());
        }

        let devices: Vec<_> = (0..self.config.device_count)
            .map(|index| VirtualCamera::new(self.config.clone(), index))
            .collect();
        self.created += devices.len();
        Ok(devices)
    }

    fn destroy_all_devices(&mut self) -> Result<()> {
        log::info!("destroying {} virtual device(s)", self.created);
        self.created = 0;
        Ok(())
    }
}

/// What happened to the streams of a [`VirtualCamera`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct StreamCounters {
    pub streams_started: u32,
    pub streams_stopped: u32,
    pub buffers_delivered: u64,
    pub buffers_requeued: u64,
}

#[derive(Debug)]
pub struct VirtualCamera {
    info: DeviceInfo,
    config: VirtualCameraConfig,
    nodes: VirtualNodeMap,
    stream_nodes: VirtualNodeMap,
    counters: StreamCounters,
}

impl VirtualCamera {
    /// Creates the `index`-th camera of a system, its serial number is `VC-<index>`.
    pub fn new(config: VirtualCameraConfig, index: usize) -> Self {
        let info = DeviceInfo {
            model_name: "Virtual Camera".to_string(),
            vendor_name: "framegate".to_string(),
            serial_number: format!("VC-{index:04}"),
            sensor_width: config.sensor_width,
            sensor_height: config.sensor_height,
        };
        Self {
            info,
            nodes: VirtualNodeMap::device(&config),
            stream_nodes: VirtualNodeMap::stream(&config),
            config,
            counters: StreamCounters::default(),
        }
    }

    pub fn counters(&self) -> StreamCounters {
        self.counters
    }

    fn frame_interval(&self) -> Result<Option<Duration>> {
        if !self.config.realtime
            || self.nodes.get(Node::AcquisitionFrameRateEnable)? != NodeValue::Boolean(true)
        {
            return Ok(None);
        }
        let fps = self.nodes.get_f64(Node::AcquisitionFrameRate)?;
        Ok(Some(Duration::from_secs_f64(1.0 / fps)))
    }
}

impl Device for VirtualCamera {
    type Nodes = VirtualNodeMap;
    type Session<'a> = VirtualStream<'a> where Self: 'a;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn node_map(&mut self) -> &mut VirtualNodeMap {
        &mut self.nodes
    }

    fn stream_node_map(&mut self) -> &mut VirtualNodeMap {
        &mut self.stream_nodes
    }

    fn start_stream(&mut self, buffer_pool: usize) -> Result<VirtualStream<'_>> {
        if buffer_pool == 0 {
            return Err(Error::InvalidArgument(
                "the buffer pool needs at least one buffer".to_string(),
            ));
        }

        let width = dimension(&self.nodes, Node::Width)?;
        let height = dimension(&self.nodes, Node::Height)?;
        let format_value = self.nodes.get(Node::PixelFormat)?;
        let format = format_value
            .as_entry()
            .and_then(PixelFormat::from_node_name)
            .ok_or_else(|| {
                Error::configuration(Node::PixelFormat, format!("cannot stream {format_value}"))
            })?;
        let frame_interval = self.frame_interval()?;

        self.counters.streams_started += 1;
        log::info!(
            "{} started streaming {width}x{height} {format} into {buffer_pool} buffers",
            self.info.serial_number
        );
        Ok(VirtualStream {
            counters: &mut self.counters,
            pool_size: buffer_pool,
            slots: Vec::new(),
            free: Vec::new(),
            width,
            height,
            channels: format.channels(),
            frame_index: 0,
            corrupt_every: self.config.corrupt_every.filter(|every| *every > 0),
            frame_interval,
            last_frame: None,
            stopped: false,
        })
    }
}

fn dimension(nodes: &VirtualNodeMap, node: Node) -> Result<u32> {
    nodes
        .get(node)?
        .as_i64()
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| Error::configuration(node, "not a valid dimension"))
}

/// A buffer handed out by [`VirtualStream`], identifies one slot of the pool.
#[derive(Debug)]
pub struct VirtualBuffer {
    slot: usize,
    frame_index: u64,
}

impl VirtualBuffer {
    /// Index of the frame among all frames of the stream, starting at 0
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

/// A running stream of a [`VirtualCamera`].
///
/// Slots are allocated on first use and recycled last-in first-out, so a stream that
/// requeues every buffer right away only ever touches one slot.
#[derive(Debug)]
pub struct VirtualStream<'a> {
    counters: &'a mut StreamCounters,
    pool_size: usize,
    slots: Vec<Vec<u8>>,
    free: Vec<usize>,
    width: u32,
    height: u32,
    channels: usize,
    frame_index: u64,
    corrupt_every: Option<u32>,
    frame_interval: Option<Duration>,
    last_frame: Option<Instant>,
    stopped: bool,
}

impl VirtualStream<'_> {
    /// Number of buffers currently out of the pool
    pub fn outstanding(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    fn wait_for_frame(&self, timeout: Option<Duration>) -> Result<()> {
        let (Some(interval), Some(last)) = (self.frame_interval, self.last_frame) else {
            return Ok(());
        };
        let wait = (last + interval).saturating_duration_since(Instant::now());
        match timeout {
            Some(timeout) if timeout < wait => {
                thread::sleep(timeout);
                Err(Error::Timeout)
            }
            _ => {
                thread::sleep(wait);
                Ok(())
            }
        }
    }

    fn take_slot(&mut self) -> Result<usize> {
        if let Some(slot) = self.free.pop() {
            return Ok(slot);
        }
        if self.slots.len() < self.pool_size {
            self.slots.push(Vec::new());
            return Ok(self.slots.len() - 1);
        }
        Err(Error::BufferPoolExhausted {
            pool_size: self.pool_size,
        })
    }
}

impl StreamSession for VirtualStream<'_> {
    type Buffer = VirtualBuffer;

    fn get_buffer(&mut self, timeout: Option<Duration>) -> Result<VirtualBuffer> {
        if self.stopped {
            return Err(Error::Stream("stream is stopped".to_string()));
        }
        self.wait_for_frame(timeout)?;
        let slot = self.take_slot()?;

        let frame_index = self.frame_index;
        let data = &mut self.slots[slot];
        fill_pattern(data, self.width, self.height, self.channels, frame_index);
        if let Some(every) = self.corrupt_every {
            if (frame_index + 1) % u64::from(every) == 0 {
                data.push(0);
            }
        }

        self.frame_index += 1;
        self.last_frame = Some(Instant::now());
        self.counters.buffers_delivered += 1;
        Ok(VirtualBuffer { slot, frame_index })
    }

    fn describe<'b>(&'b self, buffer: &'b VirtualBuffer) -> RawBufferDescriptor<'b> {
        let data = self.slots.get(buffer.slot).map_or(&[][..], Vec::as_slice);
        RawBufferDescriptor::from_slice(data, self.width, self.height)
    }

    fn requeue_buffer(&mut self, buffer: VirtualBuffer) -> Result<()> {
        if buffer.slot >= self.slots.len() || self.free.contains(&buffer.slot) {
            return Err(Error::Stream(format!(
                "buffer of frame {} is not out of the pool",
                buffer.frame_index
            )));
        }
        self.slots[buffer.slot].fill(POISON);
        self.free.push(buffer.slot);
        self.counters.buffers_requeued += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.stopped {
            self.stopped = true;
            self.counters.streams_stopped += 1;
            log::info!("stream stopped after {} frames", self.frame_index);
        }
        Ok(())
    }
}

/// The bytes of frame `frame_index` of a `width` x `height` stream with `channels` channels.
///
/// Pixel (x, y) channel c holds `x + y + 85 c + 8 (frame_index mod 32)`, modulo 256.
pub fn test_pattern(width: u32, height: u32, channels: usize, frame_index: u64) -> Vec<u8> {
    let mut data = Vec::new();
    fill_pattern(&mut data, width, height, channels, frame_index);
    data
}

fn fill_pattern(data: &mut Vec<u8>, width: u32, height: u32, channels: usize, frame_index: u64) {
    data.clear();
    data.reserve(width as usize * height as usize * channels);
    let shift = (frame_index % 32) as usize * 8;
    for y in 0..height as usize {
        for x in 0..width as usize {
            data.extend((0..channels).map(|c| ((x + y + c * 85 + shift) % 256) as u8));
        }
    }
}

/// Node map of a [`VirtualCamera`] or of its stream.
///
/// Access modes and bounds follow the current values: `ExposureTime` is writable only while
/// `ExposureAuto` is `Off` and cannot exceed the frame period, `AcquisitionFrameRate` only
/// while the limit is enabled, and binning shrinks the region of interest.
#[derive(Debug, Clone)]
pub struct VirtualNodeMap {
    entries: HashMap<Node, (NodeAttribute, NodeValue)>,
    read_only: Vec<Node>,
    sensor_width: i64,
    sensor_height: i64,
}

impl VirtualNodeMap {
    fn device(config: &VirtualCameraConfig) -> Self {
        let width = i64::from(config.sensor_width);
        let height = i64::from(config.sensor_height);
        let formats = PixelFormat::ALL.iter().map(|format| format.node_name());

        let mut map = Self::empty(config);
        map.insert(config, Node::Width, NodeAttribute::integer(1, width), width);
        map.insert(config, Node::Height, NodeAttribute::integer(1, height), height);
        map.insert(config, Node::OffsetX, NodeAttribute::integer(0, 0), 0i64);
        map.insert(config, Node::OffsetY, NodeAttribute::integer(0, 0), 0i64);
        map.insert(config, Node::BinningHorizontal, NodeAttribute::integer(1, 4), 1i64);
        map.insert(config, Node::BinningVertical, NodeAttribute::integer(1, 4), 1i64);
        map.insert(config, Node::PixelFormat, NodeAttribute::enumeration(formats), "Mono8");
        map.insert(
            config,
            Node::ExposureAuto,
            NodeAttribute::enumeration(["Off", "Continuous"]),
            "Continuous",
        );
        map.insert(
            config,
            Node::ExposureTime,
            NodeAttribute::float(MIN_EXPOSURE_US, MAX_EXPOSURE_US),
            10_000.0,
        );
        map.insert(config, Node::AcquisitionFrameRateEnable, NodeAttribute::boolean(), false);
        map.insert(config, Node::AcquisitionFrameRate, NodeAttribute::float(0.5, 60.0), 30.0);
        map.insert(
            config,
            Node::DeviceStreamChannelPacketSize,
            NodeAttribute::integer(576, 9000),
            1500i64,
        );
        map
    }

    fn stream(config: &VirtualCameraConfig) -> Self {
        let mut map = Self::empty(config);
        map.insert(
            config,
            Node::StreamBufferHandlingMode,
            NodeAttribute::enumeration(["OldestFirst", "OldestFirstOverwrite", "NewestOnly"]),
            "OldestFirst",
        );
        map.insert(config, Node::StreamAutoNegotiatePacketSize, NodeAttribute::boolean(), false);
        map.insert(config, Node::StreamPacketResendEnable, NodeAttribute::boolean(), false);
        map
    }

    fn empty(config: &VirtualCameraConfig) -> Self {
        Self {
            entries: HashMap::new(),
            read_only: config.read_only.clone(),
            sensor_width: i64::from(config.sensor_width),
            sensor_height: i64::from(config.sensor_height),
        }
    }

    fn insert(
        &mut self,
        config: &VirtualCameraConfig,
        node: Node,
        attribute: NodeAttribute,
        value: impl Into<NodeValue>,
    ) {
        if !config.missing.contains(&node) {
            self.entries.insert(node, (attribute, value.into()));
        }
    }

    fn value(&self, node: Node) -> Option<&NodeValue> {
        self.entries.get(&node).map(|(_, value)| value)
    }

    fn integer(&self, node: Node, default: i64) -> i64 {
        self.value(node).and_then(NodeValue::as_i64).unwrap_or(default)
    }

    fn is(&self, node: Node, expected: NodeValue) -> bool {
        self.value(node) == Some(&expected)
    }

    fn exposure_max(&self) -> f64 {
        if self.is(Node::AcquisitionFrameRateEnable, true.into()) {
            let fps = self
                .value(Node::AcquisitionFrameRate)
                .and_then(NodeValue::as_f64)
                .unwrap_or(1.0);
            (1_000_000.0 / fps).min(MAX_EXPOSURE_US)
        } else {
            MAX_EXPOSURE_US
        }
    }

    /// Brings values back within bounds after a node they depend on changed.
    fn clamp_dependents(&mut self) {
        for node in [Node::Width, Node::Height, Node::OffsetX, Node::OffsetY, Node::ExposureTime] {
            let Some(attribute) = self.attribute(node) else {
                continue;
            };
            let Some((_, value)) = self.entries.get_mut(&node) else {
                continue;
            };
            let (min, max) = (
                attribute.min.unwrap_or(f64::NEG_INFINITY),
                attribute.max.unwrap_or(f64::INFINITY),
            );
            match value {
                NodeValue::Integer(current) => *current = (*current).clamp(min as i64, max as i64),
                NodeValue::Float(current) => *current = current.clamp(min, max),
                _ => {}
            }
        }
    }
}

impl NodeMap for VirtualNodeMap {
    fn attribute(&self, node: Node) -> Option<NodeAttribute> {
        let (attribute, _) = self.entries.get(&node)?;
        let mut attribute = attribute.clone();

        let binned_width = self.sensor_width / self.integer(Node::BinningHorizontal, 1).max(1);
        let binned_height = self.sensor_height / self.integer(Node::BinningVertical, 1).max(1);
        match node {
            Node::Width => {
                attribute.max = Some((binned_width - self.integer(Node::OffsetX, 0)) as f64)
            }
            Node::Height => {
                attribute.max = Some((binned_height - self.integer(Node::OffsetY, 0)) as f64)
            }
            Node::OffsetX => {
                attribute.max = Some((binned_width - self.integer(Node::Width, 1)).max(0) as f64)
            }
            Node::OffsetY => {
                attribute.max = Some((binned_height - self.integer(Node::Height, 1)).max(0) as f64)
            }
            Node::ExposureTime => {
                attribute.is_writable = self.is(Node::ExposureAuto, "Off".into());
                attribute.max = Some(self.exposure_max());
            }
            Node::AcquisitionFrameRate => {
                attribute.is_writable = self.is(Node::AcquisitionFrameRateEnable, true.into());
            }
            _ => {}
        }
        if self.read_only.contains(&node) {
            attribute.is_writable = false;
        }
        Some(attribute)
    }

    fn get(&self, node: Node) -> Result<NodeValue> {
        self.value(node)
            .cloned()
            .ok_or_else(|| Error::configuration(node, "node not found"))
    }

    fn set(&mut self, node: Node, value: NodeValue) -> Result<()> {
        self.attribute_or_err(node)?.check_write(node, &value)?;

        let binning_changed = matches!(node, Node::BinningHorizontal | Node::BinningVertical)
            && self.value(node) != Some(&value);
        if let Some((_, current)) = self.entries.get_mut(&node) {
            *current = value;
        }

        if binning_changed {
            // binning resets the region of interest to the whole binned sensor
            let (size, offset, full) = match node {
                Node::BinningHorizontal => (Node::Width, Node::OffsetX, self.sensor_width),
                _ => (Node::Height, Node::OffsetY, self.sensor_height),
            };
            let binned = full / self.integer(node, 1).max(1);
            for (node, value) in [(offset, 0), (size, binned)] {
                if let Some((_, current)) = self.entries.get_mut(&node) {
                    *current = NodeValue::Integer(value);
                }
            }
        }
        self.clamp_dependents();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{materialize, open_stream};

    fn camera(config: VirtualCameraConfig) -> VirtualCamera {
        VirtualCamera::new(config, 0)
    }

    #[test]
    fn shows_up_after_configured_attempts() {
        let mut system = VirtualSystem::new(VirtualCameraConfig {
            appear_after: 2,
            device_count: 2,
            ..VirtualCameraConfig::default()
        });

        assert!(system.try_create_devices().unwrap().is_empty());
        assert!(system.try_create_devices().unwrap().is_empty());
        let devices = system.try_create_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].info().serial_number, "VC-0001");
        assert_eq!(system.attempts(), 3);
        system.destroy_all_devices().unwrap();
    }

    #[test]
    fn exposure_time_follows_auto_mode_and_frame_rate() {
        let mut camera = camera(VirtualCameraConfig::default());
        let nodes = camera.node_map();

        assert!(!nodes.attribute(Node::ExposureTime).unwrap().is_writable);
        nodes.write_checked(Node::ExposureAuto, "Off".into()).unwrap();
        assert!(nodes.attribute(Node::ExposureTime).unwrap().is_writable);

        assert!(!nodes.attribute(Node::AcquisitionFrameRate).unwrap().is_writable);
        nodes.write_checked(Node::AcquisitionFrameRateEnable, true.into()).unwrap();
        nodes.write_checked(Node::AcquisitionFrameRate, 4.0.into()).unwrap();
        assert_eq!(nodes.maximum(Node::ExposureTime).unwrap(), 250_000.0);
        nodes.write_checked(Node::ExposureTime, 200_000.0.into()).unwrap();

        nodes.write_checked(Node::AcquisitionFrameRate, 10.0.into()).unwrap();
        // the current exposure no longer fits in the frame period
        assert_eq!(nodes.get_f64(Node::ExposureTime).unwrap(), 100_000.0);
    }

    #[test]
    fn binning_shrinks_the_region() {
        let mut camera = camera(VirtualCameraConfig::default());
        let nodes = camera.node_map();
        nodes.write_checked(Node::Width, 400i64.into()).unwrap();
        nodes.write_checked(Node::OffsetX, 100i64.into()).unwrap();

        nodes.write_checked(Node::BinningHorizontal, 2i64.into()).unwrap();

        assert_eq!(nodes.get(Node::Width).unwrap(), NodeValue::Integer(640));
        assert_eq!(nodes.get(Node::OffsetX).unwrap(), NodeValue::Integer(0));
        assert_eq!(nodes.maximum(Node::Width).unwrap(), 640.0);
        assert_eq!(nodes.get(Node::Height).unwrap(), NodeValue::Integer(1024));
    }

    #[test]
    fn offsets_limit_the_width() {
        let mut camera = camera(VirtualCameraConfig::default());
        let nodes = camera.node_map();
        nodes.write_checked(Node::Width, 1000i64.into()).unwrap();
        nodes.write_checked(Node::OffsetX, 280i64.into()).unwrap();

        let err = nodes.write_checked(Node::Width, 1001i64.into()).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { node: Node::Width, .. }));
        assert!(nodes.set(Node::OffsetX, 281i64.into()).is_err());
    }

    #[test]
    fn configured_nodes_can_be_missing_or_read_only() {
        let camera = &mut camera(VirtualCameraConfig {
            missing: vec![Node::OffsetX],
            read_only: vec![Node::Width],
            ..VirtualCameraConfig::default()
        });
        let nodes = camera.node_map();

        assert!(nodes.attribute(Node::OffsetX).is_none());
        assert!(nodes.get(Node::OffsetX).is_err());
        assert!(!nodes.attribute(Node::Width).unwrap().is_writable);
        assert!(nodes.set(Node::Width, 10i64.into()).is_err());
    }

    #[test]
    fn pool_runs_out_when_buffers_are_kept() {
        let mut camera = camera(VirtualCameraConfig::default());
        let mut session = camera.start_stream(2).unwrap();

        let first = session.get_buffer(None).unwrap();
        let second = session.get_buffer(None).unwrap();
        assert_eq!(session.outstanding(), 2);
        assert!(matches!(
            session.get_buffer(None),
            Err(Error::BufferPoolExhausted { pool_size: 2 })
        ));

        session.requeue_buffer(first).unwrap();
        let third = session.get_buffer(None).unwrap();
        assert_eq!(third.frame_index(), 2);
        session.requeue_buffer(second).unwrap();
        session.requeue_buffer(third).unwrap();
        assert_eq!(session.outstanding(), 0);
    }

    #[test]
    fn requeued_memory_is_overwritten() {
        let mut camera = camera(VirtualCameraConfig::default());
        let nodes = camera.node_map();
        nodes.write_checked(Node::Width, 4i64.into()).unwrap();
        nodes.write_checked(Node::Height, 2i64.into()).unwrap();
        let mut session = camera.start_stream(1).unwrap();

        let buffer = session.get_buffer(None).unwrap();
        let image = materialize(&session.describe(&buffer)).unwrap();
        let slot = buffer.slot;
        session.requeue_buffer(buffer).unwrap();

        assert!(session.slots[slot].iter().all(|byte| *byte == POISON));
        assert_eq!(image.as_bytes(), &test_pattern(4, 2, 1, 0)[..]);
    }

    #[test]
    fn requeueing_twice_is_an_error() {
        let mut camera = camera(VirtualCameraConfig::default());
        let mut session = camera.start_stream(1).unwrap();
        let buffer = session.get_buffer(None).unwrap();
        let stale = VirtualBuffer {
            slot: buffer.slot,
            frame_index: buffer.frame_index,
        };

        session.requeue_buffer(buffer).unwrap();
        assert!(matches!(session.requeue_buffer(stale), Err(Error::Stream(_))));
    }

    #[test]
    fn stopped_stream_hands_out_nothing() {
        let mut camera = camera(VirtualCameraConfig::default());
        {
            let mut session = camera.start_stream(1).unwrap();
            session.stop().unwrap();
            session.stop().unwrap();
            assert!(matches!(session.get_buffer(None), Err(Error::Stream(_))));
        }
        assert_eq!(camera.counters().streams_stopped, 1);
    }

    #[test]
    fn realtime_stream_times_out_between_frames() {
        let mut camera = camera(VirtualCameraConfig {
            realtime: true,
            ..VirtualCameraConfig::default()
        });
        let nodes = camera.node_map();
        nodes.write_checked(Node::AcquisitionFrameRateEnable, true.into()).unwrap();
        nodes.write_checked(Node::AcquisitionFrameRate, 0.5.into()).unwrap();
        let mut stream = open_stream(&mut camera, 2).unwrap();

        stream.grab(Some(Duration::from_millis(10))).unwrap();
        let err = stream.grab(Some(Duration::from_millis(10))).unwrap_err();
        assert!(matches!(err, Error::Timeout));
        assert_eq!(stream.session().outstanding(), 0);
    }

    #[test]
    fn unknown_pixel_format_cannot_stream() {
        let mut camera = camera(VirtualCameraConfig::default());
        camera
            .nodes
            .entries
            .get_mut(&Node::PixelFormat)
            .unwrap()
            .1 = "YUV422".into();
        assert!(matches!(
            camera.start_stream(1),
            Err(Error::Configuration { node: Node::PixelFormat, .. })
        ));
        assert_eq!(camera.counters().streams_started, 0);
    }

    #[test]
    fn pattern_differs_between_frames_and_channels() {
        let first = test_pattern(3, 2, 3, 0);
        assert_eq!(first.len(), 18);
        assert_eq!(&first[..3], &[0, 85, 170]);
        // pixel (1, 1)
        assert_eq!(&first[12..15], &[2, 87, 172]);
        assert_eq!(test_pattern(3, 2, 3, 1)[0], 8);
        assert_eq!(test_pattern(3, 2, 3, 32), first);
    }
}
