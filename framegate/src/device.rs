use crate::{Error, NodeMap, Result, StreamSession};

/// Description of a connected device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// the camera model name
    pub model_name: String,
    /// the vendor name
    pub vendor_name: String,
    /// the serial number of the camera, it's unique
    pub serial_number: String,
    /// full sensor width in pixels
    pub sensor_width: u32,
    /// full sensor height in pixels
    pub sensor_height: u32,
}

/// Source of capture devices, typically a vendor SDK's system object.
pub trait DeviceProvider {
    type Device: Device;

    /// Creates every device currently connected. An empty list means none is connected yet.
    fn try_create_devices(&mut self) -> Result<Vec<Self::Device>>;

    /// Picks the device to use among the created ones. Defaults to the first.
    fn select(&mut self, devices: Vec<Self::Device>) -> Result<Self::Device> {
        devices
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidArgument("no device to select from".to_string()))
    }

    /// Releases every device created by this provider.
    fn destroy_all_devices(&mut self) -> Result<()>;
}

/// A camera: parameter access and streaming.
pub trait Device {
    type Nodes: NodeMap;
    type Session<'a>: StreamSession
    where
        Self: 'a;

    fn info(&self) -> &DeviceInfo;

    /// Device parameters (size, pixel format, exposure, ...)
    fn node_map(&mut self) -> &mut Self::Nodes;

    /// Transport layer parameters of the stream (buffer handling, packet negotiation, ...)
    fn stream_node_map(&mut self) -> &mut Self::Nodes;

    /// Starts streaming into a pool of `buffer_pool` buffers.
    ///
    /// Prefer [`open_stream`](crate::open_stream), which stops the session on every exit path.
    fn start_stream(&mut self, buffer_pool: usize) -> Result<Self::Session<'_>>;
}
