use std::str::FromStr;

use serde::Deserialize;

use crate::{Device, Error, Node, NodeMap, NodeValue, PixelFormat, Result};

/// Which part of the sensor is read out.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorMode {
    /// region of `width` x `height` pixels
    Crop { width: u32, height: u32 },
    /// full sensor, `factor` x `factor` pixels combined into one
    Binning { factor: u32 },
    /// leave the region of interest as the device has it
    Original,
}

impl Default for SensorMode {
    fn default() -> Self {
        SensorMode::Crop {
            width: 400,
            height: 400,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exposure {
    /// let the device adjust exposure continuously
    Auto,
    /// the longest exposure the configured frame rate allows
    Maximum,
    /// fixed exposure time in microseconds
    Micros(f64),
}

impl FromStr for Exposure {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Exposure::Auto),
            "max" | "maximum" => Ok(Exposure::Maximum),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|micros| *micros > 0.0)
                .map(Exposure::Micros)
                .ok_or_else(|| {
                    format!("invalid exposure {s:?}, expected auto, max or a time in microseconds")
                }),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PacketSize {
    /// the largest packet size the device accepts
    Maximum,
    Fixed(i64),
}

/// Order in which the stream hands out filled buffers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferHandling {
    /// always the most recent frame, older ones are dropped
    NewestOnly,
    OldestFirst,
    /// oldest first, overwriting the oldest buffer when the pool is full
    OldestFirstOverwrite,
}

impl BufferHandling {
    pub fn node_name(self) -> &'static str {
        match self {
            BufferHandling::NewestOnly => "NewestOnly",
            BufferHandling::OldestFirst => "OldestFirst",
            BufferHandling::OldestFirstOverwrite => "OldestFirstOverwrite",
        }
    }
}

/// Everything configured on a device before streaming.
///
/// The defaults read a 400x400 RGB8 crop at 1.2 fps with the longest possible exposure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub pixel_format: PixelFormat,
    pub mode: SensorMode,
    pub exposure: Exposure,
    /// frame rate limit in fps, `None` leaves the device's setting
    pub frame_rate: Option<f64>,
    pub packet_size: PacketSize,
    pub buffer_handling: BufferHandling,
    pub auto_negotiate_packet_size: bool,
    pub packet_resend: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::Rgb8,
            mode: SensorMode::default(),
            exposure: Exposure::Maximum,
            frame_rate: Some(1.2),
            packet_size: PacketSize::Maximum,
            buffer_handling: BufferHandling::NewestOnly,
            auto_negotiate_packet_size: true,
            packet_resend: true,
        }
    }
}

/// Values read back from the device after [`CaptureSettings::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedSettings {
    pub pixel_format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub packet_size: i64,
    pub frame_rate: Option<f64>,
    /// `None` when exposure is automatic
    pub exposure_micros: Option<f64>,
}

impl CaptureSettings {
    /// Checks that every node these settings write exists, and that values which do not
    /// depend on other nodes are accepted. Nothing is written.
    pub fn validate<D: Device>(&self, device: &mut D) -> Result<()> {
        let stream_nodes = device.stream_node_map();
        check(stream_nodes, Node::StreamBufferHandlingMode, self.buffer_handling.node_name().into())?;
        check(stream_nodes, Node::StreamAutoNegotiatePacketSize, self.auto_negotiate_packet_size.into())?;
        check(stream_nodes, Node::StreamPacketResendEnable, self.packet_resend.into())?;

        let nodes = device.node_map();
        check(nodes, Node::PixelFormat, self.pixel_format.node_name().into())?;
        match self.packet_size {
            PacketSize::Maximum => require(nodes, Node::DeviceStreamChannelPacketSize).map(drop)?,
            PacketSize::Fixed(size) => check(nodes, Node::DeviceStreamChannelPacketSize, size.into())?,
        }
        match self.mode {
            SensorMode::Crop { width, height } => {
                check(nodes, Node::Width, i64::from(width).into())?;
                check(nodes, Node::Height, i64::from(height).into())?;
            }
            SensorMode::Binning { factor } => {
                check(nodes, Node::BinningHorizontal, i64::from(factor).into())?;
                check(nodes, Node::BinningVertical, i64::from(factor).into())?;
            }
            SensorMode::Original => {}
        }
        if let Some(fps) = self.frame_rate {
            require(nodes, Node::AcquisitionFrameRateEnable)?;
            let attribute = require(nodes, Node::AcquisitionFrameRate)?;
            attribute.check_value(Node::AcquisitionFrameRate, &fps.into())?;
        }
        require(nodes, Node::ExposureAuto)?;
        if let Exposure::Micros(_) | Exposure::Maximum = self.exposure {
            require(nodes, Node::ExposureTime)?;
        }
        Ok(())
    }

    /// Validates, then writes the settings: stream nodes, packet size, region, pixel format,
    /// frame rate and finally exposure, whose maximum depends on the frame rate.
    pub fn apply<D: Device>(&self, device: &mut D) -> Result<AppliedSettings> {
        self.validate(device)?;

        let stream_nodes = device.stream_node_map();
        stream_nodes.write_checked(
            Node::StreamBufferHandlingMode,
            self.buffer_handling.node_name().into(),
        )?;
        stream_nodes.write_checked(
            Node::StreamAutoNegotiatePacketSize,
            self.auto_negotiate_packet_size.into(),
        )?;
        stream_nodes.write_checked(Node::StreamPacketResendEnable, self.packet_resend.into())?;

        let nodes = device.node_map();
        let packet_size = match self.packet_size {
            PacketSize::Maximum => nodes.maximum(Node::DeviceStreamChannelPacketSize)? as i64,
            PacketSize::Fixed(size) => size,
        };
        nodes.write_checked(Node::DeviceStreamChannelPacketSize, packet_size.into())?;

        match self.mode {
            SensorMode::Crop { width, height } => {
                nodes.write_checked(Node::Width, i64::from(width).into())?;
                nodes.write_checked(Node::Height, i64::from(height).into())?;
            }
            SensorMode::Binning { factor } => {
                nodes.write_checked(Node::BinningHorizontal, i64::from(factor).into())?;
                nodes.write_checked(Node::BinningVertical, i64::from(factor).into())?;
            }
            SensorMode::Original => {}
        }
        nodes.write_checked(Node::PixelFormat, self.pixel_format.node_name().into())?;

        let frame_rate = match self.frame_rate {
            Some(fps) => {
                nodes.write_checked(Node::AcquisitionFrameRateEnable, true.into())?;
                nodes.write_checked(Node::AcquisitionFrameRate, fps.into())?;
                let fps = nodes.get_f64(Node::AcquisitionFrameRate)?;
                log::info!("Acquisition frame rate: {fps}");
                Some(fps)
            }
            None => None,
        };

        let exposure_micros = match self.exposure {
            Exposure::Auto => {
                nodes.write_checked(Node::ExposureAuto, "Continuous".into())?;
                None
            }
            Exposure::Maximum | Exposure::Micros(_) => {
                nodes.write_checked(Node::ExposureAuto, "Off".into())?;
                log::info!("Disable Auto Exposure");
                let micros = match self.exposure {
                    Exposure::Micros(micros) => micros,
                    _ => nodes.maximum(Node::ExposureTime)?,
                };
                nodes.write_checked(Node::ExposureTime, micros.into())?;
                let micros = nodes.get_f64(Node::ExposureTime)?;
                log::info!("Exposure time: {micros}");
                Some(micros)
            }
        };

        let applied = AppliedSettings {
            pixel_format: self.pixel_format,
            width: read_dimension(nodes, Node::Width)?,
            height: read_dimension(nodes, Node::Height)?,
            packet_size,
            frame_rate,
            exposure_micros,
        };
        log::info!(
            "configured {}x{} {} with packet size {}",
            applied.width,
            applied.height,
            applied.pixel_format,
            applied.packet_size
        );
        Ok(applied)
    }
}

fn require<N: NodeMap>(nodes: &N, node: Node) -> Result<crate::NodeAttribute> {
    let attribute = nodes.attribute_or_err(node)?;
    if attribute.kind != node.kind() {
        return Err(Error::configuration(
            node,
            format!("device reports a {:?} node", attribute.kind),
        ));
    }
    Ok(attribute)
}

fn check<N: NodeMap>(nodes: &N, node: Node, value: NodeValue) -> Result<()> {
    require(nodes, node)?.check_write(node, &value)
}

fn read_dimension<N: NodeMap>(nodes: &N, node: Node) -> Result<u32> {
    let value = nodes.get(node)?;
    value
        .as_i64()
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| Error::configuration(node, format!("{value} is not a valid dimension")))
}
