use std::fmt;

use crate::{Error, Result};

/// Camera parameters this crate knows how to configure.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum Node {
    /// image width in pixels, integer
    Width,
    /// image height in pixels, integer
    Height,
    /// horizontal offset of the region of interest, integer
    OffsetX,
    /// vertical offset of the region of interest, integer
    OffsetY,
    /// horizontal binning factor, integer
    BinningHorizontal,
    /// vertical binning factor, integer
    BinningVertical,
    /// pixel format, enumeration (`Mono8`, `RGB8`, ...)
    PixelFormat,
    /// automatic exposure, enumeration (`Off`, `Continuous`)
    ExposureAuto,
    /// exposure time (unit: us), float. Only writable while `ExposureAuto` is `Off`
    ExposureTime,
    /// enables the frame rate limit, boolean
    AcquisitionFrameRateEnable,
    /// frame rate limit (unit: fps), float. Only writable while the limit is enabled
    AcquisitionFrameRate,
    /// size of stream packets (unit: bytes), integer
    DeviceStreamChannelPacketSize,
    /// which buffer the stream hands out first, enumeration (`NewestOnly`, `OldestFirst`, ...)
    StreamBufferHandlingMode,
    /// let the stream negotiate the largest packet size, boolean
    StreamAutoNegotiatePacketSize,
    /// request resends of dropped packets, boolean
    StreamPacketResendEnable,
}

impl Node {
    pub const ALL: [Node; 15] = [
        Node::Width,
        Node::Height,
        Node::OffsetX,
        Node::OffsetY,
        Node::BinningHorizontal,
        Node::BinningVertical,
        Node::PixelFormat,
        Node::ExposureAuto,
        Node::ExposureTime,
        Node::AcquisitionFrameRateEnable,
        Node::AcquisitionFrameRate,
        Node::DeviceStreamChannelPacketSize,
        Node::StreamBufferHandlingMode,
        Node::StreamAutoNegotiatePacketSize,
        Node::StreamPacketResendEnable,
    ];

    /// The GenICam feature name
    pub fn name(self) -> &'static str {
        match self {
            Node::Width => "Width",
            Node::Height => "Height",
            Node::OffsetX => "OffsetX",
            Node::OffsetY => "OffsetY",
            Node::BinningHorizontal => "BinningHorizontal",
            Node::BinningVertical => "BinningVertical",
            Node::PixelFormat => "PixelFormat",
            Node::ExposureAuto => "ExposureAuto",
            Node::ExposureTime => "ExposureTime",
            Node::AcquisitionFrameRateEnable => "AcquisitionFrameRateEnable",
            Node::AcquisitionFrameRate => "AcquisitionFrameRate",
            Node::DeviceStreamChannelPacketSize => "DeviceStreamChannelPacketSize",
            Node::StreamBufferHandlingMode => "StreamBufferHandlingMode",
            Node::StreamAutoNegotiatePacketSize => "StreamAutoNegotiatePacketSize",
            Node::StreamPacketResendEnable => "StreamPacketResendEnable",
        }
    }

    pub fn kind(self) -> NodeKind {
        match self {
            Node::Width
            | Node::Height
            | Node::OffsetX
            | Node::OffsetY
            | Node::BinningHorizontal
            | Node::BinningVertical
            | Node::DeviceStreamChannelPacketSize => NodeKind::Integer,
            Node::ExposureTime | Node::AcquisitionFrameRate => NodeKind::Float,
            Node::AcquisitionFrameRateEnable
            | Node::StreamAutoNegotiatePacketSize
            | Node::StreamPacketResendEnable => NodeKind::Boolean,
            Node::PixelFormat | Node::ExposureAuto | Node::StreamBufferHandlingMode => {
                NodeKind::Enumeration
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub enum NodeKind {
    Integer,
    Float,
    Boolean,
    Enumeration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    /// symbolic name of the selected entry
    Enumeration(String),
}

impl NodeValue {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeValue::Integer(_) => NodeKind::Integer,
            NodeValue::Float(_) => NodeKind::Float,
            NodeValue::Boolean(_) => NodeKind::Boolean,
            NodeValue::Enumeration(_) => NodeKind::Enumeration,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            NodeValue::Integer(value) => Some(value as f64),
            NodeValue::Float(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            NodeValue::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            NodeValue::Boolean(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_entry(&self) -> Option<&str> {
        match self {
            NodeValue::Enumeration(entry) => Some(entry),
            _ => None,
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::Integer(value) => write!(f, "{value}"),
            NodeValue::Float(value) => write!(f, "{value}"),
            NodeValue::Boolean(value) => write!(f, "{value}"),
            NodeValue::Enumeration(entry) => f.write_str(entry),
        }
    }
}

impl From<i64> for NodeValue {
    fn from(value: i64) -> Self {
        NodeValue::Integer(value)
    }
}

impl From<f64> for NodeValue {
    fn from(value: f64) -> Self {
        NodeValue::Float(value)
    }
}

impl From<bool> for NodeValue {
    fn from(value: bool) -> Self {
        NodeValue::Boolean(value)
    }
}

impl From<&str> for NodeValue {
    fn from(value: &str) -> Self {
        NodeValue::Enumeration(value.to_string())
    }
}

/// What the device reports about a node: access mode and the values it accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAttribute {
    pub kind: NodeKind,
    pub is_readable: bool,
    pub is_writable: bool,
    /// lower bound of numeric nodes
    pub min: Option<f64>,
    /// upper bound of numeric nodes
    pub max: Option<f64>,
    /// available entries of enumeration nodes
    pub entries: Vec<String>,
}

impl NodeAttribute {
    pub fn integer(min: i64, max: i64) -> Self {
        Self::numeric(NodeKind::Integer, min as f64, max as f64)
    }

    pub fn float(min: f64, max: f64) -> Self {
        Self::numeric(NodeKind::Float, min, max)
    }

    pub fn boolean() -> Self {
        Self {
            kind: NodeKind::Boolean,
            is_readable: true,
            is_writable: true,
            min: None,
            max: None,
            entries: Vec::new(),
        }
    }

    pub fn enumeration<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: NodeKind::Enumeration,
            is_readable: true,
            is_writable: true,
            min: None,
            max: None,
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    fn numeric(kind: NodeKind, min: f64, max: f64) -> Self {
        Self {
            kind,
            is_readable: true,
            is_writable: true,
            min: Some(min),
            max: Some(max),
            entries: Vec::new(),
        }
    }

    pub fn read_only(mut self) -> Self {
        self.is_writable = false;
        self
    }

    /// Checks access mode, type, bounds and enumeration entries without touching the device.
    pub fn check_write(&self, node: Node, value: &NodeValue) -> Result<()> {
        if !self.is_writable {
            return Err(Error::configuration(node, "node is not writable"));
        }
        self.check_value(node, value)
    }

    /// Like [`check_write`](Self::check_write) but ignores the current access mode.
    pub fn check_value(&self, node: Node, value: &NodeValue) -> Result<()> {
        if value.kind() != self.kind {
            return Err(Error::configuration(
                node,
                format!("expected a {:?} value, got {value}", self.kind),
            ));
        }

        if let Some(number) = value.as_f64() {
            let min = self.min.unwrap_or(f64::NEG_INFINITY);
            let max = self.max.unwrap_or(f64::INFINITY);
            if !(min..=max).contains(&number) {
                return Err(Error::OutOfBounds {
                    node,
                    value: number,
                    min,
                    max,
                });
            }
        }

        if let NodeValue::Enumeration(entry) = value {
            if !self.entries.iter().any(|available| available == entry) {
                return Err(Error::configuration(
                    node,
                    format!(
                        "entry {entry} is not available (available: {})",
                        self.entries.join(", ")
                    ),
                ));
            }
        }

        Ok(())
    }
}

/// Named parameter access of a device or of its stream.
pub trait NodeMap {
    /// `None` if the device does not have this node.
    fn attribute(&self, node: Node) -> Option<NodeAttribute>;

    fn get(&self, node: Node) -> Result<NodeValue>;

    /// Writes a value. Devices reject values they cannot take, but callers should prefer
    /// [`write_checked`](Self::write_checked) which reports bounds before writing.
    fn set(&mut self, node: Node, value: NodeValue) -> Result<()>;

    fn attribute_or_err(&self, node: Node) -> Result<NodeAttribute> {
        self.attribute(node)
            .ok_or_else(|| Error::configuration(node, "node not found"))
    }

    fn write_checked(&mut self, node: Node, value: NodeValue) -> Result<()> {
        self.attribute_or_err(node)?.check_write(node, &value)?;
        log::debug!("setting {node} to {value}");
        self.set(node, value)
    }

    fn get_f64(&self, node: Node) -> Result<f64> {
        let value = self.get(node)?;
        value
            .as_f64()
            .ok_or_else(|| Error::configuration(node, format!("{value} is not numeric")))
    }

    fn maximum(&self, node: Node) -> Result<f64> {
        self.attribute_or_err(node)?
            .max
            .ok_or_else(|| Error::configuration(node, "node has no maximum"))
    }
}

/// Values of some nodes, taken before the device is reconfigured so they can be put back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSnapshot {
    values: Vec<(Node, NodeValue)>,
}

impl NodeSnapshot {
    /// Device nodes written by [`CaptureSettings::apply`](crate::CaptureSettings::apply), in
    /// restore order: binning before the region it limits, exposure time while automatic
    /// exposure is still off, frame rate while the limit is still enabled.
    pub const DEVICE_NODES: [Node; 10] = [
        Node::BinningHorizontal,
        Node::BinningVertical,
        Node::Width,
        Node::Height,
        Node::PixelFormat,
        Node::DeviceStreamChannelPacketSize,
        Node::ExposureTime,
        Node::ExposureAuto,
        Node::AcquisitionFrameRate,
        Node::AcquisitionFrameRateEnable,
    ];

    /// Stream nodes written by [`CaptureSettings::apply`](crate::CaptureSettings::apply)
    pub const STREAM_NODES: [Node; 3] = [
        Node::StreamBufferHandlingMode,
        Node::StreamAutoNegotiatePacketSize,
        Node::StreamPacketResendEnable,
    ];

    /// Nodes the device does not have, or that are not readable, are left out.
    pub fn capture<N: NodeMap + ?Sized>(nodes: &N, which: &[Node]) -> Result<Self> {
        let mut values = Vec::with_capacity(which.len());
        for &node in which {
            match nodes.attribute(node) {
                Some(attribute) if attribute.is_readable => values.push((node, nodes.get(node)?)),
                _ => log::debug!("{node} is not readable, leaving it out of the snapshot"),
            }
        }
        Ok(Self { values })
    }

    pub fn values(&self) -> &[(Node, NodeValue)] {
        &self.values
    }

    pub fn get(&self, node: Node) -> Option<&NodeValue> {
        self.values
            .iter()
            .find(|(captured, _)| *captured == node)
            .map(|(_, value)| value)
    }

    /// Writes the captured values back in capture order and returns how many nodes hold their
    /// captured value afterwards. Only changed nodes are written.
    ///
    /// Every node is attempted. Nodes that are no longer writable are skipped with a warning;
    /// nodes whose write fails are logged and reported together in
    /// [`Error::RestoreIncomplete`].
    pub fn restore<N: NodeMap + ?Sized>(&self, nodes: &mut N) -> Result<usize> {
        let mut restored = 0;
        let mut failed = Vec::new();
        for (node, value) in &self.values {
            let result = match nodes.get(*node) {
                Ok(current) if current == *value => Ok(true),
                Ok(_) => match nodes.attribute(*node) {
                    Some(attribute) if attribute.is_writable => {
                        nodes.write_checked(*node, value.clone()).map(|()| true)
                    }
                    _ => Ok(false),
                },
                Err(err) => Err(err),
            };
            match result {
                Ok(true) => restored += 1,
                Ok(false) => log::warn!("{node} is not writable anymore, cannot restore it to {value}"),
                Err(err) => {
                    log::warn!("failed to restore {node} to {value}: {err}");
                    failed.push(*node);
                }
            }
        }

        if failed.is_empty() {
            Ok(restored)
        } else {
            Err(Error::RestoreIncomplete { restored, failed })
        }
    }
}
