//! Frame layout describing where each field lives inside a reassembled frame
//!
//! Device firmware revisions move the waveform runs and vitals bytes around, so
//! offsets are configuration rather than code. A layout is validated once when it
//! is built or loaded and is then shared read-only by the decoder.

use serde::{Deserialize, Serialize};

/// Half-open byte range `[start, end)` within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

impl ByteRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl From<std::ops::Range<usize>> for ByteRange {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// One waveform channel: a name and the bytes carrying its samples.
///
/// A channel may be spread over several runs of the frame, one per segment on
/// some firmware. The runs are concatenated in order into one sample run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct ChannelLayout {
    /// Channel name used in records and storage (e.g. "pleth")
    pub name: String,
    /// Bytes copied verbatim as the channel's samples, in sample order
    pub ranges: Vec<ByteRange>,
}

impl ChannelLayout {
    pub fn new(name: impl Into<String>, range: impl Into<ByteRange>) -> Self {
        Self { name: name.into(), ranges: vec![range.into()] }
    }

    /// Samples contributed by one frame.
    pub fn sample_count(&self) -> usize {
        self.ranges.iter().map(ByteRange::len).sum()
    }

    /// Copy the channel's samples out of `data`; `None` if a run is out of bounds.
    pub fn extract(&self, data: &[u8]) -> Option<Vec<u8>> {
        let mut values = Vec::with_capacity(self.sample_count());
        for range in &self.ranges {
            values.extend_from_slice(data.get(range.as_range())?);
        }
        Some(values)
    }
}

/// Exclusive bounds: a value is valid when `low < value < high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct OpenBounds {
    pub low: u8,
    pub high: u8,
}

impl OpenBounds {
    pub const fn new(low: u8, high: u8) -> Self {
        Self { low, high }
    }

    /// Check whether `value` lies strictly between the sentinels.
    pub fn contains(&self, value: u8) -> bool {
        self.low < value && value < self.high
    }

    /// True when no value can satisfy the bounds.
    pub fn is_empty(&self) -> bool {
        self.high <= self.low.saturating_add(1)
    }
}

/// Validity bounds for the vitals bytes.
///
/// The device reports "no reading" by sending the sentinel values themselves
/// (0, 127 for SpO2 and 0, 255 for pulse), hence the exclusive comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct VitalsBounds {
    pub spo2: OpenBounds,
    pub pulse: OpenBounds,
}

impl Default for VitalsBounds {
    fn default() -> Self {
        Self { spo2: OpenBounds::new(0, 127), pulse: OpenBounds::new(0, 255) }
    }
}

/// Offsets of the once-per-frame vitals bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct VitalsLayout {
    pub spo2_offset: usize,
    pub pulse_offset: usize,
    #[serde(default)]
    pub bounds: VitalsBounds,
}

/// Complete description of a frame's fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub struct FrameLayout {
    /// Waveform channels in output order
    #[serde(default)]
    pub channels: Vec<ChannelLayout>,
    /// Vitals offsets, if the frame carries vitals
    #[serde(default)]
    pub vitals: Option<VitalsLayout>,
    /// Offset of the per-frame rolling counter byte
    #[serde(default)]
    pub sequence_offset: Option<usize>,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self::dual_channel()
    }
}

impl FrameLayout {
    /// Start building a layout.
    pub fn builder() -> FrameLayoutBuilder {
        FrameLayoutBuilder::default()
    }

    /// Four-segment layout with a plethysmograph run and an auxiliary run.
    pub fn dual_channel() -> Self {
        Self {
            channels: vec![
                ChannelLayout::new("pleth", 5..35),
                ChannelLayout::new("aux", 38..65),
            ],
            vitals: Some(VitalsLayout {
                spo2_offset: 36,
                pulse_offset: 37,
                bounds: VitalsBounds::default(),
            }),
            sequence_offset: Some(3),
        }
    }

    /// Older firmware that only carries the plethysmograph run.
    pub fn single_channel() -> Self {
        let mut layout = Self::dual_channel();
        layout.channels.truncate(1);
        layout
    }

    /// Firmware that carries ten waveform bytes at 5..15 of every 20-byte
    /// segment, read as one plethysmograph series, with the vitals in the
    /// second segment.
    pub fn segmented_pleth() -> Self {
        Self {
            channels: vec![ChannelLayout {
                name: "pleth".to_string(),
                ranges: (0..4).map(|segment| ByteRange::new(segment * 20 + 5, segment * 20 + 15)).collect(),
            }],
            vitals: Some(VitalsLayout {
                spo2_offset: 36,
                pulse_offset: 37,
                bounds: VitalsBounds::default(),
            }),
            sequence_offset: Some(3),
        }
    }

    /// Smallest frame length that keeps every configured field in range.
    pub fn minimum_length(&self) -> usize {
        let channels = self.channels.iter().flat_map(|c| c.ranges.iter().map(|r| r.end));
        let vitals = self
            .vitals
            .iter()
            .flat_map(|v| [v.spo2_offset.saturating_add(1), v.pulse_offset.saturating_add(1)]);
        let sequence = self.sequence_offset.map(|offset| offset.saturating_add(1));

        channels.chain(vitals).chain(sequence).max().unwrap_or(0)
    }

    /// Number of configured waveform channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Validate the layout for consistency.
    pub fn validate(&self) -> crate::Result<()> {
        if self.channels.is_empty() && self.vitals.is_none() {
            return Err(crate::OxilinkError::layout(
                "layout defines neither waveform channels nor vitals",
            ));
        }

        for (idx, channel) in self.channels.iter().enumerate() {
            if channel.ranges.is_empty() {
                return Err(crate::OxilinkError::layout(format!(
                    "channel '{}' has no byte ranges",
                    channel.name
                )));
            }
            if let Some(range) = channel.ranges.iter().find(|r| r.is_empty()) {
                return Err(crate::OxilinkError::layout(format!(
                    "channel '{}' has empty range {}..{}",
                    channel.name, range.start, range.end
                )));
            }

            if self.channels[..idx].iter().any(|other| other.name == channel.name) {
                return Err(crate::OxilinkError::layout(format!(
                    "channel name '{}' is used twice",
                    channel.name
                )));
            }
        }

        if let Some(vitals) = &self.vitals {
            check_offset("SpO2", vitals.spo2_offset)?;
            check_offset("pulse", vitals.pulse_offset)?;
            if vitals.bounds.spo2.is_empty() {
                return Err(crate::OxilinkError::layout("SpO2 bounds admit no value"));
            }
            if vitals.bounds.pulse.is_empty() {
                return Err(crate::OxilinkError::layout("pulse bounds admit no value"));
            }
        }

        if let Some(offset) = self.sequence_offset {
            check_offset("sequence", offset)?;
        }

        Ok(())
    }
}

/// A single-byte field at `offset` must end inside the addressable range.
fn check_offset(field: &str, offset: usize) -> crate::Result<()> {
    match offset.checked_add(1) {
        Some(_) => Ok(()),
        None => Err(crate::OxilinkError::layout(format!("{} offset {} is out of range", field, offset))),
    }
}

/// Builder for [`FrameLayout`].
#[derive(Debug, Default)]
pub struct FrameLayoutBuilder {
    channels: Vec<ChannelLayout>,
    vitals: Option<VitalsLayout>,
    sequence_offset: Option<usize>,
    bounds: Option<VitalsBounds>,
}

impl FrameLayoutBuilder {
    /// Add a waveform channel.
    pub fn channel(mut self, name: impl Into<String>, range: impl Into<ByteRange>) -> Self {
        self.channels.push(ChannelLayout::new(name, range));
        self
    }

    /// Add a waveform channel read from several runs, concatenated in order.
    pub fn split_channel<R>(mut self, name: impl Into<String>, ranges: impl IntoIterator<Item = R>) -> Self
    where
        R: Into<ByteRange>,
    {
        self.channels.push(ChannelLayout {
            name: name.into(),
            ranges: ranges.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Set the SpO2 and pulse byte offsets.
    pub fn vitals(mut self, spo2_offset: usize, pulse_offset: usize) -> Self {
        self.vitals = Some(VitalsLayout {
            spo2_offset,
            pulse_offset,
            bounds: VitalsBounds::default(),
        });
        self
    }

    /// Override the vitals validity bounds.
    pub fn bounds(mut self, bounds: VitalsBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Set the rolling counter offset.
    pub fn sequence_offset(mut self, offset: usize) -> Self {
        self.sequence_offset = Some(offset);
        self
    }

    /// Validate and build.
    pub fn build(self) -> crate::Result<FrameLayout> {
        let mut vitals = self.vitals;
        if let (Some(vitals), Some(bounds)) = (vitals.as_mut(), self.bounds) {
            vitals.bounds = bounds;
        }

        let layout =
            FrameLayout { channels: self.channels, vitals, sequence_offset: self.sequence_offset };
        layout.validate()?;
        Ok(layout)
    }
}
