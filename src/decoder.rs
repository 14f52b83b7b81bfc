//! Frame decoding against a configurable [`FrameLayout`]
//!
//! Decoding is a pure function of the frame bytes and the layout. It never
//! fails loudly: a frame too short for the layout yields `None`, and vitals
//! outside their bounds are still reported with `valid = false` so that
//! consumers keep one vitals entry per frame.

use crate::types::{ChannelRun, DecodedRecord, Frame, FrameLayout, Vitals};

/// Decode one frame.
///
/// Returns `None` when the frame is shorter than [`FrameLayout::minimum_length`].
pub fn decode(frame: &Frame, layout: &FrameLayout) -> Option<DecodedRecord> {
    decode_bytes(frame.data(), layout)
}

/// Decode a frame given as plain bytes.
pub fn decode_bytes(data: &[u8], layout: &FrameLayout) -> Option<DecodedRecord> {
    if data.len() < layout.minimum_length() {
        return None;
    }

    let channels = layout
        .channels
        .iter()
        .map(|channel| ChannelRun {
            channel: channel.name.clone(),
            // inverted ranges only reach here through an unvalidated layout
            values: channel.extract(data).unwrap_or_default(),
        })
        .collect();

    let vitals = layout.vitals.as_ref().and_then(|vitals| {
        let spo2 = *data.get(vitals.spo2_offset)?;
        let pulse = *data.get(vitals.pulse_offset)?;
        let valid = vitals.bounds.spo2.contains(spo2) && vitals.bounds.pulse.contains(pulse);
        Some(Vitals { spo2, pulse, valid })
    });

    let sequence = layout.sequence_offset.and_then(|offset| data.get(offset).copied());

    Some(DecodedRecord { channels, vitals, sequence })
}

/// Holds a validated layout and decodes frames against it.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    layout: FrameLayout,
    minimum_length: usize,
}

impl FrameDecoder {
    /// Validate the layout and build a decoder for it.
    pub fn new(layout: FrameLayout) -> crate::Result<Self> {
        layout.validate()?;
        let minimum_length = layout.minimum_length();
        Ok(Self { layout, minimum_length })
    }

    /// Decode one frame. See [`decode`].
    pub fn decode(&self, frame: &Frame) -> Option<DecodedRecord> {
        decode(frame, &self.layout)
    }

    /// The layout in use.
    pub fn layout(&self) -> &FrameLayout {
        &self.layout
    }

    /// Shortest frame this decoder accepts.
    pub fn minimum_length(&self) -> usize {
        self.minimum_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawPacket;
    use proptest::prelude::*;

    fn short_layout() -> FrameLayout {
        FrameLayout::builder().channel("pleth", 5..15).vitals(16, 17).build().unwrap()
    }

    fn frame_with_vitals(spo2: u8, pulse: u8) -> Frame {
        let mut data = vec![170, 1, 1, 1, 1];
        data.extend([9u8; 10]);
        data.extend([0, spo2, pulse]);
        Frame::from_segments(&[RawPacket::from(data)])
    }

    #[test]
    fn decodes_waveform_and_valid_vitals() {
        let record = decode(&frame_with_vitals(98, 72), &short_layout()).unwrap();

        assert_eq!(record.channels.len(), 1);
        assert_eq!(record.channels[0].channel, "pleth");
        assert_eq!(record.channels[0].values, vec![9; 10]);
        assert_eq!(record.vitals, Some(Vitals { spo2: 98, pulse: 72, valid: true }));
        assert_eq!(record.sequence, None);
    }

    #[test]
    fn zero_spo2_is_reported_invalid() {
        let record = decode(&frame_with_vitals(0, 72), &short_layout()).unwrap();
        assert_eq!(record.vitals, Some(Vitals { spo2: 0, pulse: 72, valid: false }));
    }

    #[test]
    fn sentinel_pulse_is_reported_invalid() {
        let record = decode(&frame_with_vitals(98, 255), &short_layout()).unwrap();
        assert!(!record.vitals.unwrap().valid);

        let record = decode(&frame_with_vitals(127, 80), &short_layout()).unwrap();
        assert!(!record.vitals.unwrap().valid);
    }

    #[test]
    fn short_frame_is_not_decoded() {
        let frame = Frame::from_segments(&[RawPacket::from(vec![170; 17])]);
        assert!(decode(&frame, &short_layout()).is_none());
    }

    #[test]
    fn dual_channel_layout() {
        let mut data: Vec<u8> = (0..80).collect();
        data[0] = 170;
        data[36] = 97;
        data[37] = 61;
        let frame = Frame::from_segments(&[RawPacket::from(data)]);

        let record = decode(&frame, &FrameLayout::dual_channel()).unwrap();
        assert_eq!(record.channels[0].values, (5..35).collect::<Vec<u8>>());
        assert_eq!(record.channels[1].channel, "aux");
        assert_eq!(record.channels[1].values, (38..65).collect::<Vec<u8>>());
        assert_eq!(record.vitals, Some(Vitals { spo2: 97, pulse: 61, valid: true }));
        assert_eq!(record.sequence, Some(3));
        assert_eq!(record.sample_count(), 57);
    }

    #[test]
    fn segmented_pleth_reads_one_run_from_every_segment() {
        let segments: Vec<RawPacket> = (0..4u8)
            .map(|segment| {
                let mut packet: Vec<u8> = (0..20).map(|i| segment * 20 + i).collect();
                packet[0] = if segment == 0 { 170 } else { 1 };
                if segment == 1 {
                    packet[16] = 95;
                    packet[17] = 70;
                }
                RawPacket::from(packet)
            })
            .collect();

        let frame = Frame::from_segments(&segments);
        let record = decode(&frame, &FrameLayout::segmented_pleth()).unwrap();

        let expected: Vec<u8> = [5u8..15, 25..35, 45..55, 65..75].into_iter().flatten().collect();
        assert_eq!(record.channels.len(), 1);
        assert_eq!(record.channels[0].values, expected);
        assert_eq!(record.vitals, Some(Vitals { spo2: 95, pulse: 70, valid: true }));
    }

    #[test]
    fn segmented_frame_with_a_short_segment_is_not_decoded() {
        let mut segments = vec![RawPacket::from(vec![170u8; 20])];
        segments.extend((0..2).map(|_| RawPacket::from(vec![1u8; 20])));
        segments.push(RawPacket::from(vec![1u8; 12]));
        let frame = Frame::from_segments(&segments);
        assert!(decode(&frame, &FrameLayout::segmented_pleth()).is_none());
    }

    #[test]
    fn waveform_only_layout_has_no_vitals() {
        let layout = FrameLayout::builder().channel("pleth", 1..4).build().unwrap();
        let frame = Frame::from_segments(&[RawPacket::from([170, 5, 6, 7])]);
        let record = decode(&frame, &layout).unwrap();
        assert_eq!(record.vitals, None);
        assert_eq!(record.channels[0].values, vec![5, 6, 7]);
    }

    #[test]
    fn decoder_rejects_invalid_layout() {
        let layout = FrameLayout { channels: vec![], vitals: None, sequence_offset: None };
        assert!(FrameDecoder::new(layout).is_err());
    }

    proptest! {
        #[test]
        fn validity_matches_exclusive_bounds(spo2 in any::<u8>(), pulse in any::<u8>()) {
            let record = decode(&frame_with_vitals(spo2, pulse), &short_layout()).unwrap();
            let vitals = record.vitals.unwrap();
            let expected = 0 < spo2 && spo2 < 127 && 0 < pulse && pulse < 255;
            prop_assert_eq!(vitals.valid, expected);
            prop_assert_eq!(vitals.spo2, spo2);
            prop_assert_eq!(vitals.pulse, pulse);
        }

        #[test]
        fn any_frame_at_least_minimum_length_decodes(extra in prop::collection::vec(any::<u8>(), 0..40)) {
            let layout = FrameLayout::dual_channel();
            let mut data = vec![170u8; layout.minimum_length()];
            data.extend(extra);
            let frame = Frame::from_segments(&[RawPacket::from(data)]);
            let record = decode(&frame, &layout);
            prop_assert!(record.is_some());
            prop_assert_eq!(record.unwrap().sample_count(), 57);
        }
    }
}
