//! Binary frame format for live streams
//!
//! A frame is a fixed 24-byte little-endian header followed by the samples
//! as IEEE-754 `f32` values in row-major order:
//!
//! | offset | type | field |
//! |---|---|---|
//! | 0 | f64 | timestamp (seconds) |
//! | 8 | f32 | duration (seconds) |
//! | 12 | u32 | sampling rate (Hz) |
//! | 16 | u32 | samples |
//! | 20 | u32 | channels |

use bsp_core::{config_error, BspError, BspResult, TimeSeriesBuffer};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::warn;

pub const HEADER_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameHeader {
    pub timestamp: f64,
    pub duration: f32,
    pub sampling_rate: u32,
    pub samples: u32,
    pub channels: u32,
}

impl FrameHeader {
    /// Payload size in bytes, `None` if the declared shape overflows
    pub fn payload_len(&self) -> Option<usize> {
        (self.samples as usize)
            .checked_mul(self.channels as usize)?
            .checked_mul(4)
    }

    pub fn frame_len(&self) -> Option<usize> {
        self.payload_len()?.checked_add(HEADER_LEN)
    }

    pub fn read(bytes: &[u8]) -> BspResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(BspError::Decode {
                reason: format!("frame of {} bytes is shorter than the {}-byte header", bytes.len(), HEADER_LEN),
            });
        }
        let mut cursor = Cursor::new(&bytes[..HEADER_LEN]);
        Ok(Self {
            timestamp: cursor.read_f64::<LittleEndian>()?,
            duration: cursor.read_f32::<LittleEndian>()?,
            sampling_rate: cursor.read_u32::<LittleEndian>()?,
            samples: cursor.read_u32::<LittleEndian>()?,
            channels: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> BspResult<()> {
        out.write_f64::<LittleEndian>(self.timestamp)?;
        out.write_f32::<LittleEndian>(self.duration)?;
        out.write_u32::<LittleEndian>(self.sampling_rate)?;
        out.write_u32::<LittleEndian>(self.samples)?;
        out.write_u32::<LittleEndian>(self.channels)?;
        Ok(())
    }
}

/// Serialise a buffer into one frame
///
/// The wire carries the sampling rate as an integer, so buffers sampled at
/// a fractional frequency are rejected.
pub fn encode(buffer: &TimeSeriesBuffer, timestamp: f64) -> BspResult<Vec<u8>> {
    let frequency = buffer.frequency();
    if frequency.fract() != 0.0 || frequency > u32::MAX as f64 {
        return Err(config_error!(
            "frequency {}Hz cannot be carried in a frame header",
            frequency
        ));
    }

    let header = FrameHeader {
        timestamp,
        duration: buffer.duration() as f32,
        sampling_rate: frequency as u32,
        samples: buffer.samples() as u32,
        channels: buffer.channels() as u32,
    };

    let mut out = Vec::with_capacity(header.frame_len().unwrap_or(HEADER_LEN));
    header.write(&mut out)?;
    buffer.with_values(|values| -> BspResult<()> {
        for value in values {
            out.write_f32::<LittleEndian>(*value)?;
        }
        Ok(())
    })?;
    Ok(out)
}

/// Decode a frame into its header and a buffer with default column labels
pub fn decode_frame(bytes: &[u8]) -> BspResult<(FrameHeader, TimeSeriesBuffer)> {
    let header = FrameHeader::read(bytes)?;
    if header.channels == 0 || header.sampling_rate == 0 {
        return Err(BspError::Decode {
            reason: format!(
                "header declares {} channels at {}Hz",
                header.channels, header.sampling_rate
            ),
        });
    }

    let payload_len = header.payload_len().ok_or_else(|| BspError::Decode {
        reason: format!(
            "header declares {}x{} samples, more than can be addressed",
            header.samples, header.channels
        ),
    })?;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != payload_len {
        return Err(BspError::Decode {
            reason: format!(
                "header declares {}x{} samples ({} bytes), payload has {} bytes",
                header.samples,
                header.channels,
                payload_len,
                payload.len()
            ),
        });
    }

    let expected = header.samples as f64 / header.sampling_rate as f64;
    if (expected - header.duration as f64).abs() > 1e-3 {
        warn!(
            declared = header.duration,
            computed = expected,
            "Frame duration disagrees with its sample count"
        );
    }

    let mut values = vec![0.0f32; payload.len() / 4];
    LittleEndian::read_f32_into(payload, &mut values);
    let buffer = TimeSeriesBuffer::from_vec(
        values,
        header.channels as usize,
        header.sampling_rate as f64,
        None,
    )?;
    Ok((header, buffer))
}

pub fn decode(bytes: &[u8]) -> BspResult<TimeSeriesBuffer> {
    decode_frame(bytes).map(|(_, buffer)| buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn buffer() -> TimeSeriesBuffer {
        TimeSeriesBuffer::from_vec(vec![0.5, -1.0, 2.0, 3.25, -0.125, 8.0], 2, 100.0, None).unwrap()
    }

    #[test]
    fn test_header_layout() {
        let bytes = encode(&buffer(), 12.5).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + 6 * 4);
        assert_eq!(LittleEndian::read_f64(&bytes[0..8]), 12.5);
        assert_relative_eq!(LittleEndian::read_f32(&bytes[8..12]), 0.03, epsilon = 1e-6);
        assert_eq!(LittleEndian::read_u32(&bytes[12..16]), 100);
        assert_eq!(LittleEndian::read_u32(&bytes[16..20]), 3);
        assert_eq!(LittleEndian::read_u32(&bytes[20..24]), 2);
        // Second sample, first channel
        assert_eq!(LittleEndian::read_f32(&bytes[32..36]), 2.0);
    }

    #[test]
    fn test_decode_restores_values() {
        let (header, decoded) = decode_frame(&encode(&buffer(), 1.0).unwrap()).unwrap();
        assert_eq!(header.timestamp, 1.0);
        assert_eq!(decoded.shape(), (3, 2));
        assert_eq!(decoded.frequency(), 100.0);
        assert_eq!(decoded.to_vec(), buffer().to_vec());
        assert_eq!(decoded.columns()[1], "ch1");
    }

    #[test]
    fn test_decode_rejects_bad_frames() {
        assert!(matches!(decode(&[0u8; 10]), Err(BspError::Decode { .. })));

        let mut bytes = encode(&buffer(), 0.0).unwrap();
        bytes.pop();
        assert!(matches!(decode(&bytes), Err(BspError::Decode { .. })));

        let mut zero_channels = encode(&buffer(), 0.0).unwrap();
        zero_channels[20..24].copy_from_slice(&0u32.to_le_bytes());
        assert!(matches!(decode(&zero_channels), Err(BspError::Decode { .. })));
    }

    #[test]
    fn test_oversized_header_is_a_decode_error() {
        let header = FrameHeader {
            timestamp: 0.0,
            duration: 0.0,
            sampling_rate: 100,
            samples: u32::MAX,
            channels: u32::MAX,
        };
        let mut bytes = Vec::new();
        header.write(&mut bytes).unwrap();
        assert!(matches!(decode(&bytes), Err(BspError::Decode { .. })));

        let huge = FrameHeader { channels: 3, ..header };
        bytes.clear();
        huge.write(&mut bytes).unwrap();
        bytes.extend_from_slice(&[0u8; 16]);
        assert!(matches!(decode(&bytes), Err(BspError::Decode { .. })));
    }

    #[test]
    fn test_duration_mismatch_still_decodes() {
        let mut bytes = encode(&buffer(), 0.0).unwrap();
        bytes[8..12].copy_from_slice(&5.0f32.to_le_bytes());
        assert_eq!(decode(&bytes).unwrap().samples(), 3);
    }

    #[test]
    fn test_fractional_frequency_rejected() {
        let odd = TimeSeriesBuffer::from_vec(vec![0.0; 4], 1, 2.5, None).unwrap();
        assert!(matches!(encode(&odd, 0.0), Err(BspError::Configuration { .. })));
    }
}
