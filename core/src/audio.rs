use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Number of channels.
    pub channels: u16,
    /// 8000 to 48000 are valid.
    pub sample_rate: u32,
}

impl AudioFormat {
    pub const fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub format: AudioFormat,
    pub samples: Vec<i16>,
}

pub fn to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut result = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        result.extend_from_slice(&sample.to_le_bytes());
    }
    result
}

pub fn from_le_bytes(bytes: impl AsRef<[u8]>) -> Vec<i16> {
    bytes
        .as_ref()
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn le_bytes_roundtrip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN];
        let bytes = to_le_bytes(&samples);
        assert_eq!(from_le_bytes(bytes), samples);
    }

    #[test]
    fn trailing_odd_byte_is_dropped() {
        let samples = from_le_bytes([0x01, 0x00, 0xff]);
        assert_eq!(samples, vec![1]);
    }
}
