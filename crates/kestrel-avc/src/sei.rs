//! SEI parsing, limited to the tone-mapping payload the picture record
//! carries through to the output stage.

use crate::bitreader::BitReader;
use crate::error::{DecodeError, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// tone_mapping_info payload type.
pub const SEI_TONE_MAPPING: u32 = 23;

/// Parsed tone-mapping SEI (D.2.15), reduced to the resolved LUT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToneMapping {
    pub model_id: u32,
    pub coded_data_bit_depth: u8,
    pub target_bit_depth: u8,
    /// One entry per coded sample value.
    pub lut: Vec<u16>,
}

/// Scan an SEI NAL payload for a tone-mapping message; other payloads are
/// skipped.
pub fn parse_sei_tone_mapping(payload: &[u8]) -> Result<Option<ToneMapping>> {
    let mut pos = 0usize;
    while pos + 1 < payload.len() {
        let mut payload_type = 0u32;
        while pos < payload.len() && payload[pos] == 0xff {
            payload_type += 255;
            pos += 1;
        }
        if pos >= payload.len() {
            break;
        }
        payload_type += payload[pos] as u32;
        pos += 1;

        let mut payload_size = 0usize;
        while pos < payload.len() && payload[pos] == 0xff {
            payload_size += 255;
            pos += 1;
        }
        if pos >= payload.len() {
            break;
        }
        payload_size += payload[pos] as usize;
        pos += 1;

        if pos + payload_size > payload.len() {
            return Err(DecodeError::BitstreamUnderflow {
                needed: (pos + payload_size - payload.len()) * 8,
                at: pos * 8,
            });
        }

        if payload_type == SEI_TONE_MAPPING {
            let tm = parse_tone_mapping(&payload[pos..pos + payload_size])?;
            return Ok(Some(tm));
        }
        trace!(payload_type, payload_size, "skipping SEI payload");
        pos += payload_size;

        // rbsp trailing byte ends the message list.
        if pos < payload.len() && payload[pos] == 0x80 {
            break;
        }
    }
    Ok(None)
}

fn parse_tone_mapping(data: &[u8]) -> Result<ToneMapping> {
    let mut reader = BitReader::new(data);
    let _tone_map_id = reader.read_ue()?;
    let _cancel_flag = reader.read_flag()?;
    let _repetition_period = reader.read_ue()?;
    let coded_data_bit_depth = reader.read_bits(8)? as u8;
    if coded_data_bit_depth > 14 {
        return Err(DecodeError::SyntaxViolation(format!(
            "coded_data_bit_depth {} exceeds maximum 14",
            coded_data_bit_depth
        )));
    }
    let target_bit_depth = reader.read_bits(8)? as u8;
    let model_id = reader.read_ue()?;

    let coded_max = 1usize << coded_data_bit_depth;
    let target_max = (1u32 << target_bit_depth) - 1;
    let mut lut = vec![0u16; coded_max];

    match model_id {
        0 => {
            // Linear mapping with clipping.
            let min_value = reader.read_bits(32)?;
            let max_value = reader.read_bits(32)?.max(min_value + 1);
            for (i, entry) in lut.iter_mut().enumerate() {
                let v = (i as u32).clamp(min_value, max_value);
                *entry =
                    (((v - min_value) as u64 * target_max as u64) / (max_value - min_value) as u64)
                        as u16;
            }
        }
        1 => {
            // Sigmoidal model.
            let sigmoid_midpoint = reader.read_bits(32)? as f64;
            let sigmoid_width = reader.read_bits(32)?.max(1) as f64;
            for (i, entry) in lut.iter_mut().enumerate() {
                let e = (-6.0 * (i as f64 - sigmoid_midpoint) / sigmoid_width).exp();
                *entry = ((target_max as f64) / (1.0 + e) + 0.5) as u16;
            }
        }
        2 => {
            // User-defined table, one start_of_coded_interval per target
            // value; resolved to nearest-start lookup.
            let bits = ((coded_data_bit_depth as u32 + 7) >> 3) << 3;
            let mut starts = Vec::with_capacity(target_max as usize + 1);
            for _ in 0..=target_max {
                starts.push(reader.read_bits(bits as u8)?);
            }
            let mut target = 0u32;
            for (i, entry) in lut.iter_mut().enumerate() {
                while (target as usize) < starts.len() - 1 && starts[target as usize + 1] <= i as u32
                {
                    target += 1;
                }
                *entry = target as u16;
            }
        }
        3 => {
            // Piece-wise linear.
            let num_pivots = reader.read_bits(16)? as usize;
            let bits = ((coded_data_bit_depth as u32 + 7) >> 3) << 3;
            let mut pivots = vec![(0u32, 0u32)];
            for _ in 0..num_pivots {
                let coded = reader.read_bits(bits as u8)?;
                let target = reader.read_bits(bits as u8)?;
                pivots.push((coded, target));
            }
            pivots.push(((coded_max - 1) as u32, target_max));
            for (i, entry) in lut.iter_mut().enumerate() {
                let i = i as u32;
                let seg = pivots.windows(2).find(|w| i >= w[0].0 && i <= w[1].0);
                *entry = match seg {
                    Some(w) if w[1].0 > w[0].0 => (w[0].1
                        + ((i - w[0].0) as u64 * (w[1].1 - w[0].1) as u64
                            / (w[1].0 - w[0].0) as u64) as u32)
                        as u16,
                    _ => target_max as u16,
                };
            }
        }
        other => {
            return Err(DecodeError::SyntaxViolation(format!(
                "tone_map_model_id {} exceeds maximum 3",
                other
            )))
        }
    }

    Ok(ToneMapping {
        model_id,
        coded_data_bit_depth,
        target_bit_depth,
        lut,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::BitWriter;

    fn tone_mapping_payload(model: u32) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.ue(0); // tone_map_id
        w.bit(false); // cancel
        w.ue(0); // repetition
        w.bits(8, 8); // coded_data_bit_depth
        w.bits(8, 8); // target_bit_depth
        w.ue(model);
        if model == 0 {
            w.bits(16, 32); // min
            w.bits(235, 32); // max
        }
        w.rbsp_trailing();
        w.into_bytes()
    }

    #[test]
    fn test_linear_tone_mapping() {
        let body = tone_mapping_payload(0);
        let mut sei = vec![23u8, body.len() as u8];
        sei.extend_from_slice(&body);
        sei.push(0x80);
        let tm = parse_sei_tone_mapping(&sei).unwrap().unwrap();
        assert_eq!(tm.model_id, 0);
        assert_eq!(tm.lut.len(), 256);
        assert_eq!(tm.lut[0], 0);
        assert_eq!(tm.lut[16], 0);
        assert_eq!(tm.lut[235], 255);
        assert_eq!(tm.lut[255], 255);
    }

    #[test]
    fn test_other_payloads_skipped() {
        // A pic_timing payload only: nothing to return.
        let sei = vec![1u8, 2, 0xaa, 0xbb, 0x80];
        assert!(parse_sei_tone_mapping(&sei).unwrap().is_none());
    }
}
