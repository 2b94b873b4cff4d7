//! Simple-16 word-aligned coding: each u32 word carries a 4-bit selector and
//! 28 data bits holding between 1 and 28 integers, chosen greedily. Values
//! must fit in 28 bits.

use crate::error::{Error, Result};

use super::Codec;

/// Per-selector bit widths, one entry per packed integer.
const CASES: [&[u8]; 16] = [
    &[1; 28],
    &[2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1],
    &[1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2, 1, 1, 1, 1, 1, 1, 1],
    &[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 2, 2],
    &[2; 14],
    &[4, 3, 3, 3, 3, 3, 3, 3, 3],
    &[3, 4, 4, 4, 4, 3, 3, 3],
    &[4; 7],
    &[5, 5, 5, 5, 4, 4],
    &[4, 4, 5, 5, 5, 5],
    &[6, 6, 6, 5, 5],
    &[5, 5, 6, 6, 6],
    &[7; 4],
    &[10, 9, 9],
    &[14, 14],
    &[28],
];

pub struct Simple16;

impl Codec for Simple16 {
    fn name(&self) -> &'static str {
        "s16"
    }

    fn block_size(&self) -> usize {
        0
    }

    fn encode(&self, input: &[u32], out: &mut [u32]) -> Result<usize> {
        let mut pos = 0usize;
        let mut words = 0usize;
        while pos < input.len() {
            let mut packed = None;
            for (selector, widths) in CASES.iter().enumerate() {
                if fits(&input[pos..], widths) {
                    let mut word = (selector as u32) << 28;
                    let mut bit = 0u32;
                    for (j, &width) in widths.iter().enumerate() {
                        let value = input.get(pos + j).copied().unwrap_or(0);
                        word |= value << bit;
                        bit += width as u32;
                    }
                    packed = Some((word, widths.len().min(input.len() - pos)));
                    break;
                }
            }
            let (word, taken) = packed.ok_or_else(|| {
                Error::Corruption("value exceeds the 28-bit Simple-16 range".to_string())
            })?;
            if words >= out.len() {
                return Err(Error::Corruption(
                    "s16 encode output buffer too small".to_string(),
                ));
            }
            out[words] = word;
            words += 1;
            pos += taken;
        }
        Ok(words)
    }

    fn decode(&self, input: &[u32], out: &mut [u32], n: usize) -> Result<usize> {
        let mut count = 0usize;
        let mut words = 0usize;
        while count < n {
            if words >= input.len() {
                return Err(Error::Corruption(
                    "s16 input exhausted before all integers decoded".to_string(),
                ));
            }
            let word = input[words];
            words += 1;
            let widths = CASES[(word >> 28) as usize];
            let mut bit = 0u32;
            for &width in widths {
                if count == n {
                    break;
                }
                out[count] = (word >> bit) & ((1u32 << width) - 1);
                count += 1;
                bit += width as u32;
            }
        }
        Ok(words)
    }
}

/// A case fits when every remaining real value (zero-padded past the end)
/// fits its slot's width.
fn fits(values: &[u32], widths: &[u8]) -> bool {
    for (j, &width) in widths.iter().enumerate() {
        let Some(&value) = values.get(j) else {
            return true;
        };
        if width < 32 && value >= (1u32 << width) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_small_values() {
        let codec = Simple16;
        let input = [1u32; 56];
        let mut encoded = [0u32; 8];
        let written = codec.encode(&input, &mut encoded).unwrap();
        assert_eq!(written, 2); // 28 one-bit values per word

        let mut decoded = [0u32; 56];
        let consumed = codec.decode(&encoded, &mut decoded, 56).unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_mixed_widths() {
        let codec = Simple16;
        let input: Vec<u32> = (0..100).map(|i| (i * i) % 4000).collect();
        let mut encoded = vec![0u32; 128];
        let written = codec.encode(&input, &mut encoded).unwrap();
        let mut decoded = vec![0u32; 100];
        let consumed = codec.decode(&encoded, &mut decoded, 100).unwrap();
        assert_eq!(written, consumed);
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_value_too_wide() {
        let codec = Simple16;
        let mut encoded = [0u32; 4];
        assert!(codec.encode(&[1 << 28], &mut encoded).is_err());
        assert!(codec.encode(&[(1 << 28) - 1], &mut encoded).is_ok());
    }
}
