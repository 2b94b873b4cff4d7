//! Rice coding: quotient in unary, remainder in a fixed number of bits. The
//! divisor exponent is chosen from the mean of the batch, clamped so that no
//! quotient exceeds 64 bits of unary, and stored in the leading word.

use crate::error::{Error, Result};

use super::Codec;

pub struct Rice;

impl Codec for Rice {
    fn name(&self) -> &'static str {
        "rice"
    }

    fn block_size(&self) -> usize {
        0
    }

    fn encode(&self, input: &[u32], out: &mut [u32]) -> Result<usize> {
        if input.is_empty() {
            return Ok(0);
        }
        let b = rice_parameter(input);
        if out.is_empty() {
            return Err(Error::Corruption(
                "rice encode output buffer too small".to_string(),
            ));
        }
        out[0] = b;
        let mut writer = BitWriter::new(&mut out[1..]);
        for &value in input {
            let q = value >> b;
            writer.put_unary(q)?;
            writer.put_bits(value, b)?;
        }
        Ok(1 + writer.words_used())
    }

    fn decode(&self, input: &[u32], out: &mut [u32], n: usize) -> Result<usize> {
        if n == 0 {
            return Ok(0);
        }
        if input.is_empty() {
            return Err(Error::Corruption("rice input missing header".to_string()));
        }
        let b = input[0];
        if b > 31 {
            return Err(Error::Corruption(format!(
                "rice parameter {} out of range",
                b
            )));
        }
        let mut reader = BitReader::new(&input[1..]);
        for slot in out.iter_mut().take(n) {
            let q = reader.get_unary()?;
            let r = reader.get_bits(b)?;
            *slot = q
                .checked_shl(b)
                .and_then(|shifted| shifted.checked_add(r))
                .ok_or_else(|| Error::Corruption("rice value overflows u32".to_string()))?;
        }
        Ok(1 + reader.words_used())
    }
}

fn rice_parameter(input: &[u32]) -> u32 {
    let sum: u64 = input.iter().map(|&v| v as u64).sum();
    let mean = sum / input.len() as u64;
    let from_mean = 64 - (mean + 1).leading_zeros() as u32 - 1;
    // Bound the unary quotient of the largest value to 64 bits.
    let max = input.iter().copied().max().unwrap_or(0);
    let max_bits = 32 - max.leading_zeros();
    let floor = max_bits.saturating_sub(6);
    from_mean.max(floor).min(31)
}

struct BitWriter<'a> {
    out: &'a mut [u32],
    bit_pos: usize,
}

impl<'a> BitWriter<'a> {
    fn new(out: &'a mut [u32]) -> Self {
        Self { out, bit_pos: 0 }
    }

    fn put_bit(&mut self, bit: u32) -> Result<()> {
        let word = self.bit_pos / 32;
        if word >= self.out.len() {
            return Err(Error::Corruption(
                "rice encode output buffer too small".to_string(),
            ));
        }
        if self.bit_pos % 32 == 0 {
            self.out[word] = 0;
        }
        self.out[word] |= bit << (self.bit_pos % 32);
        self.bit_pos += 1;
        Ok(())
    }

    fn put_unary(&mut self, q: u32) -> Result<()> {
        for _ in 0..q {
            self.put_bit(1)?;
        }
        self.put_bit(0)
    }

    fn put_bits(&mut self, value: u32, count: u32) -> Result<()> {
        for i in 0..count {
            self.put_bit((value >> i) & 1)?;
        }
        Ok(())
    }

    fn words_used(&self) -> usize {
        self.bit_pos.div_ceil(32)
    }
}

struct BitReader<'a> {
    input: &'a [u32],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(input: &'a [u32]) -> Self {
        Self { input, bit_pos: 0 }
    }

    fn get_bit(&mut self) -> Result<u32> {
        let word = self.bit_pos / 32;
        if word >= self.input.len() {
            return Err(Error::Corruption(
                "rice input exhausted before all integers decoded".to_string(),
            ));
        }
        let bit = (self.input[word] >> (self.bit_pos % 32)) & 1;
        self.bit_pos += 1;
        Ok(bit)
    }

    fn get_unary(&mut self) -> Result<u32> {
        let mut q = 0u32;
        while self.get_bit()? == 1 {
            q += 1;
            if q > 64 {
                return Err(Error::Corruption("rice unary run too long".to_string()));
            }
        }
        Ok(q)
    }

    fn get_bits(&mut self, count: u32) -> Result<u32> {
        let mut value = 0u32;
        for i in 0..count {
            value |= self.get_bit()? << i;
        }
        Ok(value)
    }

    fn words_used(&self) -> usize {
        self.bit_pos.div_ceil(32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_uniform() {
        let codec = Rice;
        let input: Vec<u32> = (0..200).map(|i| 30 + i % 17).collect();
        let mut encoded = vec![0u32; 512];
        let written = codec.encode(&input, &mut encoded).unwrap();
        let mut decoded = vec![0u32; 200];
        let consumed = codec.decode(&encoded, &mut decoded, 200).unwrap();
        assert_eq!(written, consumed);
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_roundtrip_outliers() {
        let codec = Rice;
        let input = [1u32, 2, 1, 4_000_000_000, 3, 1];
        let mut encoded = vec![0u32; 256];
        codec.encode(&input, &mut encoded).unwrap();
        let mut decoded = [0u32; 6];
        codec.decode(&encoded, &mut decoded, 6).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_truncated_input() {
        let codec = Rice;
        let input: Vec<u32> = (0..64).map(|i| i * 100).collect();
        let mut encoded = vec![0u32; 256];
        let written = codec.encode(&input, &mut encoded).unwrap();
        let mut decoded = [0u32; 64];
        assert!(codec
            .decode(&encoded[..written - 1], &mut decoded, 64)
            .is_err());
    }
}
