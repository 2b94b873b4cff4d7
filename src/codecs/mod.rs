//! Integer-array compression codecs.
//!
//! Codecs operate on `u32` slices at word granularity so chunk payloads can
//! concatenate independently compressed streams and decode them back-to-back:
//! `decode` reports how many input words it consumed, which is exactly where
//! the next stream begins.
//!
//! A codec may declare a nonzero `block_size`, in which case its encoder only
//! accepts inputs whose length is a multiple of that size. [`CodingScheme`]
//! wraps a primary codec together with an optional "leftover" codec for the
//! unpadded tail and handles the padding rules, so callers size their decode
//! buffers with [`CodingScheme::upper_bound`].

mod pfor;
mod rice;
mod simple16;
mod vbyte;

pub use pfor::PForDelta;
pub use rice::Rice;
pub use simple16::Simple16;
pub use vbyte::VByte;

use crate::error::{Error, Result};

pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;

    /// 0 means the codec accepts any input length. Otherwise the encoder
    /// requires `input.len() % block_size() == 0`.
    fn block_size(&self) -> usize;

    /// Compresses `input` into `out`, returning the number of words written.
    fn encode(&self, input: &[u32], out: &mut [u32]) -> Result<usize>;

    /// Decompresses `n` integers from `input` into `out`, returning the
    /// number of input words consumed. Fails loudly if fewer than `n`
    /// integers can be reconstructed.
    fn decode(&self, input: &[u32], out: &mut [u32], n: usize) -> Result<usize>;
}

/// A primary codec paired with an optional leftover codec for the tail of a
/// stream that doesn't fill the primary's block size.
pub struct CodingScheme {
    primary: Box<dyn Codec>,
    leftover: Option<Box<dyn Codec>>,
}

impl CodingScheme {
    pub fn new(primary: Box<dyn Codec>, leftover: Option<Box<dyn Codec>>) -> Self {
        Self { primary, leftover }
    }

    pub fn name(&self) -> &'static str {
        self.primary.name()
    }

    pub fn block_size(&self) -> usize {
        self.primary.block_size()
    }

    /// Rounds `n` up to the primary codec's block size. Decode buffers must
    /// be at least this large, since a blockwise codec writes whole blocks.
    pub fn upper_bound(&self, n: usize) -> usize {
        let b = self.primary.block_size();
        if b == 0 || n % b == 0 {
            n
        } else {
            (n / b + 1) * b
        }
    }

    /// Encodes `input`, applying the padding rules: full blocks go through
    /// the primary codec; a tail goes through the leftover codec when one is
    /// configured, and is otherwise zero-padded to a full block.
    pub fn encode(&self, input: &[u32], out: &mut [u32]) -> Result<usize> {
        let b = self.primary.block_size();
        if b == 0 || input.len() % b == 0 {
            return self.primary.encode(input, out);
        }
        let full = input.len() / b * b;
        let mut written = if full > 0 {
            self.primary.encode(&input[..full], out)?
        } else {
            0
        };
        let tail = &input[full..];
        match &self.leftover {
            Some(leftover) => {
                written += leftover.encode(tail, &mut out[written..])?;
            }
            None => {
                let mut padded = vec![0u32; b];
                padded[..tail.len()].copy_from_slice(tail);
                written += self.primary.encode(&padded, &mut out[written..])?;
            }
        }
        Ok(written)
    }

    /// Decodes `n` logical integers, returning the words consumed. `out`
    /// must hold at least `upper_bound(n)` words.
    pub fn decode(&self, input: &[u32], out: &mut [u32], n: usize) -> Result<usize> {
        let b = self.primary.block_size();
        if b == 0 || n % b == 0 {
            return self.primary.decode(input, out, n);
        }
        let full = n / b * b;
        let mut consumed = if full > 0 {
            self.primary.decode(input, out, full)?
        } else {
            0
        };
        let tail = n - full;
        match &self.leftover {
            Some(leftover) => {
                consumed += leftover.decode(&input[consumed..], &mut out[full..], tail)?;
            }
            None => {
                // The encoder padded the tail to a full block.
                consumed += self.primary.decode(&input[consumed..], &mut out[full..], b)?;
            }
        }
        Ok(consumed)
    }
}

/// Looks up a coding scheme by its persisted name.
pub fn coding_scheme(name: &str) -> Result<CodingScheme> {
    match name {
        "vbyte" => Ok(CodingScheme::new(Box::new(VByte), None)),
        "s16" => Ok(CodingScheme::new(Box::new(Simple16), None)),
        "rice" => Ok(CodingScheme::new(Box::new(Rice), None)),
        "pfor" => Ok(CodingScheme::new(
            Box::new(PForDelta),
            Some(Box::new(Simple16)),
        )),
        _ => Err(Error::Config(format!("unrecognized codec name '{}'", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(scheme: &CodingScheme, input: &[u32]) {
        let mut encoded = vec![0u32; input.len() * 3 + 64];
        let written = scheme.encode(input, &mut encoded).unwrap();
        let mut decoded = vec![0u32; scheme.upper_bound(input.len())];
        let consumed = scheme.decode(&encoded, &mut decoded, input.len()).unwrap();
        assert_eq!(written, consumed, "encode/decode word counts must agree");
        assert_eq!(&decoded[..input.len()], input);
    }

    #[test]
    fn test_all_schemes_roundtrip() {
        let inputs: Vec<Vec<u32>> = vec![
            vec![7],
            vec![1, 1, 1, 1],
            vec![0, 5, 127, 128, 300_000, 1, 2],
            (0..128).collect(),
            (0..300).map(|i| i * 7 + 1).collect(),
            vec![u32::MAX, 0, u32::MAX / 2],
        ];
        for name in ["vbyte", "s16", "rice", "pfor"] {
            let scheme = coding_scheme(name).unwrap();
            for input in &inputs {
                if name == "s16" && input.iter().any(|&v| v >= (1 << 28)) {
                    continue;
                }
                roundtrip(&scheme, input);
            }
        }
    }

    #[test]
    fn test_padded_lengths() {
        let scheme = coding_scheme("pfor").unwrap();
        assert_eq!(scheme.upper_bound(0), 0);
        assert_eq!(scheme.upper_bound(1), 128);
        assert_eq!(scheme.upper_bound(128), 128);
        assert_eq!(scheme.upper_bound(129), 256);

        // Any length multiple of the block size must encode/decode cleanly.
        let input: Vec<u32> = (0..256).map(|i| i % 97).collect();
        roundtrip(&scheme, &input);
    }

    #[test]
    fn test_streams_are_self_delimiting() {
        // Two streams concatenated at word granularity decode back-to-back.
        let scheme = coding_scheme("vbyte").unwrap();
        let a: Vec<u32> = (0..50).map(|i| i * 3).collect();
        let b: Vec<u32> = (0..20).map(|i| i + 1000).collect();

        let mut buf = vec![0u32; 256];
        let wa = scheme.encode(&a, &mut buf).unwrap();
        let wb = scheme.encode(&b, &mut buf[wa..]).unwrap();

        let mut out = vec![0u32; 64];
        let ca = scheme.decode(&buf, &mut out, a.len()).unwrap();
        assert_eq!(ca, wa);
        assert_eq!(&out[..a.len()], &a[..]);
        let cb = scheme.decode(&buf[ca..], &mut out, b.len()).unwrap();
        assert_eq!(cb, wb);
        assert_eq!(&out[..b.len()], &b[..]);
    }

    #[test]
    fn test_unknown_codec_name() {
        assert!(coding_scheme("gzip").is_err());
    }

    #[test]
    fn test_truncated_input_fails() {
        let scheme = coding_scheme("vbyte").unwrap();
        let input: Vec<u32> = (0..100).map(|i| i + 100_000).collect();
        let mut encoded = vec![0u32; 256];
        let written = scheme.encode(&input, &mut encoded).unwrap();
        let mut decoded = vec![0u32; 128];
        assert!(scheme
            .decode(&encoded[..written / 2], &mut decoded, input.len())
            .is_err());
    }
}
