//! External index: per-block auxiliary metadata kept out of the main index
//! file so the hot data path stays compact.
//!
//! Each record covers one block of one (term, layer) list and stores the
//! block's max partial-BM25 score plus the max score of every chunk the list
//! owns in that block. A shared block therefore produces one record per
//! owning list. The lexicon references records by a running offset.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct BlockScores {
    pub block_max_score: f32,
    pub chunk_scores: Vec<f32>,
}

pub struct ExternalIndexWriter {
    writer: BufWriter<File>,
    num_records: u32,
}

impl ExternalIndexWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        // Record count backpatched on finalize.
        writer.write_u32::<LittleEndian>(0)?;
        Ok(Self {
            writer,
            num_records: 0,
        })
    }

    /// The offset the next record will occupy; recorded in the lexicon at
    /// the start of each layer.
    pub fn current_offset(&self) -> u32 {
        self.num_records
    }

    pub fn add_block(&mut self, block_max_score: f32, chunk_scores: &[f32]) -> Result<()> {
        self.writer.write_f32::<LittleEndian>(block_max_score)?;
        self.writer
            .write_u32::<LittleEndian>(chunk_scores.len() as u32)?;
        for &score in chunk_scores {
            self.writer.write_f32::<LittleEndian>(score)?;
        }
        self.num_records += 1;
        Ok(())
    }

    pub fn finalize(mut self) -> Result<u32> {
        use std::io::Seek;
        self.writer.flush()?;
        let num_records = self.num_records;
        let mut file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.seek(std::io::SeekFrom::Start(0))?;
        file.write_all(&num_records.to_le_bytes())?;
        file.flush()?;
        Ok(num_records)
    }
}

pub struct ExternalIndexReader {
    records: Vec<BlockScores>,
}

impl ExternalIndexReader {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let num_records = reader.read_u32::<LittleEndian>()? as usize;
        let mut records = Vec::with_capacity(num_records);
        for _ in 0..num_records {
            let block_max_score = reader.read_f32::<LittleEndian>()?;
            let num_chunks = reader.read_u32::<LittleEndian>()? as usize;
            if num_chunks > crate::cache::BLOCK_WORDS {
                return Err(Error::Corruption(format!(
                    "external index record declares {} chunks",
                    num_chunks
                )));
            }
            let mut chunk_scores = Vec::with_capacity(num_chunks);
            for _ in 0..num_chunks {
                chunk_scores.push(reader.read_f32::<LittleEndian>()?);
            }
            records.push(BlockScores {
                block_max_score,
                chunk_scores,
            });
        }
        Ok(Self { records })
    }

    pub fn block(&self, offset: u32) -> Result<&BlockScores> {
        self.records.get(offset as usize).ok_or_else(|| {
            Error::Corruption(format!("external index offset {} out of range", offset))
        })
    }

    pub fn num_records(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.ext");

        let mut writer = ExternalIndexWriter::create(&path).unwrap();
        assert_eq!(writer.current_offset(), 0);
        writer.add_block(3.5, &[3.5, 1.0]).unwrap();
        assert_eq!(writer.current_offset(), 1);
        writer.add_block(0.75, &[0.25, 0.75, 0.5]).unwrap();
        assert_eq!(writer.finalize().unwrap(), 2);

        let reader = ExternalIndexReader::load(&path).unwrap();
        assert_eq!(reader.num_records(), 2);
        let first = reader.block(0).unwrap();
        assert_eq!(first.block_max_score, 3.5);
        assert_eq!(first.chunk_scores, vec![3.5, 1.0]);
        let second = reader.block(1).unwrap();
        assert_eq!(second.chunk_scores.len(), 3);
        assert!(reader.block(2).is_err());
    }
}
