//! Document map: docID → document length and URL.
//!
//! When the meta file says the index is remapped, the `url_sorted_doc_id_mapping`
//! table is loaded alongside and applied on every lookup so the remapped
//! docIDs resolve to the right lengths and URLs.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

pub const REMAPPING_FILENAME: &str = "url_sorted_doc_id_mapping";

#[derive(Debug, Default)]
pub struct DocumentMap {
    doc_lens: Vec<u32>,
    urls: Vec<String>,
    remapping: Option<Vec<u32>>,
}

impl DocumentMap {
    pub fn write(path: impl AsRef<Path>, doc_lens: &[u32], urls: &[String]) -> Result<()> {
        assert_eq!(doc_lens.len(), urls.len());
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        writer.write_u32::<LittleEndian>(doc_lens.len() as u32)?;
        for &len in doc_lens {
            writer.write_u32::<LittleEndian>(len)?;
        }
        for url in urls {
            writer.write_u32::<LittleEndian>(url.len() as u32)?;
            writer.write_all(url.as_bytes())?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>, remapping_path: Option<&Path>) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path.as_ref())?);
        let num_docs = reader.read_u32::<LittleEndian>()? as usize;
        let mut doc_lens = Vec::with_capacity(num_docs);
        for _ in 0..num_docs {
            doc_lens.push(reader.read_u32::<LittleEndian>()?);
        }
        let mut urls = Vec::with_capacity(num_docs);
        for _ in 0..num_docs {
            let len = reader.read_u32::<LittleEndian>()? as usize;
            let mut bytes = vec![0u8; len];
            reader.read_exact(&mut bytes)?;
            urls.push(String::from_utf8(bytes).map_err(|_| {
                Error::Corruption("document map URL is not valid UTF-8".to_string())
            })?);
        }

        let remapping = match remapping_path {
            Some(path) => {
                let mut reader = BufReader::new(File::open(path)?);
                let mut mapping = Vec::with_capacity(num_docs);
                for _ in 0..num_docs {
                    let target = reader.read_u32::<LittleEndian>()?;
                    if target as usize >= num_docs {
                        return Err(Error::Corruption(format!(
                            "docID remapping target {} out of range",
                            target
                        )));
                    }
                    mapping.push(target);
                }
                Some(mapping)
            }
            None => None,
        };

        Ok(Self {
            doc_lens,
            urls,
            remapping,
        })
    }

    fn resolve(&self, doc_id: u32) -> usize {
        match &self.remapping {
            Some(mapping) => mapping[doc_id as usize] as usize,
            None => doc_id as usize,
        }
    }

    pub fn doc_len(&self, doc_id: u32) -> u32 {
        self.doc_lens[self.resolve(doc_id)]
    }

    pub fn doc_url(&self, doc_id: u32) -> &str {
        &self.urls[self.resolve(doc_id)]
    }

    pub fn num_docs(&self) -> u32 {
        self.doc_lens.len() as u32
    }

    pub fn total_doc_lengths(&self) -> u64 {
        self.doc_lens.iter().map(|&l| l as u64).sum()
    }

    pub fn avg_doc_len(&self) -> f32 {
        if self.doc_lens.is_empty() {
            0.0
        } else {
            self.total_doc_lengths() as f32 / self.doc_lens.len() as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.dmap");
        let lens = vec![3u32, 2, 7];
        let urls = vec![
            "http://a.example".to_string(),
            "http://b.example".to_string(),
            "http://c.example".to_string(),
        ];
        DocumentMap::write(&path, &lens, &urls).unwrap();

        let map = DocumentMap::load(&path, None).unwrap();
        assert_eq!(map.num_docs(), 3);
        assert_eq!(map.doc_len(1), 2);
        assert_eq!(map.doc_url(2), "http://c.example");
        assert_eq!(map.avg_doc_len(), 4.0);
    }

    #[test]
    fn test_remapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.dmap");
        let remap_path = dir.path().join(REMAPPING_FILENAME);
        DocumentMap::write(&path, &[10, 20], &["a".to_string(), "b".to_string()]).unwrap();
        std::fs::write(
            &remap_path,
            [1u32.to_le_bytes(), 0u32.to_le_bytes()].concat(),
        )
        .unwrap();

        let map = DocumentMap::load(&path, Some(&remap_path)).unwrap();
        assert_eq!(map.doc_len(0), 20);
        assert_eq!(map.doc_url(1), "a");
    }
}
