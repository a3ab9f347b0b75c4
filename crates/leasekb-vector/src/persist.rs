//! Versioned binary persistence.
//!
//! ```text
//! Offset  Size           Field
//! ──────────────────────────────────────────────────────────
//! 0x00    4              Magic "LKBV"
//! 0x04    4   u32 LE     Format version (1)
//! 0x08    4   u32 LE     D: dimension
//! 0x0C    8   u64 LE     N: record count
//! 0x14    N*D*4          Vectors, f32 LE, row-major
//! ...     N * (4 + len)  Texts: u32 LE byte length + UTF-8
//! ...     8 + len        Metadata: u64 LE byte length + JSON object
//!                        {"<position>": {...}} (section optional)
//! ```
//!
//! Every save rewrites the whole file via a temp file + rename.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use leasekb_core::Metadata;
use leasekb_core::error::{KbError, Result};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use crate::store::{RecordId, VectorStore};

/// Magic bytes identifying a LeaseKB vector store file.
pub const MAGIC: [u8; 4] = *b"LKBV";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Header size in bytes: 4 (magic) + 4 (version) + 4 (dim) + 8 (count).
pub const HEADER_SIZE: usize = 20;

impl VectorStore {
    /// Create a store from a persisted file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut store = Self::new();
        store.load(path)?;
        Ok(store)
    }

    /// Write the whole store to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = temp_path(path);
        {
            let file = std::fs::File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            self.write_to(&mut writer)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        if let Err(e) = std::fs::rename(&tmp, path) {
            std::fs::remove_file(&tmp).ok();
            return Err(e.into());
        }

        tracing::info!("💾 Saved vector store ({} records) to {}", self.len(), path.display());
        Ok(())
    }

    /// Replace the in-memory state with the contents of `path`.
    /// On failure the current state is left untouched.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(KbError::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        *self = Self::from_bytes(&bytes)?;

        tracing::info!(
            "📂 Loaded vector store from {}: {} records, dim {}",
            path.display(),
            self.len(),
            self.dimension()
        );
        Ok(())
    }

    /// Serialize into any writer.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let dim = u32::try_from(self.dimension())
            .map_err(|_| KbError::DimensionMismatch("dimension exceeds u32".into()))?;

        w.write_all(&MAGIC)?;
        w.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        w.write_u32::<LittleEndian>(dim)?;
        w.write_u64::<LittleEndian>(self.len() as u64)?;

        for &x in &self.vectors {
            w.write_f32::<LittleEndian>(x)?;
        }

        for text in &self.texts {
            let len = u32::try_from(text.len())
                .map_err(|_| KbError::CorruptData("text longer than 4 GiB".into()))?;
            w.write_u32::<LittleEndian>(len)?;
            w.write_all(text.as_bytes())?;
        }

        let by_position: BTreeMap<String, &Metadata> = self
            .ids
            .iter()
            .enumerate()
            .filter_map(|(pos, id)| self.metadata.get(id).map(|m| (pos.to_string(), m)))
            .collect();
        let json = serde_json::to_vec(&by_position)
            .map_err(|e| KbError::CorruptData(format!("metadata serialization: {e}")))?;
        w.write_u64::<LittleEndian>(json.len() as u64)?;
        w.write_all(&json)?;
        Ok(())
    }

    /// Parse a complete blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let total = bytes.len() as u64;
        let mut r = Cursor::new(bytes);

        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).map_err(truncated("magic"))?;
        if magic != MAGIC {
            return Err(KbError::CorruptData(format!(
                "invalid magic {magic:02X?} (expected {MAGIC:02X?})"
            )));
        }

        let version = r.read_u32::<LittleEndian>().map_err(truncated("version"))?;
        if version != FORMAT_VERSION {
            return Err(KbError::CorruptData(format!(
                "unsupported format version {version} (expected {FORMAT_VERSION})"
            )));
        }

        let dimension = r.read_u32::<LittleEndian>().map_err(truncated("dimension"))? as usize;
        let count = r.read_u64::<LittleEndian>().map_err(truncated("count"))?;

        if count > 0 && dimension == 0 {
            return Err(KbError::CorruptData(format!(
                "{count} records declared with dimension 0"
            )));
        }

        // Bound allocations by what the file can actually hold
        let floats = count
            .checked_mul(dimension as u64)
            .filter(|n| n.saturating_mul(4) <= total - r.position())
            .ok_or_else(|| {
                KbError::CorruptData(format!(
                    "header declares {count} x {dimension} vectors, file holds {total} bytes"
                ))
            })?;

        let mut vectors = vec![0f32; floats as usize];
        r.read_f32_into::<LittleEndian>(&mut vectors)
            .map_err(truncated("vectors"))?;

        let count = count as usize;
        let mut texts = Vec::with_capacity(count);
        for i in 0..count {
            let len = r.read_u32::<LittleEndian>().map_err(truncated("text length"))? as usize;
            if len as u64 > total - r.position() {
                return Err(KbError::CorruptData(format!("text {i} runs past end of file")));
            }
            let mut buf = vec![0u8; len];
            r.read_exact(&mut buf).map_err(truncated("text"))?;
            let text = String::from_utf8(buf)
                .map_err(|e| KbError::CorruptData(format!("text {i} is not UTF-8: {e}")))?;
            texts.push(text);
        }

        let ids: Vec<RecordId> = (0..count as u64).map(RecordId).collect();
        let mut metadata = HashMap::new();

        // Metadata section is optional: a clean end of file here means none
        if r.position() < total {
            let len = r.read_u64::<LittleEndian>().map_err(truncated("metadata length"))?;
            if len > total - r.position() {
                return Err(KbError::CorruptData("metadata runs past end of file".into()));
            }
            let mut buf = vec![0u8; len as usize];
            r.read_exact(&mut buf).map_err(truncated("metadata"))?;
            let parsed: BTreeMap<String, serde_json::Value> = serde_json::from_slice(&buf)
                .map_err(|e| KbError::CorruptData(format!("metadata JSON: {e}")))?;

            for (key, value) in parsed {
                let pos: usize = key
                    .parse()
                    .map_err(|_| KbError::CorruptData(format!("metadata key '{key}' is not a position")))?;
                if pos >= count {
                    return Err(KbError::CorruptData(format!(
                        "metadata for position {pos} but only {count} records"
                    )));
                }
                let serde_json::Value::Object(map) = value else {
                    return Err(KbError::CorruptData(format!(
                        "metadata for position {pos} is not an object"
                    )));
                };
                metadata.insert(ids[pos], map);
            }

            if r.position() != total {
                return Err(KbError::CorruptData(format!(
                    "{} trailing bytes after metadata",
                    total - r.position()
                )));
            }
        }

        Ok(Self {
            dimension: if count == 0 { 0 } else { dimension },
            vectors,
            texts,
            ids,
            metadata,
            next_id: count as u64,
        })
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn truncated(section: &'static str) -> impl Fn(std::io::Error) -> KbError {
    move |e| KbError::CorruptData(format!("truncated {section}: {e}"))
}
