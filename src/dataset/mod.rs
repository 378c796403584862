//! Component B: the packed sequence store.
//!
//! A `Dataset` is a persistent, checksummed catalogue of sequences that
//! live in one or more external "element" files. The dataset file
//! itself (`.esd`) never duplicates sequence content — it stores
//! `(element_id, byte_offset, length)` pointers plus enough header
//! information (line length, counts) to decode those pointers in O(1)
//! and to size the bit-packed records that follow.

pub mod page;

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::alphabet::Alphabet;
use crate::bitpack::{bits_for, read_be_u64, write_be_u64, BitPackedContainer};
use crate::error::{Result, SeedCoreError};
use page::{PackedPage, PAGE_SYMBOLS};

const ESD_MAGIC: [u8; 3] = *b"esd";
const ESD_VERSION: u64 = 3;

/// One sequence's location, supplied by an external FASTA indexer
/// (parsing FASTA itself is out of scope for this crate, per §1).
#[derive(Debug, Clone)]
pub struct DatasetEntry {
    pub id: u64,
    pub description: Option<String>,
    pub element_id: u32,
    pub file_offset: u64,
    pub length: u64,
}

#[derive(Debug, Clone)]
struct SequenceRecord {
    id: u64,
    description: Option<String>,
    element_id: u32,
    element_offset: u64,
    length: u64,
    checksum: u16,
}

/// A persistent, checksummed collection of sequences (§3).
pub struct Dataset<A: Alphabet> {
    alphabet: PhantomData<A>,
    softmask: bool,
    line_length: Option<u64>,
    element_paths: Vec<PathBuf>,
    /// sorted by id, for binary-search lookup and §4.B's "preload in
    /// on-disk order" requirement.
    records: Vec<SequenceRecord>,
    cache: SparseCache,
}

/// A fully materialized sequence (§3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub id: u64,
    pub description: Option<String>,
    pub content: Vec<u8>,
    pub checksum: u16,
}

/// Lazily materializes 4096-symbol pages, one mutex per dataset guarding
/// fills (§5: "mutex on miss; page contents immutable post-fill, read
/// lock-free" is approximated here by a single coarse mutex per
/// dataset — pages already in the map are read through a read lock of
/// the same mutex, which is simpler than per-page locking and correct
/// as long as contention stays low, appropriate for a store dominated
/// by sequential access).
struct SparseCache {
    pages: Mutex<HashMap<(u64, usize), PackedPage>>,
}

impl SparseCache {
    fn new() -> Self {
        SparseCache {
            pages: Mutex::new(HashMap::new()),
        }
    }
}

/// GCG-style position-weighted checksum (§11): running sum of
/// `(position_from_1 mod 57919 + 1) * uppercase(residue)`, truncated to
/// 14 bits. Computed over the unmasked, uppercased stream — case and
/// ambiguity don't affect it.
pub fn gcg_checksum(content: &[u8]) -> u16 {
    let mut sum: u64 = 0;
    for (i, &b) in content.iter().enumerate() {
        let pos = (i as u64 % 57919) + 1;
        sum += pos * b.to_ascii_uppercase() as u64;
    }
    (sum & 0x3FFF) as u16
}

impl<A: Alphabet> Dataset<A> {
    /// Builds a dataset from already-located entries, computing and
    /// storing each sequence's checksum by reading its byte range from
    /// the referenced element file. Fails with `DuplicateId` if two
    /// entries share an id.
    pub fn build(
        mut entries: Vec<DatasetEntry>,
        element_paths: Vec<PathBuf>,
        softmask: bool,
        line_length: Option<u64>,
    ) -> Result<Self> {
        entries.sort_by_key(|e| e.id);
        for pair in entries.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(SeedCoreError::DuplicateId { id: pair[0].id });
            }
        }

        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = element_paths
                .get(entry.element_id as usize)
                .ok_or_else(|| SeedCoreError::ModeConflict {
                    detail: format!("element_id {} out of range", entry.element_id),
                })?;
            let content = read_line_wrapped(path, entry.file_offset, entry.length, line_length)?;
            let checksum = gcg_checksum(&content);
            records.push(SequenceRecord {
                id: entry.id,
                description: entry.description,
                element_id: entry.element_id,
                element_offset: entry.file_offset,
                length: entry.length,
                checksum,
            });
        }

        Ok(Dataset {
            alphabet: PhantomData,
            softmask,
            line_length,
            element_paths,
            records,
            cache: SparseCache::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record(&self, id: u64) -> Option<&SequenceRecord> {
        self.records
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|i| &self.records[i])
    }

    /// Fetches a sequence by id, decoding through the page cache and
    /// reverifying its checksum (§8 invariant 1).
    pub fn get_sequence(&self, id: u64) -> Result<Sequence> {
        let record = self
            .record(id)
            .ok_or_else(|| SeedCoreError::ModeConflict {
                detail: format!("no sequence with id {id}"),
            })?
            .clone();

        let content = self.materialize(&record)?;
        let checksum = gcg_checksum(&content);
        if checksum != record.checksum {
            return Err(SeedCoreError::ChecksumMismatch {
                id,
                path: Some(self.element_paths[record.element_id as usize].clone()),
                expected: record.checksum,
                found: checksum,
            });
        }

        Ok(Sequence {
            id,
            description: record.description.clone(),
            content,
            checksum,
        })
    }

    fn materialize(&self, record: &SequenceRecord) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(record.length as usize);
        let mut pos = 0u64;
        while pos < record.length {
            let page_index = (pos / PAGE_SYMBOLS as u64) as usize;
            let page_start = page_index as u64 * PAGE_SYMBOLS as u64;
            let page = self.page(record, page_index)?;
            let within = (pos - page_start) as usize;
            let take = (page.len() - within).min((record.length - pos) as usize);
            let mut buf = vec![0u8; take];
            page.copy(within, take, &mut buf);
            out.extend_from_slice(&buf);
            pos += take as u64;
        }
        Ok(out)
    }

    fn page(&self, record: &SequenceRecord, page_index: usize) -> Result<PackedPage> {
        let key = (record.id, page_index);
        {
            let guard = self.cache.pages.lock().expect("sparse cache mutex poisoned");
            if let Some(page) = guard.get(&key) {
                return Ok(page.clone());
            }
        }

        let page_start = page_index as u64 * PAGE_SYMBOLS as u64;
        let page_len = (record.length - page_start).min(PAGE_SYMBOLS as u64) as usize;
        let raw = read_line_wrapped(
            &self.element_paths[record.element_id as usize],
            record.element_offset + page_start,
            page_len as u64,
            self.line_length,
        )?;
        let page = PackedPage::encode(&raw);

        let mut guard = self.cache.pages.lock().expect("sparse cache mutex poisoned");
        let page = guard.entry(key).or_insert(page).clone();
        Ok(page)
    }

    /// Iterates sequences in on-disk order `(element_id, offset)` for
    /// sequential preloading I/O (§4.B).
    pub fn preload_order(&self) -> Vec<u64> {
        let mut ids: Vec<&SequenceRecord> = self.records.iter().collect();
        ids.sort_by_key(|r| (r.element_id, r.element_offset));
        ids.into_iter().map(|r| r.id).collect()
    }

    /// Persists this dataset to the `.esd` layout (§6).
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        let num_seqs = self.records.len() as u64;
        let max_seq_len = self.records.iter().map(|r| r.length).max().unwrap_or(0);
        let total_seq_len: u64 = self.records.iter().map(|r| r.length).sum();
        let num_dbs = self.element_paths.len() as u64;
        // max_db_len bounds the widest element-file byte offset any record
        // uses, so the reader can size the offset field without re-reading
        // the element files themselves.
        let max_db_len = self
            .records
            .iter()
            .map(|r| r.element_offset + r.length)
            .max()
            .unwrap_or(0);
        let total_db_len = total_seq_len;
        let type_flags = (!A::HAS_SOFTMASK as u64) // bit0: DNA(0)=has softmask semantics; protein(1) has none
            | ((self.softmask as u64) << 1);

        let mut path_section = Vec::new();
        for path in &self.element_paths {
            path_section.extend_from_slice(path.to_string_lossy().as_bytes());
            path_section.push(b'\n');
        }

        let mut seqdata_section = Vec::new();
        for record in &self.records {
            seqdata_section.extend_from_slice(record.id.to_string().as_bytes());
            if let Some(desc) = &record.description {
                seqdata_section.push(b' ');
                seqdata_section.extend_from_slice(desc.as_bytes());
            }
            seqdata_section.push(b'\n');
        }

        let num_db_width = bits_for(num_dbs.max(1));
        let max_db_len_width = bits_for(max_db_len.max(1));
        let max_seq_len_width = bits_for(max_seq_len.max(1));
        let record_width = num_db_width + max_db_len_width + max_seq_len_width + 14;

        let mut seqinfo = BitPackedContainer::new();
        for record in &self.records {
            seqinfo.append(record.element_id as u64, num_db_width);
            seqinfo.append(record.element_offset, max_db_len_width);
            seqinfo.append(record.length, max_seq_len_width);
            seqinfo.append(record.checksum as u64, 14);
        }
        let _ = record_width;

        let path_data_offset = 14 * 8;
        let seq_data_offset = path_data_offset + path_section.len() as u64;
        let seq_info_offset = seq_data_offset + seqdata_section.len() as u64;
        let total_file_length = seq_info_offset + 8 + seqinfo.as_bytes().len() as u64;

        write_be_u64(writer, u64::from_be_bytes([0, ESD_MAGIC[0], ESD_MAGIC[1], ESD_MAGIC[2], 0, 0, 0, 0]))?;
        write_be_u64(writer, ESD_VERSION)?;
        write_be_u64(writer, type_flags)?;
        write_be_u64(writer, self.line_length.unwrap_or(0))?;
        write_be_u64(writer, num_dbs)?;
        write_be_u64(writer, max_db_len)?;
        write_be_u64(writer, total_db_len)?;
        write_be_u64(writer, num_seqs)?;
        write_be_u64(writer, max_seq_len)?;
        write_be_u64(writer, total_seq_len)?;
        write_be_u64(writer, path_data_offset)?;
        write_be_u64(writer, seq_data_offset)?;
        write_be_u64(writer, seq_info_offset)?;
        write_be_u64(writer, total_file_length)?;

        writer.write_all(&path_section).map_err(|e| SeedCoreError::io(None, e))?;
        writer.write_all(&seqdata_section).map_err(|e| SeedCoreError::io(None, e))?;
        seqinfo.write(writer)?;

        Ok(())
    }

    /// Reconstructs sequence *metadata* from a reader previously written
    /// by [`Dataset::write`]; the element file paths are re-read from
    /// the path section, so the referenced element files must still
    /// exist at those paths for `get_sequence` to succeed.
    pub fn open_from_reader(reader: &mut (impl Read + Seek)) -> Result<Self> {
        let magic_word = read_be_u64(reader)?;
        let magic = [
            ((magic_word >> 48) & 0xFF) as u8,
            ((magic_word >> 40) & 0xFF) as u8,
            ((magic_word >> 32) & 0xFF) as u8,
        ];
        if magic != ESD_MAGIC {
            return Err(SeedCoreError::BadMagic {
                path: None,
                expected: ESD_MAGIC,
                found: magic,
            });
        }
        let version = read_be_u64(reader)?;
        if version != ESD_VERSION {
            return Err(SeedCoreError::IncompatibleVersion {
                path: None,
                expected: ESD_VERSION,
                found: version,
            });
        }
        let type_flags = read_be_u64(reader)?;
        let softmask = (type_flags >> 1) & 1 == 1;
        let line_length_raw = read_be_u64(reader)?;
        let line_length = if line_length_raw == 0 { None } else { Some(line_length_raw) };
        let num_dbs = read_be_u64(reader)?;
        let max_db_len = read_be_u64(reader)?;
        let _total_db_len = read_be_u64(reader)?;
        let num_seqs = read_be_u64(reader)?;
        let max_seq_len = read_be_u64(reader)?;
        let _total_seq_len = read_be_u64(reader)?;
        let path_data_offset = read_be_u64(reader)?;
        let seq_data_offset = read_be_u64(reader)?;
        let seq_info_offset = read_be_u64(reader)?;
        let _total_file_length = read_be_u64(reader)?;

        reader
            .seek(SeekFrom::Start(path_data_offset))
            .map_err(|e| SeedCoreError::io(None, e))?;
        let mut path_bytes = vec![0u8; (seq_data_offset - path_data_offset) as usize];
        reader.read_exact(&mut path_bytes).map_err(|e| SeedCoreError::io(None, e))?;
        let element_paths: Vec<PathBuf> = path_bytes
            .split(|&b| b == b'\n')
            .filter(|l| !l.is_empty())
            .map(|l| PathBuf::from(String::from_utf8_lossy(l).into_owned()))
            .collect();
        let _ = num_dbs;

        let mut seqdata_bytes = vec![0u8; (seq_info_offset - seq_data_offset) as usize];
        reader.read_exact(&mut seqdata_bytes).map_err(|e| SeedCoreError::io(None, e))?;
        let mut ids_and_descriptions = Vec::new();
        for line in seqdata_bytes.split(|&b| b == b'\n').filter(|l| !l.is_empty()) {
            let text = String::from_utf8_lossy(line);
            let mut parts = text.splitn(2, ' ');
            let id: u64 = parts.next().unwrap_or("0").parse().unwrap_or(0);
            let description = parts.next().map(|s| s.to_string());
            ids_and_descriptions.push((id, description));
        }

        let num_db_width = bits_for((element_paths.len() as u64).max(1));
        let max_db_len_width = bits_for(max_db_len.max(1));
        let max_seq_len_width = bits_for(max_seq_len.max(1));

        let seqinfo = BitPackedContainer::read(reader)?;
        let record_width = num_db_width + max_db_len_width + max_seq_len_width + 14;
        let mut records = Vec::with_capacity(num_seqs as usize);
        for (i, (id, description)) in ids_and_descriptions.into_iter().enumerate() {
            let base = i as u64 * record_width as u64;
            let element_id = seqinfo.get(base, num_db_width) as u32;
            let element_offset = seqinfo.get(base + num_db_width as u64, max_db_len_width);
            let length = seqinfo.get(base + (num_db_width + max_db_len_width) as u64, max_seq_len_width);
            let checksum = seqinfo.get(
                base + (num_db_width + max_db_len_width + max_seq_len_width) as u64,
                14,
            ) as u16;
            records.push(SequenceRecord {
                id,
                description,
                element_id,
                element_offset,
                length,
                checksum,
            });
        }

        Ok(Dataset {
            alphabet: PhantomData,
            softmask,
            line_length,
            element_paths,
            records,
            cache: SparseCache::new(),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path.as_ref()).map_err(|e| SeedCoreError::io(path.as_ref().to_path_buf(), e))?;
        Self::open_from_reader(&mut file)
    }
}

/// Reads `length` residues starting at `offset` into an element file,
/// stripping embedded newlines from line-wrapped FASTA. When
/// `line_length` is `Some`, `offset` is interpreted as a residue offset
/// and the byte range to read is widened to account for the
/// `pos/line_length` newlines it will contain (§4.B, §11); when `None`,
/// `offset` is a raw byte offset with no wrapping to strip.
fn read_line_wrapped(
    path: &Path,
    offset: u64,
    length: u64,
    line_length: Option<u64>,
) -> Result<Vec<u8>> {
    let mut file = File::open(path).map_err(|e| SeedCoreError::io(path.to_path_buf(), e))?;

    match line_length {
        None => {
            file.seek(SeekFrom::Start(offset)).map_err(|e| SeedCoreError::io(path.to_path_buf(), e))?;
            let mut buf = vec![0u8; length as usize];
            file.read_exact(&mut buf).map_err(|e| io_short_read(e, path, length as usize))?;
            Ok(buf)
        }
        Some(line_length) => {
            let start_byte = offset + offset / line_length;
            let end_byte = (offset + length) + (offset + length) / line_length;
            let read_len = (end_byte - start_byte) as usize;
            file.seek(SeekFrom::Start(start_byte)).map_err(|e| SeedCoreError::io(path.to_path_buf(), e))?;
            let mut raw = vec![0u8; read_len];
            file.read_exact(&mut raw).map_err(|e| io_short_read(e, path, read_len))?;

            let mut cleaned = Vec::with_capacity(raw.len());
            let mut last = 0usize;
            for pos in memchr::memchr2_iter(b'\n', b'\r', &raw) {
                cleaned.extend_from_slice(&raw[last..pos]);
                last = pos + 1;
            }
            cleaned.extend_from_slice(&raw[last..]);
            cleaned.truncate(length as usize);
            Ok(cleaned)
        }
    }
}

fn io_short_read(e: std::io::Error, path: &Path, needed: usize) -> SeedCoreError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        SeedCoreError::ShortRead {
            path: Some(path.to_path_buf()),
            position: None,
            needed,
            got: 0,
        }
    } else {
        SeedCoreError::io(path.to_path_buf(), e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Dna;
    use std::io::Cursor;

    fn write_temp_element(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn gcg_checksum_is_case_insensitive() {
        assert_eq!(gcg_checksum(b"acgtacgt"), gcg_checksum(b"ACGTACGT"));
    }

    #[test]
    fn build_and_fetch_round_trip() {
        let dir = std::env::temp_dir().join(format!("seedcore-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = write_temp_element(&dir, "a.seq", b"ACGTACGTACGTACGTACGT");

        let entries = vec![DatasetEntry {
            id: 1,
            description: Some("seq one".into()),
            element_id: 0,
            file_offset: 0,
            length: 20,
        }];
        let dataset = Dataset::<Dna>::build(entries, vec![path], false, None).unwrap();
        let seq = dataset.get_sequence(1).unwrap();
        assert_eq!(seq.content, b"ACGTACGTACGTACGTACGT");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn duplicate_id_fails() {
        let dir = std::env::temp_dir().join(format!("seedcore-test-dup-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = write_temp_element(&dir, "a.seq", b"ACGT");
        let entries = vec![
            DatasetEntry { id: 1, description: None, element_id: 0, file_offset: 0, length: 4 },
            DatasetEntry { id: 1, description: None, element_id: 0, file_offset: 0, length: 4 },
        ];
        let err = Dataset::<Dna>::build(entries, vec![path], false, None);
        assert!(matches!(err, Err(SeedCoreError::DuplicateId { id: 1 })));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn write_open_round_trip_metadata() {
        let dir = std::env::temp_dir().join(format!("seedcore-test-wr-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = write_temp_element(&dir, "a.seq", b"ACGTACGTACGT");
        let entries = vec![DatasetEntry {
            id: 42,
            description: Some("desc".into()),
            element_id: 0,
            file_offset: 0,
            length: 12,
        }];
        let dataset = Dataset::<Dna>::build(entries, vec![path], false, None).unwrap();

        let mut buf = Vec::new();
        dataset.write(&mut buf).unwrap();
        let reopened = Dataset::<Dna>::open_from_reader(&mut Cursor::new(buf)).unwrap();
        assert_eq!(reopened.len(), 1);
        let seq = reopened.get_sequence(42).unwrap();
        assert_eq!(seq.content, b"ACGTACGTACGT");
        assert_eq!(seq.description.as_deref(), Some("desc"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
