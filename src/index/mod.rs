//! Components D (builder) and E (reader): the disk-resident word index.

pub mod builder;
pub mod reader;

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::bitpack::{bits_for, read_be_u64, write_be_u64, BitPackedContainer};
use crate::error::{Result, SeedCoreError};

pub(crate) const ESI_MAGIC: [u8; 3] = *b"esi";
pub(crate) const ESI_VERSION: u64 = 3;

/// `(occurrence_count, byte_offset_into_occurrence_region)` for a
/// present word (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub freq_count: u64,
    pub byte_offset: u64,
}

/// One forward or reverse-complement half-index (§3).
pub struct IndexStrand {
    pub(crate) max_index_length: u64,
    pub(crate) max_word_width: u32,
    pub(crate) max_index_len_width: u32,
    pub(crate) total_index_len_width: u32,
    /// state -> word-list index, or `u32::MAX` if absent.
    pub(crate) word_table: Vec<u32>,
    pub(crate) word_list_states: Vec<u64>,
    pub(crate) entries: Vec<IndexEntry>,
    pub(crate) num_seqs_width: u32,
    pub(crate) max_seq_len_width: u32,
    pub(crate) occurrence_region_offset: u64,
    preloaded: Mutex<Option<BitPackedContainer>>,
}

impl IndexStrand {
    /// `lookup(state) -> Option<IndexEntry>`, O(1) (§4.E).
    pub fn lookup(&self, state: u64) -> Option<IndexEntry> {
        let idx = *self.word_table.get(state as usize)?;
        if idx == u32::MAX {
            return None;
        }
        Some(self.entries[idx as usize])
    }
}

/// Persistent header + trie descriptor + one or two strands (§3).
pub struct Index {
    pub(crate) translated: bool,
    pub(crate) word_length: u32,
    pub(crate) word_jump: u32,
    pub(crate) word_ambiguity: u32,
    pub(crate) saturate_threshold: u64,
    pub(crate) dataset_path: PathBuf,
    pub(crate) forward: IndexStrand,
    pub(crate) reverse: Option<IndexStrand>,
    source_file: Option<Mutex<File>>,
}

impl Index {
    pub fn word_length(&self) -> u32 {
        self.word_length
    }

    pub fn is_translated(&self) -> bool {
        self.translated
    }

    pub fn dataset_path(&self) -> &Path {
        &self.dataset_path
    }

    pub fn forward_strand(&self) -> &IndexStrand {
        &self.forward
    }

    pub fn reverse_strand(&self) -> Option<&IndexStrand> {
        self.reverse.as_ref()
    }

    /// Writes the `.esi` layout (§6).
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        write_be_u64(writer, u64::from_be_bytes([0, ESI_MAGIC[0], ESI_MAGIC[1], ESI_MAGIC[2], 0, 0, 0, 0]))?;
        write_be_u64(writer, ESI_VERSION)?;
        write_be_u64(writer, self.translated as u64)?;
        let path_bytes = self.dataset_path.to_string_lossy().into_owned().into_bytes();
        write_be_u64(writer, path_bytes.len() as u64)?;
        write_be_u64(writer, self.word_length as u64)?;
        write_be_u64(writer, self.word_jump as u64)?;
        write_be_u64(writer, self.word_ambiguity as u64)?;
        write_be_u64(writer, self.saturate_threshold)?;
        writer.write_all(&path_bytes).map_err(|e| SeedCoreError::io(None, e))?;

        write_strand(writer, &self.forward)?;
        if let Some(reverse) = &self.reverse {
            write_strand(writer, reverse)?;
        }
        Ok(())
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let mut file = File::open(path_ref).map_err(|e| SeedCoreError::io(path_ref.to_path_buf(), e))?;
        let mut index = Self::open_from_reader(&mut file)?;
        index.source_file = Some(Mutex::new(
            File::open(path_ref).map_err(|e| SeedCoreError::io(path_ref.to_path_buf(), e))?,
        ));
        Ok(index)
    }

    pub fn open_from_reader(reader: &mut (impl Read + Seek)) -> Result<Self> {
        let magic_word = read_be_u64(reader)?;
        let magic = [
            ((magic_word >> 48) & 0xFF) as u8,
            ((magic_word >> 40) & 0xFF) as u8,
            ((magic_word >> 32) & 0xFF) as u8,
        ];
        if magic != ESI_MAGIC {
            return Err(SeedCoreError::BadMagic {
                path: None,
                expected: ESI_MAGIC,
                found: magic,
            });
        }
        let version = read_be_u64(reader)?;
        if version != ESI_VERSION {
            return Err(SeedCoreError::IncompatibleVersion {
                path: None,
                expected: ESI_VERSION,
                found: version,
            });
        }
        let translated = read_be_u64(reader)? != 0;
        let dataset_path_len = read_be_u64(reader)?;
        let word_length = read_be_u64(reader)? as u32;
        let word_jump = read_be_u64(reader)? as u32;
        let word_ambiguity = read_be_u64(reader)? as u32;
        let saturate_threshold = read_be_u64(reader)?;

        let mut path_bytes = vec![0u8; dataset_path_len as usize];
        reader.read_exact(&mut path_bytes).map_err(|e| SeedCoreError::io(None, e))?;
        let dataset_path = PathBuf::from(String::from_utf8_lossy(&path_bytes).into_owned());

        let forward = read_strand(reader)?;
        let reverse = if translated { Some(read_strand(reader)?) } else { None };

        Ok(Index {
            translated,
            word_length,
            word_jump,
            word_ambiguity,
            saturate_threshold,
            dataset_path,
            forward,
            reverse,
            source_file: None,
        })
    }
}

fn write_strand(writer: &mut impl Write, strand: &IndexStrand) -> Result<()> {
    let word_list_length = strand.entries.len() as u64;
    let total_index_length: u64 = strand.entries.iter().map(|e| e.freq_count).sum::<u64>()
        * (strand.num_seqs_width + strand.max_seq_len_width) as u64
        / 8
        + 1;

    write_be_u64(writer, strand.max_index_length)?;
    write_be_u64(writer, word_list_length)?;
    write_be_u64(writer, total_index_length)?;
    write_be_u64(writer, strand.num_seqs_width as u64)?;
    write_be_u64(writer, strand.max_seq_len_width as u64)?;
    write_be_u64(writer, strand.max_word_width as u64)?;
    write_be_u64(writer, strand.max_index_len_width as u64)?;
    write_be_u64(writer, strand.total_index_len_width as u64)?;

    let mut word_list_bits = BitPackedContainer::new();
    for (state, entry) in strand.word_list_states.iter().zip(strand.entries.iter()) {
        word_list_bits.append(*state, strand.max_word_width);
        word_list_bits.append(entry.freq_count, strand.max_index_len_width);
        word_list_bits.append(entry.byte_offset, strand.total_index_len_width);
    }
    word_list_bits.write(writer)?;

    Ok(())
}

fn read_strand(reader: &mut (impl Read + Seek)) -> Result<IndexStrand> {
    let max_index_length = read_be_u64(reader)?;
    let word_list_length = read_be_u64(reader)?;
    let _total_index_length = read_be_u64(reader)?;
    let num_seqs_width = read_be_u64(reader)? as u32;
    let max_seq_len_width = read_be_u64(reader)? as u32;
    let max_word_width = read_be_u64(reader)? as u32;
    let max_index_len_width = read_be_u64(reader)? as u32;
    let total_index_len_width = read_be_u64(reader)? as u32;

    let word_list_bits = BitPackedContainer::read(reader)?;
    let record_width = max_word_width + max_index_len_width + total_index_len_width;

    let mut word_list_states = Vec::with_capacity(word_list_length as usize);
    let mut entries = Vec::with_capacity(word_list_length as usize);
    let mut max_state = 0u64;
    for i in 0..word_list_length {
        let base = i * record_width as u64;
        let state = word_list_bits.get(base, max_word_width);
        let freq_count = word_list_bits.get(base + max_word_width as u64, max_index_len_width);
        let byte_offset = word_list_bits.get(
            base + (max_word_width + max_index_len_width) as u64,
            total_index_len_width,
        );
        max_state = max_state.max(state);
        word_list_states.push(state);
        entries.push(IndexEntry { freq_count, byte_offset });
    }

    let mut word_table = vec![u32::MAX; max_state as usize + 1];
    for (i, &state) in word_list_states.iter().enumerate() {
        word_table[state as usize] = i as u32;
    }

    Ok(IndexStrand {
        max_index_length,
        max_word_width,
        max_index_len_width,
        total_index_len_width,
        word_table,
        word_list_states,
        entries,
        num_seqs_width,
        max_seq_len_width,
        occurrence_region_offset: 0,
        preloaded: Mutex::new(None),
    })
}

pub(crate) fn entry_bit_width(strand: &IndexStrand) -> u32 {
    strand.num_seqs_width + strand.max_seq_len_width
}

pub(crate) fn strand_word_table_len(num_states: u64) -> usize {
    num_states as usize
}

pub(crate) fn widths_for_counts(num_seqs: u64, max_seq_len: u64) -> (u32, u32) {
    (bits_for(num_seqs.max(1)), bits_for(max_seq_len.max(1)))
}
