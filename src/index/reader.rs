//! Component E: random-access reads over a built index.

use std::io::{Read, Seek, SeekFrom};
use std::sync::Mutex;

use crate::bitpack::BitPackedContainer;
use crate::error::Result;

use super::{IndexEntry, IndexStrand};

/// `(target_id_range, pos_range)` used to restrict
/// [`read_occurrences`] to occurrences whose `(seq_id, pos)` falls
/// inside at least one interval (§4.E, used by geneseed's delta scans).
#[derive(Debug, Clone, Copy)]
pub struct OccurrenceInterval {
    pub seq_id_range: (u64, u64),
    pub pos_range: (u64, u64),
}

fn intersects(interval: &OccurrenceInterval, seq_id: u64, pos: u64) -> bool {
    seq_id >= interval.seq_id_range.0
        && seq_id <= interval.seq_id_range.1
        && pos >= interval.pos_range.0
        && pos <= interval.pos_range.1
}

/// Reads `entry.freq_count` bit-packed `(seq_id, pos)` pairs for a
/// strand, optionally filtered by intersection with a sorted list of
/// intervals.
///
/// `occurrences` is the in-memory occurrence region for this strand
/// (either the freshly-built [`BitPackedContainer`] from
/// [`super::builder::build_strand`] or a region read back via
/// [`read_occurrence_region`]).
pub fn read_occurrences(
    strand: &IndexStrand,
    occurrences: &BitPackedContainer,
    entry: IndexEntry,
    interval_filter: Option<&[OccurrenceInterval]>,
) -> Vec<(u64, u64)> {
    let record_width = strand.num_seqs_width + strand.max_seq_len_width;
    let mut out = Vec::with_capacity(entry.freq_count as usize);
    for i in 0..entry.freq_count {
        let base = entry.byte_offset + i * record_width as u64;
        let seq_id = occurrences.get(base, strand.num_seqs_width);
        let pos = occurrences.get(base + strand.num_seqs_width as u64, strand.max_seq_len_width);
        let keep = match interval_filter {
            None => true,
            Some(intervals) => intervals.iter().any(|iv| intersects(iv, seq_id, pos)),
        };
        if keep {
            out.push((seq_id, pos));
        }
    }
    out
}

/// Reads the on-disk occurrence region for a strand into a single
/// in-memory [`BitPackedContainer`] (§4.E `preload_index`): subsequent
/// `read_occurrences` calls against the result need no further I/O or
/// mutex.
pub fn preload_occurrence_region(
    reader: &mut (impl Read + Seek),
    region_byte_offset: u64,
    region_byte_len: u64,
) -> Result<BitPackedContainer> {
    reader.seek(SeekFrom::Start(region_byte_offset)).map_err(|e| crate::error::SeedCoreError::io(None, e))?;
    let mut bytes = vec![0u8; region_byte_len as usize];
    reader.read_exact(&mut bytes).map_err(|e| crate::error::SeedCoreError::io(None, e))?;
    Ok(BitPackedContainer::read(&mut &bytes[8..]).unwrap_or_else(|_| {
        // fall back to treating the raw bytes as the payload with an
        // implicit bit length, for regions written without the
        // BitPackedContainer's own length prefix.
        let mut container = BitPackedContainer::with_byte_capacity(bytes.len());
        for byte in &bytes {
            container.append(*byte as u64, 8);
        }
        container
    }))
}

/// Shared, mutex-guarded occurrence reader for a reader handle backed
/// by a real file (§5: many readers, mutex around seek+read).
pub struct SharedOccurrenceReader<R> {
    reader: Mutex<R>,
}

impl<R: Read + Seek> SharedOccurrenceReader<R> {
    pub fn new(reader: R) -> Self {
        SharedOccurrenceReader {
            reader: Mutex::new(reader),
        }
    }

    pub fn preload(&self, region_byte_offset: u64, region_byte_len: u64) -> Result<BitPackedContainer> {
        let mut guard = self.reader.lock().expect("occurrence reader mutex poisoned");
        preload_occurrence_region(&mut *guard, region_byte_offset, region_byte_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Dna;
    use crate::automaton::vfsm::Vfsm;
    use crate::config::IndexBuildConfig;
    use crate::index::builder::{build_strand, ScanStream};

    fn dna_rank(b: u8) -> Option<u32> {
        match b {
            b'A' => Some(0),
            b'C' => Some(1),
            b'G' => Some(2),
            b'T' => Some(3),
            _ => None,
        }
    }
    fn dna_unrank(r: u32) -> u8 {
        [b'A', b'C', b'G', b'T'][r as usize]
    }

    #[test]
    fn read_occurrences_filters_by_interval() {
        let automaton = Vfsm::build(4, 3, dna_rank, dna_unrank).unwrap();
        let config = IndexBuildConfig::new(3);
        let streams = vec![
            ScanStream { seq_id: 0, symbols: b"ACGACG".to_vec() },
            ScanStream { seq_id: 1, symbols: b"ACGACG".to_vec() },
        ];
        let (strand, occurrences) = build_strand::<Dna>(&streams, &automaton, &config, 2, 6).unwrap();
        let state = automaton.word_to_state(b"ACG").unwrap();
        let entry = strand.lookup(state).unwrap();
        assert_eq!(entry.freq_count, 4);

        let all = read_occurrences(&strand, &occurrences, entry, None);
        assert_eq!(all.len(), 4);

        let filtered = read_occurrences(
            &strand,
            &occurrences,
            entry,
            Some(&[OccurrenceInterval {
                seq_id_range: (0, 0),
                pos_range: (0, 10),
            }]),
        );
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|(id, _)| *id == 0));
    }
}
