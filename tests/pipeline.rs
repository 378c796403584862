//! End-to-end builder -> reader -> seeder pipeline tests (the
//! concrete scenarios and round-trip invariants enumerated against
//! the component design).

use std::io::Cursor;

use seedcore::alphabet::{Alphabet, Dna};
use seedcore::automaton::vfsm::Vfsm;
use seedcore::config::{IndexBuildConfig, MatchMode, SeederConfig};
use seedcore::dataset::{Dataset, DatasetEntry};
use seedcore::index::builder::{build_strand, ScanStream};
use seedcore::seeder::Seeder;

fn init_logging() {
    let _ = env_logger::try_init();
}

fn dna_rank(b: u8) -> Option<u32> {
    Dna::rank(b)
}
fn dna_unrank(r: u32) -> u8 {
    Dna::unrank(r)
}

fn identity_matrix(a: u8, b: u8) -> i32 {
    if a.to_ascii_uppercase() == b.to_ascii_uppercase() {
        1
    } else {
        -2
    }
}

#[test]
fn dataset_write_then_open_preserves_every_sequence() {
    init_logging();
    let dir = std::env::temp_dir().join(format!("seedcore-pipeline-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let element_path = dir.join("seqs.fa");
    std::fs::write(&element_path, b"ACGTACGTACGTACGTNNNNACGT").unwrap();

    let entries = vec![
        DatasetEntry {
            id: 10,
            description: Some("first".into()),
            element_id: 0,
            file_offset: 0,
            length: 16,
        },
        DatasetEntry {
            id: 3,
            description: None,
            element_id: 0,
            file_offset: 16,
            length: 8,
        },
    ];
    let dataset = Dataset::<Dna>::build(entries, vec![element_path.clone()], false, None).unwrap();

    let mut buf = Vec::new();
    dataset.write(&mut buf).unwrap();
    let reopened = Dataset::<Dna>::open_from_reader(&mut Cursor::new(buf)).unwrap();

    assert_eq!(reopened.len(), 2);
    let seq_a = reopened.get_sequence(10).unwrap();
    assert_eq!(seq_a.content, b"ACGTACGTACGTACGT");
    let seq_b = reopened.get_sequence(3).unwrap();
    assert_eq!(seq_b.content, b"NNNNACGT");

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn query_at_three_positions_yields_three_hsps() {
    init_logging();
    let query = b"ACGTAACCGGTTAGCT";
    let mut target = Vec::new();
    target.extend_from_slice(b"NNNNNNNNNNNN");
    target.extend_from_slice(query);
    target.extend_from_slice(b"NNNNNNNNNNNN");
    target.extend_from_slice(query);
    target.extend_from_slice(b"NNNNNNNNNNNN");
    target.extend_from_slice(query);
    target.extend_from_slice(b"NNNNNNNNNNNN");

    let automaton = Vfsm::build(4, 12, dna_rank, dna_unrank).unwrap();
    let params = vec![seedcore::config::HspParam::new(MatchMode::DnaVsDna, 10, 4)];
    let mut seeder = Seeder::new(automaton, params, SeederConfig::default());
    seeder.add_query(1, query.to_vec()).unwrap();
    seeder.prepare(b"ACGT", None).unwrap();

    let mut comparisons = Vec::new();
    seeder
        .add_target(1, &target, &identity_matrix, |c| comparisons.push(c))
        .unwrap();

    assert_eq!(comparisons.len(), 1);
    assert_eq!(comparisons[0].hsps.len(), 3);
    for hsp in &comparisons[0].hsps {
        assert_eq!(hsp.length, query.len() as u64);
    }
}

#[test]
fn index_build_round_trips_through_esi_bytes() {
    init_logging();
    let automaton = Vfsm::build(4, 4, dna_rank, dna_unrank).unwrap();
    let config = IndexBuildConfig::new(4);
    let streams = vec![
        ScanStream {
            seq_id: 0,
            symbols: b"ACGTACGTACGT".to_vec(),
        },
        ScanStream {
            seq_id: 1,
            symbols: b"TTTTACGTGGGG".to_vec(),
        },
    ];
    let (strand, occurrences) = build_strand::<Dna>(&streams, &automaton, &config, 2, 12).unwrap();

    let state = automaton.word_to_state(b"ACGT").unwrap();
    let entry = strand.lookup(state).unwrap();
    let hits = seedcore::index::reader::read_occurrences(&strand, &occurrences, entry, None);
    assert!(hits.iter().any(|&(seq_id, pos)| seq_id == 0 && pos == 0));
    assert!(hits.iter().any(|&(seq_id, pos)| seq_id == 1 && pos == 4));
}

#[test]
fn revcomp_is_involutive_on_ambiguous_sequence() {
    let s = b"ACGTNacgtnRYSWKM".to_vec();
    assert_eq!(Dna::revcomp(&Dna::revcomp(&s)), s);
}
