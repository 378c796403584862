//! A packed sequence store, disk-resident word index and HSP seeding
//! core for sequence alignment pipelines.
//!
//! Four subsystems, leaves first:
//!
//! - [`bitpack`] — the bit-addressable byte buffer every on-disk
//!   format is built from.
//! - [`dataset`] — a persistent, checksummed sequence store
//!   ([`dataset::Dataset`]) backed by a lazily-decoded page cache.
//! - [`automaton`] and [`index`] — a word automaton ([`automaton::vfsm`],
//!   [`automaton::compressed`]) and the two-pass builder/reader that
//!   turn a dataset into a disk-resident word → occurrence-list index.
//! - [`neighborhood`], [`hsp`] and [`geneseed`] — neighborhood
//!   enumeration, ungapped HSP extension, and the geneseed region
//!   refinement loop.
//!
//! [`seeder::Seeder`] wires all of the above into the query/target
//! lifecycle described in its module docs. [`config`] holds every
//! component's builder-style configuration type, and [`error`] the
//! shared error taxonomy.

pub mod alphabet;
pub mod automaton;
pub mod bitpack;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geneseed;
pub mod hsp;
pub mod index;
pub mod neighborhood;
pub mod seeder;

pub use error::{Result, SeedCoreError};
