//! # LeaseKB Vector Store
//!
//! Exhaustive cosine-similarity store for embedded text fragments.
//! Sized for corpora of thousands of rows, not millions; every query
//! scans every record.
//!
//! ## Layout
//! ```text
//! VectorStore
//!   ├── vectors   flat [f32], N × D, row-major
//!   ├── texts     [String], N
//!   ├── ids       [RecordId], N (stable, ascending)
//!   └── metadata  RecordId → JSON object (sparse)
//! ```
//!
//! Positions (`0..N`) are the public index and shift down on removal;
//! `RecordId`s never move, so metadata follows its record for free.
//!
//! ## Modules
//! - [`store`]: insert, update, remove, stats
//! - [`search`]: top-k and filtered retrieval
//! - [`persist`]: versioned binary blob (`save` / `load`)
//! - [`dedup`]: near-duplicate clustering

pub mod dedup;
pub mod persist;
pub mod search;
pub mod similarity;
pub mod store;

pub use search::SearchResult;
pub use store::{RecordId, StoreStats, VectorStore};
