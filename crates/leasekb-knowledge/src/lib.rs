//! # LeaseKB Knowledge
//!
//! Routes questions to the right knowledge base and answers from it.
//!
//! ## How it works
//! ```text
//! "What is the monthly rent on floor 3?"
//!   ↓ Classifier (keyword overlap)
//! property corpus
//!   ↓ KnowledgeRegistry (load blob, or embed source CSV and persist)
//! VectorStore::search(embed(question), top_k)
//!   ↓ format_context
//! Completer → answer
//! ```

pub mod answer;
pub mod corpus;
pub mod registry;
pub mod router;
pub mod source;

#[cfg(test)]
pub(crate) mod testing;

pub use answer::{Answer, Answerer};
pub use corpus::CorpusKind;
pub use registry::{CorpusStatus, KnowledgeRegistry};
pub use router::{Classifier, RoutedResults, Router};
pub use source::{CsvSource, Record, RecordSource};
