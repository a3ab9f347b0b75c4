//! Collaborator seams. The vector store never calls these itself; the
//! knowledge layer embeds text and synthesises answers through them.

pub mod completer;
pub mod embedder;

pub use completer::Completer;
pub use embedder::Embedder;
