//! In-memory lexical indexing.

pub mod lexical;
