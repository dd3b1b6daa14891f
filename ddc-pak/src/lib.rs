//! The pak file backend tier (§4.4): an append-only, content-addressed
//! archive format with a trailing index, a compressing wrapper, and the
//! offline `MergeCache`/`SortAndCopy` build-time operations.

pub mod compressed;
pub mod format;
pub mod merge;
pub mod read;
pub mod sort_and_copy;
pub mod write;

pub use compressed::CompressedPak;
pub use format::{IndexEntry, PakFormatError, INDEX_MAGIC};
pub use merge::merge_cache;
pub use read::ReadPak;
pub use sort_and_copy::sort_and_copy;
pub use write::WritePak;
