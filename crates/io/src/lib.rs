/// # IO Module.
///
/// Memory-mapped file access shared by the editor crates.
pub mod mmap;
