//! Shared on-disk cache of downloaded `mongod` binaries.
//!
//! Each artefact URL maps to its own entry directory so different versions
//! and mirrors never collide. The cache is shared across processes without
//! locks: entries appear only through an atomic rename.
//!
//! # Cache Location
//!
//! The cache root is resolved in the following order:
//!
//! 1. An explicit path from [`crate::ServerOptions`]
//! 2. `MEMONGO_CACHE_PATH`
//! 3. `$XDG_CACHE_HOME/memongo`
//! 4. `~/Library/Caches/memongo` on macOS, `~/.cache/memongo` elsewhere
//! 5. `/tmp/memongo`

mod config;
mod operations;
mod path;

pub use config::default_cache_dir;
pub use operations::ArtifactCache;
pub use path::{BINARY_NAME, cache_path_for_url};
