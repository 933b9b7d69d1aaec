// Purpose: Package-layer root: build context, directory watching, cache, sweeper.
// Inputs/Outputs: Re-exports the resolution surface used by queries and RPC.
// Invariants: All resolution goes through PkgCache; no side-channel type checking.
// Gotchas: Keep the sweeper's cache access limited to the public lock surface.

pub mod cache;
pub mod context;
pub mod dir;
pub mod sweep;

pub use cache::{shared_cache, CacheImporter, ImportError, PkgCache};
pub use context::PackedContext;
