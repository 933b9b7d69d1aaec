// Purpose: Define crate-level module surface for the query daemon components.
// Inputs/Outputs: Re-exports internal modules for the binary and integration tests.
// Invariants: Public module boundaries should remain stable for internal callers.
// Gotchas: Keep module wiring consistent with the src/main.rs entry path.

pub mod cli;
pub mod frontend;
pub mod pkg;
pub mod query;
pub mod rpc;
pub mod sema;
