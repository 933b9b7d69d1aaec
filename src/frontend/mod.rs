// Purpose: Expose the language frontend: lexer, syntax tree, parser, positions.
// Inputs/Outputs: Re-exports submodules consumed by sema, pkg, and query layers.
// Invariants: Frontend stays independent of the package cache.
// Gotchas: Keep parse entry points going through parser::parse_source.

pub mod ast;
pub mod diagnostic;
pub mod fileset;
pub mod lexer;
pub mod parser;
