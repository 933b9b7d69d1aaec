// Purpose: Provide the binary entry for client and daemon execution.
// Inputs/Outputs: Reads process args and returns the CLI dispatcher's exit code.
// Invariants: Main must not bypass centralized CLI argument/diagnostic handling.
// Gotchas: The same binary serves as client and (with -s) as the daemon.

fn main() {
    let code = gosense::cli::run_cli(std::env::args().skip(1));
    std::process::exit(code);
}
