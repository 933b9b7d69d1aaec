// Purpose: Command-line front-end: flag parsing, client commands, daemon launch.
// Inputs/Outputs: Process args and stdin buffer in; formatted query results on
//   stdout; exit code out.
// Invariants: Cursor offsets prefixed with 'c' are rune offsets and are
//   converted against the supplied buffer before anything crosses the wire.
// Gotchas: The `-s` daemon flag wins over subcommands; `-oneshot` answers
//   in-process without touching the daemon.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::json;

use crate::pkg::{shared_cache, PackedContext};
use crate::query::complete::{auto_complete, Candidate};
use crate::query::lookup::lookup;
use crate::query::report::report_errors;
use crate::rpc::client::{call, connect};
use crate::rpc::server::{serve, ServerOptions};
use crate::rpc::{
    AutoCompleteReply, AutoCompleteRequest, LookupInfo, LookupReply, LookupRequest,
    ReportErrorsReply, ReportErrorsRequest, Request, SockType,
};

struct Options {
    server: bool,
    sock: SockType,
    addr: String,
    input: Option<PathBuf>,
    format: String,
    oneshot: bool,
    debug: bool,
    command: Vec<String>,
}

pub fn run_cli<I>(args: I) -> i32
where
    I: IntoIterator<Item = String>,
{
    let opts = match parse_args(args) {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("{}", err);
            print_usage();
            return 1;
        }
    };
    init_logging(opts.debug);
    let result = if opts.server {
        serve(&ServerOptions {
            sock: opts.sock,
            addr: opts.addr.clone(),
        })
    } else {
        run_command(&opts)
    };
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("gosense: {:#}", err);
            1
        }
    }
}

fn parse_args<I>(args: I) -> Result<Options>
where
    I: IntoIterator<Item = String>,
{
    let mut opts = Options {
        server: false,
        sock: SockType::Unix,
        addr: "127.0.0.1:37373".to_string(),
        input: None,
        format: "nice".to_string(),
        oneshot: false,
        debug: false,
        command: Vec::new(),
    };
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-s" => opts.server = true,
            "-sock" => {
                let value = args.next().context("expected value after -sock")?;
                opts.sock =
                    SockType::parse(&value).with_context(|| format!("bad -sock {:?}", value))?;
            }
            "-addr" => {
                opts.addr = args.next().context("expected value after -addr")?;
            }
            "-in" => {
                let value = args.next().context("expected file after -in")?;
                opts.input = Some(PathBuf::from(value));
            }
            "-format" => {
                opts.format = args.next().context("expected value after -format")?;
            }
            "-oneshot" => opts.oneshot = true,
            "-debug" => opts.debug = true,
            "-help" | "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            _ => {
                opts.command.push(arg);
                opts.command.extend(args.by_ref());
            }
        }
    }
    Ok(opts)
}

fn init_logging(debug: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("GOSENSE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_command(opts: &Options) -> Result<()> {
    let command = match opts.command.first() {
        Some(c) => c.as_str(),
        None => {
            print_usage();
            return Ok(());
        }
    };
    match command {
        "autocomplete" => cmd_autocomplete(opts),
        "reporterrors" => cmd_reporterrors(opts),
        "lookup" => cmd_lookup(opts),
        "close" | "exit" => cmd_exit(opts),
        other => bail!("unknown subcommand: {:?}; run 'gosense -help' for usage", other),
    }
}

fn print_usage() {
    eprintln!("usage: gosense [flags] autocomplete [filename] [offset]");
    eprintln!("   or: gosense [flags] reporterrors [filename]");
    eprintln!("   or: gosense [flags] lookup [filename] [offset]");
    eprintln!("   or: gosense [flags] exit");
    eprintln!("   or: gosense -s [-sock unix|tcp] [-addr host:port]");
    eprintln!();
    eprintln!("flags: -in FILE, -format nice|vim|json, -oneshot, -debug");
}

fn cmd_autocomplete(opts: &Options) -> Result<()> {
    let (filename, data, cursor) = filename_data_cursor(opts)?;
    let request = AutoCompleteRequest {
        filename: filename.to_string_lossy().into_owned(),
        data,
        cursor,
        context: PackedContext::from_env(),
    };
    let reply: AutoCompleteReply = if opts.oneshot {
        let cache = shared_cache();
        cache.set_context(&request.context);
        let (candidates, len) =
            auto_complete(&cache, Path::new(&request.filename), &request.data, request.cursor);
        AutoCompleteReply { candidates, len }
    } else {
        let mut stream = connect(opts.sock, &opts.addr)?;
        let value = call(&mut stream, &Request::AutoComplete(request))?;
        serde_json::from_value(value).context("decode autocomplete reply")?
    };
    print_candidates(&opts.format, &reply.candidates, reply.len);
    Ok(())
}

fn cmd_reporterrors(opts: &Options) -> Result<()> {
    let (filename, data) = filename_data(opts)?;
    let request = ReportErrorsRequest {
        filename: filename.to_string_lossy().into_owned(),
        data,
        context: PackedContext::from_env(),
    };
    let reply: ReportErrorsReply = if opts.oneshot {
        let cache = shared_cache();
        cache.set_context(&request.context);
        ReportErrorsReply {
            errors: report_errors(&cache, Path::new(&request.filename), &request.data),
        }
    } else {
        let mut stream = connect(opts.sock, &opts.addr)?;
        let value = call(&mut stream, &Request::ReportErrors(request))?;
        serde_json::from_value(value).context("decode reporterrors reply")?
    };
    for e in &reply.errors {
        println!("Error: {} {} {}", e.line, e.column, e.message);
    }
    Ok(())
}

fn cmd_lookup(opts: &Options) -> Result<()> {
    let (filename, data, cursor) = filename_data_cursor(opts)?;
    let request = LookupRequest {
        filename: filename.to_string_lossy().into_owned(),
        data,
        cursor,
        context: PackedContext::from_env(),
    };
    let reply: LookupReply = if opts.oneshot {
        let cache = shared_cache();
        cache.set_context(&request.context);
        let (cursor_info, call_info) =
            lookup(&cache, Path::new(&request.filename), &request.data, request.cursor);
        LookupReply {
            cursor: LookupInfo::from(cursor_info),
            call: LookupInfo::from(call_info),
        }
    } else {
        let mut stream = connect(opts.sock, &opts.addr)?;
        let value = call(&mut stream, &Request::Lookup(request))?;
        serde_json::from_value(value).context("decode lookup reply")?
    };
    print_lookup_info("ident", &reply.cursor);
    print_lookup_info("call", &reply.call);
    Ok(())
}

fn cmd_exit(opts: &Options) -> Result<()> {
    let mut stream = connect(opts.sock, &opts.addr)?;
    let _ = call(&mut stream, &Request::Exit)?;
    Ok(())
}

fn print_lookup_info(kind: &str, li: &LookupInfo) {
    if li.path.is_empty() && li.name.is_empty() {
        return;
    }
    let doc = li.doc.replace('\n', "<BR>");
    println!(
        "{}:\n pos: {}:{}:{}\n name: {}\n type: {}",
        kind, li.path, li.line, li.column, li.name, li.typ
    );
    if li.call_arg != -1 {
        println!(" callarg: {}", li.call_arg);
    }
    println!(" doc: {}", doc);
}

fn print_candidates(format: &str, candidates: &[Candidate], len: usize) {
    match format {
        "vim" => {
            let words: Vec<_> = candidates
                .iter()
                .map(|c| {
                    json!({
                        "word": c.name,
                        "abbr": format!("{} {} {}", c.class, c.name, c.typ),
                        "info": format!("{} {} {}", c.class, c.name, c.typ),
                    })
                })
                .collect();
            println!("[{}, {}]", len, json!(words));
        }
        "json" => {
            println!("[{}, {}]", len, json!(candidates));
        }
        _ => {
            println!("Found {} candidates:", candidates.len());
            for c in candidates {
                println!("  {} {} {}", c.class, c.name, c.typ);
            }
        }
    }
}

fn read_buffer(opts: &Options) -> Result<String> {
    match &opts.input {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read stdin")?;
            Ok(buf)
        }
    }
}

fn filename_data(opts: &Options) -> Result<(PathBuf, String)> {
    let data = read_buffer(opts)?;
    let mut filename = opts.input.clone().unwrap_or_default();
    if let Some(arg) = opts.command.get(1) {
        filename = PathBuf::from(arg);
    }
    if !filename.as_os_str().is_empty() {
        if let Ok(abs) = filename.canonicalize() {
            filename = abs;
        } else if let Ok(cwd) = std::env::current_dir() {
            if filename.is_relative() {
                filename = cwd.join(filename);
            }
        }
    }
    Ok((filename, data))
}

fn filename_data_cursor(opts: &Options) -> Result<(PathBuf, String, usize)> {
    let data = read_buffer(opts)?;
    let mut filename = opts.input.clone().unwrap_or_default();
    let offset_arg = match opts.command.len() {
        2 => opts.command.get(1).cloned(),
        n if n >= 3 => {
            filename = PathBuf::from(&opts.command[1]);
            opts.command.get(2).cloned()
        }
        _ => None,
    };
    if !filename.as_os_str().is_empty() {
        if let Ok(abs) = filename.canonicalize() {
            filename = abs;
        } else if let Ok(cwd) = std::env::current_dir() {
            if filename.is_relative() {
                filename = cwd.join(filename);
            }
        }
    }
    let cursor = match offset_arg {
        Some(offset) => parse_cursor(&offset, &data)?,
        None => 0,
    };
    Ok((filename, data, cursor))
}

fn parse_cursor(offset: &str, data: &str) -> Result<usize> {
    if let Some(rest) = offset.strip_prefix('c').or_else(|| offset.strip_prefix('C')) {
        let runes: usize = rest
            .parse()
            .with_context(|| format!("bad rune offset {:?}", offset))?;
        Ok(rune_to_byte_offset(data, runes))
    } else {
        offset
            .parse()
            .with_context(|| format!("bad byte offset {:?}", offset))
    }
}

fn rune_to_byte_offset(data: &str, runes: usize) -> usize {
    match data.char_indices().nth(runes) {
        Some((idx, _)) => idx,
        None => data.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rune_offsets_convert_against_the_buffer() {
        let data = "héllo wörld";
        assert_eq!(rune_to_byte_offset(data, 0), 0);
        assert_eq!(rune_to_byte_offset(data, 2), 3);
        assert_eq!(rune_to_byte_offset(data, 100), data.len());
        assert_eq!(parse_cursor("c2", data).expect("rune"), 3);
        assert_eq!(parse_cursor("7", data).expect("byte"), 7);
    }

    #[test]
    fn flags_parse_before_the_subcommand() {
        let opts = parse_args(
            ["-sock", "tcp", "-addr", "127.0.0.1:9999", "lookup", "f.go", "c10"]
                .iter()
                .map(|s| s.to_string()),
        )
        .expect("parse");
        assert_eq!(opts.sock, SockType::Tcp);
        assert_eq!(opts.addr, "127.0.0.1:9999");
        assert_eq!(opts.command, vec!["lookup", "f.go", "c10"]);
    }
}
