// Purpose: Serve editor queries over a local socket until asked to exit.
// Inputs/Outputs: Accepts line-delimited JSON requests; writes one reply line per
//   request.
// Invariants: One request is served at a time; every handler runs under a panic
//   guard so a fault in the core never kills the daemon.
// Gotchas: Exit replies first, then shuts the process down after a one-second
//   grace so the reply reaches the client.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::os::unix::net::UnixListener;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::pkg::shared_cache;
use crate::query::complete::{auto_complete, Candidate};
use crate::query::lookup::lookup;
use crate::query::report::report_errors;
use crate::rpc::{
    socket_path, AutoCompleteReply, LookupInfo, LookupReply, ReportErrorsReply, Request,
    Response, SockType,
};

pub struct ServerOptions {
    pub sock: SockType,
    pub addr: String,
}

pub fn serve(opts: &ServerOptions) -> Result<()> {
    match opts.sock {
        SockType::Unix => {
            let path = socket_path();
            // A previous daemon may have died without cleanup.
            let _ = std::fs::remove_file(&path);
            let listener = UnixListener::bind(&path)
                .with_context(|| format!("bind {}", path.display()))?;
            info!(path = %path.display(), "listening on unix socket");
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        let path = path.clone();
                        std::thread::spawn(move || handle_connection(stream, Some(path)));
                    }
                    Err(err) => warn!(%err, "accept error"),
                }
            }
        }
        SockType::Tcp => {
            let listener = TcpListener::bind(&opts.addr)
                .with_context(|| format!("bind {}", opts.addr))?;
            info!(addr = %opts.addr, "listening on tcp");
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => {
                        std::thread::spawn(move || handle_connection(stream, None));
                    }
                    Err(err) => warn!(%err, "accept error"),
                }
            }
        }
    }
    Ok(())
}

fn handle_connection<S: std::io::Read + Write>(stream: S, unix_path: Option<PathBuf>) {
    let mut reader = BufReader::new(stream);
    loop {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => return,
            Ok(_) => {}
            Err(err) => {
                debug!(%err, "connection read error");
                return;
            }
        }
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(request, unix_path.as_deref()),
            Err(err) => Response {
                result: None,
                error: Some(format!("bad request: {}", err)),
            },
        };
        let encoded = match serde_json::to_string(&response) {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, "reply encoding failed");
                return;
            }
        };
        let writer = reader.get_mut();
        if writer
            .write_all(encoded.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush())
            .is_err()
        {
            return;
        }
    }
}

fn dispatch(request: Request, unix_path: Option<&Path>) -> Response {
    match request {
        Request::AutoComplete(req) => {
            let guarded = catch_unwind(AssertUnwindSafe(|| {
                let cache = shared_cache();
                cache.set_context(&req.context);
                let (candidates, len) =
                    auto_complete(&cache, Path::new(&req.filename), &req.data, req.cursor);
                AutoCompleteReply { candidates, len }
            }));
            let reply = guarded.unwrap_or_else(|_| {
                warn!(filename = %req.filename, "autocomplete panicked");
                AutoCompleteReply {
                    candidates: vec![Candidate {
                        class: "PANIC".to_string(),
                        name: "PANIC".to_string(),
                        typ: "PANIC".to_string(),
                    }],
                    len: 0,
                }
            });
            ok(json!(reply))
        }
        Request::ReportErrors(req) => {
            let guarded = catch_unwind(AssertUnwindSafe(|| {
                let cache = shared_cache();
                cache.set_context(&req.context);
                report_errors(&cache, Path::new(&req.filename), &req.data)
            }));
            let errors = guarded.unwrap_or_else(|_| {
                warn!(filename = %req.filename, "reporterrors panicked");
                Vec::new()
            });
            ok(json!(ReportErrorsReply { errors }))
        }
        Request::Lookup(req) => {
            let guarded = catch_unwind(AssertUnwindSafe(|| {
                let cache = shared_cache();
                cache.set_context(&req.context);
                let (cursor, call) =
                    lookup(&cache, Path::new(&req.filename), &req.data, req.cursor);
                LookupReply {
                    cursor: LookupInfo::from(cursor),
                    call: LookupInfo::from(call),
                }
            }));
            let reply = guarded.unwrap_or_else(|_| {
                warn!(filename = %req.filename, "lookup panicked");
                LookupReply {
                    cursor: LookupInfo {
                        call_arg: -1,
                        ..Default::default()
                    },
                    call: LookupInfo {
                        call_arg: -1,
                        ..Default::default()
                    },
                }
            });
            ok(json!(reply))
        }
        Request::Exit => {
            info!("exit requested; shutting down after grace period");
            let unix_path = unix_path.map(|p| p.to_path_buf());
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_secs(1));
                if let Some(path) = unix_path {
                    let _ = std::fs::remove_file(path);
                }
                std::process::exit(0);
            });
            ok(json!({}))
        }
    }
}

fn ok(value: serde_json::Value) -> Response {
    Response {
        result: Some(value),
        error: None,
    }
}
