// Purpose: Wire protocol types shared by daemon and client.
// Inputs/Outputs: Line-delimited JSON envelopes over a unix or TCP socket.
// Invariants: Every request carries the full PackedContext; replies are exactly
//   one of result or error.
// Gotchas: The buffer travels as a JSON string; cursor offsets are bytes by the
//   time they reach the daemon.

pub mod client;
pub mod server;

use serde::{Deserialize, Serialize};

use crate::pkg::PackedContext;
use crate::query::complete::Candidate;
use crate::query::lookup::LookupResult;
use crate::query::report::ReportedError;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Request {
    AutoComplete(AutoCompleteRequest),
    ReportErrors(ReportErrorsRequest),
    Lookup(LookupRequest),
    Exit,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutoCompleteRequest {
    pub filename: String,
    pub data: String,
    pub cursor: usize,
    pub context: PackedContext,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportErrorsRequest {
    pub filename: String,
    pub data: String,
    pub context: PackedContext,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LookupRequest {
    pub filename: String,
    pub data: String,
    pub cursor: usize,
    pub context: PackedContext,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AutoCompleteReply {
    pub candidates: Vec<Candidate>,
    pub len: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportErrorsReply {
    pub errors: Vec<ReportedError>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LookupInfo {
    pub path: String,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub name: String,
    #[serde(rename = "type")]
    pub typ: String,
    pub doc: String,
    pub call_arg: i64,
}

impl From<LookupResult> for LookupInfo {
    fn from(lu: LookupResult) -> Self {
        LookupInfo {
            path: lu.position.filename,
            line: lu.position.line,
            column: lu.position.column,
            offset: lu.position.offset,
            name: lu.name,
            typ: lu.typ,
            doc: lu.doc,
            call_arg: lu.call_arg,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LookupReply {
    pub cursor: LookupInfo,
    pub call: LookupInfo,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SockType {
    Unix,
    Tcp,
}

impl SockType {
    pub fn parse(s: &str) -> Option<SockType> {
        match s {
            "unix" => Some(SockType::Unix),
            "tcp" => Some(SockType::Tcp),
            _ => None,
        }
    }
}

/// Where the unix-domain socket lives for this user.
pub fn socket_path() -> std::path::PathBuf {
    let base = directories::BaseDirs::new()
        .and_then(|d| d.runtime_dir().map(|p| p.to_path_buf()))
        .unwrap_or_else(std::env::temp_dir);
    base.join(format!("gosense-daemon.{}", whoami()))
}

fn whoami() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "default".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_round_trips() {
        let req = Request::AutoComplete(AutoCompleteRequest {
            filename: "/tmp/x.go".to_string(),
            data: "package main\n".to_string(),
            cursor: 8,
            context: PackedContext::default(),
        });
        let line = serde_json::to_string(&req).expect("encode");
        assert!(line.contains("\"method\":\"AutoComplete\""));
        let back: Request = serde_json::from_str(&line).expect("decode");
        match back {
            Request::AutoComplete(r) => assert_eq!(r.cursor, 8),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn exit_has_no_params() {
        let line = serde_json::to_string(&Request::Exit).expect("encode");
        let back: Request = serde_json::from_str(&line).expect("decode");
        assert!(matches!(back, Request::Exit));
    }
}
