// Purpose: Client side of the RPC: connect, auto-start the daemon, call methods.
// Inputs/Outputs: A Request in, the decoded result value out.
// Invariants: A failed connect spawns the daemon detached and retries for about
//   one second before giving up.
// Gotchas: A stale unix socket file from a dead daemon is removed before the
//   spawn, or bind/connect would keep failing forever.

use std::io::{BufRead, BufReader, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use crate::rpc::{socket_path, Request, Response, SockType};

pub enum Stream {
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl std::io::Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Stream::Unix(s) => s.read(buf),
            Stream::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Stream::Unix(s) => s.write(buf),
            Stream::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Unix(s) => s.flush(),
            Stream::Tcp(s) => s.flush(),
        }
    }
}

fn dial(sock: SockType, addr: &str) -> Result<Stream> {
    match sock {
        SockType::Unix => {
            let path = socket_path();
            Ok(Stream::Unix(UnixStream::connect(&path).with_context(
                || format!("connect {}", path.display()),
            )?))
        }
        SockType::Tcp => Ok(Stream::Tcp(
            TcpStream::connect(addr).with_context(|| format!("connect {}", addr))?,
        )),
    }
}

/// Connect to the daemon, starting one when nothing answers.
pub fn connect(sock: SockType, addr: &str) -> Result<Stream> {
    if let Ok(stream) = dial(sock, addr) {
        return Ok(stream);
    }
    if sock == SockType::Unix {
        let path = socket_path();
        if path.exists() {
            let _ = std::fs::remove_file(&path);
        }
    }
    start_daemon(sock, addr)?;
    let start = Instant::now();
    loop {
        match dial(sock, addr) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                if start.elapsed() > Duration::from_secs(1) {
                    return Err(err).context("daemon did not come up");
                }
                std::thread::sleep(Duration::from_millis(20));
            }
        }
    }
}

fn start_daemon(sock: SockType, addr: &str) -> Result<()> {
    let exe = std::env::current_exe().context("locate executable")?;
    let sock_name = match sock {
        SockType::Unix => "unix",
        SockType::Tcp => "tcp",
    };
    Command::new(exe)
        .args(["-s", "-sock", sock_name, "-addr", addr])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("spawn daemon")?;
    Ok(())
}

/// One request, one reply line.
pub fn call(stream: &mut Stream, request: &Request) -> Result<serde_json::Value> {
    let encoded = serde_json::to_string(request)?;
    stream.write_all(encoded.as_bytes())?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.is_empty() {
        bail!("daemon closed the connection");
    }
    let response: Response = serde_json::from_str(&line).context("decode reply")?;
    if let Some(error) = response.error {
        bail!("{}", error);
    }
    response.result.context("reply carried no result")
}
