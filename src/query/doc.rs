// Purpose: Harvest the doc comment above a symbol's definition.
// Inputs/Outputs: A definition Position in; the contiguous `//` block above it
//   out, in source order.
// Invariants: Reads a bounded window ending at the definition offset.
// Gotchas: The line containing the definition itself is discarded before the
//   upward walk.

use std::fs;
use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use crate::frontend::fileset::Position;

const PEEK_SIZE: usize = 100_000;

pub fn peek_doc(position: &Position) -> String {
    if !position.is_valid() {
        return String::new();
    }
    let mut file = match fs::File::open(&position.filename) {
        Ok(f) => f,
        Err(err) => {
            debug!(file = %position.filename, %err, "doc peek open failed");
            return String::new();
        }
    };
    let start = position.offset.saturating_sub(PEEK_SIZE);
    let len = position.offset - start;
    if file.seek(SeekFrom::Start(start as u64)).is_err() {
        return String::new();
    }
    let mut window = vec![0u8; len];
    let mut read = 0usize;
    while read < len {
        match file.read(&mut window[read..]) {
            Ok(0) => break,
            Ok(n) => read += n,
            Err(_) => break,
        }
    }
    window.truncate(read);

    let text = String::from_utf8_lossy(&window);
    let mut lines: Vec<&str> = text.split('\n').collect();
    // The trailing fragment belongs to the definition line.
    lines.pop();
    let mut doc: Vec<&str> = Vec::new();
    for line in lines.iter().rev() {
        let trimmed = line.trim();
        if !trimmed.starts_with("//") {
            break;
        }
        doc.push(trimmed);
    }
    doc.reverse();
    doc.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(contents: &str) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time drift")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "gosense-doc-{}-{}.go",
            std::process::id(),
            nonce
        ));
        fs::write(&path, contents).expect("write");
        path
    }

    #[test]
    fn collects_contiguous_comment_block() {
        let src = "package p\n\n// F does a thing.\n// Carefully.\nfunc F() {}\n";
        let path = temp_file(src);
        let offset = src.find("func F").expect("func offset");
        let pos = Position {
            filename: path.to_string_lossy().into_owned(),
            offset,
            line: 5,
            column: 1,
        };
        assert_eq!(peek_doc(&pos), "// F does a thing.\n// Carefully.");
        let _ = fs::remove_file(path);
    }

    #[test]
    fn stops_at_first_non_comment_line() {
        let src = "package p\n\nvar x = 1\n// Only this one.\nfunc G() {}\n";
        let path = temp_file(src);
        let offset = src.find("func G").expect("func offset");
        let pos = Position {
            filename: path.to_string_lossy().into_owned(),
            offset,
            line: 5,
            column: 1,
        };
        assert_eq!(peek_doc(&pos), "// Only this one.");
        let _ = fs::remove_file(path);
    }
}
