// Purpose: Describe the build context and decide which source files are active.
// Inputs/Outputs: Environment-seeded context; pure predicates over file names and
//   file heads.
// Invariants: Both predicates are pure functions of (name, head, context).
// Gotchas: GOOS=android also matches files and tags saying linux; `!!` in a
//   +build token always rejects.

use std::collections::HashSet;
use std::path::PathBuf;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub const SOURCE_EXT: &str = ".go";
pub const TEST_SUFFIX: &str = "_test.go";

/// The context fields a client sends along with every request. Any change
/// against the previous request resets all cached state.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedContext {
    #[serde(default)]
    pub goarch: String,
    #[serde(default)]
    pub goos: String,
    #[serde(default)]
    pub goroot: String,
    #[serde(default)]
    pub gopath: String,
    #[serde(default)]
    pub cgo_enabled: bool,
    #[serde(default)]
    pub compiler: String,
    #[serde(default)]
    pub build_tags: Vec<String>,
    #[serde(default)]
    pub release_tags: Vec<String>,
}

fn env_or(name: &str, def: &str) -> String {
    match std::env::var(name) {
        Ok(s) if !s.is_empty() => s,
        _ => def.to_string(),
    }
}

impl PackedContext {
    /// Seed from the daemon's environment, once at startup.
    pub fn from_env() -> Self {
        let goos = env_or("GOOS", default_goos());
        let goarch = env_or("GOARCH", default_goarch());
        let cgo_enabled = match std::env::var("CGO_ENABLED").ok().as_deref() {
            Some("1") => true,
            Some("0") => false,
            // cgo must be explicitly enabled for cross builds
            _ => goos == default_goos() && goarch == default_goarch(),
        };
        PackedContext {
            goarch,
            goos,
            goroot: env_or("GOROOT", ""),
            gopath: env_or("GOPATH", ""),
            cgo_enabled,
            compiler: "gc".to_string(),
            build_tags: Vec::new(),
            release_tags: default_release_tags(),
        }
    }

    /// Ordered list of `src/` directories searched for imports: the root
    /// first, then each workspace entry. Earlier entries shadow later ones.
    pub fn source_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if !self.goroot.is_empty() {
            dirs.push(PathBuf::from(&self.goroot).join("src"));
        }
        let sep = if cfg!(windows) { ';' } else { ':' };
        for entry in self.gopath.split(sep) {
            if !entry.is_empty() {
                dirs.push(PathBuf::from(entry).join("src"));
            }
        }
        dirs
    }

    /// Reports whether `name` carries an OS/arch suffix incompatible with
    /// this context. Recognized forms, optionally with a trailing `_test`:
    /// `name_GOOS.*`, `name_GOARCH.*`, `name_GOOS_GOARCH.*`. The portion
    /// before the first underscore never participates, so `linux.go` is not
    /// tagged while `foo_linux.go` is.
    pub fn good_os_arch_file(&self, name: &str) -> bool {
        let base = match name.find('.') {
            Some(dot) => &name[..dot],
            None => name,
        };
        let rest = match base.find('_') {
            Some(i) => &base[i..],
            None => return true,
        };
        let mut parts: Vec<&str> = rest.split('_').collect();
        if parts.last() == Some(&"test") {
            parts.pop();
        }
        let n = parts.len();
        if n >= 2 && known_os(parts[n - 2]) && known_arch(parts[n - 1]) {
            if parts[n - 1] != self.goarch {
                return false;
            }
            if self.goos == "android" && parts[n - 2] == "linux" {
                return true;
            }
            return parts[n - 2] == self.goos;
        }
        if n >= 1 && known_os(parts[n - 1]) {
            if self.goos == "android" && parts[n - 1] == "linux" {
                return true;
            }
            return parts[n - 1] == self.goos;
        }
        if n >= 1 && known_arch(parts[n - 1]) {
            return parts[n - 1] == self.goarch;
        }
        true
    }

    /// Reports whether the file head permits building. Within the leading
    /// run of `//` comments and blank lines (terminated by the first blank
    /// line before other content), every `// +build TOKENS` line must be
    /// satisfied by at least one of its space-separated tokens.
    pub fn should_build(&self, content: &[u8]) -> bool {
        // Pass 1: find the end of the leading comment/blank run.
        let mut end = 0usize;
        let mut rest = content;
        let mut consumed = 0usize;
        while !rest.is_empty() {
            let (line, next, advanced) = next_line(rest);
            let trimmed = trim_ascii(line);
            if trimmed.is_empty() {
                end = consumed + advanced;
            } else if !trimmed.starts_with(b"//") {
                break;
            }
            consumed += advanced;
            rest = next;
        }
        let head = &content[..end.min(content.len())];

        // Pass 2: evaluate each +build line in the run.
        let mut all_ok = true;
        let mut rest = head;
        while !rest.is_empty() {
            let (line, next, _) = next_line(rest);
            rest = next;
            let trimmed = trim_ascii(line);
            if let Some(comment) = trimmed.strip_prefix(b"//") {
                let comment = trim_ascii(comment);
                if comment.first() == Some(&b'+') {
                    let text = String::from_utf8_lossy(comment);
                    let mut fields = text.split_whitespace();
                    if fields.next() == Some("+build") {
                        let mut ok = false;
                        for tok in fields {
                            if self.match_tag(tok) {
                                ok = true;
                            }
                        }
                        if !ok {
                            all_ok = false;
                        }
                    }
                }
            }
        }
        all_ok
    }

    /// One +build token: a comma-separated conjunction of possibly negated
    /// names; a name matches GOOS, GOARCH, the compiler, cgo (when enabled),
    /// a user build tag, or a release tag.
    pub fn match_tag(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        if let Some(i) = name.find(',') {
            return self.match_tag(&name[..i]) && self.match_tag(&name[i + 1..]);
        }
        if name.starts_with("!!") {
            // bad syntax, reject always
            return false;
        }
        if let Some(stripped) = name.strip_prefix('!') {
            return !stripped.is_empty() && !self.match_tag(stripped);
        }
        // Tags are letters, digits, underscores or dots.
        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        {
            return false;
        }
        if self.cgo_enabled && name == "cgo" {
            return true;
        }
        if name == self.goos || name == self.goarch || name == self.compiler {
            return true;
        }
        if self.goos == "android" && name == "linux" {
            return true;
        }
        self.build_tags.iter().any(|t| t == name)
            || self.release_tags.iter().any(|t| t == name)
    }
}

fn next_line(buf: &[u8]) -> (&[u8], &[u8], usize) {
    match buf.iter().position(|&b| b == b'\n') {
        Some(i) => (&buf[..i], &buf[i + 1..], i + 1),
        None => (buf, &buf[buf.len()..], buf.len()),
    }
}

fn trim_ascii(mut buf: &[u8]) -> &[u8] {
    while let Some((first, rest)) = buf.split_first() {
        if first.is_ascii_whitespace() {
            buf = rest;
        } else {
            break;
        }
    }
    while let Some((last, rest)) = buf.split_last() {
        if last.is_ascii_whitespace() {
            buf = rest;
        } else {
            break;
        }
    }
    buf
}

const GOOS_LIST: &str =
    "android darwin dragonfly freebsd linux nacl netbsd openbsd plan9 solaris windows";
const GOARCH_LIST: &str = "386 amd64 amd64p32 arm armbe arm64 arm64be ppc64 ppc64le mips mipsle mips64 mips64le mips64p32 mips64p32le ppc s390 s390x sparc sparc64";

static KNOWN_OS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| GOOS_LIST.split_whitespace().collect());
static KNOWN_ARCH: Lazy<HashSet<&'static str>> =
    Lazy::new(|| GOARCH_LIST.split_whitespace().collect());

fn known_os(s: &str) -> bool {
    KNOWN_OS.contains(s)
}

fn known_arch(s: &str) -> bool {
    KNOWN_ARCH.contains(s)
}

fn default_goos() -> &'static str {
    if cfg!(target_os = "macos") {
        "darwin"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "freebsd") {
        "freebsd"
    } else {
        "linux"
    }
}

fn default_goarch() -> &'static str {
    if cfg!(target_arch = "x86_64") {
        "amd64"
    } else if cfg!(target_arch = "aarch64") {
        "arm64"
    } else if cfg!(target_arch = "x86") {
        "386"
    } else {
        "amd64"
    }
}

fn default_release_tags() -> Vec<String> {
    // Each release in the 1.x series adds a tag; old tags stay.
    (1..=6).map(|n| format!("go1.{}", n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(goos: &str, goarch: &str) -> PackedContext {
        PackedContext {
            goos: goos.to_string(),
            goarch: goarch.to_string(),
            compiler: "gc".to_string(),
            release_tags: default_release_tags(),
            ..Default::default()
        }
    }

    #[test]
    fn filename_predicate_matches_suffixes() {
        let linux = ctx("linux", "amd64");
        assert!(linux.good_os_arch_file("f_linux.go"));
        assert!(!linux.good_os_arch_file("f_darwin.go"));
        assert!(linux.good_os_arch_file("f_linux_amd64.go"));
        assert!(!linux.good_os_arch_file("f_linux_arm.go"));
        assert!(linux.good_os_arch_file("f_amd64_test.go"));
        assert!(!linux.good_os_arch_file("f_windows_test.go"));
    }

    #[test]
    fn bare_os_name_is_not_a_tag() {
        let linux = ctx("linux", "amd64");
        // Only the portion after the first underscore participates.
        assert!(linux.good_os_arch_file("linux.go"));
        assert!(linux.good_os_arch_file("darwin.go"));
    }

    #[test]
    fn android_matches_linux_files() {
        let android = ctx("android", "arm");
        assert!(android.good_os_arch_file("f_linux.go"));
        assert!(android.good_os_arch_file("f_android.go"));
        assert!(android.match_tag("linux"));
    }

    #[test]
    fn should_build_honors_leading_run_only() {
        let linux = ctx("linux", "amd64");
        let yes = b"// +build linux darwin\n\npackage p\n";
        let no = b"// +build windows\n\npackage p\n";
        let late = b"package p\n\n// +build windows\n";
        assert!(linux.should_build(yes));
        assert!(!linux.should_build(no));
        assert!(linux.should_build(late));
    }

    #[test]
    fn match_tag_combinators() {
        let c = PackedContext {
            goos: "linux".to_string(),
            goarch: "amd64".to_string(),
            compiler: "gc".to_string(),
            cgo_enabled: true,
            build_tags: vec!["mytag".to_string()],
            release_tags: default_release_tags(),
            ..Default::default()
        };
        assert!(c.match_tag("linux,amd64"));
        assert!(!c.match_tag("linux,windows"));
        assert!(c.match_tag("!windows"));
        assert!(!c.match_tag("!!windows"));
        assert!(c.match_tag("cgo"));
        assert!(c.match_tag("mytag"));
        assert!(c.match_tag("go1.4"));
        assert!(!c.match_tag("go2.0"));
    }

    #[test]
    fn should_build_is_monotone_under_tag_addition() {
        let mut c = ctx("linux", "amd64");
        let content = b"// +build mytag\n\npackage p\n";
        assert!(!c.should_build(content));
        c.build_tags.push("mytag".to_string());
        assert!(c.should_build(content));
    }
}
