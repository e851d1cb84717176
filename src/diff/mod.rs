use crate::error::diff_error::{MalformedHeaderSnafu, UnsupportedExtendedHeaderSnafu};
use crate::error::DiffError;

/// Kind of change git reports for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
}

impl ChangeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ChangeKind::Added => "Added",
            ChangeKind::Modified => "Modified",
            ChangeKind::Deleted => "Deleted",
            ChangeKind::Renamed => "Renamed",
            ChangeKind::Copied => "Copied",
            ChangeKind::TypeChanged => "Type Changed",
        }
    }
}

/// One line of a parsed hunk body. `text` keeps the raw diff line including
/// its `+`/`-`/space prefix, so joining the lines back reproduces the patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine {
    HunkHeader {
        from_line: u32,
        to_line: u32,
        text: String,
    },
    Added {
        to_line: u32,
        text: String,
    },
    Deleted {
        from_line: u32,
        text: String,
    },
    Unchanged {
        from_line: u32,
        to_line: u32,
        text: String,
    },
}

impl DiffLine {
    pub fn text(&self) -> &str {
        match self {
            DiffLine::HunkHeader { text, .. }
            | DiffLine::Added { text, .. }
            | DiffLine::Deleted { text, .. }
            | DiffLine::Unchanged { text, .. } => text,
        }
    }
}

/// Everything parsed out of one `diff --git` section.
#[derive(Debug, Clone)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub from_path: String,
    pub to_path: String,
    pub old_mode: Option<String>,
    pub new_mode: Option<String>,
    pub is_mode_changed: bool,
    pub new_file_mode: Option<String>,
    pub deleted_file_mode: Option<String>,
    pub similarity_index: Option<u32>,
    pub is_binary: bool,
    pub old_blob: Option<String>,
    pub new_blob: Option<String>,
    pub added_count: u32,
    pub deleted_count: u32,
    pub lines: Vec<DiffLine>,
    /// Position of this file in the commit's name-status file list, used for
    /// repository-browser anchor links.
    pub index: Option<usize>,
}

impl FileChange {
    fn new(from_path: String, to_path: String) -> Self {
        Self {
            kind: ChangeKind::Modified,
            from_path,
            to_path,
            old_mode: None,
            new_mode: None,
            is_mode_changed: false,
            new_file_mode: None,
            deleted_file_mode: None,
            similarity_index: None,
            is_binary: false,
            old_blob: None,
            new_blob: None,
            added_count: 0,
            deleted_count: 0,
            lines: Vec::new(),
            index: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.to_path
    }

    /// Identical-content renames and copies carry no `---`/`+++` header pair.
    pub fn suppresses_content_headers(&self) -> bool {
        matches!(self.kind, ChangeKind::Renamed | ChangeKind::Copied)
            && self.similarity_index == Some(100)
    }
}

/// Parse one `diff --git` section (header line through end of section) into a
/// FileChange. The section must start with the header line; extended header
/// lines follow in any order until the first hunk header or the end of the
/// section. An unrecognized extended header line is a fatal error rather than
/// being skipped, since it signals a diff dialect this parser does not know.
pub fn parse_file_section(lines: &[String]) -> Result<FileChange, DiffError> {
    let (header, rest) = lines.split_first().ok_or_else(|| {
        MalformedHeaderSnafu {
            line: String::new(),
        }
        .build()
    })?;

    let (from_path, to_path) = parse_header(header)?;
    let mut change = FileChange::new(from_path, to_path);

    let mut idx = 0;
    while idx < rest.len() && !rest[idx].starts_with("@@") {
        parse_extended_header(&mut change, &rest[idx])?;
        idx += 1;
    }

    parse_body(&mut change, &rest[idx..]);
    Ok(change)
}

/// Extract the two paths from `diff --git <a-path> <b-path>`. Paths may
/// contain spaces and may be git-quoted; the ` b/` (or ` "b/`) separator is
/// searched from the right, mirroring how git itself prints the line.
fn parse_header(line: &str) -> Result<(String, String), DiffError> {
    let malformed = || MalformedHeaderSnafu { line }.build();

    let rest = line.strip_prefix("diff --git ").ok_or_else(malformed)?;

    let plain = rest.rfind(" b/");
    let quoted = rest.rfind(" \"b/");
    let split = match (plain, quoted) {
        (Some(p), Some(q)) => p.max(q),
        (Some(p), None) => p,
        (None, Some(q)) => q,
        (None, None) => return Err(malformed()),
    };

    let from_path = strip_side(&rest[..split], "a/").ok_or_else(malformed)?;
    let to_path = strip_side(&rest[split + 1..], "b/").ok_or_else(malformed)?;
    Ok((from_path, to_path))
}

fn strip_side(raw: &str, prefix: &str) -> Option<String> {
    unescape_path(raw)
        .strip_prefix(prefix)
        .map(|path| path.to_string())
}

/// Undo git's path quoting: a surrounding pair of double quotes with `\\`,
/// `\"` and octal `\NNN` escapes. Escaped bytes are reassembled and decoded
/// as UTF-8 (lossily when the bytes are not valid UTF-8). Unquoted paths are
/// returned as-is.
pub fn unescape_path(path: &str) -> String {
    let inner = match path
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(inner) => inner,
        None => return path.to_string(),
    };

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.peek() {
            Some('\\') => {
                chars.next();
                bytes.push(b'\\');
            }
            Some('"') => {
                chars.next();
                bytes.push(b'"');
            }
            Some(d) if d.is_digit(8) => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 3 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(v) => {
                            chars.next();
                            value = value * 8 + v;
                            digits += 1;
                        }
                        None => break,
                    }
                }
                bytes.push(value as u8);
            }
            _ => bytes.push(b'\\'),
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

fn parse_extended_header(change: &mut FileChange, line: &str) -> Result<(), DiffError> {
    let parsed = parse_ordinary_change(change, line)
        || parse_add_and_remove(change, line)
        || parse_copy_and_rename(change, line)
        || parse_binary_file_change(change, line)
        || parse_mode_change(change, line);
    if parsed {
        Ok(())
    } else {
        Err(UnsupportedExtendedHeaderSnafu { line }.build())
    }
}

fn parse_ordinary_change(change: &mut FileChange, line: &str) -> bool {
    if let Some(payload) = line.strip_prefix("--- ") {
        if payload == "/dev/null" {
            change.kind = ChangeKind::Added;
            return true;
        }
        return unescape_path(payload).starts_with("a/");
    }
    if let Some(payload) = line.strip_prefix("+++ ") {
        if payload == "/dev/null" {
            change.kind = ChangeKind::Deleted;
            return true;
        }
        return unescape_path(payload).starts_with("b/");
    }
    if let Some(payload) = line.strip_prefix("index ") {
        if let Some((old, new)) = parse_blob_pair(payload) {
            change.old_blob = Some(old);
            change.new_blob = Some(new);
            return true;
        }
    }
    false
}

fn parse_blob_pair(payload: &str) -> Option<(String, String)> {
    let (old, rest) = payload.split_once("..")?;
    let new = rest.split(' ').next().unwrap_or(rest);
    let is_blob = |s: &str| s.len() >= 7 && s.bytes().all(|b| b.is_ascii_hexdigit());
    if is_blob(old) && is_blob(new) {
        Some((old.to_string(), new.to_string()))
    } else {
        None
    }
}

fn parse_add_and_remove(change: &mut FileChange, line: &str) -> bool {
    if let Some(mode) = line.strip_prefix("new file mode ") {
        change.kind = ChangeKind::Added;
        change.new_file_mode = Some(mode.to_string());
        true
    } else if let Some(mode) = line.strip_prefix("deleted file mode ") {
        change.kind = ChangeKind::Deleted;
        change.deleted_file_mode = Some(mode.to_string());
        true
    } else {
        false
    }
}

fn parse_copy_and_rename(change: &mut FileChange, line: &str) -> bool {
    if line.starts_with("rename from ") || line.starts_with("rename to ") {
        change.kind = ChangeKind::Renamed;
        true
    } else if line.starts_with("copy from ") || line.starts_with("copy to ") {
        change.kind = ChangeKind::Copied;
        true
    } else if let Some(payload) = line.strip_prefix("similarity index ") {
        match payload.strip_suffix('%').and_then(|n| n.parse().ok()) {
            Some(percent) => {
                change.similarity_index = Some(percent);
                true
            }
            None => false,
        }
    } else {
        false
    }
}

fn parse_binary_file_change(change: &mut FileChange, line: &str) -> bool {
    let payload = match line
        .strip_prefix("Binary files ")
        .and_then(|rest| rest.strip_suffix(" differ"))
    {
        Some(payload) => payload,
        None => return false,
    };
    let split = match payload.rfind(" and ") {
        Some(split) => split,
        None => return false,
    };
    let old_side = &payload[..split];
    let new_side = &payload[split + 5..];

    change.is_binary = true;
    change.kind = if old_side == "/dev/null" {
        ChangeKind::Added
    } else if new_side == "/dev/null" {
        ChangeKind::Deleted
    } else {
        ChangeKind::Modified
    };
    true
}

fn parse_mode_change(change: &mut FileChange, line: &str) -> bool {
    if let Some(mode) = line.strip_prefix("old mode ") {
        change.old_mode = Some(mode.to_string());
        change.is_mode_changed = true;
        true
    } else if let Some(mode) = line.strip_prefix("new mode ") {
        change.new_mode = Some(mode.to_string());
        change.is_mode_changed = true;
        true
    } else if let Some(payload) = line.strip_prefix("mode ") {
        // Combined-diff form `mode P1[,P2..]..N`: the first parent mode is
        // dropped, the remaining parent modes form the old side.
        let (left, right) = match payload.split_once("..") {
            Some(pair) => pair,
            None => return false,
        };
        let (_, old) = match left.split_once(',') {
            Some(pair) => pair,
            None => return false,
        };
        change.old_mode = Some(old.to_string());
        change.new_mode = Some(right.to_string());
        change.is_mode_changed = true;
        true
    } else {
        false
    }
}

fn parse_body(change: &mut FileChange, lines: &[String]) {
    let mut from_offset: u32 = 0;
    let mut to_offset: u32 = 0;

    for line in lines {
        if let Some((from_start, to_start)) = parse_hunk_header(line) {
            from_offset = from_start;
            to_offset = to_start;
            change.lines.push(DiffLine::HunkHeader {
                from_line: from_start,
                to_line: to_start,
                text: line.clone(),
            });
        } else if line.starts_with('+') {
            change.added_count += 1;
            change.lines.push(DiffLine::Added {
                to_line: to_offset,
                text: line.clone(),
            });
            to_offset += 1;
        } else if line.starts_with('-') {
            change.deleted_count += 1;
            change.lines.push(DiffLine::Deleted {
                from_line: from_offset,
                text: line.clone(),
            });
            from_offset += 1;
        } else {
            change.lines.push(DiffLine::Unchanged {
                from_line: from_offset,
                to_line: to_offset,
                text: line.clone(),
            });
            from_offset += 1;
            to_offset += 1;
        }
    }
}

/// Parse `@@ -F[,n] +T[,n] @@ ...` into the two starting offsets.
fn parse_hunk_header(line: &str) -> Option<(u32, u32)> {
    let rest = line.strip_prefix("@@ -")?;
    let (from_start, rest) = take_number(rest)?;
    let rest = rest.trim_start_matches(|c: char| c == ',' || c.is_ascii_digit());
    let rest = rest.strip_prefix(" +")?;
    let (to_start, _) = take_number(rest)?;
    Some((from_start, to_start))
}

fn take_number(s: &str) -> Option<(u32, &str)> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse().ok().map(|n| (n, &s[end..]))
}
