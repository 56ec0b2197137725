//! Canonical object encoding and hashing.
//!
//! Every object is hashed as `"<kind> <len>\0" + body` with SHA-256, so an
//! id is a pure function of the object's type and bytes.
//!
//! # Formats
//!
//! ```text
//! tree:   repeated  "<octal mode> <name>\0" <32 raw id bytes>
//! commit: tree <hex>\n
//!         parent <hex>\n          (zero or more, in order)
//!         author <name> <<email>> <unix seconds> <+hhmm>\n
//!         \n
//!         <message>
//! ```

use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::types::{
    Commit, EntryMode, OBJECT_ID_LEN, ObjectId, ObjectKind, Signature, TreeEntry,
    validate_entry_name,
};

/// Compute the id of an object of `kind` with the given body.
#[must_use]
pub fn hash_object(kind: ObjectKind, body: &[u8]) -> ObjectId {
    let mut hasher = Sha256::new();
    hasher.update(header(kind, body.len()));
    hasher.update(body);
    ObjectId::from_bytes(hasher.finalize().into())
}

/// The `"<kind> <len>\0"` header that prefixes every stored object.
#[must_use]
pub fn header(kind: ObjectKind, len: usize) -> Vec<u8> {
    format!("{} {len}\0", kind.as_str()).into_bytes()
}

/// Split a framed object (`header + body`) into its kind and body.
///
/// # Errors
/// Returns [`StoreError::Corrupt`] if the header is malformed or the length
/// does not match the body.
pub fn split_framed<'a>(id: &ObjectId, framed: &'a [u8]) -> Result<(ObjectKind, &'a [u8]), StoreError> {
    let corrupt = |message: &str| StoreError::Corrupt {
        id: id.to_string(),
        message: message.to_owned(),
    };
    let nul = framed
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| corrupt("missing header terminator"))?;
    let header = std::str::from_utf8(&framed[..nul]).map_err(|_| corrupt("non-UTF-8 header"))?;
    let (tag, len) = header
        .split_once(' ')
        .ok_or_else(|| corrupt("malformed header"))?;
    let kind = ObjectKind::parse(tag).ok_or_else(|| corrupt("unknown object kind"))?;
    let len: usize = len.parse().map_err(|_| corrupt("malformed length"))?;
    let body = &framed[nul + 1..];
    if body.len() != len {
        return Err(corrupt("length mismatch"));
    }
    Ok((kind, body))
}

// ---------------------------------------------------------------------------
// Trees
// ---------------------------------------------------------------------------

/// Validate and canonicalize tree entries: names checked, sorted by name,
/// duplicates rejected.
///
/// # Errors
/// Returns [`StoreError::InvalidPath`] for a bad name and
/// [`StoreError::InvalidTree`] for duplicate names.
pub fn canonical_entries(entries: &[TreeEntry]) -> Result<Vec<TreeEntry>, StoreError> {
    let mut sorted = entries.to_vec();
    for entry in &sorted {
        validate_entry_name(&entry.name)?;
    }
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(pair) = sorted.windows(2).find(|w| w[0].name == w[1].name) {
        return Err(StoreError::InvalidTree {
            message: format!("duplicate entry name `{}`", pair[0].name),
        });
    }
    Ok(sorted)
}

/// Encode already-canonical tree entries.
#[must_use]
pub fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * (OBJECT_ID_LEN + 24));
    for entry in entries {
        out.extend_from_slice(entry.mode.as_octal().as_bytes());
        out.push(b' ');
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0);
        out.extend_from_slice(entry.id.as_bytes());
    }
    out
}

/// Decode a tree body.
///
/// # Errors
/// Returns [`StoreError::Corrupt`] on any framing problem, an invalid entry
/// name, or entries that are unsorted or duplicated.
pub fn decode_tree(id: &ObjectId, body: &[u8]) -> Result<Vec<TreeEntry>, StoreError> {
    let corrupt = |message: String| StoreError::Corrupt {
        id: id.to_string(),
        message,
    };
    let mut entries = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let space = rest
            .iter()
            .position(|b| *b == b' ')
            .ok_or_else(|| corrupt("tree entry without mode".to_owned()))?;
        let mode_str = std::str::from_utf8(&rest[..space])
            .map_err(|_| corrupt("non-UTF-8 mode".to_owned()))?;
        let mode = EntryMode::from_octal(mode_str)
            .ok_or_else(|| corrupt(format!("unknown mode {mode_str}")))?;
        rest = &rest[space + 1..];

        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| corrupt("unterminated entry name".to_owned()))?;
        let name = std::str::from_utf8(&rest[..nul])
            .map_err(|_| corrupt("non-UTF-8 entry name".to_owned()))?
            .to_owned();
        rest = &rest[nul + 1..];
        validate_entry_name(&name).map_err(|e| corrupt(e.to_string()))?;
        if let Some(prev) = entries.last().map(|e: &TreeEntry| e.name.as_str()) {
            if prev >= name.as_str() {
                return Err(corrupt(format!("entry `{name}` out of order after `{prev}`")));
            }
        }

        if rest.len() < OBJECT_ID_LEN {
            return Err(corrupt(format!("truncated id for entry `{name}`")));
        }
        let mut raw = [0u8; OBJECT_ID_LEN];
        raw.copy_from_slice(&rest[..OBJECT_ID_LEN]);
        rest = &rest[OBJECT_ID_LEN..];

        entries.push(TreeEntry {
            name,
            mode,
            id: ObjectId::from_bytes(raw),
        });
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Commits
// ---------------------------------------------------------------------------

/// Encode a commit body.
#[must_use]
pub fn encode_commit(commit: &Commit) -> Vec<u8> {
    let mut out = String::new();
    out.push_str(&format!("tree {}\n", commit.tree));
    for parent in &commit.parents {
        out.push_str(&format!("parent {parent}\n"));
    }
    out.push_str(&format!("author {}\n", encode_signature(&commit.author)));
    out.push('\n');
    out.push_str(&commit.message);
    out.into_bytes()
}

fn encode_signature(sig: &Signature) -> String {
    let sign = if sig.tz_offset_minutes < 0 { '-' } else { '+' };
    let offset = sig.tz_offset_minutes.unsigned_abs();
    format!(
        "{} <{}> {} {sign}{:02}{:02}",
        sig.name,
        sig.email,
        sig.timestamp,
        offset / 60,
        offset % 60
    )
}

/// Decode a commit body.
///
/// # Errors
/// Returns [`StoreError::Corrupt`] on any malformed header.
pub fn decode_commit(id: &ObjectId, body: &[u8]) -> Result<Commit, StoreError> {
    let corrupt = |message: &str| StoreError::Corrupt {
        id: id.to_string(),
        message: message.to_owned(),
    };
    let text = std::str::from_utf8(body).map_err(|_| corrupt("non-UTF-8 commit"))?;
    let (headers, message) = text
        .split_once("\n\n")
        .ok_or_else(|| corrupt("missing header/message separator"))?;

    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = None;
    for line in headers.lines() {
        let (key, value) = line
            .split_once(' ')
            .ok_or_else(|| corrupt("malformed header line"))?;
        match key {
            "tree" => tree = Some(value.parse().map_err(|_| corrupt("bad tree id"))?),
            "parent" => parents.push(value.parse().map_err(|_| corrupt("bad parent id"))?),
            "author" => author = Some(decode_signature(value).ok_or_else(|| corrupt("bad author"))?),
            _ => return Err(corrupt("unknown header")),
        }
    }

    Ok(Commit {
        tree: tree.ok_or_else(|| corrupt("missing tree header"))?,
        parents,
        author: author.ok_or_else(|| corrupt("missing author header"))?,
        message: message.to_owned(),
    })
}

fn decode_signature(value: &str) -> Option<Signature> {
    let open = value.rfind(" <")?;
    let close = value.rfind("> ")?;
    if close < open {
        return None;
    }
    let name = value[..open].to_owned();
    let email = value[open + 2..close].to_owned();
    let (timestamp, tz) = value[close + 2..].split_once(' ')?;
    let timestamp: i64 = timestamp.parse().ok()?;
    if tz.len() != 5 {
        return None;
    }
    let sign = match &tz[..1] {
        "+" => 1,
        "-" => -1,
        _ => return None,
    };
    let hours: i32 = tz[1..3].parse().ok()?;
    let minutes: i32 = tz[3..5].parse().ok()?;
    Some(Signature {
        name,
        email,
        timestamp,
        tz_offset_minutes: sign * (hours * 60 + minutes),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
