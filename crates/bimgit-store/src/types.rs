//! Core value types for the bimgit object model.
//!
//! These types form the vocabulary shared between the
//! [`ObjectStore`](crate::ObjectStore) trait and the engine crate. None of
//! them know how objects are laid out on disk; that is a backend detail.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// ObjectId
// ---------------------------------------------------------------------------

/// Length of an object id in bytes (SHA-256).
pub const OBJECT_ID_LEN: usize = 32;

/// A content-addressed object identifier (SHA-256, 32 bytes).
///
/// Stored as raw bytes for cheap comparison, hashing, and `Copy` semantics.
/// Displays as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Create an `ObjectId` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Return the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// The first 12 hex characters, for human-facing output.
    #[must_use]
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(12);
        s
    }

    /// Return `true` if `s` looks like a full hex object id.
    #[must_use]
    pub fn is_hex_id(s: &str) -> bool {
        s.len() == OBJECT_ID_LEN * 2 && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short())
    }
}

impl FromStr for ObjectId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != OBJECT_ID_LEN * 2 {
            return Err(StoreError::InvalidObjectId {
                value: s.to_owned(),
                reason: format!(
                    "expected {} hex characters, got {}",
                    OBJECT_ID_LEN * 2,
                    s.len()
                ),
            });
        }
        let mut bytes = [0u8; OBJECT_ID_LEN];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let invalid = |b: u8| StoreError::InvalidObjectId {
                value: s.to_owned(),
                reason: format!("invalid hex digit '{}'", b as char),
            };
            let hi = hex_digit(chunk[0]).ok_or_else(|| invalid(chunk[0]))?;
            let lo = hex_digit(chunk[1]).ok_or_else(|| invalid(chunk[1]))?;
            bytes[i] = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for ObjectId {
    type Error = StoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.to_string()
    }
}

const fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// ObjectKind
// ---------------------------------------------------------------------------

/// The three object types held by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Opaque file content.
    Blob,
    /// A directory listing.
    Tree,
    /// A snapshot of a tree plus lineage and metadata.
    Commit,
}

impl ObjectKind {
    /// The tag written in the object header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }

    pub(crate) fn parse(tag: &str) -> Option<Self> {
        match tag {
            "blob" => Some(Self::Blob),
            "tree" => Some(Self::Tree),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BranchName
// ---------------------------------------------------------------------------

/// Prefix under which branch refs live.
pub const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// A validated branch name (the part after `refs/heads/`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new `BranchName`, validating it.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidBranchName`] if the name is empty, has a
    /// leading `-` or `/`, a trailing `/` or `.lock`, contains `..`, `//`,
    /// whitespace, control characters, or any of `~^:?*[\`.
    pub fn new(name: &str) -> Result<Self, StoreError> {
        Self::validate(name)?;
        Ok(Self(name.to_owned()))
    }

    /// Return the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The full ref name, e.g. `refs/heads/main`.
    #[must_use]
    pub fn ref_name(&self) -> String {
        format!("{BRANCH_REF_PREFIX}{}", self.0)
    }

    fn validate(name: &str) -> Result<(), StoreError> {
        let reject = |reason: &str| {
            Err(StoreError::InvalidBranchName {
                value: name.to_owned(),
                reason: reason.to_owned(),
            })
        };
        if name.is_empty() {
            return reject("branch name must not be empty");
        }
        if name.starts_with('-') || name.starts_with('/') {
            return reject("branch name must not start with '-' or '/'");
        }
        if name.ends_with('/') || name.ends_with(".lock") || name.ends_with('.') {
            return reject("branch name must not end with '/', '.' or '.lock'");
        }
        if name.contains("..") || name.contains("//") {
            return reject("branch name must not contain '..' or '//'");
        }
        if name
            .split('/')
            .any(|component| component.starts_with('.'))
        {
            return reject("branch name components must not start with '.'");
        }
        if let Some(c) = name
            .chars()
            .find(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(*c))
        {
            return reject(&format!("branch name must not contain {c:?}"));
        }
        Ok(())
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BranchName {
    type Err = StoreError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BranchName {
    type Error = StoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

// ---------------------------------------------------------------------------
// Tree types
// ---------------------------------------------------------------------------

/// The mode of a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    /// Regular file (`100644`).
    File,
    /// Executable file (`100755`).
    Executable,
    /// Subdirectory (`40000`).
    Directory,
}

impl EntryMode {
    /// Octal mode string as serialized in tree objects.
    #[must_use]
    pub const fn as_octal(self) -> &'static str {
        match self {
            Self::File => "100644",
            Self::Executable => "100755",
            Self::Directory => "40000",
        }
    }

    pub(crate) fn from_octal(s: &str) -> Option<Self> {
        match s {
            "100644" => Some(Self::File),
            "100755" => Some(Self::Executable),
            "40000" => Some(Self::Directory),
            _ => None,
        }
    }

    /// Return `true` for file modes (anything that points at a blob).
    #[must_use]
    pub const fn is_file(self) -> bool {
        !self.is_dir()
    }

    /// Return `true` for the directory mode.
    #[must_use]
    pub const fn is_dir(self) -> bool {
        matches!(self, Self::Directory)
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Entry name (a single path segment, never containing `/`).
    pub name: String,
    /// The entry mode.
    pub mode: EntryMode,
    /// Id of the blob or subtree this entry points to.
    pub id: ObjectId,
}

impl TreeEntry {
    /// Convenience constructor for a regular file entry.
    #[must_use]
    pub fn file(name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            mode: EntryMode::File,
            id,
        }
    }

    /// Convenience constructor for a subdirectory entry.
    #[must_use]
    pub fn dir(name: impl Into<String>, id: ObjectId) -> Self {
        Self {
            name: name.into(),
            mode: EntryMode::Directory,
            id,
        }
    }
}

/// Validate a single tree entry name.
///
/// # Errors
/// Returns [`StoreError::InvalidPath`] if the name is empty, `.`, `..`, or
/// contains `/` or NUL.
pub fn validate_entry_name(name: &str) -> Result<(), StoreError> {
    let reason = if name.is_empty() {
        "empty path segment"
    } else if name == "." || name == ".." {
        "relative path segment"
    } else if name.contains('/') {
        "path segment contains '/'"
    } else if name.contains('\0') {
        "path segment contains NUL"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidPath {
        path: name.to_owned(),
        reason: reason.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// Commit types
// ---------------------------------------------------------------------------

/// Identity and time of a commit author.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// Display name. `<`, `>` and newlines are stripped.
    pub name: String,
    /// Email address. `<`, `>` and newlines are stripped.
    pub email: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Timezone offset from UTC in minutes.
    pub tz_offset_minutes: i32,
}

impl Signature {
    /// Create a signature with an explicit timestamp (UTC).
    #[must_use]
    pub fn new(name: &str, email: &str, timestamp: i64) -> Self {
        Self {
            name: sanitize_ident(name),
            email: sanitize_ident(email),
            timestamp,
            tz_offset_minutes: 0,
        }
    }

    /// Create a signature stamped with the current wall-clock time.
    #[must_use]
    pub fn now(name: &str, email: &str) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX));
        Self::new(name, email, timestamp)
    }
}

fn sanitize_ident(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '<' | '>' | '\n' | '\r' | '\0'))
        .collect::<String>()
        .trim()
        .to_owned()
}

/// A decoded commit object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commit {
    /// Root tree of the snapshot.
    pub tree: ObjectId,
    /// Parent commits: none for a root commit, one normally, two for merges.
    pub parents: Vec<ObjectId>,
    /// Who made the commit, and when.
    pub author: Signature,
    /// Free-form message.
    pub message: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_roundtrip_hex() {
        let hex = "0123456789abcdef".repeat(4);
        let id: ObjectId = hex.parse().unwrap();
        assert_eq!(id.to_string(), hex);
        assert_eq!(id.short(), "0123456789ab");
    }

    #[test]
    fn object_id_rejects_short() {
        assert!("abc".parse::<ObjectId>().is_err());
    }

    #[test]
    fn object_id_rejects_non_hex() {
        assert!("g".repeat(64).parse::<ObjectId>().is_err());
    }

    #[test]
    fn object_id_serde_as_hex_string() {
        let id = ObjectId::from_bytes([0xab; 32]);
        let s: String = id.into();
        assert_eq!(s, "ab".repeat(32));
        assert_eq!(ObjectId::try_from(s).unwrap(), id);
    }

    #[test]
    fn branch_name_accepts_common_names() {
        for name in ["main", "feature/walls", "release-1.2", "user_x"] {
            assert!(BranchName::new(name).is_ok(), "{name} should be valid");
        }
    }

    #[test]
    fn branch_name_rejects_bad_names() {
        for name in [
            "", "-x", "/x", "x/", "a..b", "a b", "a~1", "x.lock", "a//b", ".hidden", "a/.b",
        ] {
            assert!(BranchName::new(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn branch_ref_name() {
        let b = BranchName::new("main").unwrap();
        assert_eq!(b.ref_name(), "refs/heads/main");
    }

    #[test]
    fn entry_name_validation() {
        assert!(validate_entry_name("model.ifc").is_ok());
        assert!(validate_entry_name("").is_err());
        assert!(validate_entry_name("..").is_err());
        assert!(validate_entry_name("a/b").is_err());
    }

    #[test]
    fn signature_strips_angle_brackets() {
        let sig = Signature::new("Ada <Admin>", "<ada@example.com>", 7);
        assert_eq!(sig.name, "Ada Admin");
        assert_eq!(sig.email, "ada@example.com");
    }
}
