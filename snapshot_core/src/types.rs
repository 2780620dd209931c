use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;

/// Opaque byte string naming one Raft participant on this host.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Uid(pub Vec<u8>);

impl Uid {
    pub fn from_str(s: impl AsRef<str>) -> Self {
        Uid(s.as_ref().as_bytes().to_vec())
    }
}

impl Display for Uid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{:x?}", self.0),
        }
    }
}

impl<T: AsRef<str>> From<T> for Uid {
    fn from(v: T) -> Self {
        Uid::from_str(v)
    }
}

pub type Index = u64;
pub type Term = u64;

/// The `(index, term)` pair identifying a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdxTerm {
    pub index: Index,
    pub term: Term,
}

impl IdxTerm {
    pub fn new(index: Index, term: Term) -> Self {
        IdxTerm { index, term }
    }
}

impl From<(Index, Term)> for IdxTerm {
    fn from(v: (Index, Term)) -> Self {
        IdxTerm::new(v.0, v.1)
    }
}

impl Display for IdxTerm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.term, self.index)
    }
}

/// The triple `(index, term, cluster_membership)` persisted verbatim by the backend.
///
/// `cluster_membership` is opaque to the manager: it is carried through `prepare`/`write`
/// and read back by `read_meta`/`recover` but never interpreted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub index: Index,
    pub term: Term,
    pub cluster: serde_json::Value,
}

impl Meta {
    pub fn new(index: Index, term: Term, cluster: serde_json::Value) -> Self {
        Meta { index, term, cluster }
    }

    pub fn idxterm(&self) -> IdxTerm {
        IdxTerm::new(self.index, self.term)
    }
}

/// Width (in hex digits) of each half of a snapshot directory name.
///
/// `<term_hex>_<index_hex>`, each zero-padded to this width, so that lexicographic
/// ordering of directory names equals numeric ordering of `(term, index)`.
pub const DIR_NAME_HEX_WIDTH: usize = 16;

/// Render the on-disk directory name for a given `(index, term)`.
pub fn dir_name(idxterm: IdxTerm) -> String {
    format!(
        "{:0width$x}_{:0width$x}",
        idxterm.term,
        idxterm.index,
        width = DIR_NAME_HEX_WIDTH
    )
}

/// Parse a directory name back into `(index, term)`. Returns `None` if it does not match
/// the `<term_hex>_<index_hex>` shape.
pub fn parse_dir_name(name: &str) -> Option<IdxTerm> {
    let (term_hex, index_hex) = name.split_once('_')?;
    let term = Term::from_str_radix(term_hex, 16).ok()?;
    let index = Index::from_str_radix(index_hex, 16).ok()?;
    Some(IdxTerm::new(index, term))
}

/// Identity of a monitored background write worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub u64);

impl Display for WorkerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}
