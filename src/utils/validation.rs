use std::path::{Component, Path};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::digest;

static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]+([._-][a-z0-9]+)*(/[a-z0-9]+([._-][a-z0-9]+)*)*$").unwrap()
});

static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_][a-zA-Z0-9._-]{0,127}$").unwrap());

static SESSION_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$").unwrap()
});

/// Repository names are `/`-separated lowercase components. The component
/// charset alone rules out `.`/`..` path segments, backslashes and NULs.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && NAME_RE.is_match(name)
}

pub fn is_valid_tag(tag: &str) -> bool {
    TAG_RE.is_match(tag)
}

/// Upload session ids are hyphenated RFC 4122 v4 UUIDs, as issued.
pub fn is_valid_session_id(id: &str) -> bool {
    SESSION_ID_RE.is_match(id)
}

pub fn is_valid_digest(s: &str) -> bool {
    digest::is_valid(s)
}

/// A manifest reference is either a digest or a tag.
pub fn is_valid_reference(reference: &str) -> bool {
    is_valid_digest(reference) || is_valid_tag(reference)
}

/// Second line of defense behind the validators above: a path derived from
/// request input must stay under the storage root. The candidate is checked
/// lexically (the target may not exist yet, so `canonicalize` is not an
/// option) and must not traverse upward.
pub fn is_contained(root: &Path, candidate: &Path) -> bool {
    if !candidate.starts_with(root) {
        return false;
    }
    candidate
        .strip_prefix(root)
        .map(|rest| {
            rest.components()
                .all(|c| matches!(c, Component::Normal(_)))
        })
        .unwrap_or(false)
}
