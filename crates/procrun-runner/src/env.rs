//! Environment normalization
//!
//! Child environments are ordered `KEY=VALUE` lists. Before spawning, the
//! list is deduplicated so that the last occurrence of each key wins, and
//! entries containing NUL are rejected. Malformed entries without `=` are
//! kept verbatim.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use thiserror::Error;

/// Rules applied while normalizing an environment list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvPolicy {
    /// Compare keys ignoring case (Windows).
    pub case_insensitive: bool,
    /// Accept NUL inside entries (platforms that use NUL as a list separator).
    pub nul_allowed: bool,
}

impl EnvPolicy {
    /// Policy of the platform this binary was compiled for.
    #[must_use]
    pub const fn native() -> Self {
        Self {
            case_insensitive: cfg!(windows),
            nul_allowed: false,
        }
    }
}

impl Default for EnvPolicy {
    fn default() -> Self {
        Self::native()
    }
}

/// Errors found while normalizing an environment list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    #[error("exec: environment variable contains NUL ({} entries rejected)", rejected.len())]
    ContainsNul {
        /// Rejected entries, lossily decoded, in original order.
        rejected: Vec<String>,
    },
}

/// Result of [`dedup_env`]: the sanitized list plus any error found.
///
/// The list is usable even when `error` is set; offending entries were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deduped {
    pub entries: Vec<OsString>,
    pub error: Option<EnvError>,
}

impl Deduped {
    /// Fail if any entry was rejected, otherwise return the entries.
    pub fn into_result(self) -> Result<Vec<OsString>, EnvError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.entries),
        }
    }
}

/// Deduplicate `env`, keeping the last occurrence of every key and the
/// relative order of the survivors.
#[must_use]
pub fn dedup_env<S: AsRef<OsStr>>(env: &[S], policy: EnvPolicy) -> Deduped {
    let mut out: Vec<OsString> = Vec::with_capacity(env.len());
    let mut seen: HashSet<Vec<u8>> = HashSet::with_capacity(env.len());
    let mut rejected = Vec::new();

    // Walk backwards so the first sighting of a key is its last occurrence.
    for kv in env.iter().rev() {
        let kv = kv.as_ref();
        let bytes = kv.as_encoded_bytes();

        if !policy.nul_allowed && bytes.contains(&0) {
            rejected.push(kv.to_string_lossy().into_owned());
            continue;
        }

        let Some(eq) = key_end(bytes) else {
            if !bytes.is_empty() {
                out.push(kv.to_os_string());
            }
            continue;
        };

        let key = normalize_key(&bytes[..eq], policy);
        if seen.insert(key) {
            out.push(kv.to_os_string());
        }
    }

    out.reverse();
    rejected.reverse();

    Deduped {
        entries: out,
        error: (!rejected.is_empty()).then_some(EnvError::ContainsNul { rejected }),
    }
}

/// Index of the `=` separating key and value.
///
/// A leading `=` belongs to the key (Windows keeps per-drive working
/// directories under names like `=C:`), so the search restarts at index 1.
/// An entry that is only a leading `=` plus value yields an empty key.
fn key_end(bytes: &[u8]) -> Option<usize> {
    let i = bytes.iter().position(|&b| b == b'=')?;
    if i > 0 {
        return Some(i);
    }
    Some(bytes[1..].iter().position(|&b| b == b'=').map_or(0, |j| j + 1))
}

fn normalize_key(key: &[u8], policy: EnvPolicy) -> Vec<u8> {
    if policy.case_insensitive {
        String::from_utf8_lossy(key).to_lowercase().into_bytes()
    } else {
        key.to_vec()
    }
}

/// Split a normalized entry into key and value.
///
/// Returns `None` for entries without a separator, which cannot be expressed
/// as a key/value pair when spawning.
#[must_use]
pub fn split_entry(kv: &OsStr) -> Option<(OsString, OsString)> {
    let bytes = kv.as_encoded_bytes();
    let eq = key_end(bytes)?;
    if eq == 0 {
        // "=value" with no key at all
        return None;
    }
    // SAFETY: both halves come from `as_encoded_bytes` split at an ASCII
    // '=', which is a valid boundary for the platform encoding.
    let (key, value) = unsafe {
        (
            OsStr::from_encoded_bytes_unchecked(&bytes[..eq]),
            OsStr::from_encoded_bytes_unchecked(&bytes[eq + 1..]),
        )
    };
    Some((key.to_os_string(), value.to_os_string()))
}

/// Whether `env` already defines `key` under `policy`.
#[must_use]
pub fn contains_key<S: AsRef<OsStr>>(env: &[S], key: &str, policy: EnvPolicy) -> bool {
    let want = normalize_key(key.as_bytes(), policy);
    env.iter().any(|kv| {
        let bytes = kv.as_ref().as_encoded_bytes();
        key_end(bytes).is_some_and(|eq| normalize_key(&bytes[..eq], policy) == want)
    })
}

/// Render a key/value pair as a raw entry.
#[must_use]
pub fn join_entry(key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> OsString {
    let mut kv = key.as_ref().to_os_string();
    kv.push("=");
    kv.push(value);
    kv
}
