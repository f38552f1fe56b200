//! Defines the path sanitizer: Unicode normalization and separator
//! canonicalization for paths delivered by the kernel, memoized behind a
//! bounded LRU.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

use moka::sync::Cache;
use unicode_normalization::UnicodeNormalization;

/// Default capacity of the sanitizer's memoization cache.
pub const DEFAULT_CACHE_CAPACITY: u64 = 8192;

/// Unicode normalization form applied to every path component before it is
/// used as an index key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum NormalizationForm {
    /// Canonical composition.
    #[value(name = "NFC")]
    Nfc,
    /// Canonical decomposition. Default: matches what macOS's NFS-backed
    /// FUSE bridge delivers, so a tree declared from a command-line
    /// enumeration on macOS still lines up with lookups from the kernel.
    #[value(name = "NFD")]
    Nfd,
    /// Compatibility composition.
    #[value(name = "NFKC")]
    Nfkc,
    /// Compatibility decomposition.
    #[value(name = "NFKD")]
    Nfkd,
    /// No normalization; bytes are compared exactly as decoded.
    None,
}

impl Default for NormalizationForm {
    fn default() -> Self {
        NormalizationForm::Nfd
    }
}

/// Normalizes one decoded path string under the given form. Pure function;
/// idempotent by construction (each form's output is already in that form).
fn apply_form(decoded: &str, form: NormalizationForm) -> String {
    match form {
        NormalizationForm::Nfc => decoded.chars().nfc().collect(),
        NormalizationForm::Nfd => decoded.chars().nfd().collect(),
        NormalizationForm::Nfkc => decoded.chars().nfkc().collect(),
        NormalizationForm::Nfkd => decoded.chars().nfkd().collect(),
        NormalizationForm::None => decoded.to_string(),
    }
}

/// Collapses runs of `/` into one and strips a single trailing `/`, except
/// for the root itself.
fn collapse_separators(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_was_slash = false;
    for c in s.chars() {
        if c == '/' {
            if prev_was_slash {
                continue;
            }
            prev_was_slash = true;
        } else {
            prev_was_slash = false;
        }
        out.push(c);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Normalizes one path component (a single name, not a whole path) under
/// the given form. Used by the tree loader, which only ever normalizes
/// single names composed from document fields.
pub fn normalize_component(name: &str, form: NormalizationForm) -> String {
    apply_form(name, form)
}

/// Sanitizes one raw, kernel-delivered path into its canonical index key:
/// decode (surrogate-tolerant), normalize, collapse separators.
///
/// Pure; does not consult or update the memoization cache. Exposed
/// separately from [`Sanitizer::sanitize`] so tests can check purity and
/// idempotence directly.
pub fn sanitize_str(raw: &str, form: NormalizationForm) -> String {
    collapse_separators(&apply_form(raw, form))
}

fn decode_lossy(raw: &OsStr) -> String {
    match raw.to_str() {
        Some(s) => s.to_string(),
        None => String::from_utf8_lossy(raw.as_bytes()).into_owned(),
    }
}

/// Thread-safe, bounded-memory path sanitizer.
///
/// The underlying transform is pure; the cache exists only to bound CPU
/// cost under repeated access to the same paths.
pub struct Sanitizer {
    form: NormalizationForm,
    cache: Cache<Vec<u8>, String>,
}

impl Sanitizer {
    /// Builds a sanitizer for the given normalization form with the
    /// recommended default cache capacity.
    pub fn new(form: NormalizationForm) -> Self {
        Self::with_capacity(form, DEFAULT_CACHE_CAPACITY)
    }

    /// Builds a sanitizer with an explicit cache capacity (entry count).
    pub fn with_capacity(form: NormalizationForm, capacity: u64) -> Self {
        Self { form, cache: Cache::new(capacity) }
    }

    /// Sanitizes a raw kernel-delivered path, consulting and populating
    /// the memoization cache.
    pub fn sanitize(&self, raw: &OsStr) -> String {
        let key = raw.as_bytes().to_vec();
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }
        let decoded = decode_lossy(raw);
        let canonical = sanitize_str(&decoded, self.form);
        self.cache.insert(key, canonical.clone());
        canonical
    }

    /// The normalization form this sanitizer applies.
    pub fn form(&self) -> NormalizationForm {
        self.form
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_redundant_separators() {
        assert_eq!(sanitize_str("/a//b///c", NormalizationForm::None), "/a/b/c");
    }

    #[test]
    fn strips_trailing_separator_except_root() {
        assert_eq!(sanitize_str("/a/b/", NormalizationForm::None), "/a/b");
        assert_eq!(sanitize_str("/", NormalizationForm::None), "/");
    }

    #[test]
    fn normalization_is_idempotent() {
        let messy = "cafe\u{0301}"; // "café" with a combining acute accent
        for form in [
            NormalizationForm::Nfc,
            NormalizationForm::Nfd,
            NormalizationForm::Nfkc,
            NormalizationForm::Nfkd,
            NormalizationForm::None,
        ] {
            let once = sanitize_str(messy, form);
            let twice = sanitize_str(&once, form);
            assert_eq!(once, twice, "not idempotent under {form:?}");
        }
    }

    #[test]
    fn nfc_and_nfd_agree_on_codepoint_count_roundtrip() {
        let precomposed = "caf\u{00e9}"; // NFC form of café
        let decomposed = sanitize_str(precomposed, NormalizationForm::Nfd);
        let recomposed = sanitize_str(&decomposed, NormalizationForm::Nfc);
        assert_eq!(recomposed, precomposed);
    }

    #[test]
    fn sanitizer_memoizes_results() {
        let s = Sanitizer::new(NormalizationForm::None);
        let raw = OsStr::new("/a//b/");
        assert_eq!(s.sanitize(raw), "/a/b");
        // second call should hit the cache and return the same value
        assert_eq!(s.sanitize(raw), "/a/b");
    }

    #[test]
    fn invalid_utf8_does_not_panic() {
        use std::os::unix::ffi::OsStrExt;
        let raw = std::ffi::OsString::from_vec(vec![b'/', 0xFF, 0xFE, b'x']);
        let s = Sanitizer::new(NormalizationForm::None);
        // must not panic; exact content is not load-bearing
        let _ = s.sanitize(&raw);
    }
}
