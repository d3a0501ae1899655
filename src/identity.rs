//! Identifier normalization.
//!
//! Publications arrive with a scattered subset of identifiers (PMID, DOI,
//! PMC ID, preprint ID, sometimes only a title). This module canonicalizes
//! them into one [`IdentifierSet`] whose canonical key and filename are
//! deterministic regardless of which subset was supplied first.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single identifier variant, in preference order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identifier {
    Pmid(String),
    Doi(String),
    Pmcid(String),
    Preprint(String),
    /// Content hash derived from the normalized title. Universal fallback:
    /// always derivable, so every publication is addressable.
    TitleHash(String),
}

impl Identifier {
    pub fn scheme(&self) -> &'static str {
        match self {
            Identifier::Pmid(_) => "pmid",
            Identifier::Doi(_) => "doi",
            Identifier::Pmcid(_) => "pmcid",
            Identifier::Preprint(_) => "preprint",
            Identifier::TitleHash(_) => "paper",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Identifier::Pmid(v)
            | Identifier::Doi(v)
            | Identifier::Pmcid(v)
            | Identifier::Preprint(v)
            | Identifier::TitleHash(v) => v,
        }
    }
}

/// All known identifier variants for one publication.
///
/// Two sets that overlap in any variant resolve to the same merged set, and
/// therefore the same canonical key (merge-on-conflict).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl IdentifierSet {
    pub fn from_pmid(pmid: &str) -> Self {
        Self {
            pmid: normalize_pmid(pmid),
            ..Default::default()
        }
    }

    pub fn from_doi(doi: &str) -> Self {
        Self {
            doi: normalize_doi(doi),
            ..Default::default()
        }
    }

    pub fn from_title(title: &str) -> Self {
        Self {
            title: normalize_title(title),
            ..Default::default()
        }
    }

    /// Build a set from loosely structured input, cleaning each field.
    pub fn new(
        pmid: Option<&str>,
        doi: Option<&str>,
        pmcid: Option<&str>,
        preprint_id: Option<&str>,
        title: Option<&str>,
    ) -> Self {
        Self {
            pmid: pmid.and_then(normalize_pmid),
            doi: doi.and_then(normalize_doi),
            pmcid: pmcid.and_then(normalize_pmcid),
            preprint_id: preprint_id.and_then(|p| {
                let p = p.trim();
                (!p.is_empty()).then(|| p.to_string())
            }),
            title: title.and_then(normalize_title),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pmid.is_none()
            && self.doi.is_none()
            && self.pmcid.is_none()
            && self.preprint_id.is_none()
            && self.title.is_none()
    }

    /// The preferred identifier: PMID > DOI > PMC > preprint > title hash.
    ///
    /// Returns `None` only for a fully empty set, which callers reject at the
    /// input boundary.
    pub fn primary(&self) -> Option<Identifier> {
        if let Some(pmid) = &self.pmid {
            return Some(Identifier::Pmid(pmid.clone()));
        }
        if let Some(doi) = &self.doi {
            return Some(Identifier::Doi(doi.clone()));
        }
        if let Some(pmcid) = &self.pmcid {
            return Some(Identifier::Pmcid(pmcid.clone()));
        }
        if let Some(preprint) = &self.preprint_id {
            return Some(Identifier::Preprint(preprint.clone()));
        }
        self.title
            .as_ref()
            .map(|t| Identifier::TitleHash(title_hash(t)))
    }

    /// Ordered tuple of all known variants. Cache key and dedup key.
    ///
    /// Stable under merge: any set that merges into this one produces a key
    /// that is a superset, and `overlaps` + `merge` guarantee the merged set
    /// is shared by both records.
    pub fn canonical_key(&self) -> String {
        let mut parts = Vec::new();
        if let Some(pmid) = &self.pmid {
            parts.push(format!("pmid:{pmid}"));
        }
        if let Some(doi) = &self.doi {
            parts.push(format!("doi:{doi}"));
        }
        if let Some(pmcid) = &self.pmcid {
            parts.push(format!("pmcid:{pmcid}"));
        }
        if let Some(preprint) = &self.preprint_id {
            parts.push(format!("preprint:{preprint}"));
        }
        if parts.is_empty() {
            if let Some(title) = &self.title {
                parts.push(format!("paper:{}", title_hash(title)));
            }
        }
        parts.join("|")
    }

    /// Deterministic, collision-resistant filename stem:
    /// `{scheme}_{sanitized-value}`, or `paper_{12-hex}` from the title hash.
    pub fn filename(&self) -> Option<String> {
        self.primary().map(|id| match id {
            Identifier::TitleHash(hash) => format!("paper_{hash}"),
            other => format!("{}_{}", other.scheme(), sanitize(other.value())),
        })
    }

    /// True when any known variant matches the other set's.
    pub fn overlaps(&self, other: &IdentifierSet) -> bool {
        fn same(a: &Option<String>, b: &Option<String>) -> bool {
            matches!((a, b), (Some(x), Some(y)) if x == y)
        }
        same(&self.pmid, &other.pmid)
            || same(&self.doi, &other.doi)
            || same(&self.pmcid, &other.pmcid)
            || same(&self.preprint_id, &other.preprint_id)
            || match (&self.title, &other.title) {
                (Some(a), Some(b)) => title_hash(a) == title_hash(b),
                _ => false,
            }
    }

    /// Union the other set's variants into this one. Existing values win, so
    /// enrichment never destroys an authoritative identifier.
    pub fn merge(&mut self, other: &IdentifierSet) {
        if self.pmid.is_none() {
            self.pmid = other.pmid.clone();
        }
        if self.doi.is_none() {
            self.doi = other.doi.clone();
        }
        if self.pmcid.is_none() {
            self.pmcid = other.pmcid.clone();
        }
        if self.preprint_id.is_none() {
            self.preprint_id = other.preprint_id.clone();
        }
        if self.title.is_none() {
            self.title = other.title.clone();
        }
    }
}

fn normalize_pmid(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_start_matches("PMID:").trim().to_string();
    (!cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit())).then_some(cleaned)
}

/// Strip resolver prefixes the way DOIs show up in the wild.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .trim_start_matches("doi:")
        .trim_start_matches("https://doi.org/")
        .trim_start_matches("http://doi.org/")
        .trim_start_matches("https://dx.doi.org/")
        .trim_start_matches("http://dx.doi.org/")
        .trim()
        .to_lowercase();
    (cleaned.starts_with("10.") && cleaned.contains('/')).then_some(cleaned)
}

fn normalize_pmcid(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_start_matches("PMC").trim().to_string();
    (!cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit()))
        .then(|| format!("PMC{cleaned}"))
}

fn normalize_title(raw: &str) -> Option<String> {
    let cleaned = raw.trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

/// First 12 hex characters of the SHA-256 of the normalized title
/// (lowercased, whitespace collapsed).
pub fn title_hash(title: &str) -> String {
    let normalized = title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let digest = Sha256::digest(normalized.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..12].to_string()
}

/// Collapse filesystem-hostile characters to `_`.
fn sanitize(value: &str) -> String {
    const INVALID: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|', ' '];
    let mut out = String::with_capacity(value.len());
    let mut last_was_underscore = false;
    for c in value.chars() {
        if INVALID.contains(&c) || c.is_control() {
            if !last_was_underscore {
                out.push('_');
                last_was_underscore = true;
            }
        } else {
            out.push(c);
            last_was_underscore = false;
        }
    }
    out.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_preference_order() {
        let full = IdentifierSet::new(
            Some("33199918"),
            Some("10.1038/s41586-020-2649-2"),
            Some("PMC7759461"),
            Some("2020.01.01.123456"),
            Some("Array programming with NumPy"),
        );
        assert_eq!(
            full.primary(),
            Some(Identifier::Pmid("33199918".to_string()))
        );

        let no_pmid = IdentifierSet::new(
            None,
            Some("10.1038/s41586-020-2649-2"),
            Some("PMC7759461"),
            None,
            None,
        );
        assert_eq!(
            no_pmid.primary(),
            Some(Identifier::Doi("10.1038/s41586-020-2649-2".to_string()))
        );

        let title_only = IdentifierSet::from_title("Array programming with NumPy");
        assert!(matches!(
            title_only.primary(),
            Some(Identifier::TitleHash(_))
        ));
    }

    #[test]
    fn test_canonical_key_stable_under_merge() {
        let mut a = IdentifierSet::from_pmid("33199918");
        let b = IdentifierSet::new(
            Some("33199918"),
            Some("10.1038/s41586-020-2649-2"),
            None,
            None,
            None,
        );
        assert!(a.overlaps(&b));

        a.merge(&b);
        let mut c = IdentifierSet::from_doi("10.1038/s41586-020-2649-2");
        c.merge(&a);
        assert_eq!(a.canonical_key(), c.canonical_key());
        assert_eq!(
            a.canonical_key(),
            "pmid:33199918|doi:10.1038/s41586-020-2649-2"
        );
    }

    #[test]
    fn test_doi_prefix_stripping() {
        for raw in [
            "10.1038/nature12373",
            "doi:10.1038/nature12373",
            "https://doi.org/10.1038/nature12373",
            "http://dx.doi.org/10.1038/nature12373",
            "  10.1038/NATURE12373  ",
        ] {
            assert_eq!(
                normalize_doi(raw),
                Some("10.1038/nature12373".to_string()),
                "raw: {raw}"
            );
        }
        assert_eq!(normalize_doi("not-a-doi"), None);
        assert_eq!(normalize_doi("10.1038"), None);
    }

    #[test]
    fn test_pmcid_normalization() {
        assert_eq!(normalize_pmcid("PMC7759461"), Some("PMC7759461".to_string()));
        assert_eq!(normalize_pmcid("7759461"), Some("PMC7759461".to_string()));
        assert_eq!(normalize_pmcid("abc"), None);
    }

    #[test]
    fn test_filename_derivation() {
        let pmid = IdentifierSet::from_pmid("33199918");
        assert_eq!(pmid.filename(), Some("pmid_33199918".to_string()));

        let doi = IdentifierSet::from_doi("10.1038/s41586-020-2649-2");
        assert_eq!(
            doi.filename(),
            Some("doi_10.1038_s41586-020-2649-2".to_string())
        );

        let titled = IdentifierSet::from_title("Array programming with NumPy");
        let name = titled.filename().unwrap();
        assert!(name.starts_with("paper_"));
        assert_eq!(name.len(), "paper_".len() + 12);
    }

    #[test]
    fn test_title_hash_normalization_invariance() {
        assert_eq!(
            title_hash("Array Programming with NumPy"),
            title_hash("  array   programming WITH numpy ")
        );
        assert_ne!(
            title_hash("Array programming with NumPy"),
            title_hash("A different paper entirely")
        );
    }

    #[test]
    fn test_empty_set_has_no_primary() {
        let empty = IdentifierSet::default();
        assert!(empty.is_empty());
        assert_eq!(empty.primary(), None);
        assert_eq!(empty.filename(), None);
    }

    #[test]
    fn test_sanitize_collapses_runs() {
        assert_eq!(sanitize("10.1101/2020.01.01::v2"), "10.1101_2020.01.01_v2");
        assert_eq!(sanitize("a b  c"), "a_b_c");
    }
}
