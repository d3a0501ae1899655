//! URL classification and candidate ranking.
//!
//! `classify` is a pure function over path/extension/domain pattern tables;
//! it performs no network I/O, and the same URL always yields the same kind
//! and confidence. The classifier's priority delta is applied on top of the
//! provider-declared priority, and `rank` orders candidates with a stable
//! sort so discovery order breaks the remaining ties.

use crate::client::providers::SourceCandidate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Content-type estimate for a candidate URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UrlKind {
    /// URL that should serve raw PDF bytes.
    DirectPdf,
    /// Full text rendered as HTML (PMC article views and similar).
    HtmlFullText,
    /// Publisher/aggregator landing page; full text at least one click away.
    LandingPage,
    /// A resolver (doi.org) that redirects somewhere unknown.
    ResolverRedirect,
    Unknown,
}

impl UrlKind {
    /// Fixed, type-dependent adjustment applied to the declared priority
    /// (lower effective priority is tried first).
    pub fn priority_delta(self) -> i32 {
        match self {
            UrlKind::DirectPdf => -50,
            UrlKind::HtmlFullText => -10,
            UrlKind::ResolverRedirect => 5,
            UrlKind::LandingPage => 20,
            UrlKind::Unknown => 30,
        }
    }
}

struct Patterns {
    direct_pdf: Vec<Regex>,
    html_full_text: Vec<Regex>,
    landing_page: Vec<Regex>,
    resolver: Vec<Regex>,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let build = |exprs: &[&str]| -> Vec<Regex> {
            exprs
                .iter()
                .map(|e| Regex::new(e).unwrap_or_else(|err| panic!("bad pattern {e}: {err}")))
                .collect()
        };
        Patterns {
            direct_pdf: build(&[
                r"(?i)\.pdf($|\?)",
                r"(?i)/articles/PMC\d+/pdf",
                r"(?i)europepmc\.org/articles/PMC\d+\?pdf=render",
                r"(?i)/content/[^?]*\.full\.pdf",
                r"(?i)arxiv\.org/pdf/",
                r"(?i)[?&]render=pdf",
            ]),
            html_full_text: build(&[
                r"(?i)ncbi\.nlm\.nih\.gov/pmc/articles/PMC\d+/?($|\?)",
                r"(?i)pmc\.ncbi\.nlm\.nih\.gov/articles/PMC\d+/?($|\?)",
                r"(?i)europepmc\.org/article/",
                r"(?i)\.full($|\?)",
            ]),
            landing_page: build(&[
                r"(?i)sciencedirect\.com/science/article",
                r"(?i)link\.springer\.com/article",
                r"(?i)nature\.com/articles/",
                r"(?i)onlinelibrary\.wiley\.com/doi/(abs|full)",
                r"(?i)academic\.oup\.com/",
                r"(?i)tandfonline\.com/doi/",
                r"(?i)core\.ac\.uk/display/",
                r"(?i)openalex\.org/works/",
            ]),
            resolver: build(&[r"(?i)^https?://(dx\.)?doi\.org/", r"(?i)/resolve/doi"]),
        }
    })
}

/// Classify a candidate URL. Deterministic and idempotent; callers may
/// classify the same URL any number of times and always get the same answer.
pub fn classify(url: &str) -> (UrlKind, f32) {
    let p = patterns();

    // Direct-PDF patterns win over everything: a publisher landing host can
    // still serve an explicit .pdf path.
    if p.direct_pdf.iter().any(|re| re.is_match(url)) {
        return (UrlKind::DirectPdf, 0.95);
    }
    if p.html_full_text.iter().any(|re| re.is_match(url)) {
        return (UrlKind::HtmlFullText, 0.85);
    }
    if p.resolver.iter().any(|re| re.is_match(url)) {
        return (UrlKind::ResolverRedirect, 0.9);
    }
    if p.landing_page.iter().any(|re| re.is_match(url)) {
        return (UrlKind::LandingPage, 0.8);
    }
    (UrlKind::Unknown, 0.2)
}

/// Classify every candidate in place and return the list fully ordered:
/// effective priority first, then declared provider priority, with the
/// stable sort preserving discovery order for exact ties.
pub fn rank(mut candidates: Vec<SourceCandidate>) -> Vec<SourceCandidate> {
    for candidate in &mut candidates {
        let (kind, confidence) = classify(&candidate.url);
        candidate.kind = kind;
        candidate.confidence = confidence;
    }
    candidates.sort_by_key(|c| (c.effective_priority(), c.priority));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_direct_pdf() {
        let urls = [
            "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC7759461/pdf/main.pdf",
            "https://journals.plos.org/plosone/article/file?id=10.1371/journal.pone.0000000&type=printable&name=x.pdf",
            "https://www.biorxiv.org/content/10.1101/2020.01.01.123456v2.full.pdf",
            "https://europepmc.org/articles/PMC7759461?pdf=render",
        ];
        for url in urls {
            let (kind, confidence) = classify(url);
            assert_eq!(kind, UrlKind::DirectPdf, "url: {url}");
            assert!(confidence > 0.9);
        }
    }

    #[test]
    fn test_classify_html_and_landing() {
        assert_eq!(
            classify("https://www.ncbi.nlm.nih.gov/pmc/articles/PMC7759461/").0,
            UrlKind::HtmlFullText
        );
        assert_eq!(
            classify("https://www.nature.com/articles/s41586-020-2649-2").0,
            UrlKind::LandingPage
        );
        assert_eq!(
            classify("https://doi.org/10.1038/s41586-020-2649-2").0,
            UrlKind::ResolverRedirect
        );
        let (kind, confidence) = classify("https://example.org/some/opaque/path");
        assert_eq!(kind, UrlKind::Unknown);
        assert!(confidence < 0.5);
    }

    #[test]
    fn test_classify_is_deterministic_and_idempotent() {
        let url = "https://www.biorxiv.org/content/10.1101/2020.01.01.123456v2.full.pdf";
        let first = classify(url);
        for _ in 0..10 {
            assert_eq!(classify(url), first);
        }
    }

    #[test]
    fn test_pdf_path_on_landing_host_is_direct_pdf() {
        let (kind, _) = classify("https://link.springer.com/content/pdf/10.1007/s00125.pdf");
        assert_eq!(kind, UrlKind::DirectPdf);
    }

    #[test]
    fn test_rank_direct_pdf_beats_better_declared_priority() {
        // Landing page declared at priority 1, direct PDF at priority 3:
        // the PDF still ranks first.
        let candidates = vec![
            SourceCandidate::new(
                "https://www.nature.com/articles/s41586-020-2649-2",
                "openalex",
                1,
            ),
            SourceCandidate::new(
                "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC7759461/pdf/main.pdf",
                "pmc",
                3,
            ),
        ];

        let ranked = rank(candidates);
        assert_eq!(ranked[0].kind, UrlKind::DirectPdf);
        assert_eq!(ranked[0].provider, "pmc");
        assert_eq!(ranked[1].kind, UrlKind::LandingPage);
    }

    #[test]
    fn test_rank_never_places_landing_before_pdf_from_leq_priority() {
        let candidates = vec![
            SourceCandidate::new("https://www.nature.com/articles/a", "a", 10),
            SourceCandidate::new("https://host.example/x.pdf", "b", 40),
            SourceCandidate::new("https://link.springer.com/article/10.1/b", "c", 25),
            SourceCandidate::new("https://host.example/y.pdf", "d", 40),
        ];

        let ranked = rank(candidates);
        let last_pdf = ranked
            .iter()
            .rposition(|c| c.kind == UrlKind::DirectPdf)
            .unwrap();
        for (i, candidate) in ranked.iter().enumerate() {
            if candidate.kind == UrlKind::LandingPage {
                assert!(
                    i > last_pdf,
                    "landing page ranked before a direct PDF from lower-or-equal priority"
                );
            }
        }
    }

    #[test]
    fn test_rank_stable_for_ties() {
        let candidates = vec![
            SourceCandidate::new("https://host.example/first.pdf", "a", 30),
            SourceCandidate::new("https://host.example/second.pdf", "a", 30),
        ];
        let ranked = rank(candidates);
        assert!(ranked[0].url.ends_with("first.pdf"));
        assert!(ranked[1].url.ends_with("second.pdf"));
    }
}
