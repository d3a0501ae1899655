//! Source provider implementations.
//!
//! One module per external source, all implementing [`SourceProvider`].
//! Near-identical sources are collapsed into data-driven types: the two
//! preprint servers share [`preprints::PreprintProvider`] and the two
//! last-resort mirror networks share [`mirrors::MirrorProvider`].

pub mod core;
pub mod crossref;
pub mod institutional;
pub mod mirrors;
pub mod openalex;
pub mod preprints;
pub mod pubmed_central;
pub mod traits;
pub mod unpaywall;

pub use core::CoreProvider;
pub use crossref::CrossrefProvider;
pub use institutional::InstitutionalProvider;
pub use mirrors::MirrorProvider;
pub use openalex::OpenAlexProvider;
pub use preprints::{PreprintProvider, PreprintServer};
pub use pubmed_central::PubMedCentralProvider;
pub use traits::{CollectContext, ProviderError, SourceCandidate, SourceProvider};
pub use unpaywall::UnpaywallProvider;
