//! Litharvest - Multi-Source Full-Text and Citation Discovery
//!
//! This crate locates, downloads and validates the full text of biomedical
//! publications tied to dataset accessions, querying multiple scholarly
//! sources (`PubMed Central`, `Unpaywall`, `OpenAlex`, `CORE`, `Crossref`,
//! preprint servers and more) and walking the citation graph to find papers
//! that reuse a dataset.

#![allow(clippy::cognitive_complexity)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::single_match_else)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::unused_self)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::if_not_else)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::field_reassign_with_default)]

pub mod cache;
pub mod citations;
pub mod classifier;
pub mod client;
pub mod config;
pub mod error;
pub mod fetch;
pub mod identity;
pub mod pipeline;
pub mod registry;

pub use cache::TieredCache;
pub use citations::{CitationEngine, CitationHit, CitationQuery, Provenance};
pub use client::{CandidateCollector, CollectorConfig, Publication};
pub use config::{Config, ConfigOverrides};
pub use error::{Error, ErrorCategory, Result};
pub use fetch::{FetchEngine, FetchOutcome};
pub use identity::IdentifierSet;
pub use pipeline::{BatchSummary, DatasetRecord, DiscoveryPipeline, RunOptions, RunReport};
pub use registry::{FileRegistry, NoopRegistry, Registry};
