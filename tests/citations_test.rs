//! Citation strategies against mock upstreams: the graph fallback chain
//! and the accession-mention search.

use litharvest::citations::{CitationGraphStrategy, CitationQuery, CitationStrategy, MentionSearchStrategy};
use litharvest::client::providers::CollectContext;
use litharvest::client::RateLimiter;
use litharvest::IdentifierSet;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_context() -> CollectContext {
    CollectContext::new(
        Duration::from_secs(5),
        "test-agent/1.0",
        Arc::new(RateLimiter::new(Duration::from_millis(1))),
    )
}

fn openalex_seed_work() -> serde_json::Value {
    serde_json::json!({"id": "https://openalex.org/W42"})
}

fn openalex_citing_works() -> serde_json::Value {
    serde_json::json!({
        "results": [{
            "id": "https://openalex.org/W100",
            "doi": "https://doi.org/10.1093/nar/gkaa1000",
            "title": "A reuse paper",
            "publication_year": 2021,
            "cited_by_count": 9,
            "ids": {"pmid": "https://pubmed.ncbi.nlm.nih.gov/33290552"},
            "authorships": []
        }]
    })
}

#[tokio::test]
async fn test_graph_strategy_uses_openalex_first() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/pmid:111"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openalex_seed_work()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/works"))
        .and(query_param("filter", "cites:W42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openalex_citing_works()))
        .expect(1)
        .mount(&server)
        .await;

    let strategy =
        CitationGraphStrategy::with_base_urls(server.uri(), server.uri(), server.uri()).unwrap();
    let query = CitationQuery::new("GSE1", IdentifierSet::from_pmid("111"));

    let publications = strategy.discover(&query, &test_context()).await.unwrap();
    assert_eq!(publications.len(), 1);
    assert_eq!(
        publications[0].identifiers.pmid.as_deref(),
        Some("33290552")
    );
    assert_eq!(publications[0].citation_count, Some(9));
}

#[tokio::test]
async fn test_graph_strategy_falls_back_to_semantic_scholar() {
    let server = MockServer::start().await;
    // OpenAlex is down for this one.
    Mock::given(method("GET"))
        .and(path("/works/pmid:111"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/graph/v1/paper/PMID:111/citations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "citingPaper": {
                    "externalIds": {"DOI": "10.1016/j.cell.2022.01.001", "PubMed": "35051359"},
                    "title": "Another reuse paper",
                    "year": 2022,
                    "citationCount": 3,
                    "authors": []
                }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let strategy =
        CitationGraphStrategy::with_base_urls(server.uri(), server.uri(), server.uri()).unwrap();
    let query = CitationQuery::new("GSE1", IdentifierSet::from_pmid("111"));

    let publications = strategy.discover(&query, &test_context()).await.unwrap();
    assert_eq!(publications.len(), 1);
    assert_eq!(publications[0].identifiers.pmid.as_deref(), Some("35051359"));
}

#[tokio::test]
async fn test_graph_chain_exhausted_reports_zero_hits() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/works/doi:10.1038/nature12373"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(
            "/graph/v1/paper/DOI:10.1038/nature12373/citations",
        ))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    // Crossref still answers with the bare count; the strategy logs it and
    // returns no publications rather than erroring.
    Mock::given(method("GET"))
        .and(path("/works/10.1038/nature12373"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "message": {"is-referenced-by-count": 842}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let strategy =
        CitationGraphStrategy::with_base_urls(server.uri(), server.uri(), server.uri()).unwrap();
    let query = CitationQuery::new("GSE1", IdentifierSet::from_doi("10.1038/nature12373"));

    let publications = strategy.discover(&query, &test_context()).await.unwrap();
    assert!(publications.is_empty());
}

#[tokio::test]
async fn test_mention_search_finds_accession_users() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("query", "\"GSE52564\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "resultList": {
                "result": [{
                    "id": "24651512",
                    "pmid": "24651512",
                    "pmcid": "PMC4480640",
                    "doi": "10.1523/jneurosci.1860-14.2014",
                    "title": "An RNA-sequencing transcriptome of glia and neurons",
                    "authorString": "Zhang Y, Chen K.",
                    "journalTitle": "J Neurosci",
                    "pubYear": "2014",
                    "citedByCount": 2400
                }]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let strategy = MentionSearchStrategy::with_base_url(server.uri()).unwrap();
    // No seed publication at all: this is the Strategy B only path.
    let query = CitationQuery::new("GSE52564", IdentifierSet::default());

    let publications = strategy.discover(&query, &test_context()).await.unwrap();
    assert_eq!(publications.len(), 1);
    assert_eq!(publications[0].identifiers.pmid.as_deref(), Some("24651512"));
    assert_eq!(publications[0].year, Some(2014));
}
