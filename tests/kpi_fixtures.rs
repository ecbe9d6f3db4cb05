use geo_dashboard::filters::Dimension;
use geo_dashboard::kpi::{group_records, KpiMetrics, KpiSummary};
use geo_dashboard::models::LlmResponseRecord;

fn fixture() -> Vec<LlmResponseRecord> {
    let raw = std::fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/llm_responses.json"))
        .expect("fixture readable");
    serde_json::from_str(&raw).expect("fixture decodes")
}

#[test]
fn fixture_totals_give_expected_metrics() {
    let records = fixture();
    let summary = KpiSummary::from_records(&records);

    assert_eq!(summary.total_responses, 8);
    assert_eq!(summary.brand_mentioned, 5);
    assert_eq!(summary.brand_citation_with_link, 3);
    assert_eq!(summary.competitor_mentions["Deezer"], 3);
    assert_eq!(summary.competitor_mentions["Apple Music"], 3);
    assert_eq!(
        summary.metrics(),
        KpiMetrics {
            visibility: 63,
            share_of_voice: 45,
            citation_rate: 60,
        }
    );
}

#[test]
fn every_grouping_recombines_to_the_overall_summary() {
    let records = fixture();
    let overall = KpiSummary::from_records(&records);

    for dimension in Dimension::ALL {
        let groups = group_records(&records, dimension);
        assert!(!groups.is_empty(), "no groups for {dimension}");

        for (key, summary) in &groups {
            assert!(summary.citations_consistent(), "{dimension}={key} cites more than it mentions");
            assert!(summary.brand_mentioned <= summary.total_responses);
        }

        let recombined = KpiSummary::combine(groups.values());
        assert_eq!(recombined.total_responses, overall.total_responses, "{dimension}");
        assert_eq!(recombined.brand_mentioned, overall.brand_mentioned, "{dimension}");
        assert_eq!(recombined.brand_citation_with_link, overall.brand_citation_with_link, "{dimension}");
        assert_eq!(recombined.competitor_total(), overall.competitor_total(), "{dimension}");
    }
}

#[test]
fn grouping_by_region_splits_counts() {
    let records = fixture();
    let groups = group_records(&records, Dimension::Region);

    assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["France", "Global", "USA"]);
    assert_eq!(groups["France"].total_responses, 3);
    assert_eq!(groups["France"].brand_mentioned, 2);
    assert_eq!(groups["France"].metrics().citation_rate, 100);
    assert_eq!(groups["Global"].competitor_mentions.get("Deezer"), Some(&0));
}
