use chrono::{TimeZone, Utc};
use repolens::{QueryClassifier, QueryStrategy};

fn classify(query: &str) -> repolens::QueryPlan {
    let now = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).single().unwrap();
    QueryClassifier::new().classify(query, now)
}

#[test]
fn when_was_introduced_routes_to_pickaxe() {
    let plan = classify("when was parseConfig introduced");
    assert_eq!(plan.strategy(), QueryStrategy::Pickaxe);
    assert_eq!(plan.search_string.as_deref(), Some("parseConfig"));
}

#[test]
fn removal_queries_also_route_to_pickaxe() {
    let plan = classify("when was legacyAuth removed");
    assert_eq!(plan.strategy(), QueryStrategy::Pickaxe);
    assert_eq!(plan.search_string.as_deref(), Some("legacyAuth"));
}

#[test]
fn who_wrote_routes_to_blame_with_file_and_line() {
    let plan = classify("who wrote src/auth/login.ts line 42");
    assert_eq!(plan.strategy(), QueryStrategy::Blame);
    assert_eq!(plan.file.as_deref(), Some("src/auth/login.ts"));
    assert_eq!(plan.line, Some(42));
}

#[test]
fn time_expressions_route_to_temporal_vector() {
    for query in [
        "what changed recently",
        "bugs fixed last week",
        "work from last month",
        "deployments yesterday",
        "features shipped this year",
    ] {
        let plan = classify(query);
        assert_eq!(
            plan.strategy(),
            QueryStrategy::TemporalVector,
            "query: {}",
            query
        );
        assert!(plan.date_cutoff.is_some(), "query: {}", query);
    }
}

#[test]
fn bare_year_routes_to_temporal_vector() {
    let plan = classify("migrations in 2023");
    assert_eq!(plan.strategy(), QueryStrategy::TemporalVector);
    assert!(plan.date_cutoff.unwrap().starts_with("2023-01-01"));
}

#[test]
fn commits_by_routes_to_structured_git() {
    let plan = classify("commits by alice");
    assert_eq!(plan.strategy(), QueryStrategy::StructuredGit);
    assert_eq!(plan.author.as_deref(), Some("alice"));
}

#[test]
fn plain_questions_fall_back_to_vector() {
    let plan = classify("how does the session cache work");
    assert_eq!(plan.strategy(), QueryStrategy::Vector);
    assert!(plan.search_string.is_none());
    assert!(plan.file.is_none());
}
