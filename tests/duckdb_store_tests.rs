use std::sync::Arc;

use repolens::{
    ChangeFrequency, ChunkType, CodeChunk, CodeVectorStore, DecisionClass, DuckdbStore,
    FileProfile, Filter, GitChunk, GitChunkType, HistoryVectorStore, Language, ProfileStore,
    RawCommit, Severity, Signal, SignalMetadata, SignalStore, SignalType, TemporalScope,
};
use tempfile::tempdir;

fn unit_vector(dim: usize, hot_index: usize) -> Vec<f32> {
    let mut v = vec![0.0; dim];
    v[hot_index] = 1.0;
    v
}

fn code_chunk(path: &str, name: &str) -> CodeChunk {
    CodeChunk::new(
        path.to_string(),
        "root".to_string(),
        name.to_string(),
        ChunkType::Function,
        1,
        5,
        format!("// file: {}\n\nfn {}() {{}}", path, name),
        Language::TypeScript,
    )
}

fn history_chunk(sha: &str, subject: &str, file_path: &str) -> GitChunk {
    let commit = RawCommit {
        sha: sha.to_string(),
        author: "Alice".to_string(),
        email: "alice@example.com".to_string(),
        date: "2024-03-01T12:00:00+00:00".to_string(),
        subject: subject.to_string(),
        body: String::new(),
        parents: vec!["parent".to_string()],
        refs: String::new(),
        files: vec![],
    };
    let chunk_type = if file_path.is_empty() {
        GitChunkType::CommitSummary
    } else {
        GitChunkType::FileDiff
    };
    GitChunk::new(
        &commit,
        chunk_type,
        file_path.to_string(),
        "feat".to_string(),
        String::new(),
        String::new(),
        format!("{}: {}", subject, file_path),
        DecisionClass::Unknown,
    )
}

#[tokio::test]
async fn code_store_save_and_search_round_trip() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(DuckdbStore::open(&dir.path().join("repolens.duckdb")).expect("open"));
    let code = store.code();
    code.init(8).await.expect("init");

    let chunk = code_chunk("src/add.ts", "add");
    let vector = unit_vector(8, 0);
    code.overwrite(std::slice::from_ref(&chunk), &[vector.clone()])
        .await
        .expect("overwrite");

    let results = code.search(&vector, None, 3).await.expect("search");
    assert!(!results.is_empty());
    assert_eq!(results[0].chunk().id(), chunk.id());
    assert!(results[0].score() > 0.99, "expected near-identical score");
}

#[tokio::test]
async fn code_store_delete_by_path_filter_empties_scoped_queries() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(DuckdbStore::open(&dir.path().join("repolens.duckdb")).expect("open"));
    let code = store.code();
    code.init(8).await.expect("init");

    let kept = code_chunk("src/kept.ts", "kept");
    let doomed = code_chunk("src/doomed.ts", "doomed");
    code.overwrite(
        &[kept.clone(), doomed.clone()],
        &[unit_vector(8, 0), unit_vector(8, 1)],
    )
    .await
    .expect("overwrite");
    assert_eq!(code.count().await.expect("count"), 2);

    let deleted = code
        .delete(&Filter::eq_str("file_path", "src/doomed.ts"))
        .await
        .expect("delete");
    assert_eq!(deleted, 1);

    // Scoped query comes back empty, unscoped still sees the other path.
    let scoped = code
        .search(
            &unit_vector(8, 1),
            Some(&Filter::eq_str("file_path", "src/doomed.ts")),
            5,
        )
        .await
        .expect("scoped search");
    assert!(scoped.is_empty());

    let unscoped = code.search(&unit_vector(8, 0), None, 5).await.expect("search");
    assert_eq!(unscoped[0].chunk().file_path(), "src/kept.ts");
}

#[tokio::test]
async fn code_store_like_prefix_filter_scopes_directory() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(DuckdbStore::open(&dir.path().join("repolens.duckdb")).expect("open"));
    let code = store.code();
    code.init(8).await.expect("init");

    code.overwrite(
        &[
            code_chunk("src/auth/login.ts", "login"),
            code_chunk("src/billing/pay.ts", "pay"),
        ],
        &[unit_vector(8, 0), unit_vector(8, 0)],
    )
    .await
    .expect("overwrite");

    let results = code
        .search(
            &unit_vector(8, 0),
            Some(&Filter::like_prefix("file_path", "src/auth/")),
            5,
        )
        .await
        .expect("search");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk().file_path(), "src/auth/login.ts");
}

#[tokio::test]
async fn history_store_append_and_find_by_sha() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(DuckdbStore::open(&dir.path().join("repolens.duckdb")).expect("open"));
    let history = store.history();
    history.init(8).await.expect("init");

    let summary = history_chunk("abc123", "feat: add login", "");
    let diff = history_chunk("abc123", "feat: add login", "src/auth/login.ts");
    history
        .overwrite(
            &[summary.clone(), diff.clone()],
            &[unit_vector(8, 0), unit_vector(8, 1)],
        )
        .await
        .expect("overwrite");

    let by_sha = history
        .find(Some(&Filter::eq_str("sha", "abc123")), None)
        .await
        .expect("find");
    assert_eq!(by_sha.len(), 2);

    let summaries_only = history
        .find(
            Some(
                &Filter::and(vec![
                    Filter::eq_str("sha", "abc123"),
                    Filter::eq_str("chunk_type", "commit_summary"),
                ])
                .unwrap(),
            ),
            None,
        )
        .await
        .expect("find summaries");
    assert_eq!(summaries_only.len(), 1);
    assert_eq!(summaries_only[0].chunk_type(), GitChunkType::CommitSummary);
}

#[tokio::test]
async fn history_store_date_filter() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(DuckdbStore::open(&dir.path().join("repolens.duckdb")).expect("open"));
    let history = store.history();
    history.init(8).await.expect("init");

    let chunk = history_chunk("abc123", "feat: add login", "");
    history
        .overwrite(&[chunk], &[unit_vector(8, 0)])
        .await
        .expect("overwrite");

    let recent = history
        .search(
            &unit_vector(8, 0),
            Some(&Filter::gt_date("date", "2024-01-01T00:00:00+00:00")),
            5,
        )
        .await
        .expect("search");
    assert_eq!(recent.len(), 1);

    let future = history
        .search(
            &unit_vector(8, 0),
            Some(&Filter::gt_date("date", "2030-01-01T00:00:00+00:00")),
            5,
        )
        .await
        .expect("search");
    assert!(future.is_empty());
}

fn sample_signal(scope: &str) -> Signal {
    Signal::new(
        SignalType::ChurnHotspot,
        &[scope, "churn"],
        format!("churn in {}", scope),
        Severity::Caution,
        0.8,
        scope.to_string(),
        vec!["abc123".to_string()],
        TemporalScope::new("2024-01-01T00:00:00+00:00", "2024-03-01T00:00:00+00:00"),
        SignalMetadata::ChurnHotspot {
            file: format!("{}/hot.ts", scope),
            change_count: 9,
            mean: 2.0,
            std_dev: 1.5,
            sigma_distance: 4.6,
            trend: repolens::ChurnTrend::Increasing,
        },
        DecisionClass::Unknown,
        "2024-03-02T00:00:00Z".to_string(),
    )
}

#[tokio::test]
async fn root_scoped_signals_visible_to_every_directory() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(DuckdbStore::open(&dir.path().join("repolens.duckdb")).expect("open"));
    let signals = store.signals();
    signals.init(8).await.expect("init");

    let root_signal = sample_signal(".");
    let scoped_signal = sample_signal("src/foo");
    let other_signal = sample_signal("src/bar");
    signals
        .overwrite(
            &[root_signal.clone(), scoped_signal.clone(), other_signal],
            &[unit_vector(8, 0), unit_vector(8, 1), unit_vector(8, 2)],
        )
        .await
        .expect("overwrite");

    let visible = signals.for_directory("src/foo").await.expect("for_directory");
    let ids: Vec<&str> = visible.iter().map(|s| s.id()).collect();
    assert!(ids.contains(&root_signal.id()));
    assert!(ids.contains(&scoped_signal.id()));
    assert_eq!(visible.len(), 2);
}

#[tokio::test]
async fn signal_metadata_round_trips_through_store() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(DuckdbStore::open(&dir.path().join("repolens.duckdb")).expect("open"));
    let signals = store.signals();
    signals.init(8).await.expect("init");

    let signal = sample_signal("src/core");
    signals
        .overwrite(std::slice::from_ref(&signal), &[unit_vector(8, 0)])
        .await
        .expect("overwrite");

    let all = signals.all().await.expect("all");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id(), signal.id());
    assert_eq!(all[0].metadata(), signal.metadata());
    assert_eq!(all[0].severity(), Severity::Caution);
}

#[tokio::test]
async fn profile_store_get_and_prefix_lookup() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(DuckdbStore::open(&dir.path().join("repolens.duckdb")).expect("open"));
    let profiles = store.profiles();
    profiles.init().await.expect("init");

    let profile = FileProfile::new(
        "src/auth/login.ts".to_string(),
        None,
        3,
        12,
        1,
        0,
        ChangeFrequency::Weekly,
        "2024-03-01T00:00:00+00:00".to_string(),
        vec!["sig1".to_string()],
    );
    profiles
        .overwrite(std::slice::from_ref(&profile))
        .await
        .expect("overwrite");

    let fetched = profiles
        .get("src/auth/login.ts")
        .await
        .expect("get")
        .expect("profile exists");
    assert_eq!(fetched.total_changes(), 12);
    assert_eq!(fetched.stability_score(), profile.stability_score());
    assert_eq!(fetched.active_signal_ids(), profile.active_signal_ids());

    let under_auth = profiles.for_prefix("src/auth/").await.expect("prefix");
    assert_eq!(under_auth.len(), 1);
    let under_billing = profiles.for_prefix("src/billing/").await.expect("prefix");
    assert!(under_billing.is_empty());
}

#[tokio::test]
async fn overwrite_replaces_previous_generation() {
    let dir = tempdir().expect("tempdir");
    let store = Arc::new(DuckdbStore::open(&dir.path().join("repolens.duckdb")).expect("open"));
    let code = store.code();
    code.init(8).await.expect("init");

    code.overwrite(
        &[code_chunk("src/old.ts", "old")],
        &[unit_vector(8, 0)],
    )
    .await
    .expect("first overwrite");
    code.overwrite(
        &[code_chunk("src/new.ts", "new")],
        &[unit_vector(8, 0)],
    )
    .await
    .expect("second overwrite");

    assert_eq!(code.count().await.expect("count"), 1);
    let results = code.search(&unit_vector(8, 0), None, 5).await.expect("search");
    assert_eq!(results[0].chunk().file_path(), "src/new.ts");
}
