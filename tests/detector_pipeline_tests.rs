use repolens::{
    CommitChunker, DetectorPipeline, FileChange, GitConfig, HistoryView, RawCommit, Severity,
    SignalMetadata, SignalType,
};

fn commit(
    sha: &str,
    author: &str,
    date: &str,
    subject: &str,
    body: &str,
    files: &[&str],
) -> RawCommit {
    RawCommit {
        sha: sha.to_string(),
        author: author.to_string(),
        email: format!("{}@example.com", author.to_lowercase()),
        date: date.to_string(),
        subject: subject.to_string(),
        body: body.to_string(),
        parents: vec!["parent".to_string()],
        refs: String::new(),
        files: files
            .iter()
            .map(|f| FileChange {
                path: f.to_string(),
                additions: 5,
                deletions: 1,
                binary: false,
            })
            .collect(),
    }
}

fn build_view(commits: &[RawCommit]) -> HistoryView {
    let chunker = CommitChunker::new(GitConfig::default()).expect("chunker");
    let mut chunks = Vec::new();
    for c in commits {
        chunks.extend(chunker.chunk_commit(c, None));
    }
    HistoryView::build(chunks)
}

#[test]
fn revert_pair_scenario() {
    let view = build_view(&[
        commit(
            "aaa111",
            "Alice",
            "2024-03-01T10:00:00+00:00",
            "feat: add login",
            "",
            &["src/auth/login.ts"],
        ),
        commit(
            "bbb222",
            "Bob",
            "2024-03-03T10:00:00+00:00",
            "Revert \"feat: add login\"",
            "This reverts commit aaa111.",
            &["src/auth/login.ts"],
        ),
    ]);
    let signals = DetectorPipeline::with_all_detectors().run(&view, "2024-03-05T00:00:00Z");

    let revert = signals
        .iter()
        .find(|s| s.signal_type() == SignalType::RevertPair)
        .expect("revert signal");
    assert_eq!(revert.severity(), Severity::Caution);
    assert_eq!(revert.directory_scope(), "src/auth");
    match revert.metadata() {
        SignalMetadata::RevertPair { affected_files, .. } => {
            assert_eq!(affected_files, &["src/auth/login.ts"]);
        }
        other => panic!("wrong metadata: {:?}", other),
    }
}

#[test]
fn fix_chain_scenario() {
    let view = build_view(&[
        commit(
            "feat01",
            "Alice",
            "2024-03-01T10:00:00+00:00",
            "feat: add login",
            "",
            &["src/auth/login.ts"],
        ),
        commit(
            "fix001",
            "Bob",
            "2024-03-02T10:00:00+00:00",
            "fix: login null check",
            "",
            &["src/auth/login.ts"],
        ),
        commit(
            "fix002",
            "Bob",
            "2024-03-03T10:00:00+00:00",
            "fix: login redirect",
            "",
            &["src/auth/login.ts"],
        ),
        commit(
            "fix003",
            "Carol",
            "2024-03-04T10:00:00+00:00",
            "fix: login csrf",
            "",
            &["src/auth/login.ts"],
        ),
    ]);
    let signals = DetectorPipeline::with_all_detectors().run(&view, "2024-03-05T00:00:00Z");

    let chain = signals
        .iter()
        .find(|s| s.signal_type() == SignalType::FixChain)
        .expect("fix chain signal");
    assert_eq!(chain.severity(), Severity::Warning);
    match chain.metadata() {
        SignalMetadata::FixChain {
            fix_count,
            day_span,
            ..
        } => {
            assert_eq!(*fix_count, 3);
            assert_eq!(*day_span, 3);
        }
        other => panic!("wrong metadata: {:?}", other),
    }
}

#[test]
fn breaking_change_scenario() {
    let view = build_view(&[
        commit(
            "feat01",
            "Alice",
            "2024-03-01T10:00:00+00:00",
            "feat: rework sessions",
            "",
            &["src/auth/session.ts"],
        ),
        commit(
            "fix001",
            "Bob",
            "2024-03-01T22:00:00+00:00",
            "fix: session crash",
            "",
            &["src/auth/session.ts"],
        ),
        commit(
            "fix002",
            "Charlie",
            "2024-03-02T08:00:00+00:00",
            "fix: session cookie",
            "",
            &["src/auth/session.ts"],
        ),
    ]);
    let signals = DetectorPipeline::with_all_detectors().run(&view, "2024-03-05T00:00:00Z");

    let breaking = signals
        .iter()
        .find(|s| s.signal_type() == SignalType::BreakingChange)
        .expect("breaking change signal");
    assert_eq!(breaking.severity(), Severity::Warning);
    match breaking.metadata() {
        SignalMetadata::BreakingChange { author_count, .. } => {
            assert_eq!(*author_count, 2);
        }
        other => panic!("wrong metadata: {:?}", other),
    }
}

#[test]
fn pipeline_runs_are_deterministic() {
    let commits = vec![
        commit(
            "feat01",
            "Alice",
            "2024-03-01T10:00:00+00:00",
            "feat: add login",
            "",
            &["src/auth/login.ts"],
        ),
        commit(
            "fix001",
            "Bob",
            "2024-03-02T10:00:00+00:00",
            "fix: login null check",
            "",
            &["src/auth/login.ts"],
        ),
        commit(
            "rev001",
            "Bob",
            "2024-03-04T10:00:00+00:00",
            "Revert \"feat: add login\"",
            "This reverts commit feat01.",
            &["src/auth/login.ts"],
        ),
    ];
    let view = build_view(&commits);
    let pipeline = DetectorPipeline::with_all_detectors();

    let first = pipeline.run(&view, "2024-03-05T00:00:00Z");
    let second = pipeline.run(&view, "2024-03-05T00:00:00Z");

    let first_ids: Vec<&str> = first.iter().map(|s| s.id()).collect();
    let second_ids: Vec<&str> = second.iter().map(|s| s.id()).collect();
    assert_eq!(first_ids, second_ids);
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.summary(), b.summary());
    }
}

#[test]
fn windowed_pipeline_skips_relational_detectors() {
    let view = build_view(&[
        commit(
            "aaa111",
            "Alice",
            "2024-03-01T10:00:00+00:00",
            "feat: add login",
            "",
            &["src/auth/login.ts"],
        ),
        commit(
            "bbb222",
            "Bob",
            "2024-03-03T10:00:00+00:00",
            "Revert \"feat: add login\"",
            "This reverts commit aaa111.",
            &["src/auth/login.ts"],
        ),
    ]);
    let signals = DetectorPipeline::windowed_only().run(&view, "2024-03-05T00:00:00Z");
    assert!(signals
        .iter()
        .all(|s| s.signal_type() != SignalType::RevertPair));
}
