use std::sync::Arc;

use chrono::{Datelike, Duration, TimeZone, Utc};
use regex::Regex;
use tracing::debug;

use crate::application::{EmbeddingProvider, HistoryVectorStore};
use crate::connector::config::Config;
use crate::connector::git::GitClient;
use crate::domain::{
    DecisionClass, DomainError, Filter, GitChunk, GitChunkType, GitSearchResult, RawCommit,
    RetrievalMethod,
};

/// History chunks fetched per candidate SHA on pickaxe/blame routes.
const CHUNKS_PER_SHA: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStrategy {
    Pickaxe,
    Blame,
    TemporalVector,
    StructuredGit,
    Vector,
}

impl QueryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStrategy::Pickaxe => "pickaxe",
            QueryStrategy::Blame => "blame",
            QueryStrategy::TemporalVector => "temporal_vector",
            QueryStrategy::StructuredGit => "structured_git",
            QueryStrategy::Vector => "vector",
        }
    }
}

/// Classification outcome: the chosen strategy plus extracted parameters.
#[derive(Debug, Clone, Default)]
pub struct QueryPlan {
    pub strategy: Option<QueryStrategy>,
    pub search_string: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub author: Option<String>,
    pub date_cutoff: Option<String>,
    /// Query text with the trigger phrase removed (structured_git grep).
    pub trimmed_query: Option<String>,
}

impl QueryPlan {
    pub fn strategy(&self) -> QueryStrategy {
        self.strategy.unwrap_or(QueryStrategy::Vector)
    }
}

/// The classifier's compiled regexes, built once.
pub struct QueryClassifier {
    pickaxe_when: Regex,
    pickaxe_first: Regex,
    blame: Regex,
    blame_line: Regex,
    file_token: Regex,
    temporal: Regex,
    year: Regex,
    structured: Regex,
    commits_by: Regex,
}

impl QueryClassifier {
    pub fn new() -> Self {
        Self {
            pickaxe_when: Regex::new(r"(?i)when was (.+?) (?:introduced|added|removed)")
                .expect("static pickaxe regex"),
            pickaxe_first: Regex::new(r"(?i)first (?:introduced|added)\s+(.+)")
                .expect("static pickaxe-first regex"),
            blame: Regex::new(r"(?i)who (?:wrote|changed|modified)|this (?:line|function)|\bblame\b")
                .expect("static blame regex"),
            blame_line: Regex::new(r"(?i)line\s*(\d+)").expect("static line regex"),
            file_token: Regex::new(r"(\S+\.\w{1,5})\b").expect("static file-token regex"),
            temporal: Regex::new(
                r"(?i)\b(recently|last week|last month|yesterday|this year|since)\b",
            )
            .expect("static temporal regex"),
            year: Regex::new(r"\b(20\d{2})\b").expect("static year regex"),
            structured: Regex::new(r"(?i)what changed in|commits by")
                .expect("static structured regex"),
            commits_by: Regex::new(r"(?i)commits by\s+(\S+)").expect("static commits-by regex"),
        }
    }

    /// Regex ladder: pickaxe, blame, temporal, structured, then vector.
    pub fn classify(&self, query: &str, now: chrono::DateTime<Utc>) -> QueryPlan {
        let mut plan = QueryPlan::default();

        if let Some(caps) = self
            .pickaxe_when
            .captures(query)
            .or_else(|| self.pickaxe_first.captures(query))
        {
            plan.strategy = Some(QueryStrategy::Pickaxe);
            plan.search_string = Some(caps[1].trim().trim_matches('`').to_string());
            return plan;
        }

        if self.blame.is_match(query) {
            plan.strategy = Some(QueryStrategy::Blame);
            plan.file = self
                .file_token
                .captures(query)
                .map(|c| c[1].trim_matches('`').to_string());
            plan.line = self
                .blame_line
                .captures(query)
                .and_then(|c| c[1].parse().ok());
            return plan;
        }

        if self.temporal.is_match(query) || self.year.is_match(query) {
            plan.strategy = Some(QueryStrategy::TemporalVector);
            plan.date_cutoff = Some(self.temporal_cutoff(query, now));
            return plan;
        }

        let file = self.file_token.captures(query).map(|c| c[1].to_string());
        if self.structured.is_match(query) || file.is_some() {
            plan.strategy = Some(QueryStrategy::StructuredGit);
            plan.author = self.commits_by.captures(query).map(|c| c[1].to_string());
            plan.file = file;
            plan.trimmed_query = Some(self.trim_triggers(query));
            return plan;
        }

        // Silent fallback.
        plan.strategy = Some(QueryStrategy::Vector);
        plan
    }

    fn temporal_cutoff(&self, query: &str, now: chrono::DateTime<Utc>) -> String {
        let lowered = query.to_lowercase();
        let cutoff = if lowered.contains("yesterday") {
            now - Duration::days(1)
        } else if lowered.contains("last week") {
            now - Duration::days(7)
        } else if lowered.contains("last month") {
            now - Duration::days(30)
        } else if lowered.contains("recently") {
            now - Duration::days(14)
        } else if lowered.contains("this year") {
            Utc.with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
                .single()
                .unwrap_or(now)
        } else if let Some(caps) = self.year.captures(query) {
            let year: i32 = caps[1].parse().unwrap_or(now.year());
            Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or(now)
        } else {
            // Bare "since" with no parsable anchor: last 90 days.
            now - Duration::days(90)
        };
        cutoff.to_rfc3339()
    }

    fn trim_triggers(&self, query: &str) -> String {
        let trimmed = self.structured.replace_all(query, "");
        let trimmed = self.commits_by.replace_all(&trimmed, "");
        trimmed.trim().to_string()
    }
}

impl Default for QueryClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-facing knobs for `git-search`.
#[derive(Debug, Clone, Default)]
pub struct GitSearchParams {
    pub limit: Option<usize>,
    pub after: Option<String>,
    pub before: Option<String>,
    pub author: Option<String>,
    pub file: Option<String>,
    pub commit_type: Option<String>,
    pub sort_by_date: bool,
    pub unique_commits: bool,
}

/// Routes classified queries across vector, temporal, pickaxe, blame and
/// structured strategies, merging and scoring results.
pub struct GitQueryUseCase {
    history: Arc<dyn HistoryVectorStore>,
    provider: Arc<dyn EmbeddingProvider>,
    git: GitClient,
    config: Config,
    classifier: QueryClassifier,
}

impl GitQueryUseCase {
    pub fn new(
        history: Arc<dyn HistoryVectorStore>,
        provider: Arc<dyn EmbeddingProvider>,
        git: GitClient,
        config: Config,
    ) -> Self {
        Self {
            history,
            provider,
            git,
            config,
            classifier: QueryClassifier::new(),
        }
    }

    pub fn classify(&self, query: &str) -> QueryPlan {
        self.classifier.classify(query, Utc::now())
    }

    pub async fn execute(
        &self,
        query: &str,
        params: &GitSearchParams,
    ) -> Result<Vec<GitSearchResult>, DomainError> {
        let plan = self.classify(query);
        let limit = params.limit.unwrap_or(self.config.search_limit);
        debug!("Query strategy: {}", plan.strategy().as_str());

        let mut results = match plan.strategy() {
            QueryStrategy::Vector => {
                self.vector_search(query, &plan, params, limit, RetrievalMethod::Vector)
                    .await?
            }
            QueryStrategy::TemporalVector => {
                self.vector_search(query, &plan, params, limit, RetrievalMethod::TemporalVector)
                    .await?
            }
            QueryStrategy::Pickaxe => self.pickaxe_search(&plan, limit).await?,
            QueryStrategy::Blame => self.blame_search(query, &plan, params, limit).await?,
            QueryStrategy::StructuredGit => {
                self.structured_search(query, &plan, params, limit).await?
            }
        };

        if let Some(before) = &params.before {
            results.retain(|r| r.chunk().date() <= before.as_str());
        }
        if params.unique_commits {
            let mut seen = std::collections::HashSet::new();
            results.retain(|r| seen.insert(r.chunk().sha().to_string()));
        }
        if params.sort_by_date {
            results.sort_by(|a, b| b.chunk().date().cmp(a.chunk().date()));
        } else {
            results.sort_by(|a, b| {
                b.score()
                    .partial_cmp(&a.score())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        results.truncate(limit);
        Ok(results)
    }

    fn build_filter(&self, plan: &QueryPlan, params: &GitSearchParams) -> Option<Filter> {
        let mut parts = Vec::new();
        if let Some(after) = &params.after {
            parts.push(Filter::gt_date("date", after.clone()));
        }
        if let Some(cutoff) = &plan.date_cutoff {
            parts.push(Filter::gt_date("date", cutoff.clone()));
        }
        if let Some(author) = params.author.as_ref().or(plan.author.as_ref()) {
            parts.push(Filter::eq_str("author", author.clone()));
        }
        if let Some(file) = params.file.as_ref().or(plan.file.as_ref()) {
            parts.push(Filter::eq_str("file_path", file.clone()));
        }
        if let Some(commit_type) = &params.commit_type {
            parts.push(Filter::eq_str("commit_type", commit_type.clone()));
        }
        Filter::and(parts)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, DomainError> {
        self.provider
            .embed_single(query, Some("search_query: "))
            .await
    }

    async fn vector_search(
        &self,
        query: &str,
        plan: &QueryPlan,
        params: &GitSearchParams,
        limit: usize,
        method: RetrievalMethod,
    ) -> Result<Vec<GitSearchResult>, DomainError> {
        let vector = self.embed_query(query).await?;
        let filter = self.build_filter(plan, params);
        let hits = self
            .history
            .search(&vector, filter.as_ref(), limit * 2)
            .await?;
        Ok(hits
            .into_iter()
            .map(|(chunk, score)| GitSearchResult::new(chunk, score, method))
            .collect())
    }

    async fn chunks_for_sha(&self, sha: &str) -> Result<Vec<GitChunk>, DomainError> {
        self.history
            .find(
                Some(&Filter::eq_str("sha", sha)),
                Some(CHUNKS_PER_SHA),
            )
            .await
    }

    /// Minimal stand-in for a SHA the history index does not hold.
    fn synthesize_chunk(&self, sha: &str) -> GitChunk {
        let commit = RawCommit {
            sha: sha.to_string(),
            author: String::new(),
            email: String::new(),
            date: String::new(),
            subject: format!("commit {}", &sha[..sha.len().min(8)]),
            body: String::new(),
            parents: Vec::new(),
            refs: String::new(),
            files: Vec::new(),
        };
        GitChunk::new(
            &commit,
            GitChunkType::CommitSummary,
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            format!("commit {} (not in history index)", sha),
            DecisionClass::Unknown,
        )
    }

    async fn results_for_shas(
        &self,
        shas: &[String],
        method: RetrievalMethod,
    ) -> Result<Vec<GitSearchResult>, DomainError> {
        let mut results = Vec::new();
        for (rank, sha) in shas.iter().enumerate() {
            let score = 1.0 - rank as f32 * 0.01;
            let chunks = self.chunks_for_sha(sha).await?;
            if chunks.is_empty() {
                results.push(GitSearchResult::new(
                    self.synthesize_chunk(sha),
                    score,
                    method,
                ));
            } else {
                for chunk in chunks {
                    results.push(GitSearchResult::new(chunk, score, method));
                }
            }
        }
        Ok(results)
    }

    async fn pickaxe_search(
        &self,
        plan: &QueryPlan,
        limit: usize,
    ) -> Result<Vec<GitSearchResult>, DomainError> {
        let Some(needle) = &plan.search_string else {
            return Ok(Vec::new());
        };
        let shas = self.git.pickaxe(needle, limit).await?;
        self.results_for_shas(&shas, RetrievalMethod::Pickaxe).await
    }

    async fn blame_search(
        &self,
        query: &str,
        plan: &QueryPlan,
        params: &GitSearchParams,
        limit: usize,
    ) -> Result<Vec<GitSearchResult>, DomainError> {
        let Some(file) = plan.file.as_ref().or(params.file.as_ref()) else {
            // Not enough to blame; the vector route still answers something.
            return self
                .vector_search(query, plan, params, limit, RetrievalMethod::Vector)
                .await;
        };
        let line = plan.line.unwrap_or(1);
        let Some(sha) = self.git.blame_line(file, line).await? else {
            return Ok(Vec::new());
        };
        self.results_for_shas(&[sha], RetrievalMethod::Blame).await
    }

    async fn structured_search(
        &self,
        query: &str,
        plan: &QueryPlan,
        params: &GitSearchParams,
        limit: usize,
    ) -> Result<Vec<GitSearchResult>, DomainError> {
        let mut merged = self
            .vector_search(query, plan, params, limit, RetrievalMethod::StructuredGit)
            .await?;

        // Grep-log fallback on the query with trigger phrases trimmed;
        // an extracted author narrows it to their commits instead.
        let term = plan
            .trimmed_query
            .clone()
            .unwrap_or_else(|| query.to_string());
        let fallback_shas = if let Some(author) = params.author.as_ref().or(plan.author.as_ref()) {
            self.git.log_by_author(author, limit).await
        } else if !term.is_empty() {
            self.git.grep_log(&term, limit).await
        } else {
            Ok(Vec::new())
        };
        match fallback_shas {
            Ok(shas) => {
                let grep_results = self
                    .results_for_shas(&shas, RetrievalMethod::StructuredGit)
                    .await?;
                merged.extend(grep_results);
            }
            Err(e) => debug!("git-log fallback failed: {}", e),
        }

        // Dedupe by chunk id, keeping the better score.
        let mut seen: std::collections::HashMap<String, f32> = std::collections::HashMap::new();
        merged.retain(|r| {
            let id = r.chunk().id().to_string();
            match seen.get(&id) {
                Some(&score) if score >= r.score() => false,
                _ => {
                    seen.insert(id, r.score());
                    true
                }
            }
        });
        Ok(merged)
    }
}
