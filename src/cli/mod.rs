use clap::{Subcommand, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortOrder {
    Relevance,
    Date,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Index the repository's source tree
    Index {
        /// Force a full re-index, ignoring the saved checkpoint
        #[arg(long)]
        full: bool,

        /// Re-index only files touched in the last 30 days
        #[arg(long)]
        recent: bool,

        #[arg(long)]
        repo: Option<String>,

        /// Embedding provider (ollama or openai)
        #[arg(long)]
        provider: Option<String>,

        /// Embedding model name
        #[arg(long)]
        model: Option<String>,
    },

    /// Search the code index
    Query {
        text: String,

        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        /// Restrict results to paths under this prefix
        #[arg(long)]
        filter: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show code-index statistics
    Stats {
        #[arg(long)]
        repo: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Write a starter .repolensrc.json to the repo root
    Init {
        #[arg(long)]
        repo: Option<String>,
    },

    /// Index the repository's commit history
    GitIndex {
        #[arg(long)]
        full: bool,

        #[arg(long)]
        repo: Option<String>,

        /// Stop after this many commits
        #[arg(long)]
        max_commits: Option<usize>,

        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        model: Option<String>,
    },

    /// Search the history index
    GitSearch {
        query: String,

        /// Only commits after this ISO date
        #[arg(long)]
        after: Option<String>,

        /// Only commits before this ISO date
        #[arg(long)]
        before: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        file: Option<String>,

        /// Conventional-commit type (feat, fix, ...)
        #[arg(long = "type")]
        commit_type: Option<String>,

        #[arg(long, value_enum, default_value = "relevance")]
        sort: SortOrder,

        /// Collapse results to one per commit
        #[arg(long)]
        unique_commits: bool,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        repo: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show history-index statistics
    GitStats {
        #[arg(long)]
        repo: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show how a query would be classified and routed
    Explain {
        query: String,

        #[arg(long)]
        repo: Option<String>,
    },

    /// Run the signal detectors and rebuild file profiles
    Analyze {
        /// Run every detector (default: windowed subset)
        #[arg(long)]
        full: bool,

        #[arg(long)]
        repo: Option<String>,
    },

    /// Pre-change advisory for a set of files
    Assess {
        /// Comma-separated repo-relative paths
        #[arg(long, value_delimiter = ',')]
        files: Vec<String>,

        /// Kind of change being planned (e.g. refactor)
        #[arg(long)]
        change_type: Option<String>,

        /// Free-text context searched against the signal index
        #[arg(long)]
        query: Option<String>,

        #[arg(long)]
        repo: Option<String>,

        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}
