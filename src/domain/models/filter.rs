/// Predicate passed to the store adapter. The dialect is deliberately small:
/// equality, prefix `LIKE`, `>` on ISO-date strings, and `AND` composition.
/// String literals are single-quote escaped by doubling when rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, FilterValue),
    /// `col LIKE 'prefix%'`
    LikePrefix(String, String),
    /// `col > 'iso-date'` — lexicographic comparison works for ISO-8601.
    GtDate(String, String),
    And(Vec<Filter>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// Escapes `%` and `_` so a user-supplied prefix matches literally.
fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\'', "''")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl Filter {
    pub fn eq_str(column: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Eq(column.into(), FilterValue::Str(value.into()))
    }

    pub fn eq_int(column: impl Into<String>, value: i64) -> Self {
        Filter::Eq(column.into(), FilterValue::Int(value))
    }

    pub fn eq_bool(column: impl Into<String>, value: bool) -> Self {
        Filter::Eq(column.into(), FilterValue::Bool(value))
    }

    pub fn like_prefix(column: impl Into<String>, prefix: impl Into<String>) -> Self {
        Filter::LikePrefix(column.into(), prefix.into())
    }

    pub fn gt_date(column: impl Into<String>, iso: impl Into<String>) -> Self {
        Filter::GtDate(column.into(), iso.into())
    }

    pub fn and(filters: Vec<Filter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.into_iter().next(),
            _ => Some(Filter::And(filters)),
        }
    }

    /// Renders to a SQL `WHERE` fragment (without the `WHERE` keyword).
    pub fn to_sql(&self) -> String {
        match self {
            Filter::Eq(col, FilterValue::Str(v)) => format!("{} = '{}'", col, escape(v)),
            Filter::Eq(col, FilterValue::Int(v)) => format!("{} = {}", col, v),
            Filter::Eq(col, FilterValue::Bool(v)) => format!("{} = {}", col, v),
            Filter::LikePrefix(col, prefix) => {
                format!("{} LIKE '{}%' ESCAPE '\\'", col, escape_like(prefix))
            }
            Filter::GtDate(col, iso) => format!("{} > '{}'", col, escape(iso)),
            Filter::And(parts) => parts
                .iter()
                .map(|p| format!("({})", p.to_sql()))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_escapes_single_quotes() {
        let f = Filter::eq_str("file_path", "src/o'brien.ts");
        assert_eq!(f.to_sql(), "file_path = 'src/o''brien.ts'");
    }

    #[test]
    fn test_like_prefix_renders_trailing_wildcard() {
        let f = Filter::like_prefix("file_path", "src/auth/");
        assert_eq!(f.to_sql(), "file_path LIKE 'src/auth/%' ESCAPE '\\'");
    }

    #[test]
    fn test_like_prefix_escapes_wildcards_in_input() {
        let f = Filter::like_prefix("file_path", "src/100%_done/");
        assert!(f.to_sql().contains("100\\%\\_done"));
    }

    #[test]
    fn test_and_composition() {
        let f = Filter::and(vec![
            Filter::eq_str("chunk_type", "commit_summary"),
            Filter::gt_date("date", "2024-01-01T00:00:00Z"),
        ])
        .unwrap();
        assert_eq!(
            f.to_sql(),
            "(chunk_type = 'commit_summary') AND (date > '2024-01-01T00:00:00Z')"
        );
    }

    #[test]
    fn test_and_of_one_collapses() {
        let f = Filter::and(vec![Filter::eq_int("files_changed", 3)]).unwrap();
        assert_eq!(f.to_sql(), "files_changed = 3");
        assert!(Filter::and(vec![]).is_none());
    }
}
