use glob::{MatchOptions, Pattern, PatternError};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Shell-glob filter applied to file names while a listing is parsed.
///
/// A name passes when any of the patterns matches, ignoring case. Directories
/// are never filtered.
#[derive(Debug, Clone)]
pub struct NameFilter {
    patterns: Vec<Pattern>,
}

impl NameFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let patterns = patterns
            .iter()
            .map(|p| Pattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// An empty filter matches every name.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.is_empty()
            || self
                .patterns
                .iter()
                .any(|p| p.matches_with(name, MATCH_OPTIONS))
    }
}

/// `None` means no filter.
pub fn passes(filter: Option<&NameFilter>, name: &str) -> bool {
    filter.map_or(true, |f| f.matches(name))
}
