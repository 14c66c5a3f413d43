use regex::Regex;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced while compiling a path pattern.
#[derive(Error, Debug, PartialEq)]
pub enum PatternError {
    /// The pattern has invalid structure, e.g. a wildcard glued to literal
    /// text inside one segment.
    #[error("Invalid path pattern: {pattern}")]
    InvalidPattern { pattern: String },

    /// The generated regex failed to compile; indicates a conversion bug.
    #[error("Regex compilation failed: {0}")]
    RegexError(String),
}

/// A pre-compiled path pattern.
///
/// Pattern semantics: `*` matches exactly one path segment, `**` matches
/// zero or more segments, everything else matches literally and
/// case-sensitively. Wildcards must occupy a whole segment.
///
/// Specificity is the length of the literal prefix before the first
/// wildcard; longer prefixes are more specific and win ties between rules
/// of equal priority.
#[derive(Debug, Clone)]
pub struct PathPattern {
    pattern: String,
    regex: Arc<Regex>,
    specificity: usize,
}

impl PathPattern {
    /// Compiles a glob-like pattern into an anchored regex.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use weir_rs::utils::pattern::PathPattern;
    ///
    /// let p = PathPattern::compile("/api/*/posts/**").unwrap();
    /// assert!(p.matches("/api/u1/posts"));
    /// assert!(p.matches("/api/u1/posts/1/comments"));
    /// assert!(!p.matches("/api/u1/x/posts"));
    /// ```
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::InvalidPattern {
                pattern: pattern.to_string(),
            });
        }

        let mut regex_pattern = String::with_capacity(pattern.len() * 2);
        regex_pattern.push('^');

        let trimmed = pattern.trim_start_matches('/');
        if !trimmed.is_empty() {
            for segment in trimmed.split('/') {
                match segment {
                    "**" => regex_pattern.push_str("(?:/[^/]+)*"),
                    "*" => regex_pattern.push_str("/[^/]+"),
                    literal => {
                        if literal.contains('*') {
                            return Err(PatternError::InvalidPattern {
                                pattern: pattern.to_string(),
                            });
                        }
                        regex_pattern.push('/');
                        regex_pattern.push_str(&regex::escape(literal));
                    }
                }
            }
        }

        // Tolerate one trailing slash so "/" still matches "/**".
        regex_pattern.push_str("/?$");

        let regex =
            Regex::new(&regex_pattern).map_err(|e| PatternError::RegexError(e.to_string()))?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex: Arc::new(regex),
            specificity: Self::literal_prefix_len(pattern),
        })
    }

    /// Checks the pattern against a request path.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// The original pattern string.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Literal-prefix length used as the secondary match ordering key.
    pub fn specificity(&self) -> usize {
        self.specificity
    }

    fn literal_prefix_len(pattern: &str) -> usize {
        match pattern.find('*') {
            Some(idx) => idx,
            None => pattern.len(),
        }
    }
}
