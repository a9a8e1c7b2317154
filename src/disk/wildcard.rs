//! Filename patterns such as `*.CMD;TEST0[12].TXT`.

use std::io;

use globset::{GlobBuilder, GlobMatcher};

use crate::disk::error::DiskError;

/// A filename pattern made of `;` separated alternatives.  Each alternative
/// supports `*`, `?` and `[set]`.
#[derive(Clone, Debug)]
pub struct Pattern {
    source: String,
    matchers: Vec<GlobMatcher>,
}

impl Pattern {
    /// Compile a case insensitive pattern.
    pub fn new(pattern: &str) -> io::Result<Pattern> {
        Pattern::build(pattern, false)
    }

    pub fn case_sensitive(pattern: &str) -> io::Result<Pattern> {
        Pattern::build(pattern, true)
    }

    /// A pattern matching every file.
    pub fn any() -> Pattern {
        // "*" always compiles.
        Pattern::new("*").unwrap_or(Pattern {
            source: String::new(),
            matchers: Vec::new(),
        })
    }

    fn build(pattern: &str, case_sensitive: bool) -> io::Result<Pattern> {
        let matchers = pattern
            .split(';')
            .filter(|alternative| !alternative.is_empty())
            .map(|alternative| {
                GlobBuilder::new(alternative)
                    .case_insensitive(!case_sensitive)
                    .literal_separator(true)
                    .build()
                    .map(|glob| glob.compile_matcher())
                    .map_err(|_| DiskError::InvalidPattern(pattern.to_string()).to_io_error())
            })
            .collect::<io::Result<Vec<_>>>()?;
        if matchers.is_empty() {
            return Err(DiskError::InvalidPattern(pattern.to_string()).into());
        }
        Ok(Pattern {
            source: pattern.to_string(),
            matchers,
        })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.matchers.iter().any(|m| m.is_match(name))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}
