//! Metric labels and label matchers.
//!
//! A metric is a map from label name to label value. The distinguished
//! `__name__` label carries the metric name and is handled specially by
//! both the write path (it is part of the hash key, never a range key)
//! and the query planner (it must be matched by equality).
//!
//! Matchers are produced by an external query parser; this crate only
//! defines their evaluation. `Equal` matchers permit range-scan narrowing
//! in the index; every other type forces a full scan of the label name
//! with client-side filtering.

use std::collections::BTreeMap;

use regex::Regex;

use crate::error::Result;

/// The label holding the metric name.
pub const METRIC_NAME: &str = "__name__";

/// A metric label set. `BTreeMap` keeps iteration order deterministic,
/// which in turn keeps index-entry explosion deterministic.
pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Equal,
    NotEqual,
    RegexMatch,
    RegexNotMatch,
}

/// A predicate over a single label's value.
#[derive(Debug, Clone)]
pub struct LabelMatcher {
    pub match_type: MatchType,
    pub name: String,
    pub value: String,
    re: Option<Regex>,
}

impl LabelMatcher {
    /// Build a matcher, compiling the pattern for regex types. Patterns
    /// are fully anchored: `a|c` matches exactly `a` or `c`, nothing
    /// containing them.
    pub fn new(
        match_type: MatchType,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self> {
        let value = value.into();
        let re = match match_type {
            MatchType::RegexMatch | MatchType::RegexNotMatch => {
                Some(Regex::new(&format!("^(?:{value})$"))?)
            }
            MatchType::Equal | MatchType::NotEqual => None,
        };
        Ok(Self {
            match_type,
            name: name.into(),
            value,
            re,
        })
    }

    /// Whether a label value satisfies this matcher.
    pub fn matches(&self, value: &str) -> bool {
        match self.match_type {
            MatchType::Equal => self.value == value,
            MatchType::NotEqual => self.value != value,
            MatchType::RegexMatch => self.re.as_ref().is_some_and(|re| re.is_match(value)),
            MatchType::RegexNotMatch => !self.re.as_ref().is_some_and(|re| re.is_match(value)),
        }
    }
}
