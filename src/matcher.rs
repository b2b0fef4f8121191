//! Label matcher compilation
//!
//! Turns a query's time range and label matchers into a [`Predicate`]: a
//! conjunction of one range fragment and one fragment per matcher. Each
//! label fragment asks whether *some* label entry of a document satisfies
//! it, so documents are never flattened into a name→value map.

use crate::{CompileError, Label, StoredDocument, TimestampMs};
use regex::Regex;
use serde_json::{json, Value};

/// Label matcher kinds, numbered as on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum MatcherKind {
    Eq = 0,
    Neq = 1,
    Re = 2,
    Nre = 3,
}

impl MatcherKind {
    pub fn from_wire(value: i32) -> Option<Self> {
        match value {
            0 => Some(MatcherKind::Eq),
            1 => Some(MatcherKind::Neq),
            2 => Some(MatcherKind::Re),
            3 => Some(MatcherKind::Nre),
            _ => None,
        }
    }

    pub fn as_wire(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    pub name: String,
    pub value: String,
    pub kind: MatcherKind,
}

impl Matcher {
    pub fn new(kind: MatcherKind, name: impl Into<String>, value: impl Into<String>) -> Self {
        Matcher {
            name: name.into(),
            value: value.into(),
            kind,
        }
    }

    pub fn eq(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MatcherKind::Eq, name, value)
    }

    pub fn neq(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(MatcherKind::Neq, name, value)
    }

    pub fn re(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(MatcherKind::Re, name, pattern)
    }

    pub fn nre(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(MatcherKind::Nre, name, pattern)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub start_ms: TimestampMs,
    pub end_ms: TimestampMs,
    pub matchers: Vec<Matcher>,
}

impl Query {
    pub fn new(start_ms: TimestampMs, end_ms: TimestampMs, matchers: Vec<Matcher>) -> Self {
        Query {
            start_ms,
            end_ms,
            matchers,
        }
    }
}

/// How a negative label fragment (NEQ, NRE) treats a document that has no
/// label of that name. EQ and RE always require the label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MissingLabel {
    /// The absent label behaves like `name=""`, as in PromQL selectors
    #[default]
    AsEmpty,
    /// The document must carry the label for the fragment to hold
    Strict,
}

/// Inclusive sample timestamp range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start_ms: TimestampMs,
    pub end_ms: TimestampMs,
}

impl TimeRange {
    pub fn contains(&self, timestamp: TimestampMs) -> bool {
        self.start_ms <= timestamp && timestamp <= self.end_ms
    }
}

/// Compiled, fully anchored regular expression
#[derive(Debug, Clone)]
pub struct LabelRegex {
    pattern: String,
    regex: Regex,
}

impl LabelRegex {
    pub fn new(label: &str, pattern: &str) -> Result<Self, CompileError> {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| {
            CompileError::InvalidPattern {
                label: label.to_string(),
                pattern: pattern.to_string(),
                source,
            }
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for LabelRegex {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabelCondition {
    Equal(String),
    NotEqual(String),
    Matches(LabelRegex),
    NotMatches(LabelRegex),
}

impl LabelCondition {
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            LabelCondition::Equal(expected) => value == expected,
            LabelCondition::NotEqual(expected) => value != expected,
            LabelCondition::Matches(re) => re.is_match(value),
            LabelCondition::NotMatches(re) => !re.is_match(value),
        }
    }

    pub fn is_negative(&self) -> bool {
        matches!(
            self,
            LabelCondition::NotEqual(_) | LabelCondition::NotMatches(_)
        )
    }

    fn to_filter(&self) -> Value {
        match self {
            LabelCondition::Equal(v) => json!(v),
            LabelCondition::NotEqual(v) => json!({ "$ne": v }),
            LabelCondition::Matches(re) => json!({ "$regex": anchored(re.pattern()) }),
            LabelCondition::NotMatches(re) => {
                json!({ "$not": { "$regex": anchored(re.pattern()) } })
            }
        }
    }
}

fn anchored(pattern: &str) -> String {
    format!("^(?:{})$", pattern)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelPredicate {
    pub name: String,
    pub condition: LabelCondition,
    pub missing: MissingLabel,
}

impl LabelPredicate {
    pub fn matches(&self, labels: &[Label]) -> bool {
        let mut present = false;
        for label in labels.iter().filter(|l| l.name == self.name) {
            present = true;
            if self.condition.accepts(&label.value) {
                return true;
            }
        }

        !present && self.absent_label_holds()
    }

    fn absent_label_holds(&self) -> bool {
        self.missing == MissingLabel::AsEmpty
            && self.condition.is_negative()
            && self.condition.accepts("")
    }

    fn to_filter(&self) -> Value {
        let element = json!({
            "$elemMatch": { "name": self.name, "value": self.condition.to_filter() }
        });

        if self.absent_label_holds() {
            json!({
                "$or": [
                    { "labels": element },
                    { "labels": { "$not": { "$elemMatch": { "name": self.name } } } }
                ]
            })
        } else {
            json!({ "labels": element })
        }
    }
}

/// Backend-agnostic document condition compiled from one query
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub range: TimeRange,
    pub labels: Vec<LabelPredicate>,
}

impl Predicate {
    /// True when some sample is in range and every label fragment holds
    pub fn matches(&self, doc: &StoredDocument) -> bool {
        doc.samples.iter().any(|s| self.range.contains(s.timestamp))
            && self.labels.iter().all(|p| p.matches(&doc.labels))
    }

    /// Render as a document-store filter over the persisted layout
    pub fn to_filter(&self) -> Value {
        let mut clauses = vec![json!({
            "samples": {
                "$elemMatch": {
                    "timestamp": { "$gte": self.range.start_ms, "$lte": self.range.end_ms }
                }
            }
        })];
        clauses.extend(self.labels.iter().map(LabelPredicate::to_filter));

        json!({ "$and": clauses })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MatcherCompiler {
    missing: MissingLabel,
}

impl MatcherCompiler {
    pub fn new(missing: MissingLabel) -> Self {
        Self { missing }
    }

    pub fn missing_label(&self) -> MissingLabel {
        self.missing
    }

    pub fn compile(&self, query: &Query) -> Result<Predicate, CompileError> {
        let labels = query
            .matchers
            .iter()
            .map(|m| self.compile_matcher(m))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Predicate {
            range: TimeRange {
                start_ms: query.start_ms,
                end_ms: query.end_ms,
            },
            labels,
        })
    }

    fn compile_matcher(&self, matcher: &Matcher) -> Result<LabelPredicate, CompileError> {
        if matcher.name.is_empty() {
            return Err(CompileError::EmptyLabelName);
        }

        let condition = match matcher.kind {
            MatcherKind::Eq => LabelCondition::Equal(matcher.value.clone()),
            MatcherKind::Neq => LabelCondition::NotEqual(matcher.value.clone()),
            MatcherKind::Re => {
                LabelCondition::Matches(LabelRegex::new(&matcher.name, &matcher.value)?)
            }
            MatcherKind::Nre => {
                LabelCondition::NotMatches(LabelRegex::new(&matcher.name, &matcher.value)?)
            }
        };

        Ok(LabelPredicate {
            name: matcher.name.clone(),
            condition,
            missing: self.missing,
        })
    }
}
