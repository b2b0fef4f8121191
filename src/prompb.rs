//! Remote read/write protobuf messages.
//!
//! Hand-derived subset of the upstream `prompb` schema. Field tags match the
//! upstream definitions so existing clients interoperate; fields this adapter
//! never looks at (write metadata, read hints, chunked responses) are left
//! out and skipped by the decoder.

use prost::Message;

/// WriteRequest is the body of POST /write.
#[derive(Clone, PartialEq, Message)]
pub struct WriteRequest {
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

#[derive(Clone, PartialEq, Message)]
pub struct TimeSeries {
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Label {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct Sample {
    #[prost(double, tag = "1")]
    pub value: f64,
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

/// ReadRequest is the body of POST /read.
#[derive(Clone, PartialEq, Message)]
pub struct ReadRequest {
    #[prost(message, repeated, tag = "1")]
    pub queries: Vec<Query>,
    #[prost(enumeration = "ResponseType", repeated, tag = "2")]
    pub accepted_response_types: Vec<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Query {
    #[prost(int64, tag = "1")]
    pub start_timestamp_ms: i64,
    #[prost(int64, tag = "2")]
    pub end_timestamp_ms: i64,
    #[prost(message, repeated, tag = "3")]
    pub matchers: Vec<LabelMatcher>,
}

#[derive(Clone, PartialEq, Message)]
pub struct LabelMatcher {
    #[prost(enumeration = "MatcherType", tag = "1")]
    pub kind: i32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub value: String,
}

/// Matcher type ordinals as assigned by the wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MatcherType {
    Eq = 0,
    Neq = 1,
    Re = 2,
    Nre = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ResponseType {
    Samples = 0,
    StreamedXorChunks = 1,
}

/// ReadResponse is the body returned from POST /read.
#[derive(Clone, PartialEq, Message)]
pub struct ReadResponse {
    #[prost(message, repeated, tag = "1")]
    pub results: Vec<QueryResult>,
}

#[derive(Clone, PartialEq, Message)]
pub struct QueryResult {
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

impl From<Label> for crate::Label {
    fn from(label: Label) -> Self {
        crate::Label {
            name: label.name,
            value: label.value,
        }
    }
}

impl From<crate::Label> for Label {
    fn from(label: crate::Label) -> Self {
        Label {
            name: label.name,
            value: label.value,
        }
    }
}

impl From<Sample> for crate::Sample {
    fn from(sample: Sample) -> Self {
        crate::Sample {
            timestamp: sample.timestamp,
            value: sample.value,
        }
    }
}

impl From<crate::Sample> for Sample {
    fn from(sample: crate::Sample) -> Self {
        Sample {
            value: sample.value,
            timestamp: sample.timestamp,
        }
    }
}

impl From<TimeSeries> for crate::TimeSeries {
    fn from(ts: TimeSeries) -> Self {
        crate::TimeSeries {
            labels: ts.labels.into_iter().map(Into::into).collect(),
            samples: ts.samples.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<crate::TimeSeries> for TimeSeries {
    fn from(ts: crate::TimeSeries) -> Self {
        TimeSeries {
            labels: ts.labels.into_iter().map(Into::into).collect(),
            samples: ts.samples.into_iter().map(Into::into).collect(),
        }
    }
}
