//! Wire codec for remote read/write payloads
//!
//! Bodies are snappy block-compressed protobuf. Decoding runs in two stages
//! so a corrupt compression frame is reported differently from a frame that
//! decompresses into something that is not a valid message.

use crate::matcher::{Matcher, MatcherKind, Query};
use crate::prompb;
use crate::read::QueryResult;
use crate::{DecodeError, EncodeError, TimeSeries};
use bytes::Bytes;
use prost::Message;

pub const CONTENT_TYPE: &str = "application/x-protobuf";
pub const CONTENT_ENCODING: &str = "snappy";

fn decompress(payload: &[u8]) -> Result<Vec<u8>, DecodeError> {
    Ok(snap::raw::Decoder::new().decompress_vec(payload)?)
}

pub fn decode_write(payload: &[u8]) -> Result<Vec<TimeSeries>, DecodeError> {
    let raw = decompress(payload)?;
    let request = prompb::WriteRequest::decode(raw.as_slice())?;

    Ok(request.timeseries.into_iter().map(Into::into).collect())
}

pub fn decode_read(payload: &[u8]) -> Result<Vec<Query>, DecodeError> {
    let raw = decompress(payload)?;
    let request = prompb::ReadRequest::decode(raw.as_slice())?;

    request.queries.into_iter().map(query_from_wire).collect()
}

fn query_from_wire(query: prompb::Query) -> Result<Query, DecodeError> {
    let matchers = query
        .matchers
        .into_iter()
        .map(|m| {
            let kind =
                MatcherKind::from_wire(m.kind).ok_or(DecodeError::UnknownMatcherType(m.kind))?;
            Ok(Matcher::new(kind, m.name, m.value))
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok(Query::new(
        query.start_timestamp_ms,
        query.end_timestamp_ms,
        matchers,
    ))
}

pub fn encode_read_response(results: Vec<QueryResult>) -> Result<Bytes, EncodeError> {
    let response = prompb::ReadResponse {
        results: results
            .into_iter()
            .map(|r| prompb::QueryResult {
                timeseries: r.series.into_iter().map(Into::into).collect(),
            })
            .collect(),
    };

    let compressed = snap::raw::Encoder::new().compress_vec(&response.encode_to_vec())?;
    Ok(Bytes::from(compressed))
}

/// Client-side helpers: build compressed request bodies and read responses
pub mod client {
    use super::*;

    pub fn encode_write(series: Vec<TimeSeries>) -> Result<Bytes, EncodeError> {
        let request = prompb::WriteRequest {
            timeseries: series.into_iter().map(Into::into).collect(),
        };
        let compressed = snap::raw::Encoder::new().compress_vec(&request.encode_to_vec())?;
        Ok(Bytes::from(compressed))
    }

    pub fn encode_read(queries: &[Query]) -> Result<Bytes, EncodeError> {
        let request = prompb::ReadRequest {
            queries: queries
                .iter()
                .map(|q| prompb::Query {
                    start_timestamp_ms: q.start_ms,
                    end_timestamp_ms: q.end_ms,
                    matchers: q
                        .matchers
                        .iter()
                        .map(|m| prompb::LabelMatcher {
                            kind: m.kind.as_wire(),
                            name: m.name.clone(),
                            value: m.value.clone(),
                        })
                        .collect(),
                })
                .collect(),
            accepted_response_types: vec![prompb::ResponseType::Samples as i32],
        };
        let compressed = snap::raw::Encoder::new().compress_vec(&request.encode_to_vec())?;
        Ok(Bytes::from(compressed))
    }

    pub fn decode_read_response(payload: &[u8]) -> Result<Vec<QueryResult>, DecodeError> {
        let raw = decompress(payload)?;
        let response = prompb::ReadResponse::decode(raw.as_slice())?;

        Ok(response
            .results
            .into_iter()
            .map(|r| QueryResult {
                series: r.timeseries.into_iter().map(Into::into).collect(),
            })
            .collect())
    }
}
