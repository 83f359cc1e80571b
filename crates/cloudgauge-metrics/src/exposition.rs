//! Prometheus exposition of cached snapshots.
//!
//! Renders the families of one cloud's snapshot, restricted to the services
//! a scrape is allowed to see, in the text or delimited-protobuf format.
//! Families are always written in name order so the output is byte-stable
//! for a given snapshot.

use prometheus::{Encoder, ProtobufEncoder, TextEncoder};
use tracing::debug;

use cloudgauge_cache::{MetricRecord, SnapshotStore};
use cloudgauge_core::ServiceSet;

use crate::error::{MetricsError, MetricsResult};

const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4";
const PROTOBUF_CONTENT_TYPE: &str =
    "application/vnd.google.protobuf; proto=io.prometheus.client.MetricFamily; encoding=delimited";

/// Wire format of a scrape response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Text,
    Protobuf,
}

impl Format {
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Text => TEXT_CONTENT_TYPE,
            Format::Protobuf => PROTOBUF_CONTENT_TYPE,
        }
    }

    /// Pick a format from the request's `Accept` header values.
    ///
    /// Entries are tried from highest `q` to lowest, ties in header order.
    /// Delimited protobuf is only chosen when asked for explicitly; anything
    /// else falls back to text.
    pub fn negotiate<'a>(accept: impl IntoIterator<Item = &'a str>) -> Format {
        let mut ranges: Vec<(f32, usize, MediaRange)> = accept
            .into_iter()
            .flat_map(|value| value.split(','))
            .filter_map(MediaRange::parse)
            .enumerate()
            .map(|(idx, range)| (range.q, idx, range))
            .filter(|(q, _, _)| *q > 0.0)
            .collect();
        ranges.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

        for (_, _, range) in &ranges {
            if range.is_delimited_protobuf() {
                return Format::Protobuf;
            }
            if range.media_type == "text/plain" {
                return Format::Text;
            }
        }
        Format::Text
    }

    fn encode(self, record: &MetricRecord, buf: &mut Vec<u8>) -> prometheus::Result<()> {
        let family = std::slice::from_ref(&record.family);
        match self {
            Format::Text => TextEncoder::new().encode(family, buf),
            Format::Protobuf => ProtobufEncoder::new().encode(family, buf),
        }
    }
}

/// One entry of an `Accept` header.
#[derive(Debug)]
struct MediaRange {
    media_type: String,
    params: Vec<(String, String)>,
    q: f32,
}

impl MediaRange {
    fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.split(';');
        let media_type = parts.next()?.trim().to_ascii_lowercase();
        if media_type.is_empty() {
            return None;
        }

        let mut params = Vec::new();
        let mut q = 1.0;
        for part in parts {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().trim_matches('"').to_string();
            if key == "q" {
                q = value.parse::<f32>().unwrap_or(0.0);
            } else {
                params.push((key, value));
            }
        }

        Some(Self {
            media_type,
            params,
            q,
        })
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn is_delimited_protobuf(&self) -> bool {
        self.media_type == "application/vnd.google.protobuf"
            && self.param("proto") == Some("io.prometheus.client.MetricFamily")
            && self.param("encoding") == Some("delimited")
    }
}

/// Render the cached snapshot of `cloud` in the text format.
///
/// A cloud that was never published (or was evicted) yields an empty
/// buffer, not an error.
pub fn produce_buffer<S>(store: &S, cloud: &str, allowed: &ServiceSet) -> MetricsResult<Vec<u8>>
where
    S: SnapshotStore + ?Sized,
{
    produce_buffer_as(store, cloud, allowed, Format::Text)
}

/// Render the cached snapshot of `cloud` in the given format.
///
/// If any family fails to encode the whole call fails; no partial output
/// is returned.
pub fn produce_buffer_as<S>(
    store: &S,
    cloud: &str,
    allowed: &ServiceSet,
    format: Format,
) -> MetricsResult<Vec<u8>>
where
    S: SnapshotStore + ?Sized,
{
    let Some(snapshot) = store.get(cloud) else {
        debug!(%cloud, "cold cache, empty exposition");
        return Ok(Vec::new());
    };
    encode_records(&snapshot.filtered(allowed), format)
}

/// Encode records in the order given.
pub fn encode_records(records: &[&MetricRecord], format: Format) -> MetricsResult<Vec<u8>> {
    let mut buf = Vec::new();
    for record in records {
        format
            .encode(record, &mut buf)
            .map_err(|source| MetricsError::Encoding {
                family: record.name().to_string(),
                source,
            })?;
    }
    Ok(buf)
}
