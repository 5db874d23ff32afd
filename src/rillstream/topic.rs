//! Topic configuration for sources and sinks.

use crate::rillstream::serialization::{Codec, CodecRef};
use crate::rillstream::types::{Record, StreamValue};
use std::fmt;
use std::sync::Arc;

/// Routes a record key to a partition; `None` means the runtime's default
/// hash partitioner.
pub type Partitioner = Arc<dyn Fn(&StreamValue, u32) -> u32 + Send + Sync>;

/// Extracts the event timestamp (millis) from an inbound record; `None`
/// means the runtime uses the broker/ingestion timestamp.
pub type TimestampExtractor = Arc<dyn Fn(&Record) -> i64 + Send + Sync>;

/// Configuration for a topic a topology consumes from or produces to.
///
/// Codecs left unset fall back to the builder-level defaults; a source or
/// sink that cannot resolve both codecs is rejected at registration time.
///
/// # Examples
///
/// ```rust
/// use rillstream::rillstream::topic::TopicConfig;
/// use rillstream::rillstream::serialization::{JsonCodec, StringCodec};
///
/// let orders = TopicConfig::new("orders")
///     .key_codec(StringCodec)
///     .value_codec(JsonCodec::new());
/// assert_eq!(orders.topics(), &["orders".to_string()]);
/// ```
#[derive(Clone)]
pub struct TopicConfig {
    topics: Vec<String>,
    key_codec: Option<CodecRef>,
    value_codec: Option<CodecRef>,
    partitioner: Option<Partitioner>,
    timestamp_extractor: Option<TimestampExtractor>,
}

impl TopicConfig {
    /// Configuration for a single topic.
    pub fn new(topic: impl Into<String>) -> Self {
        TopicConfig {
            topics: vec![topic.into()],
            key_codec: None,
            value_codec: None,
            partitioner: None,
            timestamp_extractor: None,
        }
    }

    /// Configuration for a fan-in source over several topics.
    pub fn many<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TopicConfig {
            topics: topics.into_iter().map(Into::into).collect(),
            key_codec: None,
            value_codec: None,
            partitioner: None,
            timestamp_extractor: None,
        }
    }

    /// Set the key codec.
    pub fn key_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.key_codec = Some(Arc::new(codec));
        self
    }

    /// Set the value codec.
    pub fn value_codec(mut self, codec: impl Codec + 'static) -> Self {
        self.value_codec = Some(Arc::new(codec));
        self
    }

    /// Set a custom partitioner for sink writes.
    pub fn partitioner(
        mut self,
        partitioner: impl Fn(&StreamValue, u32) -> u32 + Send + Sync + 'static,
    ) -> Self {
        self.partitioner = Some(Arc::new(partitioner));
        self
    }

    /// Set a timestamp extractor for source reads.
    pub fn timestamp_extractor(
        mut self,
        extractor: impl Fn(&Record) -> i64 + Send + Sync + 'static,
    ) -> Self {
        self.timestamp_extractor = Some(Arc::new(extractor));
        self
    }

    /// The configured topic names.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Fill unset codecs from builder-level defaults.
    pub(crate) fn with_codec_defaults(
        mut self,
        key: Option<&CodecRef>,
        value: Option<&CodecRef>,
    ) -> Self {
        if self.key_codec.is_none() {
            self.key_codec = key.cloned();
        }
        if self.value_codec.is_none() {
            self.value_codec = value.cloned();
        }
        self
    }

    /// The configured key codec, if any.
    pub fn key_codec_ref(&self) -> Option<&CodecRef> {
        self.key_codec.as_ref()
    }

    /// The configured value codec, if any.
    pub fn value_codec_ref(&self) -> Option<&CodecRef> {
        self.value_codec.as_ref()
    }

    /// The configured partitioner, if any.
    pub fn partitioner_ref(&self) -> Option<&Partitioner> {
        self.partitioner.as_ref()
    }

    /// The configured timestamp extractor, if any.
    pub fn timestamp_extractor_ref(&self) -> Option<&TimestampExtractor> {
        self.timestamp_extractor.as_ref()
    }
}

impl fmt::Debug for TopicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopicConfig")
            .field("topics", &self.topics)
            .field("key_codec", &self.key_codec.as_ref().map(|c| c.name()))
            .field("value_codec", &self.value_codec.as_ref().map(|c| c.name()))
            .field("partitioner", &self.partitioner.is_some())
            .field("timestamp_extractor", &self.timestamp_extractor.is_some())
            .finish()
    }
}
