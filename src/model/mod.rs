pub mod canonical;
pub mod producer;

pub use canonical::{Annotation, AnnotationType, BinaryAnnotation, Endpoint, LegacySpan, Span};
pub use producer::{Host, ProducerSpan, Spans, TimelineAnnotation};
