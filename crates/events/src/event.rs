use chrono::{DateTime, Utc};

/// Something that already happened to an aggregate.
///
/// Implementors are plain data; once appended they are never edited.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Name stored alongside the payload, e.g. `"warehouse.bags_allocated"`.
    fn event_type(&self) -> &'static str;

    /// Payload schema revision; bump when the serialized shape changes.
    fn version(&self) -> u32;

    fn occurred_at(&self) -> DateTime<Utc>;
}
