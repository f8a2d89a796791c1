/// Opaque error returned only by [`crate::SchedulerBuilder::build`].
///
/// Nothing else in this crate returns a fallible result to the caller: loop
/// failures are logged, counted, and retried on the next tick rather than
/// surfaced here.
#[derive(Debug, thiserror::Error)]
#[error("failed to build scheduler")]
pub struct SchedulerError(#[source] anyhow::Error);

impl SchedulerError {
    pub(crate) fn new(cause: impl Into<anyhow::Error>) -> Self {
        Self(cause.into())
    }
}
