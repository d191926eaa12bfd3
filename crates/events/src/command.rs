use ventora_core::AggregateId;

/// A command targets a specific aggregate.
///
/// Commands represent **intent**: a request to perform an action. They are
/// transient (never persisted) and are transformed into events, which are.
/// A command is rejected when invalid; an event records an accepted change.
///
/// Tenancy is enforced at the event level (envelopes), not here: the tenant
/// context comes from infrastructure (e.g. the JWT middleware) and is
/// attached during persistence, which keeps commands domain-focused.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
