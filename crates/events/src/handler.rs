use crate::{Command, Event};

/// Handles a command and emits events, independent of the aggregate
/// lifecycle.
///
/// Useful for background workers and tests that do not need the full
/// event-sourcing pipeline. Errors are domain-specific, hence the associated
/// error type.
pub trait CommandHandler {
    type Cmd: Command;
    type Ev: Event;
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn handle(&self, command: Self::Cmd) -> Result<Vec<Self::Ev>, Self::Error>;
}

/// Execute an aggregate command deterministically (no IO, no async).
///
/// Decide (`handle`) then evolve (`apply` each emitted event). Mutates the
/// aggregate in place. For persistence and publication use the command
/// dispatcher instead; this is the inline/testing path.
pub fn execute<A>(
    aggregate: &mut A,
    command: &A::Command,
) -> Result<Vec<A::Event>, A::Error>
where
    A: ventora_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
