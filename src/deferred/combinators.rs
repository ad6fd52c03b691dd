//! Combinators that aggregate several deferred tasks.

use super::handle::{Deferred, Shared};
use std::sync::Weak;

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Fulfill with every member's value once all members are fulfilled.
    ///
    /// Values are returned in input order, each paired with its key. The first
    /// rejection seen (in input order) rejects the aggregate with that member's
    /// error. Members carrying executors are driven whenever the aggregate is polled.
    pub fn all<K, I>(members: I) -> Deferred<Vec<(K, T)>>
    where
        K: Clone + Send + 'static,
        I: IntoIterator<Item = (K, Deferred<T>)>,
    {
        let members: Vec<(K, Deferred<T>)> = members.into_iter().collect();
        let watched: Vec<Deferred<T>> = members.iter().map(|(_, member)| member.clone()).collect();

        let aggregate = Deferred::from_executor(Box::new(move || {
            let mut values = Vec::with_capacity(members.len());
            let mut pending = false;
            for (key, member) in &members {
                member.poll();
                match member.outcome() {
                    Some(Ok(value)) => values.push((key.clone(), value)),
                    Some(Err(error)) => return Err(error),
                    None => pending = true,
                }
            }
            Ok((!pending).then_some(values))
        }));

        wake_on_settle(&aggregate, &watched);
        aggregate.poll();
        aggregate
    }

    /// Settle exactly like the first member observed to leave the pending state.
    ///
    /// Members are checked in input order, so when several have already settled
    /// the earliest in the list wins. An empty race never settles.
    pub fn race<I>(members: I) -> Deferred<T>
    where
        I: IntoIterator<Item = Deferred<T>>,
    {
        let members: Vec<Deferred<T>> = members.into_iter().collect();
        let watched = members.clone();

        let winner = Deferred::from_executor(Box::new(move || {
            for member in &members {
                member.poll();
                if let Some(outcome) = member.outcome() {
                    return outcome.map(Some);
                }
            }
            Ok(None)
        }));

        wake_on_settle(&winner, &watched);
        winner.poll();
        winner
    }
}

/// Re-poll `aggregate` whenever one of `members` settles.
///
/// Members only hold a weak reference, so an abandoned aggregate is freed even
/// if some member never settles.
fn wake_on_settle<A, T>(aggregate: &Deferred<A>, members: &[Deferred<T>])
where
    A: Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    for member in members {
        let weak: Weak<Shared<A>> = aggregate.downgrade();
        member.subscribe_settled(Box::new(move |_| {
            if let Some(aggregate) = Deferred::upgrade(&weak) {
                aggregate.poll();
            }
        }));
    }
}
