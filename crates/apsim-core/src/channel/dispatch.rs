// ── Type-keyed dispatch table ──
//
// Maps an inbound `type` to an ordered list of subscribers. Handlers run
// synchronously, in registration order, and may deregister themselves by
// returning `Flow::Unsubscribe`.

use std::collections::HashMap;
use std::fmt;

use apsim_api::InboundFrame;

/// What a handler wants to happen to its subscription after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Keep,
    Unsubscribe,
}

/// Identifies one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A message handler. `C` is the state the owner lends to every dispatch.
pub type Handler<C> = Box<dyn FnMut(&InboundFrame, &mut C) -> Flow + Send>;

struct Subscriber<C> {
    id: SubscriptionId,
    handler: Handler<C>,
}

pub(crate) struct Dispatcher<C> {
    routes: HashMap<String, Vec<Subscriber<C>>>,
    last_id: u64,
}

impl<C> Dispatcher<C> {
    pub(crate) fn new() -> Self {
        Self {
            routes: HashMap::new(),
            last_id: 0,
        }
    }

    /// Drop every subscriber of `kind` and install `handler` alone.
    pub(crate) fn replace(&mut self, kind: &str, handler: Handler<C>) -> SubscriptionId {
        let id = self.next_id();
        self.routes
            .insert(kind.to_owned(), vec![Subscriber { id, handler }]);
        id
    }

    /// Append `handler` after the existing subscribers of `kind`.
    pub(crate) fn append(&mut self, kind: &str, handler: Handler<C>) -> SubscriptionId {
        let id = self.next_id();
        self.routes
            .entry(kind.to_owned())
            .or_default()
            .push(Subscriber { id, handler });
        id
    }

    /// Remove one subscriber wherever it is registered.
    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let mut found = false;
        self.routes.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|s| s.id != id);
            found |= subs.len() != before;
            !subs.is_empty()
        });
        found
    }

    /// Remove every subscriber of `kind`. Returns how many were dropped.
    pub(crate) fn clear(&mut self, kind: &str) -> usize {
        self.routes.remove(kind).map_or(0, |subs| subs.len())
    }

    /// Whether `id` is still registered under any type.
    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.routes.values().flatten().any(|s| s.id == id)
    }

    pub(crate) fn subscribers(&self, kind: &str) -> usize {
        self.routes.get(kind).map_or(0, Vec::len)
    }

    /// Run every subscriber of the frame's type. Returns how many ran.
    pub(crate) fn dispatch(&mut self, frame: &InboundFrame, ctx: &mut C) -> usize {
        let Some(subs) = self.routes.get_mut(frame.kind()) else {
            tracing::trace!(kind = frame.kind(), "no route, dropping frame");
            return 0;
        };

        let mut ran = 0;
        subs.retain_mut(|sub| {
            ran += 1;
            (sub.handler)(frame, ctx) == Flow::Keep
        });
        if subs.is_empty() {
            self.routes.remove(frame.kind());
        }
        ran
    }

    fn next_id(&mut self) -> SubscriptionId {
        self.last_id += 1;
        SubscriptionId(self.last_id)
    }
}
