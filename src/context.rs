//! The context graph: a dynamically built DAG of per-operation nodes that
//! own continuations, propagate values and errors, splice sub-graphs
//! returned by asynchronous continuations, route upstream messages, and
//! drive their own lifetime.
//!
//! The three concrete continuation kinds of the original design (`Initial`,
//! `SyncNext`, `AsyncNext`) are not three structs here: a single generic
//! [`Node<V>`] carries all of the shared bookkeeping (readiness, handlers,
//! edges), and what happens on delivery is supplied per construction site as
//! a boxed closure captured in the outgoing [`Edge`]. This sidesteps giving
//! `AsyncNext` a second, differently-typed implementation of the delivery
//! contract for its two-phase splice (see [`splice_shadow`]).
//!
//! A node's lifetime is not hand-tracked: `prev`/`next` edges, and the
//! `Promise`/`Future` handles, are plain `Rc<Node<V>>` references, so Rust's
//! own reference counting *is* the alive condition. The two flags that
//! survive from the original four-point model, `has_promise`/`has_future`,
//! exist only because no `Rc` edge happens to run from a handle straight
//! into a node for them to piggy-back on, and because `Promise::drop` needs
//! to ask "is this node still fulfillable" as a point-in-time question
//! before it lets go of its own reference.
//!
//! Note that `prev`/`next` being owning `Rc` edges in both directions means
//! a linked producer/successor pair is a genuine reference cycle for as long
//! as the edge is outstanding; it is broken when the edge fires (see
//! [`fire_edge`]), not by any weak-reference discipline. See `DESIGN.md`
//! for why this is a known gap relative to the original's non-owning
//! pointer edges rather than an equivalent realisation of them.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::executor::{self, Task};
use crate::signal::Signal;

/// What arrives at a successor: either the predecessor's value, or an error
/// forwarded from upstream.
pub(crate) enum Outcome<V> {
    Value(V),
    Error(Signal),
}

/// The outgoing edge of a node: where its result goes, and how.
struct Edge<V> {
    /// Direct edges run their delivery inline instead of through the
    /// executor; used both for spliced async sub-graphs and for `collect`'s
    /// fan-in edges.
    shadow: bool,
    deliver: Box<dyn FnOnce(Outcome<V>)>,
    /// Erased handle to the successor, used only to sever its `prev` pointer
    /// once this edge fires or is torn down without firing.
    upstream: Rc<dyn Upstream>,
}

struct ErrorHandlerEntry<V> {
    type_id: TypeId,
    handler: Box<dyn FnOnce(Signal) -> V>,
}

struct MessageHandlerEntry {
    type_id: TypeId,
    handler: Box<dyn Fn(Signal)>,
}

/// A node in the DAG representing one async step. Generic over the value
/// type it eventually produces.
pub(crate) struct Node<V> {
    value: RefCell<Option<V>>,
    stored_error: RefCell<Option<Signal>>,
    error_forwarded: Cell<bool>,
    is_shadow: Cell<bool>,
    has_promise: Cell<bool>,
    has_future: Cell<bool>,
    prev: RefCell<Option<Rc<dyn Upstream>>>,
    next: RefCell<Option<Edge<V>>>,
    error_handlers: RefCell<VecDeque<ErrorHandlerEntry<V>>>,
    message_handlers: RefCell<VecDeque<MessageHandlerEntry>>,
    stored_messages: RefCell<VecDeque<Signal>>,
}

impl<V> Drop for Node<V> {
    /// Per §7: a stored error with no matching handler "remains parked at
    /// its terminal context until the future handle is dropped, at which
    /// point the context dies silently" — silently to callers, not to an
    /// installed trace subscriber. This is pure observability and changes no
    /// control flow, matching §6a's "no global logging is mandated."
    fn drop(&mut self) {
        if self.stored_error.borrow().is_some() {
            tracing::trace!("context dropped with an unconsumed error parked");
        }
    }
}

impl<V> Node<V> {
    pub(crate) fn value_ref(&self) -> std::cell::Ref<'_, Option<V>> {
        self.value.borrow()
    }

    pub(crate) fn new() -> Self {
        Node {
            value: RefCell::new(None),
            stored_error: RefCell::new(None),
            error_forwarded: Cell::new(false),
            is_shadow: Cell::new(false),
            has_promise: Cell::new(false),
            has_future: Cell::new(false),
            prev: RefCell::new(None),
            next: RefCell::new(None),
            error_handlers: RefCell::new(VecDeque::new()),
            message_handlers: RefCell::new(VecDeque::new()),
            stored_messages: RefCell::new(VecDeque::new()),
        }
    }
}

/// Type-erased operations any node supports regardless of its value type:
/// routing a message further upstream, and severing the link a predecessor
/// holds to it. Object-safe via `Rc<Self>` receivers, since both operations
/// only ever need to be invoked through an erased handle held by a
/// differently-typed neighbour.
pub(crate) trait Upstream {
    fn route_message(self: Rc<Self>, sig: Signal);
    fn clear_prev(&self);
}

impl<V: 'static> Upstream for Node<V> {
    fn route_message(self: Rc<Self>, sig: Signal) {
        let upstream = self.prev.borrow().clone();
        match upstream {
            Some(up) => up.route_message(sig),
            None => deliver_message_locally(&self, sig),
        }
    }

    fn clear_prev(&self) {
        self.prev.borrow_mut().take();
    }
}

pub(crate) fn is_ready<V>(node: &Node<V>) -> bool {
    node.value.borrow().is_some() || node.stored_error.borrow().is_some() || node.error_forwarded.get()
}

/// Fulfillable per §3 invariant 5: someone could still produce a result, and
/// someone could still receive it.
pub(crate) fn is_fulfillable<V>(node: &Node<V>) -> bool {
    let has_pred = node.has_promise.get() || node.prev.borrow().is_some();
    let has_succ = node.has_future.get() || node.next.borrow().is_some();
    has_pred && has_succ
}

pub(crate) fn attach_promise<V>(node: &Node<V>) {
    debug_assert!(!node.has_promise.get(), "double-attach of a promise handle");
    node.has_promise.set(true);
}

pub(crate) fn detach_promise<V>(node: &Node<V>) {
    node.has_promise.set(false);
}

pub(crate) fn attach_future<V>(node: &Node<V>) {
    debug_assert!(!node.has_future.get(), "double-attach of a future handle");
    node.has_future.set(true);
}

pub(crate) fn detach_future<V>(node: &Node<V>) {
    node.has_future.set(false);
}

/// Links `producer` to `successor`: precondition, `producer` has no existing
/// successor. If `producer` is already ready, fulfilment is scheduled
/// immediately (inline if shadow, via the executor otherwise).
pub(crate) fn set_target<V, U>(
    producer: &Rc<Node<V>>,
    successor: Rc<Node<U>>,
    direct: bool,
    deliver: impl FnOnce(Outcome<V>) + 'static,
) where
    V: 'static,
    U: 'static,
{
    debug_assert!(producer.next.borrow().is_none(), "setTarget on a context that already has a successor");
    let shadow = direct || producer.is_shadow.get();
    *successor.prev.borrow_mut() = Some(producer.clone() as Rc<dyn Upstream>);
    let edge = Edge {
        shadow,
        deliver: Box::new(deliver),
        upstream: successor as Rc<dyn Upstream>,
    };
    *producer.next.borrow_mut() = Some(edge);
    if is_ready(producer) {
        fire_edge(producer);
    }
}

/// Links `producer` to `successor` exactly like [`set_target`], except the
/// successor's `prev` is left untouched. `collect`'s fan-in is the only
/// caller: a single `prev` slot cannot represent N predecessors, so the
/// combinator tracks its inputs itself (`collect::CollectState`) rather than
/// through the graph's normal single-predecessor link. Leaving `prev` unset
/// is what makes the output node's `prev` genuinely empty, so a message
/// routed upstream through it (`route_message_upstream`) stops there instead
/// of leaking up whichever input happened to link last. Always a direct
/// (shadow) edge, matching §4.5's construction note that inputs fulfil the
/// combinator inline.
pub(crate) fn set_target_untracked<V: 'static, U: 'static>(
    producer: &Rc<Node<V>>,
    successor: Rc<Node<U>>,
    deliver: impl FnOnce(Outcome<V>) + 'static,
) {
    debug_assert!(producer.next.borrow().is_none(), "setTarget on a context that already has a successor");
    let edge = Edge {
        shadow: true,
        deliver: Box::new(deliver),
        upstream: successor as Rc<dyn Upstream>,
    };
    *producer.next.borrow_mut() = Some(edge);
    if is_ready(producer) {
        fire_edge(producer);
    }
}

/// Sets `producer`'s value, scheduling delivery to its successor if one is
/// linked. Precondition: not already ready.
pub(crate) fn set_value<V: 'static>(producer: &Rc<Node<V>>, value: V) {
    debug_assert!(!is_ready(producer), "setValue on an already-ready context");
    tracing::trace!("context value set");
    *producer.value.borrow_mut() = Some(value);
    fire_edge(producer);
}

/// Stores an error, first trying any already-registered typed handler on
/// this same node (FIFO, first-registered-wins on ties per §9's Open
/// Question resolution), then forwarding to a linked successor, then
/// parking it at the frontier. Precondition: not already ready.
pub(crate) fn store_error<V: 'static>(node: &Rc<Node<V>>, sig: Signal) {
    debug_assert!(!is_ready(node), "setError on an already-ready context");
    if let Some(entry) = take_matching_error_handler(node, &sig) {
        dispatch_error_handler(node, entry, sig);
        return;
    }
    *node.stored_error.borrow_mut() = Some(sig);
    fire_edge(node);
}

fn take_matching_error_handler<V>(node: &Node<V>, sig: &Signal) -> Option<ErrorHandlerEntry<V>> {
    let mut handlers = node.error_handlers.borrow_mut();
    let pos = handlers.iter().position(|h| h.type_id == sig.type_id())?;
    handlers.remove(pos)
}

fn dispatch_error_handler<V: 'static>(node: &Rc<Node<V>>, entry: ErrorHandlerEntry<V>, sig: Signal) {
    let node = node.clone();
    executor::enqueue(Task::new(move || {
        let value = (entry.handler)(sig);
        set_value(&node, value);
    }));
}

/// Registers a typed error handler. If a matching error is already parked at
/// this node, consumption is scheduled immediately; otherwise the handler
/// waits in FIFO order for a future `storeError` to match it.
pub(crate) fn add_error_handler<V: 'static>(node: &Rc<Node<V>>, type_id: TypeId, handler: Box<dyn FnOnce(Signal) -> V>) {
    let matches_stored = node.stored_error.borrow().as_ref().map_or(false, |s| s.type_id() == type_id);
    if matches_stored {
        let sig = node.stored_error.borrow_mut().take().expect("checked Some above");
        dispatch_error_handler(node, ErrorHandlerEntry { type_id, handler }, sig);
    } else {
        node.error_handlers.borrow_mut().push_back(ErrorHandlerEntry { type_id, handler });
    }
}

/// Registers a persistent message handler. Any queued messages of matching
/// type are drained to it immediately, in arrival order.
pub(crate) fn add_message_handler<V>(node: &Node<V>, type_id: TypeId, handler: Box<dyn Fn(Signal)>) {
    let mut stored = node.stored_messages.borrow_mut();
    let mut kept = VecDeque::with_capacity(stored.len());
    while let Some(sig) = stored.pop_front() {
        if sig.type_id() == type_id {
            handler(sig);
        } else {
            kept.push_back(sig);
        }
    }
    *stored = kept;
    drop(stored);
    node.message_handlers.borrow_mut().push_back(MessageHandlerEntry { type_id, handler });
}

fn deliver_message_locally<V>(node: &Node<V>, sig: Signal) {
    let handlers = node.message_handlers.borrow();
    let matched = handlers.iter().any(|h| h.type_id == sig.type_id());
    if matched {
        for h in handlers.iter().filter(|h| h.type_id == sig.type_id()) {
            (h.handler)(sig.clone());
        }
    } else {
        drop(handlers);
        node.stored_messages.borrow_mut().push_back(sig);
    }
}

/// Sends a message upstream from `node`, walking `prev` links toward the
/// root. A collect-result node never has a `prev` (§9's Open Question:
/// non-combinator code must never observe multi-predecessor state, so
/// `collect`'s output deliberately tracks none) and so behaves as its own
/// root for message purposes.
pub(crate) fn route_message_upstream<V: 'static>(node: &Rc<Node<V>>, sig: Signal) {
    Upstream::route_message(node.clone() as Rc<dyn Upstream>, sig);
}

/// Fires `node`'s outgoing edge if it has a value or a stored (unforwarded)
/// error ready to go. Severs the edge's reverse `prev` link before running
/// the delivery closure, so a delivery that re-wires its own predecessor
/// (async splicing, see `splice_shadow`) never races the teardown of the
/// edge it is currently firing on.
fn fire_edge<V: 'static>(node: &Rc<Node<V>>) {
    if node.next.borrow().is_none() {
        return;
    }
    let shadow = node.next.borrow().as_ref().expect("checked above").shadow;
    let node = node.clone();
    let run = move || {
        let edge = match node.next.borrow_mut().take() {
            Some(edge) => edge,
            None => return,
        };
        edge.upstream.clear_prev();
        let value = node.value.borrow_mut().take();
        if let Some(value) = value {
            (edge.deliver)(Outcome::Value(value));
            return;
        }
        let error = node.stored_error.borrow_mut().take();
        if let Some(sig) = error {
            node.error_forwarded.set(true);
            (edge.deliver)(Outcome::Error(sig));
        }
    };
    if shadow {
        run();
    } else {
        executor::enqueue(Task::new(run));
    }
}

/// Splices `shadow`'s sub-graph in front of `target`: `shadow` becomes a
/// direct (inline) predecessor of `target`, so when `shadow` eventually
/// settles, its result flows into `target` within the same executor step
/// that would otherwise have been consumed entering the shadow.
///
/// `target` here is the `AsyncNext` context itself, not some further
/// successor: per §4.3, the two-phase protocol is "first create shadow, then
/// propagate its result" *into the same node* that ran the async
/// continuation. By the time this runs, `target`'s original incoming edge
/// has already been severed by [`fire_edge`] (sever-then-deliver, rather
/// than the source material's deliver-then-sever), so re-pointing
/// `target.prev` at `shadow` here never has to race or undo that teardown.
pub(crate) fn splice_shadow<U: 'static>(shadow: Rc<Node<U>>, target: Rc<Node<U>>) {
    debug_assert!(shadow.next.borrow().is_none(), "shadow already has a successor");
    debug_assert!(!shadow.is_shadow.get(), "node is already a shadow");
    shadow.is_shadow.set(true);
    // §4.1 `makeShadowOf`'s explicit effect: "clear its future-handle flag."
    // Idempotent with the `detach_future` already run by `Future::into_context`
    // on the path that gets a node here today, but this is the node becoming
    // a shadow, so the clearing belongs here regardless of how the caller
    // obtained it.
    detach_future(&shadow);
    tracing::trace!("splicing shadow sub-graph");
    let target_for_value = target.clone();
    let target_for_error = target;
    set_target(&shadow, target_for_value.clone(), true, move |outcome| match outcome {
        Outcome::Value(v) => set_value(&target_for_value, v),
        Outcome::Error(sig) => store_error(&target_for_error, sig),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn producer_with_next<V: 'static>() -> (Rc<Node<V>>, Rc<Node<V>>) {
        let producer = Rc::new(Node::<V>::new());
        let successor = Rc::new(Node::<V>::new());
        set_target(&producer, successor.clone(), false, {
            let successor = successor.clone();
            move |outcome| match outcome {
                Outcome::Value(v) => set_value(&successor, v),
                Outcome::Error(sig) => store_error(&successor, sig),
            }
        });
        (producer, successor)
    }

    #[test]
    fn set_value_without_next_just_parks() {
        let node = Rc::new(Node::<i32>::new());
        set_value(&node, 10);
        assert!(is_ready(&node));
        assert!(node.next.borrow().is_none());
    }

    #[test]
    fn error_without_handler_or_next_parks() {
        let node = Rc::new(Node::<i32>::new());
        store_error(&node, Signal::new(String::from("boom")));
        assert!(node.stored_error.borrow().is_some());
        assert!(!node.error_forwarded.get());
    }

    #[test]
    fn shadow_edge_fires_without_an_executor() {
        let producer = Rc::new(Node::<i32>::new());
        let successor = Rc::new(Node::<i32>::new());
        set_target(&producer, successor.clone(), true, {
            let successor = successor.clone();
            move |outcome| {
                if let Outcome::Value(v) = outcome {
                    set_value(&successor, v);
                }
            }
        });
        set_value(&producer, 5);
        assert_eq!(*successor.value.borrow(), Some(5));
    }

    #[test]
    fn non_shadow_edge_requires_an_executor() {
        let exec = crate::executor::testing::ManualExecutor::new();
        let _guard = crate::executor::ExecutorGuard::install(exec.clone());
        let (producer, successor) = producer_with_next::<i32>();
        set_value(&producer, 7);
        assert!(successor.value.borrow().is_none());
        assert!(exec.step());
        assert_eq!(*successor.value.borrow(), Some(7));
    }
}
