//! `Future<V>`: the safe, move-only handle applications hold on a context
//! node they do not own the production side of.

use std::any::{Any, TypeId};
use std::rc::Rc;

use crate::context::{self, Node, Outcome};
use crate::signal::Signal;

/// A handle referring to a context node's eventual (or already-present)
/// result. Futures are move-only: there is no `Clone` impl, matching §4.4's
/// "Futures are move-only; copying is forbidden." Use
/// [`SharedPromise`](crate::promise::SharedPromise) when multiple owners
/// need to reach the production side.
pub struct Future<V> {
    context: Option<Rc<Node<V>>>,
}

impl<V: 'static> Future<V> {
    pub(crate) fn new(node: Rc<Node<V>>) -> Self {
        context::attach_future(&node);
        Future { context: Some(node) }
    }

    fn ctx(&self) -> &Rc<Node<V>> {
        self.context.as_ref().expect("future already consumed")
    }

    /// Consumes the handle, returning its underlying context. Used internally
    /// when a future's context is being repurposed rather than released:
    /// building a `.then()` successor, feeding a `collect()` slot, or
    /// splicing an async continuation's sub-graph as a shadow. The
    /// future-handle flag is cleared exactly as a normal drop would (§4.4):
    /// the `Future` handle is gone either way, just not via `Drop::drop`.
    pub(crate) fn into_context(mut self) -> Rc<Node<V>> {
        let node = self.context.take().expect("future already consumed");
        context::detach_future(&node);
        node
    }

    /// Builds a successor that runs `f` on this future's value once it
    /// arrives, producing a plain value of type `U`.
    ///
    /// Rust cannot dispatch on `f`'s return type the way a structurally
    /// typed language can (whether it returns `U` or `Future<U>`), and a
    /// single blanket-impl-based `then` runs into an orphan/overlap
    /// conflict trying to express both cases generically. So, as §9's
    /// Design Note prescribes for nominal type systems: two methods.
    /// This one is for continuations that return a plain value; see
    /// [`then_async`](Self::then_async) for continuations that return
    /// another `Future`.
    pub fn then<U, F>(self, f: F) -> Future<U>
    where
        U: 'static,
        F: FnOnce(V) -> U + 'static,
    {
        let successor: Rc<Node<U>> = Rc::new(Node::new());
        let producer = self.into_context();
        context::set_target(&producer, successor.clone(), false, {
            let successor = successor.clone();
            move |outcome| match outcome {
                Outcome::Value(v) => context::set_value(&successor, f(v)),
                Outcome::Error(sig) => context::store_error(&successor, sig),
            }
        });
        Future::new(successor)
    }

    /// Builds a successor that runs `f` on this future's value once it
    /// arrives, where `f` itself returns a `Future<U>` whose result is
    /// spliced in as this continuation's own result (§4.3's `AsyncNext`
    /// two-phase protocol).
    pub fn then_async<U, F>(self, f: F) -> Future<U>
    where
        U: 'static,
        F: FnOnce(V) -> Future<U> + 'static,
    {
        let node: Rc<Node<U>> = Rc::new(Node::new());
        let producer = self.into_context();
        context::set_target(&producer, node.clone(), false, {
            let node = node.clone();
            move |outcome| match outcome {
                Outcome::Value(v) => {
                    let sub_future = f(v);
                    let sub_ctx = sub_future.into_context();
                    context::splice_shadow(sub_ctx, node.clone());
                }
                Outcome::Error(sig) => context::store_error(&node, sig),
            }
        });
        Future::new(node)
    }

    /// Registers a typed error handler and returns `self` for further
    /// chaining (`Future.onError` in §6's table). `f` must return a value of
    /// this future's own value type: on a match, that value continues
    /// downstream exactly as a normal value would have.
    pub fn on_error<E, F>(self, f: F) -> Self
    where
        E: Any,
        F: FnOnce(E) -> V + 'static,
    {
        let type_id = TypeId::of::<E>();
        let handler: Box<dyn FnOnce(Signal) -> V> = Box::new(move |sig| {
            let err = sig.downcast::<E>().unwrap_or_else(|_| panic!("error handler signal type mismatch"));
            f(err)
        });
        context::add_error_handler(self.ctx(), type_id, handler);
        self
    }

    /// Routes `msg` upstream, toward the root of the chain.
    pub fn send_message<M: Any + Clone>(&self, msg: M) {
        context::route_message_upstream(self.ctx(), Signal::new(msg));
    }

    pub fn is_ready(&self) -> bool {
        context::is_ready(self.ctx())
    }

    /// Const access to the value. Precondition: `is_ready()` and the context
    /// is ready with a value (not an error).
    pub fn value(&self) -> V
    where
        V: Clone,
    {
        self.ctx()
            .value_ref()
            .clone()
            .expect("Future::value() called on a context with no value present")
    }
}

impl<V> Drop for Future<V> {
    fn drop(&mut self) {
        if let Some(node) = self.context.take() {
            context::detach_future(&node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::testing::ManualExecutor;
    use crate::executor::ExecutorGuard;
    use crate::promise::Promise;

    #[test]
    fn then_chain_runs_in_declaration_order() {
        let exec = ManualExecutor::new();
        let _guard = ExecutorGuard::install(exec.clone());

        let promise = Promise::<i32>::new();
        let future = promise.future();
        let a = Rc::new(std::cell::Cell::new(0));
        let b = Rc::new(std::cell::Cell::new(false));
        let a2 = a.clone();
        let b2 = b.clone();
        let _final = future
            .then(move |v| {
                a2.set(v);
            })
            .then(move |_| {
                b2.set(true);
            });

        promise.set_value(42);
        assert_eq!(a.get(), 0);
        assert!(exec.step());
        assert_eq!(a.get(), 42);
        assert!(!b.get());
        assert!(exec.step());
        assert!(b.get());
        assert!(!exec.step());
    }
}
