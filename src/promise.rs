//! `Promise<V>` and `SharedPromise<V>`: the production-side handles over a
//! root context node.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::rc::Rc;

use crate::context::{self, Node};
use crate::error::BrokenPromise;
use crate::future::Future;
use crate::signal::Signal;

/// Owns a fresh root context. Dropping a `Promise` whose context is still
/// fulfillable but not yet ready injects [`BrokenPromise`] as an error,
/// delivered to the future side exactly as a user error would be.
pub struct Promise<V> {
    context: Option<Rc<Node<V>>>,
}

impl<V: 'static> Promise<V> {
    pub fn new() -> Self {
        let node = Rc::new(Node::new());
        context::attach_promise(&node);
        tracing::trace!("promise created");
        Promise { context: Some(node) }
    }

    fn ctx(&self) -> &Rc<Node<V>> {
        self.context.as_ref().expect("promise already consumed")
    }

    /// Hands out a future referring to this promise's context.
    pub fn future(&self) -> Future<V> {
        Future::new(self.ctx().clone())
    }

    /// Precondition: not already ready.
    pub fn set_value(&self, value: V) {
        context::set_value(self.ctx(), value);
    }

    /// Precondition: not already ready.
    pub fn set_error<E: Any + Clone>(&self, error: E) {
        context::store_error(self.ctx(), Signal::new(error));
    }

    /// Registers a persistent handler for upstream messages of type `M`
    /// arriving at the root.
    pub fn on_message<M, F>(&self, f: F)
    where
        M: Any + Clone,
        F: Fn(M) + 'static,
    {
        let type_id = TypeId::of::<M>();
        let handler: Box<dyn Fn(Signal)> = Box::new(move |sig| {
            let msg = sig.downcast::<M>().unwrap_or_else(|_| panic!("message handler signal type mismatch"));
            f(msg);
        });
        context::add_message_handler(self.ctx(), type_id, handler);
    }
}

impl<V: 'static> Default for Promise<V> {
    fn default() -> Self {
        Promise::new()
    }
}

impl<V: 'static> Drop for Promise<V> {
    fn drop(&mut self) {
        if let Some(node) = self.context.take() {
            finalize_drop(&node);
        }
    }
}

fn finalize_drop<V: 'static>(node: &Rc<Node<V>>) {
    if !context::is_ready(node) && context::is_fulfillable(node) {
        tracing::debug!("promise dropped unfulfilled, injecting BrokenPromise");
        context::store_error(node, Signal::new(BrokenPromise));
    }
    context::detach_promise(node);
}

/// Shared ownership over a single `Promise`, so callbacks can hold the
/// production side mutably without the borrow-checker getting in the way.
/// `forget()` closes the promise early, producing a broken-promise error if
/// a future side still exists.
pub struct SharedPromise<V> {
    inner: Rc<RefCell<Option<Promise<V>>>>,
}

impl<V: 'static> SharedPromise<V> {
    pub fn new() -> Self {
        SharedPromise {
            inner: Rc::new(RefCell::new(Some(Promise::new()))),
        }
    }

    pub fn future(&self) -> Future<V> {
        self.inner
            .borrow()
            .as_ref()
            .expect("SharedPromise already forgotten")
            .future()
    }

    pub fn set_value(&self, value: V) {
        if let Some(promise) = self.inner.borrow().as_ref() {
            promise.set_value(value);
        }
    }

    pub fn set_error<E: Any + Clone>(&self, error: E) {
        if let Some(promise) = self.inner.borrow().as_ref() {
            promise.set_error(error);
        }
    }

    /// Drops the underlying promise now rather than when the last clone of
    /// this handle goes away.
    pub fn forget(&self) {
        self.inner.borrow_mut().take();
    }
}

impl<V: 'static> Default for SharedPromise<V> {
    fn default() -> Self {
        SharedPromise::new()
    }
}

impl<V> Clone for SharedPromise<V> {
    fn clone(&self) -> Self {
        SharedPromise { inner: self.inner.clone() }
    }
}
