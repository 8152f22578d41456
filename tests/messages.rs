//! Upstream message routing (§4.1's `sendMessage`/`addMessageHandler`) and
//! the handler-registration-order idempotence property from §8's
//! "Round-trip / idempotence" section.

use std::cell::RefCell;
use std::rc::Rc;

use pledge::executor::testing::ManualExecutor;
use pledge::executor::ExecutorGuard;
use pledge::promise::Promise;

#[derive(Clone, Debug, PartialEq)]
struct Ping(u32);

#[test]
fn message_sent_downstream_routes_back_to_the_root() {
    let exec = ManualExecutor::new();
    let _guard = ExecutorGuard::install(exec.clone());

    let promise = Promise::<i32>::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen2 = seen.clone();
    promise.on_message(move |Ping(n)| seen2.borrow_mut().push(n));

    let future = promise.future().then(|v| v + 1);
    future.send_message(Ping(7));

    assert_eq!(*seen.borrow(), vec![7]);
}

#[test]
fn message_sent_before_handler_registered_is_retained_and_drained() {
    let exec = ManualExecutor::new();
    let _guard = ExecutorGuard::install(exec.clone());

    let promise = Promise::<i32>::new();
    let future = promise.future();

    // No handler yet: the message should park rather than vanish (§9's
    // "retention is the safer default" resolution).
    future.send_message(Ping(1));
    future.send_message(Ping(2));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen2 = seen.clone();
    promise.on_message(move |Ping(n)| seen2.borrow_mut().push(n));

    assert_eq!(*seen.borrow(), vec![1, 2]);
}

#[test]
fn error_handler_registered_before_or_after_the_error_has_the_same_effect() {
    // Registered after: the error is already parked when on_error runs.
    {
        let exec = ManualExecutor::new();
        let _guard = ExecutorGuard::install(exec.clone());

        let promise = Promise::<i32>::new();
        let future = promise.future();
        promise.set_error(String::from("boom"));
        let future = future.on_error(|_e: String| 99);

        assert!(exec.step());
        assert_eq!(future.value(), 99);
        assert!(!exec.step());
    }

    // Registered before: the handler is already waiting when the error lands.
    {
        let exec = ManualExecutor::new();
        let _guard = ExecutorGuard::install(exec.clone());

        let promise = Promise::<i32>::new();
        let future = promise.future().on_error(|_e: String| 99);
        promise.set_error(String::from("boom"));

        assert!(exec.step());
        assert_eq!(future.value(), 99);
        assert!(!exec.step());
    }
}
