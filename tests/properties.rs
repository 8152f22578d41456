//! Property-based tests for the Quantified Invariants that are naturally
//! stated over arbitrary chain length / input order rather than a single
//! literal scenario.

use std::cell::Cell;
use std::rc::Rc;

use proptest::prelude::*;

use pledge::collect::collect;
use pledge::executor::testing::ManualExecutor;
use pledge::executor::ExecutorGuard;
use pledge::promise::Promise;

proptest! {
    /// Invariant 1: a chain of `n` `.then()`s takes exactly `n` executor
    /// steps to settle, one step per continuation, in declaration order.
    #[test]
    fn chain_of_n_thens_takes_n_steps(n in 1usize..12) {
        let exec = ManualExecutor::new();
        let _guard = ExecutorGuard::install(exec.clone());

        let promise = Promise::<i32>::new();
        let mut future = promise.future();
        let order = Rc::new(std::cell::RefCell::new(Vec::new()));

        for k in 0..n {
            let order = order.clone();
            future = future.then(move |v| {
                order.borrow_mut().push(k);
                v + 1
            });
        }

        promise.set_value(0);
        let mut steps = 0;
        while exec.step() {
            steps += 1;
        }
        prop_assert_eq!(steps, n);
        prop_assert_eq!(future.value(), n as i32);
        prop_assert_eq!(order.borrow().clone(), (0..n).collect::<Vec<_>>());
    }

    /// Invariant 3: an error dropped into a chain with no matching handler
    /// eventually settles every node (none stay dangling) without ever
    /// invoking any `.then()` continuation downstream of the error.
    #[test]
    fn unhandled_error_settles_the_whole_chain(n in 1usize..8) {
        let exec = ManualExecutor::new();
        let _guard = ExecutorGuard::install(exec.clone());

        let promise = Promise::<i32>::new();
        let mut future = promise.future();
        let ran = Rc::new(Cell::new(false));

        for _ in 0..n {
            let ran = ran.clone();
            future = future.then(move |v| {
                ran.set(true);
                v
            });
        }

        promise.set_error(String::from("boom"));
        exec.run_all();

        prop_assert!(!ran.get());
        // The error settles at the terminal node (parked, unconsumed) rather
        // than vanishing: "ready" per the glossary covers a stored error,
        // not just a value.
        prop_assert!(future.is_ready());
    }

    /// Invariant 4: `collect` preserves input order regardless of the order
    /// in which the underlying promises are actually resolved.
    #[test]
    fn collect_preserves_order_under_any_completion_permutation(
        values in prop::collection::vec(any::<i32>(), 1..6),
        seed in 0u64..720,
    ) {
        let exec = ManualExecutor::new();
        let _guard = ExecutorGuard::install(exec.clone());

        let promises: Vec<_> = values.iter().map(|_| Promise::<i32>::new()).collect();
        let futures = promises.iter().map(|p| p.future()).collect();
        let combined = collect(futures);

        let mut order: Vec<usize> = (0..values.len()).collect();
        // deterministic pseudo-shuffle from the seed, no RNG crate needed
        let mut s = seed;
        for i in (1..order.len()).rev() {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
            let j = (s >> 33) as usize % (i + 1);
            order.swap(i, j);
        }

        for &i in &order {
            promises[i].set_value(values[i]);
        }
        exec.run_all();

        prop_assert!(combined.is_ready());
        prop_assert_eq!(combined.value(), values);
    }
}
