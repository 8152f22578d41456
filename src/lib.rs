//! A single-threaded promise/future engine built around a dynamically
//! constructed context graph: chains of continuations, typed error
//! handlers, upstream messages, and a fan-in `collect` combinator, all
//! driven by whatever [`Executor`](executor::Executor) the host installs.
//!
//! The engine is agnostic to any particular event loop. It never spawns a
//! thread and never blocks; the only thing it asks of its host is a place
//! to enqueue zero-argument tasks, installed per-thread via
//! [`executor::ExecutorGuard`].
//!
//! ```
//! use std::rc::Rc;
//! use pledge::executor::{testing::ManualExecutor, ExecutorGuard};
//! use pledge::promise::Promise;
//!
//! let exec = ManualExecutor::new();
//! let _guard = ExecutorGuard::install(exec.clone());
//!
//! let promise = Promise::<i32>::new();
//! let future = promise.future().then(|v| v * 2);
//! promise.set_value(21);
//! exec.run_all();
//! assert_eq!(future.value(), 42);
//! ```

mod context;

pub mod collect;
pub mod error;
pub mod executor;
pub mod future;
pub mod promise;
pub mod signal;

pub use collect::collect;
pub use error::BrokenPromise;
pub use future::Future;
pub use promise::{Promise, SharedPromise};
pub use signal::Signal;
