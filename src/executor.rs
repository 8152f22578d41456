//! The pluggable single-threaded dispatch contract, and the process-wide
//! (really: per-thread) current instance that the context graph schedules
//! onto.

use std::cell::RefCell;
use std::rc::Rc;

/// An owning wrapper over a zero-argument closure, handed to an [`Executor`]
/// for later execution.
pub struct Task(Box<dyn FnOnce()>);

impl Task {
    pub(crate) fn new(f: impl FnOnce() + 'static) -> Self {
        Task(Box::new(f))
    }

    pub(crate) fn run(self) {
        (self.0)()
    }
}

/// Single-threaded dispatch contract. Implementors decide when and on what
/// thread enqueued tasks actually run; the engine never spawns threads and
/// never assumes anything about ordering beyond "enqueue order is run
/// order," which every task source in this crate already honours on its own
/// side.
pub trait Executor {
    fn enqueue(&self, task: Task);
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<dyn Executor>>> = RefCell::new(None);
}

/// RAII handle for installing the current-thread executor. Restores whatever
/// was installed before it on drop, so nested installs (e.g. in tests) behave
/// like a stack.
pub struct ExecutorGuard {
    previous: Option<Rc<dyn Executor>>,
}

impl ExecutorGuard {
    /// Installs `executor` as current for this thread, returning a guard that
    /// restores the previous executor (if any) when dropped.
    pub fn install(executor: Rc<dyn Executor>) -> Self {
        let previous = CURRENT.with(|cell| cell.borrow_mut().replace(executor));
        ExecutorGuard { previous }
    }
}

impl Drop for ExecutorGuard {
    fn drop(&mut self) {
        CURRENT.with(|cell| *cell.borrow_mut() = self.previous.take());
    }
}

pub(crate) fn enqueue(task: Task) {
    CURRENT.with(|cell| {
        let executor = cell
            .borrow()
            .clone()
            .expect("no executor installed on this thread; install one with ExecutorGuard::install before driving futures");
        executor.enqueue(task);
    });
}

/// A deterministic, hand-driven [`Executor`] for tests: tasks are queued in a
/// `VecDeque` and only run when the test explicitly steps the queue. This is
/// test infrastructure for this crate's own suite, not a second production
/// executor.
pub mod testing {
    use super::{Executor, Task};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    #[derive(Default)]
    pub struct ManualExecutor {
        queue: RefCell<VecDeque<Task>>,
    }

    impl ManualExecutor {
        pub fn new() -> Rc<Self> {
            Rc::new(ManualExecutor::default())
        }

        /// Runs the oldest queued task, if any. Returns whether a task ran.
        pub fn step(&self) -> bool {
            let task = self.queue.borrow_mut().pop_front();
            match task {
                Some(task) => {
                    task.run();
                    true
                }
                None => false,
            }
        }

        /// Steps until the queue is empty, returning how many tasks ran.
        pub fn run_all(&self) -> usize {
            let mut count = 0;
            while self.step() {
                count += 1;
            }
            count
        }

        pub fn pending(&self) -> usize {
            self.queue.borrow().len()
        }
    }

    impl Executor for ManualExecutor {
        fn enqueue(&self, task: Task) {
            self.queue.borrow_mut().push_back(task);
        }
    }
}
