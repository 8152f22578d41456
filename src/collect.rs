//! The `collect` combinator: fan-in of N futures into a future of a vector,
//! preserving input order and short-circuiting on the first error.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::{self, Node, Outcome};
use crate::future::Future;

struct CollectState<T> {
    slots: Vec<Option<T>>,
    remaining: usize,
    failed: bool,
    output: Rc<Node<Vec<T>>>,
}

/// Awaits every future in `inputs` in any completion order, producing their
/// values in input order, or the first error encountered.
///
/// Each input is linked to the shared output node with
/// [`context::set_target_untracked`], a direct (shadow) edge that — unlike
/// the normal single-predecessor [`context::set_target`] — does not write
/// the output node's `prev`. A single `prev` slot cannot represent N
/// predecessors, so per §9's Open Question, this crate's resolution is that
/// `collect`'s fan-in is tracked entirely in [`CollectState`] rather than in
/// the output node's `prev`; the output node's `prev` therefore stays
/// genuinely empty, and a message sent upstream from the collected future
/// stops there instead of leaking up whichever input happened to link last.
pub fn collect<T: 'static>(inputs: Vec<Future<T>>) -> Future<Vec<T>> {
    let output: Rc<Node<Vec<T>>> = Rc::new(Node::new());
    let count = inputs.len();

    if count == 0 {
        context::set_value(&output, Vec::new());
        return Future::new(output);
    }

    let state = Rc::new(RefCell::new(CollectState {
        slots: (0..count).map(|_| None).collect(),
        remaining: count,
        failed: false,
        output: output.clone(),
    }));

    for (index, input) in inputs.into_iter().enumerate() {
        let producer = input.into_context();
        let state = state.clone();
        context::set_target_untracked(&producer, output.clone(), move |outcome| {
            accept(&state, index, outcome);
        });
    }

    Future::new(output)
}

fn accept<T: 'static>(state: &Rc<RefCell<CollectState<T>>>, index: usize, outcome: Outcome<T>) {
    let mut st = state.borrow_mut();
    if st.failed || context::is_ready(&st.output) {
        return;
    }
    match outcome {
        Outcome::Error(sig) => {
            st.failed = true;
            let output = st.output.clone();
            drop(st);
            context::store_error(&output, sig);
        }
        Outcome::Value(value) => {
            st.slots[index] = Some(value);
            st.remaining -= 1;
            if st.remaining == 0 {
                let values = st.slots.iter_mut().map(|slot| slot.take().expect("collect slot missing at completion")).collect();
                let output = st.output.clone();
                drop(st);
                context::set_value(&output, values);
            }
        }
    }
}
