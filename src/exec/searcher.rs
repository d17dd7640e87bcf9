//! Search strategies for selecting the next state to advance.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::Rng;

use crate::state::StateRef;

/// A strategy for finding the next execution state to explore.
pub trait Searcher {
    /// Returns the next state to explore, removing it from the active pool
    /// as appropriate. Returns `None` when exhausted.
    fn select_state(&mut self) -> Option<StateRef>;

    /// Enqueues a state.
    fn add_state(&mut self, state: StateRef);
}

/// Depth-first: selects the most recently added state.
#[derive(Default)]
pub struct DfsSearcher {
    states: Vec<StateRef>,
}

impl DfsSearcher {
    pub fn new() -> DfsSearcher {
        DfsSearcher::default()
    }
}

impl Searcher for DfsSearcher {
    fn select_state(&mut self) -> Option<StateRef> {
        self.states.pop()
    }

    fn add_state(&mut self, state: StateRef) {
        self.states.push(state);
    }
}

/// Breadth-first: selects the least recently added state.
#[derive(Default)]
pub struct BfsSearcher {
    states: VecDeque<StateRef>,
}

impl BfsSearcher {
    pub fn new() -> BfsSearcher {
        BfsSearcher::default()
    }
}

impl Searcher for BfsSearcher {
    fn select_state(&mut self) -> Option<StateRef> {
        self.states.pop_front()
    }

    fn add_state(&mut self, state: StateRef) {
        self.states.push_back(state);
    }
}

/// Uniformly random selection from the pool.
pub struct RandomSearcher {
    states: Vec<StateRef>,
    rng: StdRng,
}

impl RandomSearcher {
    /// Seed the generator (e.g. with `StdRng::seed_from_u64`) to make the
    /// selection sequence reproducible.
    pub fn new(rng: StdRng) -> RandomSearcher {
        RandomSearcher { states: Vec::new(), rng }
    }
}

impl Searcher for RandomSearcher {
    fn select_state(&mut self) -> Option<StateRef> {
        if self.states.is_empty() {
            return None;
        }
        let i = self.rng.gen_range(0..self.states.len());
        Some(self.states.remove(i))
    }

    fn add_state(&mut self, state: StateRef) {
        self.states.push(state);
    }
}

/// Walks the execution tree from the root, choosing uniformly among children
/// at every node, until a leaf is reached. States are reached through parent
/// pointers, so `add_state` is a no-op.
pub struct RandomPathSearcher {
    root: StateRef,
    rng: StdRng,
}

impl RandomPathSearcher {
    pub fn new(root: StateRef, rng: StdRng) -> RandomPathSearcher {
        RandomPathSearcher { root, rng }
    }
}

impl Searcher for RandomPathSearcher {
    fn select_state(&mut self) -> Option<StateRef> {
        let mut state = self.root.clone();
        loop {
            let next = {
                let s = state.borrow();
                let children = s.children();
                if children.is_empty() {
                    None
                } else {
                    Some(children[self.rng.gen_range(0..children.len())].clone())
                }
            };
            match next {
                None => return Some(state),
                Some(child) => state = child,
            }
        }
    }

    fn add_state(&mut self, _state: StateRef) {}
}

/// Round-robins selection across sub-strategies; additions fan out to every
/// sub-strategy. The driver tolerates the same state being handed out more
/// than once, so duplicates never execute twice.
pub struct MultiSearcher {
    searchers: Vec<Box<dyn Searcher>>,
    index: usize,
}

impl MultiSearcher {
    pub fn new(searchers: Vec<Box<dyn Searcher>>) -> MultiSearcher {
        MultiSearcher { searchers, index: 0 }
    }
}

impl Searcher for MultiSearcher {
    fn select_state(&mut self) -> Option<StateRef> {
        let searcher = &mut self.searchers[self.index];
        self.index += 1;
        if self.index >= self.searchers.len() {
            self.index = 0;
        }
        searcher.select_state()
    }

    fn add_state(&mut self, state: StateRef) {
        for searcher in &mut self.searchers {
            searcher.add_state(state.clone());
        }
    }
}
