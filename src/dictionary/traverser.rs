//! Depth-first traversal with caller-controlled pruning.
//!
//! The traverser owns a handle to the dictionary, so matchers built on it can
//! outlive the borrow that created them. It yields one [`Step`] per
//! transition taken; the caller inspects the target state and may call
//! [`StateTraverser::prune`] to skip its subtree.

use smallvec::SmallVec;

use super::automaton::StateId;
use super::Dictionary;

/// A transition out of an expanded state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub label: u8,
    pub target: StateId,
    pub weight: u32,
}

/// One step of the traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Step {
    /// Label of the transition taken.
    pub label: u8,
    /// State reached.
    pub state: StateId,
    /// Number of labels from the traversal start to `state`.
    pub depth: usize,
}

/// Order in which the children of a state are visited.
pub(crate) trait ChildOrder {
    /// Reorder `children`, which arrive sorted by label.
    fn arrange(&self, path: &[u8], children: &mut [Transition]);

    /// Whether children need their subtree weight.
    fn needs_weights(&self) -> bool {
        false
    }
}

/// Lexicographic order.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LabelOrder;

impl ChildOrder for LabelOrder {
    fn arrange(&self, _path: &[u8], _children: &mut [Transition]) {}
}

/// Heaviest subtree first, ties broken by label.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WeightOrder;

impl ChildOrder for WeightOrder {
    fn arrange(&self, _path: &[u8], children: &mut [Transition]) {
        // Stable, so equal weights keep label order.
        children.sort_by(|a, b| b.weight.cmp(&a.weight));
    }

    fn needs_weights(&self) -> bool {
        true
    }
}

/// While the path still spells a prefix of `target`, visit the child that
/// continues it first; everything else in label order.
#[derive(Debug, Clone, Default)]
pub(crate) struct TargetFirstOrder {
    pub target: Vec<u8>,
}

impl ChildOrder for TargetFirstOrder {
    fn arrange(&self, path: &[u8], children: &mut [Transition]) {
        let depth = path.len();
        if depth >= self.target.len() || !self.target.starts_with(path) {
            return;
        }
        let wanted = self.target[depth];
        if let Some(pos) = children.iter().position(|t| t.label == wanted) {
            children[..=pos].rotate_right(1);
        }
    }
}

struct Frame {
    children: SmallVec<[Transition; 4]>,
    next: usize,
}

/// Explicit-stack DFS over the states below a start state.
pub(crate) struct StateTraverser<O: ChildOrder> {
    dictionary: Dictionary,
    order: O,
    frames: Vec<Frame>,
    path: Vec<u8>,
    /// State yielded last, expanded lazily on the next call.
    pending: Option<StateId>,
    min_weight: u32,
}

impl<O: ChildOrder> StateTraverser<O> {
    /// Traverse the states below `start`; `start` itself is not yielded.
    pub fn new(dictionary: Dictionary, start: StateId, order: O) -> Self {
        StateTraverser {
            dictionary,
            order,
            frames: Vec::with_capacity(16),
            path: Vec::with_capacity(16),
            pending: Some(start),
            min_weight: 0,
        }
    }

    /// Labels from the start state to the state yielded last.
    pub fn path(&self) -> &[u8] {
        &self.path
    }

    /// The dictionary being traversed.
    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Skip the subtree of the state yielded last.
    pub fn prune(&mut self) {
        self.pending = None;
    }

    /// Skip subtrees whose maximum weight is below `weight` from now on.
    pub fn set_min_weight(&mut self, weight: u32) {
        self.min_weight = weight;
    }

    /// Current weight floor.
    pub fn min_weight(&self) -> u32 {
        self.min_weight
    }

    fn expand(&mut self, state: StateId) {
        let automaton = self.dictionary.automaton();
        let Some(state) = automaton.state(state) else {
            tracing::warn!(state, "skipping unreadable state");
            return;
        };

        let weighted = self.order.needs_weights() || self.dictionary.is_weighted();
        let mut children: SmallVec<[Transition; 4]> = state
            .edges()
            .map(|(label, target)| Transition {
                label,
                target,
                weight: if weighted {
                    automaton.state(target).map_or(0, |s| s.max_weight())
                } else {
                    0
                },
            })
            .collect();
        self.order.arrange(&self.path, &mut children);
        self.frames.push(Frame { children, next: 0 });
    }
}

impl<O: ChildOrder> Iterator for StateTraverser<O> {
    type Item = Step;

    fn next(&mut self) -> Option<Step> {
        if let Some(state) = self.pending.take() {
            self.expand(state);
        }

        loop {
            let depth = self.frames.len();
            let frame = self.frames.last_mut()?;
            let Some(&transition) = frame.children.get(frame.next) else {
                self.frames.pop();
                continue;
            };
            frame.next += 1;

            if transition.weight < self.min_weight {
                continue;
            }

            self.path.truncate(depth - 1);
            self.path.push(transition.label);
            self.pending = Some(transition.target);
            return Some(Step {
                label: transition.label,
                state: transition.target,
                depth,
            });
        }
    }
}
