//! Snapshot-by-delta over mutable state.
//!
//! A time capsule presents an immutable-looking view of a single mutable
//! value by remembering how to undo and redo each state change. Instants
//! form a tree rooted at creation; `acquire` repositions the shared state to
//! any instant by undoing along the path from the current instant to the
//! last common ancestor and redoing down to the target. This yields
//! O(path length) snapshot realization on top of one mutable buffer, at the
//! cost of single-holder acquire semantics.

use std::sync::Arc;

use parking_lot::Mutex;

use tempo_core::{RuntimeError, RuntimeResult};

/// Thunk applied to the shared state when moving between instants.
pub type Thunk<T> = Box<dyn FnMut(&mut T) + Send>;

struct Change<T> {
    redo: Thunk<T>,
    undo: Thunk<T>,
}

struct InstantNode<T> {
    /// Parent instant; `None` only for the root.
    parent: Option<Arc<InstantNode<T>>>,
    /// The state change this instant applies; `None` only for the root.
    change: Option<Mutex<Change<T>>>,
    /// Depth from the root, used for the last-common-ancestor walk.
    generation: u64,
}

struct SharedState<T> {
    data: T,
    current: Arc<InstantNode<T>>,
    acquisitions: u32,
}

/// A cloneable handle to one instant of a time capsule.
///
/// All handles derived from the same root share one mutable value, one
/// current-instant pointer, and one acquisition count. Cloning a handle
/// yields another reference to the same instant.
pub struct TimeCapsule<T> {
    node: Arc<InstantNode<T>>,
    shared: Arc<Mutex<SharedState<T>>>,
}

impl<T> Clone for TimeCapsule<T> {
    fn clone(&self) -> Self {
        TimeCapsule {
            node: Arc::clone(&self.node),
            shared: Arc::clone(&self.shared),
        }
    }
}

fn parent_of<T>(node: &Arc<InstantNode<T>>) -> RuntimeResult<Arc<InstantNode<T>>> {
    node.parent
        .clone()
        .ok_or_else(|| RuntimeError::State("time capsule history tree is corrupted".to_string()))
}

impl<T> TimeCapsule<T> {
    /// Creates a root instant adopting the current state.
    pub fn new(data: T) -> Self {
        let node = Arc::new(InstantNode {
            parent: None,
            change: None,
            generation: 0,
        });
        let shared = Arc::new(Mutex::new(SharedState {
            data,
            current: Arc::clone(&node),
            acquisitions: 0,
        }));
        TimeCapsule { node, shared }
    }

    /// Returns a child instant without touching the state.
    ///
    /// `redo` applies the change when moving onto the child, `undo` reverts
    /// it when moving off.
    pub fn modify(
        &self,
        redo: impl FnMut(&mut T) + Send + 'static,
        undo: impl FnMut(&mut T) + Send + 'static,
    ) -> Self {
        let node = Arc::new(InstantNode {
            parent: Some(Arc::clone(&self.node)),
            change: Some(Mutex::new(Change {
                redo: Box::new(redo),
                undo: Box::new(undo),
            })),
            generation: self.node.generation + 1,
        });
        TimeCapsule {
            node,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Depth of this instant from the root.
    pub fn generation(&self) -> u64 {
        self.node.generation
    }

    /// Returns `true` if this handle and `other` reference the same instant.
    pub fn same_instant(&self, other: &TimeCapsule<T>) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Positions the shared state at this instant.
    ///
    /// If the state is already here, the acquisition count is incremented.
    /// Fails with [`RuntimeError::TimeCapsuleAlreadyAcquired`] when another
    /// instant currently holds the state. Otherwise the capsule walks the
    /// history tree: undo along the path from the current instant up to the
    /// last common ancestor (nearest change first), then redo down to this
    /// instant (ancestor-near change first).
    pub fn acquire(&self) -> RuntimeResult<()> {
        let mut state = self.shared.lock();
        if Arc::ptr_eq(&state.current, &self.node) {
            state.acquisitions += 1;
            return Ok(());
        }
        if state.acquisitions > 0 {
            return Err(RuntimeError::TimeCapsuleAlreadyAcquired);
        }

        // Last common ancestor: level the deeper side, then walk in lockstep.
        let mut undo_path: Vec<Arc<InstantNode<T>>> = Vec::new();
        let mut redo_path: Vec<Arc<InstantNode<T>>> = Vec::new();
        let mut from = Arc::clone(&state.current);
        let mut to = Arc::clone(&self.node);
        while from.generation > to.generation {
            undo_path.push(Arc::clone(&from));
            from = parent_of(&from)?;
        }
        while to.generation > from.generation {
            redo_path.push(Arc::clone(&to));
            to = parent_of(&to)?;
        }
        while !Arc::ptr_eq(&from, &to) {
            undo_path.push(Arc::clone(&from));
            redo_path.push(Arc::clone(&to));
            from = parent_of(&from)?;
            to = parent_of(&to)?;
        }

        for node in &undo_path {
            if let Some(change) = node.change.as_ref() {
                let mut change = change.lock();
                (change.undo)(&mut state.data);
            }
        }
        for node in redo_path.iter().rev() {
            if let Some(change) = node.change.as_ref() {
                let mut change = change.lock();
                (change.redo)(&mut state.data);
            }
        }

        state.current = Arc::clone(&self.node);
        state.acquisitions = 1;
        Ok(())
    }

    /// Releases one acquisition of this instant.
    pub fn release(&self) -> RuntimeResult<()> {
        let mut state = self.shared.lock();
        if state.acquisitions == 0 {
            return Err(RuntimeError::TimeCapsuleNotAcquired);
        }
        if !Arc::ptr_eq(&state.current, &self.node) {
            return Err(RuntimeError::TimeCapsuleAcquiredElsewhere);
        }
        state.acquisitions -= 1;
        Ok(())
    }

    /// Acquires this instant, runs `f` against the positioned data, and
    /// releases.
    ///
    /// The release happens regardless of what `f` returns, so an error value
    /// produced inside `f` never leaves the capsule acquired.
    pub fn query<R>(&self, f: impl FnOnce(&mut T) -> R) -> RuntimeResult<R> {
        self.acquire()?;
        let result = {
            let mut state = self.shared.lock();
            f(&mut state.data)
        };
        self.release()?;
        Ok(result)
    }

    /// Runs `f` against the live buffer at its current position.
    ///
    /// No repositioning and no acquisition bookkeeping takes place; this is
    /// the raw shared-data view, used to observe state after processing
    /// without disturbing the history.
    pub fn with_data<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut state = self.shared.lock();
        f(&mut state.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Capsule over a plain integer where each instant pins a known value.
    fn pinned(parent: &TimeCapsule<i64>, value: i64, previous: i64) -> TimeCapsule<i64> {
        parent.modify(move |d| *d = value, move |d| *d = previous)
    }

    #[test]
    fn test_root_adopts_initial_state() {
        let root = TimeCapsule::new(10i64);
        assert_eq!(root.generation(), 0);
        assert_eq!(root.with_data(|d| *d), 10);
    }

    #[test]
    fn test_modify_does_not_touch_state() {
        let root = TimeCapsule::new(10i64);
        let child = pinned(&root, 20, 10);
        assert_eq!(child.generation(), 1);
        assert_eq!(root.with_data(|d| *d), 10);
    }

    #[test]
    fn test_acquire_round_trip() {
        let root = TimeCapsule::new(10i64);
        let a = pinned(&root, 20, 10);
        let b = pinned(&a, 30, 20);

        assert_eq!(b.query(|d| *d).unwrap(), 30);
        assert_eq!(root.query(|d| *d).unwrap(), 10);
        // Reacquiring an instant yields the same data as the first time.
        assert_eq!(b.query(|d| *d).unwrap(), 30);
    }

    #[test]
    fn test_branching_walks_through_common_ancestor() {
        let root = TimeCapsule::new(0i64);
        let left = pinned(&root, 1, 0);
        let left_deep = pinned(&left, 2, 1);
        let right = pinned(&root, -1, 0);

        assert_eq!(left_deep.query(|d| *d).unwrap(), 2);
        // Moving to the sibling branch undoes both left changes first.
        assert_eq!(right.query(|d| *d).unwrap(), -1);
        assert_eq!(left_deep.query(|d| *d).unwrap(), 2);
    }

    #[test]
    fn test_acquire_counts_reference_style() {
        let root = TimeCapsule::new(5i64);
        let a = pinned(&root, 6, 5);

        a.acquire().unwrap();
        a.acquire().unwrap();
        // Another instant cannot take the state while it is held.
        assert!(matches!(
            root.acquire(),
            Err(RuntimeError::TimeCapsuleAlreadyAcquired)
        ));
        a.release().unwrap();
        assert!(matches!(
            root.acquire(),
            Err(RuntimeError::TimeCapsuleAlreadyAcquired)
        ));
        a.release().unwrap();
        root.acquire().unwrap();
        root.release().unwrap();
    }

    #[test]
    fn test_release_errors() {
        let root = TimeCapsule::new(5i64);
        let a = pinned(&root, 6, 5);

        assert!(matches!(
            a.release(),
            Err(RuntimeError::TimeCapsuleNotAcquired)
        ));

        a.acquire().unwrap();
        assert!(matches!(
            root.release(),
            Err(RuntimeError::TimeCapsuleAcquiredElsewhere)
        ));
        a.release().unwrap();
    }

    #[test]
    fn test_query_releases_on_inner_error() {
        let root = TimeCapsule::new(5i64);
        let a = pinned(&root, 6, 5);

        let result: RuntimeResult<Result<(), String>> = a.query(|_| Err("inner".to_string()));
        assert!(result.unwrap().is_err());

        // The capsule is free again.
        root.acquire().unwrap();
        root.release().unwrap();
    }

    #[test]
    fn test_thunks_replay_in_path_order() {
        // Each instant appends its tag on redo and removes it on undo, so
        // the buffer content mirrors the exact undo/redo ordering.
        let root = TimeCapsule::new(Vec::<&str>::new());
        let a = root.modify(|d| d.push("a"), |d| { d.pop(); });
        let b = a.modify(|d| d.push("b"), |d| { d.pop(); });
        let c = a.modify(|d| d.push("c"), |d| { d.pop(); });

        assert_eq!(b.query(|d| d.clone()).unwrap(), vec!["a", "b"]);
        // b -> c shares the ancestor a: only "b" is undone.
        assert_eq!(c.query(|d| d.clone()).unwrap(), vec!["a", "c"]);
        assert_eq!(root.query(|d| d.clone()).unwrap(), Vec::<&str>::new());
    }

    #[test]
    fn test_same_instant() {
        let root = TimeCapsule::new(0i64);
        let a = pinned(&root, 1, 0);
        let a_alias = a.clone();
        assert!(a.same_instant(&a_alias));
        assert!(!a.same_instant(&root));
    }
}
