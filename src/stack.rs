//! A bounded stack that can also be appended to from the bottom.
//!
//! The interpreter keeps its data in one of these and its pending program in another. The
//! program stack is normally consumed from the top, but the segwit expansion rules append
//! commands to the bottom so they run after everything that is already pending.

use std::collections::VecDeque;
use std::fmt::Debug;

use thiserror::Error;
use tracing::trace;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("stack is full ({capacity} elements)")]
    Full { capacity: usize },

    #[error("stack is empty")]
    Empty,

    #[error("tried to retrieve element {index} from a stack with {len} elements")]
    NotFound { index: usize, len: usize },
}

/// Elements are stored top-first: index 0 of the inner deque is the top of the stack.
///
/// Positions in the API are 1-indexed from the top, so `peek_nth(1)` is the same as `peek()`.
#[derive(Clone, PartialEq, Eq)]
pub struct Stack<T> {
    elements: VecDeque<T>,
    capacity: usize,
    debug: bool,
}

impl<T: Clone + PartialEq + Debug> Stack<T> {
    pub fn new(capacity: usize) -> Self {
        Stack {
            elements: VecDeque::new(),
            capacity,
            debug: false,
        }
    }

    /// Trace every access, followed by the full contents. Purely observational.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    fn trace(&self, action: &str) {
        if self.debug {
            trace!(action, len = self.elements.len(), "stack access");
            for (i, elem) in self.elements.iter().enumerate() {
                trace!("  {}: {:?}", i + 1, elem);
            }
        }
    }

    fn check_room(&self) -> Result<(), Error> {
        if self.elements.len() >= self.capacity {
            Err(Error::Full {
                capacity: self.capacity,
            })
        } else {
            Ok(())
        }
    }

    /// Converts a 1-indexed position from the top into an index into `elements`.
    fn index(&self, n: usize) -> Result<usize, Error> {
        if n == 0 || n > self.elements.len() {
            Err(Error::NotFound {
                index: n,
                len: self.elements.len(),
            })
        } else {
            Ok(n - 1)
        }
    }

    pub fn push(&mut self, element: T) -> Result<(), Error> {
        self.check_room()?;
        self.elements.push_front(element);
        self.trace("push");
        Ok(())
    }

    /// Inserts at the bottom, so the element is popped after everything currently on the stack.
    pub fn put_last(&mut self, element: T) -> Result<(), Error> {
        self.check_room()?;
        self.elements.push_back(element);
        self.trace("put_last");
        Ok(())
    }

    pub fn pop(&mut self) -> Result<T, Error> {
        let elem = self.elements.pop_front().ok_or(Error::Empty)?;
        self.trace("pop");
        Ok(elem)
    }

    pub fn peek(&self) -> Result<&T, Error> {
        self.trace("peek");
        self.elements.front().ok_or(Error::Empty)
    }

    pub fn peek_nth(&self, n: usize) -> Result<&T, Error> {
        self.trace("peek_nth");
        self.index(n).map(|i| &self.elements[i])
    }

    pub fn peek_nth_mut(&mut self, n: usize) -> Result<&mut T, Error> {
        let i = self.index(n)?;
        Ok(&mut self.elements[i])
    }

    /// The 1-indexed distance from the top of the first element equal to `element`.
    pub fn search(&self, element: &T) -> Option<usize> {
        self.elements
            .iter()
            .position(|e| e == element)
            .map(|i| i + 1)
    }

    /// Removes the topmost element equal to `element`, returning whether one was found.
    pub fn remove(&mut self, element: &T) -> bool {
        match self.search(element) {
            Some(n) => {
                self.elements.remove(n - 1);
                self.trace("remove");
                true
            }
            None => false,
        }
    }

    /// Removes and returns the element at position `n` from the top.
    pub fn remove_nth(&mut self, n: usize) -> Result<T, Error> {
        let i = self.index(n)?;
        let elem = self
            .elements
            .remove(i)
            .unwrap_or_else(|| unreachable!("index was bounds-checked"));
        self.trace("remove_nth");
        Ok(elem)
    }

    /// Inserts `element` so that it ends up at position `n` from the top. `n` may be one past
    /// the current bottom.
    pub fn insert_nth(&mut self, n: usize, element: T) -> Result<(), Error> {
        self.check_room()?;
        if n == 0 || n > self.elements.len() + 1 {
            return Err(Error::NotFound {
                index: n,
                len: self.elements.len(),
            });
        }
        self.elements.insert(n - 1, element);
        self.trace("insert_nth");
        Ok(())
    }

    /// Swaps the elements at positions `a` and `b` from the top.
    pub fn swap(&mut self, a: usize, b: usize) -> Result<(), Error> {
        let ia = self.index(a)?;
        let ib = self.index(b)?;
        self.elements.swap(ia, ib);
        self.trace("swap");
        Ok(())
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.trace("clear");
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterates from the top of the stack to the bottom.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.iter()
    }

    /// Copies the elements out, top first.
    pub fn to_vec(&self) -> Vec<T> {
        self.elements.iter().cloned().collect()
    }
}

impl<T: Debug> Debug for Stack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("capacity", &self.capacity)
            .field("elements", &self.elements)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(capacity: usize, values: &[u8]) -> Stack<u8> {
        let mut stack = Stack::new(capacity);
        for v in values {
            stack.push(*v).unwrap();
        }
        stack
    }

    #[test]
    fn lifo_order() {
        let mut stack = filled(4, &[1, 2, 3]);
        assert_eq!(stack.to_vec(), vec![3, 2, 1]);
        assert_eq!(stack.pop(), Ok(3));
        assert_eq!(stack.peek(), Ok(&2));
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn put_last_runs_after_pending_elements() {
        let mut stack = filled(4, &[2, 1]);
        stack.put_last(3).unwrap();
        assert_eq!(stack.pop(), Ok(1));
        assert_eq!(stack.pop(), Ok(2));
        assert_eq!(stack.pop(), Ok(3));
    }

    #[test]
    fn capacity_is_enforced() {
        let mut stack = filled(2, &[1, 2]);
        assert_eq!(stack.push(3), Err(Error::Full { capacity: 2 }));
        assert_eq!(stack.put_last(3), Err(Error::Full { capacity: 2 }));
        assert_eq!(stack.insert_nth(1, 3), Err(Error::Full { capacity: 2 }));
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn empty_stack_errors() {
        let mut stack = Stack::<u8>::new(2);
        assert_eq!(stack.pop(), Err(Error::Empty));
        assert_eq!(stack.peek(), Err(Error::Empty));
    }

    #[test]
    fn peek_nth_is_one_indexed() {
        let stack = filled(4, &[1, 2, 3]);
        assert_eq!(stack.peek_nth(1), Ok(&3));
        assert_eq!(stack.peek_nth(3), Ok(&1));
        assert_eq!(stack.peek_nth(4), Err(Error::NotFound { index: 4, len: 3 }));
        assert_eq!(stack.peek_nth(0), Err(Error::NotFound { index: 0, len: 3 }));
    }

    #[test]
    fn search_and_remove() {
        let mut stack = filled(8, &[7, 8, 9, 8]);
        assert_eq!(stack.search(&8), Some(1));
        assert_eq!(stack.search(&7), Some(4));
        assert_eq!(stack.search(&5), None);
        assert!(stack.remove(&8));
        assert_eq!(stack.to_vec(), vec![9, 8, 7]);
        assert!(!stack.remove(&5));
        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.capacity(), 8);
    }

    #[test]
    fn positional_edits() {
        let mut stack = filled(8, &[1, 2, 3, 4]);
        stack.swap(1, 4).unwrap();
        assert_eq!(stack.to_vec(), vec![1, 3, 2, 4]);
        assert_eq!(stack.remove_nth(2), Ok(3));
        stack.insert_nth(3, 9).unwrap();
        assert_eq!(stack.to_vec(), vec![1, 2, 9, 4]);
        stack.insert_nth(5, 0).unwrap();
        assert_eq!(stack.to_vec(), vec![1, 2, 9, 4, 0]);
    }

    #[test]
    fn debug_mode_has_no_effect_on_results() {
        let mut stack = Stack::new(3).with_debug(true);
        stack.push(vec![1u8]).unwrap();
        stack.push(vec![]).unwrap();
        assert_eq!(stack.peek_nth(2), Ok(&vec![1u8]));
        assert_eq!(stack.pop(), Ok(vec![]));
    }
}
