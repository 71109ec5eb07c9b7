/// Linear undo/redo over full snapshots. Bounded: pushing past `max_depth`
/// drops the oldest entries. Entirely in-memory; never talks to the store.
#[derive(Clone, Debug)]
pub struct History<T: Clone> {
    stack: Vec<T>,
    cursor: usize,
    max_depth: usize,
}

pub const DEFAULT_MAX_DEPTH: usize = 50;

impl<T: Clone> History<T> {
    pub fn new(initial: T) -> Self {
        Self::with_max_depth(initial, DEFAULT_MAX_DEPTH)
    }

    pub fn with_max_depth(initial: T, max_depth: usize) -> Self {
        Self {
            stack: vec![initial],
            cursor: 0,
            max_depth: max_depth.max(1),
        }
    }

    /// Discards any redo branch, appends, and enforces the depth bound.
    pub fn push(&mut self, snapshot: T) {
        self.stack.truncate(self.cursor + 1);
        self.stack.push(snapshot);
        self.cursor = self.stack.len() - 1;
        if self.stack.len() > self.max_depth {
            let overflow = self.stack.len() - self.max_depth;
            self.stack.drain(0..overflow);
            self.cursor -= overflow;
        }
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.stack.len()
    }

    /// Steps back one entry. At the oldest entry this is a no-op and the
    /// current snapshot is returned unchanged.
    pub fn undo(&mut self) -> &T {
        if self.cursor > 0 {
            self.cursor -= 1;
        }
        &self.stack[self.cursor]
    }

    pub fn redo(&mut self) -> &T {
        if self.cursor + 1 < self.stack.len() {
            self.cursor += 1;
        }
        &self.stack[self.cursor]
    }

    pub fn current(&self) -> &T {
        &self.stack[self.cursor]
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Rewrites every snapshot in place, then collapses the adjacent
    /// duplicates the rewrite produced. The cursor keeps pointing at the
    /// same logical state.
    pub fn edit_all<F>(&mut self, mut f: F)
    where
        T: PartialEq,
        F: FnMut(&mut T),
    {
        for snapshot in &mut self.stack {
            f(snapshot);
        }
        let mut i = 1;
        while i < self.stack.len() {
            if self.stack[i] == self.stack[i - 1] {
                self.stack.remove(i);
                if self.cursor >= i {
                    self.cursor -= 1;
                }
            } else {
                i += 1;
            }
        }
    }

    pub fn reset_with(&mut self, initial: T) {
        self.stack.clear();
        self.stack.push(initial);
        self.cursor = 0;
    }
}
