//! Sliding token window fed to each forward pass.

use std::collections::VecDeque;

use tracing::debug;

/// Ordered ids capped at `max_seq`; the oldest ids are dropped first.
#[derive(Debug, Clone)]
pub struct Context {
    ids: VecDeque<usize>,
    max_seq: usize,
}

impl Context {
    pub fn new(prompt_ids: &[usize], max_seq: usize) -> Self {
        Self {
            ids: prompt_ids.iter().copied().collect(),
            max_seq,
        }
    }

    pub fn push(&mut self, id: usize) {
        self.ids.push_back(id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Drop oldest ids until at most `max_seq` remain.
    pub fn trim(&mut self) {
        let excess = self.ids.len().saturating_sub(self.max_seq);
        if excess > 0 {
            debug!("Context window full, dropping {} oldest ids", excess);
            self.ids.drain(..excess);
        }
    }

    /// Trim, then return the window as a contiguous slice.
    pub fn window(&mut self) -> &[usize] {
        self.trim();
        self.ids.make_contiguous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_keeps_the_newest_ids() {
        let mut ctx = Context::new(&[1, 2, 3], 4);
        ctx.push(4);
        ctx.push(5);
        ctx.push(6);
        assert_eq!(ctx.window(), &[3, 4, 5, 6]);
        assert_eq!(ctx.len(), 4);
    }

    #[test]
    fn short_context_is_untouched() {
        let mut ctx = Context::new(&[7, 8], 4);
        assert_eq!(ctx.window(), &[7, 8]);
    }
}
