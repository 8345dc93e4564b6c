//! Fixed-depth expression stack for relocation expressions.

use heapless::Vec;

use crate::error::StackError;

/// Maximum expression depth.
pub const STACK_DEPTH: usize = 10;

/// Value stack shared by the relocations of one section.
#[derive(Debug, Default, Clone)]
pub struct ValueStack {
    values: Vec<i32, STACK_DEPTH>,
}

impl ValueStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: i32) -> Result<(), StackError> {
        self.values
            .push(value)
            .map_err(|_| StackError::Overflow(STACK_DEPTH))
    }

    /// Fail early when a push would not fit.
    pub fn ensure_room(&self) -> Result<(), StackError> {
        if self.values.is_full() {
            Err(StackError::Overflow(STACK_DEPTH))
        } else {
            Ok(())
        }
    }

    pub fn pop(&mut self) -> Result<i32, StackError> {
        self.values.pop().ok_or(StackError::Underflow)
    }

    pub fn top(&self) -> Result<i32, StackError> {
        self.values.last().copied().ok_or(StackError::Underflow)
    }

    /// Overwrite the top of the stack.
    pub fn replace_top(&mut self, value: i32) -> Result<(), StackError> {
        let top = self.values.last_mut().ok_or(StackError::Underflow)?;
        *top = value;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
