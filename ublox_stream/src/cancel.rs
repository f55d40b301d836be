use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Lets another thread stop a blocking receive early.
///
/// Clones share state; the receive loop polls [`CancellationToken::is_cancelled`]
/// once per iteration.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
