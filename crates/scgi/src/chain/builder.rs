use std::fmt;
use std::sync::Arc;

use crate::chain::{Middleware, MiddlewareProcessor, Processor};

/// Entry point for building a shared processing chain.
#[derive(Debug, Clone, Copy)]
pub struct Chain;

impl Chain {
    /// Starts a chain around `processor`, the innermost stage.
    pub fn builder<P: Processor + 'static>(processor: P) -> ChainBuilder {
        ChainBuilder { processor: Arc::new(processor), stages: 0 }
    }
}

/// Builder adding middleware stages from the inside out.
///
/// Every [`wrap`](Self::wrap) adds an outer stage, so the last middleware added runs its
/// `before` first and its `after` last.
pub struct ChainBuilder {
    processor: Arc<dyn Processor>,
    stages: usize,
}

impl ChainBuilder {
    pub fn wrap<M: Middleware + 'static>(self, middleware: M) -> Self {
        Self { processor: Arc::new(MiddlewareProcessor::new(middleware, self.processor)), stages: self.stages + 1 }
    }

    pub fn build(self) -> Arc<dyn Processor> {
        self.processor
    }
}

impl fmt::Debug for ChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainBuilder").field("stages", &self.stages).finish_non_exhaustive()
    }
}
