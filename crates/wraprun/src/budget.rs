//! # Call budget
//!
//! One budget token is created per top-level call and handed down the call tree
//! with every sub-invocation. Depth grows along a branch; the invocation count is
//! shared by the whole tree. Together with the per-resolution redirect bound they
//! guarantee that any configuration, however adversarial, terminates.

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use wrapcore::InvokeError;
use wrapcore::Limits;
use wrapcore::Uri;

#[derive(Clone, Debug)]
pub struct CallBudget {
    limits: Arc<Limits>,
    depth: usize,
    invocations: Arc<AtomicUsize>,
    /// Resolver delegates currently resolving on this branch.
    resolving_with: Arc<Vec<Uri>>,
}

impl CallBudget {
    /// A fresh budget for a new call tree.
    pub fn root(limits: Arc<Limits>) -> Self {
        Self {
            limits,
            depth: 0,
            invocations: Arc::new(AtomicUsize::new(0)),
            resolving_with: Arc::new(Vec::new()),
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Invocations started so far anywhere in the call tree.
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Charges one invocation of `uri` one level below this one.
    pub fn enter(&self, uri: &Uri) -> Result<Self, InvokeError> {
        let depth = self.depth + 1;
        if depth > self.limits.max_depth {
            return Err(InvokeError::RecursionLimitExceeded {
                uri: uri.clone(),
                limit: self.limits.max_depth,
            });
        }

        let started = self.invocations.fetch_add(1, Ordering::Relaxed) + 1;
        if started > self.limits.max_invocations {
            return Err(InvokeError::InvocationLimitExceeded {
                uri: uri.clone(),
                limit: self.limits.max_invocations,
            });
        }

        Ok(Self { depth, ..self.clone() })
    }

    /// Marks `delegate` as busy resolving for everything below this point.
    pub fn resolving_with(&self, delegate: &Uri) -> Self {
        let mut stack = (*self.resolving_with).clone();
        stack.push(delegate.clone());
        Self {
            resolving_with: Arc::new(stack),
            ..self.clone()
        }
    }

    pub fn is_resolving_with(&self, delegate: &Uri) -> bool {
        self.resolving_with.contains(delegate)
    }
}
