use tokio_util::sync::{CancellationToken, DropGuard};

/// An instance's execution context paired with its cancellation capability.
///
/// Each context owns a fresh root token, so cancelling one instance never
/// reaches another. Engines receive a clone of the token via [`token`] and
/// wind down their tasks once it fires. [`cancel`] consumes the context, so
/// each owner can trigger it at most once.
///
/// Until [`disarm`] is called the context is armed: dropping it cancels the
/// token. A start that is abandoned mid-flight (its future dropped, e.g. by
/// a timeout) therefore still cancels exactly once.
///
/// [`token`]: ExecutionContext::token
/// [`cancel`]: ExecutionContext::cancel
/// [`disarm`]: ExecutionContext::disarm
pub struct ExecutionContext {
    token: CancellationToken,
    guard: Option<DropGuard>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        let token = CancellationToken::new();
        let guard = token.clone().drop_guard();
        Self {
            token,
            guard: Some(guard),
        }
    }

    /// A handle engines can await or poll for cancellation.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop cancelling on drop. Called once the owning instance is registered.
    pub(crate) fn disarm(&mut self) {
        if let Some(guard) = self.guard.take() {
            drop(guard.disarm());
        }
    }

    pub fn cancel(mut self) {
        match self.guard.take() {
            Some(guard) => drop(guard),
            None => self.token.cancel(),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("cancelled", &self.token.is_cancelled())
            .field("armed", &self.guard.is_some())
            .finish()
    }
}
