// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use crate::MtsError;
use crate::control::CancelToken;
use crate::diagnostics::{Diagnostic, DiagnosticSink};

const DEFAULT_CANCEL_CHECK_EVERY: usize = 64;

/// Unified execution context passed through every analysis stage.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub cancel: Option<&'a CancelToken>,
    pub sink: Option<&'a dyn DiagnosticSink>,
    pub cancel_check_every: usize,
}

impl Default for ExecutionContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("cancel", &self.cancel)
            .field("sink", &self.sink.map(|_| "dyn DiagnosticSink"))
            .field("cancel_check_every", &self.cancel_check_every)
            .finish()
    }
}

impl<'a> ExecutionContext<'a> {
    /// Creates a context with no optional hooks.
    pub fn new() -> Self {
        Self {
            cancel: None,
            sink: None,
            cancel_check_every: DEFAULT_CANCEL_CHECK_EVERY,
        }
    }

    pub fn with_cancel(mut self, cancel: &'a CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_sink(mut self, sink: &'a dyn DiagnosticSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_cancel_check_every(mut self, every: usize) -> Self {
        self.cancel_check_every = every;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelToken::is_cancelled)
    }

    pub fn check_cancelled(&self) -> Result<(), MtsError> {
        if self.is_cancelled() {
            return Err(MtsError::cancelled());
        }
        Ok(())
    }

    /// Checks cancellation every `cancel_check_every` iterations (zero means always).
    pub fn check_cancelled_every(&self, iteration: usize) -> Result<(), MtsError> {
        let every = self.cancel_check_every.max(1);
        if !iteration.is_multiple_of(every) {
            return Ok(());
        }
        self.check_cancelled()
    }

    /// Forwards a record to the sink, if configured, and to `tracing`.
    pub fn emit(&self, diagnostic: &Diagnostic) {
        diagnostic.trace();
        if let Some(sink) = self.sink {
            sink.record(diagnostic);
        }
    }

    pub fn emit_all(&self, diagnostics: &[Diagnostic]) {
        for diagnostic in diagnostics {
            self.emit(diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ExecutionContext;
    use crate::control::CancelToken;
    use crate::diagnostics::{Diagnostic, DiagnosticLog};

    #[test]
    fn new_context_has_no_hooks() {
        let ctx = ExecutionContext::new();
        assert!(ctx.cancel.is_none());
        assert!(ctx.sink.is_none());
        assert!(!ctx.is_cancelled());
        assert!(ctx.check_cancelled().is_ok());
    }

    #[test]
    fn check_cancelled_returns_cancelled_error_when_requested() {
        let cancel = CancelToken::new();
        let ctx = ExecutionContext::new().with_cancel(&cancel);
        assert!(ctx.check_cancelled().is_ok());
        cancel.cancel();
        let err = ctx
            .check_cancelled()
            .expect_err("cancelled token should return an error");
        assert_eq!(err.to_string(), "cancelled");
    }

    #[test]
    fn check_cancelled_every_only_polls_on_multiples() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = ExecutionContext::new()
            .with_cancel(&cancel)
            .with_cancel_check_every(4);
        assert!(ctx.check_cancelled_every(1).is_ok());
        assert!(ctx.check_cancelled_every(3).is_ok());
        assert!(ctx.check_cancelled_every(4).is_err());

        let always = ctx.with_cancel_check_every(0);
        assert!(always.check_cancelled_every(3).is_err());
    }

    #[test]
    fn emit_forwards_to_sink() {
        let log = DiagnosticLog::new();
        let ctx = ExecutionContext::new().with_sink(&log);
        ctx.emit_all(&[
            Diagnostic::info(Some(0), "a"),
            Diagnostic::warning(Some(1), "b"),
        ]);
        assert_eq!(log.len(), 2);
    }
}
