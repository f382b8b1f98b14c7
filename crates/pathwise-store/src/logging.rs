//! Per-repo logger handle.
//!
//! Every repo carries a [`RepoLogger`]. Each operation runs inside a
//! `repo` span tagged with the repo and operation names, logs its redacted
//! parameters at `debug`, and logs failures at `warn` with the error kind.
//! Identifiers are never logged in full.

use std::fmt;

use tracing::{debug, debug_span, warn};

use crate::errors::Result;
use crate::ids::{Id, redact_id};

/// Structured logger carried by a repo.
#[derive(Clone, Debug)]
pub struct RepoLogger {
    repo: &'static str,
}

impl RepoLogger {
    /// Logger for the repo named `repo`.
    pub fn new(repo: &'static str) -> Self {
        Self { repo }
    }

    /// Repo name attached to every event.
    pub fn repo(&self) -> &'static str {
        self.repo
    }

    /// Run `f` as operation `op`, logging `params` and any failure.
    pub(crate) fn call<T>(
        &self,
        op: &'static str,
        params: fmt::Arguments<'_>,
        f: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let span = debug_span!("repo", repo = self.repo, op);
        let _entered = span.enter();
        debug!(params = %params, "repo call");
        let result = f();
        if let Err(err) = &result {
            warn!(kind = ?err.kind(), error = %err, "repo call failed");
        }
        result
    }
}

/// Display adapter that logs the size of an id set and the first prefix.
pub(crate) struct IdSet<'a>(pub(crate) &'a [Id]);

impl fmt::Display for IdSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.first() {
            Some(first) => write!(f, "n={} first={}", self.0.len(), redact_id(first)),
            None => f.write_str("n=0"),
        }
    }
}

/// Display adapter for one optional identifier.
pub(crate) struct OneId<'a>(pub(crate) &'a Id);

impl fmt::Display for OneId<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_nil() {
            f.write_str("nil")
        } else {
            f.write_str(&redact_id(self.0))
        }
    }
}
