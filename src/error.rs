use thiserror::Error;

/// Error kinds for one polling cycle. The runner decides per-kind whether a
/// failure is fatal, skips the sub-site, or is merely logged.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Network retrieval exhausted its retries.
    #[error("fetch failed for {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    /// An expected markup landmark is entirely absent. On the first page of a
    /// sub-site this degrades to "no listings"; on continuation pages it ends
    /// pagination.
    #[error("expected markup landmark missing on {url}: {detail}")]
    StructuralMismatch { url: String, detail: String },

    /// A recognized listing block contained an unparseable field, or a
    /// parallel page fetch failed partway. Aborts the sub-site's cycle; the
    /// previous baseline is preserved unchanged.
    #[error("corrupt listing data in {context}: {detail}")]
    DataCorruption { context: String, detail: String },

    /// Detail-page fetch/parse failure during name resolution. Logged only;
    /// the listing keeps its truncated name.
    #[error("could not resolve full name for '{name}': {detail}")]
    EnrichmentFailure { name: String, detail: String },
}

impl WatchError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, WatchError::DataCorruption { .. })
    }
}
