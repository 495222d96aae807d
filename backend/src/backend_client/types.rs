//! Query parameter types for the backend client's model/plan endpoints.
//!
//! Responses are returned verbatim as [`serde_json::Value`] (§6: "the
//! client returns them verbatim"); only request-side query parameters are
//! given typed shapes here, so callers can't accidentally pass an
//! out-of-range `limit` or `depth`.

const DEFAULT_LIMIT: u32 = 50;
const MAX_LIMIT: u32 = 1000;
const MIN_LIMIT: u32 = 1;
const MAX_DEPTH: u8 = 5;
const MIN_DEPTH: u8 = 1;

/// A result-set limit, clamped to `[1, 1000]` with a default of 50.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit(u32);

impl Limit {
    /// Construct a limit, clamping it into the valid range.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Self(value.clamp(MIN_LIMIT, MAX_LIMIT))
    }

    /// The clamped value.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Limit {
    fn default() -> Self {
        Self(DEFAULT_LIMIT)
    }
}

/// A predecessor/successor traversal depth, clamped to `[1, 5]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Depth(u8);

impl Depth {
    /// Construct a depth, clamping it into the valid range.
    #[must_use]
    pub fn new(value: u8) -> Self {
        Self(value.clamp(MIN_DEPTH, MAX_DEPTH))
    }

    /// The clamped value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

/// Query parameters shared by the `model/jobdefinition`, `model/jobstream`
/// and `model/workstation` list endpoints.
#[derive(Debug, Clone, Default)]
pub struct ModelQuery {
    /// Free-text query filter, if any.
    pub query: Option<String>,
    /// Folder scope, if any.
    pub folder: Option<String>,
    /// Result-set limit.
    pub limit: Limit,
}

impl ModelQuery {
    /// Render as `(key, value)` pairs suitable for a query string, omitting
    /// unset optional fields.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(3);
        if let Some(query) = &self.query {
            pairs.push(("query", query.clone()));
        }
        if let Some(folder) = &self.folder {
            pairs.push(("folder", folder.clone()));
        }
        pairs.push(("limit", self.limit.value().to_string()));
        pairs
    }
}

/// Query parameters for `plan/job`.
#[derive(Debug, Clone, Default)]
pub struct PlanJobQuery {
    /// Free-text query filter, if any.
    pub query: Option<String>,
    /// Folder scope, if any.
    pub folder: Option<String>,
    /// Status filter, if any.
    pub status: Option<String>,
    /// Result-set limit.
    pub limit: Limit,
}

impl PlanJobQuery {
    /// Render as `(key, value)` pairs suitable for a query string, omitting
    /// unset optional fields.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(4);
        if let Some(query) = &self.query {
            pairs.push(("q", query.clone()));
        }
        if let Some(folder) = &self.folder {
            pairs.push(("folder", folder.clone()));
        }
        if let Some(status) = &self.status {
            pairs.push(("status", status.clone()));
        }
        pairs.push(("limit", self.limit.value().to_string()));
        pairs
    }
}

/// Query parameters for `plan/consumed-jobs/runs`.
#[derive(Debug, Clone)]
pub struct ConsumedJobRunsQuery {
    /// Job name to look up recent runs for.
    pub job_name: String,
    /// Result-set limit.
    pub limit: Limit,
}

impl ConsumedJobRunsQuery {
    /// Render as `(key, value)` pairs suitable for a query string.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("jobName", self.job_name.clone()),
            ("limit", self.limit.value().to_string()),
        ]
    }
}
