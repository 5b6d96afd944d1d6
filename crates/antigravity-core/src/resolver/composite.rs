//! Composite refresh-token encoding: `<refresh-token>|<project-id>|<managed-project-id>`.
//!
//! Trailing segments are optional; `format(parse(x)) == x` for every
//! well-formed input, including ones with omitted trailing segments.

/// A parsed composite refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompositeRefresh {
    pub refresh_token: String,
    pub project_id: Option<String>,
    pub managed_project_id: Option<String>,
}

impl CompositeRefresh {
    /// Split `raw` on `|`. Missing trailing segments become `None`.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(3, '|');
        let refresh_token = parts.next().unwrap_or_default().to_string();
        let project_id = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        let managed_project_id = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        Self { refresh_token, project_id, managed_project_id }
    }

    /// Rebuild the `|`-separated string, omitting trailing separators for
    /// absent segments so round-tripping a bare refresh token stays bare.
    pub fn format(&self) -> String {
        match (&self.project_id, &self.managed_project_id) {
            (None, None) => self.refresh_token.clone(),
            (Some(project_id), None) => format!("{}|{}", self.refresh_token, project_id),
            (None, Some(managed)) => format!("{}|{}|{}", self.refresh_token, "", managed),
            (Some(project_id), Some(managed)) => {
                format!("{}|{}|{}", self.refresh_token, project_id, managed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_bare_refresh_token() {
        let raw = "rt-abc123";
        assert_eq!(CompositeRefresh::parse(raw).format(), raw);
    }

    #[test]
    fn round_trips_with_project_id_only() {
        let raw = "rt-abc123|proj-1";
        assert_eq!(CompositeRefresh::parse(raw).format(), raw);
    }

    #[test]
    fn round_trips_with_all_segments() {
        let raw = "rt-abc123|proj-1|managed-proj-9";
        let parsed = CompositeRefresh::parse(raw);
        assert_eq!(parsed.project_id.as_deref(), Some("proj-1"));
        assert_eq!(parsed.managed_project_id.as_deref(), Some("managed-proj-9"));
        assert_eq!(parsed.format(), raw);
    }

    #[test]
    fn empty_trailing_segment_parses_as_none() {
        let parsed = CompositeRefresh::parse("rt-abc123||managed-proj-9");
        assert_eq!(parsed.project_id, None);
        assert_eq!(parsed.managed_project_id.as_deref(), Some("managed-proj-9"));
    }
}
