// ── Dashboard data state ──

use chrono::{DateTime, Utc};
use serde::Serialize;

use pulsemon_api::{RequestRecord, StatsSnapshot};

use crate::error::CoreError;

/// Everything the dashboard view renders from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DashboardState {
    pub is_loading: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub error: Option<ErrorInfo>,
    pub stats: Option<StatsSnapshot>,
    pub requests: Vec<RequestRecord>,
    pub auto_refresh_enabled: bool,
}

/// The most recent load failure, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub message: String,
    pub cause: Option<String>,
    pub status: Option<u16>,
    pub timestamp: DateTime<Utc>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>, cause: Option<String>, status: Option<u16>) -> Self {
        Self {
            message: message.into(),
            cause,
            status,
            timestamp: Utc::now(),
        }
    }
}

impl From<&CoreError> for ErrorInfo {
    fn from(err: &CoreError) -> Self {
        Self::new(err.to_string(), err.cause(), err.status())
    }
}

/// Fields to overwrite on [`DashboardState`]. `None` leaves a field alone.
///
/// `error: Some(None)` clears the error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_loading: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Option<ErrorInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<Vec<RequestRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_refresh_enabled: Option<bool>,
}

impl StatePatch {
    pub fn loading(is_loading: bool) -> Self {
        Self {
            is_loading: Some(is_loading),
            ..Self::default()
        }
    }

    pub fn auto_refresh(enabled: bool) -> Self {
        Self {
            auto_refresh_enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub(crate) fn apply_to(&self, state: &mut DashboardState) {
        if let Some(v) = self.is_loading {
            state.is_loading = v;
        }
        if let Some(v) = self.last_update {
            state.last_update = Some(v);
        }
        if let Some(v) = &self.error {
            state.error.clone_from(v);
        }
        if let Some(v) = &self.stats {
            state.stats = Some(v.clone());
        }
        if let Some(v) = &self.requests {
            state.requests.clone_from(v);
        }
        if let Some(v) = self.auto_refresh_enabled {
            state.auto_refresh_enabled = v;
        }
    }
}

/// Payload of `state:updated`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub previous: DashboardState,
    pub current: DashboardState,
    pub delta: StatePatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_touches_only_named_fields() {
        let mut state = DashboardState {
            requests: vec![],
            error: Some(ErrorInfo::new("old", None, Some(500))),
            ..Default::default()
        };
        StatePatch::loading(true).apply_to(&mut state);
        assert!(state.is_loading);
        assert!(state.error.is_some());

        StatePatch {
            error: Some(None),
            ..Default::default()
        }
        .apply_to(&mut state);
        assert!(state.error.is_none());
        assert!(state.is_loading);
    }

    #[test]
    fn error_info_from_core_error() {
        let err = CoreError::Http {
            status: 500,
            status_text: "Internal Server Error".into(),
        };
        let info = ErrorInfo::from(&err);
        assert_eq!(info.status, Some(500));
        assert_eq!(info.cause.as_deref(), Some("500 Internal Server Error"));
        assert_eq!(info.message, "Request failed with HTTP 500 Internal Server Error");
    }

    #[test]
    fn delta_serializes_only_set_fields() {
        insta::assert_json_snapshot!(StatePatch::auto_refresh(true), @r#"
        {
          "auto_refresh_enabled": true
        }
        "#);
    }
}
