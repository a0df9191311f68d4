use crate::error::SyncError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Description length bounds enforced at creation time
pub const DESCRIPTION_MIN_LEN: usize = 10;
pub const DESCRIPTION_MAX_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl FromStr for RiskLevel {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(SyncError::Validation(format!(
                "unknown risk level '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Pending,
    InProgress,
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Pending => "pending",
            IncidentStatus::InProgress => "in_progress",
            IncidentStatus::Resolved => "resolved",
        }
    }

    /// Pending and in-progress incidents count as active
    pub fn is_active(&self) -> bool {
        matches!(self, IncidentStatus::Pending | IncidentStatus::InProgress)
    }
}

impl FromStr for IncidentStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IncidentStatus::Pending),
            "in_progress" => Ok(IncidentStatus::InProgress),
            "resolved" => Ok(IncidentStatus::Resolved),
            other => Err(SyncError::Validation(format!("unknown status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistanceType {
    Police,
    Firefighter,
    Medical,
    Helicopter,
    Rescue,
}

impl AssistanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistanceType::Police => "police",
            AssistanceType::Firefighter => "firefighter",
            AssistanceType::Medical => "medical",
            AssistanceType::Helicopter => "helicopter",
            AssistanceType::Rescue => "rescue",
        }
    }
}

impl FromStr for AssistanceType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "police" => Ok(AssistanceType::Police),
            "firefighter" => Ok(AssistanceType::Firefighter),
            "medical" => Ok(AssistanceType::Medical),
            "helicopter" => Ok(AssistanceType::Helicopter),
            "rescue" => Ok(AssistanceType::Rescue),
            other => Err(SyncError::Validation(format!(
                "unknown assistance type '{}'",
                other
            ))),
        }
    }
}

/// A reported wildfire incident, full row image as delivered by the remote
/// system. `id`, `created_at`, `latitude`, `longitude` and `risk_level` are
/// immutable after creation; everything else is mutated by operator actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    pub risk_level: RiskLevel,
    #[serde(default = "default_status")]
    pub status: IncidentStatus,
    #[serde(default)]
    pub assistance_type: Option<AssistanceType>,
    #[serde(default)]
    pub dispatched_resources: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_status() -> IncidentStatus {
    IncidentStatus::Pending
}

/// Creation input before the remote system assigns `id` and `created_at`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentDraft {
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    pub risk_level: RiskLevel,
}

impl IncidentDraft {
    pub fn validate(&self) -> Result<(), SyncError> {
        let len = self.description.chars().count();
        if len < DESCRIPTION_MIN_LEN {
            return Err(SyncError::Validation(format!(
                "description must be at least {} characters",
                DESCRIPTION_MIN_LEN
            )));
        }
        if len > DESCRIPTION_MAX_LEN {
            return Err(SyncError::Validation(format!(
                "description must be less than {} characters",
                DESCRIPTION_MAX_LEN
            )));
        }
        Ok(())
    }
}

/// Partial update sent to the remote system. Each field is replace-on-write;
/// `dispatched_resources` in particular replaces the full set, never merges.
#[derive(Debug, Clone, Serialize)]
pub struct IncidentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IncidentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistance_type: Option<Option<AssistanceType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatched_resources: Option<Vec<String>>,
    pub updated_at: DateTime<Utc>,
}

impl IncidentPatch {
    pub fn status(status: IncidentStatus, updated_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            assistance_type: None,
            dispatched_resources: None,
            updated_at,
        }
    }

    pub fn assistance(kind: Option<AssistanceType>, updated_at: DateTime<Utc>) -> Self {
        Self {
            status: None,
            assistance_type: Some(kind),
            dispatched_resources: None,
            updated_at,
        }
    }

    pub fn resources(resources: Vec<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            status: None,
            assistance_type: None,
            dispatched_resources: Some(resources),
            updated_at,
        }
    }
}

/// Normalized change-feed notification applied to the store.
/// Update carries a full row image, not a partial merge.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Insert(Incident),
    Update(Incident),
    Delete { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(description: &str) -> IncidentDraft {
        IncidentDraft {
            latitude: -33.45,
            longitude: -70.65,
            description: description.to_string(),
            risk_level: RiskLevel::High,
        }
    }

    #[test]
    fn test_draft_description_bounds() {
        assert!(draft("too short").validate().is_err());
        assert!(draft("long enough description").validate().is_ok());
        assert!(draft(&"x".repeat(500)).validate().is_ok());
        assert!(draft(&"x".repeat(501)).validate().is_err());
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("in_progress".parse::<IncidentStatus>().ok(), Some(IncidentStatus::InProgress));
        assert!("done".parse::<IncidentStatus>().is_err());
        assert_eq!("high".parse::<RiskLevel>().ok(), Some(RiskLevel::High));
        assert!("extreme".parse::<RiskLevel>().is_err());
        assert_eq!("helicopter".parse::<AssistanceType>().ok(), Some(AssistanceType::Helicopter));
    }

    #[test]
    fn test_incident_wire_format() {
        let json = r#"{
            "id": "abc-123",
            "latitude": -33.45,
            "longitude": -70.65,
            "description": "Large fire near forest area spotted",
            "risk_level": "high",
            "status": "in_progress",
            "assistance_type": "firefighter",
            "dispatched_resources": ["unit1"],
            "created_at": "2025-06-01T12:00:00Z",
            "updated_at": "2025-06-01T12:30:00Z"
        }"#;
        let inc: Incident = serde_json::from_str(json).unwrap();
        assert_eq!(inc.status, IncidentStatus::InProgress);
        assert_eq!(inc.assistance_type, Some(AssistanceType::Firefighter));
        assert_eq!(inc.dispatched_resources, vec!["unit1"]);
    }

    #[test]
    fn test_incident_defaults() {
        // Rows created before triage carry no status/assistance/resources
        let json = r#"{
            "id": "abc-124",
            "latitude": 1.0,
            "longitude": 2.0,
            "description": "Smoke column rising behind the ridge",
            "risk_level": "low",
            "created_at": "2025-06-01T12:00:00Z",
            "updated_at": "2025-06-01T12:00:00Z"
        }"#;
        let inc: Incident = serde_json::from_str(json).unwrap();
        assert_eq!(inc.status, IncidentStatus::Pending);
        assert_eq!(inc.assistance_type, None);
        assert!(inc.dispatched_resources.is_empty());
    }

    #[test]
    fn test_patch_skips_unset_fields() {
        let ts = Utc::now();
        let patch = IncidentPatch::status(IncidentStatus::Resolved, ts);
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value["status"], "resolved");
        assert!(value.get("assistance_type").is_none());
        assert!(value.get("dispatched_resources").is_none());

        // Clearing assistance serializes an explicit null
        let patch = IncidentPatch::assistance(None, ts);
        let value = serde_json::to_value(&patch).unwrap();
        assert!(value["assistance_type"].is_null());
    }
}
