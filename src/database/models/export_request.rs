use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Error)]
#[error("Unknown export request status: {0}")]
pub struct ParseStatusError(String);

impl ExportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Approved => "approved",
            ExportStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ExportStatus::Pending)
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ExportStatus::Pending),
            "approved" => Ok(ExportStatus::Approved),
            "rejected" => Ok(ExportStatus::Rejected),
            _ => Err(ParseStatusError(s.to_string())),
        }
    }
}

impl TryFrom<String> for ExportStatus {
    type Error = ParseStatusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ExportRequestRecord {
    pub id: i64,
    pub requester_id: i64,
    pub requester_name: String,
    pub requester_phone: String,
    pub data_type: String,
    pub record_count: i64,
    pub reason: String,
    #[sqlx(try_from = "String")]
    pub status: ExportStatus,
    pub created_at: DateTime<Utc>,
    pub approved_by: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl ExportRequestRecord {
    /// Move a pending request to `status`. Terminal requests never change again.
    pub fn transition(
        &mut self,
        status: ExportStatus,
        approved_by: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), ExportStatus> {
        if self.status.is_terminal() || status == ExportStatus::Pending {
            return Err(self.status);
        }

        self.status = status;
        if status == ExportStatus::Approved {
            self.approved_by = approved_by;
            self.approved_at = Some(now);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NewExportRequest {
    pub requester_id: i64,
    pub requester_name: String,
    pub requester_phone: String,
    pub data_type: String,
    pub record_count: i64,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> ExportRequestRecord {
        ExportRequestRecord {
            id: 1,
            requester_id: 3,
            requester_name: "Grace".to_string(),
            requester_phone: "+256772207616".to_string(),
            data_type: "attendance".to_string(),
            record_count: 120,
            reason: "Quarterly report".to_string(),
            status: ExportStatus::Pending,
            created_at: Utc::now(),
            approved_by: None,
            approved_at: None,
        }
    }

    #[test]
    fn approval_records_approver() {
        let mut request = pending();
        request.transition(ExportStatus::Approved, Some(1), Utc::now()).unwrap();
        assert_eq!(request.status, ExportStatus::Approved);
        assert_eq!(request.approved_by, Some(1));
        assert!(request.approved_at.is_some());
    }

    #[test]
    fn rejection_leaves_approval_fields_empty() {
        let mut request = pending();
        request.transition(ExportStatus::Rejected, Some(1), Utc::now()).unwrap();
        assert_eq!(request.status, ExportStatus::Rejected);
        assert_eq!(request.approved_by, None);
        assert_eq!(request.approved_at, None);
    }

    #[test]
    fn terminal_requests_do_not_move() {
        let mut request = pending();
        request.transition(ExportStatus::Rejected, Some(1), Utc::now()).unwrap();
        assert_eq!(
            request.transition(ExportStatus::Approved, Some(1), Utc::now()),
            Err(ExportStatus::Rejected)
        );
        assert_eq!(request.status, ExportStatus::Rejected);
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("APPROVED".parse::<ExportStatus>().unwrap(), ExportStatus::Approved);
        assert!("archived".parse::<ExportStatus>().is_err());
    }
}
