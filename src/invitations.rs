use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationType {
    Teacher,
    Student,
}

impl InvitationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationType::Teacher => "teacher",
            InvitationType::Student => "student",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "teacher" => Some(InvitationType::Teacher),
            "student" => Some(InvitationType::Student),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: i64,
    pub email: String,
    pub invitation_type: InvitationType,
    pub school_id: i64,
    pub invited_date: DateTime<Utc>,
    pub is_used: bool,
    pub is_active: bool,
}

impl Invitation {
    /// Derived on read; `is_used` and `is_active` are flipped independently upstream.
    pub fn status(&self) -> InvitationStatus {
        if self.is_used {
            InvitationStatus::Accepted
        } else if self.is_active {
            InvitationStatus::Pending
        } else {
            InvitationStatus::Expired
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvitationStats {
    pub total: usize,
    pub pending: usize,
    pub accepted: usize,
    pub expired: usize,
    pub teachers: usize,
    pub students: usize,
}

impl InvitationStats {
    pub fn from_invitations(invitations: &[Invitation]) -> Self {
        let mut stats = InvitationStats {
            total: invitations.len(),
            ..Default::default()
        };
        for invitation in invitations {
            match invitation.status() {
                InvitationStatus::Pending => stats.pending += 1,
                InvitationStatus::Accepted => stats.accepted += 1,
                InvitationStatus::Expired => stats.expired += 1,
            }
            match invitation.invitation_type {
                InvitationType::Teacher => stats.teachers += 1,
                InvitationType::Student => stats.students += 1,
            }
        }
        stats
    }
}

pub fn filter_by_status(invitations: &[Invitation], status: InvitationStatus) -> Vec<&Invitation> {
    invitations.iter().filter(|i| i.status() == status).collect()
}
