use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Patient,
    Doctor,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Doctor => "doctor",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "patient" => Some(Self::Patient),
            "doctor" => Some(Self::Doctor),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::Confirmed,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub role: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub specialization: Option<String>,
    pub bio: Option<String>,
    pub photo: Option<String>,
    pub created_at: String,
}

/// One clinician as shown in the directory; optional columns are
/// flattened to empty strings and the photo is always filled in.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Doctor {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub specialization: String,
    pub bio: String,
    pub photo: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PatientAppointmentRow {
    pub id: i64,
    pub doctor_id: i64,
    pub appt_date: String,
    pub appt_time: String,
    pub concern: String,
    pub status: String,
    pub diagnosis: Option<String>,
    pub doctor_comment: Option<String>,
    pub created_at: String,
    pub doctor_name: String,
    pub specialization: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DoctorAppointmentRow {
    pub id: i64,
    pub appt_date: String,
    pub appt_time: String,
    pub concern: String,
    pub status: String,
    pub diagnosis: Option<String>,
    pub doctor_comment: Option<String>,
    pub created_at: String,
    pub patient_name: String,
    pub patient_email: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: i64,
    pub role: String,
    pub name: String,
    pub email: String,
    pub specialization: Option<String>,
    pub bio: Option<String>,
    pub photo: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct AppointmentStats {
    pub pending: i64,
    pub confirmed: i64,
    pub completed: i64,
}

/// Blank form inputs are stored as NULL; anything else is kept as typed.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}
