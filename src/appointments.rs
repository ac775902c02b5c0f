//! Appointment booking and the doctor-side queue.
//!
//! A doctor "owns" an appointment when it was booked against their id, or
//! against another doctor row whose name and specialization match theirs
//! once trimmed and lowercased. Older data contains duplicate doctor rows,
//! and this keeps bookings against any copy visible to the clinician.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::{
    db::{timestamp, Store},
    error::{AppError, AppResult},
    models::{
        non_blank, AppointmentStatus, DoctorAppointmentRow, PatientAppointmentRow, Role,
    },
};

pub const MIN_CONCERN_LEN: usize = 10;
pub const INVALID_DOCTOR_ID: &str = "Invalid value";

/// Appointment `a` joined to its doctor row `d`, bound as
/// (caller id, caller name, caller specialization).
pub(crate) const OWNED_BY_DOCTOR: &str = r#"(a.doctor_id = ?
        OR (lower(trim(d.name)) = lower(trim(?))
            AND lower(trim(COALESCE(d.specialization, ''))) = lower(trim(COALESCE(?, '')))))"#;

static TIME_RE: OnceLock<Regex> = OnceLock::new();

fn time_regex() -> &'static Regex {
    TIME_RE.get_or_init(|| {
        Regex::new(r"^[0-9]{2}:[0-9]{2}$").unwrap_or_else(|error| panic!("time regex failed to compile: {error}"))
    })
}

/// Raw booking form values.
#[derive(Debug, Clone)]
pub struct AppointmentRequest {
    pub doctor_id: String,
    pub date: String,
    pub time: String,
    pub concern: String,
}

impl AppointmentRequest {
    fn problems(&self) -> (Option<i64>, Vec<String>) {
        let mut errors = Vec::new();
        let doctor_id = self.doctor_id.trim().parse::<i64>().ok();
        if doctor_id.is_none() {
            errors.push(INVALID_DOCTOR_ID.to_string());
        }
        if NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").is_err() {
            errors.push("Valid date required".to_string());
        }
        if !time_regex().is_match(self.time.trim()) {
            errors.push("Time format HH:MM".to_string());
        }
        if self.concern.chars().count() < MIN_CONCERN_LEN {
            errors.push("Please describe your concern".to_string());
        }
        (doctor_id, errors)
    }
}

#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: String,
    pub diagnosis: Option<String>,
    pub doctor_comment: Option<String>,
}

/// Name and specialization a doctor is matched by.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct DoctorIdentity {
    pub id: i64,
    pub name: Option<String>,
    pub specialization: Option<String>,
}

pub(crate) async fn doctor_identity(store: &Store, doctor_id: i64) -> AppResult<DoctorIdentity> {
    let found = sqlx::query_as::<_, DoctorIdentity>(
        "SELECT id, name, specialization FROM users WHERE id = ? LIMIT 1",
    )
    .bind(doctor_id)
    .fetch_optional(store.pool())
    .await?;

    // A vanished caller only matches by id.
    Ok(found.unwrap_or(DoctorIdentity {
        id: doctor_id,
        name: None,
        specialization: None,
    }))
}

pub async fn create_appointment(
    store: &Store,
    patient_id: i64,
    request: &AppointmentRequest,
) -> AppResult<i64> {
    let (doctor_id, errors) = request.problems();
    let doctor_id = match doctor_id {
        Some(doctor_id) if errors.is_empty() => doctor_id,
        _ => return Err(AppError::Validation(errors)),
    };

    // Only a well-formed request gets as far as the doctor lookup.
    let doctor = sqlx::query_as::<_, (i64,)>(
        "SELECT id FROM users WHERE id = ? AND role = 'doctor' LIMIT 1",
    )
    .bind(doctor_id)
    .fetch_optional(store.pool())
    .await?;
    if doctor.is_none() {
        return Err(AppError::InvalidDoctor);
    }

    let patient_role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = ? LIMIT 1")
        .bind(patient_id)
        .fetch_optional(store.pool())
        .await?;
    if patient_role.as_deref() != Some(Role::Patient.as_str()) {
        return Err(AppError::NotFound);
    }

    let result = sqlx::query(
        r#"INSERT INTO appointments (patient_id, doctor_id, appt_date, appt_time, concern, status, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(patient_id)
    .bind(doctor_id)
    .bind(request.date.trim())
    .bind(request.time.trim())
    .bind(&request.concern)
    .bind(AppointmentStatus::Pending.as_str())
    .bind(timestamp())
    .execute(store.pool())
    .await?;

    let appointment_id = result.last_insert_rowid();
    log::info!("Patient {patient_id} requested appointment {appointment_id} with doctor {doctor_id}");
    Ok(appointment_id)
}

pub async fn list_for_patient(store: &Store, patient_id: i64) -> AppResult<Vec<PatientAppointmentRow>> {
    let rows = sqlx::query_as::<_, PatientAppointmentRow>(
        r#"SELECT a.id, a.doctor_id, a.appt_date, a.appt_time, a.concern, a.status,
                  a.diagnosis, a.doctor_comment, a.created_at,
                  d.name AS doctor_name, d.specialization AS specialization
           FROM appointments a
           JOIN users d ON d.id = a.doctor_id
           WHERE a.patient_id = ?
           ORDER BY a.created_at DESC, a.id DESC"#,
    )
    .bind(patient_id)
    .fetch_all(store.pool())
    .await?;
    Ok(rows)
}

pub async fn list_for_doctor(store: &Store, doctor_id: i64) -> AppResult<Vec<DoctorAppointmentRow>> {
    let me = doctor_identity(store, doctor_id).await?;
    let sql = format!(
        r#"SELECT a.id, a.appt_date, a.appt_time, a.concern, a.status,
                  a.diagnosis, a.doctor_comment, a.created_at,
                  p.name AS patient_name, p.email AS patient_email
           FROM appointments a
           JOIN users p ON p.id = a.patient_id
           JOIN users d ON d.id = a.doctor_id
           WHERE {OWNED_BY_DOCTOR}
           ORDER BY a.created_at DESC, a.id DESC"#
    );
    let rows = sqlx::query_as::<_, DoctorAppointmentRow>(&sql)
        .bind(me.id)
        .bind(me.name)
        .bind(me.specialization)
        .fetch_all(store.pool())
        .await?;
    Ok(rows)
}

/// Overwrites status, diagnosis and comment. Appointments the caller does
/// not own are reported exactly like missing ones.
pub async fn update_status(
    store: &Store,
    appointment_id: i64,
    doctor_id: i64,
    update: StatusUpdate,
) -> AppResult<()> {
    let me = doctor_identity(store, doctor_id).await?;
    let sql = format!(
        r#"SELECT 1
           FROM appointments a
           JOIN users d ON d.id = a.doctor_id
           WHERE a.id = ? AND {OWNED_BY_DOCTOR}
           LIMIT 1"#
    );
    let owned = sqlx::query_as::<_, (i64,)>(&sql)
        .bind(appointment_id)
        .bind(me.id)
        .bind(me.name)
        .bind(me.specialization)
        .fetch_optional(store.pool())
        .await?;
    if owned.is_none() {
        return Err(AppError::NotFound);
    }

    let status = AppointmentStatus::parse(&update.status)
        .ok_or_else(|| AppError::validation("Invalid status"))?;

    sqlx::query("UPDATE appointments SET status = ?, diagnosis = ?, doctor_comment = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(non_blank(update.diagnosis))
        .bind(non_blank(update.doctor_comment))
        .bind(appointment_id)
        .execute(store.pool())
        .await?;

    log::info!("Doctor {doctor_id} set appointment {appointment_id} to {}", status.as_str());
    Ok(())
}
