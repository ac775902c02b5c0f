use crate::{
    appointments::{doctor_identity, OWNED_BY_DOCTOR},
    db::Store,
    error::AppResult,
    models::AppointmentStats,
};

const STATUS_COUNTS: &str = r#"COALESCE(SUM(CASE WHEN a.status = 'pending' THEN 1 ELSE 0 END), 0) AS pending,
                  COALESCE(SUM(CASE WHEN a.status = 'confirmed' THEN 1 ELSE 0 END), 0) AS confirmed,
                  COALESCE(SUM(CASE WHEN a.status = 'completed' THEN 1 ELSE 0 END), 0) AS completed"#;

pub async fn stats_for_patient(store: &Store, patient_id: i64) -> AppResult<AppointmentStats> {
    let sql = format!("SELECT {STATUS_COUNTS} FROM appointments a WHERE a.patient_id = ?");
    let stats = sqlx::query_as::<_, AppointmentStats>(&sql)
        .bind(patient_id)
        .fetch_optional(store.pool())
        .await?;
    Ok(stats.unwrap_or_default())
}

/// Counts use the same ownership rule as the doctor's appointment queue.
pub async fn stats_for_doctor(store: &Store, doctor_id: i64) -> AppResult<AppointmentStats> {
    let me = doctor_identity(store, doctor_id).await?;
    let sql = format!(
        r#"SELECT {STATUS_COUNTS}
           FROM appointments a
           JOIN users d ON d.id = a.doctor_id
           WHERE {OWNED_BY_DOCTOR}"#
    );
    let stats = sqlx::query_as::<_, AppointmentStats>(&sql)
        .bind(me.id)
        .bind(me.name)
        .bind(me.specialization)
        .fetch_optional(store.pool())
        .await?;
    Ok(stats.unwrap_or_default())
}
