//! Doctor directory: read-only queries over doctor accounts.

use std::sync::OnceLock;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

use crate::{
    db::Store,
    error::{AppError, AppResult},
    models::Doctor,
};

/// Characters left alone by JavaScript's `encodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

fn whitespace_regex() -> &'static Regex {
    WHITESPACE_RE.get_or_init(|| {
        Regex::new(r"\s+").unwrap_or_else(|error| panic!("whitespace regex failed to compile: {error}"))
    })
}

/// 32-bit polynomial rolling hash (`h * 31 + unit`) over UTF-16 code units.
fn rolling_hash(input: &str) -> i32 {
    input.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

/// Stand-in portrait for doctors without a stored photo. Identical inputs
/// always produce the identical URL.
pub fn photo_for(name: &str, specialization: &str) -> String {
    let tags = whitespace_regex().replace_all(&specialization.to_lowercase(), ",").into_owned();
    let tags = if tags.is_empty() { "medicine".to_string() } else { tags };
    let signature = rolling_hash(&format!("{name}-{specialization}")).unsigned_abs();
    format!(
        "https://source.unsplash.com/800x600/?doctor,{}&sig={signature}",
        utf8_percent_encode(&tags, URI_COMPONENT)
    )
}

fn with_photo(mut doctor: Doctor) -> Doctor {
    if doctor.photo.trim().is_empty() {
        doctor.photo = photo_for(&doctor.name, &doctor.specialization);
    }
    doctor
}

/// One entry per clinician: rows sharing a normalized name and
/// specialization are collapsed.
pub async fn list_doctors(store: &Store) -> AppResult<Vec<Doctor>> {
    let rows = sqlx::query_as::<_, Doctor>(
        r#"SELECT MIN(id) AS id,
                  MIN(name) AS name,
                  MIN(email) AS email,
                  MIN(COALESCE(specialization, '')) AS specialization,
                  MAX(COALESCE(bio, '')) AS bio,
                  MAX(COALESCE(photo, '')) AS photo
           FROM users
           WHERE role = 'doctor'
           GROUP BY lower(trim(name)), lower(trim(COALESCE(specialization, '')))
           ORDER BY lower(trim(MIN(name))), lower(trim(MIN(COALESCE(specialization, ''))))"#,
    )
    .fetch_all(store.pool())
    .await?;

    Ok(rows.into_iter().map(with_photo).collect())
}

pub async fn get_doctor(store: &Store, id: i64) -> AppResult<Doctor> {
    let row = sqlx::query_as::<_, Doctor>(
        r#"SELECT id, name, email,
                  COALESCE(specialization, '') AS specialization,
                  COALESCE(bio, '') AS bio,
                  COALESCE(photo, '') AS photo
           FROM users
           WHERE id = ? AND role = 'doctor'
           LIMIT 1"#,
    )
    .bind(id)
    .fetch_optional(store.pool())
    .await?;

    row.map(with_photo).ok_or(AppError::NotFound)
}
