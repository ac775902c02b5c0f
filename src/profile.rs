use crate::{
    auth::MIN_NAME_LEN,
    db::Store,
    error::{AppError, AppResult},
    models::{non_blank, ProfileRow, Role},
};

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: String,
    pub specialization: Option<String>,
    pub bio: Option<String>,
    pub photo: Option<String>,
}

pub async fn get_profile(store: &Store, user_id: i64) -> AppResult<ProfileRow> {
    sqlx::query_as::<_, ProfileRow>(
        r#"SELECT id, role, name, email, specialization, bio, photo
           FROM users
           WHERE id = ?
           LIMIT 1"#,
    )
    .bind(user_id)
    .fetch_optional(store.pool())
    .await?
    .ok_or(AppError::NotFound)
}

/// Saves the editable fields for the user's role and returns the stored
/// display name. Patients cannot set a specialization or bio.
pub async fn update_profile(store: &Store, user_id: i64, update: ProfileUpdate) -> AppResult<String> {
    let name = update.name.trim().to_string();
    if name.chars().count() < MIN_NAME_LEN {
        return Err(AppError::validation("Name required"));
    }

    let role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = ? LIMIT 1")
        .bind(user_id)
        .fetch_optional(store.pool())
        .await?
        .and_then(|role| Role::parse(&role))
        .ok_or(AppError::NotFound)?;

    match role {
        Role::Doctor => {
            sqlx::query("UPDATE users SET name = ?, specialization = ?, bio = ?, photo = ? WHERE id = ?")
                .bind(&name)
                .bind(non_blank(update.specialization))
                .bind(non_blank(update.bio))
                .bind(non_blank(update.photo))
                .bind(user_id)
                .execute(store.pool())
                .await?;
        }
        Role::Patient => {
            sqlx::query("UPDATE users SET name = ?, photo = ? WHERE id = ?")
                .bind(&name)
                .bind(non_blank(update.photo))
                .bind(user_id)
                .execute(store.pool())
                .await?;
        }
    }

    Ok(name)
}
