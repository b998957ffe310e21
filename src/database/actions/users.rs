use sqlx::{Pool, Postgres};

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::generate_jwt_session,
        permissions::ActionType,
    },
    error::{Error, HtmlError, QueryError},
    jwt::SessionData,
    pagination::{PageContext, PageRequest},
    schema::{Id, User, UserRow},
    validation::UserForm,
};

pub async fn get_user_by_id(user_id: Id, pool: &Pool<Postgres>) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_user_by_email(email: &str, pool: &Pool<Postgres>) -> Result<Option<User>, Error> {
    let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_users(user_ids: &[Id], pool: &Pool<Postgres>) -> Result<Vec<User>, Error> {
    let rows: Vec<User> = sqlx::query_as("SELECT * FROM users WHERE id = ANY($1)")
        .bind(user_ids)
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn fetch_users(
    request: PageRequest,
    base_url: &str,
    pool: &Pool<Postgres>,
) -> Result<PageContext<User>, Error> {
    let rows: Vec<UserRow> = sqlx::query_as(
        "SELECT u.*, COUNT(*) OVER() AS count FROM users u ORDER BY u.id LIMIT $1 OFFSET $2",
    )
    .bind(request.limit)
    .bind(request.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let rows = rows.into_iter().map(User::from).collect();

    Ok(PageContext::from_rows(rows, total_count, request, base_url))
}

/// Creates a user with the hashed version of their password.
pub async fn register_user(form: UserForm, pool: &Pool<Postgres>) -> Result<User, Error> {
    let draft = form.validate()?;

    let taken: (bool, bool) = sqlx::query_as(
        "
        SELECT
            EXISTS (SELECT 1 FROM users WHERE username = $1),
            EXISTS (SELECT 1 FROM users WHERE LOWER(email) = LOWER($2))
    ",
    )
    .bind(&draft.username)
    .bind(&draft.email)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    match taken {
        (true, _) => return Err(HtmlError::Conflict.new("This username is already taken.")),
        (_, true) => return Err(HtmlError::Conflict.new("This email is already registered.")),
        _ => {}
    }

    let password = hash_password(&draft.password).map_err(|e| {
        log::error!("> Failed to hash password: {e}");
        HtmlError::InternalServerError.default()
    })?;

    let user: User = sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    ",
    )
    .bind(&draft.email)
    .bind(&draft.username)
    .bind(&draft.first_name)
    .bind(&draft.last_name)
    .bind(&password)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        QueryError::from(e).on_conflict("A user with this username or email already exists.")
    })?;

    log::info!("> Registered user {} ({})", user.username, user.id);
    Ok(user)
}

/// Returns a signed session token for valid credentials.
pub async fn login_user(
    email: &str,
    password: &str,
    secret: &str,
    lifetime_hours: i64,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    let invalid = || HtmlError::InvalidRequest.new("Unable to log in with provided credentials.");

    let user = get_user_by_email(email, pool).await?.ok_or_else(invalid)?;

    let authenticated = verify_password(password, &user.password).map_err(|e| {
        log::error!("> Stored password hash of user {} is unreadable: {e}", user.id);
        HtmlError::InternalServerError.default()
    })?;
    if !authenticated {
        return Err(invalid());
    }

    generate_jwt_session(&user, secret, lifetime_hours)
}

/// Fails with `InvalidSession` when the session outlived its user.
pub async fn get_session_user(session: &SessionData, pool: &Pool<Postgres>) -> Result<User, Error> {
    get_user_by_id(session.user_id, pool)
        .await?
        .ok_or_else(|| HtmlError::InvalidSession.new("User no longer exists."))
}

pub async fn set_avatar(
    session: &SessionData,
    avatar: Option<&str>,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    let query = sqlx::query("UPDATE users SET avatar = $2 WHERE id = $1")
        .bind(session.user_id)
        .bind(avatar)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if query.rows_affected() == 0 {
        return Err(HtmlError::InvalidSession.new("User no longer exists."));
    }

    Ok(())
}
