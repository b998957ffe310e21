use sqlx::{Pool, Postgres};

use crate::{
    authentication::permissions::ActionType,
    error::{Error, HtmlError, QueryError},
    jwt::SessionData,
    pagination::{PageContext, PageRequest},
    schema::{FollowedAuthorRow, Id, SubscriptionView, User},
};

use super::{
    recipes::{count_author_recipes, list_author_recipes},
    users::get_user_by_id,
};

pub async fn is_subscribed(
    viewer: Option<Id>,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let user_id = match viewer {
        Some(user_id) => user_id,
        None => return Ok(false),
    };

    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS (SELECT 1 FROM follows WHERE user_id = $1 AND author_id = $2)",
    )
    .bind(user_id)
    .bind(author_id)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row.0)
}

async fn get_author(author_id: Id, pool: &Pool<Postgres>) -> Result<User, Error> {
    get_user_by_id(author_id, pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No user with this id."))
}

/// Subscribes the session's user to `author_id`.
pub async fn follow(
    session: &SessionData,
    author_id: Id,
    recipes_limit: i64,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionView, Error> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    let author = get_author(author_id, pool).await?;

    if author.id == session.user_id {
        return Err(HtmlError::InvalidRequest.new("You cannot subscribe to yourself."));
    }

    if is_subscribed(Some(session.user_id), author.id, pool).await? {
        return Err(HtmlError::Conflict.new("You are already subscribed to this user."));
    }

    let query = sqlx::query(
        "INSERT INTO follows (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(session.user_id)
    .bind(author.id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if query.rows_affected() == 0 {
        return Err(HtmlError::Conflict.new("You are already subscribed to this user."));
    }

    log::trace!("> User {} follows {}", session.user_id, author.id);
    subscription_view(FollowedAuthorRow::from(author), recipes_limit, pool).await
}

pub async fn unfollow(
    session: &SessionData,
    author_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    let author = get_author(author_id, pool).await?;

    let query = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND author_id = $2")
        .bind(session.user_id)
        .bind(author.id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    if query.rows_affected() == 0 {
        return Err(HtmlError::InvalidRequest.new("You are not subscribed to this user."));
    }

    log::trace!("> User {} unfollowed {}", session.user_id, author.id);
    Ok(())
}

/// The author enriched with their newest recipes (at most `recipes_limit`) and recipe count.
/// Only built for authors the viewer follows, so `is_subscribed` is always set.
pub async fn subscription_view(
    author: FollowedAuthorRow,
    recipes_limit: i64,
    pool: &Pool<Postgres>,
) -> Result<SubscriptionView, Error> {
    let recipes = list_author_recipes(author.id, recipes_limit, pool).await?;
    let recipes_count = count_author_recipes(author.id, pool).await?;

    Ok(SubscriptionView {
        email: author.email,
        id: author.id,
        username: author.username,
        first_name: author.first_name,
        last_name: author.last_name,
        is_subscribed: true,
        recipes,
        recipes_count,
        avatar: author.avatar,
    })
}

pub async fn list_subscriptions(
    session: &SessionData,
    request: PageRequest,
    recipes_limit: i64,
    base_url: &str,
    pool: &Pool<Postgres>,
) -> Result<PageContext<SubscriptionView>, Error> {
    let rows: Vec<FollowedAuthorRow> = sqlx::query_as(
        "
        SELECT u.id, u.email, u.username, u.first_name, u.last_name, u.avatar,
               COUNT(*) OVER() AS count
        FROM follows f
        INNER JOIN users u ON u.id = f.author_id
        WHERE f.user_id = $1
        ORDER BY f.id
        LIMIT $2 OFFSET $3
    ",
    )
    .bind(session.user_id)
    .bind(request.limit)
    .bind(request.offset())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        results.push(subscription_view(row, recipes_limit, pool).await?);
    }

    Ok(PageContext::from_rows(results, total_count, request, base_url))
}
