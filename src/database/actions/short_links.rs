use redis::aio::MultiplexedConnection;
use sqlx::{Pool, Postgres};

use crate::{
    cache::cache::{get_or_optional, CacheKeyType},
    config::ShortLinkKey,
    constants::{SHORT_LINK_ATTEMPTS, SHORT_LINK_LENGTH},
    cryptography::generate_access_token,
    error::{Error, HtmlError, QueryError},
    schema::{Id, ShortLink},
};

/// Frontend path of a recipe, the target of its short link.
pub fn recipe_full_url(recipe_id: Id) -> String {
    format!("/recipes/{recipe_id}/")
}

/// The stored form of a short link. `origin` is `{scheme}://{host}` of the request.
pub fn short_url_for(token: &str, key: ShortLinkKey, origin: &str) -> String {
    match key {
        ShortLinkKey::Path => format!("/s/{token}/"),
        ShortLinkKey::Absolute => format!("{origin}/s/{token}/"),
    }
}

/// Stored short links may be bare paths; clients always get an absolute URL.
pub fn absolute_url(short_url: &str, origin: &str) -> String {
    match short_url.starts_with('/') {
        true => format!("{origin}{short_url}"),
        false => short_url.to_owned(),
    }
}

async fn get_by_full_url(
    full_url: &str,
    pool: &Pool<Postgres>,
) -> Result<Option<ShortLink>, Error> {
    let row: Option<ShortLink> = sqlx::query_as("SELECT * FROM short_links WHERE full_url = $1")
        .bind(full_url)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

async fn short_url_exists(short_url: &str, pool: &Pool<Postgres>) -> Result<bool, Error> {
    let row: (bool,) =
        sqlx::query_as("SELECT EXISTS (SELECT 1 FROM short_links WHERE short_url = $1)")
            .bind(short_url)
            .fetch_one(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(row.0)
}

/// Returns the short link of `full_url`, issuing a fresh random token on first use.
/// Issuing is idempotent: concurrent callers for the same URL all get the winner's link.
pub async fn resolve_or_create(
    full_url: &str,
    key: ShortLinkKey,
    origin: &str,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    if let Some(link) = get_by_full_url(full_url, pool).await? {
        return Ok(link.short_url);
    }

    for _ in 0..SHORT_LINK_ATTEMPTS {
        let candidate = short_url_for(&generate_access_token(SHORT_LINK_LENGTH), key, origin);
        if short_url_exists(&candidate, pool).await? {
            continue;
        }

        let row: Option<ShortLink> = sqlx::query_as(
            "
            INSERT INTO short_links (full_url, short_url)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            RETURNING *
        ",
        )
        .bind(full_url)
        .bind(&candidate)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

        if let Some(link) = row {
            log::info!("> Issued short link {} for {}", link.short_url, link.full_url);
            return Ok(link.short_url);
        }

        // Lost a race: either on this URL, or on the token.
        if let Some(link) = get_by_full_url(full_url, pool).await? {
            return Ok(link.short_url);
        }
    }

    log::error!("> No free short link token after {SHORT_LINK_ATTEMPTS} attempts");
    Err(HtmlError::InternalServerError.new("Could not issue a short link."))
}

async fn get_full_url(short_url: &str, pool: &Pool<Postgres>) -> Result<Option<String>, Error> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT full_url FROM short_links WHERE short_url = $1")
            .bind(short_url)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(row.map(|row| row.0))
}

/// Full URL stored for an exact `short_url`. Links never change once issued.
pub async fn resolve(
    short_url: &str,
    cache: Option<&MultiplexedConnection>,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    let key = CacheKeyType::ShortLink.new(short_url);
    let full_url = get_or_optional(key, cache, || get_full_url(short_url, pool)).await?;

    full_url.ok_or_else(|| HtmlError::NotFound.new("Unknown short link."))
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;

    #[test]
    fn recipes_link_to_their_frontend_page() {
        assert_eq!(recipe_full_url(12), "/recipes/12/");
    }

    #[test]
    fn short_urls_follow_the_configured_key() {
        assert_eq!(
            short_url_for("aB3", ShortLinkKey::Path, "https://food.example"),
            "/s/aB3/"
        );
        assert_eq!(
            short_url_for("aB3", ShortLinkKey::Absolute, "https://food.example"),
            "https://food.example/s/aB3/"
        );
    }

    #[test]
    fn responses_are_always_absolute() {
        assert_eq!(
            absolute_url("/s/aB3/", "http://localhost:8000"),
            "http://localhost:8000/s/aB3/"
        );
        assert_eq!(
            absolute_url("https://food.example/s/aB3/", "http://localhost:8000"),
            "https://food.example/s/aB3/"
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn links_are_issued_once_and_resolve_back(pool: PgPool) {
        let origin = "http://localhost:8000";
        let full_url = recipe_full_url(7);

        let short_url = resolve_or_create(&full_url, ShortLinkKey::Path, origin, &pool)
            .await
            .unwrap();
        assert!(short_url.starts_with("/s/"));
        assert_eq!(short_url.len(), "/s/".len() + SHORT_LINK_LENGTH + 1);

        let again = resolve_or_create(&full_url, ShortLinkKey::Path, origin, &pool)
            .await
            .unwrap();
        assert_eq!(again, short_url);

        assert_eq!(resolve(&short_url, None, &pool).await.unwrap(), full_url);

        let other = resolve_or_create(&recipe_full_url(8), ShortLinkKey::Path, origin, &pool)
            .await
            .unwrap();
        assert_ne!(other, short_url);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn concurrent_issuers_share_one_link(pool: PgPool) {
        let origin = "https://food.example";
        let full_url = recipe_full_url(3);

        let (first, second) = tokio::join!(
            resolve_or_create(&full_url, ShortLinkKey::Absolute, origin, &pool),
            resolve_or_create(&full_url, ShortLinkKey::Absolute, origin, &pool),
        );
        assert_eq!(first.unwrap(), second.unwrap());

        let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM short_links")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows.0, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_links_are_not_found(pool: PgPool) {
        let error = resolve("/s/zzz/", None, &pool).await.unwrap_err();
        assert_eq!(error.kind, HtmlError::NotFound);
    }
}
