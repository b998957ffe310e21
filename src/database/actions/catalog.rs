use redis::aio::MultiplexedConnection;
use serde::Deserialize;
use sqlx::{Pool, Postgres};

use crate::{
    cache::cache::{get_or, get_or_optional, CacheKeyType},
    constants::{INGREDIENT_NAME_LENGTH, TAG_LENGTH, UNIT_NAME_LENGTH},
    error::{Error, HtmlError, QueryError},
    schema::{Id, Ingredient, Tag},
};

#[derive(Debug, Clone, Deserialize)]
pub struct IngredientImport {
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TagImport {
    pub name: String,
    pub slug: String,
}

/// Escapes `LIKE` wildcards so user input only ever matches literally.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

async fn query_tags(pool: &Pool<Postgres>) -> Result<Vec<Tag>, Error> {
    let rows: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY name")
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(rows)
}

async fn query_tag(id: Id, pool: &Pool<Postgres>) -> Result<Option<Tag>, Error> {
    let row: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

async fn query_ingredients(prefix: String, pool: &Pool<Postgres>) -> Result<Vec<Ingredient>, Error> {
    let rows: Vec<Ingredient> =
        sqlx::query_as("SELECT * FROM ingredients WHERE name ILIKE $1 ORDER BY name")
            .bind(format!("{}%", escape_like(&prefix)))
            .fetch_all(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(rows)
}

async fn query_ingredient(id: Id, pool: &Pool<Postgres>) -> Result<Option<Ingredient>, Error> {
    let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn list_tags(
    cache: Option<&MultiplexedConnection>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Tag>, Error> {
    get_or(CacheKeyType::Tags.new("all"), cache, || query_tags(pool)).await
}

pub async fn get_tag(
    id: Id,
    cache: Option<&MultiplexedConnection>,
    pool: &Pool<Postgres>,
) -> Result<Tag, Error> {
    get_or_optional(CacheKeyType::Tag.new(id), cache, || query_tag(id, pool))
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No tag with this id."))
}

/// Case-insensitive name prefix search; an empty prefix lists every ingredient.
pub async fn search_ingredients(
    prefix: &str,
    cache: Option<&MultiplexedConnection>,
    pool: &Pool<Postgres>,
) -> Result<Vec<Ingredient>, Error> {
    let prefix = prefix.trim().to_lowercase();
    let key = CacheKeyType::IngredientSearch.new(&prefix);

    get_or(key, cache, || query_ingredients(prefix, pool)).await
}

pub async fn get_ingredient(
    id: Id,
    cache: Option<&MultiplexedConnection>,
    pool: &Pool<Postgres>,
) -> Result<Ingredient, Error> {
    get_or_optional(CacheKeyType::Ingredient.new(id), cache, || {
        query_ingredient(id, pool)
    })
    .await?
    .ok_or_else(|| HtmlError::NotFound.new("No ingredient with this id."))
}

fn check_length(value: &str, field: &str, max_length: usize) -> Result<(), Error> {
    if value.trim().is_empty() || value.chars().count() > max_length {
        return Err(HtmlError::InvalidRequest.new(&format!(
            "Invalid {field} '{value}': expected 1 to {max_length} characters"
        )));
    }
    Ok(())
}

/// Inserts the missing ingredients and returns how many were new.
pub async fn import_ingredients(
    items: Vec<IngredientImport>,
    pool: &Pool<Postgres>,
) -> Result<u64, Error> {
    for item in &items {
        check_length(&item.name, "ingredient name", INGREDIENT_NAME_LENGTH)?;
        check_length(&item.measurement_unit, "measurement unit", UNIT_NAME_LENGTH)?;
    }

    let mut tr = pool.begin().await.map_err(QueryError::from)?;
    let mut created = 0;

    for item in items {
        let query = sqlx::query(
            "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(item.name.trim())
        .bind(item.measurement_unit.trim())
        .execute(&mut *tr)
        .await
        .map_err(QueryError::from)?;

        created += query.rows_affected();
    }

    tr.commit().await.map_err(QueryError::from)?;

    Ok(created)
}

/// Inserts the missing tags and returns how many were new.
pub async fn import_tags(items: Vec<TagImport>, pool: &Pool<Postgres>) -> Result<u64, Error> {
    for item in &items {
        check_length(&item.name, "tag name", TAG_LENGTH)?;
        check_length(&item.slug, "tag slug", TAG_LENGTH)?;
        if !item
            .slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(HtmlError::InvalidRequest.new(&format!("Invalid tag slug '{}'", item.slug)));
        }
    }

    let mut tr = pool.begin().await.map_err(QueryError::from)?;
    let mut created = 0;

    for item in items {
        let query =
            sqlx::query("INSERT INTO tags (name, slug) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(item.name.trim())
                .bind(item.slug.trim())
                .execute(&mut *tr)
                .await
                .map_err(QueryError::from)?;

        created += query.rows_affected();
    }

    tr.commit().await.map_err(QueryError::from)?;

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_are_escaped() {
        assert_eq!(escape_like("flour"), "flour");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b\\c"), "a\\_b\\\\c");
    }

    #[test]
    fn import_lengths_are_checked() {
        assert!(check_length("salt", "ingredient name", INGREDIENT_NAME_LENGTH).is_ok());
        assert!(check_length("  ", "ingredient name", INGREDIENT_NAME_LENGTH).is_err());
        assert!(check_length(&"x".repeat(TAG_LENGTH + 1), "tag name", TAG_LENGTH).is_err());
    }

    #[test]
    fn import_files_deserialize() {
        let items: Vec<IngredientImport> = serde_json::from_str(
            r#"[{"name": "flour", "measurement_unit": "g"}, {"name": "milk", "measurement_unit": "ml"}]"#,
        )
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].measurement_unit, "ml");
    }
}
