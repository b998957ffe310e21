use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, HtmlError, QueryError},
    schema::{Id, RecipeShort},
};

use super::recipes::get_recipe_short;

/// A `(user_id, recipe_id)` edge table shared by favorites and the shopping cart.
pub trait EdgeTable {
    const TABLE: &'static str;
    const EXISTS_MESSAGE: &'static str;
    const MISSING_MESSAGE: &'static str;
}

pub struct Favorites;

impl EdgeTable for Favorites {
    const TABLE: &'static str = "favorites";
    const EXISTS_MESSAGE: &'static str = "Recipe is already in favorites.";
    const MISSING_MESSAGE: &'static str = "Recipe is not in favorites.";
}

pub struct ShoppingCart;

impl EdgeTable for ShoppingCart {
    const TABLE: &'static str = "shopping_cart";
    const EXISTS_MESSAGE: &'static str = "Recipe is already in the shopping cart.";
    const MISSING_MESSAGE: &'static str = "Recipe is not in the shopping cart.";
}

pub async fn edge_exists<E: EdgeTable>(
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let row: (bool,) = sqlx::query_as(&format!(
        "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND recipe_id = $2)",
        E::TABLE
    ))
    .bind(user_id)
    .bind(recipe_id)
    .fetch_one(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(row.0)
}

/// Adds the edge and returns the minimal projection of the recipe.
/// Repeated adds are rejected, including the loser of a concurrent insert.
pub async fn add_edge<E: EdgeTable>(
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<RecipeShort, Error> {
    let recipe = get_recipe_short(recipe_id, pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No recipe with this id."))?;

    if edge_exists::<E>(user_id, recipe_id, pool).await? {
        return Err(HtmlError::Conflict.new(E::EXISTS_MESSAGE));
    }

    let query = sqlx::query(&format!(
        "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        E::TABLE
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if query.rows_affected() == 0 {
        return Err(HtmlError::Conflict.new(E::EXISTS_MESSAGE));
    }

    log::trace!("> Added recipe {recipe_id} to {} of user {user_id}", E::TABLE);
    Ok(recipe)
}

pub async fn remove_edge<E: EdgeTable>(
    user_id: Id,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    if get_recipe_short(recipe_id, pool).await?.is_none() {
        return Err(HtmlError::NotFound.new("No recipe with this id."));
    }

    let query = sqlx::query(&format!(
        "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
        E::TABLE
    ))
    .bind(user_id)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    if query.rows_affected() == 0 {
        return Err(HtmlError::InvalidRequest.new(E::MISSING_MESSAGE));
    }

    log::trace!("> Removed recipe {recipe_id} from {} of user {user_id}", E::TABLE);
    Ok(())
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::database::actions::fixtures;

    #[test]
    fn edge_tables_differ_only_in_table_and_messages() {
        assert_eq!(Favorites::TABLE, "favorites");
        assert_eq!(ShoppingCart::TABLE, "shopping_cart");
        assert_ne!(Favorites::EXISTS_MESSAGE, ShoppingCart::EXISTS_MESSAGE);
        assert_ne!(Favorites::MISSING_MESSAGE, ShoppingCart::MISSING_MESSAGE);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn repeated_adds_and_removes_are_rejected(pool: PgPool) {
        let cook = fixtures::user("cook", &pool).await;
        let recipe = fixtures::recipe(&cook, "Soup", &[], &pool).await;

        let short = add_edge::<Favorites>(cook.id, recipe.id, &pool).await.unwrap();
        assert_eq!(short.id, recipe.id);
        assert_eq!(short.name, "Soup");
        assert!(edge_exists::<Favorites>(cook.id, recipe.id, &pool).await.unwrap());
        assert!(!edge_exists::<ShoppingCart>(cook.id, recipe.id, &pool).await.unwrap());

        let error = add_edge::<Favorites>(cook.id, recipe.id, &pool).await.unwrap_err();
        assert_eq!(error.kind, HtmlError::Conflict);
        assert_eq!(error.message(), Favorites::EXISTS_MESSAGE);

        remove_edge::<Favorites>(cook.id, recipe.id, &pool).await.unwrap();
        let error = remove_edge::<Favorites>(cook.id, recipe.id, &pool).await.unwrap_err();
        assert_eq!(error.kind, HtmlError::InvalidRequest);
        assert_eq!(error.message(), Favorites::MISSING_MESSAGE);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn missing_recipes_are_not_found(pool: PgPool) {
        let cook = fixtures::user("cook", &pool).await;

        let error = add_edge::<ShoppingCart>(cook.id, 404, &pool).await.unwrap_err();
        assert_eq!(error.kind, HtmlError::NotFound);
        let error = remove_edge::<ShoppingCart>(cook.id, 404, &pool).await.unwrap_err();
        assert_eq!(error.kind, HtmlError::NotFound);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn concurrent_adds_have_one_winner(pool: PgPool) {
        let cook = fixtures::user("cook", &pool).await;
        let recipe = fixtures::recipe(&cook, "Soup", &[], &pool).await;

        let (first, second) = tokio::join!(
            add_edge::<ShoppingCart>(cook.id, recipe.id, &pool),
            add_edge::<ShoppingCart>(cook.id, recipe.id, &pool),
        );

        let errors: Vec<Error> = [first, second].into_iter().filter_map(Result::err).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, HtmlError::Conflict);

        let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shopping_cart")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows.0, 1);
    }
}
