use std::path::Path;

use sqlx::{Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    authentication::permissions::ActionType,
    error::{Error, HtmlError, QueryError},
    jwt::SessionData,
    media::{decode_data_uri, remove_image, store_image, RECIPE_IMAGES},
    pagination::{PageContext, PageRequest},
    schema::{Id, Recipe, RecipeIngredient, RecipeRow, RecipeShort, RecipeTag},
    validation::{RecipeDraft, RecipeForm},
};

const DUPLICATE_RECIPE: &str = "You already have a recipe with this name.";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeFilter {
    pub author: Option<Id>,
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
}

pub async fn fetch_recipes(
    filter: &RecipeFilter,
    request: PageRequest,
    base_url: &str,
    pool: &Pool<Postgres>,
) -> Result<PageContext<Recipe>, Error> {
    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("SELECT r.*, COUNT(*) OVER() AS count FROM recipes r WHERE TRUE");

    if let Some(author) = filter.author {
        builder.push(" AND r.author_id = ").push_bind(author);
    }

    if !filter.tags.is_empty() {
        builder
            .push(
                " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id \
                 WHERE rt.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }

    builder
        .push(" ORDER BY r.pub_date DESC, r.id DESC LIMIT ")
        .push_bind(request.limit)
        .push(" OFFSET ")
        .push_bind(request.offset());

    let rows: Vec<RecipeRow> = builder
        .build_query_as()
        .fetch_all(pool)
        .await
        .map_err(QueryError::from)?;

    let total_count = rows.first().map(|row| row.count).unwrap_or(0);
    let rows = rows.into_iter().map(Recipe::from).collect();

    Ok(PageContext::from_rows(rows, total_count, request, base_url))
}

pub async fn get_recipe(id: Id, pool: &Pool<Postgres>) -> Result<Option<Recipe>, Error> {
    let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row)
}

pub async fn get_recipe_short(id: Id, pool: &Pool<Postgres>) -> Result<Option<RecipeShort>, Error> {
    let row: Option<RecipeShort> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(row)
}

/// Fetches a recipe the session is allowed to modify.
pub async fn get_recipe_mut(
    id: Id,
    session: &SessionData,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No recipe with this id."))?;

    match recipe.author_id == session.user_id {
        true => session.authenticate(ActionType::ManageOwnRecipes)?,
        false => session.authenticate(ActionType::ManageAllRecipes)?,
    }

    Ok(recipe)
}

/// Rejects drafts referencing tags or ingredients that do not exist.
async fn check_references(draft: &RecipeDraft, pool: &Pool<Postgres>) -> Result<(), Error> {
    let tags: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags WHERE id = ANY($1)")
        .bind(&draft.tags)
        .fetch_one(pool)
        .await
        .map_err(QueryError::from)?;

    if tags.0 != draft.tags.len() as i64 {
        return Err(HtmlError::InvalidRequest.new("Unknown tag."));
    }

    let ingredient_ids: Vec<Id> = draft.ingredients.iter().map(|part| part.id).collect();
    let ingredients: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM ingredients WHERE id = ANY($1)")
            .bind(&ingredient_ids)
            .fetch_one(pool)
            .await
            .map_err(QueryError::from)?;

    if ingredients.0 != ingredient_ids.len() as i64 {
        return Err(HtmlError::InvalidRequest.new("Unknown ingredient."));
    }

    Ok(())
}

/// Replaces the whole tag and ingredient sets of a recipe.
async fn replace_associations(
    recipe_id: Id,
    draft: &RecipeDraft,
    tr: &mut Transaction<'_, Postgres>,
) -> Result<(), Error> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) ");
    builder.push_values(&draft.ingredients, |mut b, part| {
        b.push_bind(recipe_id)
            .push_bind(part.id)
            .push_bind(part.amount);
    });
    builder
        .build()
        .execute(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO recipe_tags (recipe_id, tag_id) ");
    builder.push_values(&draft.tags, |mut b, tag_id| {
        b.push_bind(recipe_id).push_bind(*tag_id);
    });
    builder
        .build()
        .execute(&mut **tr)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

async fn insert_recipe(
    author_id: Id,
    draft: &RecipeDraft,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let mut tr = pool.begin().await.map_err(QueryError::from)?;

    let recipe: Recipe = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
    ",
    )
    .bind(author_id)
    .bind(&draft.name)
    .bind(image)
    .bind(&draft.text)
    .bind(draft.cooking_time)
    .fetch_one(&mut *tr)
    .await
    .map_err(|e| QueryError::from(e).on_conflict(DUPLICATE_RECIPE))?;

    replace_associations(recipe.id, draft, &mut tr).await?;

    tr.commit().await.map_err(QueryError::from)?;

    Ok(recipe)
}

async fn write_recipe(
    recipe_id: Id,
    draft: &RecipeDraft,
    image: &str,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let mut tr = pool.begin().await.map_err(QueryError::from)?;

    let recipe: Recipe = sqlx::query_as(
        "
        UPDATE recipes
        SET name = $2, image = $3, text = $4, cooking_time = $5
        WHERE id = $1
        RETURNING *
    ",
    )
    .bind(recipe_id)
    .bind(&draft.name)
    .bind(image)
    .bind(&draft.text)
    .bind(draft.cooking_time)
    .fetch_one(&mut *tr)
    .await
    .map_err(|e| QueryError::from(e).on_conflict(DUPLICATE_RECIPE))?;

    replace_associations(recipe.id, draft, &mut tr).await?;

    tr.commit().await.map_err(QueryError::from)?;

    Ok(recipe)
}

/// Validates the payload and stores a new recipe owned by the session's user.
pub async fn create_recipe(
    form: RecipeForm,
    session: &SessionData,
    media_root: &Path,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    session.authenticate(ActionType::CreateRecipes)?;

    let draft = form.validate()?;
    let image = match &draft.image {
        Some(image) => decode_data_uri(image)?,
        None => return Err(HtmlError::InvalidRequest.new("Add a photo of the recipe.")),
    };
    check_references(&draft, pool).await?;

    let image = store_image(media_root, RECIPE_IMAGES, image).await?;

    let recipe = match insert_recipe(session.user_id, &draft, &image, pool).await {
        Ok(recipe) => recipe,
        Err(e) => {
            remove_image(media_root, &image).await;
            return Err(e);
        }
    };

    log::info!("> User {} created recipe {}", session.user_id, recipe.id);
    Ok(recipe)
}

/// Replaces a recipe. Author and publication date never change.
pub async fn update_recipe(
    id: Id,
    form: RecipeForm,
    session: &SessionData,
    media_root: &Path,
    pool: &Pool<Postgres>,
) -> Result<Recipe, Error> {
    let current = get_recipe_mut(id, session, pool).await?;

    let draft = form.validate_update(&current)?;
    let image = draft.image.as_deref().map(decode_data_uri).transpose()?;
    check_references(&draft, pool).await?;

    let uploaded = match image {
        Some(image) => Some(store_image(media_root, RECIPE_IMAGES, image).await?),
        None => None,
    };
    let image = uploaded.as_deref().unwrap_or(current.image.as_str());

    let recipe = match write_recipe(current.id, &draft, image, pool).await {
        Ok(recipe) => recipe,
        Err(e) => {
            if let Some(uploaded) = &uploaded {
                remove_image(media_root, uploaded).await;
            }
            return Err(e);
        }
    };

    if uploaded.is_some() {
        remove_image(media_root, &current.image).await;
    }

    log::info!("> User {} updated recipe {}", session.user_id, recipe.id);
    Ok(recipe)
}

pub async fn delete_recipe(
    id: Id,
    session: &SessionData,
    media_root: &Path,
    pool: &Pool<Postgres>,
) -> Result<(), Error> {
    let recipe = get_recipe_mut(id, session, pool).await?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe.id)
        .execute(pool)
        .await
        .map_err(QueryError::from)?;

    remove_image(media_root, &recipe.image).await;

    log::info!("> User {} deleted recipe {}", session.user_id, recipe.id);
    Ok(())
}

pub async fn list_recipe_tags(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeTag>, Error> {
    let rows: Vec<RecipeTag> = sqlx::query_as(
        "
        SELECT rt.recipe_id, t.id, t.name, t.slug
        FROM recipe_tags rt
        INNER JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = ANY($1)
        ORDER BY t.name
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn list_recipe_ingredients(
    recipe_ids: &[Id],
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeIngredient>, Error> {
    let rows: Vec<RecipeIngredient> = sqlx::query_as(
        "
        SELECT ri.recipe_id, i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = ANY($1)
        ORDER BY ri.id
    ",
    )
    .bind(recipe_ids)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

/// Newest recipes of an author in their minimal projection.
pub async fn list_author_recipes(
    author_id: Id,
    limit: i64,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeShort>, Error> {
    let rows: Vec<RecipeShort> = sqlx::query_as(
        "
        SELECT id, name, image, cooking_time
        FROM recipes
        WHERE author_id = $1
        ORDER BY pub_date DESC, id DESC
        LIMIT $2
    ",
    )
    .bind(author_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

pub async fn count_author_recipes(author_id: Id, pool: &Pool<Postgres>) -> Result<i64, Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author_id)
        .fetch_one(pool)
        .await
        .map_err(QueryError::from)?;

    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::{
        database::actions::{fixtures, views::get_recipe_view},
        validation::IngredientAmountForm,
    };

    fn form(name: &str, tags: Vec<Id>, ingredients: &[(Id, i64)], image: Option<&str>) -> RecipeForm {
        RecipeForm {
            name: Some(name.to_owned()),
            text: Some("Mix and bake.".to_owned()),
            cooking_time: Some(45),
            image: image.map(str::to_owned),
            tags: Some(tags),
            ingredients: Some(
                ingredients
                    .iter()
                    .map(|&(id, amount)| IngredientAmountForm { id, amount })
                    .collect(),
            ),
        }
    }

    fn amounts(view: &crate::schema::RecipeView) -> Vec<(Id, i32)> {
        view.ingredients.iter().map(|i| (i.id, i.amount)).collect()
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn created_recipes_read_back(pool: PgPool) {
        let root = fixtures::media_root();
        let cook = fixtures::user("cook", &pool).await;
        let sweet = fixtures::tag("sweet", &pool).await;
        let breakfast = fixtures::tag("breakfast", &pool).await;
        let flour = fixtures::ingredient("flour", "g", &pool).await;
        let milk = fixtures::ingredient("milk", "ml", &pool).await;

        let payload = form(
            "Pancakes",
            vec![sweet.id, breakfast.id],
            &[(flour.id, 200), (milk.id, 300)],
            Some(fixtures::PIXEL),
        );
        let recipe = create_recipe(payload, &fixtures::session(&cook), &root, &pool)
            .await
            .unwrap();

        let view = get_recipe_view(recipe.id, Some(cook.id), &pool).await.unwrap();
        assert_eq!(view.name, "Pancakes");
        assert_eq!(view.cooking_time, 45);
        assert_eq!(view.author.id, cook.id);
        assert_eq!(view.tags, vec![breakfast, sweet]);
        assert_eq!(amounts(&view), vec![(flour.id, 200), (milk.id, 300)]);
        assert!(!view.is_favorited);
        assert!(!view.is_in_shopping_cart);
        assert!(view.image.starts_with("/media/recipes/"));
        assert_eq!(fixtures::stored_files(&root, RECIPE_IMAGES), 1);

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn updates_replace_associations_and_images(pool: PgPool) {
        let root = fixtures::media_root();
        let cook = fixtures::user("cook", &pool).await;
        let session = fixtures::session(&cook);
        let sweet = fixtures::tag("sweet", &pool).await;
        let quick = fixtures::tag("quick", &pool).await;
        let flour = fixtures::ingredient("flour", "g", &pool).await;
        let sugar = fixtures::ingredient("sugar", "g", &pool).await;

        let payload = form("Cake", vec![sweet.id], &[(flour.id, 500)], Some(fixtures::PIXEL));
        let created = create_recipe(payload, &session, &root, &pool).await.unwrap();

        let payload = form("Cake", vec![quick.id], &[(sugar.id, 50)], None);
        let updated = update_recipe(created.id, payload, &session, &root, &pool)
            .await
            .unwrap();
        assert_eq!(updated.image, created.image);
        assert_eq!(updated.pub_date, created.pub_date);

        let view = get_recipe_view(created.id, None, &pool).await.unwrap();
        assert_eq!(view.tags, vec![quick.clone()]);
        assert_eq!(amounts(&view), vec![(sugar.id, 50)]);

        let payload = form("Cake", vec![quick.id], &[(sugar.id, 50)], Some(fixtures::PIXEL));
        let replaced = update_recipe(created.id, payload, &session, &root, &pool)
            .await
            .unwrap();
        assert_ne!(replaced.image, created.image);
        assert_eq!(fixtures::stored_files(&root, RECIPE_IMAGES), 1);

        delete_recipe(created.id, &session, &root, &pool).await.unwrap();
        assert!(get_recipe(created.id, &pool).await.unwrap().is_none());
        assert_eq!(fixtures::stored_files(&root, RECIPE_IMAGES), 0);

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn duplicate_names_leave_no_files_behind(pool: PgPool) {
        let root = fixtures::media_root();
        let cook = fixtures::user("cook", &pool).await;
        let session = fixtures::session(&cook);
        let sweet = fixtures::tag("sweet", &pool).await;
        let flour = fixtures::ingredient("flour", "g", &pool).await;

        let payload = || form("Bread", vec![sweet.id], &[(flour.id, 500)], Some(fixtures::PIXEL));
        create_recipe(payload(), &session, &root, &pool).await.unwrap();

        let error = create_recipe(payload(), &session, &root, &pool)
            .await
            .unwrap_err();
        assert_eq!(error.kind, HtmlError::Conflict);
        assert_eq!(error.message(), DUPLICATE_RECIPE);
        assert_eq!(fixtures::stored_files(&root, RECIPE_IMAGES), 1);

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_references_are_rejected_before_writing(pool: PgPool) {
        let root = fixtures::media_root();
        let cook = fixtures::user("cook", &pool).await;
        let flour = fixtures::ingredient("flour", "g", &pool).await;

        let payload = form("Bread", vec![999], &[(flour.id, 500)], Some(fixtures::PIXEL));
        let error = create_recipe(payload, &fixtures::session(&cook), &root, &pool)
            .await
            .unwrap_err();
        assert_eq!(error.message(), "Unknown tag.");
        assert_eq!(fixtures::stored_files(&root, RECIPE_IMAGES), 0);

        let rows: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows.0, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn only_authors_modify_their_recipes(pool: PgPool) {
        let root = fixtures::media_root();
        let cook = fixtures::user("cook", &pool).await;
        let stranger = fixtures::user("stranger", &pool).await;
        let sweet = fixtures::tag("sweet", &pool).await;
        let flour = fixtures::ingredient("flour", "g", &pool).await;
        let recipe = fixtures::recipe(&cook, "Bread", &[(flour.id, 500)], &pool).await;

        let payload = form("Mine now", vec![sweet.id], &[(flour.id, 1)], None);
        let error = update_recipe(recipe.id, payload, &fixtures::session(&stranger), &root, &pool)
            .await
            .unwrap_err();
        assert_eq!(error.kind, HtmlError::Forbidden);

        let error = delete_recipe(recipe.id, &fixtures::session(&stranger), &root, &pool)
            .await
            .unwrap_err();
        assert_eq!(error.kind, HtmlError::Forbidden);

        let error = delete_recipe(recipe.id + 1, &fixtures::session(&cook), &root, &pool)
            .await
            .unwrap_err();
        assert_eq!(error.kind, HtmlError::NotFound);
    }
}
