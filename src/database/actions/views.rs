use std::collections::HashMap;

use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, HtmlError},
    schema::{Id, Recipe, RecipeIngredientView, RecipeView, Tag, User, UserView},
};

use super::{
    follows::is_subscribed,
    recipes::{get_recipe, list_recipe_ingredients, list_recipe_tags},
    relations::{edge_exists, Favorites, ShoppingCart},
    users::get_users,
};

pub async fn is_favorited(
    viewer: Option<Id>,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    match viewer {
        Some(user_id) => edge_exists::<Favorites>(user_id, recipe_id, pool).await,
        None => Ok(false),
    }
}

pub async fn is_in_shopping_cart(
    viewer: Option<Id>,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    match viewer {
        Some(user_id) => edge_exists::<ShoppingCart>(user_id, recipe_id, pool).await,
        None => Ok(false),
    }
}

pub async fn user_view(
    user: User,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<UserView, Error> {
    let is_subscribed = is_subscribed(viewer, user.id, pool).await?;

    Ok(UserView {
        email: user.email,
        id: user.id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        is_subscribed,
        avatar: user.avatar,
    })
}

pub async fn user_views(
    users: Vec<User>,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<UserView>, Error> {
    let mut views = Vec::with_capacity(users.len());
    for user in users {
        views.push(user_view(user, viewer, pool).await?);
    }

    Ok(views)
}

/// Builds the read representation of `recipes` for one viewer, keeping their order.
/// Associations and authors are loaded in bulk; the per-viewer flags are checked per recipe.
pub async fn build_recipe_views(
    recipes: Vec<Recipe>,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<Vec<RecipeView>, Error> {
    if recipes.is_empty() {
        return Ok(vec![]);
    }

    let recipe_ids: Vec<Id> = recipes.iter().map(|recipe| recipe.id).collect();
    let mut author_ids: Vec<Id> = recipes.iter().map(|recipe| recipe.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let mut tags: HashMap<Id, Vec<Tag>> = HashMap::new();
    for tag in list_recipe_tags(&recipe_ids, pool).await? {
        tags.entry(tag.recipe_id).or_default().push(tag.into());
    }

    let mut ingredients: HashMap<Id, Vec<RecipeIngredientView>> = HashMap::new();
    for part in list_recipe_ingredients(&recipe_ids, pool).await? {
        ingredients
            .entry(part.recipe_id)
            .or_default()
            .push(part.into());
    }

    let mut authors: HashMap<Id, UserView> = HashMap::new();
    for author in get_users(&author_ids, pool).await? {
        let id = author.id;
        authors.insert(id, user_view(author, viewer, pool).await?);
    }

    let mut views = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        let author = authors.get(&recipe.author_id).cloned().ok_or_else(|| {
            log::error!("> Recipe {} has no author", recipe.id);
            HtmlError::InternalServerError.default()
        })?;

        views.push(RecipeView {
            id: recipe.id,
            tags: tags.remove(&recipe.id).unwrap_or_default(),
            author,
            ingredients: ingredients.remove(&recipe.id).unwrap_or_default(),
            is_favorited: is_favorited(viewer, recipe.id, pool).await?,
            is_in_shopping_cart: is_in_shopping_cart(viewer, recipe.id, pool).await?,
            name: recipe.name,
            image: recipe.image,
            text: recipe.text,
            cooking_time: recipe.cooking_time,
        });
    }

    Ok(views)
}

pub async fn build_recipe_view(
    recipe: Recipe,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<RecipeView, Error> {
    build_recipe_views(vec![recipe], viewer, pool)
        .await?
        .pop()
        .ok_or_else(|| HtmlError::InternalServerError.default())
}

/// Fails with `NotFound` when the recipe is missing.
pub async fn get_recipe_view(
    id: Id,
    viewer: Option<Id>,
    pool: &Pool<Postgres>,
) -> Result<RecipeView, Error> {
    let recipe = get_recipe(id, pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No recipe with this id."))?;
    build_recipe_view(recipe, viewer, pool).await
}
