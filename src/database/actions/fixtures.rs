//! Rows for database-backed tests, written with plain SQL so each test only
//! depends on the action it exercises.

use std::path::{Path, PathBuf};

use sqlx::{Pool, Postgres};

use crate::{
    jwt::SessionData,
    schema::{Id, Ingredient, Recipe, Tag, User, UserRole},
};

pub const PIXEL: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABAgMAAABieywaAAAACVBMVEUAAAD///9fX1/S0ecCAAAACXBIWXMAAA7EAAAOxAGVKw4bAAAACklEQVQImWNoAAAAggCByxOyYQAAAABJRU5ErkJggg==";

pub async fn user(username: &str, pool: &Pool<Postgres>) -> User {
    sqlx::query_as(
        "
        INSERT INTO users (email, username, first_name, last_name, password)
        VALUES ($1, $2, 'Test', 'Cook', 'not-a-hash')
        RETURNING *
    ",
    )
    .bind(format!("{username}@example.com"))
    .bind(username)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub fn session(user: &User) -> SessionData {
    SessionData {
        user_id: user.id,
        username: user.username.to_owned(),
        role: UserRole::User,
        is_admin: false,
    }
}

pub async fn tag(slug: &str, pool: &Pool<Postgres>) -> Tag {
    sqlx::query_as("INSERT INTO tags (name, slug) VALUES ($1, $1) RETURNING *")
        .bind(slug)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn ingredient(name: &str, unit: &str, pool: &Pool<Postgres>) -> Ingredient {
    sqlx::query_as("INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING *")
        .bind(name)
        .bind(unit)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// A recipe with the given ingredient amounts and no tags or image file.
pub async fn recipe(
    author: &User,
    name: &str,
    ingredients: &[(Id, i32)],
    pool: &Pool<Postgres>,
) -> Recipe {
    let recipe: Recipe = sqlx::query_as(
        "
        INSERT INTO recipes (author_id, name, image, text, cooking_time)
        VALUES ($1, $2, '/media/recipes/none.png', 'Cook it.', 10)
        RETURNING *
    ",
    )
    .bind(author.id)
    .bind(name)
    .fetch_one(pool)
    .await
    .unwrap();

    for (ingredient_id, amount) in ingredients {
        sqlx::query(
            "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount) VALUES ($1, $2, $3)",
        )
        .bind(recipe.id)
        .bind(ingredient_id)
        .bind(amount)
        .execute(pool)
        .await
        .unwrap();
    }

    recipe
}

pub fn media_root() -> PathBuf {
    std::env::temp_dir().join(format!("foodgram-media-{}", uuid::Uuid::new_v4()))
}

/// Number of files stored below `root/folder`.
pub fn stored_files(root: &Path, folder: &str) -> usize {
    std::fs::read_dir(root.join(folder))
        .map(|entries| entries.count())
        .unwrap_or(0)
}
