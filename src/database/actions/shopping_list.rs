use std::collections::BTreeMap;

use chrono::NaiveDate;
use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, QueryError},
    schema::{CartIngredientRow, Id, ShoppingListItem},
};

/// Every ingredient occurrence of every recipe in the user's cart.
pub async fn fetch_cart_ingredients(
    user_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Vec<CartIngredientRow>, Error> {
    let rows: Vec<CartIngredientRow> = sqlx::query_as(
        "
        SELECT i.name, i.measurement_unit, ri.amount
        FROM shopping_cart c
        INNER JOIN recipe_ingredients ri ON ri.recipe_id = c.recipe_id
        INNER JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE c.user_id = $1
    ",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows)
}

/// Sums amounts per (name, unit). The result is ordered by name, then unit,
/// whatever the order of `rows`.
pub fn aggregate_shopping_list(rows: Vec<CartIngredientRow>) -> Vec<ShoppingListItem> {
    let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();
    for row in rows {
        *totals
            .entry((row.name, row.measurement_unit))
            .or_insert(0) += i64::from(row.amount);
    }

    totals
        .into_iter()
        .map(|((name, measurement_unit), amount)| ShoppingListItem {
            name,
            measurement_unit,
            amount,
        })
        .collect()
}

pub fn render_shopping_list(date: NaiveDate, items: &[ShoppingListItem]) -> String {
    let mut document = format!("Shopping list for {}:", date.format("%Y-%m-%d"));
    for item in items {
        document.push_str(&format!(
            "\n{} - {} {}.",
            item.name, item.amount, item.measurement_unit
        ));
    }

    document
}

pub fn shopping_list_file_name(date: NaiveDate) -> String {
    format!("shop_list_{}.txt", date.format("%Y-%m-%d"))
}

pub async fn build_shopping_list(
    user_id: Id,
    date: NaiveDate,
    pool: &Pool<Postgres>,
) -> Result<String, Error> {
    let rows = fetch_cart_ingredients(user_id, pool).await?;
    let items = aggregate_shopping_list(rows);

    log::trace!("> Shopping list of user {user_id} has {} lines", items.len());
    Ok(render_shopping_list(date, &items))
}
