use warp::{filters::BoxedFilter, http::StatusCode, reply::Response, Filter, Rejection};

use crate::{
    actions::{get_ingredient, get_tag, list_tags, search_ingredients},
    form::Form,
    schema::Id,
};

use super::{reply_json, with_context, with_form, Context};

async fn handle_tags(ctx: Context) -> Result<Response, Rejection> {
    let tags = list_tags(ctx.cache(), &ctx.pool).await?;

    Ok(reply_json(&tags, StatusCode::OK))
}

async fn handle_tag(id: Id, ctx: Context) -> Result<Response, Rejection> {
    let tag = get_tag(id, ctx.cache(), &ctx.pool).await?;

    Ok(reply_json(&tag, StatusCode::OK))
}

async fn handle_ingredients(form: Form, ctx: Context) -> Result<Response, Rejection> {
    let prefix = form.get_str("name").unwrap_or_default();
    let ingredients = search_ingredients(prefix, ctx.cache(), &ctx.pool).await?;

    Ok(reply_json(&ingredients, StatusCode::OK))
}

async fn handle_ingredient(id: Id, ctx: Context) -> Result<Response, Rejection> {
    let ingredient = get_ingredient(id, ctx.cache(), &ctx.pool).await?;

    Ok(reply_json(&ingredient, StatusCode::OK))
}

/// Read-only routes for `/api/tags/` and `/api/ingredients/`. Neither is paginated.
pub fn routes(ctx: Context) -> BoxedFilter<(Response,)> {
    let tags = warp::path!("api" / "tags")
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handle_tags);

    let tag = warp::path!("api" / "tags" / Id)
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(handle_tag);

    let ingredients = warp::path!("api" / "ingredients")
        .and(warp::get())
        .and(with_form())
        .and(with_context(ctx.clone()))
        .and_then(handle_ingredients);

    let ingredient = warp::path!("api" / "ingredients" / Id)
        .and(warp::get())
        .and(with_context(ctx))
        .and_then(handle_ingredient);

    tags.or(tag)
        .unify()
        .or(ingredients)
        .unify()
        .or(ingredient)
        .unify()
        .boxed()
}
