use chrono::Local;
use serde_json::json;
use warp::{filters::BoxedFilter, http::StatusCode, reply::Response, Filter, Rejection, Reply};

use crate::{
    actions::{
        absolute_url, add_edge, build_recipe_view, build_recipe_views, build_shopping_list,
        create_recipe, delete_recipe, fetch_recipes, get_recipe, get_recipe_view,
        recipe_full_url, remove_edge, resolve_or_create, shopping_list_file_name, update_recipe,
        EdgeTable, Favorites, RecipeFilter, ShoppingCart,
    },
    authentication::{
        middleware::{with_possible_session, with_session},
        permissions::ActionType,
    },
    error::{Error, HtmlError},
    form::Form,
    jwt::SessionData,
    pagination::PageRequest,
    schema::Id,
    validation::RecipeForm,
};

use super::{
    json_body, no_content, reply_json, with_base_url, with_context, with_form, with_origin,
    Context,
};

async fn handle_list(
    form: Form,
    session: Option<SessionData>,
    base_url: String,
    ctx: Context,
) -> Result<Response, Rejection> {
    let filter = RecipeFilter {
        author: form.get_number::<Id>("author").map_err(Error::from)?,
        tags: form.get_all("tags"),
    };
    let request = PageRequest::from_form(&form, ctx.config.page_size);

    let mut page = fetch_recipes(&filter, request, &base_url, &ctx.pool).await?;
    let recipes = std::mem::take(&mut page.results);

    let viewer = session.map(|s| s.user_id);
    let views = build_recipe_views(recipes, viewer, &ctx.pool).await?;

    Ok(reply_json(&page.with_results(views), StatusCode::OK))
}

async fn handle_create(
    session: SessionData,
    form: RecipeForm,
    ctx: Context,
) -> Result<Response, Rejection> {
    let recipe = create_recipe(form, &session, &ctx.config.media_root, &ctx.pool).await?;
    let view = build_recipe_view(recipe, Some(session.user_id), &ctx.pool).await?;

    Ok(reply_json(&view, StatusCode::CREATED))
}

async fn handle_get(
    id: Id,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<Response, Rejection> {
    let view = get_recipe_view(id, session.map(|s| s.user_id), &ctx.pool).await?;

    Ok(reply_json(&view, StatusCode::OK))
}

async fn handle_update(
    id: Id,
    session: SessionData,
    form: RecipeForm,
    ctx: Context,
) -> Result<Response, Rejection> {
    let recipe = update_recipe(id, form, &session, &ctx.config.media_root, &ctx.pool).await?;
    let view = build_recipe_view(recipe, Some(session.user_id), &ctx.pool).await?;

    Ok(reply_json(&view, StatusCode::OK))
}

async fn handle_delete(
    id: Id,
    session: SessionData,
    ctx: Context,
) -> Result<Response, Rejection> {
    delete_recipe(id, &session, &ctx.config.media_root, &ctx.pool).await?;

    Ok(no_content())
}

async fn add_to<E: EdgeTable>(
    id: Id,
    session: SessionData,
    ctx: Context,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageOwnRelations)?;
    let recipe = add_edge::<E>(session.user_id, id, &ctx.pool).await?;

    Ok(reply_json(&recipe, StatusCode::CREATED))
}

async fn remove_from<E: EdgeTable>(
    id: Id,
    session: SessionData,
    ctx: Context,
) -> Result<Response, Rejection> {
    session.authenticate(ActionType::ManageOwnRelations)?;
    remove_edge::<E>(session.user_id, id, &ctx.pool).await?;

    Ok(no_content())
}

async fn download_shopping_cart(
    session: SessionData,
    ctx: Context,
) -> Result<Response, Rejection> {
    let today = Local::now().date_naive();
    let document = build_shopping_list(session.user_id, today, &ctx.pool).await?;

    Ok(warp::reply::with_header(
        document,
        "content-disposition",
        format!("attachment; filename={}", shopping_list_file_name(today)),
    )
    .into_response())
}

async fn get_link(id: Id, origin: String, ctx: Context) -> Result<Response, Rejection> {
    let recipe = get_recipe(id, &ctx.pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No recipe with this id."))?;

    let short_url = resolve_or_create(
        &recipe_full_url(recipe.id),
        ctx.config.short_link_key,
        &origin,
        &ctx.pool,
    )
    .await?;

    Ok(reply_json(
        &json!({ "short-link": absolute_url(&short_url, &origin) }),
        StatusCode::OK,
    ))
}

/// Routes for `/api/recipes/`.
pub fn routes(ctx: Context) -> BoxedFilter<(Response,)> {
    let config = ctx.config.clone();

    let list = warp::path!("api" / "recipes")
        .and(warp::get())
        .and(with_form())
        .and(with_possible_session(config.clone()))
        .and(with_base_url(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_list);

    let create = warp::path!("api" / "recipes")
        .and(warp::post())
        .and(with_session(config.clone()))
        .and(json_body::<RecipeForm>())
        .and(with_context(ctx.clone()))
        .and_then(handle_create);

    let get = warp::path!("api" / "recipes" / Id)
        .and(warp::get())
        .and(with_possible_session(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_get);

    let update = warp::path!("api" / "recipes" / Id)
        .and(warp::patch())
        .and(with_session(config.clone()))
        .and(json_body::<RecipeForm>())
        .and(with_context(ctx.clone()))
        .and_then(handle_update);

    let delete = warp::path!("api" / "recipes" / Id)
        .and(warp::delete())
        .and(with_session(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_delete);

    let favorite = warp::path!("api" / "recipes" / Id / "favorite")
        .and(warp::post())
        .and(with_session(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(add_to::<Favorites>);

    let unfavorite = warp::path!("api" / "recipes" / Id / "favorite")
        .and(warp::delete())
        .and(with_session(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(remove_from::<Favorites>);

    let add_to_cart = warp::path!("api" / "recipes" / Id / "shopping_cart")
        .and(warp::post())
        .and(with_session(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(add_to::<ShoppingCart>);

    let remove_from_cart = warp::path!("api" / "recipes" / Id / "shopping_cart")
        .and(warp::delete())
        .and(with_session(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(remove_from::<ShoppingCart>);

    let download = warp::path!("api" / "recipes" / "download_shopping_cart")
        .and(warp::get())
        .and(with_session(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(download_shopping_cart);

    let link = warp::path!("api" / "recipes" / Id / "get-link")
        .and(warp::get())
        .and(with_origin(config))
        .and(with_context(ctx))
        .and_then(get_link);

    list.or(create)
        .unify()
        .or(get)
        .unify()
        .or(update)
        .unify()
        .or(delete)
        .unify()
        .or(favorite)
        .unify()
        .or(unfavorite)
        .unify()
        .or(add_to_cart)
        .unify()
        .or(remove_from_cart)
        .unify()
        .or(download)
        .unify()
        .or(link)
        .unify()
        .boxed()
}
