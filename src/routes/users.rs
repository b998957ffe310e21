use serde::Deserialize;
use serde_json::json;
use warp::{filters::BoxedFilter, http::StatusCode, reply::Response, Filter, Rejection};

use crate::{
    actions::{
        fetch_users, follow, get_session_user, get_user_by_id, list_subscriptions, login_user,
        register_user, set_avatar, unfollow, user_view, user_views,
    },
    authentication::middleware::{with_possible_session, with_session},
    error::HtmlError,
    form::Form,
    jwt::SessionData,
    media::{save_data_uri, AVATARS},
    pagination::PageRequest,
    schema::{Id, RegisteredUser},
    validation::UserForm,
};

use super::{json_body, no_content, reply_json, with_base_url, with_context, with_form, Context};

#[derive(Debug, Deserialize)]
struct LoginForm {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AvatarForm {
    avatar: Option<String>,
}

async fn handle_register(form: UserForm, ctx: Context) -> Result<Response, Rejection> {
    let user = register_user(form, &ctx.pool).await?;

    Ok(reply_json(&RegisteredUser::from(user), StatusCode::CREATED))
}

async fn handle_list(
    form: Form,
    session: Option<SessionData>,
    base_url: String,
    ctx: Context,
) -> Result<Response, Rejection> {
    let request = PageRequest::from_form(&form, ctx.config.page_size);

    let mut page = fetch_users(request, &base_url, &ctx.pool).await?;
    let users = std::mem::take(&mut page.results);
    let views = user_views(users, session.map(|s| s.user_id), &ctx.pool).await?;

    Ok(reply_json(&page.with_results(views), StatusCode::OK))
}

async fn handle_get(
    id: Id,
    session: Option<SessionData>,
    ctx: Context,
) -> Result<Response, Rejection> {
    let user = get_user_by_id(id, &ctx.pool)
        .await?
        .ok_or_else(|| HtmlError::NotFound.new("No user with this id."))?;
    let view = user_view(user, session.map(|s| s.user_id), &ctx.pool).await?;

    Ok(reply_json(&view, StatusCode::OK))
}

async fn handle_me(session: SessionData, ctx: Context) -> Result<Response, Rejection> {
    let user = get_session_user(&session, &ctx.pool).await?;
    let view = user_view(user, Some(session.user_id), &ctx.pool).await?;

    Ok(reply_json(&view, StatusCode::OK))
}

async fn handle_set_avatar(
    session: SessionData,
    form: AvatarForm,
    ctx: Context,
) -> Result<Response, Rejection> {
    let avatar = form
        .avatar
        .filter(|avatar| !avatar.trim().is_empty())
        .ok_or_else(|| HtmlError::InvalidRequest.new("Field 'avatar' is required."))?;

    let path = save_data_uri(&ctx.config.media_root, AVATARS, &avatar).await?;
    set_avatar(&session, Some(&path), &ctx.pool).await?;

    Ok(reply_json(&json!({ "avatar": path }), StatusCode::OK))
}

async fn handle_delete_avatar(session: SessionData, ctx: Context) -> Result<Response, Rejection> {
    set_avatar(&session, None, &ctx.pool).await?;

    Ok(no_content())
}

async fn handle_subscribe(
    id: Id,
    session: SessionData,
    form: Form,
    ctx: Context,
) -> Result<Response, Rejection> {
    let recipes_limit = form.get_limit("recipes_limit", ctx.config.recipes_limit);
    let subscription = follow(&session, id, recipes_limit, &ctx.pool).await?;

    Ok(reply_json(&subscription, StatusCode::CREATED))
}

async fn handle_unsubscribe(
    id: Id,
    session: SessionData,
    ctx: Context,
) -> Result<Response, Rejection> {
    unfollow(&session, id, &ctx.pool).await?;

    Ok(no_content())
}

async fn handle_subscriptions(
    session: SessionData,
    form: Form,
    base_url: String,
    ctx: Context,
) -> Result<Response, Rejection> {
    let request = PageRequest::from_form(&form, ctx.config.page_size);
    let recipes_limit = form.get_limit("recipes_limit", ctx.config.recipes_limit);

    let page = list_subscriptions(&session, request, recipes_limit, &base_url, &ctx.pool).await?;

    Ok(reply_json(&page, StatusCode::OK))
}

async fn handle_login(form: LoginForm, ctx: Context) -> Result<Response, Rejection> {
    let (email, password) = match (form.email, form.password) {
        (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
            (email, password)
        }
        _ => return Err(HtmlError::InvalidRequest.new("Email and password are required.").into()),
    };

    let token = login_user(
        &email,
        &password,
        &ctx.config.jwt_secret,
        ctx.config.session_hours,
        &ctx.pool,
    )
    .await?;

    Ok(reply_json(&json!({ "auth_token": token }), StatusCode::OK))
}

/// Tokens are stateless and simply expire.
async fn handle_logout(session: SessionData) -> Result<Response, Rejection> {
    log::trace!("> User {} logged out", session.user_id);

    Ok(no_content())
}

/// Routes for `/api/users/` and `/api/auth/token/`.
pub fn routes(ctx: Context) -> BoxedFilter<(Response,)> {
    let config = ctx.config.clone();

    let register = warp::path!("api" / "users")
        .and(warp::post())
        .and(json_body::<UserForm>())
        .and(with_context(ctx.clone()))
        .and_then(handle_register);

    let list = warp::path!("api" / "users")
        .and(warp::get())
        .and(with_form())
        .and(with_possible_session(config.clone()))
        .and(with_base_url(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_list);

    let get = warp::path!("api" / "users" / Id)
        .and(warp::get())
        .and(with_possible_session(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_get);

    let me = warp::path!("api" / "users" / "me")
        .and(warp::get())
        .and(with_session(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_me);

    let set_avatar = warp::path!("api" / "users" / "me" / "avatar")
        .and(warp::put().or(warp::post()).unify())
        .and(with_session(config.clone()))
        .and(json_body::<AvatarForm>())
        .and(with_context(ctx.clone()))
        .and_then(handle_set_avatar);

    let delete_avatar = warp::path!("api" / "users" / "me" / "avatar")
        .and(warp::delete())
        .and(with_session(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_delete_avatar);

    let subscribe = warp::path!("api" / "users" / Id / "subscribe")
        .and(warp::post())
        .and(with_session(config.clone()))
        .and(with_form())
        .and(with_context(ctx.clone()))
        .and_then(handle_subscribe);

    let unsubscribe = warp::path!("api" / "users" / Id / "subscribe")
        .and(warp::delete())
        .and(with_session(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_unsubscribe);

    let subscriptions = warp::path!("api" / "users" / "subscriptions")
        .and(warp::get())
        .and(with_session(config.clone()))
        .and(with_form())
        .and(with_base_url(config.clone()))
        .and(with_context(ctx.clone()))
        .and_then(handle_subscriptions);

    let login = warp::path!("api" / "auth" / "token" / "login")
        .and(warp::post())
        .and(json_body::<LoginForm>())
        .and(with_context(ctx))
        .and_then(handle_login);

    let logout = warp::path!("api" / "auth" / "token" / "logout")
        .and(warp::post())
        .and(with_session(config))
        .and_then(handle_logout);

    register
        .or(list)
        .unify()
        .or(get)
        .unify()
        .or(me)
        .unify()
        .or(set_avatar)
        .unify()
        .or(delete_avatar)
        .unify()
        .or(subscribe)
        .unify()
        .or(unsubscribe)
        .unify()
        .or(subscriptions)
        .unify()
        .or(login)
        .unify()
        .or(logout)
        .unify()
        .boxed()
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use warp::http::StatusCode;

    use crate::routes::{server, testing::*};

    #[tokio::test]
    async fn me_requires_a_session() {
        let response = warp::test::request()
            .path("/api/users/me/")
            .reply(&server(context()))
            .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_registrations_are_rejected() {
        let response = warp::test::request()
            .method("POST")
            .path("/api/users/")
            .json(&json!({
                "email": "cook@example.com",
                "username": "me",
                "first_name": "A",
                "last_name": "B",
                "password": "pass-word-1"
            }))
            .reply(&server(context()))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(&response)["detail"], "Username 'me' is not allowed.");
    }

    #[tokio::test]
    async fn invalid_avatars_are_rejected() {
        let ctx = context();
        for avatar in [json!("plain text"), json!(null), json!("")] {
            let response = warp::test::request()
                .method("PUT")
                .path("/api/users/me/avatar/")
                .header("authorization", token(&ctx, 3))
                .json(&json!({ "avatar": avatar }))
                .reply(&server(ctx.clone()))
                .await;

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{avatar}");
        }
    }

    #[tokio::test]
    async fn login_requires_both_fields() {
        let response = warp::test::request()
            .method("POST")
            .path("/api/auth/token/login/")
            .json(&json!({ "email": "cook@example.com" }))
            .reply(&server(context()))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn logout_is_stateless() {
        let ctx = context();
        let response = warp::test::request()
            .method("POST")
            .path("/api/auth/token/logout/")
            .header("authorization", token(&ctx, 3))
            .reply(&server(ctx))
            .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn subscriptions_require_a_session() {
        for (method, path) in [
            ("GET", "/api/users/subscriptions/"),
            ("POST", "/api/users/2/subscribe/"),
            ("DELETE", "/api/users/2/subscribe/"),
            ("DELETE", "/api/users/me/avatar/"),
        ] {
            let response = warp::test::request()
                .method(method)
                .path(path)
                .reply(&server(context()))
                .await;

            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {path}");
        }
    }
}
