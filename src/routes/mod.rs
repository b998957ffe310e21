use std::{convert::Infallible, sync::Arc};

use redis::aio::MultiplexedConnection;
use serde::{de::DeserializeOwned, Serialize};
use sqlx::{Pool, Postgres};
use warp::{
    body::BodyDeserializeError,
    filters::{path::FullPath, BoxedFilter},
    http::StatusCode,
    reject::{
        InvalidQuery, LengthRequired, MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType,
    },
    reply::Response,
    Filter, Rejection, Reply,
};

use crate::{
    config::Config,
    constants::MAX_BODY_SIZE,
    error::Error,
    form::{Form, FormData},
};

pub mod catalog;
pub mod links;
pub mod recipes;
pub mod users;

/// Everything a handler needs besides the request itself.
#[derive(Clone)]
pub struct Context {
    pub pool: Pool<Postgres>,
    pub cache: Option<MultiplexedConnection>,
    pub config: Arc<Config>,
}

impl Context {
    pub fn new(pool: Pool<Postgres>, cache: Option<MultiplexedConnection>, config: Config) -> Self {
        Self {
            pool,
            cache,
            config: Arc::new(config),
        }
    }

    pub fn cache(&self) -> Option<&MultiplexedConnection> {
        self.cache.as_ref()
    }
}

pub fn with_context(ctx: Context) -> impl Filter<Extract = (Context,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

pub fn with_form() -> impl Filter<Extract = (Form,), Error = Rejection> + Clone {
    warp::query::<FormData>().map(Form::from_data)
}

pub fn json_body<T: DeserializeOwned + Send>(
) -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_SIZE).and(warp::body::json())
}

/// `{scheme}://{host}` as seen by the client.
pub fn with_origin(
    config: Arc<Config>,
) -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::header::optional::<String>("host")
        .and(warp::header::optional::<String>("x-forwarded-proto"))
        .map(move |host: Option<String>, proto: Option<String>| {
            let scheme = proto.unwrap_or_else(|| config.public_scheme.to_owned());
            let host = host.unwrap_or_else(|| config.public_host.to_owned());
            format!("{scheme}://{host}")
        })
}

/// Absolute URL of the current path, used for pagination links.
pub fn with_base_url(
    config: Arc<Config>,
) -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    with_origin(config)
        .and(warp::path::full())
        .map(|origin: String, path: FullPath| format!("{origin}{}", path.as_str()))
}

pub fn reply_json<T: Serialize>(value: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

fn detail(message: &str, status: StatusCode) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({ "detail": message })),
        status,
    )
}

/// Renders every rejection as `{"detail": "..."}` with its status.
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    if let Some(e) = err.find::<Error>() {
        return Ok(detail(&e.message(), e.kind.status()));
    }

    if err.is_not_found() {
        return Ok(detail("Not found.", StatusCode::NOT_FOUND));
    }

    if let Some(e) = err.find::<BodyDeserializeError>() {
        return Ok(detail(&format!("Malformed body: {e}"), StatusCode::BAD_REQUEST));
    }

    if err.find::<InvalidQuery>().is_some() {
        return Ok(detail("Malformed query string.", StatusCode::BAD_REQUEST));
    }

    if err.find::<MethodNotAllowed>().is_some() {
        return Ok(detail("Method not allowed.", StatusCode::METHOD_NOT_ALLOWED));
    }

    if err.find::<PayloadTooLarge>().is_some() {
        return Ok(detail("Payload too large.", StatusCode::PAYLOAD_TOO_LARGE));
    }

    if err.find::<LengthRequired>().is_some() {
        return Ok(detail("Content-Length required.", StatusCode::LENGTH_REQUIRED));
    }

    if err.find::<UnsupportedMediaType>().is_some() {
        return Ok(detail(
            "Unsupported media type.",
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ));
    }

    log::error!("> Unhandled rejection: {err:?}");
    Ok(detail(
        "Internal server error",
        StatusCode::INTERNAL_SERVER_ERROR,
    ))
}

fn media(ctx: Context) -> BoxedFilter<(Response,)> {
    warp::path("media")
        .and(warp::get())
        .and(warp::fs::dir(ctx.config.media_root.to_owned()))
        .map(|file: warp::fs::File| file.into_response())
        .boxed()
}

pub fn api(ctx: Context) -> BoxedFilter<(Response,)> {
    recipes::routes(ctx.clone())
        .or(users::routes(ctx.clone()))
        .unify()
        .or(catalog::routes(ctx.clone()))
        .unify()
        .or(links::routes(ctx.clone()))
        .unify()
        .or(media(ctx))
        .unify()
        .boxed()
}

pub fn server(ctx: Context) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    api(ctx)
        .recover(handle_rejection)
        .with(warp::log("foodgram::api"))
}
