use warp::{filters::BoxedFilter, http::Uri, reply::Response, Filter, Rejection, Reply};

use crate::{
    actions::{resolve, short_url_for},
    error::HtmlError,
};

use super::{with_context, with_origin, Context};

async fn handle_redirect(
    token: String,
    origin: String,
    ctx: Context,
) -> Result<Response, Rejection> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(HtmlError::NotFound.new("Unknown short link.").into());
    }

    let short_url = short_url_for(&token, ctx.config.short_link_key, &origin);
    let full_url = resolve(&short_url, ctx.cache(), &ctx.pool).await?;

    let location: Uri = full_url.parse().map_err(|e| {
        log::error!("> Stored link {full_url} is not a valid URI: {e}");
        HtmlError::InternalServerError.default()
    })?;

    Ok(warp::redirect(location).into_response())
}

/// `GET /s/{token}/` answers with a permanent redirect to the recipe page.
pub fn routes(ctx: Context) -> BoxedFilter<(Response,)> {
    warp::path!("s" / String)
        .and(warp::get())
        .and(with_origin(ctx.config.clone()))
        .and(with_context(ctx))
        .and_then(handle_redirect)
        .boxed()
}
