use super::State;
use crate::auth;
use crate::compose::PageQuery;
use crate::database::to_document;
use crate::error::Result;
use crate::model::Id;
use crate::mutation::content;
use crate::response::{created, ok};
use crate::views;
use actix_identity::Identity;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct CommentParams {
    content: String,
}

async fn list(
    video: web::Path<Id>,
    query: web::Query<PageQuery>,
    id: Identity,
    state: State,
) -> Result<HttpResponse> {
    let page = views::video_comments(
        &state.store,
        *video,
        query.into_inner().into(),
        auth::viewer(&id),
    )?;
    Ok(ok(page, "Comments fetched successfully"))
}

async fn add(
    video: web::Path<Id>,
    params: web::Json<CommentParams>,
    id: Identity,
    state: State,
) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id).require()?;
    let (comment_id, comment) =
        content::add_comment(&state.store, viewer, *video, &params.content)?;
    Ok(created(to_document(comment_id, &comment)?, "Comment added successfully"))
}

async fn update(
    comment: web::Path<Id>,
    params: web::Json<CommentParams>,
    id: Identity,
    state: State,
) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id).require()?;
    let updated = content::update_comment(&state.store, viewer, *comment, &params.content)?;
    Ok(ok(to_document(*comment, &updated)?, "Comment updated successfully"))
}

async fn delete(comment: web::Path<Id>, id: Identity, state: State) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id).require()?;
    content::delete_comment(&state.store, viewer, *comment)?;
    Ok(ok(Value::Null, "Comment deleted successfully"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/c/{commentId}", web::patch().to(update))
        .route("/c/{commentId}", web::delete().to(delete))
        .route("/{videoId}", web::get().to(list))
        .route("/{videoId}", web::post().to(add));
}
