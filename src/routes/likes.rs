use super::State;
use crate::auth;
use crate::compose::PageQuery;
use crate::database::to_document;
use crate::error::Result;
use crate::model::{Id, LikeTarget};
use crate::mutation::toggle::{self, Toggled};
use crate::response::ok;
use crate::views;
use actix_identity::Identity;
use actix_web::{web, HttpResponse};
use serde_json::json;

fn toggle_like(target: LikeTarget, id: &Identity, state: &State) -> Result<HttpResponse> {
    let viewer = auth::viewer(id).require()?;
    let kind = target.kind();
    Ok(match toggle::toggle_like(&state.store, viewer, target)? {
        Toggled::Created(like_id, like) => ok(to_document(like_id, &like)?, format!("{} liked", kind)),
        Toggled::Removed => ok(json!({}), format!("{} unliked", kind)),
    })
}

async fn video(video: web::Path<Id>, id: Identity, state: State) -> Result<HttpResponse> {
    toggle_like(LikeTarget::Video(*video), &id, &state)
}

async fn comment(comment: web::Path<Id>, id: Identity, state: State) -> Result<HttpResponse> {
    toggle_like(LikeTarget::Comment(*comment), &id, &state)
}

async fn tweet(tweet: web::Path<Id>, id: Identity, state: State) -> Result<HttpResponse> {
    toggle_like(LikeTarget::Tweet(*tweet), &id, &state)
}

async fn liked_videos(query: web::Query<PageQuery>, id: Identity, state: State) -> Result<HttpResponse> {
    let page = views::liked_videos(&state.store, auth::viewer(&id), query.into_inner().into())?;
    Ok(ok(page, "Liked videos fetched successfully"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/toggle/v/{videoId}", web::post().to(video))
        .route("/toggle/c/{commentId}", web::post().to(comment))
        .route("/toggle/t/{tweetId}", web::post().to(tweet))
        .route("/videos", web::get().to(liked_videos));
}
