use super::State;
use crate::auth;
use crate::database::to_document;
use crate::error::Result;
use crate::model::Id;
use crate::mutation::content::{self, NewVideo, VideoChanges};
use crate::response::{created, ok};
use crate::views::{self, VideoQuery};
use actix_identity::Identity;
use actix_web::{web, HttpResponse};
use serde_json::Value;

async fn list(query: web::Query<VideoQuery>, id: Identity, state: State) -> Result<HttpResponse> {
    let page = views::list_videos(&state.store, &query, auth::viewer(&id))?;
    Ok(ok(page, "Videos fetched successfully"))
}

async fn publish(form: web::Json<NewVideo>, id: Identity, state: State) -> Result<HttpResponse> {
    let owner = auth::viewer(&id).require()?;
    let (video_id, video) = content::publish_video(&state.store, state.media.as_ref(), owner, &form)?;
    Ok(created(to_document(video_id, &video)?, "Video uploaded successfully"))
}

async fn detail(video: web::Path<Id>, id: Identity, state: State) -> Result<HttpResponse> {
    let video = views::video_detail(&state.store, *video, auth::viewer(&id))?;
    Ok(ok(video, "Video fetched successfully"))
}

async fn update(
    video: web::Path<Id>,
    form: web::Json<VideoChanges>,
    id: Identity,
    state: State,
) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id).require()?;
    let updated = content::update_video(&state.store, state.media.as_ref(), viewer, *video, &form)?;
    Ok(ok(to_document(*video, &updated)?, "Video updated successfully"))
}

async fn delete(video: web::Path<Id>, id: Identity, state: State) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id).require()?;
    content::delete_video(&state.store, state.media.as_ref(), viewer, *video)?;
    Ok(ok(Value::Null, "Video deleted"))
}

async fn toggle_publish(video: web::Path<Id>, id: Identity, state: State) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id).require()?;
    let updated = content::toggle_publish_status(&state.store, viewer, *video)?;
    let message = if updated.is_published {
        "Video published"
    } else {
        "Video unpublished"
    };
    Ok(ok(to_document(*video, &updated)?, message))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(list))
        .route("", web::post().to(publish))
        .route("/toggle/publish/{videoId}", web::patch().to(toggle_publish))
        .route("/{videoId}", web::get().to(detail))
        .route("/{videoId}", web::patch().to(update))
        .route("/{videoId}", web::delete().to(delete));
}
