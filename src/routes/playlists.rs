use super::State;
use crate::auth;
use crate::database::to_document;
use crate::error::Result;
use crate::model::Id;
use crate::mutation::playlist;
use crate::response::{created, ok};
use crate::views;
use actix_identity::Identity;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct NewPlaylist {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct PlaylistChanges {
    name: Option<String>,
    description: Option<String>,
}

async fn create(params: web::Json<NewPlaylist>, id: Identity, state: State) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id).require()?;
    let (playlist_id, created_playlist) =
        playlist::create_playlist(&state.store, viewer, &params.name, &params.description)?;
    Ok(created(
        to_document(playlist_id, &created_playlist)?,
        "Playlist created successfully",
    ))
}

async fn detail(playlist_id: web::Path<Id>, id: Identity, state: State) -> Result<HttpResponse> {
    let detail = views::playlist_detail(&state.store, *playlist_id, auth::viewer(&id))?;
    Ok(ok(detail, "Playlist fetched successfully"))
}

async fn update(
    playlist_id: web::Path<Id>,
    params: web::Json<PlaylistChanges>,
    id: Identity,
    state: State,
) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id).require()?;
    let updated = playlist::update_playlist(
        &state.store,
        viewer,
        *playlist_id,
        params.name.as_deref(),
        params.description.as_deref(),
    )?;
    Ok(ok(to_document(*playlist_id, &updated)?, "Playlist updated successfully"))
}

async fn delete(playlist_id: web::Path<Id>, id: Identity, state: State) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id).require()?;
    playlist::delete_playlist(&state.store, viewer, *playlist_id)?;
    Ok(ok(Value::Null, "Playlist deleted successfully"))
}

async fn add_video(path: web::Path<(Id, Id)>, id: Identity, state: State) -> Result<HttpResponse> {
    let (video, playlist_id) = path.into_inner();
    let viewer = auth::viewer(&id).require()?;
    let updated = playlist::add_video(&state.store, viewer, playlist_id, video)?;
    Ok(ok(to_document(playlist_id, &updated)?, "Video added to playlist"))
}

async fn remove_video(path: web::Path<(Id, Id)>, id: Identity, state: State) -> Result<HttpResponse> {
    let (video, playlist_id) = path.into_inner();
    let viewer = auth::viewer(&id).require()?;
    let updated = playlist::remove_video(&state.store, viewer, playlist_id, video)?;
    Ok(ok(to_document(playlist_id, &updated)?, "Video removed from playlist"))
}

async fn user_playlists(owner: web::Path<Id>, id: Identity, state: State) -> Result<HttpResponse> {
    let playlists = views::user_playlists(&state.store, *owner, auth::viewer(&id))?;
    Ok(ok(playlists, "User playlists fetched successfully"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::post().to(create))
        .route("/add/{videoId}/{playlistId}", web::patch().to(add_video))
        .route("/remove/{videoId}/{playlistId}", web::patch().to(remove_video))
        .route("/user/{userId}", web::get().to(user_playlists))
        .route("/{playlistId}", web::get().to(detail))
        .route("/{playlistId}", web::patch().to(update))
        .route("/{playlistId}", web::delete().to(delete));
}
