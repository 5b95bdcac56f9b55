use super::State;
use crate::auth::{self, ProfileImage, Registration};
use crate::database::to_document;
use crate::error::{Error, Result};
use crate::response::{created, ok};
use crate::views;
use actix_identity::Identity;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;

#[derive(Deserialize)]
struct LoginParams {
    username: Option<String>,
    email: Option<String>,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordParams {
    old_password: String,
    new_password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountParams {
    full_name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct AvatarParams {
    avatar: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoverImageParams {
    cover_image: Option<PathBuf>,
}

async fn register(form: web::Json<Registration>, state: State) -> Result<HttpResponse> {
    let (id, user) = auth::register(&state.store, state.media.as_ref(), state.bcrypt_cost, &form)?;
    Ok(created(to_document(id, &user)?, "User registered successfully"))
}

async fn login(params: web::Json<LoginParams>, id: Identity, state: State) -> Result<HttpResponse> {
    let login = params
        .username
        .as_deref()
        .or(params.email.as_deref())
        .ok_or_else(|| Error::validation("Username or email is required"))?;
    let (user_id, user) = auth::authenticate(&state.store, login, &params.password)?;
    auth::remember(&id, user_id);
    Ok(ok(to_document(user_id, &user)?, "User logged in successfully"))
}

async fn logout(id: Identity) -> HttpResponse {
    id.forget();
    ok(json!({}), "User logged out")
}

async fn current_user(id: Identity, state: State) -> Result<HttpResponse> {
    let user = auth::current_user(&state.store, auth::viewer(&id))?;
    Ok(ok(user, "Current user fetched successfully"))
}

async fn change_password(
    params: web::Json<PasswordParams>,
    id: Identity,
    state: State,
) -> Result<HttpResponse> {
    auth::change_password(
        &state.store,
        auth::viewer(&id),
        &params.old_password,
        &params.new_password,
        state.bcrypt_cost,
    )?;
    Ok(ok(json!({}), "Password changed successfully"))
}

async fn update_account(
    params: web::Json<AccountParams>,
    id: Identity,
    state: State,
) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id);
    let user = auth::update_account(
        &state.store,
        viewer,
        params.full_name.as_deref(),
        params.email.as_deref(),
    )?;
    Ok(ok(
        to_document(viewer.require()?, &user)?,
        "Account details updated successfully",
    ))
}

async fn update_avatar(
    params: web::Json<AvatarParams>,
    id: Identity,
    state: State,
) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id);
    let user = auth::update_image(
        &state.store,
        state.media.as_ref(),
        viewer,
        ProfileImage::Avatar,
        params.avatar.as_deref(),
    )?;
    Ok(ok(to_document(viewer.require()?, &user)?, "Avatar updated successfully"))
}

async fn update_cover_image(
    params: web::Json<CoverImageParams>,
    id: Identity,
    state: State,
) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id);
    let user = auth::update_image(
        &state.store,
        state.media.as_ref(),
        viewer,
        ProfileImage::CoverImage,
        params.cover_image.as_deref(),
    )?;
    Ok(ok(
        to_document(viewer.require()?, &user)?,
        "Cover image updated successfully",
    ))
}

async fn channel_profile(
    username: web::Path<String>,
    id: Identity,
    state: State,
) -> Result<HttpResponse> {
    let profile = views::channel_profile(&state.store, &username, auth::viewer(&id))?;
    Ok(ok(profile, "User channel fetched successfully"))
}

async fn watch_history(id: Identity, state: State) -> Result<HttpResponse> {
    let history = views::watch_history(&state.store, auth::viewer(&id))?;
    Ok(ok(history, "Watch history fetched successfully"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/register", web::post().to(register))
        .route("/login", web::post().to(login))
        .route("/logout", web::post().to(logout))
        .route("/get-current-user", web::get().to(current_user))
        .route("/change-password", web::post().to(change_password))
        .route("/update-account", web::put().to(update_account))
        .route("/update-avatar", web::patch().to(update_avatar))
        .route("/update-cover-image", web::patch().to(update_cover_image))
        .route("/channel/{username}", web::get().to(channel_profile))
        .route("/watch-history", web::get().to(watch_history));
}
