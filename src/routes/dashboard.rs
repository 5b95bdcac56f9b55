use super::State;
use crate::auth;
use crate::compose::PageQuery;
use crate::error::Result;
use crate::response::ok;
use crate::views;
use actix_identity::Identity;
use actix_web::{web, HttpResponse};

async fn stats(id: Identity, state: State) -> Result<HttpResponse> {
    let stats = views::channel_stats(&state.store, auth::viewer(&id))?;
    Ok(ok(stats, "Channel stats fetched successfully"))
}

async fn videos(query: web::Query<PageQuery>, id: Identity, state: State) -> Result<HttpResponse> {
    let page = views::channel_videos(&state.store, auth::viewer(&id), query.into_inner().into())?;
    Ok(ok(page, "Channel videos fetched successfully"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/stats", web::get().to(stats))
        .route("/videos", web::get().to(videos));
}
