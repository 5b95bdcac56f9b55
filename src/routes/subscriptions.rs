use super::State;
use crate::auth;
use crate::compose::PageQuery;
use crate::database::to_document;
use crate::error::Result;
use crate::model::Id;
use crate::mutation::toggle::{self, Toggled};
use crate::response::ok;
use crate::views;
use actix_identity::Identity;
use actix_web::{web, HttpResponse};
use serde_json::json;

async fn toggle(channel: web::Path<Id>, id: Identity, state: State) -> Result<HttpResponse> {
    let viewer = auth::viewer(&id).require()?;
    Ok(match toggle::toggle_subscription(&state.store, viewer, *channel)? {
        Toggled::Created(sub_id, sub) => ok(to_document(sub_id, &sub)?, "Subscribed successfully"),
        Toggled::Removed => ok(json!({}), "Unsubscribed successfully"),
    })
}

async fn subscribers(
    channel: web::Path<Id>,
    query: web::Query<PageQuery>,
    id: Identity,
    state: State,
) -> Result<HttpResponse> {
    let page = views::channel_subscribers(
        &state.store,
        *channel,
        query.into_inner().into(),
        auth::viewer(&id),
    )?;
    Ok(ok(page, "Subscribers fetched successfully"))
}

async fn subscribed(
    subscriber: web::Path<Id>,
    query: web::Query<PageQuery>,
    id: Identity,
    state: State,
) -> Result<HttpResponse> {
    let page = views::subscribed_channels(
        &state.store,
        *subscriber,
        query.into_inner().into(),
        auth::viewer(&id),
    )?;
    Ok(ok(page, "Subscribed channels fetched successfully"))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/c/{channelId}", web::post().to(toggle))
        .route("/c/{channelId}", web::get().to(subscribers))
        .route("/u/{subscriberId}", web::get().to(subscribed));
}
