//! Read-side operations. Each resolves a registered view and runs it for the
//! requesting viewer.

use crate::compose::{
    aggregate, compose_all, compose_one, compose_page, compose_window, Page, PageQuery,
    PageRequest, SortKey, ViewName, Viewer,
};
use crate::database::{document_id, Collection, Document, Filter, Key, Store, ID_FIELD};
use crate::error::{Error, Result};
use crate::model::*;
use crate::mutation::content::record_view;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

fn missing(what: &str) -> Error {
    Error::not_found(format!("{} not found", what))
}

pub fn channel_profile(store: &Store, username: &str, viewer: Viewer) -> Result<Document> {
    let username = username.trim().to_lowercase();
    if username.is_empty() {
        return Err(Error::validation("Username is missing"));
    }
    compose_one(
        store,
        &ViewName::ChannelProfile.spec(),
        &Filter::eq("username", username),
        viewer,
    )?
    .ok_or_else(|| Error::not_found("Channel does not exist"))
}

/// Most recently watched first, each video with its owner.
pub fn watch_history(store: &Store, viewer: Viewer) -> Result<Vec<Value>> {
    let id = viewer.require()?;
    let mut user = compose_one(store, &ViewName::WatchHistory.spec(), &Filter::id(id), viewer)?
        .ok_or_else(|| missing("User"))?;
    match user.remove("watchHistory") {
        Some(Value::Array(videos)) => Ok(videos),
        _ => Ok(Vec::new()),
    }
}

const SORTABLE: &[&str] = &["views", "duration", "title", ID_FIELD, "score"];

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VideoQuery {
    pub query: Option<String>,
    pub user_id: Option<Id>,
    pub sort_by: Option<String>,
    pub sort_type: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl VideoQuery {
    fn sort(&self, searching: bool) -> Result<Vec<SortKey>> {
        let descending = match self.sort_type.as_deref() {
            None | Some("desc") => true,
            Some("asc") => false,
            Some(_) => return Err(Error::validation("sortType must be asc or desc")),
        };
        let mut sort = Vec::new();
        if let Some(field) = self.sort_by.as_deref() {
            let field = if field == "createdAt" { ID_FIELD } else { field };
            if !SORTABLE.iter().any(|f| *f == field) || (field == "score" && !searching) {
                return Err(Error::validation(format!("Cannot sort by {}", field)));
            }
            sort.push(if descending {
                SortKey::desc(field)
            } else {
                SortKey::asc(field)
            });
        }
        if searching {
            sort.push(SortKey::desc("score"));
            sort.push(SortKey::desc("views"));
        }
        sort.push(SortKey::desc(ID_FIELD));
        Ok(sort)
    }

    fn page_request(&self) -> PageRequest {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
        .into()
    }
}

/// Published videos, optionally matching a search query or restricted to
/// one owner. Search results carry their relevance as `score`.
pub fn list_videos(store: &Store, query: &VideoQuery, viewer: Viewer) -> Result<Page<Document>> {
    let spec = ViewName::VideoListing.spec();
    let mut filters = vec![Filter::eq("isPublished", true)];
    if let Some(owner) = query.user_id {
        filters.push(Filter::eq("owner", owner));
    }
    let mut base = store.find(spec.collection, &Filter::And(filters))?;

    let search = query
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());
    if let Some(text) = search {
        let scores: HashMap<Id, f32> = store.search_videos(text)?.into_iter().collect();
        base = base
            .into_iter()
            .filter_map(|mut video| {
                let score = *document_id(&video).and_then(|id| scores.get(&id))?;
                video.insert("score".to_owned(), Value::from(f64::from(score)));
                Some(video)
            })
            .collect();
    }
    let sort = query.sort(search.is_some())?;
    compose_window(store, &spec, base, &sort, query.page_request(), viewer)
}

/// A single video as its page shows it. Counts the view.
pub fn video_detail(store: &Store, id: Id, viewer: Viewer) -> Result<Document> {
    let video = store.get::<Video>(id)?.ok_or_else(|| missing("Video"))?;
    if !video.is_published && viewer.id() != Some(video.owner) {
        return Err(missing("Video"));
    }
    record_view(store, viewer, id)?;
    compose_one(store, &ViewName::VideoDetail.spec(), &Filter::id(id), viewer)?
        .ok_or_else(|| missing("Video"))
}

pub fn video_comments(
    store: &Store,
    video: Id,
    page: PageRequest,
    viewer: Viewer,
) -> Result<Page<Document>> {
    if store.get::<Video>(video)?.is_none() {
        return Err(missing("Video"));
    }
    compose_page(
        store,
        &ViewName::VideoComments.spec(),
        &Filter::eq("video", video),
        page,
        viewer,
    )
}

pub fn liked_videos(store: &Store, viewer: Viewer, page: PageRequest) -> Result<Page<Document>> {
    let id = viewer.require()?;
    let filter = Filter::And(vec![Filter::eq("likedBy", id), Filter::Exists("video")]);
    compose_page(store, &ViewName::LikedVideos.spec(), &filter, page, viewer)
}

pub fn channel_subscribers(
    store: &Store,
    channel: Id,
    page: PageRequest,
    viewer: Viewer,
) -> Result<Page<Document>> {
    compose_page(
        store,
        &ViewName::ChannelSubscribers.spec(),
        &Filter::eq("channel", channel),
        page,
        viewer,
    )
}

pub fn subscribed_channels(
    store: &Store,
    subscriber: Id,
    page: PageRequest,
    viewer: Viewer,
) -> Result<Page<Document>> {
    compose_page(
        store,
        &ViewName::SubscribedChannels.spec(),
        &Filter::eq("subscriber", subscriber),
        page,
        viewer,
    )
}

pub fn user_playlists(store: &Store, owner: Id, viewer: Viewer) -> Result<Vec<Document>> {
    compose_all(
        store,
        &ViewName::UserPlaylists.spec(),
        &Filter::eq("owner", owner),
        viewer,
    )
}

pub fn playlist_detail(store: &Store, id: Id, viewer: Viewer) -> Result<Document> {
    compose_one(store, &ViewName::PlaylistDetail.spec(), &Filter::id(id), viewer)?
        .ok_or_else(|| missing("Playlist"))
}

/// The viewer's own videos, published or not.
pub fn channel_videos(store: &Store, viewer: Viewer, page: PageRequest) -> Result<Page<Document>> {
    let id = viewer.require()?;
    compose_page(
        store,
        &ViewName::ChannelVideos.spec(),
        &Filter::eq("owner", id),
        page,
        viewer,
    )
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub total_views: u64,
    pub total_videos: u64,
    pub total_likes: u64,
    pub total_subscribers: u64,
}

pub fn channel_stats(store: &Store, viewer: Viewer) -> Result<ChannelStats> {
    let id = viewer.require()?;
    let videos = store.find(Collection::Videos, &Filter::eq("owner", id))?;
    let mut total_likes = 0;
    for video in videos.iter().filter_map(document_id) {
        total_likes += store.lookup(Collection::Likes, "video", &Key::id(video))?.len() as u64;
    }
    Ok(ChannelStats {
        total_views: aggregate::sum(&videos, "views"),
        total_videos: videos.len() as u64,
        total_likes,
        total_subscribers: store
            .lookup(Collection::Subscriptions, "channel", &Key::id(id))?
            .len() as u64,
    })
}
