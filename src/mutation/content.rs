//! Videos, comments and view counting.

use super::{check_owner, not_found, optional, owned, required, update_owned};
use crate::compose::Viewer;
use crate::database::{abort, Key, Store, Tx, TxResult};
use crate::error::{Error, Result};
use crate::media::{discard, MediaStorage, Uploads};
use crate::model::*;
use log::debug;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NewVideo {
    pub title: String,
    pub description: String,
    pub video_file: PathBuf,
    pub thumbnail: PathBuf,
    /// Used when the media host reports no duration.
    pub duration: Option<f64>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<PathBuf>,
}

pub fn publish_video(
    store: &Store,
    media: &dyn MediaStorage,
    owner: Id,
    new: &NewVideo,
) -> Result<(Id, Video)> {
    let title = required(&new.title, "Title and description are required")?;
    let description = required(&new.description, "Title and description are required")?;

    let mut uploads = Uploads::new(media);
    let video_file = uploads.upload(&new.video_file)?;
    let thumbnail = match uploads.upload(&new.thumbnail) {
        Ok(thumbnail) => thumbnail,
        Err(err) => return uploads.abandon(err),
    };
    let video = Video {
        owner,
        duration: video_file.duration.or(new.duration).unwrap_or(0.0),
        video_file: video_file.url,
        video_public_id: video_file.public_id,
        thumbnail: thumbnail.url,
        thumbnail_public_id: thumbnail.public_id,
        title,
        description,
        views: 0,
        is_published: true,
    };
    let id = uploads.commit(|| {
        store.transaction(|tx| {
            if !tx.exists::<User>(owner)? {
                return abort(Err(not_found("user")));
            }
            tx.insert(&video)
        })
    })?;
    debug!("User {} published video {}", owner, id);
    Ok((id, video))
}

pub fn update_video(
    store: &Store,
    media: &dyn MediaStorage,
    viewer: Id,
    id: Id,
    changes: &VideoChanges,
) -> Result<Video> {
    if changes.title.is_none() && changes.description.is_none() && changes.thumbnail.is_none() {
        return Err(Error::validation(
            "At least one field is required to update video",
        ));
    }
    let title = optional(changes.title.as_deref(), "Title cannot be empty")?;
    let description = optional(changes.description.as_deref(), "Description cannot be empty")?;
    check_owner::<Video>(store, id, viewer, "update")?;

    let mut uploads = Uploads::new(media);
    let thumbnail = match &changes.thumbnail {
        Some(path) => Some(uploads.upload(path)?),
        None => None,
    };
    let (old, new) = uploads.commit(|| {
        update_owned::<Video, _>(store, id, viewer, "update", |video| {
            if let Some(title) = &title {
                video.title = title.clone();
            }
            if let Some(description) = &description {
                video.description = description.clone();
            }
            if let Some(thumbnail) = &thumbnail {
                video.thumbnail = thumbnail.url.clone();
                video.thumbnail_public_id = thumbnail.public_id.clone();
            }
            Ok(())
        })
    })?;
    if thumbnail.is_some() {
        discard(media, &old.thumbnail_public_id);
    }
    debug!("User {} updated video {}", viewer, id);
    Ok(new)
}

fn remove_likes(tx: &Tx<'_>, field: &str, target: Id) -> TxResult<()> {
    for like in tx.lookup::<Like>(field, &Key::id(target))? {
        tx.remove::<Like>(like)?;
    }
    Ok(())
}

/// Deletes a video with its likes, its comments and their likes, and its
/// playlist memberships.
pub fn delete_video(store: &Store, media: &dyn MediaStorage, viewer: Id, id: Id) -> Result<Video> {
    let video = store.transaction(|tx| {
        let video = owned::<Video>(tx, id, viewer, "delete")?;
        remove_likes(tx, "video", id)?;
        for comment in tx.lookup::<Comment>("video", &Key::id(id))? {
            remove_likes(tx, "comment", comment)?;
            tx.remove::<Comment>(comment)?;
        }
        for playlist_id in tx.lookup::<Playlist>("videos", &Key::id(id))? {
            if let Some(playlist) = tx.get::<Playlist>(playlist_id)? {
                let mut trimmed = playlist.clone();
                trimmed.videos.retain(|v| *v != id);
                tx.replace(playlist_id, &playlist, &trimmed)?;
            }
        }
        tx.remove::<Video>(id)?;
        Ok(video)
    })?;
    discard(media, &video.video_public_id);
    discard(media, &video.thumbnail_public_id);
    debug!("User {} deleted video {}", viewer, id);
    Ok(video)
}

pub fn toggle_publish_status(store: &Store, viewer: Id, id: Id) -> Result<Video> {
    let (_, video) = update_owned::<Video, _>(store, id, viewer, "update", |video| {
        video.is_published = !video.is_published;
        Ok(())
    })?;
    debug!("Video {} published: {}", id, video.is_published);
    Ok(video)
}

/// Counts a view and, for a signed-in viewer, moves the video to the front
/// of their watch history.
pub fn record_view(store: &Store, viewer: Viewer, id: Id) -> Result<()> {
    store.transaction(|tx| {
        let video = match tx.get::<Video>(id)? {
            Some(video) => video,
            None => return abort(Err(not_found("video"))),
        };
        let mut viewed = video.clone();
        viewed.views += 1;
        tx.replace(id, &video, &viewed)?;
        if let Some(user_id) = viewer.id() {
            if let Some(user) = tx.get::<User>(user_id)? {
                let mut updated = user.clone();
                updated.watch_history.retain(|v| *v != id);
                updated.watch_history.insert(0, id);
                tx.replace(user_id, &user, &updated)?;
            }
        }
        Ok(())
    })
}

pub fn add_comment(store: &Store, viewer: Id, video: Id, content: &str) -> Result<(Id, Comment)> {
    let content = required(content, "Comment content is required")?;
    let comment = Comment {
        content,
        video,
        owner: viewer,
    };
    let id = store.transaction(|tx| {
        if !tx.exists::<Video>(video)? {
            return abort(Err(not_found("video")));
        }
        tx.insert(&comment)
    })?;
    debug!("User {} commented {} on video {}", viewer, id, video);
    Ok((id, comment))
}

pub fn update_comment(store: &Store, viewer: Id, id: Id, content: &str) -> Result<Comment> {
    let content = required(content, "Comment content is required")?;
    let (_, comment) = update_owned::<Comment, _>(store, id, viewer, "change", |comment| {
        comment.content = content.clone();
        Ok(())
    })?;
    debug!("User {} updated comment {}", viewer, id);
    Ok(comment)
}

pub fn delete_comment(store: &Store, viewer: Id, id: Id) -> Result<Comment> {
    let comment = store.transaction(|tx| {
        let comment = owned::<Comment>(tx, id, viewer, "delete")?;
        remove_likes(tx, "comment", id)?;
        tx.remove::<Comment>(id)?;
        Ok(comment)
    })?;
    debug!("User {} deleted comment {}", viewer, id);
    Ok(comment)
}
