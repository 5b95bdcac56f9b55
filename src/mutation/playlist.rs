use super::{not_found, optional, owned, required, update_owned};
use crate::database::{abort, Store};
use crate::error::{Error, Result};
use crate::model::*;
use log::debug;

pub fn create_playlist(
    store: &Store,
    viewer: Id,
    name: &str,
    description: &str,
) -> Result<(Id, Playlist)> {
    let playlist = Playlist {
        name: required(name, "Playlist name is required")?,
        description: description.trim().to_owned(),
        videos: Vec::new(),
        owner: viewer,
    };
    let id = store.insert(&playlist)?;
    debug!("User {} created playlist {}", viewer, id);
    Ok((id, playlist))
}

pub fn update_playlist(
    store: &Store,
    viewer: Id,
    id: Id,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Playlist> {
    if name.is_none() && description.is_none() {
        return Err(Error::validation("Name or description is required"));
    }
    let name = optional(name, "Playlist name is required")?;
    let description = description.map(|d| d.trim().to_owned());
    let (_, playlist) = update_owned::<Playlist, _>(store, id, viewer, "update", |playlist| {
        if let Some(name) = &name {
            playlist.name = name.clone();
        }
        if let Some(description) = &description {
            playlist.description = description.clone();
        }
        Ok(())
    })?;
    debug!("User {} updated playlist {}", viewer, id);
    Ok(playlist)
}

pub fn delete_playlist(store: &Store, viewer: Id, id: Id) -> Result<Playlist> {
    let playlist = store.transaction(|tx| {
        let playlist = owned::<Playlist>(tx, id, viewer, "delete")?;
        tx.remove::<Playlist>(id)?;
        Ok(playlist)
    })?;
    debug!("User {} deleted playlist {}", viewer, id);
    Ok(playlist)
}

pub fn add_video(store: &Store, viewer: Id, id: Id, video: Id) -> Result<Playlist> {
    let playlist = store.transaction(|tx| {
        let playlist = owned::<Playlist>(tx, id, viewer, "update")?;
        if !tx.exists::<Video>(video)? {
            return abort(Err(not_found("video")));
        }
        if playlist.videos.contains(&video) {
            return abort(Err(Error::validation("Video already in playlist")));
        }
        let mut extended = playlist.clone();
        extended.videos.push(video);
        tx.replace(id, &playlist, &extended)?;
        Ok(extended)
    })?;
    debug!("User {} added video {} to playlist {}", viewer, video, id);
    Ok(playlist)
}

/// Removing a video that is not in the playlist is not an error.
pub fn remove_video(store: &Store, viewer: Id, id: Id, video: Id) -> Result<Playlist> {
    let (_, playlist) = update_owned::<Playlist, _>(store, id, viewer, "update", |playlist| {
        playlist.videos.retain(|v| *v != video);
        Ok(())
    })?;
    debug!("User {} removed video {} from playlist {}", viewer, video, id);
    Ok(playlist)
}
