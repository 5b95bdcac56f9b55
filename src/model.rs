use crate::database::{Collection, Key, Record};
use serde::{Deserialize, Serialize};

pub type Id = u64;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub avatar_public_id: String,
    /// Empty when the user has none.
    pub cover_image: String,
    pub cover_image_public_id: String,
    pub password_hash: String,
    /// Most recently watched first.
    pub watch_history: Vec<Id>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub owner: Id,
    pub video_file: String,
    pub video_public_id: String,
    pub thumbnail: String,
    pub thumbnail_public_id: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub views: u64,
    pub is_published: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub content: String,
    pub video: Id,
    pub owner: Id,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikeTarget {
    Video(Id),
    Comment(Id),
    Tweet(Id),
}

impl LikeTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            LikeTarget::Video(_) => "Video",
            LikeTarget::Comment(_) => "Comment",
            LikeTarget::Tweet(_) => "Tweet",
        }
    }
}

/// Exactly one of `video`, `comment` and `tweet` is set; build through
/// [`Like::new`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub liked_by: Id,
    pub video: Option<Id>,
    pub comment: Option<Id>,
    pub tweet: Option<Id>,
}

impl Like {
    pub fn new(liked_by: Id, target: LikeTarget) -> Like {
        let mut like = Like {
            liked_by,
            video: None,
            comment: None,
            tweet: None,
        };
        match target {
            LikeTarget::Video(id) => like.video = Some(id),
            LikeTarget::Comment(id) => like.comment = Some(id),
            LikeTarget::Tweet(id) => like.tweet = Some(id),
        }
        like
    }

    pub fn target(&self) -> Option<LikeTarget> {
        match (self.video, self.comment, self.tweet) {
            (Some(id), None, None) => Some(LikeTarget::Video(id)),
            (None, Some(id), None) => Some(LikeTarget::Comment(id)),
            (None, None, Some(id)) => Some(LikeTarget::Tweet(id)),
            _ => None,
        }
    }

    pub fn unique_key(liked_by: Id, target: LikeTarget) -> Key {
        let (tag, id): (&[u8], Id) = match target {
            LikeTarget::Video(id) => (b"video", id),
            LikeTarget::Comment(id) => (b"comment", id),
            LikeTarget::Tweet(id) => (b"tweet", id),
        };
        Key::tagged(tag, &[id, liked_by])
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Subscription {
    pub subscriber: Id,
    pub channel: Id,
}

impl Subscription {
    pub fn unique_key(subscriber: Id, channel: Id) -> Key {
        Key::tagged(b"subscription", &[subscriber, channel])
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Playlist {
    pub name: String,
    pub description: String,
    pub videos: Vec<Id>,
    pub owner: Id,
}

/// Records whose owner alone may edit or delete them.
pub trait Owned: Record {
    /// Lowercase noun used in messages, e.g. "video".
    const KIND: &'static str;
    fn owner(&self) -> Id;
}

impl Owned for Video {
    const KIND: &'static str = "video";
    fn owner(&self) -> Id {
        self.owner
    }
}

impl Owned for Comment {
    const KIND: &'static str = "comment";
    fn owner(&self) -> Id {
        self.owner
    }
}

impl Owned for Playlist {
    const KIND: &'static str = "playlist";
    fn owner(&self) -> Id {
        self.owner
    }
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn index_entries(&self) -> Vec<(&'static str, Key)> {
        vec![
            ("username", Key::text(&self.username)),
            ("email", Key::text(&self.email)),
        ]
    }

    fn unique_keys(&self) -> Vec<Key> {
        vec![
            Key::tagged_text(b"username", &self.username),
            Key::tagged_text(b"email", &self.email),
        ]
    }
}

impl Record for Video {
    const COLLECTION: Collection = Collection::Videos;

    fn index_entries(&self) -> Vec<(&'static str, Key)> {
        vec![("owner", Key::id(self.owner))]
    }

    fn search_text(&self) -> Option<String> {
        Some(format!("{} {}", self.title, self.description))
    }
}

impl Record for Comment {
    const COLLECTION: Collection = Collection::Comments;

    fn index_entries(&self) -> Vec<(&'static str, Key)> {
        vec![("video", Key::id(self.video)), ("owner", Key::id(self.owner))]
    }
}

impl Record for Like {
    const COLLECTION: Collection = Collection::Likes;

    fn index_entries(&self) -> Vec<(&'static str, Key)> {
        let mut entries = vec![("likedBy", Key::id(self.liked_by))];
        match self.target() {
            Some(LikeTarget::Video(id)) => entries.push(("video", Key::id(id))),
            Some(LikeTarget::Comment(id)) => entries.push(("comment", Key::id(id))),
            Some(LikeTarget::Tweet(id)) => entries.push(("tweet", Key::id(id))),
            None => {}
        }
        entries
    }

    fn unique_keys(&self) -> Vec<Key> {
        self.target()
            .map(|target| Like::unique_key(self.liked_by, target))
            .into_iter()
            .collect()
    }
}

impl Record for Subscription {
    const COLLECTION: Collection = Collection::Subscriptions;

    fn index_entries(&self) -> Vec<(&'static str, Key)> {
        vec![
            ("channel", Key::id(self.channel)),
            ("subscriber", Key::id(self.subscriber)),
        ]
    }

    fn unique_keys(&self) -> Vec<Key> {
        vec![Subscription::unique_key(self.subscriber, self.channel)]
    }
}

impl Record for Playlist {
    const COLLECTION: Collection = Collection::Playlists;

    fn index_entries(&self) -> Vec<(&'static str, Key)> {
        let mut entries = vec![("owner", Key::id(self.owner))];
        entries.extend(self.videos.iter().map(|id| ("videos", Key::id(*id))));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_has_exactly_one_target() {
        let like = Like::new(7, LikeTarget::Comment(3));
        assert_eq!(like.video, None);
        assert_eq!(like.comment, Some(3));
        assert_eq!(like.tweet, None);
        assert_eq!(like.target(), Some(LikeTarget::Comment(3)));
    }

    #[test]
    fn like_unique_key_separates_target_kinds() {
        assert_ne!(
            Like::unique_key(1, LikeTarget::Video(2)),
            Like::unique_key(1, LikeTarget::Comment(2))
        );
        assert_eq!(
            Like::new(1, LikeTarget::Tweet(9)).unique_keys(),
            vec![Like::unique_key(1, LikeTarget::Tweet(9))]
        );
    }

    #[test]
    fn playlist_indexes_every_video() {
        let playlist = Playlist {
            name: "mix".to_owned(),
            description: String::new(),
            videos: vec![4, 5],
            owner: 1,
        };
        let fields: Vec<_> = playlist.index_entries().into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["owner", "videos", "videos"]);
    }
}
