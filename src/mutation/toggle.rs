//! Like and subscription toggles.

use super::not_found;
use crate::database::{abort, Store};
use crate::error::{Error, Result};
use crate::model::*;
use log::debug;

/// Which transition a toggle made.
#[derive(Clone, Debug, PartialEq)]
pub enum Toggled<T> {
    Created(Id, T),
    Removed,
}

impl<T> Toggled<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Toggled::Created(..))
    }
}

pub fn toggle_like(store: &Store, viewer: Id, target: LikeTarget) -> Result<Toggled<Like>> {
    let key = Like::unique_key(viewer, target);
    let toggled = store.transaction(|tx| {
        let exists = match target {
            LikeTarget::Video(id) => tx.exists::<Video>(id)?,
            LikeTarget::Comment(id) => tx.exists::<Comment>(id)?,
            LikeTarget::Tweet(_) => true,
        };
        if !exists {
            return abort(Err(not_found(target.kind())));
        }
        match tx.unique::<Like>(&key)? {
            Some(id) => {
                tx.remove::<Like>(id)?;
                Ok(Toggled::Removed)
            }
            None => {
                let like = Like::new(viewer, target);
                let id = tx.insert(&like)?;
                Ok(Toggled::Created(id, like))
            }
        }
    })?;
    debug!("User {} toggled like on {:?}: {:?}", viewer, target, toggled.is_created());
    Ok(toggled)
}

pub fn toggle_subscription(store: &Store, viewer: Id, channel: Id) -> Result<Toggled<Subscription>> {
    if viewer == channel {
        return Err(Error::validation("You cannot subscribe to your own channel"));
    }
    let key = Subscription::unique_key(viewer, channel);
    let toggled = store.transaction(|tx| {
        if !tx.exists::<User>(channel)? {
            return abort(Err(not_found("channel")));
        }
        match tx.unique::<Subscription>(&key)? {
            Some(id) => {
                tx.remove::<Subscription>(id)?;
                Ok(Toggled::Removed)
            }
            None => {
                let subscription = Subscription {
                    subscriber: viewer,
                    channel,
                };
                let id = tx.insert(&subscription)?;
                Ok(Toggled::Created(id, subscription))
            }
        }
    })?;
    debug!("User {} toggled subscription to {}: {:?}", viewer, channel, toggled.is_created());
    Ok(toggled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{Collection, Filter};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn user(store: &Store, name: &str) -> Id {
        store
            .insert(&User {
                username: name.to_owned(),
                email: format!("{}@example.com", name),
                full_name: name.to_owned(),
                avatar: "a.png".to_owned(),
                avatar_public_id: String::new(),
                cover_image: String::new(),
                cover_image_public_id: String::new(),
                password_hash: "hash".to_owned(),
                watch_history: vec![],
            })
            .unwrap()
    }

    fn video(store: &Store, owner: Id) -> Id {
        store
            .insert(&Video {
                owner,
                video_file: "v.mp4".to_owned(),
                video_public_id: "v".to_owned(),
                thumbnail: "t.png".to_owned(),
                thumbnail_public_id: "t".to_owned(),
                title: "title".to_owned(),
                description: "description".to_owned(),
                duration: 3.0,
                views: 0,
                is_published: true,
            })
            .unwrap()
    }

    fn likes(store: &Store) -> usize {
        store.find(Collection::Likes, &Filter::All).unwrap().len()
    }

    #[test]
    fn toggling_twice_restores_state() {
        let store = Store::temporary().unwrap();
        let a = user(&store, "a");
        let v = video(&store, a);
        let first = toggle_like(&store, a, LikeTarget::Video(v)).unwrap();
        assert!(first.is_created());
        assert_eq!(likes(&store), 1);
        assert_eq!(toggle_like(&store, a, LikeTarget::Video(v)).unwrap(), Toggled::Removed);
        assert_eq!(likes(&store), 0);
    }

    #[test]
    fn like_on_missing_target_is_not_found() {
        let store = Store::temporary().unwrap();
        let err = toggle_like(&store, 1, LikeTarget::Comment(99)).unwrap_err();
        assert_eq!(err.to_string(), "Comment not found");
        assert_eq!(likes(&store), 0);
    }

    #[test]
    fn tweet_likes_need_no_stored_target() {
        let store = Store::temporary().unwrap();
        assert!(toggle_like(&store, 1, LikeTarget::Tweet(5)).unwrap().is_created());
    }

    #[test]
    fn self_subscription_is_rejected() {
        let store = Store::temporary().unwrap();
        let a = user(&store, "a");
        assert!(matches!(
            toggle_subscription(&store, a, a),
            Err(Error::Validation(_))
        ));
        assert!(store.find(Collection::Subscriptions, &Filter::All).unwrap().is_empty());
    }

    #[test]
    fn subscription_toggles() {
        let store = Store::temporary().unwrap();
        let a = user(&store, "a");
        let b = user(&store, "b");
        assert!(toggle_subscription(&store, a, b).unwrap().is_created());
        assert!(toggle_subscription(&store, b, a).unwrap().is_created());
        assert_eq!(toggle_subscription(&store, a, b).unwrap(), Toggled::Removed);
        let left = store.find(Collection::Subscriptions, &Filter::All).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0]["subscriber"], b);
        assert!(matches!(
            toggle_subscription(&store, a, 404),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_toggles_never_duplicate() {
        let store = Store::temporary().unwrap();
        let a = user(&store, "a");
        let v = video(&store, a);
        let created = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let created = created.clone();
                let removed = removed.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        match toggle_like(&store, a, LikeTarget::Video(v)).unwrap() {
                            Toggled::Created(..) => created.fetch_add(1, Ordering::SeqCst),
                            Toggled::Removed => removed.fetch_add(1, Ordering::SeqCst),
                        };
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let (created, removed) = (created.load(Ordering::SeqCst), removed.load(Ordering::SeqCst));
        assert_eq!(created + removed, 200);
        assert_eq!(likes(&store), created - removed);
        assert!(likes(&store) <= 1);
    }
}
