//! Accounts and the identity cookie.
//!
//! The cookie holds the user id; everything past the handlers only sees a
//! [`Viewer`].

use crate::compose::Viewer;
use crate::database::{abort, document_id, to_document, Collection, Document, Filter, Store};
use crate::error::{Error, Result};
use crate::media::{discard, MediaStorage, Uploads};
use crate::model::*;
use crate::mutation::{optional, required};
use actix_identity::Identity;
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub fn viewer(identity: &Identity) -> Viewer {
    match identity.identity().and_then(|id| id.parse::<Id>().ok()) {
        Some(id) => Viewer::user(id),
        None => Viewer::anonymous(),
    }
}

pub fn remember(identity: &Identity, id: Id) {
    identity.remember(id.to_string());
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    /// Staged local files, handed to media storage.
    pub avatar: Option<PathBuf>,
    pub cover_image: Option<PathBuf>,
}

fn hash_password(password: &str, cost: u32) -> Result<String> {
    bcrypt::hash(password, cost).map_err(|err| Error::upstream(err, "Password hashing error"))
}

fn taken(store: &Store, field: &'static str, value: &str) -> Result<bool> {
    Ok(store
        .find_one(Collection::Users, &Filter::eq(field, value))?
        .is_some())
}

pub fn register(
    store: &Store,
    media: &dyn MediaStorage,
    cost: u32,
    form: &Registration,
) -> Result<(Id, User)> {
    const ALL_FIELDS: &str = "All fields are required";
    let full_name = required(&form.full_name, ALL_FIELDS)?;
    let email = required(&form.email, ALL_FIELDS)?.to_lowercase();
    let username = required(&form.username, ALL_FIELDS)?.to_lowercase();
    required(&form.password, ALL_FIELDS)?;
    if username.contains('@') {
        return Err(Error::validation("Username cannot contain @"));
    }
    if taken(store, "username", &username)? || taken(store, "email", &email)? {
        return Err(Error::conflict(
            "User with this email or username already exists",
        ));
    }
    let avatar_path = form
        .avatar
        .as_ref()
        .ok_or_else(|| Error::validation("Avatar is required"))?;

    let mut uploads = Uploads::new(media);
    let avatar = uploads.upload(avatar_path)?;
    let (cover_image, cover_image_public_id) = match &form.cover_image {
        Some(path) => match uploads.upload(path) {
            Ok(uploaded) => (uploaded.url, uploaded.public_id),
            Err(err) => return uploads.abandon(err),
        },
        None => (String::new(), String::new()),
    };
    let password_hash = match hash_password(&form.password, cost) {
        Ok(hash) => hash,
        Err(err) => return uploads.abandon(err),
    };
    let user = User {
        username,
        email,
        full_name,
        avatar: avatar.url,
        avatar_public_id: avatar.public_id,
        cover_image,
        cover_image_public_id,
        password_hash,
        watch_history: Vec::new(),
    };
    let id = uploads.commit(|| store.insert(&user))?;
    debug!("Registered user {} as {}", user.username, id);
    Ok((id, user))
}

/// Checks a password against the account named by username or email.
pub fn authenticate(store: &Store, login: &str, password: &str) -> Result<(Id, User)> {
    let login = required(login, "Username or email is required")?.to_lowercase();
    let field = if login.contains('@') { "email" } else { "username" };
    let id = store
        .find_one(Collection::Users, &Filter::eq(field, login))?
        .as_ref()
        .and_then(document_id)
        .ok_or_else(|| Error::not_found("User does not exist"))?;
    let user = store
        .get::<User>(id)?
        .ok_or_else(|| Error::not_found("User does not exist"))?;
    let valid = bcrypt::verify(password, &user.password_hash)
        .map_err(|err| Error::upstream(err, "Verification error"))?;
    if !valid {
        return Err(Error::Unauthenticated("Invalid user credentials".to_owned()));
    }
    Ok((id, user))
}

pub fn current_user(store: &Store, viewer: Viewer) -> Result<Document> {
    let id = viewer.require()?;
    let user = store
        .get::<User>(id)?
        .ok_or_else(|| Error::Unauthenticated("Invalid session".to_owned()))?;
    to_document(id, &user)
}

/// Applies `edit` to user `id`. Returns the old and the new version.
fn update_user<F>(store: &Store, id: Id, edit: F) -> Result<(User, User)>
where
    F: Fn(&mut User) -> Result<()>,
{
    store.transaction(|tx| {
        let old = match tx.get::<User>(id)? {
            Some(user) => user,
            None => return abort(Err(Error::Unauthenticated("Invalid session".to_owned()))),
        };
        let mut new = old.clone();
        abort(edit(&mut new))?;
        tx.replace(id, &old, &new)?;
        Ok((old, new))
    })
}

pub fn update_account(
    store: &Store,
    viewer: Viewer,
    full_name: Option<&str>,
    email: Option<&str>,
) -> Result<User> {
    let id = viewer.require()?;
    if full_name.is_none() && email.is_none() {
        return Err(Error::validation("Full name or email is required"));
    }
    let full_name = optional(full_name, "Full name cannot be empty")?;
    let email = optional(email, "Email cannot be empty")?.map(|e| e.to_lowercase());
    let (_, user) = update_user(store, id, |user| {
        if let Some(full_name) = &full_name {
            user.full_name = full_name.clone();
        }
        if let Some(email) = &email {
            user.email = email.clone();
        }
        Ok(())
    })?;
    debug!("User {} updated account details", id);
    Ok(user)
}

/// Which profile image to replace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileImage {
    Avatar,
    CoverImage,
}

impl ProfileImage {
    fn name(self) -> &'static str {
        match self {
            ProfileImage::Avatar => "Avatar",
            ProfileImage::CoverImage => "Cover image",
        }
    }

    /// The url and public id fields of `user` holding this image.
    fn fields(self, user: &mut User) -> (&mut String, &mut String) {
        match self {
            ProfileImage::Avatar => (&mut user.avatar, &mut user.avatar_public_id),
            ProfileImage::CoverImage => (&mut user.cover_image, &mut user.cover_image_public_id),
        }
    }
}

/// Uploads a new avatar or cover image, then deletes the replaced one.
pub fn update_image(
    store: &Store,
    media: &dyn MediaStorage,
    viewer: Viewer,
    image: ProfileImage,
    path: Option<&Path>,
) -> Result<User> {
    let id = viewer.require()?;
    let path = path.ok_or_else(|| Error::validation(format!("{} file is missing", image.name())))?;
    let mut uploads = Uploads::new(media);
    let uploaded = uploads.upload(path)?;
    let (mut old, new) = uploads.commit(|| {
        update_user(store, id, |user| {
            let (url, public_id) = image.fields(user);
            *url = uploaded.url.clone();
            *public_id = uploaded.public_id.clone();
            Ok(())
        })
    })?;
    let (_, old_public_id) = image.fields(&mut old);
    if !old_public_id.is_empty() {
        discard(media, old_public_id);
    }
    debug!("User {} replaced {}", id, image.name().to_lowercase());
    Ok(new)
}

pub fn change_password(
    store: &Store,
    viewer: Viewer,
    old_password: &str,
    new_password: &str,
    cost: u32,
) -> Result<()> {
    let id = viewer.require()?;
    required(new_password, "New password is required")?;
    let user = store
        .get::<User>(id)?
        .ok_or_else(|| Error::Unauthenticated("Invalid session".to_owned()))?;
    let valid = bcrypt::verify(old_password, &user.password_hash)
        .map_err(|err| Error::upstream(err, "Verification error"))?;
    if !valid {
        return Err(Error::validation("Invalid old password"));
    }
    let hash = hash_password(new_password, cost)?;
    update_user(store, id, |user| {
        user.password_hash = hash.clone();
        Ok(())
    })?;
    debug!("User {} changed password", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::FakeStorage;

    fn form(username: &str) -> Registration {
        Registration {
            full_name: "Ann Example".to_owned(),
            email: format!("{}@Example.com", username),
            username: username.to_owned(),
            password: "hunter2".to_owned(),
            avatar: Some(PathBuf::from("avatar.png")),
            cover_image: None,
        }
    }

    #[test]
    fn register_and_login() {
        let store = Store::temporary().unwrap();
        let media = FakeStorage::default();
        let (id, user) = register(&store, &media, 4, &form("Ann")).unwrap();
        assert_eq!(user.username, "ann");
        assert_eq!(user.email, "ann@example.com");
        assert_ne!(user.password_hash, "hunter2");

        assert_eq!(authenticate(&store, "ANN", "hunter2").unwrap().0, id);
        assert_eq!(authenticate(&store, "ann@example.com", "hunter2").unwrap().0, id);
        assert!(matches!(
            authenticate(&store, "ann", "wrong"),
            Err(Error::Unauthenticated(_))
        ));
        assert!(matches!(
            authenticate(&store, "bob", "hunter2"),
            Err(Error::NotFound(_))
        ));

        let me = current_user(&store, Viewer::user(id)).unwrap();
        assert!(me.get("passwordHash").is_none());
    }

    #[test]
    fn duplicate_and_missing_avatar() {
        let store = Store::temporary().unwrap();
        let media = FakeStorage::default();
        register(&store, &media, 4, &form("ann")).unwrap();
        assert!(matches!(
            register(&store, &media, 4, &form("ann")),
            Err(Error::Conflict(_))
        ));
        let mut no_avatar = form("bob");
        no_avatar.avatar = None;
        assert!(matches!(
            register(&store, &media, 4, &no_avatar),
            Err(Error::Validation(_))
        ));
        assert_eq!(media.uploads.lock().unwrap().len(), 1);
    }

    #[test]
    fn account_updates() {
        let store = Store::temporary().unwrap();
        let media = FakeStorage::default();
        let (a, _) = register(&store, &media, 4, &form("ann")).unwrap();
        register(&store, &media, 4, &form("bob")).unwrap();

        let user = update_account(&store, Viewer::user(a), Some("Ann B"), None).unwrap();
        assert_eq!(user.full_name, "Ann B");
        assert!(matches!(
            update_account(&store, Viewer::user(a), None, Some("bob@example.com")),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            update_account(&store, Viewer::anonymous(), Some("x"), None),
            Err(Error::Unauthenticated(_))
        ));

        change_password(&store, Viewer::user(a), "hunter2", "correct horse", 4).unwrap();
        assert!(authenticate(&store, "ann", "correct horse").is_ok());
        assert!(matches!(
            change_password(&store, Viewer::user(a), "hunter2", "again", 4),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn username_with_at_sign_is_rejected() {
        let store = Store::temporary().unwrap();
        let media = FakeStorage::default();
        let mut at = form("ann");
        at.username = "ann@home".to_owned();
        assert!(matches!(
            register(&store, &media, 4, &at),
            Err(Error::Validation(_))
        ));
        assert!(media.uploads.lock().unwrap().is_empty());
    }

    #[test]
    fn replacing_images_discards_the_old_ones() {
        let store = Store::temporary().unwrap();
        let media = FakeStorage::default();
        let (a, user) = register(&store, &media, 4, &form("ann")).unwrap();
        assert_eq!(user.avatar_public_id, "fake-0");
        assert!(user.cover_image_public_id.is_empty());

        let user = update_image(
            &store,
            &media,
            Viewer::user(a),
            ProfileImage::Avatar,
            Some(Path::new("new.png")),
        )
        .unwrap();
        assert_eq!(user.avatar_public_id, "fake-1");
        assert_eq!(user.avatar, "http://media.test/new.png");
        assert_eq!(*media.destroyed.lock().unwrap(), vec!["fake-0"]);

        let user = update_image(
            &store,
            &media,
            Viewer::user(a),
            ProfileImage::CoverImage,
            Some(Path::new("cover.png")),
        )
        .unwrap();
        assert_eq!(user.cover_image_public_id, "fake-2");
        assert_eq!(user.avatar_public_id, "fake-1");
        assert_eq!(*media.destroyed.lock().unwrap(), vec!["fake-0"]);
        assert_eq!(store.get::<User>(a).unwrap().unwrap(), user);
    }

    #[test]
    fn failed_image_update_compensates_upload() {
        let store = Store::temporary().unwrap();
        let media = FakeStorage::default();
        let (a, before) = register(&store, &media, 4, &form("ann")).unwrap();

        assert!(matches!(
            update_image(&store, &media, Viewer::user(a), ProfileImage::Avatar, None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            update_image(
                &store,
                &media,
                Viewer::anonymous(),
                ProfileImage::Avatar,
                Some(Path::new("x.png"))
            ),
            Err(Error::Unauthenticated(_))
        ));
        assert_eq!(media.uploads.lock().unwrap().len(), 1);

        assert!(matches!(
            update_image(
                &store,
                &media,
                Viewer::user(a + 100),
                ProfileImage::CoverImage,
                Some(Path::new("x.png"))
            ),
            Err(Error::Unauthenticated(_))
        ));
        assert_eq!(*media.destroyed.lock().unwrap(), vec!["fake-1"]);
        assert_eq!(store.get::<User>(a).unwrap().unwrap(), before);
    }
}
