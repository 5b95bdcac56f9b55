//! HTTP surface under `/api/v1`.

mod comments;
mod dashboard;
mod likes;
mod playlists;
mod subscriptions;
mod users;
mod videos;

use crate::database::Store;
use crate::error::Error;
use crate::media::MediaStorage;
use actix_web::web;
use std::sync::Arc;

pub struct AppState {
    pub store: Store,
    pub media: Arc<dyn MediaStorage>,
    pub bcrypt_cost: u32,
}

type State = web::Data<AppState>;

/// Registers every route, and makes extractor failures answer with the
/// failure envelope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| Error::validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| Error::validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| Error::validation(err.to_string()).into()),
    )
    .service(
        web::scope("/api/v1")
            .service(web::scope("/users").configure(users::configure))
            .service(web::scope("/videos").configure(videos::configure))
            .service(web::scope("/comments").configure(comments::configure))
            .service(web::scope("/likes").configure(likes::configure))
            .service(web::scope("/subscriptions").configure(subscriptions::configure))
            .service(web::scope("/playlist").configure(playlists::configure))
            .service(web::scope("/dashboard").configure(dashboard::configure)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::FakeStorage;
    use actix_identity::{CookieIdentityPolicy, IdentityService};
    use actix_web::body::MessageBody;
    use actix_web::dev::ServiceResponse;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use serde_json::{json, Value};

    macro_rules! test_app {
        () => {
            test::init_service(
                App::new()
                    .wrap(IdentityService::new(
                        CookieIdentityPolicy::new(&[0; 32])
                            .name("auth-cookie")
                            .secure(false),
                    ))
                    .app_data(web::Data::new(AppState {
                        store: Store::temporary().unwrap(),
                        media: Arc::new(FakeStorage::default()),
                        bcrypt_cost: 4,
                    }))
                    .configure(configure),
            )
            .await
        };
    }

    /// Registers `$username` and returns its identity cookie.
    macro_rules! sign_up {
        ($app:expr, $username:expr) => {{
            let req = test::TestRequest::post()
                .uri("/api/v1/users/register")
                .set_json(json!({
                    "fullName": $username,
                    "email": format!("{}@example.com", $username),
                    "username": $username,
                    "password": "secret",
                    "avatar": "avatar.png",
                }))
                .to_request();
            let resp = test::call_service($app, req).await;
            assert_eq!(resp.status(), StatusCode::CREATED);

            let req = test::TestRequest::post()
                .uri("/api/v1/users/login")
                .set_json(json!({ "username": $username, "password": "secret" }))
                .to_request();
            let resp = test::call_service($app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            let cookie = resp
                .response()
                .cookies()
                .find(|c| c.name() == "auth-cookie")
                .map(|c| c.into_owned());
            cookie.unwrap()
        }};
    }

    async fn body<B: MessageBody>(resp: ServiceResponse<B>) -> Value {
        test::read_body_json(resp).await
    }

    #[actix_rt::test]
    async fn missing_channel_is_404_envelope() {
        let app = test_app!();
        let req = test::TestRequest::get()
            .uri("/api/v1/users/channel/nobody")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["statusCode"], 404);
        assert_eq!(body["errors"][0], "Channel does not exist");
    }

    #[actix_rt::test]
    async fn anonymous_writes_are_unauthorized() {
        let app = test_app!();
        let req = test::TestRequest::post()
            .uri("/api/v1/likes/toggle/v/1")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn bad_path_is_validation_error() {
        let app = test_app!();
        let req = test::TestRequest::get()
            .uri("/api/v1/videos/not-a-number")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(resp).await["success"], false);
    }

    #[actix_rt::test]
    async fn wrong_password_is_unauthorized() {
        let app = test_app!();
        sign_up!(&app, "ann");
        let req = test::TestRequest::post()
            .uri("/api/v1/users/login")
            .set_json(json!({ "email": "ann@example.com", "password": "nope" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_rt::test]
    async fn publish_like_and_view() {
        let app = test_app!();
        let owner = sign_up!(&app, "owner");
        let fan = sign_up!(&app, "fan");

        let req = test::TestRequest::post()
            .uri("/api/v1/videos")
            .cookie(owner.clone())
            .set_json(json!({
                "title": "First",
                "description": "hello world",
                "videoFile": "first.mp4",
                "thumbnail": "first.png",
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let video = body(resp).await["data"]["_id"].as_u64().unwrap();

        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/likes/toggle/v/{}", video))
            .cookie(fan.clone())
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body(resp).await["message"], "Video liked");

        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/videos/{}", video))
            .cookie(fan.clone())
            .to_request();
        let detail = body(test::call_service(&app, req).await).await;
        assert_eq!(detail["data"]["likesCount"], 1);
        assert_eq!(detail["data"]["isLiked"], true);
        assert_eq!(detail["data"]["owner"]["username"], "owner");

        let req = test::TestRequest::delete()
            .uri(&format!("/api/v1/videos/{}", video))
            .cookie(fan)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/api/v1/videos?page=1&limit=5")
            .to_request();
        let listing = body(test::call_service(&app, req).await).await;
        assert_eq!(listing["data"]["totalDocs"], 1);
        assert_eq!(listing["data"]["limit"], 5);

        let req = test::TestRequest::get()
            .uri("/api/v1/dashboard/stats")
            .cookie(owner)
            .to_request();
        let stats = body(test::call_service(&app, req).await).await;
        assert_eq!(stats["data"]["totalLikes"], 1);
        assert_eq!(stats["data"]["totalViews"], 1);
    }

    #[actix_rt::test]
    async fn current_user_and_logout() {
        let app = test_app!();
        let cookie = sign_up!(&app, "ann");
        let req = test::TestRequest::get()
            .uri("/api/v1/users/get-current-user")
            .cookie(cookie.clone())
            .to_request();
        let me = body(test::call_service(&app, req).await).await;
        assert_eq!(me["data"]["username"], "ann");
        assert!(me["data"].get("passwordHash").is_none());

        let req = test::TestRequest::post()
            .uri("/api/v1/users/logout")
            .cookie(cookie)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_rt::test]
    async fn avatar_replacement() {
        let app = test_app!();
        let cookie = sign_up!(&app, "ann");
        let req = test::TestRequest::patch()
            .uri("/api/v1/users/update-avatar")
            .cookie(cookie.clone())
            .set_json(json!({ "avatar": "fresh.png" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let user = body(resp).await;
        assert_eq!(user["data"]["avatar"], "http://media.test/fresh.png");
        assert_eq!(user["data"]["avatarPublicId"], "fake-1");

        let req = test::TestRequest::patch()
            .uri("/api/v1/users/update-cover-image")
            .cookie(cookie)
            .set_json(json!({}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }
}
