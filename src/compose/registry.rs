//! Named response shapes.

use super::{JoinSpec, SortKey, Stage};
use crate::database::{Collection, ID_FIELD};

#[derive(Clone, Debug, PartialEq)]
pub struct ViewSpec {
    pub name: &'static str,
    pub collection: Collection,
    pub stages: Vec<Stage>,
    /// Default order of the base set.
    pub sort: Vec<SortKey>,
    pub paginated: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewName {
    ChannelProfile,
    WatchHistory,
    VideoListing,
    VideoDetail,
    ChannelVideos,
    VideoComments,
    LikedVideos,
    ChannelSubscribers,
    SubscribedChannels,
    UserPlaylists,
    PlaylistDetail,
}

const USER_SUMMARY: &[&str] = &["username", "fullName", "avatar"];

fn join(
    from: Collection,
    local_field: &'static str,
    foreign_field: &'static str,
    as_field: &'static str,
    children: Vec<Stage>,
) -> Stage {
    Stage::Join {
        spec: JoinSpec {
            from,
            local_field,
            foreign_field,
            as_field,
        },
        children,
    }
}

/// Replaces the user id in `field` by a username, fullName, avatar summary.
fn user_summary(field: &'static str) -> Vec<Stage> {
    vec![
        join(
            Collection::Users,
            field,
            ID_FIELD,
            field,
            vec![Stage::Project(USER_SUMMARY)],
        ),
        Stage::First { field },
    ]
}

/// Likes of the record, folded into `likesCount` and `isLiked`.
fn like_stats(foreign_field: &'static str) -> Vec<Stage> {
    vec![
        join(
            Collection::Likes,
            ID_FIELD,
            foreign_field,
            "likes",
            vec![Stage::Project(&["likedBy"])],
        ),
        Stage::Count {
            relation: "likes",
            into: "likesCount",
        },
        Stage::Flag {
            relation: "likes",
            key: "likedBy",
            into: "isLiked",
        },
        Stage::Exclude(&["likes"]),
    ]
}

/// Videos of a playlist or history in stored order, each with its owner.
fn video_list(field: &'static str) -> Stage {
    join(Collection::Videos, field, ID_FIELD, field, user_summary("owner"))
}

fn newest_first() -> Vec<SortKey> {
    vec![SortKey::desc(ID_FIELD)]
}

impl ViewName {
    #[cfg(test)]
    pub const ALL: [ViewName; 11] = [
        ViewName::ChannelProfile,
        ViewName::WatchHistory,
        ViewName::VideoListing,
        ViewName::VideoDetail,
        ViewName::ChannelVideos,
        ViewName::VideoComments,
        ViewName::LikedVideos,
        ViewName::ChannelSubscribers,
        ViewName::SubscribedChannels,
        ViewName::UserPlaylists,
        ViewName::PlaylistDetail,
    ];

    pub fn spec(self) -> ViewSpec {
        match self {
            ViewName::ChannelProfile => ViewSpec {
                name: "channel_profile",
                collection: Collection::Users,
                stages: vec![
                    join(Collection::Subscriptions, ID_FIELD, "channel", "subscribers", vec![]),
                    join(
                        Collection::Subscriptions,
                        ID_FIELD,
                        "subscriber",
                        "subscribedTo",
                        vec![],
                    ),
                    Stage::Count {
                        relation: "subscribers",
                        into: "subscribersCount",
                    },
                    Stage::Count {
                        relation: "subscribedTo",
                        into: "channelsSubscribedToCount",
                    },
                    Stage::Flag {
                        relation: "subscribers",
                        key: "subscriber",
                        into: "isSubscribed",
                    },
                    Stage::Project(&[
                        "fullName",
                        "username",
                        "email",
                        "avatar",
                        "coverImage",
                        "subscribersCount",
                        "channelsSubscribedToCount",
                        "isSubscribed",
                    ]),
                ],
                sort: vec![],
                paginated: false,
            },
            ViewName::WatchHistory => ViewSpec {
                name: "watch_history",
                collection: Collection::Users,
                stages: vec![video_list("watchHistory"), Stage::Project(&["watchHistory"])],
                sort: vec![],
                paginated: false,
            },
            ViewName::VideoListing => ViewSpec {
                name: "video_listing",
                collection: Collection::Videos,
                stages: user_summary("owner"),
                sort: newest_first(),
                paginated: true,
            },
            ViewName::VideoDetail => {
                let mut stages = like_stats("video");
                stages.push(join(
                    Collection::Users,
                    "owner",
                    ID_FIELD,
                    "owner",
                    vec![
                        join(Collection::Subscriptions, ID_FIELD, "channel", "subscribers", vec![]),
                        Stage::Count {
                            relation: "subscribers",
                            into: "subscribersCount",
                        },
                        Stage::Flag {
                            relation: "subscribers",
                            key: "subscriber",
                            into: "isSubscribed",
                        },
                        Stage::Project(&[
                            "username",
                            "fullName",
                            "avatar",
                            "subscribersCount",
                            "isSubscribed",
                        ]),
                    ],
                ));
                stages.push(Stage::First { field: "owner" });
                ViewSpec {
                    name: "video_detail",
                    collection: Collection::Videos,
                    stages,
                    sort: vec![],
                    paginated: false,
                }
            }
            ViewName::ChannelVideos => ViewSpec {
                name: "channel_videos",
                collection: Collection::Videos,
                stages: like_stats("video"),
                sort: newest_first(),
                paginated: true,
            },
            ViewName::VideoComments => {
                let mut stages = user_summary("owner");
                stages.extend(like_stats("comment"));
                ViewSpec {
                    name: "video_comments",
                    collection: Collection::Comments,
                    stages,
                    sort: newest_first(),
                    paginated: true,
                }
            }
            ViewName::LikedVideos => ViewSpec {
                name: "liked_videos",
                collection: Collection::Likes,
                stages: vec![
                    video_list("video"),
                    Stage::First { field: "video" },
                    Stage::Project(&["video", "likedBy"]),
                ],
                sort: newest_first(),
                paginated: true,
            },
            ViewName::ChannelSubscribers => ViewSpec {
                name: "channel_subscribers",
                collection: Collection::Subscriptions,
                stages: vec![
                    join(
                        Collection::Users,
                        "subscriber",
                        ID_FIELD,
                        "subscriber",
                        vec![
                            join(
                                Collection::Subscriptions,
                                ID_FIELD,
                                "channel",
                                "subscribers",
                                vec![],
                            ),
                            Stage::Flag {
                                relation: "subscribers",
                                key: "subscriber",
                                into: "subscribedToSubscriber",
                            },
                            Stage::Project(&[
                                "username",
                                "fullName",
                                "avatar",
                                "subscribedToSubscriber",
                            ]),
                        ],
                    ),
                    Stage::First {
                        field: "subscriber",
                    },
                ],
                sort: newest_first(),
                paginated: true,
            },
            ViewName::SubscribedChannels => ViewSpec {
                name: "subscribed_channels",
                collection: Collection::Subscriptions,
                stages: user_summary("channel"),
                sort: newest_first(),
                paginated: true,
            },
            ViewName::UserPlaylists => ViewSpec {
                name: "user_playlists",
                collection: Collection::Playlists,
                stages: vec![
                    video_list("videos"),
                    Stage::Count {
                        relation: "videos",
                        into: "totalVideos",
                    },
                ],
                sort: newest_first(),
                paginated: false,
            },
            ViewName::PlaylistDetail => {
                let mut stages = vec![
                    video_list("videos"),
                    Stage::Count {
                        relation: "videos",
                        into: "totalVideos",
                    },
                ];
                stages.extend(user_summary("owner"));
                ViewSpec {
                    name: "playlist_detail",
                    collection: Collection::Playlists,
                    stages,
                    sort: vec![],
                    paginated: false,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Folds must only read relations joined earlier on the same level.
    fn check(stages: &[Stage], view: &str) {
        let mut joined: Vec<&str> = Vec::new();
        for stage in stages {
            match stage {
                Stage::Join { spec, children } => {
                    check(children, view);
                    joined.push(spec.as_field);
                }
                Stage::Count { relation, .. } | Stage::Flag { relation, .. } => {
                    assert!(joined.contains(relation), "{}: {} not joined", view, relation)
                }
                Stage::First { field } => {
                    assert!(joined.contains(field), "{}: {} not joined", view, field)
                }
                Stage::Project(_) | Stage::Exclude(_) => {}
            }
        }
    }

    #[test]
    fn every_view_is_well_formed() {
        for name in ViewName::ALL.iter() {
            let spec = name.spec();
            check(&spec.stages, spec.name);
        }
    }

    #[test]
    fn view_names_are_distinct() {
        let mut names: Vec<_> = ViewName::ALL.iter().map(|v| v.spec().name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ViewName::ALL.len());
    }

    #[test]
    fn only_lists_paginate() {
        assert!(ViewName::VideoComments.spec().paginated);
        assert!(!ViewName::ChannelProfile.spec().paginated);
        assert!(!ViewName::PlaylistDetail.spec().paginated);
    }
}
