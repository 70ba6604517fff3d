mod credentials;
mod feeds;
mod folders;
mod schema;
mod starred;
mod subscriptions;
mod types;
mod users;

pub use schema::Database;
pub use types::{
    DatabaseError, FeedRecord, NewFeed, NewStarredStory, NewSubscription, OAuthCredential,
    StarredStory, SubscribedFeed, Subscription, UploadedOpml, User, UserFolders,
};
