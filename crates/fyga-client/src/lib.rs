//! Optimistic synchronization core for the fyga social feed.
//!
//! Keeps a local view of posts, likes, comments and the follow graph in sync
//! with a remote [`DocumentStore`](fyga_store::DocumentStore):
//!
//! - live feed subscriptions whose every emission replaces the local list
//!   ([`feed`]);
//! - optimistic mutations that update local state first and roll back on
//!   remote failure ([`optimistic`]);
//! - atomic follow/unfollow and like/unlike transactions ([`graph`]).
//!
//! # Data Flow
//!
//! ```text
//!   UI intent ──▶ FeedClient ──▶ OptimisticEngine ──▶ StateCell (local edit)
//!                     │                 └────────▶ SocialGraph ──▶ DocumentStore
//!                     │                                              │
//!                     └──▶ FeedSubscriptionManager ◀── snapshots ────┘
//!                                     │
//!                                     ▼
//!                         StateCell<FeedViewState> ──watch──▶ observers
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod feed;
pub mod graph;
pub mod optimistic;
pub mod profile;
pub mod profile_view;
pub mod session;
pub mod state;
pub mod view;

pub use client::FeedClient;
pub use config::{ClientConfig, ConfigError, FeedSection, ProfileSection, StoreSection};
pub use error::FeedError;
pub use feed::{FeedSnapshot, FeedStream, FeedSubscriptionManager, load_user_posts, open_feed};
pub use graph::SocialGraph;
pub use optimistic::{
    Mutation, MutationEvent, MutationHandle, MutationScope, Optimistic, OptimisticEngine,
};
pub use profile::{ProfileCache, fetch_profile, register_profile};
pub use profile_view::{ProfileController, ProfileViewState};
pub use session::{Session, StaticSession};
pub use state::StateCell;
pub use view::{FeedStatus, FeedViewState, ViewSlice};
