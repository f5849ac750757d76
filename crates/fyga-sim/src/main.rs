//! fyga simulator.
//!
//! Runs a scripted social-feed session against the in-memory store and
//! prints the resulting feed: users register and publish, one user follows
//! another, switches to the Followed tab, likes posts concurrently with a
//! second client, comments, and sits through an injected write failure
//! (which rolls back).
//!
//! Usage:
//!   cargo run -p fyga-sim
//!   cargo run -p fyga-sim -- --users 5 --posts-per-user 3 --tab followed
//!   RUST_LOG=fyga_client=debug cargo run -p fyga-sim -- --config fyga.toml

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use fyga_client::{
    ClientConfig, FeedClient, FeedStatus, FeedViewState, StaticSession, register_profile,
};
use fyga_store::MemoryStore;
use fyga_types::{FeedTab, NewPost, Post, ProfileDraft, UserId};
use futures::future::join_all;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

const NAMES: &[&str] = &["ana", "bia", "cris", "duda", "eli", "fabi", "gabi", "hel"];

/// Scripted feed session against an in-memory store.
#[derive(Parser, Debug)]
#[command(name = "fyga-sim")]
#[command(about = "Drive a scripted fyga feed session and print the result")]
struct Args {
    /// TOML config file (missing file = defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of registered users (2..=8)
    #[arg(long, default_value_t = 3)]
    users: usize,

    /// Posts published by each user
    #[arg(long, default_value_t = 2)]
    posts_per_user: usize,

    /// Tab shown at the end (global | followed)
    #[arg(long, default_value_t = FeedTab::Followed)]
    tab: FeedTab,

    /// Seconds to wait for any single feed update
    #[arg(long, default_value_t = 5)]
    wait_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if !(2..=NAMES.len()).contains(&args.users) {
        bail!("--users must be between 2 and {}", NAMES.len());
    }
    let config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    let wait = Duration::from_secs(args.wait_secs);

    let store = Arc::new(MemoryStore::with_config(config.memory_store()));
    let users: Vec<UserId> = (1..=args.users).map(|i| UserId::new(format!("user-{i}"))).collect();

    // Registration and publishing.
    for (user, name) in users.iter().zip(NAMES) {
        let draft = ProfileDraft {
            username: (*name).to_string(),
            bio: format!("{name} posts after midnight"),
            ..Default::default()
        };
        register_profile(store.as_ref(), &config.profile, user, draft).await?;

        let author = client(&store, user, &config);
        author.refresh_profile().await;
        for n in 1..=args.posts_per_user {
            author
                .publish_post(NewPost {
                    image_url: format!("media/{name}-{n}.jpg"),
                    description: format!("{name} #{n}"),
                })
                .await?;
        }
    }
    info!(users = users.len(), posts = users.len() * args.posts_per_user, "store seeded");

    let me = client(&store, &users[0], &config);
    let friend = client(&store, &users[1], &config);
    me.start().await;
    friend.start().await;
    wait_for(&me, wait, |s| s.status == FeedStatus::Ready && s.profile.is_some()).await?;

    // Follow the second user, then look at the Followed tab.
    me.toggle_follow(&users[1])?.wait().await?;
    me.select_tab(FeedTab::Followed);
    let view = wait_for(&me, wait, |s| {
        s.tab == FeedTab::Followed && s.status == FeedStatus::Ready
    })
    .await?;
    info!(posts = view.posts.len(), "followed feed ready");

    // Both clients like every followed post at once.
    let mut likes = Vec::new();
    for post in &view.posts {
        likes.push(me.toggle_like(&post.id)?);
        likes.push(friend.toggle_like(&post.id)?);
    }
    for result in join_all(likes.into_iter().map(|h| h.wait())).await {
        result?;
    }
    wait_for(&me, wait, |s| s.posts.iter().all(|p| p.liked_by.len() == 2)).await?;

    if let Some(first) = view.posts.first() {
        me.add_comment(&first.id, "gorgeous")?.wait().await?;
        wait_for(&me, wait, |s| {
            s.post(&first.id).is_some_and(|p| !p.comments.is_empty())
        })
        .await?;

        // One failed like: the local edit is rolled back.
        store.fail_next_transactions(1);
        let outcome = me.toggle_like(&first.id)?.wait().await;
        info!(rolled_back = outcome.is_err(), "injected failure exercised");
    }

    if args.tab != FeedTab::Followed {
        me.select_tab(args.tab);
    }
    let expected = store_post_count(&args, args.tab);
    let view = wait_for(&me, wait, |s| {
        s.tab == args.tab
            && s.status == FeedStatus::Ready
            && s.posts.len() == expected
            && s.posts.iter().all(|p| p.liked_by.len() == like_count(s, p))
    })
    .await?;
    print_feed(&view);

    me.deactivate();
    friend.deactivate();
    Ok(())
}

fn client(store: &Arc<MemoryStore>, user: &UserId, config: &ClientConfig) -> FeedClient {
    FeedClient::new(
        store.clone(),
        Arc::new(StaticSession::signed_in(user.clone())),
        config.clone(),
    )
}

async fn wait_for(
    client: &FeedClient,
    wait: Duration,
    pred: impl FnMut(&FeedViewState) -> bool,
) -> Result<FeedViewState> {
    let mut rx = client.state().subscribe();
    let view = tokio::time::timeout(wait, rx.wait_for(pred))
        .await
        .context("timed out waiting for the feed")??;
    Ok((*view).clone())
}

/// Posts visible on `tab` at the end of the script.
fn store_post_count(args: &Args, tab: FeedTab) -> usize {
    match tab {
        FeedTab::Global => args.users * args.posts_per_user,
        FeedTab::Followed => args.posts_per_user,
    }
}

/// Likes each post should show once the script settles: both clients liked
/// every post by the followed user.
fn like_count(view: &FeedViewState, post: &Post) -> usize {
    if view.profile.as_ref().is_some_and(|p| p.is_following(&post.user_id)) {
        2
    } else {
        0
    }
}

fn print_feed(view: &FeedViewState) {
    println!("{} feed ({} posts)", view.tab, view.posts.len());
    for post in &view.posts {
        println!(
            "  {:<10} {:<12} likes={} comments={}{}",
            post.username,
            post.description,
            post.liked_by.len(),
            post.comments.len(),
            if view.is_liked(post) { "  ♥" } else { "" },
        );
        for comment in &post.comments {
            println!("      {}: {}", comment.username, comment.text);
        }
    }
}
