//! Check-feed command: one probe call against the submissions feed.

use anyhow::{Context, Result, bail};

use crate::Config;

pub async fn run(config: &Config, username: Option<&str>) -> Result<()> {
    let Some(username) = username.or_else(|| config.settings.username()) else {
        bail!("no feed username configured; pass --username or set leetcode_username");
    };

    let client = gt_feed::Client::new(config.settings.feed_base.clone())
        .context("failed to build feed client")?;
    let submissions = client
        .fetch_recent(username, 1)
        .await
        .context("feed request failed")?;

    println!(
        "Feed reachable: {} recent submission(s) for {username}.",
        submissions.len()
    );
    Ok(())
}
