use anyhow::Result;
use ledger_core::ChainSnapshot;
use reqwest::Client;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Fetches `/chain` from every peer concurrently.
///
/// Unreachable or misbehaving peers are logged and left out. The returned
/// snapshots keep the order of `peers`, so conflict resolution sees them in a
/// stable order.
pub async fn fetch_peer_chains(client: &Client, peers: &[String]) -> Vec<ChainSnapshot> {
    let mut tasks = JoinSet::new();
    for (position, peer) in peers.iter().enumerate() {
        let client = client.clone();
        let url = format!("http://{peer}/chain");
        tasks.spawn(async move {
            let result = fetch_chain(&client, &url).await;
            (position, url, result)
        });
    }

    let mut fetched = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((position, url, Ok(snapshot))) => {
                debug!(%url, length = snapshot.length, "fetched peer chain");
                fetched.push((position, snapshot));
            }
            Ok((_, url, Err(err))) => warn!(%url, "skipping peer: {err:#}"),
            Err(err) => warn!("peer fetch task failed: {err}"),
        }
    }
    fetched.sort_by_key(|(position, _)| *position);
    fetched.into_iter().map(|(_, snapshot)| snapshot).collect()
}

async fn fetch_chain(client: &Client, url: &str) -> Result<ChainSnapshot> {
    let response = client.get(url).send().await?.error_for_status()?;
    Ok(response.json::<ChainSnapshot>().await?)
}
