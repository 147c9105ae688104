use crate::commands::util_api::{
    paste_reader, read_pasted, run_until_closed, wait_for_local_description,
};
use anyhow::{bail, Result};
use log::info;
use p2pcall::{ConnectionManager, NegotiationStatus};

/// Offerer side: publish an offer, then apply the pasted answer.
pub async fn run(manager: &mut ConnectionManager) -> Result<()> {
    if manager.offer().await? == NegotiationStatus::Ignored {
        bail!("a session is already active");
    }
    wait_for_local_description(manager).await?;

    println!("Paste the answer from the other side, then an empty line:");
    let mut lines = paste_reader();
    let answer = tokio::select! {
        answer = read_pasted(&mut lines) => answer?,
        _ = manager.run() => bail!("session ended while waiting for the answer"),
    };

    match manager.connect(&answer).await? {
        NegotiationStatus::Started => info!("Answer applied, connecting"),
        NegotiationStatus::Ignored => bail!("answer was not applied"),
    }
    run_until_closed(manager).await
}
