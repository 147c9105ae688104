use crate::commands::util_api::{
    paste_reader, read_pasted, run_until_closed, wait_for_local_description,
};
use anyhow::{bail, Result};
use log::info;
use p2pcall::{ConnectionManager, NegotiationStatus};

/// Answerer side: answer the pasted offer and publish the answer.
pub async fn run(manager: &mut ConnectionManager) -> Result<()> {
    println!("Paste the offer from the other side, then an empty line:");
    let mut lines = paste_reader();
    let offer = read_pasted(&mut lines).await?;

    if manager.answer(&offer).await? == NegotiationStatus::Ignored {
        bail!("a session is already active");
    }
    wait_for_local_description(manager).await?;
    info!("Answer published, waiting for the other side to connect");

    run_until_closed(manager).await
}
