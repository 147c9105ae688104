use anyhow::{bail, Result};
use log::{debug, info};
use p2pcall::peer::{LogRenderSink, SyntheticCapture, WebRtcTransportFactory};
use p2pcall::{Config, ConnectionManager, SignalingSink};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

pub type PasteReader = Lines<BufReader<Stdin>>;

/// Prints published descriptions for the operator to copy.
pub struct StdoutSignaling;

impl SignalingSink for StdoutSignaling {
    fn publish(&self, text: &str) {
        println!("==== local description: copy the line below to the other side ====");
        println!("{text}");
        println!("==== end ====");
    }

    fn clear(&self) {
        debug!("Signaling surface cleared");
    }
}

pub fn build_manager(config: Config) -> ConnectionManager {
    ConnectionManager::new(
        config,
        Arc::new(WebRtcTransportFactory),
        Arc::new(SyntheticCapture::default()),
        Arc::new(LogRenderSink),
        Arc::new(StdoutSignaling),
    )
}

pub fn paste_reader() -> PasteReader {
    BufReader::new(tokio::io::stdin()).lines()
}

/// Read one pasted description, terminated by an empty line or EOF.
pub async fn read_pasted(lines: &mut PasteReader) -> Result<String> {
    let mut pasted = String::new();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            if pasted.is_empty() {
                continue;
            }
            break;
        }
        pasted.push_str(line.trim());
        pasted.push('\n');
    }

    if pasted.is_empty() {
        bail!("no description was pasted");
    }
    Ok(pasted)
}

/// Pump transport events until the local description has been published.
pub async fn wait_for_local_description(manager: &mut ConnectionManager) -> Result<()> {
    loop {
        match manager.session() {
            None => bail!("session ended before the local description was ready"),
            Some(session) if session.description_emitted() => return Ok(()),
            Some(_) => manager.process_next_event().await,
        }
    }
}

/// Run the call until connectivity is lost for good or Ctrl-C.
pub async fn run_until_closed(manager: &mut ConnectionManager) -> Result<()> {
    if let Some(fingerprint) = manager.fingerprint() {
        info!("Session fingerprint: {fingerprint} (compare with the other side)");
    }

    tokio::select! {
        _ = manager.run() => info!("Session ended"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted, hanging up"),
    }
    manager.disconnect().await;
    Ok(())
}
