use crate::config::DescriptionEncoding;
use crate::error::{Error, Result};
use crate::peer::transport::Transport;
use crate::peer::types::{SdpType, SessionDescription};
use crate::session::Session;
use crate::signaling::{decode_description, encode_description};
use log::{debug, info};

/// Drives the offer/answer exchange on a session's transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegotiationEngine {
    encoding: DescriptionEncoding,
}

impl NegotiationEngine {
    pub fn new(encoding: DescriptionEncoding) -> Self {
        NegotiationEngine { encoding }
    }

    /// Validate pasted text without touching any session.
    pub fn parse_remote(&self, text: &str, expected: SdpType) -> Result<SessionDescription> {
        let desc = decode_description(text)?;
        if desc.kind != expected {
            return Err(Error::InvalidDescription(format!(
                "expected an {expected}, got an {}",
                desc.kind
            )));
        }
        Ok(desc)
    }

    /// Generate an offer and make it the local description.
    pub async fn create_offer(&self, session: &mut Session, transport: &dyn Transport) -> Result<()> {
        debug!("Creating offer for session {}", session.id());
        let offer = transport.create_offer().await?;
        transport.set_local_description(offer.clone()).await?;
        session.set_local_description(offer);
        session.mark_pending();
        info!("Offer set as local description, waiting for ICE gathering");
        Ok(())
    }

    /// Apply the remote offer. The answer itself is generated by
    /// [`Self::finish_answer`] once local tracks are attached.
    pub async fn accept_offer(
        &self,
        session: &mut Session,
        transport: &dyn Transport,
        offer: SessionDescription,
    ) -> Result<()> {
        debug!("Applying remote offer to session {}", session.id());
        transport.set_remote_description(offer.clone()).await?;
        session.set_remote_description(offer);
        Ok(())
    }

    pub async fn finish_answer(&self, session: &mut Session, transport: &dyn Transport) -> Result<()> {
        let answer = transport.create_answer().await?;
        transport.set_local_description(answer.clone()).await?;
        session.set_local_description(answer);
        session.mark_pending();
        info!("Answer set as local description, waiting for ICE gathering");
        Ok(())
    }

    /// Offerer side: apply the pasted answer to complete the handshake.
    pub async fn apply_remote_description(
        &self,
        session: &mut Session,
        transport: &dyn Transport,
        answer: SessionDescription,
    ) -> Result<()> {
        debug!("Applying remote answer to session {}", session.id());
        transport.set_remote_description(answer.clone()).await?;
        session.set_remote_description(answer);
        info!("Remote answer applied to session {}", session.id());
        Ok(())
    }

    /// Serialize the transport's current local description for the operator.
    ///
    /// Returns `None` if no local description has been set yet.
    pub async fn local_description_text(
        &self,
        session: &mut Session,
        transport: &dyn Transport,
    ) -> Result<Option<String>> {
        let Some(desc) = transport.local_description().await else {
            return Ok(None);
        };
        let text = encode_description(&desc, self.encoding)?;
        session.set_local_description(desc);
        Ok(Some(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDP: &str = "v=0\r\no=- 1 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n";

    #[test]
    fn wrong_description_type_is_invalid() {
        let engine = NegotiationEngine::default();
        let answer_text =
            encode_description(&SessionDescription::answer(SDP), DescriptionEncoding::Json)
                .unwrap();

        let err = engine.parse_remote(&answer_text, SdpType::Offer).unwrap_err();
        assert!(matches!(err, Error::InvalidDescription(msg) if msg.contains("expected an offer")));

        let desc = engine.parse_remote(&answer_text, SdpType::Answer).unwrap();
        assert_eq!(desc.kind, SdpType::Answer);
    }
}
