use crate::config::{ServerConfig, ServerKind};
use rand::Rng;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Prefix an ICE server URL with `stun:` or `turn:` when the scheme is missing.
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    if ["stun:", "stuns:", "turn:", "turns:"]
        .iter()
        .any(|scheme| config.url.starts_with(scheme))
    {
        config.url.clone()
    } else {
        let scheme = match config.kind {
            ServerKind::Turn => "turn:",
            ServerKind::Stun => "stun:",
        };
        format!("{}{}", scheme, config.url)
    }
}
