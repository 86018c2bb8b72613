//! Transport bindings.
//!
//! A transport is anything that feeds `SessionEvent`s into the session
//! queue and drains the outbound frame channel: the websocket binding here,
//! or a peer-media stack attached the same way after its own signaling
//! (out of scope) has produced decoded frames.

pub mod ws;

use serde::Deserialize;

/// Control messages a transport may deliver alongside audio.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportControl {
    /// The peer detected a gap in its capture; the pipeline inserts the
    /// equivalent run of silence.
    Discontinuity { gap_ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discontinuity_parses() {
        let msg: TransportControl =
            serde_json::from_str(r#"{"type": "discontinuity", "gap_ms": 120}"#).unwrap();
        let TransportControl::Discontinuity { gap_ms } = msg;
        assert_eq!(gap_ms, 120);
    }
}
