//! services/reader_host/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the native shell (which
//! owns the ad SDK and the platform screen-capture switch) and the host.

use note_access_core::ports::AdEvent;
use serde::{Deserialize, Serialize};

/// Which of the two configured ad units a message refers to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdUnitKind {
    Rewarded,
    Interstitial,
}

//=========================================================================================
// Messages Sent FROM the Shell TO the Host
//=========================================================================================

/// SDK signals relayed by the shell.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShellMessage {
    AdLoaded { unit: AdUnitKind },
    AdError { unit: AdUnitKind, message: String },
    AdEarnedReward { unit: AdUnitKind },
    AdOpened { unit: AdUnitKind },
    AdClosed { unit: AdUnitKind },
}

impl ShellMessage {
    /// Splits the message into its target unit and the core `AdEvent`.
    pub fn into_ad_event(self) -> (AdUnitKind, AdEvent) {
        match self {
            ShellMessage::AdLoaded { unit } => (unit, AdEvent::Loaded),
            ShellMessage::AdError { unit, message } => (unit, AdEvent::Error(message)),
            ShellMessage::AdEarnedReward { unit } => (unit, AdEvent::EarnedReward),
            ShellMessage::AdOpened { unit } => (unit, AdEvent::Opened),
            ShellMessage::AdClosed { unit } => (unit, AdEvent::Closed),
        }
    }
}

//=========================================================================================
// Messages Sent FROM the Host TO the Shell
//=========================================================================================

/// Commands the shell must carry out.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Request a fresh ad for the unit.
    LoadAd {
        unit: AdUnitKind,
        unit_id: String,
        keywords: Vec<String>,
    },
    /// Present the loaded ad.
    ShowAd { unit: AdUnitKind },
    PreventScreenCapture,
    AllowScreenCapture,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_events_decode_into_core_events() {
        let msg: ShellMessage =
            serde_json::from_str(r#"{"type":"ad_earned_reward","unit":"rewarded"}"#).unwrap();
        assert_eq!(msg.into_ad_event(), (AdUnitKind::Rewarded, AdEvent::EarnedReward));

        let msg: ShellMessage = serde_json::from_str(
            r#"{"type":"ad_error","unit":"interstitial","message":"no fill"}"#,
        )
        .unwrap();
        assert_eq!(
            msg.into_ad_event(),
            (AdUnitKind::Interstitial, AdEvent::Error("no fill".to_string()))
        );
    }

    #[test]
    fn host_commands_are_tagged() {
        let json = serde_json::to_value(HostMessage::ShowAd {
            unit: AdUnitKind::Rewarded,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "show_ad", "unit": "rewarded"}));

        let json = serde_json::to_value(HostMessage::PreventScreenCapture).unwrap();
        assert_eq!(json, serde_json::json!({"type": "prevent_screen_capture"}));
    }
}
