//! Inbound messages from page-bound reporters.
//!
//! The transport delivers one JSON envelope per action, tagged by a `type`
//! string with a `data` record, a closed union validated here at the
//! boundary. Handlers never see untyped payloads.

use serde::{Deserialize, Serialize};

use crate::session::CodeStats;
use crate::settings::SettingsUpdate;
use crate::types::TabId;

/// One inbound message with its tab-scoped sender identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub tab_id: TabId,
    pub message: Message,
}

/// The closed set of reporter messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Message {
    /// A problem page loaded (or re-announced itself with a resolved title).
    SessionStart {
        problem_url: String,
        #[serde(default)]
        problem_title: Option<String>,
    },
    /// The tracked context gained or lost input focus.
    FocusChange { focused: bool },
    /// A keystroke-level activity signal with the latest code snapshot.
    ActivityPing {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        language: Option<String>,
        #[serde(default)]
        stats: Option<CodeStats>,
        #[serde(default)]
        code_changed: bool,
        #[serde(default)]
        significant_change: bool,
    },
    RunClicked {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        language: Option<String>,
    },
    SubmitClicked {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        language: Option<String>,
    },
    /// Partial settings written by the settings UI.
    SettingsUpdated(SettingsUpdate),
    /// The tracked tab was closed.
    TabRemoved,
    /// The whole window gained or lost focus.
    WindowFocus { focused: bool },
    /// The sending tab became the active one; all others are defocused.
    TabActivated,
    /// Transport-observed connectivity transition.
    Connectivity { online: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_start_wire_format() {
        let line = r#"{
            "tabId": "41",
            "message": {
                "type": "SESSION_START",
                "data": {
                    "problemUrl": "https://leetcode.com/problems/two-sum/",
                    "problemTitle": "Two Sum"
                }
            }
        }"#;
        let envelope: Envelope = serde_json::from_str(line).unwrap();
        assert_eq!(envelope.tab_id.as_str(), "41");
        let Message::SessionStart { problem_url, problem_title } = envelope.message else {
            panic!("expected SESSION_START");
        };
        assert!(problem_url.contains("two-sum"));
        assert_eq!(problem_title.as_deref(), Some("Two Sum"));
    }

    #[test]
    fn parses_activity_ping_with_optional_fields_absent() {
        let line = r#"{"tabId": "41", "message": {"type": "ACTIVITY_PING", "data": {}}}"#;
        let envelope: Envelope = serde_json::from_str(line).unwrap();
        let Message::ActivityPing { code, significant_change, .. } = envelope.message else {
            panic!("expected ACTIVITY_PING");
        };
        assert!(code.is_none());
        assert!(!significant_change);
    }

    #[test]
    fn parses_activity_ping_with_stats() {
        let line = r#"{
            "tabId": "41",
            "message": {
                "type": "ACTIVITY_PING",
                "data": {
                    "code": "print(1)",
                    "language": "python3",
                    "stats": {"lines": 1, "chars": 8, "words": 1},
                    "codeChanged": true,
                    "significantChange": true
                }
            }
        }"#;
        let envelope: Envelope = serde_json::from_str(line).unwrap();
        let Message::ActivityPing { code, stats, code_changed, significant_change, .. } =
            envelope.message
        else {
            panic!("expected ACTIVITY_PING");
        };
        assert_eq!(code.as_deref(), Some("print(1)"));
        assert_eq!(stats.unwrap().lines, 1);
        assert!(code_changed);
        assert!(significant_change);
    }

    #[test]
    fn parses_unit_messages_without_data() {
        let line = r#"{"tabId": "41", "message": {"type": "TAB_REMOVED"}}"#;
        let envelope: Envelope = serde_json::from_str(line).unwrap();
        assert!(matches!(envelope.message, Message::TabRemoved));
    }

    #[test]
    fn parses_settings_update() {
        let line = r#"{
            "tabId": "0",
            "message": {
                "type": "SETTINGS_UPDATED",
                "data": {"leetcodeUsername": "sami", "userId": "u-1"}
            }
        }"#;
        let envelope: Envelope = serde_json::from_str(line).unwrap();
        let Message::SettingsUpdated(update) = envelope.message else {
            panic!("expected SETTINGS_UPDATED");
        };
        assert_eq!(update.leetcode_username.as_deref(), Some("sami"));
    }

    #[test]
    fn rejects_unknown_message_type() {
        let line = r#"{"tabId": "41", "message": {"type": "NOT_A_THING", "data": {}}}"#;
        assert!(serde_json::from_str::<Envelope>(line).is_err());
    }

    #[test]
    fn rejects_empty_tab_id() {
        let line = r#"{"tabId": "", "message": {"type": "TAB_REMOVED"}}"#;
        assert!(serde_json::from_str::<Envelope>(line).is_err());
    }

    #[test]
    fn message_roundtrips_through_serde() {
        let message = Message::Connectivity { online: false };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("CONNECTIVITY"));
        let parsed: Message = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, Message::Connectivity { online: false }));
    }
}
