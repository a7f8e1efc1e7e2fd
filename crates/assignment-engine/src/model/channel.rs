//! Messaging channel types
//!
//! A channel type is only ever used as a capability filter: an agent may serve a
//! ticket when the ticket's channel is in the agent's assigned channel set. There
//! is no per-channel behaviour inside the engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// External messaging channel a ticket arrived through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ChannelType {
    Whatsapp,
    Telegram,
    Instagram,
    Messenger,
    Email,
    Sms,
    Webchat,
}

impl ChannelType {
    /// All supported channels
    pub const ALL: [ChannelType; 7] = [
        ChannelType::Whatsapp,
        ChannelType::Telegram,
        ChannelType::Instagram,
        ChannelType::Messenger,
        ChannelType::Email,
        ChannelType::Sms,
        ChannelType::Webchat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Whatsapp => "whatsapp",
            ChannelType::Telegram => "telegram",
            ChannelType::Instagram => "instagram",
            ChannelType::Messenger => "messenger",
            ChannelType::Email => "email",
            ChannelType::Sms => "sms",
            ChannelType::Webchat => "webchat",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ChannelType::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown channel type: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_parse_is_case_insensitive() {
        assert_eq!("WhatsApp".parse::<ChannelType>().unwrap(), ChannelType::Whatsapp);
        assert_eq!("sms".parse::<ChannelType>().unwrap(), ChannelType::Sms);
        assert!("fax".parse::<ChannelType>().is_err());
    }

    #[test]
    fn test_channel_set_serializes_as_json_array() {
        let channels = vec![ChannelType::Whatsapp, ChannelType::Webchat];
        let json = serde_json::to_string(&channels).unwrap();
        assert_eq!(json, r#"["whatsapp","webchat"]"#);
    }
}
