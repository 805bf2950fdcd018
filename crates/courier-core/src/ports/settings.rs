//! SettingsProvider port - 配送先の認証情報

/// Credentials and endpoints for both transports.
///
/// A blank value disables the transport that needs it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelSettings {
    pub channel_token: String,
    pub chat_id: String,
    pub http_base_url: String,
    pub api_key: String,
}

impl ChannelSettings {
    /// `(token, chat_id)` when both are set.
    pub fn document_credentials(&self) -> Option<(&str, &str)> {
        non_blank(&self.channel_token).zip(non_blank(&self.chat_id))
    }

    /// `(base_url, api_key)` when both are set.
    pub fn http_endpoint(&self) -> Option<(&str, &str)> {
        non_blank(&self.http_base_url).zip(non_blank(&self.api_key))
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Settings are read at the start of every sweep so edits apply without a restart.
pub trait SettingsProvider: Send + Sync {
    fn settings(&self) -> ChannelSettings;
}

/// Settings fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings(pub ChannelSettings);

impl SettingsProvider for StaticSettings {
    fn settings(&self) -> ChannelSettings {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::both_set("tok", "42", true)]
    #[case::blank_token("  ", "42", false)]
    #[case::missing_chat("tok", "", false)]
    fn document_credentials_require_both(
        #[case] token: &str,
        #[case] chat: &str,
        #[case] configured: bool,
    ) {
        let settings = ChannelSettings {
            channel_token: token.to_string(),
            chat_id: chat.to_string(),
            ..Default::default()
        };
        assert_eq!(settings.document_credentials().is_some(), configured);
    }

    #[test]
    fn http_endpoint_is_trimmed() {
        let settings = ChannelSettings {
            http_base_url: " https://ingest.example ".to_string(),
            api_key: "k".to_string(),
            ..Default::default()
        };
        assert_eq!(
            settings.http_endpoint(),
            Some(("https://ingest.example", "k"))
        );
    }
}
