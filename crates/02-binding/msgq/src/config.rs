use serde::{Deserialize, Serialize};

use crate::buffer::Ownership;
use crate::options::SocketOption;

/// Settings applied by [`Channel::with_config`](crate::Channel::with_config).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Ownership mode of the transient buffers used by the text helpers.
    pub ownership: Ownership,
    /// Queue high-water mark; `None` keeps the context default.
    pub hwm: Option<u64>,
    /// Socket identity.
    pub identity: Option<Vec<u8>>,
}

impl ChannelConfig {
    pub fn with_ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn with_hwm(mut self, hwm: u64) -> Self {
        self.hwm = Some(hwm);
        self
    }

    pub fn with_identity(mut self, identity: impl Into<Vec<u8>>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Options to apply, in order.
    pub(crate) fn options(&self) -> Vec<SocketOption> {
        let mut options = Vec::new();
        if let Some(hwm) = self.hwm {
            options.push(SocketOption::Hwm(hwm));
        }
        if let Some(identity) = &self.identity {
            options.push(SocketOption::Identity(identity.clone()));
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_nothing() {
        let config = ChannelConfig::default();
        assert_eq!(config.ownership, Ownership::Managed);
        assert!(config.options().is_empty());
    }

    #[test]
    fn builder_collects_options() {
        let config = ChannelConfig::default()
            .with_hwm(16)
            .with_identity("node");
        assert_eq!(
            config.options(),
            vec![
                SocketOption::Hwm(16),
                SocketOption::Identity(b"node".to_vec()),
            ]
        );
    }

    #[test]
    fn deserializes_partial_json() {
        let config: ChannelConfig =
            serde_json::from_str(r#"{ "ownership": "unmanaged", "hwm": 8 }"#).expect("config");
        assert_eq!(config.ownership, Ownership::Unmanaged);
        assert_eq!(config.hwm, Some(8));
        assert_eq!(config.identity, None);
    }
}
