//! User-agent lookup port.

/// Client properties announced in the identify handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProperties {
    /// Operating system family.
    pub os: String,
    /// Browser family.
    pub browser: String,
    /// Device family.
    pub device: String,
}

impl ClientProperties {
    /// Creates properties from explicit family strings.
    #[must_use]
    pub fn new(
        os: impl Into<String>,
        browser: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            os: os.into(),
            browser: browser.into(),
            device: device.into(),
        }
    }

    /// Properties used when no user agent is configured: the host platform
    /// plus this crate's name as browser and device.
    #[must_use]
    pub fn platform_default() -> Self {
        Self::new(std::env::consts::OS, crate::NAME, crate::NAME)
    }
}

/// Port resolving a user-agent string into OS, browser and device families.
#[cfg_attr(test, mockall::automock)]
pub trait UserAgentParser: Send + Sync {
    /// Parses a raw `User-Agent` header value.
    fn parse(&self, user_agent: &str) -> ClientProperties;
}
