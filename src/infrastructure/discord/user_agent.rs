//! Regex-based user-agent family detection.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::ports::{ClientProperties, UserAgentParser};

const OTHER: &str = "Other";

type Rules = Vec<(Regex, &'static str)>;

fn compile(rules: &[(&str, &'static str)]) -> Rules {
    rules
        .iter()
        .map(|(pattern, family)| (Regex::new(pattern).expect("Invalid regex"), *family))
        .collect()
}

static OS_RULES: LazyLock<Rules> = LazyLock::new(|| {
    compile(&[
        (r"Windows Phone", "Windows Phone"),
        (r"Windows", "Windows"),
        (r"iPhone|iPad|iPod", "iOS"),
        (r"Android", "Android"),
        (r"CrOS", "Chrome OS"),
        (r"Mac OS X|Macintosh", "Mac OS X"),
        (r"Ubuntu", "Ubuntu"),
        (r"Linux", "Linux"),
    ])
});

// Order matters: Chromium derivatives also advertise Chrome and Safari.
static BROWSER_RULES: LazyLock<Rules> = LazyLock::new(|| {
    compile(&[
        (r"discord/\d", "Discord Client"),
        (r"Edg(e|A|iOS)?/", "Edge"),
        (r"OPR/|Opera", "Opera"),
        (r"FxiOS/", "Firefox iOS"),
        (r"Firefox/", "Firefox"),
        (r"CriOS/", "Chrome Mobile iOS"),
        (r"Chrome/[\d.]+ Mobile", "Chrome Mobile"),
        (r"Chrome/", "Chrome"),
        (r"Version/[\d.]+ Mobile/\S+ Safari/", "Mobile Safari"),
        (r"Safari/", "Safari"),
    ])
});

static DEVICE_RULES: LazyLock<Rules> = LazyLock::new(|| {
    compile(&[
        (r"(?i)bot|crawler|spider", "Spider"),
        (r"iPhone", "iPhone"),
        (r"iPad", "iPad"),
        (r"iPod", "iPod"),
        (r"Android.*Mobile", "Generic Smartphone"),
        (r"Android", "Generic Tablet"),
        (r"Macintosh", "Mac"),
    ])
});

fn family(rules: &Rules, user_agent: &str) -> &'static str {
    rules
        .iter()
        .find(|(re, _)| re.is_match(user_agent))
        .map_or(OTHER, |(_, family)| family)
}

/// Maps a user-agent string to OS, browser and device families, falling back
/// to `"Other"` for anything unrecognised.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexUserAgentParser;

impl RegexUserAgentParser {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl UserAgentParser for RegexUserAgentParser {
    fn parse(&self, user_agent: &str) -> ClientProperties {
        ClientProperties::new(
            family(&OS_RULES, user_agent),
            family(&BROWSER_RULES, user_agent),
            family(&DEVICE_RULES, user_agent),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::discord::gateway::DEFAULT_USER_AGENT;
    use test_case::test_case;

    #[test]
    fn test_default_user_agent() {
        let props = RegexUserAgentParser::new().parse(DEFAULT_USER_AGENT);
        assert_eq!(props, ClientProperties::new("Windows", "Firefox", "Other"));
    }

    #[test_case(
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mac OS X", "Chrome", "Mac"; "chrome on mac"
    )]
    #[test_case(
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
        "iOS", "Mobile Safari", "iPhone"; "safari on iphone"
    )]
    #[test_case(
        "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
        "Android", "Chrome Mobile", "Generic Smartphone"; "chrome on android"
    )]
    #[test_case(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
        "Windows", "Edge", "Other"; "edge on windows"
    )]
    #[test_case(
        "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Linux", "Firefox", "Other"; "firefox on linux"
    )]
    fn test_known_families(ua: &str, os: &str, browser: &str, device: &str) {
        let props = RegexUserAgentParser::new().parse(ua);
        assert_eq!(props, ClientProperties::new(os, browser, device));
    }

    #[test]
    fn test_unknown_user_agent() {
        let props = RegexUserAgentParser::new().parse("curl/8.4.0");
        assert_eq!(props, ClientProperties::new(OTHER, OTHER, OTHER));
    }
}
