use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mentions {
    pub user_ids: Vec<String>,
    pub channel_ids: Vec<String>,
}

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://[^\s<>\)]+").unwrap())
}

fn user_mention_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<@!?(\d+)>").unwrap())
}

fn channel_mention_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<#(\d+)>").unwrap())
}

/// Extract `http(s)://` URLs from message content.
pub fn extract_urls(content: &str) -> Vec<String> {
    url_pattern()
        .find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Extract `<@id>`, `<@!id>`, and `<#id>` mentions from message content.
pub fn extract_mentions(content: &str) -> Mentions {
    Mentions {
        user_ids: user_mention_pattern()
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect(),
        channel_ids: channel_mention_pattern()
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_urls() {
        let urls = extract_urls("check this out https://example.com/a and http://foo.bar");
        assert_eq!(urls, vec!["https://example.com/a", "http://foo.bar"]);
    }

    #[test]
    fn no_urls_is_empty() {
        assert!(extract_urls("no links here").is_empty());
    }

    #[test]
    fn finds_user_and_channel_mentions() {
        let mentions = extract_mentions("hey <@123> and <@!456> check <#789>");
        assert_eq!(mentions.user_ids, vec!["123", "456"]);
        assert_eq!(mentions.channel_ids, vec!["789"]);
    }
}
