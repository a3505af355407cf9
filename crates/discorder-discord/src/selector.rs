//! Resolves a `!ask` server selector against the numbered listing the bot
//! would show for a user's mutual configured servers. The listing is
//! recomputed fresh on every call rather than cached, so it always reflects
//! current membership and configuration.

use chrono::{DateTime, Utc};

use discorder_core::types::ServerId;

use crate::commands::ServerSelector;

#[derive(Debug, Clone)]
pub struct ServerCandidate {
    pub server_id: ServerId,
    pub name: String,
    pub message_count: u64,
    pub last_indexed: Option<DateTime<Utc>>,
}

pub fn resolve(candidates: &[ServerCandidate], selector: &ServerSelector) -> Option<ServerId> {
    match selector {
        ServerSelector::Index(n) => candidates
            .get(n.checked_sub(1)?)
            .map(|c| c.server_id.clone()),
        ServerSelector::Name(name) => candidates
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .map(|c| c.server_id.clone()),
    }
}

pub fn format_listing(candidates: &[ServerCandidate]) -> String {
    let mut lines =
        vec!["Which server did you mean? Reply with `!ask [<number or name>] <question>`.".to_string()];
    for (i, c) in candidates.iter().enumerate() {
        let indexed = c
            .last_indexed
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        lines.push(format!(
            "{}. {} — {} messages indexed, last indexed {}",
            i + 1,
            c.name,
            c.message_count,
            indexed
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates() -> Vec<ServerCandidate> {
        vec![
            ServerCandidate {
                server_id: ServerId::from("s1"),
                name: "alpha".to_string(),
                message_count: 10,
                last_indexed: None,
            },
            ServerCandidate {
                server_id: ServerId::from("s2"),
                name: "beta".to_string(),
                message_count: 20,
                last_indexed: None,
            },
        ]
    }

    #[test]
    fn resolves_by_index() {
        assert_eq!(
            resolve(&candidates(), &ServerSelector::Index(2)),
            Some(ServerId::from("s2"))
        );
    }

    #[test]
    fn resolves_by_name_case_insensitive() {
        assert_eq!(
            resolve(&candidates(), &ServerSelector::Name("ALPHA".to_string())),
            Some(ServerId::from("s1"))
        );
    }

    #[test]
    fn unknown_selector_is_none() {
        assert_eq!(resolve(&candidates(), &ServerSelector::Index(9)), None);
    }
}
