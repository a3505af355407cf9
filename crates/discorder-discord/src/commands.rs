//! DM command parsing. Recognized verbs all live behind the configured
//! command prefix (default `!`); anything else in a DM is rejected with the
//! DM-only canonical message if it looks like a stray mention, or silently
//! ignored if it carries no prefix at all.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSelector {
    Name(String),
    Index(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Info,
    Ask {
        selector: Option<ServerSelector>,
        question: String,
    },
    ClearHistory,
}

/// Parses a DM's raw content into a [`Command`], or `None` if it isn't one
/// (e.g. plain conversational text with no prefix).
pub fn parse(prefix: &str, content: &str) -> Option<Command> {
    let content = content.trim();
    let rest = content.strip_prefix(prefix)?;

    if let Some(q) = rest.strip_prefix("ask") {
        let q = q.trim_start();
        return Some(parse_ask(q));
    }

    match rest.trim() {
        "help" => Some(Command::Help),
        "status" => Some(Command::Status),
        "info" => Some(Command::Info),
        "clear-conversation-history" => Some(Command::ClearHistory),
        _ => None,
    }
}

fn parse_ask(rest: &str) -> Command {
    if let Some(stripped) = rest.strip_prefix('[') {
        if let Some(end) = stripped.find(']') {
            let raw = stripped[..end].trim();
            let question = stripped[end + 1..].trim().to_string();
            let selector = match raw.parse::<usize>() {
                Ok(n) => ServerSelector::Index(n),
                Err(_) => ServerSelector::Name(raw.to_string()),
            };
            return Command::Ask {
                selector: Some(selector),
                question,
            };
        }
    }
    Command::Ask {
        selector: None,
        question: rest.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_static_commands() {
        assert_eq!(parse("!", "!help"), Some(Command::Help));
        assert_eq!(parse("!", "!status"), Some(Command::Status));
        assert_eq!(parse("!", "!info"), Some(Command::Info));
        assert_eq!(
            parse("!", "!clear-conversation-history"),
            Some(Command::ClearHistory)
        );
    }

    #[test]
    fn parses_ask_without_selector() {
        assert_eq!(
            parse("!", "!ask what's up"),
            Some(Command::Ask {
                selector: None,
                question: "what's up".to_string(),
            })
        );
    }

    #[test]
    fn parses_ask_with_name_selector() {
        assert_eq!(
            parse("!", "!ask [alpha] what's up"),
            Some(Command::Ask {
                selector: Some(ServerSelector::Name("alpha".to_string())),
                question: "what's up".to_string(),
            })
        );
    }

    #[test]
    fn parses_ask_with_index_selector() {
        assert_eq!(
            parse("!", "!ask [3] what's up"),
            Some(Command::Ask {
                selector: Some(ServerSelector::Index(3)),
                question: "what's up".to_string(),
            })
        );
    }

    #[test]
    fn non_command_text_is_none() {
        assert_eq!(parse("!", "just chatting"), None);
    }
}
