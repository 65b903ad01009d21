use std::fmt::Write as _;

use super::GeneratorSettings;
use crate::model::{ConversationTurn, SourceRef};
use crate::util::truncate_chars;

pub const MAX_HISTORY_TURN_CHARS: usize = 400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

pub fn build_prompt(
    settings: &GeneratorSettings,
    query: &str,
    excerpts: &[SourceRef],
    history: &[ConversationTurn],
) -> Prompt {
    let product = &settings.product_name;
    let system = format!(
        "You are an expert on the {product} database. Answer the user's question based only \
         on the provided documentation. If the answer is not in the documentation, say \
         \"I don't know based on the {product} docs.\" Answer clearly, concisely and precisely."
    );

    let mut user = String::from("Relevant documentation:\n");
    for (rank, excerpt) in excerpts.iter().enumerate() {
        let _ = write!(user, "\n[{}] {}\n{}\n", rank + 1, excerpt.title, excerpt.text);
    }

    let keep = history.len().min(settings.max_history_turns);
    let recent = &history[history.len() - keep..];
    if !recent.is_empty() {
        user.push_str("\nConversation so far:\n");
        for turn in recent {
            let text = truncate_chars(turn.text.trim(), MAX_HISTORY_TURN_CHARS);
            let _ = writeln!(user, "{}: {}", turn.role.label(), text);
        }
    }

    let _ = write!(user, "\nUser question:\n{}", query.trim());

    Prompt { system, user }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    fn settings() -> GeneratorSettings {
        GeneratorSettings {
            product_name: "INGRES".to_string(),
            excerpt_chars: 500,
            max_history_turns: 2,
        }
    }

    fn source(title: &str, text: &str) -> SourceRef {
        SourceRef {
            source: "guide.txt".to_string(),
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn prompt_lists_excerpts_in_rank_order_then_question() {
        let prompt = build_prompt(
            &settings(),
            "  How do I checkpoint?  ",
            &[source("guide.txt - chunk 3", "ckpdb dbname"), source("guide.txt - chunk 0", "intro")],
            &[],
        );

        assert!(prompt.system.contains("based only on the provided documentation"));
        assert!(prompt.system.contains("INGRES"));
        let first = prompt.user.find("[1] guide.txt - chunk 3").unwrap();
        let second = prompt.user.find("[2] guide.txt - chunk 0").unwrap();
        let question = prompt.user.find("How do I checkpoint?").unwrap();
        assert!(first < second && second < question);
        assert!(!prompt.user.contains("Conversation so far"));
    }

    #[test]
    fn history_is_bounded_to_most_recent_turns() {
        let long = "x".repeat(1000);
        let history = vec![
            ConversationTurn {
                role: Role::User,
                text: "oldest question".to_string(),
            },
            ConversationTurn {
                role: Role::Assistant,
                text: long.clone(),
            },
            ConversationTurn {
                role: Role::User,
                text: "latest follow-up".to_string(),
            },
        ];
        let prompt = build_prompt(&settings(), "and then?", &[], &history);

        assert!(!prompt.user.contains("oldest question"));
        assert!(prompt.user.contains("User: latest follow-up"));
        assert!(prompt.user.contains(&format!("Assistant: {}\n", "x".repeat(400))));
        assert!(!prompt.user.contains(&"x".repeat(401)));
    }
}
