//! Prompt builders for the three generation kinds

use crate::config::GenerationConfig;
use crate::generation::provider::{ChatMessage, CompletionRequest};
use crate::graph::RelatedNodes;

/// Tree-of-abstraction analysis of a selected phrase
pub fn tree_of_abstraction(selection: &str) -> CompletionRequest {
    let prompt = format!(
        "Perform a multi-dimensional analysis of {} by constructing a Tree of Abstraction. \
         Start from the immediate, tangible actions and delve into deeper layers of complexity, \
         adapting your approach as needed to capture the unique aspects of this activity. \
         Your analysis may include, but is not limited to, the biological, psychological, \
         social, technological, economic, and philosophical dimensions. Provide a comprehensive \
         and insightful exploration, and identify intersections between different layers of \
         abstraction where relevant. Return in markdown.",
        selection
    );
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
}

/// Markdown answer to a question, optionally under a separate system instruction.
///
/// Output length is bounded and decoding is deterministic per `config`.
pub fn answer_question(
    question: &str,
    system_prompt: Option<&str>,
    config: &GenerationConfig,
) -> CompletionRequest {
    let prompt = format!(
        "Answer the following question: {}. Return in markdown with latex support ($).",
        question
    );

    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));

    CompletionRequest {
        messages,
        max_tokens: Some(config.answer_max_tokens),
        temperature: Some(config.answer_temperature),
    }
}

/// New topic suggestions around a node and its link neighbourhood
pub fn recommend(node_name: &str, node_content: &str, related: &RelatedNodes) -> CompletionRequest {
    let prompt = format!(
        "Given the context about {}, which includes this information: \"{}\", and has \
         information about related topics such as {} and extended connections including {}, \
         suggest new topics or areas that could expand on this knowledge or provide deeper \
         insight into related areas. Return as a list [topic_name1, topic_name2, ...]",
        node_name,
        node_content,
        format_list(&related.first_degree),
        format_list(&related.second_degree),
    );
    CompletionRequest::new(vec![ChatMessage::user(prompt)])
}

fn format_list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| format!("'{}'", i)).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_prompt() {
        let request = tree_of_abstraction("brewing coffee");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
        assert!(request.messages[0]
            .content
            .starts_with("Perform a multi-dimensional analysis of brewing coffee"));
        assert!(request.messages[0].content.ends_with("Return in markdown."));
        assert!(request.max_tokens.is_none());
        assert!(request.temperature.is_none());
    }

    #[test]
    fn test_answer_with_system_prompt() {
        let config = GenerationConfig::default();
        let request = answer_question("What is Rust?", Some("You are terse."), &config);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0], ChatMessage::system("You are terse."));
        assert_eq!(request.messages[1].role, "user");
        assert!(request.messages[1].content.contains("What is Rust?"));
        assert!(request.messages[1].content.contains("latex support ($)"));
        assert_eq!(request.max_tokens, Some(4096));
        assert_eq!(request.temperature, Some(0.0));
    }

    #[test]
    fn test_answer_without_system_prompt() {
        let config = GenerationConfig::default();
        let request = answer_question("Why?", None, &config);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");

        let request = answer_question("Why?", Some("   "), &config);
        assert_eq!(request.messages.len(), 1);
    }

    #[test]
    fn test_recommend_prompt_embeds_neighbourhood() {
        let related = RelatedNodes {
            first_degree: vec!["B".to_string(), "C".to_string()],
            second_degree: vec!["D".to_string()],
        };
        let request = recommend("A", "about a", &related);
        let content = &request.messages[0].content;

        assert!(content.starts_with("Given the context about A"));
        assert!(content.contains("\"about a\""));
        assert!(content.contains("such as ['B', 'C'] and extended connections including ['D']"));
        assert!(content.ends_with("[topic_name1, topic_name2, ...]"));
    }

    #[test]
    fn test_recommend_with_no_links() {
        let request = recommend("A", "", &RelatedNodes::default());
        assert!(request.messages[0].content.contains("such as [] and"));
    }
}
