//! Inline node links: `[display text](<node:TargetId>)`

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\[([^\]]+)\]\(<node:([^>]+)>\)").expect("link pattern is valid")
    })
}

/// Unique link targets in `content`, in order of first appearance
pub fn extract_links(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    link_pattern()
        .captures_iter(content)
        .filter_map(|caps| caps.get(2))
        .map(|m| m.as_str())
        .filter(|target| seen.insert(*target))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_link() {
        assert_eq!(extract_links("see [B](<node:B>)"), vec!["B".to_string()]);
    }

    #[test]
    fn test_duplicate_targets_collapse() {
        let content = "[first](<node:B>) and [again](<node:B>) then [c](<node:C>)";
        assert_eq!(extract_links(content), vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_display_text_ignored() {
        let content = "[Some Title](<node:Target Node>)";
        assert_eq!(extract_links(content), vec!["Target Node".to_string()]);
    }

    #[test]
    fn test_non_node_links_ignored() {
        let content = "[web](https://example.com) [img](<image:x.png>) [](<node:Empty>)";
        assert!(extract_links(content).is_empty());
    }

    #[test]
    fn test_links_across_lines() {
        let content = "first [A](<node:A>)\nsecond [B](<node:B>)<br>[A](<node:A>)";
        assert_eq!(extract_links(content), vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_empty_content() {
        assert!(extract_links("").is_empty());
    }
}
