//! Lightweight text helpers shared by the heuristic reasoner and the router.

use std::collections::BTreeSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "of", "on", "in", "to", "for", "with", "by", "at", "from",
    "is", "are", "be", "it", "its", "this", "that", "these", "those", "as", "me", "my", "we",
    "our", "you", "your", "please", "then", "about", "into", "what", "how", "can", "could",
    "would", "should", "do", "does", "some", "any", "all",
];

/// Phrases that state an ordering between parts of a task.
const ORDER_MARKERS: &[&str] = &[
    ", and then ",
    " and then ",
    ", then ",
    " then ",
    "; then ",
    " after that ",
    ", after that, ",
    " afterwards ",
    ", afterwards, ",
    " followed by ",
    " and finally ",
    ", finally, ",
    " finally ",
    " next, ",
    " once done, ",
];

/// Phrases that join independent parts of a task.
const CONJUNCTIONS: &[&str] = &[" and also ", "; ", " as well as ", " and "];

/// Lowercased content tokens without stopwords.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Distinct content tokens.
pub fn token_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Jaccard similarity of the content tokens of two texts.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = token_set(a);
    let b = token_set(b);
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(&b).count() as f64;
    let union = a.union(&b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Whether two tokens name the same concept ("write" / "writer").
pub fn words_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    short.len() >= 4 && long.starts_with(short)
}

/// Whether `text` mentions `keyword`, by phrase for multi-word keywords and
/// by token otherwise.
pub fn mentions(text: &str, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return false;
    }
    if keyword.contains(' ') {
        return text.to_lowercase().contains(&keyword);
    }
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .any(|t| t == keyword || (keyword.len() >= 4 && t.starts_with(keyword.as_str())))
}

fn split_on(text: &str, markers: &[&str]) -> Vec<String> {
    let mut parts = vec![format!(" {} ", text.trim())];
    for marker in markers {
        let mut next = Vec::new();
        for part in parts {
            let lower = part.to_ascii_lowercase();
            let mut last = 0;
            let mut pieces = Vec::new();
            for (idx, _) in lower.match_indices(marker) {
                if idx < last {
                    continue;
                }
                pieces.push(part[last..idx].to_string());
                last = idx + marker.len();
            }
            pieces.push(part[last..].to_string());
            // Keep a leading space so markers at the very start of a piece still match.
            next.extend(pieces.into_iter().map(|p| format!(" {} ", p.trim())));
        }
        parts = next;
    }
    parts
        .into_iter()
        .map(|p| p.trim().trim_matches(|c: char| c == ',' || c == '.').trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Split a task into steps that the text says must happen in order.
///
/// Returns a single element when no ordering is stated.
pub fn ordered_clauses(task: &str) -> Vec<String> {
    split_on(task, ORDER_MARKERS)
}

/// Split a task into independent parts joined by conjunctions.
pub fn independent_clauses(task: &str) -> Vec<String> {
    split_on(task, CONJUNCTIONS)
}

/// Whether the text states a dependency order between steps.
pub fn has_dependency_order(text: &str) -> bool {
    ordered_clauses(text).len() > 1
}

/// First `max_chars` characters of `text`, on a char boundary.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_drops_stopwords() {
        assert_eq!(
            tokenize("Write a report on the Market"),
            vec!["write", "report", "market"]
        );
        assert!(tokenize("2+2").is_empty());
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity("research rust", "research rust"), 1.0);
        assert_eq!(similarity("alpha beta", "gamma delta"), 0.0);
        let s = similarity("research rust async", "research rust");
        assert!(s > 0.6 && s < 0.7);
    }

    #[test]
    fn test_words_match() {
        assert!(words_match("write", "writer"));
        assert!(words_match("researcher", "research"));
        assert!(!words_match("run", "running"));
        assert!(!words_match("code", "report"));
    }

    #[test]
    fn test_mentions() {
        assert!(mentions("Please research Rust", "research"));
        assert!(mentions("look up the weather", "look up"));
        assert!(!mentions("calculating totals", "calculate"));
        assert!(mentions("calculate totals", "calculate"));
        assert!(!mentions("the brunch menu", "run"));
    }

    #[test]
    fn test_ordered_clauses() {
        assert_eq!(
            ordered_clauses("Research X then write a report on X"),
            vec!["Research X", "write a report on X"]
        );
        assert_eq!(
            ordered_clauses("Find data, then clean it, and finally plot it."),
            vec!["Find data", "clean it", "plot it"]
        );
        assert_eq!(ordered_clauses("2+2"), vec!["2+2"]);
        assert!(has_dependency_order("Search first and then summarise"));
        assert!(!has_dependency_order("Summarise the article"));
    }

    #[test]
    fn test_independent_clauses() {
        assert_eq!(
            independent_clauses("Search the news and compute the average price"),
            vec!["Search the news", "compute the average price"]
        );
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdefghij", 4), "abcd...");
    }
}
