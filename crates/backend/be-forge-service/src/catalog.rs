//! Fixed payloads served in place of the agent pipeline.

use crate::types::MarketAnalysis;

pub struct ScrapedIdea {
    pub title: &'static str,
    pub url: &'static str,
}

/// Suggestions from Reddit followed by Hacker News.
pub const SCRAPED_IDEAS: [ScrapedIdea; 5] = [
    ScrapedIdea {
        title: "Build a tool that converts any website to an API",
        url: "https://reddit.com/r/programming/123",
    },
    ScrapedIdea {
        title: "AI-powered code review assistant for small teams",
        url: "https://reddit.com/r/programming/456",
    },
    ScrapedIdea {
        title: "Privacy-focused alternative to Google Analytics",
        url: "https://reddit.com/r/webdev/789",
    },
    ScrapedIdea {
        title: "Open source Figma alternative with real-time collaboration",
        url: "https://news.ycombinator.com/item?id=123",
    },
    ScrapedIdea {
        title: "Self-hosted email marketing platform for developers",
        url: "https://news.ycombinator.com/item?id=456",
    },
];

pub const MIN_TREND_SCORE: u8 = 10;
pub const MAX_TREND_SCORE: u8 = 100;
/// Ideas scoring strictly above this are validated.
pub const VALIDATION_THRESHOLD: u8 = 50;

pub fn seo_titles(name: &str) -> Vec<String> {
    vec![
        format!("10 Ways {name} Can Revolutionize Your Workflow"),
        format!("Why {name} is the Next Big Thing in Tech"),
        format!("How to Get Started with {name} in 5 Minutes"),
    ]
}

pub fn market_analysis(idea: &str) -> MarketAnalysis {
    MarketAnalysis {
        idea: idea.to_string(),
        market_size: "$1-5B".to_string(),
        growth_potential: 8,
        competition_level: 6,
        barriers_to_entry: 4,
        target_audience: vec![
            "Startup founders".to_string(),
            "Indie developers".to_string(),
            "Small engineering teams".to_string(),
        ],
    }
}

/// Lowercases `title` and joins its alphanumeric runs with `-`.
pub fn slugify(title: &str) -> String {
    title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(
            slugify("AI-powered code review assistant for small teams"),
            "ai-powered-code-review-assistant-for-small-teams"
        );
        assert_eq!(slugify("  Hello,   World! "), "hello-world");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn seo_titles_mention_the_product() {
        let titles = seo_titles("Forge");
        assert_eq!(titles.len(), 3);
        assert!(titles.iter().all(|t| t.contains("Forge")));
    }
}
