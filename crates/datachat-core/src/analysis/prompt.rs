use regex::Regex;

/// Decides whether a prompt asks for a visualization.
pub trait PlotIntent: Send + Sync {
    fn requires_plot(&self, prompt: &str) -> bool;
}

const PLOT_KEYWORDS: &[&str] = &[
    "plot",
    "chart",
    "graph",
    "visualize",
    "visualization",
    "visualise",
    "visualisation",
    "bar chart",
    "line chart",
    "pie chart",
    "scatter plot",
    "histogram",
    "heatmap",
    "box plot",
    "boxplot",
    "draw",
    "show me",
    "create a",
];

const PLOT_PATTERNS: &[&str] = &[
    r"show.*\b(distribution|trend|comparison|correlation)\b",
    r"compare.*\b(using|with|via)\b",
    r"display.*\b(data|results|analysis)\b.*visually",
];

/// Keyword heuristic. Misses are expected; it is not a classifier.
pub struct KeywordPlotDetector {
    keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl KeywordPlotDetector {
    pub fn new() -> Self {
        Self {
            keywords: PLOT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            patterns: PLOT_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keywords.push(keyword.into().to_lowercase());
        self
    }
}

impl Default for KeywordPlotDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotIntent for KeywordPlotDetector {
    fn requires_plot(&self, prompt: &str) -> bool {
        if prompt.trim().is_empty() {
            return false;
        }
        let lower = prompt.to_lowercase();

        if let Some(keyword) = self.keywords.iter().find(|k| lower.contains(k.as_str())) {
            tracing::info!("Plot request detected - keyword: '{keyword}'");
            return true;
        }
        if let Some(pattern) = self.patterns.iter().find(|p| p.is_match(&lower)) {
            tracing::info!("Plot request detected - pattern match: {}", pattern.as_str());
            return true;
        }

        tracing::debug!("No plot request detected in prompt");
        false
    }
}

/// `requires_plot` with the stock keyword set.
pub fn requires_plot(prompt: &str) -> bool {
    KeywordPlotDetector::new().requires_plot(prompt)
}
