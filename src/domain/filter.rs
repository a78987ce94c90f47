use super::Headline;

/// Lowercased terms that drop any headline mentioning them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionFilter {
    terms: Vec<String>,
}

impl ExclusionFilter {
    /// Entries may hold several terms separated by commas, semicolons or spaces.
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut terms: Vec<String> = Vec::new();
        for entry in entries {
            for term in entry
                .as_ref()
                .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
            {
                if !terms.contains(&term) {
                    terms.push(term);
                }
            }
        }
        Self { terms }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn excludes(&self, headline: &Headline) -> bool {
        if self.terms.is_empty() {
            return false;
        }
        let haystack = headline.haystack();
        self.terms.iter().any(|term| haystack.contains(term.as_str()))
    }

    pub fn apply(&self, headlines: Vec<Headline>) -> Vec<Headline> {
        if self.terms.is_empty() {
            return headlines;
        }
        headlines.into_iter().filter(|h| !self.excludes(h)).collect()
    }
}
