//! Static sector tables: correlation coefficients and the keyword lexicon
//! used to detect sectors mentioned in event text.

use routing_core::Sector;
use std::collections::BTreeSet;

/// How strongly news about a sector tends to move holdings in that sector
pub fn sector_correlation(sector: Sector) -> f64 {
    match sector {
        Sector::Financials => 0.9,
        Sector::Technology => 0.8,
        Sector::Energy => 0.8,
        Sector::Healthcare => 0.7,
        Sector::ConsumerDiscretionary => 0.7,
        Sector::Industrials => 0.7,
        Sector::Materials => 0.7,
        Sector::ConsumerStaples => 0.6,
        Sector::RealEstate => 0.6,
        Sector::Utilities => 0.5,
    }
}

fn sector_keywords(sector: Sector) -> &'static [&'static str] {
    match sector {
        Sector::Technology => &[
            "tech", "technology", "software", "ai", "artificial intelligence", "cloud",
            "semiconductor", "chip", "chipmaker",
        ],
        Sector::Healthcare => &[
            "health", "healthcare", "pharma", "pharmaceutical", "biotech", "drug",
            "medical", "fda", "hospital",
        ],
        Sector::Financials => &[
            "bank", "banking", "financial", "lending", "lender", "credit", "interest rate",
            "fed", "insurance",
        ],
        Sector::Energy => &[
            "oil", "gas", "energy", "renewable", "solar", "opec", "crude", "pipeline",
        ],
        Sector::ConsumerDiscretionary => &[
            "retail", "consumer spending", "automotive", "auto", "luxury", "e commerce",
            "ecommerce", "apparel",
        ],
        Sector::ConsumerStaples => &[
            "food", "beverage", "grocery", "household", "staples", "tobacco",
        ],
        Sector::Industrials => &[
            "manufacturing", "industrial", "aerospace", "defense", "logistics", "airline",
            "railroad",
        ],
        Sector::Materials => &[
            "mining", "chemical", "steel", "commodity", "commodities", "lumber", "copper",
        ],
        Sector::Utilities => &[
            "utility", "utilities", "electricity", "power grid", "water supply",
        ],
        Sector::RealEstate => &[
            "real estate", "reit", "housing", "property", "properties", "mortgage",
        ],
    }
}

/// Keyword lexicon, pre-tokenized once at construction
#[derive(Debug, Clone)]
pub struct SectorLexicon {
    entries: Vec<(Sector, Vec<Vec<String>>)>,
}

impl Default for SectorLexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl SectorLexicon {
    pub fn new() -> Self {
        let entries = Sector::ALL
            .into_iter()
            .map(|sector| {
                let phrases = sector_keywords(sector)
                    .iter()
                    .map(|kw| tokenize(kw))
                    .collect();
                (sector, phrases)
            })
            .collect();
        Self { entries }
    }

    /// Sectors whose keywords appear in `text`.
    ///
    /// Matching is on whole lowercase tokens; the last token of a keyword
    /// also matches its plural ("bank" matches "banks"). Single-word
    /// keywords of four or more letters also match as the tail of a
    /// compound ("fintech", "microchips"). Shorter ones never do, so "ai"
    /// stays out of "said".
    pub fn detect(&self, text: &str) -> BTreeSet<Sector> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return BTreeSet::new();
        }

        self.entries
            .iter()
            .filter(|(_, phrases)| phrases.iter().any(|p| contains_phrase(&tokens, p)))
            .map(|(sector, _)| *sector)
            .collect()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

const MIN_COMPOUND_KEYWORD_LEN: usize = 4;

fn contains_phrase(tokens: &[String], phrase: &[String]) -> bool {
    if phrase.is_empty() || phrase.len() > tokens.len() {
        return false;
    }
    if let [keyword] = phrase {
        return tokens.iter().any(|token| token_matches(token, keyword));
    }
    let last = phrase.len() - 1;
    tokens.windows(phrase.len()).any(|window| {
        window.iter().zip(phrase).enumerate().all(|(i, (token, kw))| {
            token == kw || (i == last && token.strip_suffix('s') == Some(kw.as_str()))
        })
    })
}

fn token_matches(token: &str, keyword: &str) -> bool {
    let singular = token.strip_suffix('s').unwrap_or(token);
    if token == keyword || singular == keyword {
        return true;
    }
    keyword.len() >= MIN_COMPOUND_KEYWORD_LEN
        && (token.ends_with(keyword) || singular.ends_with(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_range() {
        for sector in Sector::ALL {
            let c = sector_correlation(sector);
            assert!((0.5..=0.9).contains(&c), "{sector} out of range: {c}");
        }
        assert_eq!(sector_correlation(Sector::Financials), 0.9);
        assert_eq!(sector_correlation(Sector::Utilities), 0.5);
    }

    #[test]
    fn test_detect_single_keywords() {
        let lexicon = SectorLexicon::new();
        let found = lexicon.detect("Cloud software spending accelerates");
        assert!(found.contains(&Sector::Technology));
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_detect_plural_and_phrase() {
        let lexicon = SectorLexicon::new();
        let found = lexicon.detect("Banks rally as interest rates climb; REITs slide");
        assert!(found.contains(&Sector::Financials));
        assert!(found.contains(&Sector::RealEstate));
    }

    #[test]
    fn test_detect_ignores_substrings() {
        let lexicon = SectorLexicon::new();
        // "said" contains "ai", "oiled" contains "oil"
        let found = lexicon.detect("The CEO said the machine was well oiled");
        assert!(found.is_empty());
    }

    #[test]
    fn test_detect_compound_words() {
        let lexicon = SectorLexicon::new();
        let found = lexicon.detect("Fintech lender growth");
        assert!(found.contains(&Sector::Technology));
        assert!(found.contains(&Sector::Financials));

        let found = lexicon.detect("Microchips in short supply");
        assert!(found.contains(&Sector::Technology));

        // short keywords stay whole-token only
        assert!(lexicon.detect("Toil and trouble").is_empty());
    }

    #[test]
    fn test_detect_empty_text() {
        assert!(SectorLexicon::new().detect("").is_empty());
        assert!(SectorLexicon::new().detect("  ,.;  ").is_empty());
    }
}
