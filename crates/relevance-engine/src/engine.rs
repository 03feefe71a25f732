//! Relevance scoring of one event against one portfolio.

use routing_core::{
    Event, EventMetadata, EventSentiment, Portfolio, RelevanceLevel, RelevanceScore, Sector,
};
use std::collections::BTreeSet;

use crate::sectors::{sector_correlation, SectorLexicon};

/// Weights for the four scoring components
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceWeights {
    /// Direct ticker / company-name matches
    pub entity_match: f64,
    /// Exposure to sectors the event talks about
    pub sector_correlation: f64,
    /// Strength of sentiment on matched entities
    pub sentiment_impact: f64,
    /// Concentration of the affected positions
    pub position_weight: f64,
}

impl Default for RelevanceWeights {
    fn default() -> Self {
        Self {
            entity_match: 0.40,
            sector_correlation: 0.25,
            sentiment_impact: 0.20,
            position_weight: 0.15,
        }
    }
}

struct EntityMatch {
    score: f64,
    matched: Vec<String>,
    affected: Vec<String>,
}

/// Pure scoring function over static sector tables
#[derive(Debug, Clone)]
pub struct RelevanceEngine {
    weights: RelevanceWeights,
    lexicon: SectorLexicon,
}

impl Default for RelevanceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RelevanceEngine {
    pub fn new() -> Self {
        Self::with_weights(RelevanceWeights::default())
    }

    pub fn with_weights(weights: RelevanceWeights) -> Self {
        Self {
            weights,
            lexicon: SectorLexicon::new(),
        }
    }

    pub fn weights(&self) -> &RelevanceWeights {
        &self.weights
    }

    /// Score a full [`Event`] against a portfolio
    pub fn score_event(&self, event: &Event, portfolio: &Portfolio) -> RelevanceScore {
        self.calculate_relevance(
            &event.text,
            &event.entities,
            event.sentiment.as_ref(),
            portfolio,
            &event.metadata,
        )
    }

    /// Calculate how relevant an event is to a user's portfolio.
    ///
    /// Never fails: missing sentiment, empty holdings or unknown sectors
    /// only drive the affected components to zero.
    pub fn calculate_relevance(
        &self,
        event_text: &str,
        event_entities: &[String],
        event_sentiment: Option<&EventSentiment>,
        portfolio: &Portfolio,
        event_metadata: &EventMetadata,
    ) -> RelevanceScore {
        // 1. Entity match
        let entity = self.entity_match(event_text, event_entities, portfolio);

        // 2. Sector correlation
        let sector_score = self.sector_correlation_score(event_text, event_metadata, portfolio);

        // 3. Sentiment impact
        let sentiment_score = self.sentiment_impact_score(event_sentiment, &entity);

        // 4. Position weight
        let position_score = self.position_weight_score(&entity.affected, portfolio);

        let base = entity.score * self.weights.entity_match
            + sector_score * self.weights.sector_correlation
            + sentiment_score * self.weights.sentiment_impact
            + position_score * self.weights.position_weight;

        let overall_score =
            (base * self.position_multiplier(&entity.affected, portfolio)).clamp(0.0, 1.0);
        let level = RelevanceLevel::from_score(overall_score);

        let reasoning = Self::build_reasoning(
            entity.score,
            sector_score,
            sentiment_score,
            position_score,
            &entity.affected,
        );
        let confidence = Self::calculate_confidence(
            event_entities.len(),
            event_sentiment,
            entity.matched.len(),
            portfolio.holdings.len(),
        );

        tracing::trace!(
            user_id = %portfolio.user_id,
            overall_score,
            relevance_level = %level,
            "scored event against portfolio"
        );

        RelevanceScore {
            overall_score,
            level,
            entity_match_score: entity.score,
            sector_correlation_score: sector_score,
            sentiment_impact_score: sentiment_score,
            position_weight_score: position_score,
            matched_entities: entity.matched,
            affected_positions: entity.affected,
            reasoning,
            confidence,
        }
    }

    /// Exact ticker hits first, then company-name substrings in the text.
    /// Repeated mentions of the same position count once.
    fn entity_match(&self, text: &str, entities: &[String], portfolio: &Portfolio) -> EntityMatch {
        let mut matched = Vec::new();
        let mut affected: Vec<String> = Vec::new();
        let mut exact_matches = 0usize;

        for entity in entities {
            let symbol = entity.trim().to_uppercase();
            if symbol.is_empty() || affected.contains(&symbol) {
                continue;
            }
            if portfolio
                .holdings
                .iter()
                .any(|h| h.symbol.to_uppercase() == symbol)
            {
                matched.push(symbol.clone());
                affected.push(symbol);
                exact_matches += 1;
            }
        }

        let text_lower = text.to_lowercase();
        for holding in &portfolio.holdings {
            let symbol = holding.symbol.to_uppercase();
            if affected.contains(&symbol) {
                continue;
            }
            let name = holding.name.trim().to_lowercase();
            if name.chars().count() > 3 && text_lower.contains(&name) {
                matched.push(holding.name.clone());
                affected.push(symbol);
            }
        }

        let score = if matched.is_empty() {
            0.0
        } else {
            let broad = (0.3 * matched.len() as f64).min(0.9);
            if exact_matches > 0 {
                (broad + 0.2 * exact_matches as f64).min(1.0)
            } else {
                broad
            }
        };

        EntityMatch {
            score,
            matched,
            affected,
        }
    }

    fn sector_correlation_score(
        &self,
        text: &str,
        metadata: &EventMetadata,
        portfolio: &Portfolio,
    ) -> f64 {
        let mut sectors: BTreeSet<Sector> = metadata
            .sectors
            .iter()
            .filter_map(|s| Sector::parse(s))
            .collect();
        sectors.extend(self.lexicon.detect(text));

        if sectors.is_empty() {
            return 0.0;
        }

        let base = portfolio.weighting_base();
        let score: f64 = sectors
            .iter()
            .map(|sector| {
                let exposure: f64 = portfolio
                    .holdings
                    .iter()
                    .filter(|h| h.sector == Some(*sector))
                    .map(|h| h.market_value_f64().max(0.0))
                    .sum();
                (exposure / base) * sector_correlation(*sector)
            })
            .sum();

        score.clamp(0.0, 1.0)
    }

    /// Sentiment only counts when the event touches the portfolio
    fn sentiment_impact_score(
        &self,
        sentiment: Option<&EventSentiment>,
        entity: &EntityMatch,
    ) -> f64 {
        let Some(sentiment) = sentiment else {
            return 0.0;
        };
        if entity.matched.is_empty() {
            return 0.0;
        }

        let overall = &sentiment.overall;
        let mut impact = finite(overall.score).abs() * finite(overall.confidence).clamp(0.0, 1.0);

        for es in &sentiment.entities {
            let upper = es.entity.trim().to_uppercase();
            let names_match = entity
                .matched
                .iter()
                .any(|m| m.eq_ignore_ascii_case(es.entity.trim()));
            if entity.affected.contains(&upper) || names_match {
                impact += 0.2 * finite(es.sentiment.score).abs();
            }
        }

        impact.clamp(0.0, 1.0)
    }

    fn position_weight_score(&self, affected: &[String], portfolio: &Portfolio) -> f64 {
        let score: f64 = affected
            .iter()
            .filter_map(|symbol| portfolio.holding(symbol))
            .map(|holding| {
                let weight = portfolio.weight_of(holding);
                if weight >= 0.10 {
                    0.8
                } else if weight >= 0.05 {
                    0.6
                } else if weight >= 0.02 {
                    0.4
                } else {
                    0.2
                }
            })
            .sum();

        score.clamp(0.0, 1.0)
    }

    /// Boost from the single largest affected position
    fn position_multiplier(&self, affected: &[String], portfolio: &Portfolio) -> f64 {
        let largest = portfolio
            .holdings
            .iter()
            .filter(|h| affected.iter().any(|s| s.eq_ignore_ascii_case(&h.symbol)))
            .map(|h| portfolio.weight_of(h))
            .fold(0.0_f64, f64::max);

        if largest >= 0.15 {
            1.3
        } else if largest >= 0.10 {
            1.2
        } else if largest >= 0.05 {
            1.1
        } else {
            1.0
        }
    }

    fn build_reasoning(
        entity: f64,
        sector: f64,
        sentiment: f64,
        position: f64,
        affected: &[String],
    ) -> String {
        let mut reasons = Vec::new();

        if entity > 0.5 {
            reasons.push(format!("Direct holdings match: {}", affected.join(", ")));
        }
        if sector > 0.3 {
            reasons.push("Sector correlation detected".to_string());
        }
        if sentiment > 0.6 {
            reasons.push("Strong sentiment impact".to_string());
        } else if sentiment > 0.3 {
            reasons.push("Moderate sentiment impact".to_string());
        }
        if position > 0.6 {
            reasons.push("Large position exposure".to_string());
        } else if position > 0.3 {
            reasons.push("Notable position exposure".to_string());
        }

        if reasons.is_empty() {
            "Low relevance to portfolio holdings".to_string()
        } else {
            reasons.join("; ")
        }
    }

    /// Evidence behind the score; never feeds back into `overall_score`
    fn calculate_confidence(
        entity_count: usize,
        sentiment: Option<&EventSentiment>,
        matched_count: usize,
        holdings_count: usize,
    ) -> f64 {
        let mut confidence = 0.5;

        if entity_count >= 3 {
            confidence += 0.2;
        } else if entity_count >= 1 {
            confidence += 0.1;
        }

        if let Some(s) = sentiment {
            confidence += finite(s.overall.confidence).clamp(0.0, 1.0) * 0.2;
        }

        confidence += (matched_count as f64 * 0.1).min(0.3);

        if holdings_count >= 10 {
            confidence += 0.1;
        }

        confidence.clamp(0.0, 1.0)
    }
}

fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
