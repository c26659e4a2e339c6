//! Token accounting and cost estimation.

use serde::{Deserialize, Serialize};

/// Price of a model, in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    /// Price per million input tokens.
    pub input_per_million: f64,
    /// Price per million output tokens.
    pub output_per_million: f64,
}

impl ModelPricing {
    const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Pricing tier applied to models missing from the table.
    pub const DEFAULT: ModelPricing = ModelPricing::new(3.0, 15.0);

    /// Look up the pricing for a model identifier.
    pub fn for_model(model: &str) -> ModelPricing {
        PRICE_TABLE
            .iter()
            .find(|(name, _)| *name == model)
            .map(|(_, pricing)| *pricing)
            .unwrap_or(Self::DEFAULT)
    }
}

static PRICE_TABLE: [(&str, ModelPricing); 3] = [
    ("claude-sonnet-4-20250514", ModelPricing::new(3.0, 15.0)),
    ("claude-opus-4-20250514", ModelPricing::new(15.0, 75.0)),
    ("claude-haiku-3-5-20241022", ModelPricing::new(0.8, 4.0)),
];

/// Running token totals for one research session.
///
/// Counters only grow; [`UsageLedger::cost`] is derived from them on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLedger {
    /// Model the tokens were spent on.
    pub model: String,
    /// Input tokens across all calls.
    pub input_tokens: u64,
    /// Output tokens across all calls.
    pub output_tokens: u64,
}

impl UsageLedger {
    /// Create an empty ledger for a model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Add one call's token counts.
    pub fn accumulate(&mut self, input_tokens: u32, output_tokens: u32) {
        self.input_tokens += u64::from(input_tokens);
        self.output_tokens += u64::from(output_tokens);
    }

    /// Add the usage reported by an LLM response.
    pub fn record(&mut self, usage: &sleuth_llm::Usage) {
        self.accumulate(usage.input_tokens, usage.output_tokens);
    }

    /// Total tokens used (input + output).
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Estimated cost in USD.
    pub fn cost(&self) -> f64 {
        let pricing = ModelPricing::for_model(&self.model);
        (self.input_tokens as f64 / 1_000_000.0) * pricing.input_per_million
            + (self.output_tokens as f64 / 1_000_000.0) * pricing.output_per_million
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_pricing_table() {
        assert_eq!(
            ModelPricing::for_model("claude-opus-4-20250514"),
            ModelPricing::new(15.0, 75.0)
        );
        assert_eq!(
            ModelPricing::for_model("claude-haiku-3-5-20241022"),
            ModelPricing::new(0.8, 4.0)
        );
        assert_eq!(ModelPricing::for_model("some-future-model"), ModelPricing::DEFAULT);
    }

    #[test]
    fn test_accumulate_and_total() {
        let mut ledger = UsageLedger::new("claude-sonnet-4-20250514");
        assert_eq!(ledger.total(), 0);
        assert!(approx_eq(ledger.cost(), 0.0));

        ledger.accumulate(1000, 200);
        ledger.record(&sleuth_llm::Usage::new(500, 100));
        assert_eq!(ledger.input_tokens, 1500);
        assert_eq!(ledger.output_tokens, 300);
        assert_eq!(ledger.total(), 1800);
    }

    #[test]
    fn test_cost_by_model() {
        let mut sonnet = UsageLedger::new("claude-sonnet-4-20250514");
        sonnet.accumulate(1_000_000, 1_000_000);
        assert!(approx_eq(sonnet.cost(), 18.0));

        let mut opus = UsageLedger::new("claude-opus-4-20250514");
        opus.accumulate(2_000_000, 100_000);
        assert!(approx_eq(opus.cost(), 37.5));

        let mut unknown = UsageLedger::new("mystery");
        unknown.accumulate(1_000_000, 0);
        assert!(approx_eq(unknown.cost(), 3.0));
    }

    #[test]
    fn test_cost_is_idempotent_and_non_decreasing() {
        let mut ledger = UsageLedger::new("claude-haiku-3-5-20241022");
        ledger.accumulate(12_345, 678);
        let first = ledger.cost();
        assert_eq!(first, ledger.cost());

        ledger.accumulate(0, 0);
        assert_eq!(first, ledger.cost());
        ledger.accumulate(1, 1);
        assert!(ledger.cost() > first);
    }

    #[test]
    fn test_ledger_does_not_overflow_u32() {
        let mut ledger = UsageLedger::new("m");
        ledger.accumulate(u32::MAX, u32::MAX);
        ledger.accumulate(u32::MAX, 0);
        assert_eq!(ledger.input_tokens, 2 * u64::from(u32::MAX));
    }
}
