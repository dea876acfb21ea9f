use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Product policy
// ---------------------------------------------------------------------------

/// Per-product price bounds loaded from the products config.
/// `min_price` is the cost floor, `max_price` the normal selling price we revert to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPolicy {
    pub product_id: String,
    pub min_price: i64,
    pub max_price: i64,
}

impl ProductPolicy {
    /// Returns None when the bounds are inverted.
    pub fn new(product_id: impl Into<String>, min_price: i64, max_price: i64) -> Option<Self> {
        if min_price > max_price {
            return None;
        }
        Some(Self {
            product_id: product_id.into(),
            min_price,
            max_price,
        })
    }
}

// ---------------------------------------------------------------------------
// Competitor signal
// ---------------------------------------------------------------------------

/// What a single observation of the product page told us.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "price", rename_all = "snake_case")]
pub enum Observation {
    /// Lowest competing offer, in whole or fractional currency units.
    Price(f64),
    /// Our own listing is the winning offer.
    OwnsBuybox,
}

impl Observation {
    /// A numeric observation is only usable when it is a finite positive price.
    pub fn is_usable(&self) -> bool {
        match self {
            Observation::Price(p) => p.is_finite() && *p > 0.0,
            Observation::OwnsBuybox => true,
        }
    }
}

/// Resolved competitor input to a pricing decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "price", rename_all = "snake_case")]
pub enum CompetitorSignal {
    Absent,
    OwnsBuybox,
    Price(f64),
}

impl CompetitorSignal {
    pub fn price(&self) -> Option<f64> {
        match self {
            CompetitorSignal::Price(p) => Some(*p),
            _ => None,
        }
    }
}

impl From<Observation> for CompetitorSignal {
    fn from(obs: Observation) -> Self {
        match obs {
            Observation::Price(p) => CompetitorSignal::Price(p),
            Observation::OwnsBuybox => CompetitorSignal::OwnsBuybox,
        }
    }
}

impl From<Option<Observation>> for CompetitorSignal {
    fn from(obs: Option<Observation>) -> Self {
        obs.map(CompetitorSignal::from).unwrap_or(CompetitorSignal::Absent)
    }
}

impl std::fmt::Display for CompetitorSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompetitorSignal::Absent => write!(f, "absent"),
            CompetitorSignal::OwnsBuybox => write!(f, "owns_buybox"),
            CompetitorSignal::Price(p) => write!(f, "R{p}"),
        }
    }
}

/// Which resolution tier produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Monitored,
    Cached,
    LiveFetch,
    Fallback,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Monitored => "monitored",
            SignalSource::Cached => "cached",
            SignalSource::LiveFetch => "live_fetch",
            SignalSource::Fallback => "fallback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "monitored" => Some(SignalSource::Monitored),
            "cached" => Some(SignalSource::Cached),
            "live_fetch" => Some(SignalSource::LiveFetch),
            "fallback" => Some(SignalSource::Fallback),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Stored competitor price
// ---------------------------------------------------------------------------

/// Authoritative competitor observation for one product. Always replaced wholesale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetitorPriceRecord {
    pub product_id: String,
    pub observation: Observation,
    /// Unix seconds.
    pub observed_at: i64,
    pub source: SignalSource,
}

impl CompetitorPriceRecord {
    /// Fresh while strictly younger than `window_secs`.
    pub fn is_fresh(&self, now_secs: i64, window_secs: i64) -> bool {
        now_secs - self.observed_at < window_secs
    }
}

// ---------------------------------------------------------------------------
// Pricing decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    /// We already hold the buybox; leave the price alone.
    OwnBuybox,
    /// No usable competitor price; revert to the selling price.
    NoSignalRevert,
    /// Competitor is below our cost floor; revert to the selling price.
    RevertToMax,
    /// Our price already equals the competitor's; hold.
    Matched,
    /// One unit below the competitor falls outside our bounds.
    ClampedRevert,
    /// One unit below the competitor.
    Undercut,
}

impl Rule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rule::OwnBuybox => "OWN_BUYBOX",
            Rule::NoSignalRevert => "NO_SIGNAL_REVERT",
            Rule::RevertToMax => "REVERT_TO_MAX",
            Rule::Matched => "MATCHED",
            Rule::ClampedRevert => "CLAMPED_REVERT",
            Rule::Undercut => "UNDERCUT",
        }
    }
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct PricingRequest<'a> {
    pub my_price: f64,
    pub signal: CompetitorSignal,
    pub policy: &'a ProductPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PricingResult {
    pub new_price: i64,
    pub changed: bool,
    pub rule_applied: Rule,
}

// ---------------------------------------------------------------------------
// Webhook pipeline
// ---------------------------------------------------------------------------

/// Validated inbound price-change notification.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceChangeEvent {
    pub product_id: String,
    pub my_current_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepriceOutcome {
    /// New price accepted by the seller API.
    Updated,
    /// New price computed but every submission attempt failed.
    SubmitFailed,
    /// Decision left the price where it was.
    Unchanged,
    /// No policy configured for the product.
    SkippedNoPolicy,
}

impl std::fmt::Display for RepriceOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RepriceOutcome::Updated => "updated",
            RepriceOutcome::SubmitFailed => "submit_failed",
            RepriceOutcome::Unchanged => "unchanged",
            RepriceOutcome::SkippedNoPolicy => "skipped_no_policy",
        };
        write!(f, "{s}")
    }
}

/// One completed pipeline run, sent to the DB writer.
#[derive(Debug, Clone)]
pub struct RepriceLogEntry {
    pub product_id: String,
    pub my_price: f64,
    pub signal: CompetitorSignal,
    pub source: Option<SignalSource>,
    pub result: Option<PricingResult>,
    pub outcome: RepriceOutcome,
    /// Unix seconds.
    pub created_at: i64,
}
