use crate::types::{CompetitorSignal, PricingRequest, PricingResult, Rule};

/// Marketplace prices are whole currency units; everything is truncated before comparison.
#[inline]
fn whole_units(price: f64) -> i64 {
    price.trunc() as i64
}

/// Decide the new price for one product. Pure: no I/O, no hidden state.
///
/// Rules, in order:
/// 1. `OwnsBuybox` → keep `my_price`.
/// 2. Absent or non-positive competitor → `max_price`.
/// 3. Competitor below `min_price` → `max_price`.
/// 4. `my_price == competitor` within bounds → hold.
/// 5. `competitor - 1` inside `[min_price, max_price]` → undercut, else `max_price`.
pub fn decide(
    my_price: f64,
    signal: CompetitorSignal,
    min_price: i64,
    max_price: i64,
) -> (i64, Rule) {
    let my_price = whole_units(my_price);

    let competitor = match signal {
        CompetitorSignal::OwnsBuybox => return (my_price, Rule::OwnBuybox),
        CompetitorSignal::Absent => return (max_price, Rule::NoSignalRevert),
        CompetitorSignal::Price(p) if !p.is_finite() => return (max_price, Rule::NoSignalRevert),
        CompetitorSignal::Price(p) => whole_units(p),
    };

    if competitor <= 0 {
        return (max_price, Rule::NoSignalRevert);
    }

    if competitor < min_price {
        return (max_price, Rule::RevertToMax);
    }

    // Undercutting an equal price would chase our own listing down one unit per event.
    if my_price == competitor && competitor <= max_price {
        return (my_price, Rule::Matched);
    }

    let candidate = competitor - 1;
    if candidate < min_price || candidate > max_price {
        (max_price, Rule::ClampedRevert)
    } else {
        (candidate, Rule::Undercut)
    }
}

/// Run [`decide`] for a request and report whether the price actually moves.
pub fn evaluate(req: &PricingRequest<'_>) -> PricingResult {
    let (new_price, rule_applied) = decide(
        req.my_price,
        req.signal,
        req.policy.min_price,
        req.policy.max_price,
    );
    PricingResult {
        new_price,
        changed: new_price != whole_units(req.my_price),
        rule_applied,
    }
}
