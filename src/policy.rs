use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::engine::ports::PolicySource;
use crate::error::{AppError, Result};
use crate::types::ProductPolicy;

const COL_OFFER_ID: &str = "OfferID";
const COL_SELLING_PRICE: &str = "SellingPrice";
const COL_COST_PRICE: &str = "CostPrice";

/// Product bounds from a CSV with `OfferID`, `SellingPrice` and `CostPrice` columns
/// (any order, extra columns ignored). Cost price is the floor, selling price the ceiling.
pub struct CsvPolicySource {
    path: PathBuf,
}

impl CsvPolicySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PolicySource for CsvPolicySource {
    fn load_all(&self) -> Result<HashMap<String, ProductPolicy>> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            AppError::PolicyLoad(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let (policies, stats) = parse_policies(&text)?;
        info!(
            path = %self.path.display(),
            loaded = policies.len(),
            rejected = stats.rejected,
            duplicates = stats.duplicates,
            "Loaded {} product policies",
            policies.len(),
        );
        Ok(policies)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub rejected: usize,
    pub duplicates: usize,
}

/// Parse the whole CSV. A missing required column fails the load; a bad row is
/// skipped and logged so one typo doesn't take every product offline.
pub fn parse_policies(text: &str) -> Result<(HashMap<String, ProductPolicy>, ParseStats)> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Err(AppError::PolicyLoad("products config is empty".to_string()));
    };
    let header = split_row(header.trim_start_matches('\u{feff}'));
    let col = |name: &str| {
        header
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| AppError::PolicyLoad(format!("missing column {name}")))
    };
    let id_idx = col(COL_OFFER_ID)?;
    let sell_idx = col(COL_SELLING_PRICE)?;
    let cost_idx = col(COL_COST_PRICE)?;

    let mut policies = HashMap::new();
    let mut stats = ParseStats::default();

    for (line_no, line) in lines {
        let fields = split_row(line);
        let get = |idx: usize| fields.get(idx).map(String::as_str).unwrap_or("");

        let product_id = get(id_idx).to_string();
        let max_price = parse_price(get(sell_idx));
        let min_price = parse_price(get(cost_idx));

        let policy = match (product_id.is_empty(), min_price, max_price) {
            (false, Some(min), Some(max)) => ProductPolicy::new(product_id, min, max),
            _ => None,
        };
        let Some(policy) = policy else {
            warn!(line = line_no + 1, row = %line, "Skipping invalid product policy row");
            stats.rejected += 1;
            continue;
        };

        if policies.contains_key(&policy.product_id) {
            warn!(product_id = %policy.product_id, "Duplicate product policy, last row wins");
            stats.duplicates += 1;
        }
        policies.insert(policy.product_id.clone(), policy);
    }

    Ok((policies, stats))
}

/// Comma split with double-quote support (no embedded newlines).
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Whole currency units; `R1,299.00` → 1299. Negative or unparseable → None.
fn parse_price(raw: &str) -> Option<i64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('R')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let value = cleaned.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value.trunc() as i64)
}
