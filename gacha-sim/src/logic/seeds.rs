use anyhow::{Context, Result, bail, ensure};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Seeds expanded from a single range token are capped to keep runs bounded.
const MAX_RANGE_LEN: u64 = 10_000;

static RANGE_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(0x[0-9a-fA-F]+|\d+)\.\.(=?)(0x[0-9a-fA-F]+|\d+)$").expect("valid seed regex")
});
static HEX_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0[xX]([0-9a-fA-F]{1,16})$").expect("valid seed regex"));

/// A resolved seed and the token that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedInfo {
    pub seed: u64,
    pub source: String,
}

impl SeedInfo {
    #[must_use]
    pub fn new(seed: u64, source: impl Into<String>) -> Self {
        Self {
            seed,
            source: source.into(),
        }
    }
}

/// Resolve CLI seed tokens into a deduplicated, ordered seed list.
///
/// Supports decimal integers (negative values use their magnitude), `0x` hex,
/// and `a..b` / `a..=b` ranges.
pub fn resolve_seed_inputs(tokens: &[String]) -> Result<Vec<SeedInfo>> {
    let mut pending: Vec<SeedInfo> = Vec::new();

    for token in tokens {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        if let Some(caps) = RANGE_TOKEN.captures(token) {
            let start = parse_single(&caps[1])?;
            let end = parse_single(&caps[3])?;
            let end = if &caps[2] == "=" {
                end.saturating_add(1)
            } else {
                end
            };
            ensure!(start < end, "empty seed range: {token}");
            ensure!(
                end - start <= MAX_RANGE_LEN,
                "seed range {token} exceeds {MAX_RANGE_LEN} seeds"
            );
            pending.extend((start..end).map(|seed| SeedInfo::new(seed, token)));
            continue;
        }

        pending.push(SeedInfo::new(parse_single(token)?, token));
    }

    let mut seen = HashSet::new();
    let mut deduped: Vec<SeedInfo> = pending
        .into_iter()
        .filter(|info| seen.insert(info.seed))
        .collect();

    if deduped.is_empty() {
        deduped.push(SeedInfo::new(1337, "default"));
    }

    Ok(deduped)
}

fn parse_single(token: &str) -> Result<u64> {
    if let Some(caps) = HEX_TOKEN.captures(token) {
        return u64::from_str_radix(&caps[1], 16)
            .with_context(|| format!("invalid hex seed: {token}"));
    }
    if let Ok(value) = token.parse::<i64>() {
        return Ok(value.unsigned_abs());
    }
    if let Ok(value) = token.parse::<u64>() {
        return Ok(value);
    }
    bail!("Unrecognized seed token: {token}");
}
