//! Tier arithmetic for block addresses.
//!
//! A block at level `lvl` rooted at `bid` covers `[bid, bid + 2^lvl)`.
//! Tiers are 4 levels apart, so one block aggregates the 16 blocks of the
//! tier below it.

/// Distance in levels between a tier and the next finer one.
pub const TIER_STEP: i32 = 4;

/// Number of finer blocks aggregated by one coarser block (`2^TIER_STEP`).
pub const FANOUT: i64 = 1 << TIER_STEP;

/// Finest tier, holds raw blocks.
pub const FINEST_LEVEL: i32 = 0;

/// Coarsest tier. Never superseded.
pub const ROOT_LEVEL: i32 = 8;

/// From here on every cleanup ceiling saturates at `i64::MAX`, so deeper
/// levels only differ by their residue modulo [`TIER_STEP`].
const SATURATED_LEVEL: i32 = 68;

/// Length of the interval covered by a block at `lvl`.
///
/// Negative levels truncate to zero.
pub fn span(lvl: i32) -> i64 {
    match lvl {
        l if l < 0 => 0,
        l if l >= 63 => i64::MAX,
        l => 1i64 << l,
    }
}

/// Exclusive end of the interval a block nominally covers.
pub fn coverage_end(lvl: i32, bid: i64) -> i64 {
    bid.saturating_add(span(lvl))
}

/// Origin of the last (16th) child one tier below `(lvl, bid)`.
pub fn last_child(lvl: i32, bid: i64) -> i64 {
    bid.saturating_add((FANOUT - 1).saturating_mul(span(lvl - TIER_STEP)))
}

/// True if `[head, tail]` intersects the coverage of `(lvl, bid)`.
pub fn overlaps(lvl: i32, bid: i64, head: i64, tail: i64) -> bool {
    head < coverage_end(lvl, bid) && tail >= bid
}

/// One deletion performed by retention cleanup: drop every block at `lvl`
/// whose origin is `<= ceiling`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanStep {
    pub lvl: i32,
    pub ceiling: i64,
}

/// Deletions made redundant by a block at `(lvl, bid)`, coarsest first.
///
/// Walks down one tier at a time from `lvl`, carrying the last child origin
/// as the next root, until the finest tier is reached. Root blocks are never
/// targeted. The walk is at most `SATURATED_LEVEL / TIER_STEP + 1` steps
/// whatever level the remote reports.
pub fn clean_plan(lvl: i32, bid: i64) -> Vec<CleanStep> {
    let mut plan = Vec::new();
    let mut lvl = match lvl > SATURATED_LEVEL {
        true => SATURATED_LEVEL + (lvl - SATURATED_LEVEL) % TIER_STEP,
        false => lvl,
    };
    let mut bid = bid;

    while lvl > FINEST_LEVEL {
        let child = lvl - TIER_STEP;
        if child < FINEST_LEVEL {
            break;
        }

        let ceiling = last_child(lvl, bid);
        if child < ROOT_LEVEL {
            plan.push(CleanStep {
                lvl: child,
                ceiling,
            });
        }

        lvl = child;
        bid = ceiling;
    }

    plan
}
