//! Contexts-path aggregation and sequence validation.

use std::collections::BTreeMap;

use super::Context;

/// Builds every candidate contexts path for `contexts`, shallowest first.
///
/// Contexts are grouped by position and positions are visited in ascending
/// order. Each position-0 id starts a chain of its own. Each id at a later
/// position extends every chain built so far, and the extended chains replace
/// the previous ones, so a second id at the same position extends chains that
/// already carry the first. Callers take the last element as the fullest path.
///
/// Contexts at a position above 0 extend nothing when no position-0 context
/// exists.
///
/// # Examples
///
/// ```
/// use ctxalias::{contexts_paths, Context};
///
/// let stack = [
///     Context::new("store-a", "Store A", 0).unwrap(),
///     Context::new("warehouse-3", "Warehouse 3", 1).unwrap(),
/// ];
/// assert_eq!(contexts_paths(&stack), vec!["store-a", "store-a/warehouse-3"]);
/// ```
#[must_use]
pub fn contexts_paths(contexts: &[Context]) -> Vec<String> {
    let mut by_position: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
    for context in contexts {
        by_position
            .entry(context.position)
            .or_default()
            .push(context.id.as_str());
    }

    let mut paths = Vec::new();
    let mut chains: Vec<String> = Vec::new();
    for (position, ids) in by_position {
        for id in ids {
            if position == 0 {
                chains.push(id.to_string());
                paths.push(id.to_string());
                continue;
            }
            chains = chains
                .into_iter()
                .map(|chain| {
                    let extended = format!("{chain}/{id}");
                    paths.push(extended.clone());
                    extended
                })
                .collect();
        }
    }
    paths
}

/// True when every `(index, context)` pair has `context.position == index` and
/// the indices run 0, 1, 2, ... without gaps.
#[must_use]
pub fn validate_sequence<'a>(items: impl IntoIterator<Item = (usize, &'a Context)>) -> bool {
    items
        .into_iter()
        .enumerate()
        .all(|(expected, (index, context))| {
            index == expected && usize::try_from(context.position).is_ok_and(|p| p == index)
        })
}
