// src/sobriquet/selector.rs

//! Usage-weighted selection of nicknames for prompt injection.

use tracing::warn;

use crate::profile::SobriquetEntry;

/// Aggregated nickname data for one in-context user.
#[derive(Debug, Clone)]
pub struct UserSobriquets {
    pub display_name: String,
    pub user_id: String,
    pub sobriquets: Vec<SobriquetEntry>,
}

/// One nickname picked for injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedSobriquet {
    pub display_name: String,
    pub user_id: String,
    pub name: String,
    pub count: i64,
}

struct Candidate {
    selected: SelectedSobriquet,
    weight: f64,
}

/// Pick at most `max_in_prompt` nicknames across all users, weighted by
/// usage count plus `smoothing`. The result is sorted by count descending
/// (stable ties) so presentation is deterministic given the selected set.
pub fn select_for_prompt(
    users: &[UserSobriquets],
    max_in_prompt: usize,
    smoothing: f64,
) -> Vec<SelectedSobriquet> {
    let mut candidates: Vec<Candidate> = Vec::new();
    for user in users {
        for entry in &user.sobriquets {
            if entry.name.is_empty() || entry.count <= 0 {
                warn!(
                    "skipping invalid sobriquet entry for {}: {:?}",
                    user.display_name, entry
                );
                continue;
            }
            candidates.push(Candidate {
                selected: SelectedSobriquet {
                    display_name: user.display_name.clone(),
                    user_id: user.user_id.clone(),
                    name: entry.name.clone(),
                    count: entry.count,
                },
                weight: entry.count as f64 + smoothing,
            });
        }
    }
    if candidates.is_empty() {
        return Vec::new();
    }

    let k = max_in_prompt.min(candidates.len());
    let mut picked = weighted_sample_without_replacement(&candidates, k);

    // A degenerate weight (<= 0) is excluded from the draw; backfill the
    // remaining slots with the highest-count leftovers, original order on ties.
    if picked.len() < k {
        let mut remaining: Vec<usize> = (0..candidates.len())
            .filter(|i| !picked.contains(i))
            .collect();
        remaining.sort_by_key(|&i| std::cmp::Reverse(candidates[i].selected.count));
        picked.extend(remaining.into_iter().take(k - picked.len()));
    }

    picked.sort_unstable();
    let mut result: Vec<SelectedSobriquet> = picked
        .into_iter()
        .map(|i| candidates[i].selected.clone())
        .collect();
    result.sort_by_key(|s| std::cmp::Reverse(s.count));
    result
}

/// Exponential-clock sampling: each candidate draws `key = -ln(U) / weight`
/// and the k smallest keys win, so inclusion likelihood grows with weight.
fn weighted_sample_without_replacement(candidates: &[Candidate], k: usize) -> Vec<usize> {
    if k == 0 {
        return Vec::new();
    }
    if k >= candidates.len() {
        return (0..candidates.len()).collect();
    }

    let mut keys: Vec<(f64, usize)> = Vec::with_capacity(candidates.len());
    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.weight <= 0.0 {
            continue;
        }
        let mut u: f64 = rand::random();
        if u <= 0.0 {
            u = f64::MIN_POSITIVE;
        }
        keys.push((-u.ln() / candidate.weight, i));
    }

    keys.sort_by(|a, b| a.0.total_cmp(&b.0));
    keys.truncate(k);
    keys.into_iter().map(|(_, i)| i).collect()
}

/// Render the selected nicknames, one line per user, for splicing into a
/// prompt. Empty selection renders as an empty string.
pub fn format_injection(selected: &[SelectedSobriquet]) -> String {
    if selected.is_empty() {
        return String::new();
    }

    let mut lines = vec![
        "Known group nicknames of chat members (most used first), with user ids:".to_string(),
    ];
    // Group by user while preserving the count-sorted order of first appearance.
    let mut grouped: Vec<((String, String), Vec<String>)> = Vec::new();
    for s in selected {
        let key = (s.display_name.clone(), s.user_id.clone());
        match grouped.iter_mut().find(|(k, _)| *k == key) {
            Some((_, names)) => names.push(format!("“{}”", s.name)),
            None => grouped.push((key, vec![format!("“{}”", s.name)])),
        }
    }
    for ((display_name, user_id), names) in grouped {
        lines.push(format!(
            "- {}({}), may be called: {}",
            display_name,
            user_id,
            names.join("、")
        ));
    }

    lines.join("\n") + "\n"
}
