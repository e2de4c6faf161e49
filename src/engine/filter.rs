//! Pure filter/sort pipeline.
//!
//! [`apply`] is a synchronous function of (quest collection, filter state)
//! with no side effects: text filter, then category filter, then a stable
//! sort. Determinism matters because markers are numbered by list position;
//! the same inputs must always produce the same order, with ties broken by
//! input order.

use std::cmp::Ordering;

use crate::model::{FilterState, Quest, SortKey};

/// Apply the filter state to a quest collection, returning the visible list
/// in display order.
pub fn apply(quests: &[Quest], filter: &FilterState) -> Vec<Quest> {
    let needle = filter.search_text.trim().to_lowercase();

    let mut visible: Vec<Quest> = quests
        .iter()
        .filter(|q| matches_text(q, &needle))
        .filter(|q| matches_categories(q, filter))
        .cloned()
        .collect();

    sort_quests(&mut visible, filter.sort_key);
    visible
}

/// Keep the quest iff the needle is empty or case-insensitively contained in
/// title, description, or any tag.
fn matches_text(quest: &Quest, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    quest.title.to_lowercase().contains(needle)
        || quest.description.to_lowercase().contains(needle)
        || quest.tags.iter().any(|t| t.to_lowercase().contains(needle))
}

/// Keep the quest iff no categories are selected, or any selected category
/// matches a tag or appears in the title.
fn matches_categories(quest: &Quest, filter: &FilterState) -> bool {
    if filter.selected_categories.is_empty() {
        return true;
    }
    let title = quest.title.to_lowercase();
    filter.selected_categories.iter().any(|cat| {
        let cat = cat.to_lowercase();
        quest.tags.iter().any(|t| t.to_lowercase() == cat) || title.contains(&cat)
    })
}

fn sort_quests(quests: &mut [Quest], key: SortKey) {
    match key {
        // Missing distances: +infinity when ascending but 0 when descending,
        // so unknown-distance quests land at the end either way. Asymmetric
        // on purpose; see the distance tests before changing.
        SortKey::DistanceAsc => {
            quests.sort_by(|a, b| cmp_f64(distance_or(a, f64::INFINITY), distance_or(b, f64::INFINITY)))
        }
        SortKey::DistanceDesc => {
            quests.sort_by(|a, b| cmp_f64(distance_or(b, 0.0), distance_or(a, 0.0)))
        }
        SortKey::NameAsc => quests.sort_by(|a, b| name_key(a).cmp(&name_key(b))),
        SortKey::NameDesc => quests.sort_by(|a, b| name_key(b).cmp(&name_key(a))),
        SortKey::PriceAsc => quests.sort_by(|a, b| cmp_f64(a.estimated_cost, b.estimated_cost)),
        SortKey::PriceDesc => quests.sort_by(|a, b| cmp_f64(b.estimated_cost, a.estimated_cost)),
        SortKey::TimeAsc => quests.sort_by_key(|q| q.estimated_time_minutes),
        SortKey::TimeDesc => quests.sort_by_key(|q| std::cmp::Reverse(q.estimated_time_minutes)),
    }
}

fn distance_or(quest: &Quest, missing: f64) -> f64 {
    quest.distance_km.unwrap_or(missing)
}

fn name_key(quest: &Quest) -> String {
    quest.title.to_lowercase()
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}
