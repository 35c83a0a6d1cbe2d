use serde::Serialize;
use tracing::debug;

use aura_core::{FuzzyMatcher, Settings};

use crate::element::NodeId;
use crate::snapshot::UiSnapshot;

/// A ranked hit from one snapshot. Coordinates are the element's
/// geometric center in the snapshot's screen space.
#[derive(Debug, Clone, Serialize)]
pub struct ElementMatch {
    pub node_id: NodeId,
    pub role: String,
    pub label: String,
    pub matched_attribute: String,
    pub score: u8,
    pub coordinates: (f64, f64),
    /// How many other candidates tied with this one on every ranking key.
    pub full_key_ties: usize,
}

/// Why a snapshot produced no match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMiss {
    /// No clickable element met the fuzzy threshold on any attribute.
    NoCandidate,
    /// The snapshot had no usable geometry for any candidate.
    NoGeometry,
}

struct Candidate {
    node_id: NodeId,
    role: String,
    matched_attribute: String,
    score: u8,
    center: (f64, f64),
    attribute_rank: usize,
    role_rank: usize,
    distance: f64,
    pre_order: usize,
}

/// Search one snapshot for the best clickable element matching `label`.
///
/// An empty `role` means any member of the configured clickable set.
/// Attributes are evaluated in priority order; the first non-empty
/// attribute meeting the threshold wins for that element. Candidates are
/// ranked by score, then attribute priority, then role priority, then
/// distance to the screen center; remaining ties go to the earliest
/// element in pre-order.
pub fn find_in_snapshot(
    snapshot: &UiSnapshot,
    role: &str,
    label: &str,
    settings: &Settings,
    matcher: &FuzzyMatcher,
    screen_center: (f64, f64),
) -> Result<ElementMatch, SearchMiss> {
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut saw_candidate = false;

    for (position, node) in snapshot.pre_order() {
        let role_ok = if role.is_empty() {
            settings.is_clickable_role(&node.role)
        } else {
            node.role == role && settings.is_clickable_role(&node.role)
        };
        if !role_ok || !node.enabled {
            continue;
        }

        let Some((attribute, score)) = best_attribute(node, label, settings, matcher) else {
            continue;
        };
        saw_candidate = true;

        let Some(bounds) = node.bounds.filter(|b| b.is_finite()) else {
            continue;
        };
        let center = bounds.center();
        let distance = ((center.0 - screen_center.0).powi(2)
            + (center.1 - screen_center.1).powi(2))
        .sqrt();

        candidates.push(Candidate {
            node_id: node.id,
            role: node.role.clone(),
            matched_attribute: attribute.clone(),
            score,
            center,
            attribute_rank: settings.attribute_rank(&attribute),
            role_rank: settings.role_rank(&node.role),
            distance,
            pre_order: position,
        });
    }

    if candidates.is_empty() {
        return Err(if saw_candidate {
            SearchMiss::NoGeometry
        } else {
            SearchMiss::NoCandidate
        });
    }

    candidates.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.attribute_rank.cmp(&b.attribute_rank))
            .then(a.role_rank.cmp(&b.role_rank))
            .then(
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.pre_order.cmp(&b.pre_order))
    });

    let best = &candidates[0];
    let full_key_ties = candidates[1..]
        .iter()
        .take_while(|c| {
            c.score == best.score
                && c.attribute_rank == best.attribute_rank
                && c.role_rank == best.role_rank
                && (c.distance - best.distance).abs() < 1.0
        })
        .count();

    if full_key_ties > 0 {
        debug!(
            label = %label,
            ties = full_key_ties,
            "multiple elements tie on every ranking key; taking pre-order first"
        );
    }

    Ok(ElementMatch {
        node_id: best.node_id,
        role: best.role.clone(),
        label: label.to_string(),
        matched_attribute: best.matched_attribute.clone(),
        score: best.score,
        coordinates: best.center,
        full_key_ties,
    })
}

/// Walk the configured attribute priority; the first present, non-empty
/// attribute meeting the threshold wins, even if a later attribute would
/// score higher.
fn best_attribute(
    node: &crate::element::UiNode,
    label: &str,
    settings: &Settings,
    matcher: &FuzzyMatcher,
) -> Option<(String, u8)> {
    for attribute in &settings.attribute_priority {
        let Some(value) = node.attribute(attribute) else {
            continue;
        };
        let score = matcher.score(label, value);
        if score >= matcher.config().threshold {
            return Some((attribute.clone(), score));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::UiBounds;
    use crate::snapshot::SnapshotBuilder;

    fn settings() -> Settings {
        Settings::default()
    }

    fn matcher() -> FuzzyMatcher {
        FuzzyMatcher::with_defaults()
    }

    const CENTER: (f64, f64) = (960.0, 540.0);

    #[test]
    fn finds_by_title_with_center_coordinates() {
        let mut b = SnapshotBuilder::new("Finder");
        b.leaf(
            "AXMenuBarItem",
            Some("Finder"),
            None,
            None,
            UiBounds::new(100.0, 10.0, 40.0, 20.0),
        );
        let snapshot = b.build();

        let hit =
            find_in_snapshot(&snapshot, "", "finder", &settings(), &matcher(), CENTER).unwrap();
        assert_eq!(hit.coordinates, (120.0, 20.0));
        assert_eq!(hit.matched_attribute, "AXTitle");
        assert!(hit.score >= 95);
    }

    #[test]
    fn non_clickable_roles_are_never_returned() {
        let mut b = SnapshotBuilder::new("App");
        b.leaf(
            "AXStaticText",
            Some("Submit"),
            None,
            None,
            UiBounds::new(0.0, 0.0, 10.0, 10.0),
        );
        let snapshot = b.build();

        let miss =
            find_in_snapshot(&snapshot, "", "Submit", &settings(), &matcher(), CENTER).unwrap_err();
        assert_eq!(miss, SearchMiss::NoCandidate);
    }

    #[test]
    fn below_threshold_attributes_are_rejected() {
        let mut b = SnapshotBuilder::new("App");
        b.leaf(
            "AXButton",
            Some("completely unrelated words"),
            None,
            None,
            UiBounds::new(0.0, 0.0, 10.0, 10.0),
        );
        let snapshot = b.build();

        assert!(
            find_in_snapshot(&snapshot, "", "Submit", &settings(), &matcher(), CENTER).is_err()
        );
    }

    #[test]
    fn attribute_priority_wins_over_higher_score_later() {
        // Title meets the threshold at 95 (containment); value would score
        // 100, but title is checked first and wins.
        let mut b = SnapshotBuilder::new("App");
        b.leaf(
            "AXButton",
            Some("Save document"),
            None,
            Some("save"),
            UiBounds::new(0.0, 0.0, 10.0, 10.0),
        );
        let snapshot = b.build();

        let hit = find_in_snapshot(&snapshot, "", "save", &settings(), &matcher(), CENTER).unwrap();
        assert_eq!(hit.matched_attribute, "AXTitle");
        assert_eq!(hit.score, 95);
    }

    #[test]
    fn explicit_role_constrains_the_search() {
        let mut b = SnapshotBuilder::new("App");
        b.leaf(
            "AXButton",
            Some("Mail"),
            None,
            None,
            UiBounds::new(0.0, 0.0, 10.0, 10.0),
        );
        b.leaf(
            "AXLink",
            Some("Mail"),
            None,
            None,
            UiBounds::new(100.0, 0.0, 10.0, 10.0),
        );
        let snapshot = b.build();

        let hit =
            find_in_snapshot(&snapshot, "AXLink", "Mail", &settings(), &matcher(), CENTER).unwrap();
        assert_eq!(hit.role, "AXLink");
    }

    #[test]
    fn equal_scores_prefer_role_priority_then_distance() {
        let mut b = SnapshotBuilder::new("App");
        // AXLink ranks below AXButton in the default role table.
        b.leaf(
            "AXLink",
            Some("Send"),
            None,
            None,
            UiBounds::new(955.0, 535.0, 10.0, 10.0),
        );
        b.leaf(
            "AXButton",
            Some("Send"),
            None,
            None,
            UiBounds::new(0.0, 0.0, 10.0, 10.0),
        );
        let snapshot = b.build();

        let hit = find_in_snapshot(&snapshot, "", "Send", &settings(), &matcher(), CENTER).unwrap();
        assert_eq!(hit.role, "AXButton");
    }

    #[test]
    fn distance_breaks_ties_within_one_role() {
        let mut b = SnapshotBuilder::new("App");
        let far = b.leaf(
            "AXButton",
            Some("OK"),
            None,
            None,
            UiBounds::new(0.0, 0.0, 10.0, 10.0),
        );
        let near = b.leaf(
            "AXButton",
            Some("OK"),
            None,
            None,
            UiBounds::new(955.0, 535.0, 10.0, 10.0),
        );
        let snapshot = b.build();

        let hit = find_in_snapshot(&snapshot, "", "OK", &settings(), &matcher(), CENTER).unwrap();
        assert_eq!(hit.node_id, near);
        assert_ne!(hit.node_id, far);
    }

    #[test]
    fn exact_ties_fall_back_to_pre_order_and_report_ties() {
        let mut b = SnapshotBuilder::new("App");
        let first = b.leaf(
            "AXButton",
            Some("OK"),
            None,
            None,
            UiBounds::new(100.0, 100.0, 10.0, 10.0),
        );
        b.leaf(
            "AXButton",
            Some("OK"),
            None,
            None,
            UiBounds::new(1810.0, 970.0, 10.0, 10.0),
        );
        let snapshot = b.build();

        // Both are equidistant from the center of a 1920x1080 screen.
        let hit = find_in_snapshot(&snapshot, "", "OK", &settings(), &matcher(), CENTER).unwrap();
        assert_eq!(hit.node_id, first);
        assert_eq!(hit.full_key_ties, 1);
    }

    #[test]
    fn disabled_elements_are_skipped() {
        let mut b = SnapshotBuilder::new("App");
        let id = b.leaf(
            "AXButton",
            Some("Send"),
            None,
            None,
            UiBounds::new(0.0, 0.0, 10.0, 10.0),
        );
        let snapshot = b.disabled(id).build();

        assert!(find_in_snapshot(&snapshot, "", "Send", &settings(), &matcher(), CENTER).is_err());
    }
}
