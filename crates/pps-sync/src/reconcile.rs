//! Canonical/external merge plus pin overlay and tab filtering.

use std::collections::{BTreeSet, HashSet};

use pps_core::{Candidate, CandidateFilter, CandidateKey, CandidateStatus, Viewer};
use pps_storage::PinOverlay;
use uuid::Uuid;

/// Display id for a search hit that has no canonical row. Derived from the
/// merge key so the same hit gets the same id on every render.
pub fn transient_local_id(candidate: &Candidate) -> Uuid {
    let seed = match candidate.merge_key() {
        CandidateKey::External(id) => format!("external:{id}"),
        CandidateKey::Name(name) => format!("name:{name}"),
    };
    Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes())
}

fn synthesize(hit: &Candidate) -> Candidate {
    let mut candidate = hit.clone();
    candidate.local_id = Some(transient_local_id(hit));
    candidate.status = CandidateStatus::Available;
    candidate.visibility = true;
    candidate.transient = true;
    candidate
}

/// Drops later rows that repeat an ATS id already seen.
fn dedup_by_external_id(rows: &[Candidate]) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|c| match c.external_id() {
            Some(id) => seen.insert(id.to_string()),
            None => true,
        })
        .cloned()
        .collect()
}

fn find_canonical(canonical: &[Candidate], hit: &Candidate) -> Option<usize> {
    if let Some(id) = hit.external_id() {
        if let Some(idx) = canonical.iter().position(|c| c.external_id() == Some(id)) {
            return Some(idx);
        }
    }
    canonical.iter().position(|c| c.same_person(hit))
}

fn merge(canonical: &[Candidate], external: Option<&[Candidate]>) -> Vec<Candidate> {
    let canonical = dedup_by_external_id(canonical);
    let Some(hits) = external else {
        return canonical;
    };

    let mut matched = BTreeSet::new();
    let mut synthesized: Vec<Candidate> = Vec::new();
    let mut synthesized_ids = HashSet::new();

    for hit in hits {
        if let Some(idx) = find_canonical(&canonical, hit) {
            matched.insert(idx);
            continue;
        }
        if let Some(id) = hit.external_id() {
            if !synthesized_ids.insert(id.to_string()) {
                continue;
            }
        }
        synthesized.push(synthesize(hit));
    }

    canonical
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| matched.contains(idx))
        .map(|(_, c)| c)
        .chain(synthesized)
        .collect()
}

fn join_overlay(mut candidate: Candidate, overlay: &PinOverlay) -> Candidate {
    candidate.is_pinned = overlay.is_pinned(&candidate);
    candidate.is_interested = overlay.is_interested(&candidate);
    candidate
}

/// Builds the list shown for one tab.
///
/// Without `external` results the canonical snapshot is the list. With them,
/// each hit resolves to its canonical row (which wins outright) or becomes a
/// transient record; matched canonical rows come first, in canonical order,
/// followed by transient ones in search order. The `Pinned` tab also surfaces
/// pin-time snapshots of people no longer present anywhere else.
pub fn reconcile(
    canonical: &[Candidate],
    external: Option<&[Candidate]>,
    filter: CandidateFilter,
    viewer: &Viewer,
    overlay: &PinOverlay,
) -> Vec<Candidate> {
    let joined = merge(canonical, external)
        .into_iter()
        .map(|c| join_overlay(c, overlay));

    match filter {
        CandidateFilter::Pinned => {
            let mut out: Vec<Candidate> = joined.filter(|c| c.is_pinned).collect();
            for snapshot in &overlay.snapshots {
                let present = out.iter().any(|c| snapshot.matches_any(&c.overlay_keys()));
                if !present {
                    let mut restored = join_overlay(snapshot.candidate.clone(), overlay);
                    restored.is_pinned = true;
                    out.push(restored);
                }
            }
            out
        }
        CandidateFilter::All => joined
            .filter(|c| !c.is_pinned)
            .filter(|c| viewer.is_admin || c.visibility || viewer.owns(c))
            .collect(),
        CandidateFilter::Hired => joined
            .filter(|c| c.status == CandidateStatus::Hired)
            .collect(),
        CandidateFilter::Mine => joined.filter(|c| viewer.owns(c)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pps_core::PinnedSnapshot;

    fn canonical(name: &str, external: Option<&str>, owner: &str) -> Candidate {
        let mut c = Candidate::named(name);
        c.local_id = Some(Uuid::new_v4());
        c.external_id = external.map(ToString::to_string);
        c.created_by = Some(owner.to_string());
        c.role = Some("canonical role".into());
        c
    }

    fn hit(name: &str, external: Option<&str>) -> Candidate {
        let mut c = Candidate::named(name);
        c.external_id = external.map(ToString::to_string);
        c.role = Some("ats role".into());
        c.status = CandidateStatus::Offer;
        c
    }

    fn pin(overlay: &mut PinOverlay, c: &Candidate) {
        for key in c.overlay_keys() {
            overlay.pinned.insert(key);
        }
        overlay
            .snapshots
            .extend(PinnedSnapshot::capture(c, Utc::now()));
    }

    #[test]
    fn without_search_canonical_rows_pass_through_in_order() {
        let rows = vec![canonical("B", None, "u1"), canonical("A", None, "u1")];
        let out = reconcile(&rows, None, CandidateFilter::All, &Viewer::user("u1"), &PinOverlay::default());
        assert_eq!(out.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), ["B", "A"]);
    }

    #[test]
    fn canonical_wins_over_matching_search_hit() {
        let rows = vec![canonical("Ada Lovelace", Some("10"), "u1")];
        let hits = vec![hit("Ada L.", Some("10")), hit("  ada lovelace ", None)];
        let out = reconcile(&rows, Some(&hits), CandidateFilter::All, &Viewer::user("u1"), &PinOverlay::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].role.as_deref(), Some("canonical role"));
        assert_eq!(out[0].name, "Ada Lovelace");
        assert!(!out[0].transient);
    }

    #[test]
    fn name_fallback_never_merges_distinct_ats_ids() {
        let rows = vec![canonical("Sam Lee", Some("1"), "u1")];
        let hits = vec![hit("Sam Lee", Some("2"))];
        let out = reconcile(&rows, Some(&hits), CandidateFilter::All, &Viewer::user("u1"), &PinOverlay::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].external_id.as_deref(), Some("2"));
        assert!(out[0].transient);
    }

    #[test]
    fn synthesized_hits_follow_matched_canonical_rows() {
        let rows = vec![
            canonical("Unmatched", None, "u1"),
            canonical("Grace", Some("7"), "u1"),
        ];
        let hits = vec![hit("New Person", Some("99")), hit("Grace", Some("7"))];
        let out = reconcile(&rows, Some(&hits), CandidateFilter::All, &Viewer::user("u1"), &PinOverlay::default());
        let names: Vec<_> = out.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Grace", "New Person"]);
        let synthesized = &out[1];
        assert_eq!(synthesized.status, CandidateStatus::Available);
        assert!(synthesized.visibility);
        assert!(synthesized.local_id.is_some());
    }

    #[test]
    fn merge_is_idempotent_and_deduplicated() {
        let rows = vec![
            canonical("Dup A", Some("5"), "u1"),
            canonical("Dup B", Some("5"), "u1"),
        ];
        let hits = vec![hit("X", Some("8")), hit("X again", Some("8")), hit("Nameless", None)];
        let viewer = Viewer::admin("root");
        let overlay = PinOverlay::default();
        let first = reconcile(&rows, Some(&hits), CandidateFilter::All, &viewer, &overlay);
        let second = reconcile(&rows, Some(&hits), CandidateFilter::All, &viewer, &overlay);
        assert_eq!(first, second);

        let mut ids = HashSet::new();
        for c in &first {
            if let Some(id) = c.external_id() {
                assert!(ids.insert(id.to_string()), "duplicate external id {id}");
            }
        }
        let without_search = reconcile(&rows, None, CandidateFilter::All, &viewer, &overlay);
        assert_eq!(without_search.len(), 1);
    }

    #[test]
    fn pinned_rows_leave_all_tab_and_appear_under_pinned() {
        let rows = vec![canonical("Pinned One", Some("3"), "u1"), canonical("Other", None, "u1")];
        let mut overlay = PinOverlay::default();
        pin(&mut overlay, &rows[0]);
        let viewer = Viewer::user("u1");

        let all = reconcile(&rows, None, CandidateFilter::All, &viewer, &overlay);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Other");

        let pinned = reconcile(&rows, None, CandidateFilter::Pinned, &viewer, &overlay);
        assert_eq!(pinned.len(), 1);
        assert!(pinned[0].is_pinned);
        assert_eq!(pinned[0].name, "Pinned One");
    }

    #[test]
    fn pinned_snapshot_survives_disappearance() {
        let gone = canonical("Vanished", Some("44"), "u1");
        let mut overlay = PinOverlay::default();
        pin(&mut overlay, &gone);

        let out = reconcile(&[], Some(&[]), CandidateFilter::Pinned, &Viewer::user("u1"), &overlay);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "Vanished");
        assert_eq!(out[0].role.as_deref(), Some("canonical role"));
        assert!(out[0].is_pinned);
    }

    #[test]
    fn overlay_joins_transient_hits_by_external_id() {
        let ext = hit("Remote", Some("123"));
        let mut overlay = PinOverlay::default();
        overlay.pinned.insert("123".into());
        let out = reconcile(&[], Some(std::slice::from_ref(&ext)), CandidateFilter::Pinned, &Viewer::user("u1"), &overlay);
        assert_eq!(out.len(), 1);
        assert!(out[0].transient);
    }

    #[test]
    fn visibility_rules_for_non_admins() {
        let mut hidden_other = canonical("Hidden Other", None, "u2");
        hidden_other.visibility = false;
        let mut hidden_mine = canonical("Hidden Mine", None, "u1");
        hidden_mine.visibility = false;
        let rows = vec![hidden_other, hidden_mine];
        let overlay = PinOverlay::default();

        let user = reconcile(&rows, None, CandidateFilter::All, &Viewer::user("u1"), &overlay);
        assert_eq!(user.len(), 1);
        assert_eq!(user[0].name, "Hidden Mine");

        let admin = reconcile(&rows, None, CandidateFilter::All, &Viewer::admin("root"), &overlay);
        assert_eq!(admin.len(), 2);
    }

    #[test]
    fn hired_and_mine_tabs() {
        let mut hired = canonical("Hired", None, "u2");
        hired.status = CandidateStatus::Hired;
        let rows = vec![hired, canonical("Mine", None, "u1")];
        let overlay = PinOverlay::default();
        let viewer = Viewer::user("u1");

        let hired_tab = reconcile(&rows, None, CandidateFilter::Hired, &viewer, &overlay);
        assert_eq!(hired_tab.len(), 1);
        assert_eq!(hired_tab[0].name, "Hired");

        let mine_tab = reconcile(&rows, None, CandidateFilter::Mine, &viewer, &overlay);
        assert_eq!(mine_tab.len(), 1);
        assert_eq!(mine_tab[0].name, "Mine");

        let anonymous = reconcile(&rows, None, CandidateFilter::Mine, &Viewer::anonymous(), &overlay);
        assert!(anonymous.is_empty());
    }
}
