//! Property-based tests for candidate matching and wizard transitions
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::WizardStep;
use super::transition::{match_candidates, Match, MAX_SUGGESTIONS};
use super::*;
use crate::reference::{Region, ReferenceData, SubRegion};
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

/// Names over a tiny alphabet so substring hits are common
fn arb_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[abAB ]{1,6}", 0..20)
}

fn arb_regions() -> impl Strategy<Value = Vec<Region>> {
    arb_names().prop_map(|names| {
        names
            .into_iter()
            .enumerate()
            .map(|(i, name)| Region {
                id: i64::try_from(i).unwrap(),
                name,
            })
            .collect()
    })
}

fn lookup_with(regions: Vec<Region>) -> ReferenceData {
    let sub_regions = regions
        .iter()
        .map(|r| SubRegion {
            id: r.id + 1000,
            name: format!("{} town", r.name),
            region_id: r.id,
        })
        .collect();
    ReferenceData::new(regions, sub_regions)
}

fn region_session() -> Session {
    let mut session = Session::new(-1, 1);
    session.step = WizardStep::AwaitingRegion;
    session.pending_prompt_id = Some(10);
    session.fields.name = Some("Bunker".to_string());
    session
}

// ============================================================================
// Matching properties
// ============================================================================

proptest! {
    #[test]
    fn prop_suggestions_capped_and_ordered(names in arb_names(), input in "[abAB]{1,2}") {
        match match_candidates(&input, &names, String::as_str) {
            Match::Suggestions(found) => {
                prop_assert!(!found.is_empty());
                prop_assert!(found.len() <= MAX_SUGGESTIONS);
                // Every suggestion contains the input, none is an exact hit
                for name in &found {
                    prop_assert!(name.contains(input.as_str()));
                    prop_assert_ne!(name.as_str(), input.as_str());
                }
                // Source order preserved: the first N containing names
                let expected: Vec<&String> = names
                    .iter()
                    .filter(|n| n.contains(input.as_str()))
                    .take(MAX_SUGGESTIONS)
                    .collect();
                prop_assert_eq!(found, expected);
            }
            Match::Exact(name) => prop_assert_eq!(name.as_str(), input.trim()),
            Match::NotFound => {
                prop_assert!(names.iter().all(|n| !n.contains(input.as_str())));
            }
        }
    }

    #[test]
    fn prop_exact_match_always_wins(names in arb_names(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!names.is_empty());
        let target = names[pick.index(names.len())].clone();
        prop_assume!(!target.trim().is_empty() && target.trim() == target);
        match match_candidates(&target, &names, |n: &String| n.as_str()) {
            Match::Exact(found) => prop_assert_eq!(found.as_str(), target.as_str()),
            other => prop_assert!(false, "expected exact match, got {:?}", other),
        }
    }

    #[test]
    fn prop_matching_is_case_sensitive(names in arb_names()) {
        let upper: Vec<String> = names.iter().map(|n| n.to_uppercase()).collect();
        prop_assume!(upper.iter().all(|n| !n.contains('a') && !n.contains('b')));
        prop_assert_eq!(
            match_candidates("a", &upper, String::as_str),
            Match::NotFound
        );
    }
}

// ============================================================================
// Transition properties
// ============================================================================

proptest! {
    #[test]
    fn prop_region_reply_never_skips_ahead(regions in arb_regions(), input in "[abAB ]{0,4}") {
        let lookup = lookup_with(regions);
        let result = transition(
            &region_session(),
            &lookup,
            Event::TextReply {
                text: input,
                message_id: 11,
            },
        )
        .unwrap();

        prop_assert!(!result.is_final());
        prop_assert_eq!(result.effects.len(), 1);
        match &result.effects[0] {
            Effect::SendPrompt { keyboard, update, reply_to, .. } => {
                prop_assert_eq!(*reply_to, Some(11));
                if result.new_step == WizardStep::AwaitingSubRegion {
                    // Advancing means an exact hit and no suggestion keyboard
                    prop_assert!(keyboard.is_none());
                    prop_assert!(update.region.is_some());
                } else {
                    prop_assert_eq!(result.new_step, WizardStep::AwaitingRegion);
                    prop_assert!(update.is_empty());
                    if let Some(k) = keyboard {
                        let n = k.payloads().count();
                        prop_assert!((1..=MAX_SUGGESTIONS).contains(&n));
                        prop_assert!(k.payloads().all(|p| p.starts_with("creation:region:")));
                    }
                }
            }
            other => prop_assert!(false, "unexpected effect {:?}", other),
        }
    }

    #[test]
    fn prop_picking_any_listed_region_advances(
        regions in arb_regions(),
        pick in any::<prop::sample::Index>(),
    ) {
        prop_assume!(!regions.is_empty());
        let chosen = regions[pick.index(regions.len())].clone();
        let lookup = lookup_with(regions);
        let result = transition(
            &region_session(),
            &lookup,
            Event::CandidatePicked {
                field: WizardField::Region,
                candidate_id: chosen.id,
                message_id: 20,
            },
        )
        .unwrap();

        prop_assert_eq!(result.new_step, WizardStep::AwaitingSubRegion);
        prop_assert_eq!(&result.effects[0], &Effect::DeleteMessage { message_id: 20 });
    }

    #[test]
    fn prop_unlisted_region_id_is_rejected(regions in arb_regions(), offset in 1i64..100) {
        let unknown = i64::try_from(regions.len()).unwrap() + offset;
        let lookup = lookup_with(regions);
        let err = transition(
            &region_session(),
            &lookup,
            Event::CandidatePicked {
                field: WizardField::Region,
                candidate_id: unknown,
                message_id: 20,
            },
        )
        .unwrap_err();
        prop_assert_eq!(
            err,
            TransitionError::UnknownCandidate {
                field: WizardField::Region,
                id: unknown,
            }
        );
    }
}
