//! Property-based tests for button payload parsing

use super::callback::{CallbackAction, ManageRoute, Menu, Route};
use crate::state_machine::WizardField;
use proptest::prelude::*;

fn arb_menu() -> impl Strategy<Value = Menu> {
    prop_oneof![
        Just(Menu::Main),
        Just(Menu::Admin),
        Just(Menu::ConfirmClearHistory)
    ]
}

fn arb_action() -> impl Strategy<Value = CallbackAction> {
    prop_oneof![
        (arb_menu(), prop::option::of(arb_menu()))
            .prop_map(|(menu, parent)| CallbackAction::Navigate { menu, parent }),
        Just(CallbackAction::StartScenario),
        Just(CallbackAction::ShowScore),
        any::<i64>().prop_map(CallbackAction::GroupJoin),
        any::<i64>().prop_map(CallbackAction::PrivateJoin),
        (prop_oneof![Just(WizardField::Region), Just(WizardField::SubRegion)], any::<i64>())
            .prop_map(|(field, candidate_id)| CallbackAction::Pick { field, candidate_id }),
        prop_oneof![
            Just(ManageRoute::Main),
            Just(ManageRoute::Treasury),
            Just(ManageRoute::DonateCoins),
            Just(ManageRoute::DonateSupplies)
        ]
        .prop_map(CallbackAction::Manage),
        any::<i64>().prop_map(CallbackAction::Buy),
    ]
}

proptest! {
    #[test]
    fn prop_rendered_payloads_parse_back(action in arb_action()) {
        prop_assert_eq!(CallbackAction::parse(&action.to_payload()), Some(action));
    }

    #[test]
    fn prop_parse_is_total(payload in "[a-z_:0-9-]{0,40}") {
        // Never panics; anything accepted renders to a payload with the same tag
        if let Some(action) = CallbackAction::parse(&payload) {
            let rendered = action.to_payload();
            let tag = |p: &str| p.split(':').next().map(str::to_string);
            prop_assert_eq!(tag(&rendered), tag(&payload));
        }
    }

    #[test]
    fn prop_only_picks_route_to_the_wizard(action in arb_action()) {
        let is_pick = matches!(action, CallbackAction::Pick { .. });
        prop_assert_eq!(action.route() == Route::Wizard, is_pick);
    }
}
