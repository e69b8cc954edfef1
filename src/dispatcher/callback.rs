//! Button payload grammar
//!
//! Payloads are `:`-delimited: a tag followed by arguments. Routing is
//! decided entirely by the tag, so parsing is total and anything
//! unrecognised comes back as `None`.

use crate::chat::ChatId;
use crate::state_machine::{candidate_payload, WizardField, CANDIDATE_TAG};
use std::fmt;
use std::str::FromStr;

/// Named menus reachable through `navigate:`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Menu {
    Main,
    Admin,
    ConfirmClearHistory,
}

impl Menu {
    pub fn as_str(self) -> &'static str {
        match self {
            Menu::Main => "main",
            Menu::Admin => "admin",
            Menu::ConfirmClearHistory => "confirm_clear_history",
        }
    }
}

impl fmt::Display for Menu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Menu {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(Menu::Main),
            "admin" => Ok(Menu::Admin),
            "confirm_clear_history" => Ok(Menu::ConfirmClearHistory),
            _ => Err(()),
        }
    }
}

/// Screens of the in-group shelter management menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageRoute {
    Main,
    Treasury,
    DonateCoins,
    DonateSupplies,
}

impl ManageRoute {
    pub fn as_str(self) -> &'static str {
        match self {
            ManageRoute::Main => "main",
            ManageRoute::Treasury => "treasury",
            ManageRoute::DonateCoins => "donate_coins",
            ManageRoute::DonateSupplies => "donate_supplies",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "main" => Some(ManageRoute::Main),
            "treasury" => Some(ManageRoute::Treasury),
            "donate_coins" => Some(ManageRoute::DonateCoins),
            "donate_supplies" => Some(ManageRoute::DonateSupplies),
            _ => None,
        }
    }
}

/// Every button action the bot understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Navigate { menu: Menu, parent: Option<Menu> },
    StartScenario,
    ManageShelter,
    ShowScore,
    OpenShop,
    OpenBackpack,
    /// Join the shelter of the group the button was pressed in
    GroupJoin(ChatId),
    /// Join a shelter from the private possible-shelters list
    PrivateJoin(ChatId),
    LeaveConfirm,
    LeaveDo,
    Pick { field: WizardField, candidate_id: i64 },
    Manage(ManageRoute),
    Buy(i64),
    ClearHistory,
    ConfirmClearHistory,
}

impl CallbackAction {
    pub fn parse(payload: &str) -> Option<Self> {
        let mut parts = payload.split(':');
        let tag = parts.next()?;
        let arg = parts.next();

        let action = match (tag, arg) {
            ("navigate", Some(menu)) => CallbackAction::Navigate {
                menu: menu.parse().ok()?,
                parent: match parts.next() {
                    Some(parent) => Some(parent.parse().ok()?),
                    None => None,
                },
            },
            ("action", Some("start_scenario")) => CallbackAction::StartScenario,
            ("action", Some("manage_shelter")) => CallbackAction::ManageShelter,
            ("action", Some("show_score")) => CallbackAction::ShowScore,
            ("action", Some("open_shop")) => CallbackAction::OpenShop,
            ("action", Some("open_backpack")) => CallbackAction::OpenBackpack,
            ("shelter", Some("join")) => CallbackAction::GroupJoin(parts.next()?.parse().ok()?),
            ("shelter_join", Some(id)) => CallbackAction::PrivateJoin(id.parse().ok()?),
            ("shelter_leave_confirm", None) => CallbackAction::LeaveConfirm,
            ("shelter_leave_do", None) => CallbackAction::LeaveDo,
            (CANDIDATE_TAG, Some(field)) => CallbackAction::Pick {
                field: field.parse().ok()?,
                candidate_id: parts.next()?.parse().ok()?,
            },
            ("shelter_manage", Some(route)) => CallbackAction::Manage(ManageRoute::parse(route)?),
            ("shop", Some("buy")) => CallbackAction::Buy(parts.next()?.parse().ok()?),
            // Older keyboards carried a trailing menu name on admin actions
            ("admin", Some("clear_history")) => return Some(CallbackAction::ClearHistory),
            ("admin_confirm", Some("clear_history")) => {
                return Some(CallbackAction::ConfirmClearHistory)
            }
            _ => return None,
        };

        // Trailing arguments make the payload unrecognised
        parts.next().is_none().then_some(action)
    }

    pub fn to_payload(&self) -> String {
        match self {
            CallbackAction::Navigate { menu, parent: None } => format!("navigate:{menu}"),
            CallbackAction::Navigate {
                menu,
                parent: Some(parent),
            } => format!("navigate:{menu}:{parent}"),
            CallbackAction::StartScenario => "action:start_scenario".to_string(),
            CallbackAction::ManageShelter => "action:manage_shelter".to_string(),
            CallbackAction::ShowScore => "action:show_score".to_string(),
            CallbackAction::OpenShop => "action:open_shop".to_string(),
            CallbackAction::OpenBackpack => "action:open_backpack".to_string(),
            CallbackAction::GroupJoin(id) => format!("shelter:join:{id}"),
            CallbackAction::PrivateJoin(id) => format!("shelter_join:{id}"),
            CallbackAction::LeaveConfirm => "shelter_leave_confirm".to_string(),
            CallbackAction::LeaveDo => "shelter_leave_do".to_string(),
            CallbackAction::Pick {
                field,
                candidate_id,
            } => candidate_payload(*field, *candidate_id),
            CallbackAction::Manage(route) => format!("shelter_manage:{}", route.as_str()),
            CallbackAction::Buy(id) => format!("shop:buy:{id}"),
            CallbackAction::ClearHistory => "admin:clear_history".to_string(),
            CallbackAction::ConfirmClearHistory => "admin_confirm:clear_history".to_string(),
        }
    }

    /// Actions whose handler answers with its own (possibly alert-style)
    /// acknowledgement. Everything else is acknowledged before routing.
    pub fn requires_alert(&self) -> bool {
        matches!(
            self,
            CallbackAction::ShowScore
                | CallbackAction::OpenBackpack
                | CallbackAction::GroupJoin(_)
                | CallbackAction::Pick { .. }
                | CallbackAction::Manage(_)
                | CallbackAction::Buy(_)
        )
    }

    /// Routing class, in dispatch precedence order
    pub fn route(&self) -> Route {
        match self {
            CallbackAction::GroupJoin(_)
            | CallbackAction::PrivateJoin(_)
            | CallbackAction::LeaveConfirm
            | CallbackAction::LeaveDo => Route::Join,
            CallbackAction::Pick { .. } => Route::Wizard,
            CallbackAction::Manage(_) => Route::Management,
            _ => Route::Navigation,
        }
    }
}

/// Handler families, ordered by routing precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Route {
    Join,
    Wizard,
    Management,
    Navigation,
}
