//! Menu graph rendering
//!
//! `main` is the root and is always re-published as a fresh message through
//! the active-message tracker. Every other menu is rendered by editing the
//! pressed message in place.

use super::callback::{CallbackAction, Menu};
use super::{Dispatcher, HandlerResult};
use crate::chat::{
    Acknowledgement, Actor, ButtonPress, ChatId, InlineButton, InlineKeyboard, MessageId,
    SendOptions,
};
use crate::db::User;

/// Escape user-supplied text for Markdown messages
pub(super) fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub(super) fn back_to_main_button() -> InlineButton {
    InlineButton::new(
        "➡️ Back to main menu",
        CallbackAction::Navigate {
            menu: Menu::Main,
            parent: None,
        }
        .to_payload(),
    )
}

pub(super) fn back_to_main() -> InlineKeyboard {
    InlineKeyboard::new().row(vec![back_to_main_button()])
}

fn main_menu(actor: &Actor, user: Option<&User>, is_admin: bool) -> (String, InlineKeyboard) {
    let text = format!(
        "Hello *{}*, welcome to the apocalypse!\n\nUse the menu below to fight for survival:",
        escape_markdown(&actor.first_name)
    );

    let mut keyboard = InlineKeyboard::new()
        .button("🧟 Zombie scenario", CallbackAction::StartScenario.to_payload())
        .button("🏕️ Shelter", CallbackAction::ManageShelter.to_payload());
    if user.is_some_and(|u| u.backpack_level > 0) {
        keyboard = keyboard.button("🎒 Backpack", CallbackAction::OpenBackpack.to_payload());
    }
    keyboard = keyboard
        .button("🛒 Shop", CallbackAction::OpenShop.to_payload())
        .button("🏆 Survival chance", CallbackAction::ShowScore.to_payload());
    if is_admin {
        keyboard = keyboard.button(
            "👑 Admin panel",
            CallbackAction::Navigate {
                menu: Menu::Admin,
                parent: Some(Menu::Main),
            }
            .to_payload(),
        );
    }
    (text, keyboard)
}

fn admin_menu() -> (String, InlineKeyboard) {
    (
        "*👑 Admin panel*".to_string(),
        InlineKeyboard::new().button(
            "🗑 Clear scenario history",
            CallbackAction::ClearHistory.to_payload(),
        ),
    )
}

fn confirm_clear_menu() -> (String, InlineKeyboard) {
    (
        "*⚠️ Confirm*\n\nDelete the scenario history of *all* users?\n\n\
         _This cannot be undone._"
            .to_string(),
        InlineKeyboard::new().row(vec![
            InlineButton::new(
                "❌ No, cancel",
                CallbackAction::Navigate {
                    menu: Menu::Admin,
                    parent: Some(Menu::Main),
                }
                .to_payload(),
            ),
            InlineButton::new(
                "✅ Yes, clear it",
                CallbackAction::ConfirmClearHistory.to_payload(),
            ),
        ]),
    )
}

impl Dispatcher {
    /// Send a fresh root menu, superseding the previous one
    pub(super) async fn publish_main(
        &self,
        conversation: ChatId,
        actor: &Actor,
    ) -> HandlerResult<MessageId> {
        let user = self.store.get_user(actor.id).await?;
        let (text, keyboard) = main_menu(actor, user.as_ref(), self.is_admin(actor.id));
        let opts = SendOptions::markdown().keyboard(keyboard);

        let transport = self.transport.as_ref();
        let text = &text;
        let message_id = self
            .menus
            .publish(transport, conversation, move || {
                transport.send_message(conversation, text, opts)
            })
            .await?;
        Ok(message_id)
    }

    /// `navigate:<menu>[:<parent>]`
    pub(super) async fn navigate(
        &self,
        press: &ButtonPress,
        menu: Menu,
        parent: Option<Menu>,
    ) -> HandlerResult<Acknowledgement> {
        let conversation = press.conversation.id;
        let (text, mut keyboard) = match menu {
            Menu::Main => {
                self.publish_main(conversation, &press.actor).await?;
                return Ok(Acknowledgement::silent());
            }
            _ if !self.is_admin(press.actor.id) => {
                tracing::warn!(
                    user_id = press.actor.id,
                    menu = %menu,
                    "Non-admin tried an admin menu"
                );
                return Ok(Acknowledgement::silent());
            }
            Menu::Admin => admin_menu(),
            Menu::ConfirmClearHistory => confirm_clear_menu(),
        };
        if let Some(parent) = parent {
            keyboard.push_row(vec![InlineButton::new(
                "➡️ Back",
                CallbackAction::Navigate {
                    menu: parent,
                    parent: None,
                }
                .to_payload(),
            )]);
        }
        self.edit(
            conversation,
            press.message_id,
            &text,
            SendOptions::markdown().keyboard(keyboard),
        )
        .await?;
        Ok(Acknowledgement::silent())
    }

    /// `admin:clear_history` asks for confirmation
    pub(super) async fn confirm_clear_history(
        &self,
        press: &ButtonPress,
        parent: Option<Menu>,
    ) -> HandlerResult<Acknowledgement> {
        self.navigate(press, Menu::ConfirmClearHistory, parent).await
    }

    /// `admin_confirm:clear_history` wipes every actor's scenario history
    pub(super) async fn clear_history(
        &self,
        press: &ButtonPress,
    ) -> HandlerResult<Acknowledgement> {
        if !self.is_admin(press.actor.id) {
            tracing::warn!(user_id = press.actor.id, "Non-admin tried to clear history");
            return Ok(Acknowledgement::silent());
        }
        let removed = self.history.clear_all().await?;
        tracing::info!(user_id = press.actor.id, removed, "Scenario history cleared");

        let keyboard = InlineKeyboard::new().button(
            "➡️ Back",
            CallbackAction::Navigate {
                menu: Menu::Admin,
                parent: Some(Menu::Main),
            }
            .to_payload(),
        );
        self.edit(
            press.conversation.id,
            press.message_id,
            &format!("✅ Cleared {removed} scenario history records."),
            SendOptions::default().keyboard(keyboard),
        )
        .await?;
        Ok(Acknowledgement::silent())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{harness_with, press, text, DM};
    use super::*;
    use crate::chat::Conversation;
    use crate::runtime::testing::{InMemoryGameStore, MockContent};
    use crate::runtime::QuestionHistory;

    const ADMIN: i64 = 1;

    fn admin_harness() -> super::super::tests::Harness {
        harness_with(
            InMemoryGameStore::new()
                .with_user(&Actor::new(DM, "Sara"))
                .with_user(&Actor::new(ADMIN, "Boss")),
            MockContent::new(),
        )
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_markdown("plain"), "plain");
    }

    #[test]
    fn test_backpack_button_only_with_backpack() {
        let actor = Actor::new(DM, "Sara");
        let (_, keyboard) = main_menu(&actor, None, false);
        assert!(!keyboard.payloads().any(|p| p == "action:open_backpack"));
        assert!(!keyboard.payloads().any(|p| p.starts_with("navigate:admin")));

        let (_, keyboard) = main_menu(&actor, None, true);
        assert!(keyboard.payloads().any(|p| p == "navigate:admin:main"));
    }

    #[tokio::test]
    async fn test_navigate_renders_menu_with_back_edge() {
        let h = admin_harness();
        h.dispatcher
            .dispatch(text(Conversation::private(ADMIN), ADMIN, "/start", None))
            .await;
        let root = h.menus.active(ADMIN).await.unwrap();

        h.dispatcher
            .dispatch(press(Conversation::private(ADMIN), ADMIN, root, "navigate:admin:main"))
            .await;

        let edit = h.transport.edits().pop().unwrap();
        assert_eq!(edit.message_id, root);
        let payloads: Vec<String> = edit
            .opts
            .keyboard
            .unwrap()
            .payloads()
            .map(str::to_string)
            .collect();
        assert_eq!(payloads, vec!["admin:clear_history", "navigate:main"]);
        // Editing in place keeps the same active message
        assert_eq!(h.menus.active(ADMIN).await, Some(root));
    }

    #[tokio::test]
    async fn test_navigate_main_republishes_root() {
        let h = admin_harness();
        h.dispatcher
            .dispatch(text(Conversation::private(DM), DM, "/start", None))
            .await;
        let root = h.menus.active(DM).await.unwrap();

        h.dispatcher
            .dispatch(press(Conversation::private(DM), DM, root, "navigate:main"))
            .await;

        let fresh = h.menus.active(DM).await.unwrap();
        assert_ne!(fresh, root);
        assert!(h.transport.deleted().contains(&(DM, root)));
    }

    #[tokio::test]
    async fn test_admin_menus_refuse_other_actors() {
        let h = admin_harness();
        h.dispatcher
            .dispatch(press(Conversation::private(DM), DM, 1, "navigate:admin:main"))
            .await;
        h.dispatcher
            .dispatch(press(Conversation::private(DM), DM, 1, "admin_confirm:clear_history"))
            .await;
        assert!(h.transport.edits().is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_clear_wipes_history() {
        let h = admin_harness();
        h.store.record(DM, "old scenario").await.unwrap();
        h.dispatcher
            .dispatch(press(Conversation::private(ADMIN), ADMIN, 1, "admin:clear_history:admin"))
            .await;
        assert!(h.transport.edits().pop().unwrap().text.contains("Confirm"));
        assert_eq!(h.store.recent(DM, 5).await.unwrap().len(), 1);

        h.dispatcher
            .dispatch(press(Conversation::private(ADMIN), ADMIN, 1, "admin_confirm:clear_history"))
            .await;
        assert!(h.store.recent(DM, 5).await.unwrap().is_empty());
        assert!(h.transport.edits().pop().unwrap().text.contains("Cleared 1"));
    }
}
