//! Shelter membership: info, joining, leaving, and group lifecycle

use super::menus::{back_to_main, back_to_main_button, escape_markdown};
use super::{CallbackAction, Dispatcher, HandlerResult};
use crate::chat::{
    Acknowledgement, ButtonPress, ChatId, InlineButton, InlineKeyboard, MembershipChange,
    SendOptions,
};
use crate::db::Shelter;
use crate::stores::delete_quietly;

fn refresh_button() -> InlineButton {
    InlineButton::new("🔄 Refresh", CallbackAction::ManageShelter.to_payload())
}

fn join_announcement(name: &str) -> String {
    format!(
        "🏕️ A new survivor joined!\n\n*{}* is now a member of this shelter.",
        escape_markdown(name)
    )
}

impl Dispatcher {
    /// Shelter details with a join button, shown by `/shelter`
    pub(super) async fn show_shelter_info(
        &self,
        conversation: ChatId,
        shelter: &Shelter,
    ) -> HandlerResult {
        let members = self.store.shelter_members(shelter.id).await?;
        let mut text = format!(
            "🏕️ *Shelter info*\n\n- *Name:* {}\n- *Province:* {}\n- *City:* {}\n\n\
             *Members:*\n",
            escape_markdown(&shelter.name),
            escape_markdown(shelter.province.as_deref().unwrap_or("-")),
            escape_markdown(shelter.city.as_deref().unwrap_or("-")),
        );
        if members.is_empty() {
            text.push_str("No members yet.");
        } else {
            let lines: Vec<String> = members
                .iter()
                .enumerate()
                .map(|(i, m)| format!("{}. {}", i + 1, escape_markdown(&m.display_name())))
                .collect();
            text.push_str(&lines.join("\n"));
        }

        let keyboard = InlineKeyboard::new().button(
            "➕ Join shelter",
            CallbackAction::GroupJoin(shelter.id).to_payload(),
        );
        self.send(conversation, &text, SendOptions::markdown().keyboard(keyboard))
            .await?;
        Ok(())
    }

    /// `action:manage_shelter`: current shelter, joinable shelters, or how
    /// to get one
    pub(super) async fn shelter_overview(
        &self,
        press: &ButtonPress,
    ) -> HandlerResult<Acknowledgement> {
        let Some(user) = self.store.get_user(press.actor.id).await? else {
            return Ok(Acknowledgement::silent());
        };
        let current = match user.shelter_id {
            Some(id) => self.store.get_shelter(id).await?,
            None => None,
        };

        let (text, opts) = if let Some(shelter) = current {
            (
                format!(
                    "🏕️ *Your shelter*\n\nYou are a member of *{}*.",
                    escape_markdown(&shelter.name)
                ),
                SendOptions::markdown().keyboard(
                    InlineKeyboard::new()
                        .button("🚪 Leave shelter", CallbackAction::LeaveConfirm.to_payload())
                        .row(vec![back_to_main_button()]),
                ),
            )
        } else {
            let possible = self.store.possible_shelters(user.id).await?;
            if possible.is_empty() {
                let bot = escape_markdown(self.transport.bot_username());
                (
                    format!(
                        "🏕️ *You have no shelter!*\n\n\
                         You are a lone survivor. To join or build a shelter:\n\n\
                         1. Create a Telegram group.\n\
                         2. Add this bot (@{bot}) to the group.\n\
                         3. Send /start in the group.\n\n\
                         The group will then show up here as a shelter you can join."
                    ),
                    SendOptions::markdown().keyboard(
                        InlineKeyboard::new().row(vec![refresh_button(), back_to_main_button()]),
                    ),
                )
            } else {
                let mut keyboard = InlineKeyboard::new();
                for shelter in &possible {
                    keyboard = keyboard.button(
                        shelter.name.clone(),
                        CallbackAction::PrivateJoin(shelter.id).to_payload(),
                    );
                }
                keyboard = keyboard
                    .row(vec![refresh_button()])
                    .row(vec![back_to_main_button()]);
                (
                    "You have not joined a shelter yet.\n\n\
                     Shelters you can join (groups where you started the bot):"
                        .to_string(),
                    SendOptions::default().keyboard(keyboard),
                )
            }
        };

        self.edit(press.conversation.id, press.message_id, &text, opts)
            .await?;
        Ok(Acknowledgement::silent())
    }

    /// `shelter:join:<id>` pressed inside the shelter's group
    pub(super) async fn join_from_group(
        &self,
        press: &ButtonPress,
        shelter_id: ChatId,
    ) -> HandlerResult<Acknowledgement> {
        let Some(user) = self.store.get_user(press.actor.id).await? else {
            return Ok(Acknowledgement::alert(super::START_PRIVATELY));
        };
        if user.shelter_id == Some(shelter_id) {
            return Ok(Acknowledgement::alert("You are already a member of this shelter."));
        }
        if self.store.get_shelter(shelter_id).await?.is_none() {
            return Ok(Acknowledgement::alert("This shelter no longer exists."));
        }

        self.store.set_user_shelter(user.id, Some(shelter_id)).await?;
        self.store.add_possible_shelter(user.id, shelter_id).await?;
        tracing::info!(user_id = user.id, shelter_id, "Joined shelter from group");

        self.send(
            press.conversation.id,
            &join_announcement(&user.display_name()),
            SendOptions::markdown(),
        )
        .await?;
        Ok(Acknowledgement::toast("✅ Welcome to the shelter!"))
    }

    /// `shelter_join:<id>` pressed in the private possible-shelters list
    pub(super) async fn join_from_list(
        &self,
        press: &ButtonPress,
        shelter_id: ChatId,
    ) -> HandlerResult<Acknowledgement> {
        let conversation = press.conversation.id;
        let Some(shelter) = self.store.get_shelter(shelter_id).await? else {
            tracing::warn!(shelter_id, "Join requested for a missing shelter");
            self.edit(
                conversation,
                press.message_id,
                "This shelter no longer exists.",
                SendOptions::default().keyboard(
                    InlineKeyboard::new().row(vec![refresh_button(), back_to_main_button()]),
                ),
            )
            .await?;
            return Ok(Acknowledgement::silent());
        };

        if !self.store.set_user_shelter(press.actor.id, Some(shelter.id)).await? {
            return Ok(Acknowledgement::silent());
        }
        tracing::info!(user_id = press.actor.id, shelter_id, "Joined shelter from list");

        // The group may have removed the bot since; the join still stands
        if let Err(e) = self
            .transport
            .send_message(
                shelter.id,
                &join_announcement(&press.actor.display_name()),
                SendOptions::markdown(),
            )
            .await
        {
            tracing::warn!(shelter_id, error = %e, "Could not announce new member");
        }

        self.edit(
            conversation,
            press.message_id,
            &format!(
                "✅ Congratulations!\n\nYou joined the shelter *{}*.",
                escape_markdown(&shelter.name)
            ),
            SendOptions::markdown().keyboard(back_to_main()),
        )
        .await?;
        Ok(Acknowledgement::silent())
    }

    pub(super) async fn confirm_leave(
        &self,
        press: &ButtonPress,
    ) -> HandlerResult<Acknowledgement> {
        let shelter = match self.store.get_user(press.actor.id).await? {
            Some(user) => match user.shelter_id {
                Some(id) => self.store.get_shelter(id).await?,
                None => None,
            },
            None => None,
        };
        let Some(shelter) = shelter else {
            tracing::debug!(user_id = press.actor.id, "Leave requested without a shelter");
            return self.shelter_overview(press).await;
        };

        self.edit(
            press.conversation.id,
            press.message_id,
            &format!(
                "⚠️ *Are you sure?*\n\nDo you want to leave the shelter *{}*?",
                escape_markdown(&shelter.name)
            ),
            SendOptions::markdown().keyboard(InlineKeyboard::new().row(vec![
                InlineButton::new("❌ No", CallbackAction::ManageShelter.to_payload()),
                InlineButton::new("✅ Yes, leave", CallbackAction::LeaveDo.to_payload()),
            ])),
        )
        .await?;
        Ok(Acknowledgement::silent())
    }

    pub(super) async fn leave_shelter(
        &self,
        press: &ButtonPress,
    ) -> HandlerResult<Acknowledgement> {
        self.store.set_user_shelter(press.actor.id, None).await?;
        tracing::info!(user_id = press.actor.id, "Left shelter");
        self.edit(
            press.conversation.id,
            press.message_id,
            "You left your shelter.",
            SendOptions::default().keyboard(
                InlineKeyboard::new().row(vec![refresh_button(), back_to_main_button()]),
            ),
        )
        .await?;
        Ok(Acknowledgement::silent())
    }

    // ========================================================================
    // Group lifecycle
    // ========================================================================

    pub(super) async fn on_membership(&self, change: &MembershipChange) {
        let conversation = change.conversation.id;

        if change.bot_removed {
            self.wizard.abandon(conversation).await;
            self.donations.close_conversation(conversation).await;
            self.scenarios.discard(conversation);
            if let Some(menu) = self.menus.active(conversation).await {
                delete_quietly(self.transport.as_ref(), conversation, menu).await;
            }
            self.menus.forget(conversation).await;
            match self.store.delete_shelter(conversation).await {
                Ok(detached) => {
                    tracing::info!(
                        chat_id = conversation,
                        detached,
                        "Bot removed; shelter deleted"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        chat_id = conversation,
                        error = %e,
                        "Failed to clean up shelter"
                    );
                }
            }
            return;
        }

        if change.joined.is_empty() {
            return;
        }
        match self.store.get_shelter(conversation).await {
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(chat_id = conversation, error = %e, "Shelter lookup failed");
                return;
            }
        }
        for actor in &change.joined {
            match self.store.add_possible_shelter(actor.id, conversation).await {
                Ok(true) => {
                    tracing::debug!(
                        chat_id = conversation,
                        user_id = actor.id,
                        "Recorded possible shelter"
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        chat_id = conversation,
                        user_id = actor.id,
                        error = %e,
                        "Could not record possible shelter"
                    );
                }
            }
        }
    }
}
