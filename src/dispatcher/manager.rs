//! In-group shelter management and donation prompts

use super::callback::ManageRoute;
use super::menus::escape_markdown;
use super::{CallbackAction, Dispatcher, HandlerResult};
use crate::chat::{
    Acknowledgement, ButtonPress, ChatId, ChatKind, InlineKeyboard, SendOptions, TextMessage,
    UserId,
};
use crate::db::{DonationOutcome, Shelter};
use crate::stores::{Correlation, DonationKind};

/// A parsed supplies donation reply: `<item name> <quantity>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuppliesReply {
    pub item: String,
    pub quantity: i64,
}

pub fn parse_coins(text: &str) -> Option<i64> {
    text.trim().parse().ok().filter(|amount| *amount > 0)
}

pub fn parse_supplies(text: &str) -> Option<SuppliesReply> {
    let (item, quantity) = text.trim().rsplit_once(char::is_whitespace)?;
    let item = item.trim();
    let quantity: i64 = quantity.parse().ok()?;
    if item.is_empty() || quantity <= 0 {
        return None;
    }
    Some(SuppliesReply {
        item: item.to_string(),
        quantity,
    })
}

fn manage_main(shelter: &Shelter) -> (String, InlineKeyboard) {
    let mut text = format!(
        "*🛠️ Managing \"{}\"*\n\n- *Treasury:* {} coins 🪙\n- *Stockpile:* ",
        escape_markdown(&shelter.name),
        shelter.treasury
    );
    if shelter.stockpile.is_empty() {
        text.push_str("empty");
    } else {
        let items: Vec<String> = shelter
            .stockpile
            .iter()
            .map(|i| format!("{} x{}", escape_markdown(&i.name), i.quantity))
            .collect();
        text.push_str(&items.join(", "));
    }
    let keyboard = InlineKeyboard::new()
        .button(
            "💰 Treasury",
            CallbackAction::Manage(ManageRoute::Treasury).to_payload(),
        )
        .button(
            "📦 Donate supplies",
            CallbackAction::Manage(ManageRoute::DonateSupplies).to_payload(),
        );
    (text, keyboard)
}

impl Dispatcher {
    /// Shelter owned by `conversation`, if `user` is one of its members
    async fn membership(
        &self,
        conversation: ChatId,
        user: UserId,
    ) -> HandlerResult<Option<Shelter>> {
        let is_member = self
            .store
            .get_user(user)
            .await?
            .is_some_and(|u| u.shelter_id == Some(conversation));
        if !is_member {
            return Ok(None);
        }
        Ok(self.store.get_shelter(conversation).await?)
    }

    pub(super) async fn manage_command(&self, message: &TextMessage) -> HandlerResult {
        let conversation = message.conversation.id;
        if message.conversation.kind == ChatKind::Private {
            self.send(
                conversation,
                "This command only works in shelter groups.",
                SendOptions::default(),
            )
            .await?;
            return Ok(());
        }
        if self.store.get_shelter(conversation).await?.is_none() {
            self.send(
                conversation,
                "This group is not a registered shelter. Use /shelter to create one.",
                SendOptions::default(),
            )
            .await?;
            return Ok(());
        }
        let Some(shelter) = self.membership(conversation, message.actor.id).await? else {
            self.send(
                conversation,
                "You are not a member of this shelter and cannot manage it.",
                SendOptions::default().reply_to(message.message_id),
            )
            .await?;
            return Ok(());
        };

        let (text, keyboard) = manage_main(&shelter);
        self.send(conversation, &text, SendOptions::markdown().keyboard(keyboard))
            .await?;
        Ok(())
    }

    /// `shelter_manage:<route>`
    pub(super) async fn manage(
        &self,
        press: &ButtonPress,
        route: ManageRoute,
    ) -> HandlerResult<Acknowledgement> {
        let conversation = press.conversation.id;
        let Some(shelter) = self.membership(conversation, press.actor.id).await? else {
            return Ok(Acknowledgement::alert("You are not a member of this shelter."));
        };

        match route {
            ManageRoute::Main => {
                let (text, keyboard) = manage_main(&shelter);
                self.edit(
                    conversation,
                    press.message_id,
                    &text,
                    SendOptions::markdown().keyboard(keyboard),
                )
                .await?;
            }
            ManageRoute::Treasury => {
                let text = format!(
                    "*💰 Shelter treasury*\n\n- *Balance:* {} coins 🪙\n\n\
                     You can donate some of your coins for the shelter's future.",
                    shelter.treasury
                );
                let keyboard = InlineKeyboard::new()
                    .button(
                        "🎁 Donate coins",
                        CallbackAction::Manage(ManageRoute::DonateCoins).to_payload(),
                    )
                    .button(
                        "➡️ Back",
                        CallbackAction::Manage(ManageRoute::Main).to_payload(),
                    );
                self.edit(
                    conversation,
                    press.message_id,
                    &text,
                    SendOptions::markdown().keyboard(keyboard),
                )
                .await?;
            }
            ManageRoute::DonateCoins => {
                let coins = self
                    .store
                    .get_user(press.actor.id)
                    .await?
                    .map_or(0, |u| u.coins);
                let text = format!(
                    "🎁 Donate to the treasury\n\nYour balance: {coins} coins 🪙\n\n\
                     Reply to this message with the amount to donate."
                );
                self.issue_donation_prompt(press, &text, DonationKind::Coins).await?;
            }
            ManageRoute::DonateSupplies => {
                let backpack = self
                    .store
                    .get_user(press.actor.id)
                    .await?
                    .map(|u| u.backpack)
                    .unwrap_or_default();
                if backpack.is_empty() {
                    return Ok(Acknowledgement::alert("Your backpack is empty."));
                }
                let items: Vec<String> = backpack
                    .iter()
                    .map(|i| format!("- {} (x{})", i.name, i.quantity))
                    .collect();
                let text = format!(
                    "📦 Donate supplies\n\nYour backpack:\n{}\n\n\
                     Reply to this message with the item name and quantity, e.g. \"Water 3\".",
                    items.join("\n")
                );
                self.issue_donation_prompt(press, &text, DonationKind::Supplies).await?;
            }
        }
        Ok(Acknowledgement::silent())
    }

    async fn issue_donation_prompt(
        &self,
        press: &ButtonPress,
        text: &str,
        kind: DonationKind,
    ) -> HandlerResult {
        let conversation = press.conversation.id;
        let prompt_id = self
            .send(conversation, text, SendOptions::default().force_reply())
            .await?;
        self.donations
            .issue(conversation, press.actor.id, prompt_id, kind)
            .await;
        tracing::debug!(
            chat_id = conversation,
            user_id = press.actor.id,
            prompt_id,
            kind = ?kind,
            "Donation prompt issued"
        );
        Ok(())
    }

    /// Offer a text message to the donation prompts. Returns false when it
    /// does not answer the actor's pending prompt.
    pub(super) async fn handle_donation_reply(&self, message: &TextMessage) -> HandlerResult<bool> {
        let Some(reply_to) = message.reply_to else {
            return Ok(false);
        };
        let conversation = message.conversation.id;
        let actor = message.actor.id;
        // One reply per prompt, whatever the outcome
        let prompt = match self.donations.take(conversation, actor, reply_to).await {
            Correlation::Matched(prompt) => prompt,
            Correlation::NotThisFlow => return Ok(false),
        };
        tracing::debug!(
            chat_id = conversation,
            user_id = actor,
            prompt_id = prompt.prompt_id,
            waited_secs = prompt.issued_at.elapsed().as_secs(),
            "Donation reply matched"
        );

        let reply = SendOptions::default().reply_to(message.message_id);
        let outcome = match prompt.kind {
            DonationKind::Coins => {
                let Some(amount) = parse_coins(&message.text) else {
                    self.send(
                        conversation,
                        "❌ Invalid amount. Please send a positive whole number.",
                        reply,
                    )
                    .await?;
                    return Ok(true);
                };
                let outcome = self.store.donate_coins(actor, conversation, amount).await?;
                (outcome, format!("{amount} coins"))
            }
            DonationKind::Supplies => {
                let Some(parsed) = parse_supplies(&message.text) else {
                    self.send(
                        conversation,
                        "❌ Invalid donation. Send the item name followed by a positive quantity.",
                        reply,
                    )
                    .await?;
                    return Ok(true);
                };
                let outcome = self
                    .store
                    .donate_supplies(actor, conversation, &parsed.item, parsed.quantity)
                    .await?;
                (outcome, format!("{} x{}", parsed.item, parsed.quantity))
            }
        };

        let text = match outcome {
            (
                DonationOutcome::Completed {
                    donor_balance,
                    shelter_balance,
                },
                what,
            ) => {
                tracing::info!(
                    chat_id = conversation,
                    user_id = actor,
                    donation = %what,
                    "Donation completed"
                );
                format!(
                    "✅ Donation complete!\n\n{} donated {what} to the shelter.\n\n\
                     - You have left: {donor_balance}\n\
                     - The shelter now holds: {shelter_balance}",
                    message.actor.display_name()
                )
            }
            (DonationOutcome::Insufficient, _) => match prompt.kind {
                DonationKind::Coins => {
                    "🪙 You do not have enough coins for that donation.".to_string()
                }
                DonationKind::Supplies => {
                    "🎒 You do not have that many of this item.".to_string()
                }
            },
            (DonationOutcome::Missing, _) => "❌ This shelter no longer exists.".to_string(),
        };
        self.send(conversation, &text, reply).await?;
        Ok(true)
    }
}
