//! Shop, backpack and score screens

use super::menus::{back_to_main, back_to_main_button, escape_markdown};
use super::{CallbackAction, Dispatcher, HandlerResult};
use crate::chat::{Acknowledgement, ButtonPress, InlineKeyboard, SendOptions};
use crate::db::{PurchaseOutcome, ShopItem, User};

const BAR_WIDTH: i64 = 10;

/// `[█████░░░░░] used / capacity`
pub fn progress_bar(used: i64, capacity: i64) -> String {
    let filled = if capacity <= 0 {
        0
    } else {
        // Rounded to the nearest cell
        (used.clamp(0, capacity) * BAR_WIDTH + capacity / 2) / capacity
    };
    let filled = usize::try_from(filled).unwrap_or(0);
    let empty = usize::try_from(BAR_WIDTH).unwrap_or(0).saturating_sub(filled);
    format!(
        "[{}{}] {used} / {capacity}",
        "█".repeat(filled),
        "░".repeat(empty)
    )
}

/// The backpack tier the user can buy next, if any
fn next_tier<'a>(user: &User, items: &'a [ShopItem]) -> Option<&'a ShopItem> {
    items
        .iter()
        .find(|i| i.item_type.is_backpack_tier() && i.level == Some(user.backpack_level + 1))
}

fn render_shop(user: &User, items: &[ShopItem]) -> (String, InlineKeyboard) {
    let mut text = format!("*🛒 Shop*\n\nYour coins: *{}* 🪙\n\n---\n\n", user.coins);
    let mut keyboard = InlineKeyboard::new();

    match next_tier(user, items) {
        Some(item) => {
            text.push_str(&format!("*{}*\n", escape_markdown(&item.name)));
            if let Some(description) = &item.description {
                text.push_str(&format!("_{}_\n", escape_markdown(description)));
            }
            text.push_str(&format!("- Price: {} coins\n", item.price));
            keyboard = keyboard.button(
                format!("Buy {}", item.name),
                CallbackAction::Buy(item.id).to_payload(),
            );
        }
        None if user.backpack_level >= 3 => {
            text.push_str("You already own the best backpack!\n");
        }
        None => text.push_str("Nothing is for sale right now."),
    }

    keyboard.push_row(vec![back_to_main_button()]);
    (text, keyboard)
}

impl Dispatcher {
    pub(super) async fn open_shop(&self, press: &ButtonPress) -> HandlerResult<Acknowledgement> {
        let Some(user) = self.store.get_user(press.actor.id).await? else {
            return Ok(Acknowledgement::silent());
        };
        let items = self.store.shop_items().await?;
        let (text, keyboard) = render_shop(&user, &items);
        self.edit(
            press.conversation.id,
            press.message_id,
            &text,
            SendOptions::markdown().keyboard(keyboard),
        )
        .await?;
        Ok(Acknowledgement::silent())
    }

    pub(super) async fn buy(
        &self,
        press: &ButtonPress,
        item_id: i64,
    ) -> HandlerResult<Acknowledgement> {
        let ack = match self.store.purchase(press.actor.id, item_id).await? {
            PurchaseOutcome::Purchased { item, coins_left } => {
                tracing::info!(
                    user_id = press.actor.id,
                    item = %item.name,
                    coins_left,
                    "Purchase completed"
                );
                self.open_shop(press).await?;
                return Ok(Acknowledgement::toast(format!("✅ Bought \"{}\".", item.name)));
            }
            PurchaseOutcome::ItemMissing => "❌ This item is no longer available.",
            PurchaseOutcome::OutOfStock => "❌ This item is sold out.",
            PurchaseOutcome::InsufficientCoins => {
                "🪙 You do not have enough coins for this item."
            }
            PurchaseOutcome::TierLocked => "⚠️ You cannot buy this backpack tier yet.",
            PurchaseOutcome::UserMissing => super::START_PRIVATELY,
        };
        Ok(Acknowledgement::alert(ack))
    }

    pub(super) async fn open_backpack(
        &self,
        press: &ButtonPress,
    ) -> HandlerResult<Acknowledgement> {
        let user = match self.store.get_user(press.actor.id).await? {
            Some(user) if user.backpack_level > 0 => user,
            _ => return Ok(Acknowledgement::alert("You do not have a backpack.")),
        };

        let mut text = format!(
            "*🎒 Your backpack (level {})*\n\n*Capacity:* {}\n\n*Contents:*\n",
            user.backpack_level,
            progress_bar(user.backpack_used(), user.backpack_capacity())
        );
        if user.backpack.is_empty() {
            text.push_str("Your backpack is empty.");
        } else {
            let lines: Vec<String> = user
                .backpack
                .iter()
                .map(|item| format!("- {} (x{})", escape_markdown(&item.name), item.quantity))
                .collect();
            text.push_str(&lines.join("\n"));
        }

        self.edit(
            press.conversation.id,
            press.message_id,
            &text,
            SendOptions::markdown().keyboard(back_to_main()),
        )
        .await?;
        Ok(Acknowledgement::silent())
    }

    pub(super) async fn show_score(&self, press: &ButtonPress) -> HandlerResult<Acknowledgement> {
        let score = self
            .store
            .get_user(press.actor.id)
            .await?
            .map_or(0.0, |u| u.survival_percentage);
        Ok(Acknowledgement::alert(format!("🧟 Survival chance: {score:.2}%")))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{harness, harness_with, press, DM};
    use super::*;
    use crate::chat::{Actor, Conversation};
    use crate::runtime::testing::{InMemoryGameStore, MockContent};

    #[test]
    fn test_progress_bar() {
        assert_eq!(progress_bar(0, 50), "[░░░░░░░░░░] 0 / 50");
        assert_eq!(progress_bar(25, 50), "[█████░░░░░] 25 / 50");
        assert_eq!(progress_bar(75, 75), "[██████████] 75 / 75");
        assert_eq!(progress_bar(120, 100), "[██████████] 120 / 100");
        assert_eq!(progress_bar(3, 0), "[░░░░░░░░░░] 3 / 0");
    }

    #[tokio::test]
    async fn test_shop_offers_next_tier_only() {
        let h = harness();
        h.dispatcher
            .dispatch(press(Conversation::private(DM), DM, 1, "action:open_shop"))
            .await;
        let edit = h.transport.edits().pop().unwrap();
        let items = h.store.db().shop_items().unwrap();
        let first_tier = items.iter().find(|i| i.level == Some(1)).unwrap();
        let payloads: Vec<String> = edit
            .opts
            .keyboard
            .unwrap()
            .payloads()
            .map(str::to_string)
            .collect();
        assert_eq!(
            payloads,
            vec![format!("shop:buy:{}", first_tier.id), "navigate:main".to_string()]
        );
    }

    #[tokio::test]
    async fn test_buy_deducts_coins_and_refreshes() {
        let h = harness();
        let items = h.store.db().shop_items().unwrap();
        let first = items.iter().find(|i| i.level == Some(1)).unwrap().clone();
        let second = items.iter().find(|i| i.level == Some(2)).unwrap().clone();

        let payload = format!("shop:buy:{}", first.id);
        h.dispatcher
            .dispatch(press(Conversation::private(DM), DM, 1, &payload))
            .await;
        let acks = h.transport.acks_for(&format!("cb-1-{payload}"));
        assert_eq!(acks.len(), 1);
        assert!(!acks[0].alert);

        let user = h.store.db().get_user(DM).unwrap().unwrap();
        assert_eq!(user.backpack_level, 1);
        assert_eq!(user.coins, 10_000 - first.price);
        assert!(h
            .transport
            .edits()
            .pop()
            .unwrap()
            .opts
            .keyboard
            .unwrap()
            .payloads()
            .any(|p| p == format!("shop:buy:{}", second.id)));
    }

    #[tokio::test]
    async fn test_buying_out_of_order_is_refused() {
        let h = harness();
        let items = h.store.db().shop_items().unwrap();
        let third = items.iter().find(|i| i.level == Some(3)).unwrap();
        let payload = format!("shop:buy:{}", third.id);
        h.dispatcher
            .dispatch(press(Conversation::private(DM), DM, 1, &payload))
            .await;
        let acks = h.transport.acks_for(&format!("cb-1-{payload}"));
        assert!(acks[0].alert);
        assert_eq!(h.store.db().get_user(DM).unwrap().unwrap().coins, 10_000);
    }

    #[tokio::test]
    async fn test_backpack_without_one_alerts() {
        let h = harness();
        h.dispatcher
            .dispatch(press(Conversation::private(DM), DM, 1, "action:open_backpack"))
            .await;
        let acks = h.transport.acks_for("cb-1-action:open_backpack");
        assert_eq!(acks, vec![Acknowledgement::alert("You do not have a backpack.")]);
    }

    #[tokio::test]
    async fn test_backpack_shows_capacity_bar() {
        let h = harness_with(
            InMemoryGameStore::new().with_user(&Actor::new(DM, "Sara")),
            MockContent::new(),
        );
        let first = h
            .store
            .db()
            .shop_items()
            .unwrap()
            .into_iter()
            .find(|i| i.level == Some(1))
            .unwrap();
        h.store.db().purchase(DM, first.id).unwrap();
        h.store.db().give_items(DM, "Water", 10).unwrap();

        h.dispatcher
            .dispatch(press(Conversation::private(DM), DM, 1, "action:open_backpack"))
            .await;
        let text = h.transport.edits().pop().unwrap().text;
        assert!(text.contains("[██░░░░░░░░] 10 / 50"), "{text}");
        assert!(text.contains("Water (x10)"));
    }

    #[tokio::test]
    async fn test_score_is_an_alert() {
        let h = harness();
        h.dispatcher
            .dispatch(press(Conversation::private(DM), DM, 1, "action:show_score"))
            .await;
        let acks = h.transport.acks_for("cb-1-action:show_score");
        assert_eq!(acks, vec![Acknowledgement::alert("🧟 Survival chance: 0.00%")]);
    }
}
