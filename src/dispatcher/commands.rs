//! Slash command table

use super::menus::escape_markdown;
use super::{Dispatcher, HandlerResult};
use crate::chat::{ChatKind, SendOptions, TextMessage};
use crate::wizard::WizardError;

const GROUP_ONLY: &str = "This command only works in groups.";
const REGISTER_FIRST: &str =
    "⚠️ To use the bot in groups, first start it in a private chat and send /start.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Shelter,
    Manage,
    Members,
}

impl Command {
    /// Parse the leading `/command[@bot]` token. Commands addressed to a
    /// different bot are not ours.
    pub fn parse(text: &str, bot_username: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?.strip_prefix('/')?;
        let name = match token.split_once('@') {
            Some((name, target)) if target.eq_ignore_ascii_case(bot_username) => name,
            Some(_) => return None,
            None => token,
        };
        match name {
            "start" => Some(Command::Start),
            "shelter" => Some(Command::Shelter),
            "manage" => Some(Command::Manage),
            "members" => Some(Command::Members),
            _ => None,
        }
    }
}

impl Dispatcher {
    pub(super) async fn on_command(&self, message: &TextMessage) -> HandlerResult {
        let Some(command) = Command::parse(&message.text, self.transport.bot_username()) else {
            return Ok(());
        };
        tracing::info!(
            chat_id = message.conversation.id,
            user_id = message.actor.id,
            command = ?command,
            "Command received"
        );
        match command {
            Command::Start => self.start_command(message).await,
            Command::Shelter => self.shelter_command(message).await,
            Command::Manage => self.manage_command(message).await,
            Command::Members => self.members_command(message).await,
        }
    }

    async fn start_command(&self, message: &TextMessage) -> HandlerResult {
        let conversation = message.conversation;
        let actor = &message.actor;

        if conversation.kind == ChatKind::Private {
            self.store.upsert_user(actor).await?;
            self.publish_main(conversation.id, actor).await?;
            return Ok(());
        }

        if !self.store.user_exists(actor.id).await? {
            self.send(
                conversation.id,
                REGISTER_FIRST,
                SendOptions::default().reply_to(message.message_id),
            )
            .await?;
            return Ok(());
        }

        // Starting the bot in a shelter group makes it joinable from the private menu
        if self.store.get_shelter(conversation.id).await?.is_some() {
            self.store
                .add_possible_shelter(actor.id, conversation.id)
                .await?;
        }
        self.send(
            conversation.id,
            "✅ *Help*\n\n- Use the bot's features in a private chat.\n\
             - Register this group as a shelter with /shelter.",
            SendOptions::markdown(),
        )
        .await?;
        Ok(())
    }

    async fn shelter_command(&self, message: &TextMessage) -> HandlerResult {
        let conversation = message.conversation;
        if !conversation.kind.is_group() {
            self.send(conversation.id, GROUP_ONLY, SendOptions::default())
                .await?;
            return Ok(());
        }
        if !self.store.user_exists(message.actor.id).await? {
            self.send(
                conversation.id,
                REGISTER_FIRST,
                SendOptions::default().reply_to(message.message_id),
            )
            .await?;
            return Ok(());
        }

        if let Some(shelter) = self.store.get_shelter(conversation.id).await? {
            return self.show_shelter_info(conversation.id, &shelter).await;
        }

        if self.wizard.is_open(conversation.id).await {
            self.send(
                conversation.id,
                "A shelter registration is already in progress in this group. Finish it first.",
                SendOptions::default(),
            )
            .await?;
            return Ok(());
        }

        let status = self
            .transport
            .member_status(conversation.id, message.actor.id)
            .await?;
        if !status.is_privileged() {
            self.send(
                conversation.id,
                "Only group admins can register a new shelter.",
                SendOptions::default(),
            )
            .await?;
            return Ok(());
        }

        match self
            .wizard
            .start(conversation.id, message.actor.id, Some(message.message_id))
            .await
        {
            Ok(_) => Ok(()),
            Err(WizardError::AlreadyOpen(_)) => {
                self.send(
                    conversation.id,
                    "A shelter registration is already in progress in this group. Finish it first.",
                    SendOptions::default(),
                )
                .await?;
                Ok(())
            }
            Err(WizardError::Transport(e)) => Err(e.into()),
            Err(WizardError::Transition(e)) => {
                tracing::error!(chat_id = conversation.id, error = %e, "Wizard could not start");
                Ok(())
            }
        }
    }

    async fn members_command(&self, message: &TextMessage) -> HandlerResult {
        let conversation = message.conversation;
        if !conversation.kind.is_group() {
            self.send(conversation.id, GROUP_ONLY, SendOptions::default())
                .await?;
            return Ok(());
        }
        let Some(shelter) = self.store.get_shelter(conversation.id).await? else {
            self.send(
                conversation.id,
                "This group is not a registered shelter. Use /shelter first.",
                SendOptions::default(),
            )
            .await?;
            return Ok(());
        };

        let members = self.store.shelter_members(conversation.id).await?;
        let text = if members.is_empty() {
            "No members found in this shelter.".to_string()
        } else {
            let mut text = format!("👥 *Members of \"{}\":*\n\n", escape_markdown(&shelter.name));
            for (i, member) in members.iter().enumerate() {
                text.push_str(&format!("{}. {}\n", i + 1, escape_markdown(&member.display_name())));
            }
            text
        };
        self.send(conversation.id, &text, SendOptions::markdown())
            .await?;
        Ok(())
    }
}
