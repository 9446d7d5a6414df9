//! Mention-and-comment notifications.

use std::collections::HashMap;

use tracing::info;

use crate::board::{BoardService, Card};
use crate::error::BoardError;

/// Composes and posts `@mention` comments on cards.
pub struct Notifier {
    admin_username: Option<String>,
    usernames: HashMap<String, String>,
}

impl Notifier {
    /// `admin_username` is mentioned on cards that have no members.
    pub fn new(admin_username: Option<String>) -> Self {
        Self {
            admin_username: admin_username.filter(|a| !a.is_empty()),
            usernames: HashMap::new(),
        }
    }

    /// Build the comment text for a card: member mentions (or the admin
    /// fallback when there are none), then the message body.
    pub async fn compose(
        &mut self,
        service: &dyn BoardService,
        card: &Card,
        body: &str,
    ) -> Result<String, BoardError> {
        let mut parts = Vec::with_capacity(card.id_members.len() + 2);
        for member_id in &card.id_members {
            let username = self.username(service, member_id).await?;
            parts.push(format!("@{username}"));
        }
        if card.id_members.is_empty()
            && let Some(admin) = &self.admin_username
        {
            parts.push(format!("@{admin}"));
        }
        parts.push(body.to_string());
        Ok(parts.join(" "))
    }

    /// Compose the comment and post it to the card.
    pub async fn notify(
        &mut self,
        service: &dyn BoardService,
        card: &Card,
        body: &str,
    ) -> Result<(), BoardError> {
        let text = self.compose(service, card, body).await?;
        service.add_comment(&card.id, &text).await?;
        info!(card_id = %card.id, card = %card.name, "Posted comment on card");
        Ok(())
    }

    async fn username(
        &mut self,
        service: &dyn BoardService,
        member_id: &str,
    ) -> Result<String, BoardError> {
        if let Some(name) = self.usernames.get(member_id) {
            return Ok(name.clone());
        }
        let member = service.member(member_id).await?;
        self.usernames
            .insert(member_id.to_string(), member.username.clone());
        Ok(member.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::InMemoryBoard;

    fn card(members: &[&str]) -> Card {
        Card {
            id: "c1".into(),
            name: "Ship it".into(),
            closed: false,
            due: None,
            date_last_activity: "2024-05-01T00:00:00Z".into(),
            id_members: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    fn board() -> InMemoryBoard {
        let board = InMemoryBoard::new();
        board.add_board("b", "Board");
        board.add_list("b", "l", "In Progress");
        board.add_member("m1", "alice");
        board.add_member("m2", "bob");
        board
    }

    #[tokio::test]
    async fn mentions_every_member() {
        let board = board();
        let mut notifier = Notifier::new(Some("admin".into()));
        let text = notifier
            .compose(&board, &card(&["m1", "m2"]), "Any blockers?")
            .await
            .unwrap();
        assert_eq!(text, "@alice @bob Any blockers?");
    }

    #[tokio::test]
    async fn falls_back_to_admin_without_members() {
        let board = board();
        let mut notifier = Notifier::new(Some("admin".into()));
        let text = notifier.compose(&board, &card(&[]), "Any blockers?").await.unwrap();
        assert_eq!(text, "@admin Any blockers?");
    }

    #[tokio::test]
    async fn no_members_and_no_admin_is_body_only() {
        let board = board();
        let mut notifier = Notifier::new(None);
        let text = notifier.compose(&board, &card(&[]), "Any blockers?").await.unwrap();
        assert_eq!(text, "Any blockers?");
    }

    #[tokio::test]
    async fn member_lookups_are_cached() {
        let board = board();
        let mut notifier = Notifier::new(None);
        notifier.compose(&board, &card(&["m1"]), "a").await.unwrap();
        notifier.compose(&board, &card(&["m1", "m2"]), "b").await.unwrap();
        assert_eq!(board.calls("member"), 2);
    }

    #[tokio::test]
    async fn notify_posts_to_card() {
        let board = board();
        let c = card(&["m2"]);
        board.add_card("l", c.clone());
        let mut notifier = Notifier::new(None);
        notifier.notify(&board, &c, "Ready.").await.unwrap();
        assert_eq!(board.comments("c1"), vec!["@bob Ready."]);
    }

    #[tokio::test]
    async fn unknown_member_is_an_error() {
        let board = board();
        let mut notifier = Notifier::new(None);
        let err = notifier.compose(&board, &card(&["m9"]), "x").await.unwrap_err();
        assert!(matches!(err, BoardError::NotFound { .. }));
    }
}
