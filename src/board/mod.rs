//! Board service abstraction.
//!
//! The steward never owns state: boards, lists, cards and members all live in
//! the external service. [`BoardService`] is the seam every rule talks
//! through; [`trello::TrelloClient`] is the production implementation and
//! [`memory::InMemoryBoard`] backs the tests.

pub mod memory;
pub mod trello;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BoardError;

pub use memory::InMemoryBoard;
pub use trello::TrelloClient;

/// A named workspace containing ordered lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub id: String,
    pub name: String,
}

/// A column (pipeline stage) on a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardList {
    pub id: String,
    pub name: String,
}

/// A unit of work as reported by the board service.
///
/// Timestamps are kept in their wire form; the classifier parses them so a
/// single malformed value only affects the card it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub closed: bool,
    /// Due date, RFC 3339. `None` when unset.
    #[serde(default)]
    pub due: Option<String>,
    /// Last activity, RFC 3339.
    pub date_last_activity: String,
    #[serde(default)]
    pub id_members: Vec<String>,
}

/// A board member, looked up by id for mentions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub username: String,
}

/// Operations the steward needs from the board service.
///
/// Every call is awaited before the next is issued; implementations need not
/// handle concurrent use from a single run.
#[async_trait]
pub trait BoardService: Send + Sync {
    /// Boards visible to the given member.
    async fn boards_for_member(&self, member_id: &str) -> Result<Vec<Board>, BoardError>;

    /// Open lists on a board, in display order.
    async fn open_lists(&self, board_id: &str) -> Result<Vec<BoardList>, BoardError>;

    /// Create a list on a board at the given display position.
    async fn create_list(
        &self,
        board_id: &str,
        name: &str,
        position: u32,
    ) -> Result<BoardList, BoardError>;

    /// Every card in a list, including closed ones.
    async fn cards_in_list(&self, list_id: &str) -> Result<Vec<Card>, BoardError>;

    /// Look up a member by id.
    async fn member(&self, member_id: &str) -> Result<Member, BoardError>;

    async fn move_card_to_list(&self, card_id: &str, list_id: &str) -> Result<(), BoardError>;

    async fn move_card_to_board(&self, card_id: &str, board_id: &str) -> Result<(), BoardError>;

    /// Set or clear (`None`) a card's due date.
    async fn set_card_due(&self, card_id: &str, due: Option<&str>) -> Result<(), BoardError>;

    async fn set_card_closed(&self, card_id: &str, closed: bool) -> Result<(), BoardError>;

    async fn add_comment(&self, card_id: &str, text: &str) -> Result<(), BoardError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_decodes_from_trello_json() {
        let raw = serde_json::json!({
            "id": "c1",
            "name": "Fix login",
            "closed": false,
            "due": null,
            "dateLastActivity": "2024-05-01T10:00:00.000Z",
            "idMembers": ["m1", "m2"],
            "idList": "l1"
        });
        let card: Card = serde_json::from_value(raw).unwrap();
        assert_eq!(card.id, "c1");
        assert!(card.due.is_none());
        assert_eq!(card.date_last_activity, "2024-05-01T10:00:00.000Z");
        assert_eq!(card.id_members, vec!["m1", "m2"]);
    }

    #[test]
    fn card_tolerates_missing_optional_fields() {
        let raw = serde_json::json!({
            "id": "c2",
            "name": "Bare",
            "dateLastActivity": "2024-05-01T10:00:00.000Z"
        });
        let card: Card = serde_json::from_value(raw).unwrap();
        assert!(!card.closed);
        assert!(card.id_members.is_empty());
    }
}
