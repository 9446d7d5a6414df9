//! In-memory board service.
//!
//! Holds boards, lists, cards and members in a single mutex-guarded state and
//! records every mutation, so rule behaviour can be asserted without a
//! network. Supports simulated eventual consistency for newly created lists
//! and one-shot failure injection per operation.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Board, BoardList, BoardService, Card, Member};
use crate::error::BoardError;

/// Where a card currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCard {
    pub card: Card,
    pub board_id: String,
    pub list_id: String,
}

#[derive(Debug, Clone)]
struct StoredList {
    board_id: String,
    list: BoardList,
    position: u32,
    /// Reads still to be served before the list shows up in `open_lists`.
    hidden_reads: u32,
}

#[derive(Debug, Default)]
struct State {
    boards: Vec<Board>,
    lists: Vec<StoredList>,
    cards: Vec<StoredCard>,
    members: HashMap<String, Member>,
    comments: Vec<(String, String)>,
    calls: HashMap<&'static str, usize>,
    fail_once: HashSet<&'static str>,
    new_list_lag: u32,
    next_id: u64,
}

impl State {
    fn record(&mut self, op: &'static str) -> Result<(), BoardError> {
        *self.calls.entry(op).or_default() += 1;
        if self.fail_once.remove(op) {
            return Err(BoardError::Status {
                endpoint: op.to_string(),
                status: 503,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn card_mut(&mut self, card_id: &str) -> Result<&mut StoredCard, BoardError> {
        self.cards
            .iter_mut()
            .find(|c| c.card.id == card_id)
            .ok_or_else(|| BoardError::NotFound {
                entity: "card".to_string(),
                id: card_id.to_string(),
            })
    }
}

/// Board service backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryBoard {
    state: Mutex<State>,
}

impl InMemoryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked mid-call.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_board(&self, id: &str, name: &str) {
        self.state().boards.push(Board {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn add_list(&self, board_id: &str, id: &str, name: &str) {
        let mut state = self.state();
        let position = state.lists.len() as u32;
        state.lists.push(StoredList {
            board_id: board_id.to_string(),
            list: BoardList {
                id: id.to_string(),
                name: name.to_string(),
            },
            position,
            hidden_reads: 0,
        });
    }

    /// Place a card in a list; its board is taken from the list.
    pub fn add_card(&self, list_id: &str, card: Card) {
        let mut state = self.state();
        let board_id = state
            .lists
            .iter()
            .find(|l| l.list.id == list_id)
            .map(|l| l.board_id.clone())
            .unwrap_or_default();
        state.cards.push(StoredCard {
            card,
            board_id,
            list_id: list_id.to_string(),
        });
    }

    pub fn add_member(&self, id: &str, username: &str) {
        self.state().members.insert(
            id.to_string(),
            Member {
                id: id.to_string(),
                username: username.to_string(),
            },
        );
    }

    /// Newly created lists stay invisible to `open_lists` for this many reads.
    pub fn set_new_list_lag(&self, reads: u32) {
        self.state().new_list_lag = reads;
    }

    /// Make the next call to `operation` fail with a 503.
    pub fn fail_next(&self, operation: &'static str) {
        self.state().fail_once.insert(operation);
    }

    pub fn card(&self, card_id: &str) -> Option<StoredCard> {
        self.state()
            .cards
            .iter()
            .find(|c| c.card.id == card_id)
            .cloned()
    }

    /// Comments posted to a card, oldest first.
    pub fn comments(&self, card_id: &str) -> Vec<String> {
        self.state()
            .comments
            .iter()
            .filter(|(id, _)| id == card_id)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn total_comments(&self) -> usize {
        self.state().comments.len()
    }

    /// All lists on a board, including ones not yet visible to reads.
    pub fn lists_named(&self, board_id: &str, name: &str) -> Vec<BoardList> {
        self.state()
            .lists
            .iter()
            .filter(|l| l.board_id == board_id && l.list.name == name)
            .map(|l| l.list.clone())
            .collect()
    }

    /// Number of times an operation was invoked.
    pub fn calls(&self, operation: &str) -> usize {
        self.state().calls.get(operation).copied().unwrap_or(0)
    }
}

#[async_trait]
impl BoardService for InMemoryBoard {
    async fn boards_for_member(&self, _member_id: &str) -> Result<Vec<Board>, BoardError> {
        let mut state = self.state();
        state.record("boards_for_member")?;
        Ok(state.boards.clone())
    }

    async fn open_lists(&self, board_id: &str) -> Result<Vec<BoardList>, BoardError> {
        let mut state = self.state();
        state.record("open_lists")?;
        let mut visible: Vec<(u32, BoardList)> = Vec::new();
        for stored in state.lists.iter_mut().filter(|l| l.board_id == board_id) {
            if stored.hidden_reads > 0 {
                stored.hidden_reads -= 1;
                continue;
            }
            visible.push((stored.position, stored.list.clone()));
        }
        visible.sort_by_key(|(pos, _)| *pos);
        Ok(visible.into_iter().map(|(_, list)| list).collect())
    }

    async fn create_list(
        &self,
        board_id: &str,
        name: &str,
        position: u32,
    ) -> Result<BoardList, BoardError> {
        let mut state = self.state();
        state.record("create_list")?;
        state.next_id += 1;
        let list = BoardList {
            id: format!("list-{}", state.next_id),
            name: name.to_string(),
        };
        let hidden_reads = state.new_list_lag;
        state.lists.push(StoredList {
            board_id: board_id.to_string(),
            list: list.clone(),
            position,
            hidden_reads,
        });
        Ok(list)
    }

    async fn cards_in_list(&self, list_id: &str) -> Result<Vec<Card>, BoardError> {
        let mut state = self.state();
        state.record("cards_in_list")?;
        Ok(state
            .cards
            .iter()
            .filter(|c| c.list_id == list_id)
            .map(|c| c.card.clone())
            .collect())
    }

    async fn member(&self, member_id: &str) -> Result<Member, BoardError> {
        let mut state = self.state();
        state.record("member")?;
        state
            .members
            .get(member_id)
            .cloned()
            .ok_or_else(|| BoardError::NotFound {
                entity: "member".to_string(),
                id: member_id.to_string(),
            })
    }

    async fn move_card_to_list(&self, card_id: &str, list_id: &str) -> Result<(), BoardError> {
        let mut state = self.state();
        state.record("move_card_to_list")?;
        state.card_mut(card_id)?.list_id = list_id.to_string();
        Ok(())
    }

    async fn move_card_to_board(&self, card_id: &str, board_id: &str) -> Result<(), BoardError> {
        let mut state = self.state();
        state.record("move_card_to_board")?;
        state.card_mut(card_id)?.board_id = board_id.to_string();
        Ok(())
    }

    async fn set_card_due(&self, card_id: &str, due: Option<&str>) -> Result<(), BoardError> {
        let mut state = self.state();
        state.record("set_card_due")?;
        state.card_mut(card_id)?.card.due = due.map(str::to_string);
        Ok(())
    }

    async fn set_card_closed(&self, card_id: &str, closed: bool) -> Result<(), BoardError> {
        let mut state = self.state();
        state.record("set_card_closed")?;
        state.card_mut(card_id)?.card.closed = closed;
        Ok(())
    }

    async fn add_comment(&self, card_id: &str, text: &str) -> Result<(), BoardError> {
        let mut state = self.state();
        state.record("add_comment")?;
        state.card_mut(card_id)?;
        state
            .comments
            .push((card_id.to_string(), text.to_string()));
        Ok(())
    }
}
