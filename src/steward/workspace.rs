//! Startup resolution of board and list ids by name.

use tracing::{debug, info};

use crate::board::{Board, BoardList, BoardService};
use crate::config::WorkspaceNames;
use crate::error::{Error, WorkspaceError};

/// Ids of the two boards and five stages every rule depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub current_board: String,
    pub archive_board: String,
    pub icebox: String,
    pub next_up: String,
    pub in_progress: String,
    pub done: String,
    pub live_recent: String,
}

/// Looks up ids by exact name on the board service.
pub struct WorkspaceResolver<'a> {
    service: &'a dyn BoardService,
    member_id: &'a str,
}

impl<'a> WorkspaceResolver<'a> {
    pub fn new(service: &'a dyn BoardService, member_id: &'a str) -> Self {
        Self { service, member_id }
    }

    /// First board visible to the member whose name matches exactly.
    pub async fn board_id(&self, name: &str) -> Result<Option<String>, Error> {
        let boards = self.service.boards_for_member(self.member_id).await?;
        Ok(board_named(&boards, name))
    }

    /// First open list on the board whose name matches exactly.
    pub async fn list_id(&self, board_id: &str, name: &str) -> Result<Option<String>, Error> {
        let lists = self.service.open_lists(board_id).await?;
        Ok(list_named(&lists, name))
    }

    /// Resolve every id, failing with all missing list names at once.
    pub async fn resolve(&self, names: &WorkspaceNames) -> Result<Workspace, Error> {
        let boards = self.service.boards_for_member(self.member_id).await?;
        let find_board = |name: &str| {
            board_named(&boards, name).ok_or_else(|| WorkspaceError::BoardNotFound {
                name: name.to_string(),
            })
        };
        let current_board = find_board(&names.current_board)?;
        let archive_board = find_board(&names.archive_board)?;

        let lists = self.service.open_lists(&current_board).await?;
        let mut missing = Vec::new();
        let mut find_list = |name: &str| {
            list_named(&lists, name).unwrap_or_else(|| {
                missing.push(name.to_string());
                String::new()
            })
        };
        let workspace = Workspace {
            icebox: find_list(&names.icebox),
            next_up: find_list(&names.next_up),
            in_progress: find_list(&names.in_progress),
            done: find_list(&names.done),
            live_recent: find_list(&names.live_recent),
            current_board,
            archive_board,
        };

        if !missing.is_empty() {
            return Err(WorkspaceError::ListsNotFound {
                board: names.current_board.clone(),
                names: missing,
            }
            .into());
        }

        debug!(?workspace, "Resolved workspace ids");
        info!(
            current_board = %names.current_board,
            archive_board = %names.archive_board,
            "Workspace resolved"
        );
        Ok(workspace)
    }
}

fn board_named(boards: &[Board], name: &str) -> Option<String> {
    boards.iter().find(|b| b.name == name).map(|b| b.id.clone())
}

fn list_named(lists: &[BoardList], name: &str) -> Option<String> {
    lists.iter().find(|l| l.name == name).map(|l| l.id.clone())
}
