//! Card lifecycle rules.
//!
//! Every rule has the same shape: read all cards in its source list, keep the
//! ones its predicate selects, apply its action to each, count them. The
//! shape lives once in [`evaluate`]; [`TransitionRule`] supplies the source
//! list, predicate and action.
//!
//! Rules read disjoint lists, so a card can match at most one rule per run.

use tracing::{debug, info, warn};

use super::classifier::{CardClock, due_of};
use super::notify::Notifier;
use super::quarter::QuarterBucketResolver;
use super::workspace::Workspace;
use crate::board::{BoardService, Card};
use crate::error::{BoardError, TimestampError};

/// Comment posted on stalled In Progress cards.
pub const STATUS_REQUEST: &str = "Do you have any updates? Any blockers?";

/// Comment posted when a card leaves the Icebox.
pub const READY_TO_WORK: &str =
    "This card was waiting in the Icebox and is now ready to be worked on.";

/// The four rules, in the order a run applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransitionRule {
    /// Ask members of stale or overdue In Progress cards for an update.
    StatusCheck,
    /// Pull overdue Icebox cards into Next Up and clear their due date.
    RetrieveFromBacklog,
    /// Reopen and move Done cards that are archived or untouched today.
    PromoteDone,
    /// Move two-week-dormant Live cards into their quarter's archive list.
    ArchiveStaleLive,
}

impl TransitionRule {
    pub const ORDER: [Self; 4] = [
        Self::StatusCheck,
        Self::RetrieveFromBacklog,
        Self::PromoteDone,
        Self::ArchiveStaleLive,
    ];

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::StatusCheck => "status_check",
            Self::RetrieveFromBacklog => "retrieve_from_backlog",
            Self::PromoteDone => "promote_done",
            Self::ArchiveStaleLive => "archive_stale_live",
        }
    }

    /// Report line text.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::StatusCheck => "Asked for updates on stale In Progress cards.",
            Self::RetrieveFromBacklog => "Moved overdue Icebox cards to Next Up.",
            Self::PromoteDone => "Moved old Done cards to Live.",
            Self::ArchiveStaleLive => "Moved old Live cards to the archive board.",
        }
    }

    /// List whose cards this rule examines.
    pub fn source_list<'w>(&self, workspace: &'w Workspace) -> &'w str {
        match self {
            Self::StatusCheck => &workspace.in_progress,
            Self::RetrieveFromBacklog => &workspace.icebox,
            Self::PromoteDone => &workspace.done,
            Self::ArchiveStaleLive => &workspace.live_recent,
        }
    }

    /// Whether the rule should act on this card.
    pub fn matches(&self, card: &Card, clock: &CardClock) -> bool {
        match self {
            Self::StatusCheck => {
                !card.closed
                    && (self.check(card, clock.is_stale(card))
                        || self.check(card, clock.is_overdue(card)))
            }
            Self::RetrieveFromBacklog => {
                due_of(card).is_some() && self.check(card, clock.is_overdue(card))
            }
            Self::PromoteDone => {
                card.closed || self.check(card, clock.active_today(card).map(|today| !today))
            }
            Self::ArchiveStaleLive => self.check(card, clock.is_dormant_two_weeks(card)),
        }
    }

    /// A predicate that cannot be evaluated does not fire.
    fn check(&self, card: &Card, result: Result<bool, TimestampError>) -> bool {
        result.unwrap_or_else(|e| {
            warn!(rule = self.label(), card_id = %card.id, error = %e, "Skipping predicate");
            false
        })
    }

    /// Perform the rule's side effects on a matching card.
    pub async fn apply(&self, ctx: &mut RuleContext<'_>, card: &Card) -> Result<(), BoardError> {
        let service = ctx.service;
        match self {
            Self::StatusCheck => {
                ctx.notifier.notify(service, card, STATUS_REQUEST).await?;
            }
            Self::RetrieveFromBacklog => {
                // Notify first so the comment reflects the card before it moves.
                ctx.notifier.notify(service, card, READY_TO_WORK).await?;
                service
                    .move_card_to_list(&card.id, &ctx.workspace.next_up)
                    .await?;
                service.set_card_due(&card.id, None).await?;
            }
            Self::PromoteDone => {
                service.set_card_closed(&card.id, false).await?;
                service
                    .move_card_to_list(&card.id, &ctx.workspace.live_recent)
                    .await?;
            }
            Self::ArchiveStaleLive => {
                // Bucket by quarter of last activity, not of this run.
                let last_activity = ctx.clock.last_activity(card).ok();
                let list_id = ctx
                    .quarters
                    .resolve_for(service, last_activity, ctx.clock.now())
                    .await?;
                // A list id is only meaningful within its board.
                service
                    .move_card_to_board(&card.id, &ctx.workspace.archive_board)
                    .await?;
                service.move_card_to_list(&card.id, &list_id).await?;
            }
        }
        Ok(())
    }
}

/// Everything a rule action may touch.
pub struct RuleContext<'a> {
    pub service: &'a dyn BoardService,
    pub workspace: &'a Workspace,
    pub clock: CardClock,
    pub notifier: &'a mut Notifier,
    pub quarters: &'a mut QuarterBucketResolver,
}

/// Outcome of evaluating one rule over its source list.
#[derive(Debug)]
pub struct RulePass {
    pub affected: usize,
    /// The service error that stopped the pass, if any.
    pub error: Option<BoardError>,
}

/// Fetch the rule's source list, then act on each matching card in the order
/// the service reports them. The first service error ends the pass; cards
/// already handled stay handled.
pub async fn evaluate(rule: TransitionRule, ctx: &mut RuleContext<'_>) -> RulePass {
    let list_id = rule.source_list(ctx.workspace);
    let cards = match ctx.service.cards_in_list(list_id).await {
        Ok(cards) => cards,
        Err(e) => {
            return RulePass {
                affected: 0,
                error: Some(e),
            };
        }
    };
    debug!(rule = rule.label(), list_id, cards = cards.len(), "Evaluating rule");

    let clock = ctx.clock;
    let mut affected = 0;
    for card in cards.iter().filter(|c| rule.matches(c, &clock)) {
        if let Err(e) = rule.apply(ctx, card).await {
            return RulePass {
                affected,
                error: Some(e),
            };
        }
        info!(rule = rule.label(), card_id = %card.id, card = %card.name, "Rule applied");
        affected += 1;
    }

    RulePass {
        affected,
        error: None,
    }
}
