//! Card lifecycle engine.
//!
//! A run resolves the workspace once, then applies the four transition rules
//! in a fixed order:
//! 1. status check on In Progress
//! 2. retrieve overdue cards from the Icebox
//! 3. promote finished Done cards to Live
//! 4. archive dormant Live cards into quarter lists
//!
//! Every board-service call is awaited before the next is issued.

pub mod classifier;
pub mod notify;
pub mod quarter;
pub mod report;
pub mod rules;
pub mod workspace;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::board::BoardService;
use crate::config::{StewardConfig, VisibilityPolicy};
use crate::error::Result;

pub use classifier::CardClock;
pub use notify::Notifier;
pub use quarter::{QuarterBucketResolver, QuarterLabel};
pub use report::{RuleOutcome, RunReport};
pub use rules::{RuleContext, RulePass, TransitionRule};
pub use workspace::{Workspace, WorkspaceResolver};

/// Drives the rules against a resolved workspace.
///
/// The member-name and quarter-list caches live for a single run, so each
/// run sees renames and archived lists made since the previous one.
pub struct Steward {
    service: Arc<dyn BoardService>,
    workspace: Workspace,
    offset: FixedOffset,
    admin_username: Option<String>,
    list_visibility: VisibilityPolicy,
}

impl Steward {
    /// Resolve board and list ids by name and build a steward.
    ///
    /// Fails before any rule runs if a board or list cannot be found.
    pub async fn connect(service: Arc<dyn BoardService>, config: &StewardConfig) -> Result<Self> {
        let workspace = WorkspaceResolver::new(service.as_ref(), &config.trello.member_id)
            .resolve(&config.names)
            .await?;
        Ok(Self::new(service, workspace, config))
    }

    pub fn new(
        service: Arc<dyn BoardService>,
        workspace: Workspace,
        config: &StewardConfig,
    ) -> Self {
        Self {
            service,
            workspace,
            offset: config.calendar_offset,
            admin_username: config.admin_username.clone(),
            list_visibility: config.list_visibility,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Apply every rule in order as of `now`.
    ///
    /// A rule that hits a service error stops at that card; its partial count
    /// and the error go into the report and the next rule still runs.
    pub async fn run(&self, now: DateTime<Utc>) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("steward_run", %run_id, %now);
        async {
            let mut notifier = self.notifier();
            let mut quarters = self.quarters();
            let mut report = RunReport::new();
            for rule in TransitionRule::ORDER {
                let pass = self.pass(rule, now, &mut notifier, &mut quarters).await;
                let error = pass.error.map(|e| {
                    error!(rule = rule.label(), affected = pass.affected, error = %e, "Rule aborted");
                    e.to_string()
                });
                info!(
                    rule = rule.label(),
                    affected = pass.affected,
                    "[{}] {}",
                    pass.affected,
                    rule.summary()
                );
                report.record(rule, pass.affected, error);
            }
            info!(total = report.total(), "[{}] Board steward finished.", report.total());
            report
        }
        .instrument(span)
        .await
    }

    /// Apply a single rule as of `now`, with caches of its own.
    pub async fn run_rule(&self, rule: TransitionRule, now: DateTime<Utc>) -> RulePass {
        self.pass(rule, now, &mut self.notifier(), &mut self.quarters())
            .await
    }

    async fn pass(
        &self,
        rule: TransitionRule,
        now: DateTime<Utc>,
        notifier: &mut Notifier,
        quarters: &mut QuarterBucketResolver,
    ) -> RulePass {
        let mut ctx = RuleContext {
            service: self.service.as_ref(),
            workspace: &self.workspace,
            clock: CardClock::new(now, self.offset),
            notifier,
            quarters,
        };
        rules::evaluate(rule, &mut ctx).await
    }

    fn notifier(&self) -> Notifier {
        Notifier::new(self.admin_username.clone())
    }

    fn quarters(&self) -> QuarterBucketResolver {
        QuarterBucketResolver::new(
            self.workspace.archive_board.clone(),
            self.offset,
            self.list_visibility,
        )
    }
}
