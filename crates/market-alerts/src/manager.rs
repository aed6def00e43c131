//! Alert Manager
//!
//! One pass loads every active rule, evaluates each one independently
//! against fresh market data and fans triggered alerts out to their
//! channels. Recurring rules stay active and fire again on the next pass
//! while their condition holds; one-shot rules are deactivated.

use std::sync::Arc;

use assistant_core::{ActiveAlert, AlertStore};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::evaluate::evaluate_condition;
use crate::market::{fetch_snapshot, MarketDataSource};
use crate::model::AlertNotification;
use crate::notify::{DispatchReport, Notifier};

/// Totals for one alert pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    /// Active rules loaded
    pub checked: usize,
    pub triggered: usize,
    /// Channel deliveries that succeeded
    pub notifications_sent: usize,
    /// Channel deliveries that failed
    pub delivery_failures: usize,
    /// One-shot rules switched off
    pub deactivated: usize,
    /// Rules whose evaluation errored
    pub errors: usize,
    /// Subset of `errors` expected to clear on a later pass
    pub retryable: usize,
}

enum RuleOutcome {
    Quiet,
    Triggered {
        report: DispatchReport,
        deactivated: bool,
    },
}

/// Evaluates alert rules and dispatches notifications
pub struct AlertManager {
    store: Arc<dyn AlertStore>,
    market: Arc<dyn MarketDataSource>,
    notifier: Notifier,
    /// Held for the duration of a pass
    pass_lock: Mutex<()>,
}

impl AlertManager {
    pub fn new(
        store: Arc<dyn AlertStore>,
        market: Arc<dyn MarketDataSource>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            market,
            notifier,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Run one pass over all active rules
    ///
    /// Only a failure to load the rules fails the pass. Per-rule errors are
    /// logged and counted.
    pub async fn check_alerts(&self) -> Result<CheckSummary> {
        let _pass = self.pass_lock.lock().await;

        let alerts = self.store.list_active_alerts().await?;
        let mut summary = CheckSummary {
            checked: alerts.len(),
            ..Default::default()
        };

        for alert in &alerts {
            match self.check_rule(alert).await {
                Ok(RuleOutcome::Quiet) => {}
                Ok(RuleOutcome::Triggered { report, deactivated }) => {
                    summary.triggered += 1;
                    summary.notifications_sent += report.sent.len();
                    summary.delivery_failures += report.failed.len();
                    if deactivated {
                        summary.deactivated += 1;
                    }
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    tracing::error!(
                        rule_id = %alert.rule.id,
                        coin = %alert.rule.coin,
                        retryable,
                        error = %e,
                        "Error checking alert"
                    );
                    summary.errors += 1;
                    if retryable {
                        summary.retryable += 1;
                    }
                }
            }
        }

        tracing::info!(
            checked = summary.checked,
            triggered = summary.triggered,
            errors = summary.errors,
            retryable = summary.retryable,
            "Alert pass complete"
        );
        Ok(summary)
    }

    async fn check_rule(&self, alert: &ActiveAlert) -> Result<RuleOutcome> {
        let rule = &alert.rule;
        let client = self.market.client_for(alert.settings.as_ref())?;
        let snapshot = fetch_snapshot(client.as_ref(), &rule.coin, rule.condition.kind).await?;

        if !evaluate_condition(rule.condition.kind, &snapshot, rule.threshold) {
            return Ok(RuleOutcome::Quiet);
        }

        tracing::info!(
            rule_id = %rule.id,
            coin = %rule.coin,
            condition = %rule.condition,
            "Alert triggered"
        );
        let notification = AlertNotification::for_rule(rule, &snapshot);
        let report = self.notifier.dispatch(alert, &notification).await;

        let deactivated = if rule.condition.once {
            self.store.deactivate_alert(rule.id).await?
        } else {
            false
        };

        Ok(RuleOutcome::Triggered { report, deactivated })
    }
}
