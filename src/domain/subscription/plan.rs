//! Subscription plans (read-only reference data).

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{PlanId, Timestamp};

/// Whether a plan is the free trial or a paid offering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Trial,
    Paid,
}

impl PlanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanKind::Trial => "trial",
            PlanKind::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trial" => Some(PlanKind::Trial),
            "paid" => Some(PlanKind::Paid),
            _ => None,
        }
    }
}

/// Billing cadence of a paid plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    Monthly,
    Yearly,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "monthly" => Some(BillingPeriod::Monthly),
            "yearly" => Some(BillingPeriod::Yearly),
            _ => None,
        }
    }

    /// LiqPay `subscribe_periodicity` value.
    pub fn periodicity(&self) -> &'static str {
        match self {
            BillingPeriod::Monthly => "month",
            BillingPeriod::Yearly => "year",
        }
    }

    /// End of one billing period starting at `from`.
    pub fn advance(&self, from: Timestamp) -> Timestamp {
        match self {
            BillingPeriod::Monthly => from.add_months(1),
            BillingPeriod::Yearly => from.add_years(1),
        }
    }
}

/// A purchasable (or trial) subscription plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    /// Stable external key, e.g. `std_monthly` or `ua_premium_yearly`.
    pub code: String,
    pub kind: PlanKind,
    pub billing_period: BillingPeriod,
    /// Price in minor currency units.
    pub price_minor: i64,
    pub old_price_minor: i64,
    pub currency: String,
    pub trial_available: bool,
    pub trial_period_days: Option<u32>,
    pub active: bool,
    /// Country the plan is offered in, when market-specific.
    pub market: Option<String>,
}

impl Plan {
    /// Active paid plan without a trial offer.
    pub fn paid(
        code: impl Into<String>,
        billing_period: BillingPeriod,
        price_minor: i64,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: PlanId::new(),
            code: code.into(),
            kind: PlanKind::Paid,
            billing_period,
            price_minor,
            old_price_minor: price_minor,
            currency: currency.into(),
            trial_available: false,
            trial_period_days: None,
            active: true,
            market: None,
        }
    }

    /// Active free trial plan of `days` days.
    pub fn trial(code: impl Into<String>, days: u32) -> Self {
        Self {
            kind: PlanKind::Trial,
            trial_available: true,
            trial_period_days: Some(days),
            ..Self::paid(code, BillingPeriod::Monthly, 0, "UAH")
        }
    }

    pub fn with_trial_days(mut self, days: u32) -> Self {
        self.trial_available = days > 0;
        self.trial_period_days = Some(days);
        self
    }

    pub fn is_trial(&self) -> bool {
        self.kind == PlanKind::Trial
    }

    /// Trial length to grant when the plan offers a trial.
    pub fn offered_trial_days(&self) -> Option<u32> {
        if self.trial_available {
            self.trial_period_days.filter(|days| *days > 0)
        } else {
            None
        }
    }

    /// Price rendered with two decimals, as LiqPay expects (`149.00`).
    pub fn formatted_price(&self) -> String {
        let sign = if self.price_minor < 0 { "-" } else { "" };
        let abs = self.price_minor.unsigned_abs();
        format!("{}{}.{:02}", sign, abs / 100, abs % 100)
    }

    /// Human readable name derived from the code: `std_monthly` -> `Std Monthly`.
    pub fn display_name(&self) -> String {
        self.code
            .to_lowercase()
            .split('_')
            .filter(|part| !part.trim().is_empty())
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
