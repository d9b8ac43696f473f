//! Tiered access evaluation.
//!
//! Pure decision logic for subscription plans: daily usage limits, the
//! lifetime storage cap, and boolean feature gates. Nothing here touches the
//! database; the API layer loads the plan and counters and hands them in, so
//! every rule is testable without a Postgres instance. Unknown actions and
//! features fail closed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Megabytes per gigabyte when comparing stored bytes against plan caps.
pub const MB_PER_GB: f64 = 1024.0;

/// Sentinel meaning "no limit" in plan numeric fields.
pub const UNLIMITED: i64 = -1;

/// Subscription tiers, ordered from weakest to strongest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Basic,
    Premium,
    Enterprise,
}

impl Tier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Premium => "premium",
            Self::Enterprise => "enterprise",
        }
    }

    /// `true` when this tier grants at least what `required` demands.
    #[must_use]
    pub fn satisfies(self, required: Self) -> bool {
        self >= required
    }
}

impl FromStr for Tier {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(UnknownValue),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rate-limited actions tracked per user per day.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsageAction {
    Assessment,
    AiQuestion,
    FileUpload,
}

impl FromStr for UsageAction {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assessment" => Ok(Self::Assessment),
            "ai_question" => Ok(Self::AiQuestion),
            "file_upload" => Ok(Self::FileUpload),
            _ => Err(UnknownValue),
        }
    }
}

/// Boolean-gated plan features.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Feature {
    PremiumContent,
    Library,
    HighYield,
    DownloadPdfs,
    CustomAssessments,
}

impl FromStr for Feature {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "premium_content" => Ok(Self::PremiumContent),
            "library" => Ok(Self::Library),
            "high_yield" => Ok(Self::HighYield),
            "download_pdfs" => Ok(Self::DownloadPdfs),
            "custom_assessments" => Ok(Self::CustomAssessments),
            _ => Err(UnknownValue),
        }
    }
}

/// Marker error for values outside the fixed enumerations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UnknownValue;

/// Numeric limits and feature flags for one plan row.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanLimits {
    pub max_exams: i64,
    pub max_subjects_per_exam: i64,
    pub max_assessments_per_day: i64,
    pub ai_questions_per_day: i64,
    pub file_storage_gb: f64,
    pub max_files_per_exam: i64,
    pub premium_content: bool,
    pub library: bool,
    pub high_yield: bool,
    pub download_pdfs: bool,
    pub custom_assessments: bool,
}

impl PlanLimits {
    /// Looks up a boolean feature gate.
    #[must_use]
    pub const fn allows(&self, feature: Feature) -> bool {
        match feature {
            Feature::PremiumContent => self.premium_content,
            Feature::Library => self.library,
            Feature::HighYield => self.high_yield,
            Feature::DownloadPdfs => self.download_pdfs,
            Feature::CustomAssessments => self.custom_assessments,
        }
    }
}

/// One user's counters for a single day. A missing row reads as all zeros.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DailyCounters {
    pub assessments_taken: i64,
    pub ai_questions_generated: i64,
    pub files_uploaded: i64,
}

/// Outcome of a limit check: whether the action is allowed plus the counter
/// and limit that produced the verdict. Storage checks report fractional
/// gigabytes, so both fields are floats.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, ToSchema)]
pub struct LimitDecision {
    pub allowed: bool,
    pub current: f64,
    pub limit: f64,
}

impl LimitDecision {
    /// The fail-closed verdict returned for unrecognized actions.
    #[must_use]
    pub const fn denied() -> Self {
        Self {
            allowed: false,
            current: 0.0,
            limit: 0.0,
        }
    }
}

/// `true` when `current` leaves room under `limit` (`-1` is unlimited).
#[must_use]
pub const fn within_limit(limit: i64, current: i64) -> bool {
    limit == UNLIMITED || current < limit
}

/// Evaluates a daily-counter action against the plan.
///
/// `file_upload` is not a daily counter; use [`storage_decision`] for it.
#[must_use]
pub fn daily_decision(action: UsageAction, plan: &PlanLimits, usage: DailyCounters) -> LimitDecision {
    let (current, limit) = match action {
        UsageAction::Assessment => (usage.assessments_taken, plan.max_assessments_per_day),
        UsageAction::AiQuestion => (usage.ai_questions_generated, plan.ai_questions_per_day),
        UsageAction::FileUpload => return LimitDecision::denied(),
    };
    LimitDecision {
        allowed: within_limit(limit, current),
        current: current as f64,
        limit: limit as f64,
    }
}

/// Evaluates the lifetime storage cap: used megabytes converted to gigabytes
/// against the plan's GB limit.
#[must_use]
pub fn storage_decision(used_mb: f64, limit_gb: f64) -> LimitDecision {
    let used_gb = used_mb / MB_PER_GB;
    LimitDecision {
        allowed: limit_gb == UNLIMITED as f64 || used_gb < limit_gb,
        current: used_gb,
        limit: limit_gb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn free_plan() -> PlanLimits {
        PlanLimits {
            max_exams: 2,
            max_subjects_per_exam: 5,
            max_assessments_per_day: 2,
            ai_questions_per_day: 5,
            file_storage_gb: 0.5,
            max_files_per_exam: 10,
            premium_content: false,
            library: false,
            high_yield: false,
            download_pdfs: false,
            custom_assessments: false,
        }
    }

    #[test]
    fn tier_ordering() {
        assert!(Tier::Premium.satisfies(Tier::Basic));
        assert!(Tier::Basic.satisfies(Tier::Basic));
        assert!(!Tier::Free.satisfies(Tier::Premium));
        assert!(Tier::Enterprise.satisfies(Tier::Premium));
    }

    #[test]
    fn tier_parse_round_trip() {
        for tier in [Tier::Free, Tier::Basic, Tier::Premium, Tier::Enterprise] {
            assert_eq!(tier.as_str().parse::<Tier>(), Ok(tier));
        }
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn action_parse() {
        assert_eq!("assessment".parse::<UsageAction>(), Ok(UsageAction::Assessment));
        assert_eq!("ai_question".parse::<UsageAction>(), Ok(UsageAction::AiQuestion));
        assert_eq!("file_upload".parse::<UsageAction>(), Ok(UsageAction::FileUpload));
        assert!("teleport".parse::<UsageAction>().is_err());
    }

    #[test]
    fn within_limit_rules() {
        assert!(within_limit(UNLIMITED, 1_000_000));
        assert!(within_limit(5, 4));
        assert!(!within_limit(5, 5));
        assert!(!within_limit(0, 0));
    }

    #[test]
    fn unlimited_plan_always_allows() {
        let mut plan = free_plan();
        plan.max_assessments_per_day = UNLIMITED;
        let usage = DailyCounters {
            assessments_taken: 9999,
            ..DailyCounters::default()
        };
        let decision = daily_decision(UsageAction::Assessment, &plan, usage);
        assert!(decision.allowed);
        assert_eq!(decision.current, 9999.0);
        assert_eq!(decision.limit, -1.0);
    }

    #[test]
    fn limit_reached_denies() {
        let plan = free_plan();
        let usage = DailyCounters {
            assessments_taken: 2,
            ..DailyCounters::default()
        };
        let decision = daily_decision(UsageAction::Assessment, &plan, usage);
        assert!(!decision.allowed);
        assert_eq!(decision.current, 2.0);
        assert_eq!(decision.limit, 2.0);
    }

    #[test]
    fn missing_usage_row_reads_as_zero() {
        let plan = free_plan();
        let decision = daily_decision(UsageAction::Assessment, &plan, DailyCounters::default());
        assert!(decision.allowed);
        assert_eq!(decision.current, 0.0);
    }

    #[test]
    fn ai_question_uses_its_own_counter() {
        let plan = free_plan();
        let usage = DailyCounters {
            assessments_taken: 2,
            ai_questions_generated: 3,
            files_uploaded: 0,
        };
        let decision = daily_decision(UsageAction::AiQuestion, &plan, usage);
        assert!(decision.allowed);
        assert_eq!(decision.current, 3.0);
        assert_eq!(decision.limit, 5.0);
    }

    #[test]
    fn file_upload_is_not_a_daily_decision() {
        let plan = free_plan();
        let decision = daily_decision(UsageAction::FileUpload, &plan, DailyCounters::default());
        assert_eq!(decision, LimitDecision::denied());
    }

    #[test]
    fn storage_compares_in_gigabytes() {
        // 512 MB used of a 0.5 GB cap: exactly at the limit, so denied.
        let decision = storage_decision(512.0, 0.5);
        assert!(!decision.allowed);
        assert_eq!(decision.current, 0.5);

        let decision = storage_decision(256.0, 0.5);
        assert!(decision.allowed);
        assert_eq!(decision.current, 0.25);
    }

    #[test]
    fn storage_unlimited() {
        let decision = storage_decision(1024.0 * 1024.0, UNLIMITED as f64);
        assert!(decision.allowed);
    }

    #[test]
    fn feature_gates() {
        let mut plan = free_plan();
        assert!(!plan.allows(Feature::PremiumContent));
        plan.premium_content = true;
        plan.download_pdfs = true;
        assert!(plan.allows(Feature::PremiumContent));
        assert!(plan.allows(Feature::DownloadPdfs));
        assert!(!plan.allows(Feature::Library));
    }

    #[test]
    fn unknown_feature_name_is_rejected() {
        assert!("time_travel".parse::<Feature>().is_err());
    }

    #[test]
    fn denied_decision_shape() {
        let denied = LimitDecision::denied();
        assert!(!denied.allowed);
        assert_eq!(denied.current, 0.0);
        assert_eq!(denied.limit, 0.0);
    }
}
