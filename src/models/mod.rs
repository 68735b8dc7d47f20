pub mod automation;
pub mod loaders;
pub mod post_record;
pub mod profile;
pub mod report;

pub use automation::{AutomationConfig, ProductConfig};
pub use loaders::{load_automation_config, load_product_config, load_profiles};
pub use post_record::{parse_post_url, Angle, Performance, PostRecord, PostStatus};
pub use profile::{community_key, prefixed_community, ActivityTier, CommunityProfile};
pub use report::{DailyRunReport, OutcomeStatus, RunSummary, TargetOutcome};
