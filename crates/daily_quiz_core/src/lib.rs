pub mod api;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod flow;
pub mod normalize;
pub mod notifications;
pub mod onboarding;
pub mod ports;
pub mod profile;
pub mod results;
pub mod retry;
pub mod scheduling;
pub mod session;
pub mod submission;
pub mod unread;

#[cfg(test)]
mod test_support;

pub use api::ApiClient;
pub use domain::{
    AuthSession, CatalogEntry, DailyQuestion, NotificationItem, Profile, QuizResult, RankingEntry,
    ScoreDistribution, TodayResults,
};
pub use error::{ClientError, ClientResult};
pub use flow::{FlowNotice, FlowPhase, QuizFlow};
pub use notifications::{NotificationFeed, NotificationFilter};
pub use ports::{
    AccountAdminService, ApiRequest, ApiResponse, AuthProvider, HttpMethod, HttpTransport,
    PortError, PortResult,
};
pub use profile::{ProfileGate, ProfileResolver};
pub use unread::UnreadCounter;
