//! Repository layer for data access

pub mod campaigns;
pub mod consent;
pub mod conversations;
pub mod enrollments;
pub mod leads;

// Re-export repository traits and their database implementations
pub use campaigns::{CampaignCatalog, DbCampaignCatalog};
pub use consent::{ConsentRegistry, DbConsentRegistry};
pub use conversations::{ConversationLog, DbConversationLog};
pub use enrollments::{DbEnrollmentStore, EnrollmentStore};
pub use leads::{DbLeadDirectory, LeadDirectory};
