//! Database models

use chrono::{DateTime, Duration, Utc};
use driprust_common::types::{
    CampaignId, CampaignStepId, Direction, EnrollmentId, EnrollmentStatus, LeadId, LeadSource,
    MessageId, TenantId,
};
use driprust_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;

/// Lead model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub tenant_id: TenantId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub source: String,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Get acquisition source enum
    pub fn source_enum(&self) -> Option<LeadSource> {
        self.source.parse().ok()
    }
}

/// Drip campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DripCampaign {
    pub id: CampaignId,
    pub tenant_id: TenantId,
    pub name: String,
    pub category: String,
    pub enabled: bool,
    pub from_number: String,
    pub first_step_delay_minutes: i32,
    pub response_templates: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DripCampaign {
    /// Parse and validate the per-category response rules.
    ///
    /// The stored blob is a JSON object keyed by category name. Validation
    /// happens here, when the catalog loads a campaign definition, so a
    /// malformed blob surfaces as a configuration error rather than a
    /// dispatch-time surprise.
    pub fn response_rules(&self) -> Result<BTreeMap<String, ResponseRule>> {
        if self.response_templates.is_null() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_value(self.response_templates.clone()).map_err(|e| {
            Error::Validation(format!(
                "Campaign {} has malformed response templates: {}",
                self.id, e
            ))
        })
    }
}

/// What the engine does with a reply in a given category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseAction {
    /// Send the scripted reply (if any) and pause for a resume-check
    #[default]
    #[serde(rename = "none")]
    None,
    /// End the sequence; the lead is not interested
    #[serde(rename = "terminate-not-interested")]
    Terminate,
    /// Send the final asset (registration link) and complete
    #[serde(rename = "send-final-asset")]
    SendAsset,
}

/// A single category's configured response behavior
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseRule {
    /// Scripted reply template; absent means the general assistant answers
    #[serde(default)]
    pub reply_template: Option<String>,

    /// Action taken on classification into this category
    #[serde(default)]
    pub action: ResponseAction,
}

/// Campaign step model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignStep {
    pub id: CampaignStepId,
    pub campaign_id: CampaignId,
    pub step_number: i32,
    pub delay_minutes: i32,
    pub message_template: String,
    pub requires_availability_check: bool,
    pub fallback_template: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CampaignStep {
    /// Delay since the previous step
    pub fn delay(&self) -> Duration {
        Duration::minutes(self.delay_minutes as i64)
    }
}

/// A campaign with its ordered steps and validated response rules.
///
/// This is what the catalog hands the engine; the raw rows never leave
/// the storage layer unvalidated.
#[derive(Debug, Clone)]
pub struct CampaignDefinition {
    pub campaign: DripCampaign,
    pub steps: Vec<CampaignStep>,
    pub response_rules: BTreeMap<String, ResponseRule>,
}

impl CampaignDefinition {
    /// Look up a step by its 1-based number
    pub fn step(&self, step_number: i32) -> Option<&CampaignStep> {
        self.steps.iter().find(|s| s.step_number == step_number)
    }

    /// Highest defined step number (0 for an empty campaign)
    pub fn max_step(&self) -> i32 {
        self.steps.iter().map(|s| s.step_number).max().unwrap_or(0)
    }

    /// Delay before the first step; overrides step 1's own delay
    pub fn first_step_delay(&self) -> Duration {
        Duration::minutes(self.campaign.first_step_delay_minutes as i64)
    }

    /// Delay to apply before the given step number
    pub fn delay_for_step(&self, step_number: i32) -> Option<Duration> {
        if step_number == 1 {
            Some(self.first_step_delay())
        } else {
            self.step(step_number).map(|s| s.delay())
        }
    }

    /// Configured response rule for a category
    pub fn rule(&self, category: &str) -> Option<&ResponseRule> {
        self.response_rules.get(category)
    }

    /// Category names the classifier should choose between, sorted
    pub fn categories(&self) -> Vec<String> {
        self.response_rules.keys().cloned().collect()
    }
}

/// Enrollment model - one lead's progress through one campaign
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub tenant_id: TenantId,
    pub campaign_id: CampaignId,
    pub lead_id: LeadId,
    pub status: String,
    pub current_step: i32,
    pub pending_schedule_handle: Option<String>,
    pub next_step_at: Option<DateTime<Utc>>,
    pub context: serde_json::Value,
    pub last_response_category: Option<String>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Enrollment {
    /// Get status enum
    pub fn status_enum(&self) -> Option<EnrollmentStatus> {
        self.status.parse().ok()
    }

    /// Template variables captured at enrollment time.
    ///
    /// Non-string JSON values are stringified so templates can still
    /// reference them.
    pub fn context_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        if let Some(object) = self.context.as_object() {
            for (key, value) in object {
                let rendered = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => value.to_string(),
                };
                vars.insert(key.clone(), rendered);
            }
        }
        vars
    }
}

/// Create enrollment input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEnrollment {
    pub tenant_id: TenantId,
    pub campaign_id: CampaignId,
    pub lead_id: LeadId,
    pub context: BTreeMap<String, String>,
}

/// Conversation message model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: MessageId,
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub channel: String,
    pub direction: String,
    pub body: String,
    pub provider_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create conversation message input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationMessage {
    pub tenant_id: TenantId,
    pub lead_id: LeadId,
    pub channel: String,
    pub direction: Direction,
    pub body: String,
    pub provider_message_id: Option<String>,
}

/// Opt-in registry entry
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OptIn {
    pub id: uuid::Uuid,
    pub tenant_id: TenantId,
    pub phone: String,
    pub method: String,
    pub opted_in_at: DateTime<Utc>,
}

/// Do-not-contact registry entry
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DncEntry {
    pub id: uuid::Uuid,
    pub tenant_id: TenantId,
    pub phone: String,
    pub reason: Option<String>,
    pub added_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn campaign_with_templates(templates: serde_json::Value) -> DripCampaign {
        DripCampaign {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            name: "Kids intro".to_string(),
            category: "kids".to_string(),
            enabled: true,
            from_number: "+15550001111".to_string(),
            first_step_delay_minutes: 10,
            response_templates: templates,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn step(campaign_id: CampaignId, number: i32, delay: i32) -> CampaignStep {
        CampaignStep {
            id: uuid::Uuid::new_v4(),
            campaign_id,
            step_number: number,
            delay_minutes: delay,
            message_template: format!("step {}", number),
            requires_availability_check: false,
            fallback_template: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_response_rules_parse() {
        let campaign = campaign_with_templates(serde_json::json!({
            "price": { "reply_template": "Lessons are $35 per week." },
            "not_interested": { "action": "terminate-not-interested" },
            "register": {
                "reply_template": "Here you go: {{registration_url}}",
                "action": "send-final-asset"
            }
        }));

        let rules = campaign.response_rules().unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules["price"].action, ResponseAction::None);
        assert_eq!(rules["not_interested"].action, ResponseAction::Terminate);
        assert!(rules["not_interested"].reply_template.is_none());
        assert_eq!(rules["register"].action, ResponseAction::SendAsset);
    }

    #[test]
    fn test_response_rules_malformed() {
        let campaign = campaign_with_templates(serde_json::json!({
            "price": { "action": "explode" }
        }));
        assert!(campaign.response_rules().is_err());

        let list = campaign_with_templates(serde_json::json!(["not", "an", "object"]));
        assert!(list.response_rules().is_err());
    }

    #[test]
    fn test_response_rules_null_blob() {
        let campaign = campaign_with_templates(serde_json::Value::Null);
        assert!(campaign.response_rules().unwrap().is_empty());
    }

    #[test]
    fn test_campaign_definition_steps() {
        let campaign = campaign_with_templates(serde_json::json!({}));
        let id = campaign.id;
        let definition = CampaignDefinition {
            steps: vec![step(id, 1, 0), step(id, 2, 1440)],
            response_rules: BTreeMap::new(),
            campaign,
        };

        assert_eq!(definition.max_step(), 2);
        assert!(definition.step(3).is_none());
        // Step 1's delay comes from the campaign, not the step row.
        assert_eq!(definition.delay_for_step(1), Some(Duration::minutes(10)));
        assert_eq!(definition.delay_for_step(2), Some(Duration::minutes(1440)));
        assert_eq!(definition.delay_for_step(3), None);
    }

    #[test]
    fn test_enrollment_context_vars() {
        let enrollment = Enrollment {
            id: uuid::Uuid::new_v4(),
            tenant_id: uuid::Uuid::new_v4(),
            campaign_id: uuid::Uuid::new_v4(),
            lead_id: uuid::Uuid::new_v4(),
            status: "active".to_string(),
            current_step: 0,
            pending_schedule_handle: None,
            next_step_at: None,
            context: serde_json::json!({"first_name": "Ava", "age": 7, "trial": true}),
            last_response_category: None,
            cancel_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let vars = enrollment.context_vars();
        assert_eq!(vars["first_name"], "Ava");
        assert_eq!(vars["age"], "7");
        assert_eq!(vars["trial"], "true");
        assert_eq!(enrollment.status_enum(), Some(EnrollmentStatus::Active));
    }
}
