//! Template Renderer - message personalization and registration links

use driprust_common::types::{CampaignId, LeadId};
use regex::Regex;
use std::collections::BTreeMap;

/// Renders outbound message text from `{{var}}` templates.
///
/// Missing variables render as empty substitutions, never an error; a
/// message that comes out empty is the caller's problem to report.
pub struct TemplateRenderer {
    /// Base URL for registration links
    registration_base_url: String,
}

impl TemplateRenderer {
    /// Create a new template renderer
    pub fn new(registration_base_url: String) -> Self {
        Self {
            registration_base_url,
        }
    }

    /// Render a template with the given variables
    pub fn render(&self, template: &str, vars: &BTreeMap<String, String>) -> String {
        let mut result = template.to_string();

        for (key, value) in vars {
            let placeholder = format!("{{{{{}}}}}", key);
            result = result.replace(&placeholder, value);
        }

        self.remove_unused_placeholders(&result)
    }

    /// Build the registration URL for a lead's final-asset message
    pub fn registration_url(&self, lead_id: LeadId, campaign_id: CampaignId) -> String {
        let token = self.generate_registration_token(lead_id, campaign_id);
        format!("{}/{}", self.registration_base_url, token)
    }

    /// Generate a signed registration token for a lead
    fn generate_registration_token(&self, lead_id: LeadId, campaign_id: CampaignId) -> String {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        use sha2::{Digest, Sha256};

        let payload = format!("{}:{}", lead_id, campaign_id);

        let mut hasher = Sha256::new();
        hasher.update(&payload);
        let hash = hasher.finalize();
        let hash_prefix = &hash[..8];

        let token_data = format!("{}:{}", payload, hex::encode(hash_prefix));
        URL_SAFE_NO_PAD.encode(token_data.as_bytes())
    }

    /// Parse a registration token back into its lead and campaign ids.
    ///
    /// Returns `None` for malformed or tampered tokens.
    pub fn parse_registration_token(&self, token: &str) -> Option<(LeadId, CampaignId)> {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        use sha2::{Digest, Sha256};

        let decoded = URL_SAFE_NO_PAD.decode(token).ok()?;
        let token_data = String::from_utf8(decoded).ok()?;

        let parts: Vec<&str> = token_data.rsplitn(2, ':').collect();
        if parts.len() != 2 {
            return None;
        }

        let payload = parts[1];
        let hash_hex = parts[0];

        let mut hasher = Sha256::new();
        hasher.update(payload);
        let hash = hasher.finalize();
        if hex::encode(&hash[..8]) != hash_hex {
            return None;
        }

        let (lead_str, campaign_str) = payload.split_once(':')?;
        let lead_id = uuid::Uuid::parse_str(lead_str).ok()?;
        let campaign_id = uuid::Uuid::parse_str(campaign_str).ok()?;
        Some((lead_id, campaign_id))
    }

    /// Remove unused placeholder variables
    fn remove_unused_placeholders(&self, content: &str) -> String {
        let re = Regex::new(r"\{\{[^}]+\}\}").unwrap();
        re.replace_all(content, "").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn renderer() -> TemplateRenderer {
        TemplateRenderer::new("https://app.example.com/register".to_string())
    }

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_basic_template() {
        let result = renderer().render(
            "Hi {{first_name}}! Ready for {{category}} lessons?",
            &vars(&[("first_name", "Ava"), ("category", "kids")]),
        );

        assert_eq!(result, "Hi Ava! Ready for kids lessons?");
    }

    #[test]
    fn test_render_removes_unused() {
        let result = renderer().render(
            "Hello {{first_name}}, {{unknown_var}} see you soon",
            &vars(&[("first_name", "Ava")]),
        );

        assert_eq!(result, "Hello Ava,  see you soon");
    }

    #[test]
    fn test_render_missing_everything_is_empty() {
        let result = renderer().render("{{a}}{{b}}", &BTreeMap::new());
        assert_eq!(result, "");
    }

    #[test]
    fn test_registration_token_roundtrip() {
        let r = renderer();
        let lead_id = uuid::Uuid::new_v4();
        let campaign_id = uuid::Uuid::new_v4();

        let url = r.registration_url(lead_id, campaign_id);
        let token = url.rsplit('/').next().unwrap();

        let (parsed_lead, parsed_campaign) = r.parse_registration_token(token).unwrap();
        assert_eq!(parsed_lead, lead_id);
        assert_eq!(parsed_campaign, campaign_id);
    }

    #[test]
    fn test_registration_token_rejects_tampering() {
        let r = renderer();
        assert!(r.parse_registration_token("not-base64!").is_none());

        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
        let forged = URL_SAFE_NO_PAD.encode(format!(
            "{}:{}:deadbeefdeadbeef",
            uuid::Uuid::new_v4(),
            uuid::Uuid::new_v4()
        ));
        assert!(r.parse_registration_token(&forged).is_none());
    }
}
