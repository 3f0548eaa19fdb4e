//! Drip Campaign Engine - enrollment, step advancement, response handling
//!
//! The engine is the sole mutator of enrollment state. Entry points the
//! external scheduler can invoke (`advance_step`, `resume_if_still_responded`,
//! both reachable through `handle_task`) are idempotent against
//! at-least-once redelivery: a missing, terminal, or not-yet-due
//! enrollment is a `Skipped` no-op, and every state write is a guarded
//! compare-and-swap in the store.

use super::availability::AvailabilityChecker;
use super::classify::{FreeTextClassifier, ResponseClassifier};
use super::quiet_hours::QuietHours;
use super::scheduler::{DripTask, TaskScheduler};
use super::sender::{MessageSender, SendError};
use super::template::TemplateRenderer;
use chrono::{DateTime, Duration, Utc};
use driprust_common::config::DripConfig;
use driprust_common::types::{
    CancelReason, Direction, EnrollmentId, EnrollmentStatus, LeadId, PhoneNumber, TenantId,
};
use driprust_storage::models::{
    CampaignDefinition, CampaignStep, CreateConversationMessage, CreateEnrollment, Enrollment,
    Lead, ResponseAction,
};
use driprust_storage::repository::{
    CampaignCatalog, ConsentRegistry, ConversationLog, EnrollmentStore, LeadDirectory,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Channel name recorded on conversation messages
pub const SMS_CHANNEL: &str = "sms";

/// Category key treated as negative even without an explicit action tag
const NEGATIVE_CATEGORY: &str = "not_interested";

/// Redelivery arriving this close to the recorded due time still counts
/// as due; anything earlier is a duplicate and skips.
const EARLY_DELIVERY_GRACE_SECS: i64 = 60;

/// Drip engine errors
#[derive(Error, Debug)]
pub enum DripError {
    #[error("Storage error: {0}")]
    Store(#[from] driprust_common::Error),

    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    /// Operator-visible rendering failure; state is untouched so the
    /// step can be retried manually
    #[error("Step {step} rendered an empty message")]
    EmptyMessage { step: i32 },
}

/// Outcome of a step-advance or resume invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Idempotent no-op: missing, terminal, not due, or lost a race
    Skipped,
    /// Step sent and advanced; more steps remain
    Advanced { step: i32 },
    /// Sequence finished (final step sent, or no step defined)
    Completed,
    /// Quiet hours; the same step was re-submitted without advancing
    Deferred { resume_in: Duration },
    /// A guard failed and the enrollment was cancelled
    Cancelled { reason: CancelReason },
}

/// Outcome of inbound-response handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseOutcome {
    /// Whether the engine answered; `true` suppresses the generic
    /// conversational handler for this turn
    pub handled: bool,
    /// Classified category, when a live enrollment was found
    pub category: Option<String>,
    /// Scripted reply text, when one was sent
    pub reply: Option<String>,
}

impl ResponseOutcome {
    fn unhandled() -> Self {
        Self {
            handled: false,
            category: None,
            reply: None,
        }
    }

    fn with_category(handled: bool, category: String, reply: Option<String>) -> Self {
        Self {
            handled,
            category: Some(category),
            reply,
        }
    }
}

/// Drip Campaign Engine
pub struct DripEngine {
    enrollments: Arc<dyn EnrollmentStore>,
    catalog: Arc<dyn CampaignCatalog>,
    leads: Arc<dyn LeadDirectory>,
    consent: Arc<dyn ConsentRegistry>,
    conversations: Arc<dyn ConversationLog>,
    scheduler: Arc<dyn TaskScheduler>,
    sender: Arc<dyn MessageSender>,
    classifier: ResponseClassifier,
    renderer: TemplateRenderer,
    quiet_hours: QuietHours,
    availability: Option<Arc<dyn AvailabilityChecker>>,
    resume_check_delay: Duration,
}

impl DripEngine {
    /// Create a new drip engine
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        enrollments: Arc<dyn EnrollmentStore>,
        catalog: Arc<dyn CampaignCatalog>,
        leads: Arc<dyn LeadDirectory>,
        consent: Arc<dyn ConsentRegistry>,
        conversations: Arc<dyn ConversationLog>,
        scheduler: Arc<dyn TaskScheduler>,
        sender: Arc<dyn MessageSender>,
        config: &DripConfig,
    ) -> Self {
        Self {
            enrollments,
            catalog,
            leads,
            consent,
            conversations,
            scheduler,
            sender,
            classifier: ResponseClassifier::new(),
            renderer: TemplateRenderer::new(config.registration_base_url.clone()),
            quiet_hours: QuietHours::new(config.quiet_hours.clone()),
            availability: None,
            resume_check_delay: Duration::minutes(config.resume_check_minutes),
        }
    }

    /// Replace the quiet-hours calculator (tenant overrides)
    pub fn with_quiet_hours(mut self, quiet_hours: QuietHours) -> Self {
        self.quiet_hours = quiet_hours;
        self
    }

    /// Attach a free-text classifier consulted on keyword miss
    pub fn with_classifier_fallback(mut self, fallback: Arc<dyn FreeTextClassifier>) -> Self {
        self.classifier = ResponseClassifier::new().with_fallback(fallback);
        self
    }

    /// Attach an availability checker for steps that advertise open slots
    pub fn with_availability(mut self, availability: Arc<dyn AvailabilityChecker>) -> Self {
        self.availability = Some(availability);
        self
    }

    /// Dispatch a scheduled task to the matching entry point
    pub async fn handle_task(&self, task: DripTask) -> Result<AdvanceOutcome, DripError> {
        match task {
            DripTask::AdvanceStep { enrollment_id, .. } => self.advance_step(enrollment_id).await,
            DripTask::ResumeCheck { enrollment_id, .. } => {
                self.resume_if_still_responded(enrollment_id).await
            }
        }
    }

    /// Enroll a lead into the enabled campaign for a category.
    ///
    /// Every failed precondition is a silent no-op returning `None`:
    /// no enabled campaign with steps, an existing live enrollment, or a
    /// lead without a contactable phone.
    pub async fn enroll(
        &self,
        tenant_id: TenantId,
        lead_id: LeadId,
        category: &str,
        context: BTreeMap<String, String>,
    ) -> Result<Option<Enrollment>, DripError> {
        let Some(definition) = self.catalog.find_enabled(tenant_id, category).await? else {
            debug!(%tenant_id, category, "No enabled campaign for category, skipping enrollment");
            return Ok(None);
        };

        if let Some(existing) = self.enrollments.find_live_by_lead(tenant_id, lead_id).await? {
            debug!(
                %tenant_id, %lead_id, enrollment_id = %existing.id,
                "Lead already has a live enrollment, skipping"
            );
            return Ok(None);
        }

        let Some(lead) = self.leads.get(tenant_id, lead_id).await? else {
            debug!(%tenant_id, %lead_id, "Lead not found, skipping enrollment");
            return Ok(None);
        };
        if contact_phone(&lead).is_none() {
            debug!(%tenant_id, %lead_id, "Lead has no contactable phone, skipping enrollment");
            return Ok(None);
        }

        let Some(enrollment) = self
            .enrollments
            .create(CreateEnrollment {
                tenant_id,
                campaign_id: definition.campaign.id,
                lead_id,
                context,
            })
            .await?
        else {
            debug!(%tenant_id, %lead_id, "Live enrollment appeared concurrently, skipping");
            return Ok(None);
        };

        info!(
            enrollment_id = %enrollment.id,
            campaign_id = %definition.campaign.id,
            %lead_id,
            "Lead enrolled in drip campaign"
        );

        // Row creation and schedule submission are not atomic across a
        // crash; advance_step tolerates redelivery and early invocation,
        // which is what makes the gap survivable.
        self.submit_advance(&enrollment, definition.first_step_delay())
            .await?;

        Ok(Some(self.enrollments.get(enrollment.id).await?.unwrap_or(enrollment)))
    }

    /// Advance an enrollment to its next step. Invoked by the scheduler;
    /// safe to invoke more than once for the same logical step.
    pub async fn advance_step(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<AdvanceOutcome, DripError> {
        let Some(enrollment) = self.enrollments.get(enrollment_id).await? else {
            debug!(%enrollment_id, "Enrollment not found, skipping");
            return Ok(AdvanceOutcome::Skipped);
        };

        if enrollment.status_enum() != Some(EnrollmentStatus::Active) {
            debug!(%enrollment_id, status = %enrollment.status, "Enrollment not active, skipping");
            return Ok(AdvanceOutcome::Skipped);
        }

        let now = Utc::now();
        if let Some(next_at) = enrollment.next_step_at {
            if next_at - now > Duration::seconds(EARLY_DELIVERY_GRACE_SECS) {
                debug!(%enrollment_id, %next_at, "Step not due yet, skipping duplicate delivery");
                return Ok(AdvanceOutcome::Skipped);
            }
        }

        let Some(definition) = self.catalog.get(enrollment.campaign_id).await? else {
            warn!(
                %enrollment_id, campaign_id = %enrollment.campaign_id,
                "Campaign missing for live enrollment, skipping"
            );
            return Ok(AdvanceOutcome::Skipped);
        };

        let target_step = enrollment.current_step + 1;
        let Some(step) = definition.step(target_step) else {
            if self.enrollments.complete(enrollment.id, None).await? {
                info!(%enrollment_id, "No further steps defined, sequence completed");
            }
            return Ok(AdvanceOutcome::Completed);
        };

        let Some(lead) = self.leads.get(enrollment.tenant_id, enrollment.lead_id).await? else {
            return self.cancel_enrollment(&enrollment, CancelReason::NoPhone).await;
        };
        let Some(phone) = contact_phone(&lead) else {
            return self.cancel_enrollment(&enrollment, CancelReason::NoPhone).await;
        };

        // Quiet hours consume the scheduled slot without advancing: the
        // same step is re-submitted for when the window reopens.
        if let Some(wait) = self.quiet_hours.until_open(enrollment.tenant_id, now) {
            let task = DripTask::AdvanceStep {
                tenant_id: enrollment.tenant_id,
                enrollment_id: enrollment.id,
            };
            let (handle, next_at) = self.submit_task(task, wait).await;
            self.enrollments
                .set_schedule(enrollment.id, handle.as_deref(), next_at)
                .await?;
            info!(
                %enrollment_id,
                wait_secs = wait.num_seconds(),
                "Inside quiet hours, step deferred"
            );
            return Ok(AdvanceOutcome::Deferred { resume_in: wait });
        }

        if self.consent.is_dnc(enrollment.tenant_id, phone.as_str()).await? {
            return self.cancel_enrollment(&enrollment, CancelReason::Dnc).await;
        }

        if !self
            .consent
            .is_opted_in(enrollment.tenant_id, phone.as_str())
            .await?
        {
            match lead.source_enum() {
                Some(source) if source.implies_consent() => {
                    let method = format!("implied:{}", source);
                    self.consent
                        .record_opt_in(enrollment.tenant_id, phone.as_str(), &method)
                        .await?;
                    info!(%enrollment_id, %method, "Recorded implied-consent opt-in");
                }
                _ => {
                    return self
                        .cancel_enrollment(&enrollment, CancelReason::NotOptedIn)
                        .await;
                }
            }
        }

        let body = self.render_step(&definition, step, &enrollment, &lead).await;
        if body.trim().is_empty() {
            error!(%enrollment_id, step = target_step, "Step rendered an empty message");
            return Err(DripError::EmptyMessage { step: target_step });
        }

        // A send failure propagates with state untouched; the next
        // delivery of this task retries the same step.
        let receipt = self
            .sender
            .send(phone.as_str(), &definition.campaign.from_number, &body)
            .await?;

        self.conversations
            .append(CreateConversationMessage {
                tenant_id: enrollment.tenant_id,
                lead_id: enrollment.lead_id,
                channel: SMS_CHANNEL.to_string(),
                direction: Direction::Outbound,
                body: body.clone(),
                provider_message_id: Some(receipt.provider_id),
            })
            .await?;

        match definition.delay_for_step(target_step + 1) {
            Some(delay) => {
                let task = DripTask::AdvanceStep {
                    tenant_id: enrollment.tenant_id,
                    enrollment_id: enrollment.id,
                };
                let (handle, next_at) = self.submit_task(task, delay).await;
                let advanced = self
                    .enrollments
                    .record_advance(
                        enrollment.id,
                        enrollment.current_step,
                        target_step,
                        handle.as_deref(),
                        next_at,
                    )
                    .await?;
                if !advanced {
                    warn!(%enrollment_id, "Lost step-advance race after send");
                    return Ok(AdvanceOutcome::Skipped);
                }
                info!(%enrollment_id, step = target_step, "Drip step sent");
                Ok(AdvanceOutcome::Advanced { step: target_step })
            }
            None => {
                let completed = self
                    .enrollments
                    .complete_final_step(enrollment.id, enrollment.current_step, target_step)
                    .await?;
                if !completed {
                    warn!(%enrollment_id, "Lost final-step race after send");
                    return Ok(AdvanceOutcome::Skipped);
                }
                info!(%enrollment_id, step = target_step, "Final drip step sent, sequence completed");
                Ok(AdvanceOutcome::Completed)
            }
        }
    }

    /// Handle an inbound reply from a lead, ahead of generic
    /// conversational handling. `handled = true` means the engine
    /// answered and the generic handler must stay silent this turn.
    pub async fn handle_response(
        &self,
        tenant_id: TenantId,
        lead_id: LeadId,
        message_text: &str,
    ) -> Result<ResponseOutcome, DripError> {
        let Some(enrollment) = self.enrollments.find_live_by_lead(tenant_id, lead_id).await? else {
            return Ok(ResponseOutcome::unhandled());
        };

        let Some(definition) = self.catalog.get(enrollment.campaign_id).await? else {
            debug!(enrollment_id = %enrollment.id, "Campaign missing, reply left to the assistant");
            return Ok(ResponseOutcome::unhandled());
        };
        if definition.response_rules.is_empty() {
            return Ok(ResponseOutcome::unhandled());
        }

        let categories = definition.categories();
        let category = self.classifier.classify(message_text, &categories).await;
        debug!(enrollment_id = %enrollment.id, %category, "Classified inbound reply");

        let Some(rule) = definition.rule(&category).cloned() else {
            // Unconfigured category (or the "other" sentinel): remember it,
            // leave the drip schedule untouched, let the assistant answer.
            self.enrollments
                .record_response_category(enrollment.id, &category)
                .await?;
            return Ok(ResponseOutcome::with_category(false, category, None));
        };

        if rule.action == ResponseAction::Terminate || category == NEGATIVE_CATEGORY {
            self.enrollments
                .record_response_category(enrollment.id, &category)
                .await?;
            if self
                .enrollments
                .cancel(enrollment.id, CancelReason::NotInterested)
                .await?
            {
                info!(enrollment_id = %enrollment.id, "Lead not interested, drip cancelled");
            }
            // Unhandled on purpose: the assistant composes the goodbye.
            return Ok(ResponseOutcome::with_category(false, category, None));
        }

        if rule.action == ResponseAction::SendAsset {
            let Some((lead, phone)) = self.contactable_lead(tenant_id, lead_id).await? else {
                self.enrollments
                    .cancel(enrollment.id, CancelReason::NoPhone)
                    .await?;
                return Ok(ResponseOutcome::with_category(false, category, None));
            };

            let template = rule
                .reply_template
                .as_deref()
                .unwrap_or("{{registration_url}}");
            let vars = self.message_vars(&enrollment, &lead);
            let body = self.renderer.render(template, &vars);

            let receipt = self
                .sender
                .send(phone.as_str(), &definition.campaign.from_number, &body)
                .await?;
            self.conversations
                .append(CreateConversationMessage {
                    tenant_id,
                    lead_id,
                    channel: SMS_CHANNEL.to_string(),
                    direction: Direction::Outbound,
                    body: body.clone(),
                    provider_message_id: Some(receipt.provider_id),
                })
                .await?;

            self.enrollments
                .complete(enrollment.id, Some(&category))
                .await?;
            info!(enrollment_id = %enrollment.id, "Final asset sent, sequence completed");
            return Ok(ResponseOutcome::with_category(true, category, Some(body)));
        }

        match rule.reply_template {
            Some(template) => {
                let Some((lead, phone)) = self.contactable_lead(tenant_id, lead_id).await? else {
                    self.enrollments
                        .cancel(enrollment.id, CancelReason::NoPhone)
                        .await?;
                    return Ok(ResponseOutcome::with_category(false, category, None));
                };

                let vars = self.message_vars(&enrollment, &lead);
                let body = self.renderer.render(&template, &vars);

                let receipt = self
                    .sender
                    .send(phone.as_str(), &definition.campaign.from_number, &body)
                    .await?;
                self.conversations
                    .append(CreateConversationMessage {
                        tenant_id,
                        lead_id,
                        channel: SMS_CHANNEL.to_string(),
                        direction: Direction::Outbound,
                        body: body.clone(),
                        provider_message_id: Some(receipt.provider_id),
                    })
                    .await?;

                let (handle, resume_at) = self.schedule_resume_check(&enrollment).await;
                self.enrollments
                    .mark_responded(enrollment.id, &category, handle.as_deref(), resume_at)
                    .await?;
                info!(
                    enrollment_id = %enrollment.id,
                    %category,
                    "Scripted reply sent, awaiting further response"
                );
                Ok(ResponseOutcome::with_category(true, category, Some(body)))
            }
            None => {
                // Known category without a script: pause for a
                // resume-check but let the assistant answer this turn.
                let (handle, resume_at) = self.schedule_resume_check(&enrollment).await;
                self.enrollments
                    .mark_responded(enrollment.id, &category, handle.as_deref(), resume_at)
                    .await?;
                Ok(ResponseOutcome::with_category(false, category, None))
            }
        }
    }

    /// Resume a responded enrollment that received no further reply.
    /// Invoked by the scheduled resume-check; a no-op in any other state.
    pub async fn resume_if_still_responded(
        &self,
        enrollment_id: EnrollmentId,
    ) -> Result<AdvanceOutcome, DripError> {
        let Some(enrollment) = self.enrollments.get(enrollment_id).await? else {
            debug!(%enrollment_id, "Enrollment not found, skipping resume");
            return Ok(AdvanceOutcome::Skipped);
        };

        if enrollment.status_enum() != Some(EnrollmentStatus::Responded) {
            debug!(%enrollment_id, status = %enrollment.status, "Not in responded state, skipping resume");
            return Ok(AdvanceOutcome::Skipped);
        }

        if !self.enrollments.reactivate(enrollment_id).await? {
            debug!(%enrollment_id, "Lost resume race, skipping");
            return Ok(AdvanceOutcome::Skipped);
        }

        info!(%enrollment_id, "No further reply after scripted response, resuming drip");
        self.advance_step(enrollment_id).await
    }

    /// Cancel a single enrollment. No-op if already terminal; returns
    /// whether a transition happened.
    pub async fn cancel(
        &self,
        enrollment_id: EnrollmentId,
        reason: CancelReason,
    ) -> Result<bool, DripError> {
        let cancelled = self.enrollments.cancel(enrollment_id, reason).await?;
        if cancelled {
            info!(%enrollment_id, %reason, "Enrollment cancelled");
        } else {
            debug!(%enrollment_id, "Enrollment already terminal, cancel is a no-op");
        }
        Ok(cancelled)
    }

    /// Cancel every live enrollment for a lead (manual opt-out, lead
    /// deletion). Returns the count affected.
    pub async fn cancel_all_for_lead(
        &self,
        tenant_id: TenantId,
        lead_id: LeadId,
        reason: CancelReason,
    ) -> Result<u64, DripError> {
        let count = self
            .enrollments
            .cancel_all_for_lead(tenant_id, lead_id, reason)
            .await?;
        if count > 0 {
            info!(%tenant_id, %lead_id, %reason, count, "Cancelled live enrollments for lead");
        }
        Ok(count)
    }

    /// Submit a task and return the bookkeeping pair to persist. A
    /// submission failure is logged and leaves the handle unset so an
    /// external repair sweep can spot the gap; it never blocks the
    /// enrollment write.
    async fn submit_task(
        &self,
        task: DripTask,
        delay: Duration,
    ) -> (Option<String>, Option<DateTime<Utc>>) {
        let due_at = Utc::now() + delay;
        match self.scheduler.submit(task, delay).await {
            Ok(handle) => (Some(handle.0), Some(due_at)),
            Err(e) => {
                error!(
                    enrollment_id = %task.enrollment_id(),
                    kind = task.kind(),
                    "Scheduler submission failed, pending handle left unset: {}",
                    e
                );
                (None, Some(due_at))
            }
        }
    }

    async fn submit_advance(
        &self,
        enrollment: &Enrollment,
        delay: Duration,
    ) -> Result<(), DripError> {
        let task = DripTask::AdvanceStep {
            tenant_id: enrollment.tenant_id,
            enrollment_id: enrollment.id,
        };
        let (handle, next_at) = self.submit_task(task, delay).await;
        self.enrollments
            .set_schedule(enrollment.id, handle.as_deref(), next_at)
            .await?;
        Ok(())
    }

    async fn schedule_resume_check(
        &self,
        enrollment: &Enrollment,
    ) -> (Option<String>, Option<DateTime<Utc>>) {
        let task = DripTask::ResumeCheck {
            tenant_id: enrollment.tenant_id,
            enrollment_id: enrollment.id,
        };
        self.submit_task(task, self.resume_check_delay).await
    }

    async fn cancel_enrollment(
        &self,
        enrollment: &Enrollment,
        reason: CancelReason,
    ) -> Result<AdvanceOutcome, DripError> {
        if self.enrollments.cancel(enrollment.id, reason).await? {
            info!(enrollment_id = %enrollment.id, %reason, "Enrollment cancelled");
        }
        Ok(AdvanceOutcome::Cancelled { reason })
    }

    async fn contactable_lead(
        &self,
        tenant_id: TenantId,
        lead_id: LeadId,
    ) -> Result<Option<(Lead, PhoneNumber)>, DripError> {
        let Some(lead) = self.leads.get(tenant_id, lead_id).await? else {
            return Ok(None);
        };
        match contact_phone(&lead) {
            Some(phone) => Ok(Some((lead, phone))),
            None => Ok(None),
        }
    }

    /// Render a step message, consulting the availability checker when
    /// the step asks for it. Lookup failure (or no checker) falls back
    /// to the fallback template when one is configured.
    async fn render_step(
        &self,
        definition: &CampaignDefinition,
        step: &CampaignStep,
        enrollment: &Enrollment,
        lead: &Lead,
    ) -> String {
        let mut vars = self.message_vars(enrollment, lead);

        if step.requires_availability_check {
            let summary = match &self.availability {
                Some(checker) => checker
                    .availability_summary(enrollment.tenant_id, &definition.campaign.category)
                    .await
                    .map_err(|e| {
                        warn!(enrollment_id = %enrollment.id, "Availability lookup failed: {}", e);
                    })
                    .ok(),
                None => None,
            };

            match summary {
                Some(summary) => {
                    vars.insert("availability".to_string(), summary);
                }
                None => {
                    if let Some(fallback) = &step.fallback_template {
                        return self.renderer.render(fallback, &vars);
                    }
                }
            }
        }

        self.renderer.render(&step.message_template, &vars)
    }

    /// Template variables: enrollment context first, lead fields filling
    /// the gaps, plus the derived registration URL.
    fn message_vars(&self, enrollment: &Enrollment, lead: &Lead) -> BTreeMap<String, String> {
        let mut vars = enrollment.context_vars();
        if let Some(first) = &lead.first_name {
            vars.entry("first_name".to_string()).or_insert_with(|| first.clone());
        }
        if let Some(last) = &lead.last_name {
            vars.entry("last_name".to_string()).or_insert_with(|| last.clone());
        }
        vars.insert(
            "registration_url".to_string(),
            self.renderer.registration_url(lead.id, enrollment.campaign_id),
        );
        vars
    }
}

fn contact_phone(lead: &Lead) -> Option<PhoneNumber> {
    lead.phone.as_deref().and_then(PhoneNumber::parse)
}
