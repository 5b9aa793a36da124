use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use firelancer_core::{
    AggregateId, AggregateRoot, AssetId, CollectionId, CustomerId, DomainError, DomainResult,
    FacetValueId, Money, TenantId,
};
use firelancer_events::Event;

use crate::process::{JobPostProcess, JobPostState};

/// Job post identifier (tenant-scoped via `tenant_id` on the aggregate).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobPostId(pub AggregateId);

impl JobPostId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for JobPostId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl core::str::FromStr for JobPostId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<AggregateId>().map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    #[default]
    Public,
    InviteOnly,
}

/// Aggregate root: JobPost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPost {
    id: JobPostId,
    tenant_id: TenantId,
    customer_id: CustomerId,
    title: String,
    description: String,
    budget: Money,
    visibility: Visibility,
    state: JobPostState,
    /// Ordered; the first asset is the featured one.
    asset_ids: Vec<AssetId>,
    facet_value_ids: Vec<FacetValueId>,
    collection_ids: Vec<CollectionId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    published_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    edited_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
    version: u64,
}

impl JobPost {
    pub fn id_typed(&self) -> JobPostId {
        self.id
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn budget(&self) -> &Money {
        &self.budget
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn state(&self) -> JobPostState {
        self.state
    }

    pub fn asset_ids(&self) -> &[AssetId] {
        &self.asset_ids
    }

    pub fn facet_value_ids(&self) -> &[FacetValueId] {
        &self.facet_value_ids
    }

    pub fn collection_ids(&self) -> &[CollectionId] {
        &self.collection_ids
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.published_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.closed_at
    }

    pub fn rejected_at(&self) -> Option<DateTime<Utc>> {
        self.rejected_at
    }

    pub fn edited_at(&self) -> Option<DateTime<Utc>> {
        self.edited_at
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Soft-deleted posts are invisible to every standard query.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some() || self.state == JobPostState::DraftDeleted
    }

    pub fn is_owned_by(&self, customer_id: CustomerId) -> bool {
        self.customer_id == customer_id
    }

    pub fn is_editable(&self) -> bool {
        matches!(
            self.state,
            JobPostState::Draft | JobPostState::Requested | JobPostState::Rejected | JobPostState::Open
        )
    }
}

impl AggregateRoot for JobPost {
    type Id = JobPostId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateJobPost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJobPost {
    pub tenant_id: TenantId,
    pub job_post_id: JobPostId,
    pub customer_id: CustomerId,
    pub title: String,
    pub description: String,
    pub budget: Money,
    pub visibility: Visibility,
    pub asset_ids: Vec<AssetId>,
    pub facet_value_ids: Vec<FacetValueId>,
    pub collection_ids: Vec<CollectionId>,
    pub occurred_at: DateTime<Utc>,
}

/// Field changes for an edit; `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobPostPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub budget: Option<Money>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
    #[serde(default)]
    pub asset_ids: Option<Vec<AssetId>>,
    #[serde(default)]
    pub facet_value_ids: Option<Vec<FacetValueId>>,
}

impl JobPostPatch {
    pub fn is_empty(&self) -> bool {
        self == &JobPostPatch::default()
    }
}

/// Command: EditJobPost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditJobPost {
    pub patch: JobPostPatch,
    pub occurred_at: DateTime<Utc>,
}

/// Lifecycle actions. Each resolves to a target state through the process table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPostAction {
    Publish,
    Approve,
    Reject,
    Resubmit,
    Close,
    DeleteDraft,
}

impl JobPostAction {
    pub const ALL: [JobPostAction; 6] = [
        JobPostAction::Publish,
        JobPostAction::Approve,
        JobPostAction::Reject,
        JobPostAction::Resubmit,
        JobPostAction::Close,
        JobPostAction::DeleteDraft,
    ];

    /// Candidate target states in order of preference.
    ///
    /// Publishing goes to `REQUESTED` when the table routes through
    /// moderation and straight to `OPEN` otherwise.
    pub fn targets(self) -> &'static [JobPostState] {
        match self {
            JobPostAction::Publish => &[JobPostState::Requested, JobPostState::Open],
            JobPostAction::Approve => &[JobPostState::Open],
            JobPostAction::Reject => &[JobPostState::Rejected],
            JobPostAction::Resubmit => &[JobPostState::Requested],
            JobPostAction::Close => &[JobPostState::Closed],
            JobPostAction::DeleteDraft => &[JobPostState::DraftDeleted],
        }
    }

    /// States the action may start from; the table is consulted only after this.
    pub fn sources(self) -> &'static [JobPostState] {
        match self {
            JobPostAction::Publish | JobPostAction::DeleteDraft => &[JobPostState::Draft],
            JobPostAction::Approve | JobPostAction::Reject => &[JobPostState::Requested],
            JobPostAction::Resubmit => &[JobPostState::Rejected],
            JobPostAction::Close => &[JobPostState::Open],
        }
    }

    /// Moderation actions are reserved for administrators.
    pub fn requires_admin(self) -> bool {
        matches!(self, JobPostAction::Approve | JobPostAction::Reject)
    }

    /// Resolve the target state from `from`, or `InvalidTransition`.
    pub fn resolve(self, process: &JobPostProcess, from: JobPostState) -> DomainResult<JobPostState> {
        let targets = self.targets();
        if !self.sources().contains(&from) {
            return Err(DomainError::invalid_transition(from, targets[0]));
        }
        targets
            .iter()
            .copied()
            .find(|to| process.can_transition(from, *to))
            .ok_or_else(|| DomainError::invalid_transition(from, targets[0]))
    }
}

/// Command: TransitionJobPost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionJobPost {
    pub action: JobPostAction,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignCollections (system-side, driven by collection filters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignCollections {
    pub collection_ids: Vec<CollectionId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPostCommand {
    Edit(EditJobPost),
    Transition(TransitionJobPost),
    AssignCollections(AssignCollections),
}

/// Event: JobPostCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPostCreated {
    pub tenant_id: TenantId,
    pub job_post_id: JobPostId,
    pub customer_id: CustomerId,
    pub title: String,
    pub description: String,
    pub budget: Money,
    pub visibility: Visibility,
    pub asset_ids: Vec<AssetId>,
    pub facet_value_ids: Vec<FacetValueId>,
    pub collection_ids: Vec<CollectionId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: JobPostEdited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPostEdited {
    pub tenant_id: TenantId,
    pub job_post_id: JobPostId,
    pub patch: JobPostPatch,
    pub occurred_at: DateTime<Utc>,
}

/// Event: a lifecycle transition was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPostTransitioned {
    pub tenant_id: TenantId,
    pub job_post_id: JobPostId,
    pub action: JobPostAction,
    pub from: JobPostState,
    pub to: JobPostState,
    pub occurred_at: DateTime<Utc>,
}

/// Event: collection membership changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPostCollectionsAssigned {
    pub tenant_id: TenantId,
    pub job_post_id: JobPostId,
    pub collection_ids: Vec<CollectionId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobPostEvent {
    Created(JobPostCreated),
    Edited(JobPostEdited),
    Transitioned(JobPostTransitioned),
    CollectionsAssigned(JobPostCollectionsAssigned),
}

impl JobPostEvent {
    pub fn job_post_id(&self) -> JobPostId {
        match self {
            JobPostEvent::Created(e) => e.job_post_id,
            JobPostEvent::Edited(e) => e.job_post_id,
            JobPostEvent::Transitioned(e) => e.job_post_id,
            JobPostEvent::CollectionsAssigned(e) => e.job_post_id,
        }
    }

    pub fn tenant_id(&self) -> TenantId {
        match self {
            JobPostEvent::Created(e) => e.tenant_id,
            JobPostEvent::Edited(e) => e.tenant_id,
            JobPostEvent::Transitioned(e) => e.tenant_id,
            JobPostEvent::CollectionsAssigned(e) => e.tenant_id,
        }
    }
}

impl Event for JobPostEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JobPostEvent::Created(_) => "job_post.created",
            JobPostEvent::Edited(_) => "job_post.edited",
            JobPostEvent::Transitioned(e) => match e.action {
                JobPostAction::Publish => "job_post.published",
                JobPostAction::Approve => "job_post.approved",
                JobPostAction::Reject => "job_post.rejected",
                JobPostAction::Resubmit => "job_post.resubmitted",
                JobPostAction::Close => "job_post.closed",
                JobPostAction::DeleteDraft => "job_post.draft_deleted",
            },
            JobPostEvent::CollectionsAssigned(_) => "job_post.collections_assigned",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JobPostEvent::Created(e) => e.occurred_at,
            JobPostEvent::Edited(e) => e.occurred_at,
            JobPostEvent::Transitioned(e) => e.occurred_at,
            JobPostEvent::CollectionsAssigned(e) => e.occurred_at,
        }
    }
}

fn validate_title(title: &str) -> DomainResult<()> {
    if title.trim().is_empty() {
        return Err(DomainError::validation("title must not be empty"));
    }
    Ok(())
}

/// Drop repeated ids, keeping the first occurrence.
fn dedup_ordered<T: PartialEq + Copy>(ids: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

impl JobPost {
    /// Validate a create command and build the new `DRAFT` post.
    pub fn create(cmd: &CreateJobPost) -> DomainResult<(JobPost, JobPostEvent)> {
        validate_title(&cmd.title)?;

        let created = JobPostCreated {
            tenant_id: cmd.tenant_id,
            job_post_id: cmd.job_post_id,
            customer_id: cmd.customer_id,
            title: cmd.title.trim().to_string(),
            description: cmd.description.clone(),
            budget: cmd.budget.clone(),
            visibility: cmd.visibility,
            asset_ids: dedup_ordered(&cmd.asset_ids),
            facet_value_ids: dedup_ordered(&cmd.facet_value_ids),
            collection_ids: dedup_ordered(&cmd.collection_ids),
            occurred_at: cmd.occurred_at,
        };

        Ok((Self::from_created(&created), JobPostEvent::Created(created)))
    }

    fn from_created(e: &JobPostCreated) -> Self {
        Self {
            id: e.job_post_id,
            tenant_id: e.tenant_id,
            customer_id: e.customer_id,
            title: e.title.clone(),
            description: e.description.clone(),
            budget: e.budget.clone(),
            visibility: e.visibility,
            state: JobPostState::Draft,
            asset_ids: e.asset_ids.clone(),
            facet_value_ids: e.facet_value_ids.clone(),
            collection_ids: e.collection_ids.clone(),
            created_at: e.occurred_at,
            updated_at: e.occurred_at,
            published_at: None,
            closed_at: None,
            rejected_at: None,
            edited_at: None,
            deleted_at: None,
            version: 1,
        }
    }

    /// Decide the events for `command` without mutating `self`.
    ///
    /// An empty patch yields no events.
    pub fn handle(
        &self,
        process: &JobPostProcess,
        command: &JobPostCommand,
    ) -> DomainResult<Vec<JobPostEvent>> {
        if self.is_deleted() {
            return Err(DomainError::entity_not_found("JobPost", self.id));
        }
        match command {
            JobPostCommand::Edit(cmd) => self.handle_edit(cmd),
            JobPostCommand::Transition(cmd) => self.handle_transition(process, cmd),
            JobPostCommand::AssignCollections(cmd) => self.handle_assign_collections(cmd),
        }
    }

    fn handle_assign_collections(&self, cmd: &AssignCollections) -> DomainResult<Vec<JobPostEvent>> {
        let collection_ids = dedup_ordered(&cmd.collection_ids);
        if collection_ids == self.collection_ids {
            return Ok(Vec::new());
        }
        Ok(vec![JobPostEvent::CollectionsAssigned(JobPostCollectionsAssigned {
            tenant_id: self.tenant_id,
            job_post_id: self.id,
            collection_ids,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_edit(&self, cmd: &EditJobPost) -> DomainResult<Vec<JobPostEvent>> {
        if !self.is_editable() {
            return Err(DomainError::invariant(format!(
                "job post in state {} cannot be edited",
                self.state
            )));
        }
        if cmd.patch.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(title) = &cmd.patch.title {
            validate_title(title)?;
        }

        let mut patch = cmd.patch.clone();
        patch.title = patch.title.map(|t| t.trim().to_string());
        patch.asset_ids = patch.asset_ids.map(|ids| dedup_ordered(&ids));
        patch.facet_value_ids = patch.facet_value_ids.map(|ids| dedup_ordered(&ids));

        Ok(vec![JobPostEvent::Edited(JobPostEdited {
            tenant_id: self.tenant_id,
            job_post_id: self.id,
            patch,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(
        &self,
        process: &JobPostProcess,
        cmd: &TransitionJobPost,
    ) -> DomainResult<Vec<JobPostEvent>> {
        let to = cmd.action.resolve(process, self.state)?;

        Ok(vec![JobPostEvent::Transitioned(JobPostTransitioned {
            tenant_id: self.tenant_id,
            job_post_id: self.id,
            action: cmd.action,
            from: self.state,
            to,
            occurred_at: cmd.occurred_at,
        })])
    }

    pub fn apply(&mut self, event: &JobPostEvent) {
        match event {
            JobPostEvent::Created(e) => {
                *self = Self::from_created(e);
                return;
            }
            JobPostEvent::Edited(e) => {
                let patch = &e.patch;
                if let Some(title) = &patch.title {
                    self.title = title.clone();
                }
                if let Some(description) = &patch.description {
                    self.description = description.clone();
                }
                if let Some(budget) = &patch.budget {
                    self.budget = budget.clone();
                }
                if let Some(visibility) = patch.visibility {
                    self.visibility = visibility;
                }
                if let Some(asset_ids) = &patch.asset_ids {
                    self.asset_ids = asset_ids.clone();
                }
                if let Some(facet_value_ids) = &patch.facet_value_ids {
                    self.facet_value_ids = facet_value_ids.clone();
                }
                self.edited_at = Some(e.occurred_at);
                self.updated_at = e.occurred_at;
            }
            JobPostEvent::Transitioned(e) => {
                self.state = e.to;
                self.updated_at = e.occurred_at;
                match e.action {
                    JobPostAction::Publish => self.published_at = Some(e.occurred_at),
                    JobPostAction::Reject => self.rejected_at = Some(e.occurred_at),
                    JobPostAction::Close => self.closed_at = Some(e.occurred_at),
                    JobPostAction::DeleteDraft => self.deleted_at = Some(e.occurred_at),
                    JobPostAction::Approve | JobPostAction::Resubmit => {}
                }
            }
            JobPostEvent::CollectionsAssigned(e) => {
                self.collection_ids = e.collection_ids.clone();
                self.updated_at = e.occurred_at;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use firelancer_core::CurrencyCode;
    use proptest::prelude::*;

    fn usd(amount: i64) -> Money {
        Money::new(amount, "USD".parse::<CurrencyCode>().unwrap()).unwrap()
    }

    fn create_cmd() -> CreateJobPost {
        let skill = FacetValueId::new();
        CreateJobPost {
            tenant_id: TenantId::new(),
            job_post_id: JobPostId::generate(),
            customer_id: CustomerId::new(),
            title: "  Build a logo ".into(),
            description: "Vector logo for a bakery".into(),
            budget: usd(100),
            visibility: Visibility::Public,
            asset_ids: vec![],
            facet_value_ids: vec![skill, FacetValueId::new(), skill],
            collection_ids: vec![],
            occurred_at: Utc::now(),
        }
    }

    fn draft() -> JobPost {
        JobPost::create(&create_cmd()).unwrap().0
    }

    fn transition(action: JobPostAction) -> JobPostCommand {
        JobPostCommand::Transition(TransitionJobPost {
            action,
            occurred_at: Utc::now(),
        })
    }

    fn run(post: &mut JobPost, process: &JobPostProcess, action: JobPostAction) -> DomainResult<()> {
        let events = post.handle(process, &transition(action))?;
        for e in &events {
            post.apply(e);
        }
        Ok(())
    }

    #[test]
    fn create_starts_in_draft_at_version_one() {
        let (post, event) = JobPost::create(&create_cmd()).unwrap();
        assert_eq!(post.state(), JobPostState::Draft);
        assert_eq!(post.version(), 1);
        assert_eq!(post.title(), "Build a logo");
        assert_eq!(post.facet_value_ids().len(), 2);
        assert_eq!(event.event_type(), "job_post.created");
        assert!(post.published_at().is_none());
    }

    #[test]
    fn blank_title_is_rejected() {
        let mut cmd = create_cmd();
        cmd.title = "   ".into();
        assert!(matches!(JobPost::create(&cmd), Err(DomainError::Validation(_))));
    }

    #[test]
    fn publish_under_moderation_requests_review() {
        let mut post = draft();
        let process = JobPostProcess::default();
        run(&mut post, &process, JobPostAction::Publish).unwrap();

        assert_eq!(post.state(), JobPostState::Requested);
        assert!(post.published_at().is_some());
        assert!(post.closed_at().is_none());
        assert_eq!(post.version(), 2);

        run(&mut post, &process, JobPostAction::Approve).unwrap();
        run(&mut post, &process, JobPostAction::Close).unwrap();
        assert_eq!(post.state(), JobPostState::Closed);
        assert!(post.closed_at().is_some());
    }

    #[test]
    fn publish_without_moderation_opens_directly() {
        let mut post = draft();
        run(&mut post, &JobPostProcess::without_moderation(), JobPostAction::Publish).unwrap();
        assert_eq!(post.state(), JobPostState::Open);
    }

    #[test]
    fn reject_then_resubmit_returns_to_review() {
        let mut post = draft();
        let process = JobPostProcess::default();
        run(&mut post, &process, JobPostAction::Publish).unwrap();
        run(&mut post, &process, JobPostAction::Reject).unwrap();
        assert!(post.rejected_at().is_some());
        run(&mut post, &process, JobPostAction::Resubmit).unwrap();
        assert_eq!(post.state(), JobPostState::Requested);
    }

    #[test]
    fn actions_only_start_from_their_source_state() {
        let process = JobPostProcess::default();

        let mut post = draft();
        let err = run(&mut post, &process, JobPostAction::Resubmit).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(post.state(), JobPostState::Draft);
        assert!(post.published_at().is_none());

        let mut post = draft();
        let err = run(&mut post, &JobPostProcess::without_moderation(), JobPostAction::Approve)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(post.state(), JobPostState::Draft);

        let mut post = draft();
        run(&mut post, &process, JobPostAction::Publish).unwrap();
        run(&mut post, &process, JobPostAction::Reject).unwrap();
        let err = run(&mut post, &process, JobPostAction::Publish).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(post.state(), JobPostState::Rejected);
    }

    #[test]
    fn delete_draft_soft_deletes() {
        let mut post = draft();
        let process = JobPostProcess::default();
        run(&mut post, &process, JobPostAction::DeleteDraft).unwrap();
        assert!(post.is_deleted());
        assert!(post.deleted_at().is_some());

        let err = post.handle(&process, &transition(JobPostAction::Publish)).unwrap_err();
        assert!(matches!(err, DomainError::EntityNotFound { .. }));
    }

    #[test]
    fn edit_sets_edited_at_and_rejects_closed_posts() {
        let mut post = draft();
        let process = JobPostProcess::without_moderation();
        let edit = JobPostCommand::Edit(EditJobPost {
            patch: JobPostPatch {
                title: Some("Build two logos".into()),
                budget: Some(usd(250)),
                ..Default::default()
            },
            occurred_at: Utc::now(),
        });

        let events = post.handle(&process, &edit).unwrap();
        post.apply(&events[0]);
        assert_eq!(post.title(), "Build two logos");
        assert_eq!(post.budget().amount, 250);
        assert!(post.edited_at().is_some());

        run(&mut post, &process, JobPostAction::Publish).unwrap();
        run(&mut post, &process, JobPostAction::Close).unwrap();
        assert!(matches!(
            post.handle(&process, &edit),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn collection_assignment_is_idempotent() {
        let mut post = draft();
        let process = JobPostProcess::default();
        let c = CollectionId::new();
        let assign = JobPostCommand::AssignCollections(AssignCollections {
            collection_ids: vec![c, c],
            occurred_at: Utc::now(),
        });

        let events = post.handle(&process, &assign).unwrap();
        assert_eq!(events[0].event_type(), "job_post.collections_assigned");
        post.apply(&events[0]);
        assert_eq!(post.collection_ids(), &[c]);

        assert!(post.handle(&process, &assign).unwrap().is_empty());
    }

    #[test]
    fn empty_patch_emits_nothing() {
        let post = draft();
        let edit = JobPostCommand::Edit(EditJobPost {
            patch: JobPostPatch::default(),
            occurred_at: Utc::now(),
        });
        assert!(post.handle(&JobPostProcess::default(), &edit).unwrap().is_empty());
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let post = draft();
        let before = post.clone();
        let _ = post.handle(&JobPostProcess::default(), &transition(JobPostAction::Publish));
        let _ = post.handle(&JobPostProcess::default(), &transition(JobPostAction::Close));
        assert_eq!(post, before);
    }

    fn any_action() -> impl Strategy<Value = JobPostAction> {
        prop::sample::select(JobPostAction::ALL.to_vec())
    }

    fn any_process() -> impl Strategy<Value = JobPostProcess> {
        prop_oneof![
            Just(JobPostProcess::moderated()),
            Just(JobPostProcess::without_moderation()),
        ]
    }

    proptest! {
        #[test]
        fn transitions_only_follow_table_edges(
            process in any_process(),
            actions in prop::collection::vec(any_action(), 0..20),
        ) {
            let mut post = draft();
            let mut published = false;
            for action in actions {
                let from = post.state();
                let version = post.version();
                let permitted = !post.is_deleted()
                    && action.sources().contains(&from)
                    && action.targets().iter().any(|to| process.can_transition(from, *to));

                match run(&mut post, &process, action) {
                    Ok(()) => {
                        prop_assert!(permitted);
                        prop_assert!(process.can_transition(from, post.state()));
                        prop_assert_eq!(post.version(), version + 1);
                        published |= action == JobPostAction::Publish;
                    }
                    Err(err) => {
                        prop_assert!(!permitted);
                        if !post.is_deleted() {
                            let is_invalid_transition =
                                matches!(err, DomainError::InvalidTransition { .. });
                            prop_assert!(is_invalid_transition);
                        }
                        prop_assert_eq!(post.state(), from);
                        prop_assert_eq!(post.version(), version);
                    }
                }
                prop_assert_eq!(post.published_at().is_some(), published);
            }
        }
    }
}
