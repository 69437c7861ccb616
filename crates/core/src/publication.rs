//! Request workflow and publication status on top of [`ContentStore`].

use crate::error::CoreError;
use crate::reference::load_version;
use crate::repository::{Repository, Transaction};
use crate::request::{
    validate_description, validate_item_inputs, validate_open_state, validate_title, NewRequest,
    Request, RequestItem, RequestItemInput, RequestPolicy, RequestState, RequestUpdate,
};
use crate::schema::SchemaProvider;
use crate::status::{resolve_status, ItemStatus};
use crate::store::{load_item, load_item_version, load_latest, ContentStore};
use crate::types::{ItemId, Operator, ProjectId, RequestId};
use crate::version::{RefName, VersionSelector};

impl<R, S, P> ContentStore<R, S, P>
where
    R: Repository,
    S: SchemaProvider,
    P: RequestPolicy,
{
    /// Open a publication request.
    ///
    /// Entries naming a ref are pinned to the version the ref points at now;
    /// later edits to the item do not change what the request publishes.
    pub async fn create_request(
        &self,
        operator: Operator,
        input: NewRequest,
    ) -> Result<Request, CoreError> {
        validate_title(&input.title)?;
        validate_description(input.description.as_deref())?;
        validate_item_inputs(&input.items)?;
        let state = input.state.unwrap_or_else(|| self.policy.default_state());
        validate_open_state(state)?;

        let mut tx = self.repo.begin().await?;
        let items = resolve_items(&mut tx, input.project_id, &input.items).await?;

        let now = chrono::Utc::now();
        let request = Request {
            id: RequestId::new(),
            project_id: input.project_id,
            title: input.title,
            description: input.description,
            reviewer_ids: input.reviewer_ids,
            state,
            items,
            created_by: operator,
            created_at: now,
            updated_at: now,
            approved_at: None,
            closed_at: None,
        };
        tx.insert_request(&request).await?;
        tx.commit().await?;

        tracing::info!(
            request_id = %request.id,
            project_id = %request.project_id,
            state = %request.state,
            items = request.items.len(),
            "Request created"
        );
        Ok(request)
    }

    /// Replace the editable content of an open request.
    pub async fn update_request(
        &self,
        request_id: RequestId,
        update: RequestUpdate,
    ) -> Result<Request, CoreError> {
        validate_title(&update.title)?;
        validate_description(update.description.as_deref())?;
        validate_item_inputs(&update.items)?;

        let mut tx = self.repo.begin().await?;
        let mut request = load_request(&mut tx, request_id).await?;
        request.ensure_open()?;

        if let Some(next) = update.state {
            validate_open_state(next)?;
            if next != request.state && !request.state.can_transition_to(next) {
                return Err(CoreError::Validation(format!(
                    "Cannot move request from {} to {next}",
                    request.state
                )));
            }
            request.state = next;
        }

        request.items = resolve_items(&mut tx, request.project_id, &update.items).await?;
        request.title = update.title;
        request.description = update.description;
        request.reviewer_ids = update.reviewer_ids;
        request.updated_at = chrono::Utc::now();
        tx.save_request(&request).await?;
        tx.commit().await?;

        tracing::info!(request_id = %request.id, state = %request.state, "Request updated");
        Ok(request)
    }

    /// Approve a waiting request: every bundled item's `public` ref moves to
    /// the pinned version and the request becomes `APPROVED`.
    ///
    /// `public` is set unconditionally, so of two approvals touching the same
    /// item the one committed last wins. Items deleted since the request was
    /// opened are skipped.
    pub async fn approve_request(
        &self,
        request_id: RequestId,
        approver: Operator,
    ) -> Result<Request, CoreError> {
        let mut tx = self.repo.begin().await?;
        let mut request = load_request(&mut tx, request_id).await?;
        request.ensure_open()?;
        if request.state == RequestState::Draft {
            return Err(CoreError::Conflict(format!(
                "Request {request_id} is still a draft"
            )));
        }
        self.policy.authorize_approval(&request, &approver)?;

        let mut published = 0;
        for entry in &request.items {
            if tx.find_item(entry.item_id).await?.is_none() {
                tracing::warn!(
                    request_id = %request_id,
                    item_id = %entry.item_id,
                    "Skipping deleted item on approval"
                );
                continue;
            }
            tx.set_ref(entry.item_id, RefName::Public, entry.version_id)
                .await?;
            published += 1;
        }

        let now = chrono::Utc::now();
        request.state = RequestState::Approved;
        request.approved_at = Some(now);
        request.updated_at = now;
        tx.save_request(&request).await?;
        tx.commit().await?;

        tracing::info!(request_id = %request_id, published, "Request approved");
        Ok(request)
    }

    /// Close every listed request of `project_id` that is still open.
    ///
    /// Requests already `APPROVED` or `CLOSED` are skipped. Returns the
    /// requests this call closed.
    pub async fn close_requests(
        &self,
        project_id: ProjectId,
        request_ids: &[RequestId],
    ) -> Result<Vec<Request>, CoreError> {
        let mut tx = self.repo.begin().await?;
        let mut closed = Vec::with_capacity(request_ids.len());
        for &id in request_ids {
            let mut request = load_request(&mut tx, id).await?;
            if request.project_id != project_id {
                return Err(CoreError::Validation(format!(
                    "Request {id} does not belong to project {project_id}"
                )));
            }
            if request.state.is_terminal() {
                tracing::debug!(request_id = %id, state = %request.state, "Request already terminal");
                continue;
            }
            let now = chrono::Utc::now();
            request.state = RequestState::Closed;
            request.closed_at = Some(now);
            request.updated_at = now;
            tx.save_request(&request).await?;
            closed.push(request);
        }
        tx.commit().await?;

        tracing::info!(
            project_id = %project_id,
            requested = request_ids.len(),
            closed = closed.len(),
            "Requests closed"
        );
        Ok(closed)
    }

    pub async fn get_request(&self, request_id: RequestId) -> Result<Request, CoreError> {
        let mut tx = self.repo.begin().await?;
        load_request(&mut tx, request_id).await
    }

    /// Requests of a project, newest first.
    pub async fn list_requests(
        &self,
        project_id: ProjectId,
        state: Option<RequestState>,
    ) -> Result<Vec<Request>, CoreError> {
        let mut tx = self.repo.begin().await?;
        tx.list_requests(project_id, state).await
    }

    /// Resolve the publication status of an item.
    pub async fn item_status(&self, item_id: ItemId) -> Result<ItemStatus, CoreError> {
        let mut tx = self.repo.begin().await?;
        load_item(&mut tx, item_id).await?;
        let latest = load_latest(&mut tx, item_id).await?.position();
        let public = match tx.find_ref(item_id, RefName::Public).await? {
            Some(id) => Some(load_version(&mut tx, id).await?.position()),
            None => None,
        };

        let mut pending = Vec::new();
        for request in tx.list_pending_requests_for_item(item_id).await? {
            let Some(target) = request.target_for(item_id) else {
                continue;
            };
            if let Some(version) = tx.find_version(target).await? {
                pending.push(version.position());
            }
        }

        Ok(resolve_status(latest, public, &pending))
    }
}

async fn load_request<T: Transaction>(tx: &mut T, id: RequestId) -> Result<Request, CoreError> {
    tx.find_request(id)
        .await?
        .ok_or_else(|| CoreError::not_found("Request", id))
}

/// Pin every entry to a concrete version of an item in `project_id`.
async fn resolve_items<T: Transaction>(
    tx: &mut T,
    project_id: ProjectId,
    inputs: &[RequestItemInput],
) -> Result<Vec<RequestItem>, CoreError> {
    let mut items = Vec::with_capacity(inputs.len());
    for input in inputs {
        let item = load_item(tx, input.item_id).await?;
        if item.project_id != project_id {
            return Err(CoreError::Validation(format!(
                "Item {} does not belong to project {project_id}",
                item.id
            )));
        }
        let (version_id, source_ref) = match input.target {
            VersionSelector::Version(id) => (id, None),
            VersionSelector::Ref(name) => {
                let id = tx.find_ref(item.id, name).await?.ok_or_else(|| {
                    CoreError::Validation(format!("Item {} has no {name} version", item.id))
                })?;
                (id, Some(name))
            }
        };
        load_item_version(tx, item.id, version_id).await?;
        items.push(RequestItem {
            item_id: item.id,
            version_id,
            source_ref,
        });
    }
    Ok(items)
}
