use super::domain::{
    Admin, AdminId, Branch, DirectoryEntity, EntityId, EntityRef, OwnerKind, SalesManager,
    SalesManagerId, Salesperson, SalespersonId, UserId, VisibleStatus,
};
use super::repository::RepositoryError;

/// Lookup of directory entities and the referral hierarchy.
pub trait EntityDirectory: Send + Sync {
    fn entity(
        &self,
        kind: OwnerKind,
        id: &EntityId,
    ) -> Result<Option<DirectoryEntity>, RepositoryError>;
    /// Finds the owner whose nested branches include `branch`.
    fn entity_with_branch(
        &self,
        kind: OwnerKind,
        branch: &EntityId,
    ) -> Result<Option<DirectoryEntity>, RepositoryError>;
    fn salesperson(&self, id: &SalespersonId) -> Result<Option<Salesperson>, RepositoryError>;
    fn sales_manager(&self, id: &SalesManagerId)
        -> Result<Option<SalesManager>, RepositoryError>;
    fn admin(&self, id: &AdminId) -> Result<Option<Admin>, RepositoryError>;
    /// Flips the visible status of an entity or of a single branch.
    fn set_status(&self, entity: &EntityRef, status: VisibleStatus)
        -> Result<(), RepositoryError>;
}

/// A subscribing party together with its owning directory record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEntity {
    pub owner: DirectoryEntity,
    pub branch: Option<Branch>,
}

impl ResolvedEntity {
    pub fn display_name(&self) -> String {
        match &self.branch {
            Some(branch) => format!("{} ({})", self.owner.business_name, branch.name),
            None => self.owner.business_name.clone(),
        }
    }

    pub fn owner_user(&self) -> &UserId {
        &self.owner.user_id
    }

    pub fn status(&self) -> VisibleStatus {
        match &self.branch {
            Some(branch) => branch.status,
            None => self.owner.status,
        }
    }
}

/// Resolves a request's entity reference, descending into branches where needed.
pub fn resolve(
    directory: &dyn EntityDirectory,
    entity: &EntityRef,
) -> Result<Option<ResolvedEntity>, RepositoryError> {
    let owner_kind = entity.kind.owner_kind();
    if !entity.kind.is_branch() {
        return Ok(directory
            .entity(owner_kind, &entity.id)?
            .map(|owner| ResolvedEntity { owner, branch: None }));
    }

    let Some(owner) = directory.entity_with_branch(owner_kind, &entity.id)? else {
        return Ok(None);
    };
    let branch = owner.branch(&entity.id).cloned();
    Ok(branch.map(|branch| ResolvedEntity {
        owner,
        branch: Some(branch),
    }))
}
