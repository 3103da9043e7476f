//! Ownership checks for dataset and channel access.
//!
//! Existence is checked before ownership, so a missing entity is always
//! reported as not found regardless of the caller. Datasets without an owner
//! are readable by every caller.

use crate::catalog::{Catalog, Channel, Dataset};
use crate::error::{Error, Result};
use tracing::warn;
use uuid::Uuid;

/// Resolves channel → dataset → owner and compares it to the caller
#[derive(Clone)]
pub struct OwnershipGuard {
    catalog: Catalog,
}

impl OwnershipGuard {
    pub fn new(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub async fn authorize_dataset(&self, dataset_id: Uuid, caller: Option<&str>) -> Result<Dataset> {
        let dataset = self.catalog.get_dataset(dataset_id).await?;
        check_owner(&dataset, caller)?;
        Ok(dataset)
    }

    pub async fn authorize_channel(
        &self,
        channel_id: Uuid,
        caller: Option<&str>,
    ) -> Result<(Channel, Dataset)> {
        let channel = self.catalog.get_channel(channel_id).await?;
        let dataset = self.authorize_dataset(channel.dataset_id, caller).await?;
        Ok((channel, dataset))
    }
}

pub fn check_owner(dataset: &Dataset, caller: Option<&str>) -> Result<()> {
    match (dataset.owner_id.as_deref(), caller) {
        (None, _) => Ok(()),
        (Some(owner), Some(caller)) if owner == caller => Ok(()),
        (Some(_), caller) => {
            warn!(dataset_id = %dataset.dataset_id, caller = ?caller, "Access denied");
            Err(Error::Forbidden(format!(
                "dataset {} belongs to another user",
                dataset.dataset_id
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn dataset(owner: Option<&str>) -> Dataset {
        Dataset {
            dataset_id: Uuid::new_v4(),
            owner_id: owner.map(str::to_owned),
            filename: "f.tdms".into(),
            created_at: Utc::now(),
            total_points: 0,
        }
    }

    #[test]
    fn test_owner_matches() {
        assert!(check_owner(&dataset(Some("alice")), Some("alice")).is_ok());
    }

    #[test]
    fn test_other_caller_forbidden() {
        let err = check_owner(&dataset(Some("alice")), Some("bob")).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        let err = check_owner(&dataset(Some("alice")), None).unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[test]
    fn test_unowned_dataset_is_shared() {
        assert!(check_owner(&dataset(None), Some("bob")).is_ok());
        assert!(check_owner(&dataset(None), None).is_ok());
    }
}
