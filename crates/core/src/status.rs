//! Publication status, derived from ref positions and open requests.

use serde::{Deserialize, Serialize};

use crate::version::VersionPosition;

/// Publication status of an item. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    /// Never published.
    Draft,
    /// The public version is the latest version.
    Public,
    /// Published, with newer edits nobody has asked to publish yet.
    PublicDraft,
    /// Published, with a newer version waiting in an open request.
    PublicReview,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Public => "PUBLIC",
            Self::PublicDraft => "PUBLIC_DRAFT",
            Self::PublicReview => "PUBLIC_REVIEW",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve an item's status.
///
/// `pending` holds the versions of this item targeted by non-terminal
/// requests. Only targets newer than `public` put the item under review.
pub fn resolve_status(
    latest: VersionPosition,
    public: Option<VersionPosition>,
    pending: &[VersionPosition],
) -> ItemStatus {
    let Some(public) = public else {
        return ItemStatus::Draft;
    };
    if public.id == latest.id {
        return ItemStatus::Public;
    }
    if pending.iter().any(|target| target.number > public.number) {
        ItemStatus::PublicReview
    } else {
        ItemStatus::PublicDraft
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VersionId;

    fn pos(number: i32) -> VersionPosition {
        VersionPosition {
            id: VersionId::new(),
            number,
        }
    }

    #[test]
    fn unpublished_is_draft() {
        let latest = pos(3);
        assert_eq!(resolve_status(latest, None, &[latest]), ItemStatus::Draft);
    }

    #[test]
    fn public_equal_to_latest_is_public() {
        let latest = pos(2);
        assert_eq!(resolve_status(latest, Some(latest), &[]), ItemStatus::Public);
    }

    #[test]
    fn public_behind_latest_without_requests_is_public_draft() {
        let (v1, v2) = (pos(1), pos(2));
        assert_eq!(resolve_status(v2, Some(v1), &[]), ItemStatus::PublicDraft);
    }

    #[test]
    fn pending_request_for_newer_version_is_review() {
        let (v1, v2) = (pos(1), pos(2));
        assert_eq!(resolve_status(v2, Some(v1), &[v2]), ItemStatus::PublicReview);
    }

    #[test]
    fn pending_request_for_public_version_does_not_count() {
        let (v1, v2, v3) = (pos(1), pos(2), pos(3));
        assert_eq!(
            resolve_status(v3, Some(v2), &[v1, v2]),
            ItemStatus::PublicDraft
        );
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&ItemStatus::PublicReview).unwrap();
        assert_eq!(json, "\"PUBLIC_REVIEW\"");
        assert_eq!(ItemStatus::PublicDraft.to_string(), "PUBLIC_DRAFT");
    }
}
