use crate::auth::identity::VerifiedIdentity;
use crate::db::models::UpsertUser;
use crate::feed::FeedService;

/// Split a display name into first and last name. The first whitespace
/// delimited token is the first name; the rest, single-spaced, is the last.
pub fn split_display_name(display_name: Option<&str>) -> (String, String) {
    let mut parts = display_name.unwrap_or_default().split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

pub fn upsert_from_identity(identity: &VerifiedIdentity) -> UpsertUser {
    let (first_name, last_name) = split_display_name(identity.display_name.as_deref());
    UpsertUser {
        id: identity.subject_id.clone(),
        email: identity.email.clone(),
        first_name,
        last_name,
        profile_image_url: identity.photo_url.clone(),
    }
}

/// Refresh the user row for a freshly verified identity.
///
/// Never fails: a sync error is logged and the request carries on
/// authenticated.
pub async fn sync_identity(feed: &FeedService, identity: &VerifiedIdentity) {
    let user = upsert_from_identity(identity);
    if let Err(e) = feed.upsert_user(&user).await {
        tracing::warn!(
            user_id = %identity.subject_id,
            error = %e,
            "Failed to sync user profile from identity provider"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_two_part_name() {
        assert_eq!(
            split_display_name(Some("Ada Lovelace")),
            ("Ada".to_string(), "Lovelace".to_string())
        );
    }

    #[test]
    fn split_multi_part_name_keeps_remainder() {
        assert_eq!(
            split_display_name(Some("Mary  Ann   Evans")),
            ("Mary".to_string(), "Ann Evans".to_string())
        );
    }

    #[test]
    fn split_single_name() {
        assert_eq!(
            split_display_name(Some("Cher")),
            ("Cher".to_string(), String::new())
        );
    }

    #[test]
    fn split_missing_name_is_empty() {
        assert_eq!(split_display_name(None), (String::new(), String::new()));
    }

    #[test]
    fn upsert_copies_claims() {
        let identity = VerifiedIdentity {
            subject_id: "uid-7".into(),
            email: Some("g@example.com".into()),
            display_name: Some("Grace Hopper".into()),
            photo_url: Some("https://example.com/g.png".into()),
        };
        let user = upsert_from_identity(&identity);
        assert_eq!(user.id, "uid-7");
        assert_eq!(user.email.as_deref(), Some("g@example.com"));
        assert_eq!(user.first_name, "Grace");
        assert_eq!(user.last_name, "Hopper");
        assert_eq!(
            user.profile_image_url.as_deref(),
            Some("https://example.com/g.png")
        );
    }
}
